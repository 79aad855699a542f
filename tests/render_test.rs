use chrono::NaiveDate;
use std::sync::Arc;
use ustl::{
    Activations, Engine, RenderOptions, TemplateError, TemplateGroup, Value, tpl::truthy,
};

fn group() -> Arc<TemplateGroup> {
    let group = Arc::new(TemplateGroup::new("test"));
    group.define("zero", Vec::<String>::new(), "0").unwrap();
    group.define("one", Vec::<String>::new(), "1").unwrap();
    group
        .define("opt", Vec::<String>::new(), "$if(it)$$it$$endif$")
        .unwrap();
    group.define("pair", ["a", "b"], "$a$/$b$").unwrap();
    group.define("wrap", ["x"], "<$x$>").unwrap();
    group.define("body", Vec::<String>::new(), "line1\nline2").unwrap();
    group
}

fn render_with(
    engine: &Engine,
    source: &str,
    setup: impl FnOnce(&mut Activations, ustl::ActivationId),
) -> (String, Vec<TemplateError>) {
    let def = engine.compile("main", source).unwrap();
    let mut acts = Activations::new();
    let root = acts.instantiate(def);
    setup(&mut acts, root);
    let (text, rendered) = engine.render_to_string(&mut acts, root).unwrap();
    (text, rendered.diagnostics)
}

fn engine() -> Engine {
    Engine::builder().registry(group()).build()
}

#[test]
fn test_aligned_application_equal_lengths() {
    let (text, diagnostics) = render_with(
        &engine(),
        r#"$names, phones:{n, p | $i$:$n$=$p$}; separator=";"$"#,
        |acts, root| {
            acts.set_attribute(root, "names", vec!["ann", "bob", "cy"]);
            acts.set_attribute(root, "phones", vec!["1", "2", "3"]);
        },
    );
    assert_eq!(text, "1:ann=1;2:bob=2;3:cy=3");
    assert!(diagnostics.is_empty());
}

#[test]
fn test_aligned_application_truncates_to_shortest() {
    let (text, diagnostics) = render_with(
        &engine(),
        r#"$names, phones:pair(); separator=","$"#,
        |acts, root| {
            acts.set_attribute(root, "names", vec!["ann", "bob", "cy"]);
            acts.set_attribute(root, "phones", vec!["1", "2"]);
        },
    );
    assert_eq!(text, "ann/1,bob/2");
    let arity: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d, TemplateError::ArityMismatch { .. }))
        .collect();
    assert_eq!(arity.len(), 1);
    assert!(matches!(
        arity[0],
        TemplateError::ArityMismatch {
            expected: 2,
            actual: 3,
            ..
        }
    ));
}

#[test]
fn test_rotating_application_cycles_templates() {
    let (text, _) = render_with(&engine(), "$items:zero(), one()$", |acts, root| {
        acts.set_attribute(root, "items", vec!["a", "b", "c", "d", "e"]);
    });
    assert_eq!(text, "01010");
}

#[test]
fn test_rotating_application_binds_implicit_attributes() {
    let (text, diagnostics) = render_with(
        &engine(),
        r#"$items:{x | $i$.$x$=$it$=$attr$}; separator=" "$"#,
        |acts, root| {
            acts.set_attribute(root, "items", vec!["a", "b", "c"]);
        },
    );
    assert_eq!(text, "1.a=a=a 2.b=b=b 3.c=c=c");
    assert!(diagnostics.is_empty());
}

#[test]
fn test_anonymous_template_does_not_inherit_attributes() {
    let (text, diagnostics) = render_with(
        &engine(),
        r#"$items:{x | $prefix$$x$}; separator=","$"#,
        |acts, root| {
            acts.set_attribute(root, "items", vec!["a", "b"]);
            acts.set_attribute(root, "prefix", "-");
        },
    );
    assert_eq!(text, "a,b");
    assert!(!diagnostics.is_empty());
    assert!(diagnostics.iter().all(|d| matches!(
        d,
        TemplateError::MissingAttribute { name, .. } if name == "prefix"
    )));
}

#[test]
fn test_argument_values_come_from_caller_scope() {
    let (text, diagnostics) = render_with(
        &engine(),
        r#"$items:{x | $wrap(x=x)$}; separator=","$|$pair(a=b, b=a)$"#,
        |acts, root| {
            acts.set_attribute(root, "items", vec!["a", "b"]);
            acts.set_attribute(root, "a", "A");
            acts.set_attribute(root, "b", "B");
        },
    );
    assert_eq!(text, "<a>,<b>|B/A");
    assert!(diagnostics.is_empty());
}

#[test]
fn test_null_argument_leaves_binding_unset() {
    let (text, diagnostics) = render_with(
        &engine(),
        r#"$pair(a=n, b=y)$|$items:opt(it=n); separator=","$"#,
        |acts, root| {
            acts.set_attribute(root, "n", Value::Null);
            acts.set_attribute(root, "y", "y");
            acts.set_attribute(root, "items", vec!["a", "b"]);
        },
    );
    assert_eq!(text, "/y|a,b");
    assert!(diagnostics.is_empty());
}

#[test]
fn test_scalar_operand_is_applied_once() {
    let (text, diagnostics) = render_with(
        &engine(),
        r#"$s:{v | [$v$$i$]}; separator=","$"#,
        |acts, root| {
            acts.set_attribute(root, "s", "s");
        },
    );
    assert_eq!(text, "[s1]");
    assert!(diagnostics.is_empty());
}

#[test]
fn test_concat_treats_null_as_identity() {
    let (text, diagnostics) = render_with(
        &engine(),
        r#"[$(x + "x")$|$("x" + x)$|$("a" + "b")$]"#,
        |acts, root| {
            acts.set_attribute(root, "x", Value::Null);
        },
    );
    assert_eq!(text, "[x|x|ab]");
    assert!(diagnostics.is_empty());
}

#[test]
fn test_truthiness() {
    assert!(!truthy(&Value::List(vec![])));
    assert!(truthy(&Value::List(vec![Value::Int(1)])));
    assert!(!truthy(&Value::Null));
    assert!(!truthy(&Value::Bool(false)));

    let (text, _) = render_with(
        &engine(),
        "$if(empty)$E$else$e$endif$$if(full)$F$endif$$if(!flag)$N$endif$",
        |acts, root| {
            acts.set_attribute(root, "empty", Vec::<i32>::new());
            acts.set_attribute(root, "full", vec![1]);
            acts.set_attribute(root, "flag", false);
        },
    );
    assert_eq!(text, "eFN");
}

#[test]
fn test_separator_skips_empty_conditional_element() {
    let (text, _) = render_with(&engine(), r#"$items:opt(); separator=","$"#, |acts, root| {
        acts.set_attribute(
            root,
            "items",
            vec![
                Value::Str("A".to_string()),
                Value::Bool(false),
                Value::Str("C".to_string()),
            ],
        );
    });
    assert_eq!(text, "A,C");
}

#[test]
fn test_separator_skips_element_opening_with_empty_conditional() {
    let (text, _) = render_with(
        &engine(),
        r#"$items:{v | $if(v)$$v$$endif$$tail$}; separator=","$"#,
        |acts, root| {
            acts.set_attribute(
                root,
                "items",
                vec![
                    Value::Str("A".to_string()),
                    Value::Bool(false),
                    Value::Str("C".to_string()),
                ],
            );
        },
    );
    assert_eq!(text, "A,C");
}

#[test]
fn test_null_elements_are_skipped_or_replaced() {
    let items = vec![Value::Int(1), Value::Null, Value::Int(3)];
    let (skipped, _) = render_with(&engine(), r#"$items; separator=","$"#, |acts, root| {
        acts.set_attribute(root, "items", items.clone());
    });
    assert_eq!(skipped, "1,3");

    let (replaced, _) = render_with(
        &engine(),
        r#"$items; separator=",", null="-"$"#,
        |acts, root| {
            acts.set_attribute(root, "items", items.clone());
        },
    );
    assert_eq!(replaced, "1,-,3");
}

#[test]
fn test_map_property_falls_back_to_default_key() {
    let mut with_default = std::collections::BTreeMap::new();
    with_default.insert("a".to_string(), Value::Str("A".to_string()));
    with_default.insert("_default_".to_string(), Value::Str("D".to_string()));
    let mut plain = std::collections::BTreeMap::new();
    plain.insert("a".to_string(), Value::Str("A".to_string()));

    let (text, diagnostics) = render_with(&engine(), "$m.a$ $m.b$ [$p.b$]", |acts, root| {
        acts.set_attribute(root, "m", Value::Map(with_default));
        acts.set_attribute(root, "p", Value::Map(plain));
    });
    assert_eq!(text, "A D []");
    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(
        diagnostics[0],
        TemplateError::PropertyResolution { .. }
    ));
}

#[test]
fn test_strict_mode_detects_self_enclosing_activation() {
    let engine = Engine::builder()
        .registry(group())
        .options(RenderOptions::new().strict(true))
        .build();
    let def = engine.compile("loop", "[$me$]").unwrap();
    let mut acts = Activations::new();
    let root = acts.instantiate(def);
    acts.set_attribute(root, "me", root);

    let err = engine.render_to_string(&mut acts, root).unwrap_err();
    match err {
        TemplateError::InfiniteRecursion { trace } => assert!(trace.contains("loop")),
        other => panic!("Expected InfiniteRecursion, got {:?}", other),
    }
}

#[test]
fn test_nested_template_inherits_indentation() {
    let (text, _) = render_with(&engine(), "<div>\n  $body()$\n</div>", |_, _| {});
    assert_eq!(text, "<div>\n  line1\n  line2\n</div>");
}

#[test]
fn test_indented_list_with_newline_separator() {
    let (text, _) = render_with(
        &engine(),
        "begin\n    $items; separator=\"\\n\"$\nend",
        |acts, root| {
            acts.set_attribute(root, "items", vec!["a", "b"]);
        },
    );
    assert_eq!(text, "begin\n    a\n    b\nend");
}

#[test]
fn test_date_format_option() {
    let (text, _) = render_with(
        &engine(),
        r#"$d$ $d; format="%d/%m/%Y"$"#,
        |acts, root| {
            acts.set_attribute(root, "d", NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        },
    );
    assert_eq!(text, "2024-03-05 05/03/2024");
}

#[test]
fn test_builtin_functions() {
    let (text, _) = render_with(
        &engine(),
        r#"$first(xs)$ $last(xs)$ $rest(xs); separator=","$ $trunc(xs); separator=","$ $length(xs)$"#,
        |acts, root| {
            acts.set_attribute(root, "xs", vec![1, 2, 3]);
        },
    );
    assert_eq!(text, "1 3 2,3 1,2 3");
}

#[test]
fn test_include_reports_unknown_parameter_and_template() {
    let (text, diagnostics) = render_with(
        &engine(),
        "$pair(a=x, c=x)$|$nowhere()$",
        |acts, root| {
            acts.set_attribute(root, "x", "v");
        },
    );
    assert_eq!(text, "v/|");
    assert!(diagnostics
        .iter()
        .any(|d| matches!(d, TemplateError::UnknownParameter { name, .. } if name == "c")));
    assert!(diagnostics
        .iter()
        .any(|d| matches!(d, TemplateError::TemplateNotFound(name) if name == "nowhere")));
}

#[test]
fn test_compile_error_carries_position() {
    let engine = Engine::new();
    match engine.compile("bad", "ok\n  $if(x)$never closed") {
        Err(TemplateError::Syntax { line, .. }) => assert!(line >= 1),
        other => panic!("Expected syntax error, got {:?}", other.map(|d| d.name.clone())),
    }
}
