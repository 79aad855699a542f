use ustl::{Activations, Engine, Model, TemplateError, Value};

#[derive(Debug, Clone, Model)]
#[model(get(display_name, title), is(admin))]
struct User {
    name: String,
    title: String,
    role: String,
    #[model(rename = "mail")]
    email: String,
    #[model(ignore)]
    password: String,
}

impl User {
    fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    fn title(&self) -> String {
        self.title.to_uppercase()
    }

    fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

fn user(role: &str) -> User {
    User {
        name: "ann".to_string(),
        title: "dr".to_string(),
        role: role.to_string(),
        email: "ann@example.com".to_string(),
        password: "secret".to_string(),
    }
}

#[test]
fn test_accessor_precedence() {
    let u = user("admin");
    assert_eq!(u.property("title"), Some(Value::Str("DR".to_string())));
    assert_eq!(u.property("admin"), Some(Value::Bool(true)));
    assert_eq!(u.property("mail"), Some(Value::Str("ann@example.com".to_string())));
    assert_eq!(u.property("email"), None);
    assert_eq!(u.property("password"), None);
    assert_eq!(u.password, "secret");
}

#[test]
fn test_render_model_properties() {
    let engine = Engine::new();
    let def = engine
        .compile(
            "card",
            "$u.display_name$ ($u.title$) $if(u.admin)$admin$else$$u.role$$endif$[$u.password$]",
        )
        .unwrap();

    let mut acts = Activations::new();
    let root = acts.instantiate(def.clone());
    acts.set_attribute(root, "u", user("admin"));
    let (text, rendered) = engine.render_to_string(&mut acts, root).unwrap();
    assert_eq!(text, "ann <ann@example.com> (DR) admin[]");
    assert_eq!(rendered.diagnostics.len(), 1);
    assert!(matches!(
        &rendered.diagnostics[0],
        TemplateError::PropertyResolution { property, .. } if property == "password"
    ));

    let mut acts = Activations::new();
    let root = acts.instantiate(def);
    acts.set_attribute(root, "u", user("guest"));
    let (text, _) = engine.render_to_string(&mut acts, root).unwrap();
    assert_eq!(text, "ann <ann@example.com> (DR) guest[]");
}
