use std::sync::Once;
use ustl::{Activations, Engine, G, GroupManager, TemplateRegistry, template_assets};

// Registered at startup.
template_assets!("tests/resources/templates/*.xml");

static INIT: Once = Once::new();

fn init_logger() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .is_test(true)
            .init();
    });
}

fn render_doc(engine: &Engine, doc: &str) -> String {
    let mut acts = Activations::new();
    let root = engine.instance_of(&mut acts, doc).unwrap();
    acts.set_attribute(root, "title", "T");
    acts.set_attribute(root, "lines", vec!["a", "b"]);
    let (text, rendered) = engine.render_to_string(&mut acts, root).unwrap();
    assert!(rendered.is_clean(), "{:?}", rendered.diagnostics);
    text
}

#[test]
fn test_assets_registered_at_startup() {
    init_logger();
    let page = G
        .group("page")
        .expect("Assets were not loaded automatically. The ctor-based registration failed.");
    assert_eq!(page.parent().map(|p| p.name()), Some("base"));
    assert!(page.contains("footer"));
    assert!(page.contains("bottom"));

    let engine = Engine::builder().registry(page).build();
    assert_eq!(
        render_doc(&engine, "doc"),
        "== T == (page)\n  a\n  b\n-- end --"
    );
}

#[test]
fn test_load_group_files_from_disk() {
    init_logger();
    let manager = GroupManager::new();
    manager.assets("tests/resources/templates/*.xml").unwrap();
    assert!(manager.lookup("base.header").is_some());
    assert!(manager.lookup("page.doc").is_some());

    let engine = Engine::builder().registry(manager).build();
    assert_eq!(
        render_doc(&engine, "page.doc"),
        "== T == (page)\n  a\n  b\n-- end --"
    );
}

#[test]
fn test_bad_pattern_is_a_load_error() {
    let manager = GroupManager::new();
    assert!(manager.assets("tests/resources/[").is_err());
}
