use std::sync::{Arc, LazyLock, OnceLock};

use dashmap::DashMap;

use crate::Result;
use crate::error::TemplateError;
use crate::tpl;
use crate::tpl::ast::TemplateDefinition;
use crate::tpl::lexer::Delimiters;

/// Supplies compiled templates to the evaluator by name.
pub trait TemplateRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<TemplateDefinition>>;

    /// Resolves `super.name` for a template defined in `group`: the lookup
    /// starts in that group's parent.
    fn lookup_super(&self, _group: &str, _name: &str) -> Option<Arc<TemplateDefinition>> {
        None
    }
}

impl<R: TemplateRegistry + ?Sized> TemplateRegistry for Arc<R> {
    fn lookup(&self, name: &str) -> Option<Arc<TemplateDefinition>> {
        (**self).lookup(name)
    }

    fn lookup_super(&self, group: &str, name: &str) -> Option<Arc<TemplateDefinition>> {
        (**self).lookup_super(group, name)
    }
}

impl<R: TemplateRegistry + ?Sized> TemplateRegistry for &R {
    fn lookup(&self, name: &str) -> Option<Arc<TemplateDefinition>> {
        (**self).lookup(name)
    }

    fn lookup_super(&self, group: &str, name: &str) -> Option<Arc<TemplateDefinition>> {
        (**self).lookup_super(group, name)
    }
}

/// A registry with no templates, for renders that never include one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTemplates;

impl TemplateRegistry for NoTemplates {
    fn lookup(&self, _name: &str) -> Option<Arc<TemplateDefinition>> {
        None
    }
}

/// A named set of templates with aliases and an optional parent group.
///
/// Lookups try the group's own templates, then its aliases, then the
/// parent chain.
pub struct TemplateGroup {
    name: String,
    delimiters: Delimiters,
    templates: DashMap<String, Arc<TemplateDefinition>>,
    aliases: DashMap<String, String>,
    parent: OnceLock<Arc<TemplateGroup>>,
}

impl TemplateGroup {
    /// Creates an empty group using `$...$` delimiters.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_delimiters(name, Delimiters::DOLLAR)
    }

    pub fn with_delimiters(name: impl Into<String>, delimiters: Delimiters) -> Self {
        Self {
            name: name.into(),
            delimiters,
            templates: DashMap::new(),
            aliases: DashMap::new(),
            parent: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn delimiters(&self) -> Delimiters {
        self.delimiters
    }

    /// Compiles `source` and registers it under `name`.
    ///
    /// # Errors
    /// Returns the compile error, or a [`TemplateError::GroupLoad`] error if
    /// `name` is already defined in this group.
    pub fn define<I, S>(
        &self,
        name: &str,
        formal_args: I,
        source: &str,
    ) -> Result<Arc<TemplateDefinition>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.templates.contains_key(name) {
            return Err(TemplateError::GroupLoad(format!(
                "Template '{}' already defined in group '{}'",
                name, self.name
            )));
        }
        let definition = tpl::compile_with(name, source, self.delimiters)?
            .with_formal_args(formal_args)
            .in_group(self.name.as_str());
        Ok(self.insert(definition))
    }

    /// Registers an already compiled definition, replacing any template of
    /// the same name.
    pub fn insert(&self, definition: TemplateDefinition) -> Arc<TemplateDefinition> {
        let definition = Arc::new(definition.in_group(self.name.as_str()));
        log::debug!("Group '{}': defined '{}'", self.name, definition.name);
        self.templates
            .insert(definition.name.clone(), definition.clone());
        definition
    }

    /// Makes `alias` another name for `target`.
    pub fn alias(&self, alias: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(alias.into(), target.into());
    }

    /// Sets the group that lookups fall back to.
    ///
    /// # Errors
    /// A group's parent can be set only once.
    pub fn set_parent(&self, parent: Arc<TemplateGroup>) -> Result<()> {
        let parent_name = parent.name.clone();
        self.parent.set(parent).map_err(|_| {
            TemplateError::GroupLoad(format!(
                "Group '{}' already extends another group, can't extend '{}'",
                self.name, parent_name
            ))
        })
    }

    pub fn parent(&self) -> Option<&Arc<TemplateGroup>> {
        self.parent.get()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Names of the templates defined directly in this group.
    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// The group named `group` in this group's ancestry, itself included.
    fn ancestor(&self, group: &str) -> Option<&TemplateGroup> {
        let mut current = Some(self);
        while let Some(g) = current {
            if g.name == group {
                return Some(g);
            }
            current = g.parent().map(|p| p.as_ref());
        }
        None
    }
}

impl TemplateRegistry for TemplateGroup {
    fn lookup(&self, name: &str) -> Option<Arc<TemplateDefinition>> {
        if let Some(definition) = self.templates.get(name) {
            return Some(definition.clone());
        }
        // Alias targets are not themselves resolved as aliases.
        if let Some(target) = self.aliases.get(name).map(|t| t.value().clone()) {
            if let Some(definition) = self.templates.get(&target) {
                return Some(definition.clone());
            }
            if let Some(definition) = self.parent().and_then(|parent| parent.lookup(&target)) {
                return Some(definition);
            }
        }
        self.parent().and_then(|parent| parent.lookup(name))
    }

    fn lookup_super(&self, group: &str, name: &str) -> Option<Arc<TemplateDefinition>> {
        self.ancestor(group)?.parent()?.lookup(name)
    }
}

/// The process-wide group registry. Group files loaded with
/// [`GroupManager::assets`] or `template_assets!` land here.
pub static G: LazyLock<GroupManager> = LazyLock::new(GroupManager::new);

/// Registry of template groups by name.
///
/// As a [`TemplateRegistry`] it resolves qualified names of the form
/// `group.template`.
pub struct GroupManager {
    groups: DashMap<String, Arc<TemplateGroup>>,
}

impl Default for GroupManager {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupManager {
    /// Creates a new, empty `GroupManager`.
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Registers a group, replacing any group with the same name.
    pub fn register(&self, group: TemplateGroup) -> Arc<TemplateGroup> {
        let group = Arc::new(group);
        self.groups.insert(group.name.clone(), group.clone());
        group
    }

    /// Returns the group named `name`, creating an empty one if needed.
    pub fn group_or_create(&self, name: &str, delimiters: Delimiters) -> Arc<TemplateGroup> {
        self.groups
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TemplateGroup::with_delimiters(name, delimiters)))
            .clone()
    }

    pub fn group(&self, name: &str) -> Option<Arc<TemplateGroup>> {
        self.groups.get(name).map(|g| g.value().clone())
    }

    /// Loads XML group files matching a glob pattern.
    ///
    /// # Arguments
    /// * `pattern` - A glob pattern (e.g., "resources/templates/*.xml").
    pub fn assets(&self, pattern: &str) -> Result<()> {
        crate::group_loader::load_into(self, pattern).map_err(|e| {
            TemplateError::GroupLoad(format!("Failed to load template groups from pattern: {:#}", e))
        })
    }

    /// Drops every registered group (mainly for resetting tests).
    pub fn clear(&self) {
        self.groups.clear();
    }
}

impl TemplateRegistry for GroupManager {
    fn lookup(&self, name: &str) -> Option<Arc<TemplateDefinition>> {
        let (group, template) = name.rsplit_once('.')?;
        self.group(group)?.lookup(template)
    }

    fn lookup_super(&self, group: &str, name: &str) -> Option<Arc<TemplateDefinition>> {
        self.group(group)?.lookup_super(group, name)
    }
}
