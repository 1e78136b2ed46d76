use crate::ast::Template;
use crate::builtins;
use crate::error::{Error, Result};
use crate::loader::Loader;
use crate::parser;
use crate::renderer;
use crate::value::{Function, Value};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

const DEFAULT_MAX_DEPTH: usize = 200;

/// A registry of parsed templates sharing globals, functions and an
/// optional loader. Sets are safe to share across threads; registering
/// templates or globals while other threads render is fine.
pub struct Set {
    templates: DashMap<String, Arc<Template>>,
    globals: RwLock<HashMap<String, Value>>,
    functions: RwLock<HashMap<String, Function>>,
    loader: Option<Box<dyn Loader>>,
    max_depth: usize,
}

impl Set {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
            globals: RwLock::new(HashMap::new()),
            functions: RwLock::new(builtins::default_functions()),
            loader: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Create a Set that falls back to the given loader for template names
    /// not yet registered
    pub fn with_loader(loader: impl Loader + 'static) -> Self {
        let mut set = Self::new();
        set.loader = Some(Box::new(loader));
        set
    }

    /// Cap for nested block, yield and include execution
    pub fn set_max_depth(&mut self, depth: usize) {
        self.max_depth = depth;
    }

    pub(crate) fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Parse source and register it under `name`, replacing any previous
    /// registration. A template that fails to parse is never registered.
    pub fn parse_template(&self, name: &str, source: &str) -> Result<Arc<Template>> {
        let template = Arc::new(parser::parse(name, source)?);
        log::debug!("registered template {:?}", name);
        self.templates.insert(name.to_string(), template.clone());
        Ok(template)
    }

    /// Like parse_template, but panics on a parse failure. Intended for
    /// trusted templates registered at startup.
    pub fn load_template(&self, name: &str, source: &str) -> Arc<Template> {
        match self.parse_template(name, source) {
            Ok(template) => template,
            Err(err) => panic!("template {:?} failed to parse: {}", name, err),
        }
    }

    /// Look a template up in the registry, consulting the loader for names
    /// not yet registered
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>> {
        if let Some(entry) = self.templates.get(name) {
            return Ok(entry.clone());
        }
        if let Some(loader) = &self.loader {
            if let Some(source) = loader.load(name)? {
                return self.parse_template(name, &source);
            }
        }
        Err(Error::UnresolvedTemplate(name.to_string()))
    }

    /// Bind a value visible to every template in the Set
    pub fn add_global(&self, name: impl Into<String>, value: impl Into<Value>) -> &Self {
        self.globals
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .insert(name.into(), value.into());
        self
    }

    /// Register a host function callable from any template in the Set
    pub fn add_function<F>(&self, name: impl Into<String>, function: F) -> &Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .insert(name.into(), Arc::new(function));
        self
    }

    pub(crate) fn lookup_global(&self, name: &str) -> Option<Value> {
        self.globals
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(name)
            .cloned()
    }

    pub(crate) fn lookup_function(&self, name: &str) -> Option<Function> {
        self.functions
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(name)
            .cloned()
    }

    /// Render a template to a string
    pub fn render(
        &self,
        name: &str,
        variables: HashMap<String, Value>,
        context: impl Into<Value>,
    ) -> Result<String> {
        let mut out = String::new();
        self.render_to(name, variables, context, &mut out)?;
        Ok(out)
    }

    /// Render a template into any fmt::Write sink. A failed render aborts
    /// mid-write; output already produced stays in the sink.
    pub fn render_to(
        &self,
        name: &str,
        variables: HashMap<String, Value>,
        context: impl Into<Value>,
        out: &mut impl fmt::Write,
    ) -> Result<()> {
        let template = self.get_template(name)?;
        log::debug!("rendering template {:?}", name);
        renderer::render_template(self, template, variables, context.into(), out)
    }
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}
