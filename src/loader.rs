use crate::error::Result;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Source of template text for names the Set has not seen yet
pub trait Loader: Send + Sync {
    /// Fetch the source for `name`; Ok(None) means this loader has no such
    /// template, letting the Set report it as unresolved
    fn load(&self, name: &str) -> Result<Option<String>>;
}

/// Loads templates from files under a root directory. Names without an
/// extension get ".jet" appended before the lookup.
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let mut path = self.root.join(name);
        if path.extension().is_none() {
            path.set_extension("jet");
        }
        path
    }
}

impl Loader for FileLoader {
    fn load(&self, name: &str) -> Result<Option<String>> {
        let path = self.resolve(name);
        log::debug!("loading template {:?} from {:?}", name, path);
        match std::fs::read_to_string(&path) {
            Ok(source) => Ok(Some(source)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Serves templates from an in-memory table; handy in tests and for
/// embedding templates in a binary.
pub struct MemoryLoader {
    templates: Vec<(String, String)>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self {
            templates: Vec::new(),
        }
    }

    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.templates.push((name.into(), source.into()));
        self
    }
}

impl Default for MemoryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader for MemoryLoader {
    fn load(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .templates
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, source)| source.clone()))
    }
}
