//! Named indexes under one storage root.
//!
//! The registry hands out one shared [`IndexEngine`] per name for as long
//! as the registry lives. Names are compared case-insensitively. Creation
//! and deletion are serialized by a single lock.

use std::{
    collections::HashMap,
    fmt,
    path::Path,
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    analyzer::AnalyzerChain,
    error::Result,
    tantivy_index::{
        EngineSettings,
        IndexEngine,
        META_FILE,
        validate_index_name,
    },
};

pub struct IndexRegistry {
    settings: EngineSettings,
    analyzers: AnalyzerChain,
    indexes: Mutex<HashMap<String, Arc<IndexEngine>>>,
}

impl IndexRegistry {
    pub fn new(settings: EngineSettings, analyzers: AnalyzerChain) -> Self {
        Self {
            settings,
            analyzers,
            indexes: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.settings.root()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The engine registered under `name`, creating it on first request.
    ///
    /// A new engine gets the analyzer the chain resolves for `name`, and
    /// its index is created on disk before this returns.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<IndexEngine>> {
        validate_index_name(name)?;
        let key = name.to_lowercase();

        let mut indexes = self.indexes.lock();
        if let Some(engine) = indexes.get(&key) {
            return Ok(Arc::clone(engine));
        }

        let selection = self.analyzers.resolve(name);
        let engine =
            IndexEngine::open(name, &self.settings, selection.analyzer)?;
        engine.ensure_storage()?;

        let engine = Arc::new(engine);
        indexes.insert(key, Arc::clone(&engine));
        tracing::info!(
            index = name,
            path = %engine.path().display(),
            "index ready"
        );
        Ok(engine)
    }

    /// Whether `name` has been created through this registry. The disk is
    /// not consulted; see [`exists_on_disk`](Self::exists_on_disk).
    pub fn exists(&self, name: &str) -> bool {
        self.indexes.lock().contains_key(&name.to_lowercase())
    }

    /// Whether an index has been created under `<root>/<name>`, by this
    /// registry or an earlier one.
    pub fn exists_on_disk(&self, name: &str) -> bool {
        if validate_index_name(name).is_err() {
            return false;
        }
        self.root().join(name).join(META_FILE).is_file()
    }

    /// Dispose the engine registered under `name` and remove its
    /// directory. Names never created through this registry are ignored.
    ///
    /// Engines already handed out fail with
    /// [`Error::Disposed`](crate::Error::Disposed) afterwards.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut indexes = self.indexes.lock();
        let Some(engine) = indexes.remove(&name.to_lowercase()) else {
            return Ok(());
        };

        engine.dispose();
        let path = engine.path();
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        tracing::info!(index = engine.name(), "index deleted");
        Ok(())
    }

    /// Names of the registered indexes, as first requested, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .indexes
            .lock()
            .values()
            .map(|engine| engine.name().to_string())
            .collect();
        names.sort();
        names
    }
}

impl Drop for IndexRegistry {
    fn drop(&mut self) {
        for (_, engine) in self.indexes.get_mut().drain() {
            engine.dispose();
        }
    }
}

impl fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexRegistry")
            .field("root", &self.settings.root())
            .field("indexes", &self.list())
            .finish()
    }
}
