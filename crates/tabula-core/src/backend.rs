//! Model persistence.
//!
//! A backend stores the attributes of every component keyed by identifier.
//! Loading replays them through a registry, so a loaded model is checked and
//! reported to the migration handler exactly like a model built by hand.

use crate::error::Error;
use crate::model::{Attributes, ComponentId, Model};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source and sink of stored models.
pub trait ModelBackend {
    /// Load every stored component.
    fn load(&self) -> Result<BTreeMap<ComponentId, Attributes>, Error>;

    /// Store every component of `model`, replacing what was stored before.
    fn save(&mut self, model: &Model) -> Result<(), Error>;
}

/// Backend storing a model as one pretty-printed JSON object keyed by id.
///
/// ```json
/// {
///   "1": { "name": "article", "rank": 1, "kind": "class", "classtype": "entity" }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Create a backend for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelBackend for JsonFileBackend {
    fn load(&self) -> Result<BTreeMap<ComponentId, Attributes>, Error> {
        let bytes = fs::read(&self.path)?;
        let entries: BTreeMap<ComponentId, Attributes> = serde_json::from_slice(&bytes)?;
        debug!(path = %self.path.display(), components = entries.len(), "Model file read");
        Ok(entries)
    }

    fn save(&mut self, model: &Model) -> Result<(), Error> {
        let entries: BTreeMap<ComponentId, Attributes> =
            model.iter().map(|c| (c.id(), c.attributes())).collect();
        let json = serde_json::to_vec_pretty(&entries)?;

        // Write next to the target, then swap in place.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, &self.path)?;

        debug!(path = %self.path.display(), components = entries.len(), "Model file written");
        Ok(())
    }
}
