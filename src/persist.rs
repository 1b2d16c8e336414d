//! Snapshot persistence. The snapshot is plain JSON over the scope tables;
//! transform functions are never written out, only their names, so loading
//! re-binds every transform through the registry. A version mismatch
//! discards the snapshot wholesale so the caller can fall back to the
//! built-in defaults.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::construct::{
    Argument, Document, Id, IdGenerator, IdHasher, Keeper, Property, ScopeHasher,
    ScopedReference, Transform, Variable,
};
use crate::error::{PropsheetError, Result};
use crate::transforms;

/// Bumped whenever the persisted shape changes; snapshots from any other
/// version are rejected, never migrated.
pub const SNAPSHOT_VERSION: u32 = 1;

type ScopeMap<T> = HashMap<String, HashMap<Id, T, IdHasher>, ScopeHasher>;

#[derive(Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub selected: Option<ScopedReference>,
    pub properties: ScopeMap<Property>,
    pub variables: ScopeMap<Variable>,
}

impl Snapshot {
    pub fn take(document: &Document) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            selected: document.selection(),
            properties: document.properties.lock().unwrap().to_map(),
            variables: document.variables.lock().unwrap().to_map(),
        }
    }

    /// Builds a live document out of the snapshot: every persisted id is
    /// retained in the generator and every transform is re-bound to its
    /// registry function.
    pub fn restore(mut self) -> Result<Document> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PropsheetError::Snapshot(format!(
                "version mismatch: snapshot is {}, expected {}",
                self.version, SNAPSHOT_VERSION
            )));
        }
        let mut generator = IdGenerator::new();
        for members in self.properties.values_mut() {
            for property in members.values_mut() {
                generator.retain(property.id);
                generator.retain(property.initial.id);
                rebind_transforms(&mut property.transforms, &mut generator);
            }
        }
        for members in self.variables.values_mut() {
            for variable in members.values_mut() {
                generator.retain(variable.id);
                generator.retain(variable.initial.id);
                rebind_transforms(&mut variable.transforms, &mut generator);
            }
        }
        info!(
            properties = self.properties.values().map(|m| m.len()).sum::<usize>(),
            variables = self.variables.values().map(|m| m.len()).sum::<usize>(),
            saved_at = %self.saved_at,
            "restored snapshot"
        );
        Ok(Document {
            id_generator: Arc::new(Mutex::new(generator)),
            properties: Arc::new(Mutex::new(Keeper::from_map(self.properties))),
            variables: Arc::new(Mutex::new(Keeper::from_map(self.variables))),
            selected: Arc::new(Mutex::new(self.selected)),
        })
    }
}

fn rebind_transforms(chain: &mut [Transform], generator: &mut IdGenerator) {
    for transform in chain {
        generator.retain(transform.id);
        transform.function = transforms::function_of(transform.name);
        for arg in &transform.args {
            if let Argument::Enumerated(enumerated) = arg {
                generator.retain(enumerated.id);
            }
            // property arguments are table entries of their own and get
            // retained when their scope is walked
        }
    }
}

/// Writes the document to disk as a pretty-printed JSON snapshot.
pub fn save(document: &Document, path: impl AsRef<Path>) -> Result<()> {
    let snapshot = Snapshot::take(document);
    let json = serde_json::to_string_pretty(&snapshot)?;
    fs::write(path.as_ref(), json)?;
    info!(path = %path.as_ref().display(), "saved snapshot");
    Ok(())
}

/// Reads a snapshot back into a live document. Any failure — missing file,
/// malformed JSON, unknown transform names, version mismatch — is an error;
/// callers are expected to fall back to `Document::with_defaults`.
pub fn load(path: impl AsRef<Path>) -> Result<Document> {
    let json = fs::read_to_string(path.as_ref())?;
    let snapshot: Snapshot = serde_json::from_str(&json)?;
    snapshot.restore()
}
