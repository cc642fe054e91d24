//! Filesystem marker store.
//!
//! Layout: `<root>/<fp[0..2]>/webhook-event-<fp>`, one file per admitted
//! event, holding the first-seen timestamp. Exclusive creation makes the file
//! system itself the arbiter between concurrent local processes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::fingerprint::Fingerprint;
use super::marker::{CreateOutcome, MarkerStore, Result, marker_value};
use crate::persistence::create_new_synced;

/// Marker store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalMarkerStore {
    root: PathBuf,
}

impl LocalMarkerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalMarkerStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the marker file for `fingerprint`.
    pub fn marker_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root
            .join(fingerprint.shard())
            .join(fingerprint.marker_key())
    }
}

impl MarkerStore for LocalMarkerStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self.marker_path(fingerprint).try_exists()?)
    }

    fn create(
        &self,
        fingerprint: &Fingerprint,
        first_seen: DateTime<Utc>,
    ) -> Result<CreateOutcome> {
        let path = self.marker_path(fingerprint);
        let outcome = create_new_synced(&path, marker_value(first_seen).as_bytes())?;
        Ok(outcome)
    }
}
