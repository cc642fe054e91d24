//! Idempotency gate: admit each event identifier at most once.
//!
//! In [`ExecutionMode::Shared`] the gate consults the shared marker store
//! first and publishes there with exclusive-create semantics; if the shared
//! store errors for any reason the decision is made against the local
//! filesystem store instead. In [`ExecutionMode::LocalOnly`] only the local
//! store is used.
//!
//! Duplicate detection has no side effects. A first-seen event leaves exactly
//! one marker in the store that decided, plus a best-effort local mirror when
//! the shared store decided.

pub mod fingerprint;
pub mod local;
pub mod marker;
pub mod shared;

pub use fingerprint::{Fingerprint, MARKER_KEY_PREFIX};
pub use local::LocalMarkerStore;
pub use marker::{CreateOutcome, MarkerError, MarkerStore};
pub use shared::GitRefMarkerStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{EventId, ExecutionMode};

/// The gate's verdict for one event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No marker existed; one has now been recorded.
    FirstSeen,
    /// A marker already existed (or another process won the race to create it).
    Duplicate,
}

impl Admission {
    pub fn is_first_seen(&self) -> bool {
        matches!(self, Admission::FirstSeen)
    }
}

/// Errors that escape the gate.
///
/// Shared-store failures never appear here; they are absorbed by falling back
/// to the local store.
#[derive(Debug, Error)]
pub enum GateError {
    /// The event identifier was empty.
    #[error("invalid input: event identifier is empty")]
    InvalidInput,

    /// The local marker store failed, so no decision could be made.
    #[error("local marker store failed for {event_id}: {source}")]
    Local {
        event_id: EventId,
        #[source]
        source: MarkerError,
    },
}

/// Result type for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;

/// First-seen/duplicate decisions over a shared and a local marker store.
pub struct IdempotencyGate {
    mode: ExecutionMode,
    shared: Option<Box<dyn MarkerStore>>,
    local: LocalMarkerStore,
}

impl IdempotencyGate {
    /// A gate that only ever consults the local store.
    pub fn local_only(local: LocalMarkerStore) -> Self {
        IdempotencyGate {
            mode: ExecutionMode::LocalOnly,
            shared: None,
            local,
        }
    }

    /// A gate that prefers `shared` and falls back to `local`.
    pub fn shared(shared: Box<dyn MarkerStore>, local: LocalMarkerStore) -> Self {
        IdempotencyGate {
            mode: ExecutionMode::Shared,
            shared: Some(shared),
            local,
        }
    }

    /// Builds a gate for `mode`. In shared mode a missing shared store means
    /// every decision falls back to the local store.
    pub fn new(
        mode: ExecutionMode,
        shared: Option<Box<dyn MarkerStore>>,
        local: LocalMarkerStore,
    ) -> Self {
        match mode {
            ExecutionMode::LocalOnly => Self::local_only(local),
            ExecutionMode::Shared => IdempotencyGate {
                mode,
                shared,
                local,
            },
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Decides whether `event_id` is seen for the first time, recording it if so.
    pub fn admit(&self, event_id: &EventId) -> Result<Admission> {
        self.admit_at(event_id, Utc::now())
    }

    /// As [`IdempotencyGate::admit`], with an explicit first-seen time.
    pub fn admit_at(&self, event_id: &EventId, now: DateTime<Utc>) -> Result<Admission> {
        if event_id.as_str().trim().is_empty() {
            return Err(GateError::InvalidInput);
        }

        let fingerprint = Fingerprint::of(event_id);

        if self.mode.is_shared() {
            match &self.shared {
                Some(shared) => match self.admit_shared(shared.as_ref(), &fingerprint, now) {
                    Ok(admission) => {
                        tracing::info!(
                            event_id = %event_id,
                            fingerprint = %fingerprint,
                            store = shared.name(),
                            ?admission,
                            "gate decision"
                        );
                        return Ok(admission);
                    }
                    Err(e) => {
                        tracing::warn!(
                            event_id = %event_id,
                            store = shared.name(),
                            error = %e,
                            "shared marker store failed, falling back to local markers"
                        );
                    }
                },
                None => {
                    tracing::warn!(
                        event_id = %event_id,
                        "no shared marker store configured, using local markers"
                    );
                }
            }
        }

        let admission = self
            .admit_local(&fingerprint, now)
            .map_err(|source| GateError::Local {
                event_id: event_id.clone(),
                source,
            })?;
        tracing::info!(
            event_id = %event_id,
            fingerprint = %fingerprint,
            store = self.local.name(),
            ?admission,
            "gate decision"
        );
        Ok(admission)
    }

    fn admit_shared(
        &self,
        shared: &dyn MarkerStore,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> marker::Result<Admission> {
        if shared.exists(fingerprint)? {
            return Ok(Admission::Duplicate);
        }

        match shared.create(fingerprint, now)? {
            CreateOutcome::AlreadyExists => Ok(Admission::Duplicate),
            CreateOutcome::Created => {
                if let Err(e) = self.local.create(fingerprint, now) {
                    tracing::warn!(
                        fingerprint = %fingerprint,
                        error = %e,
                        "failed to mirror marker locally"
                    );
                }
                Ok(Admission::FirstSeen)
            }
        }
    }

    fn admit_local(
        &self,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> marker::Result<Admission> {
        match self.local.create(fingerprint, now)? {
            CreateOutcome::Created => Ok(Admission::FirstSeen),
            CreateOutcome::AlreadyExists => Ok(Admission::Duplicate),
        }
    }
}

impl std::fmt::Debug for IdempotencyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyGate")
            .field("mode", &self.mode)
            .field("shared", &self.shared.as_ref().map(|s| s.name()))
            .field("local", &self.local.root())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::marker::memory::MemoryMarkerStore;
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn shared_gate(store: &MemoryMarkerStore, dir: &std::path::Path) -> IdempotencyGate {
        IdempotencyGate::shared(Box::new(store.clone()), LocalMarkerStore::new(dir))
    }

    // ─── Local-only mode ───

    #[test]
    fn local_first_seen_then_duplicate() {
        let dir = tempdir().unwrap();
        let gate = IdempotencyGate::local_only(LocalMarkerStore::new(dir.path()));
        let id = EventId::new("evt_1");

        assert_eq!(gate.admit(&id).unwrap(), Admission::FirstSeen);
        assert_eq!(gate.admit(&id).unwrap(), Admission::Duplicate);
    }

    #[test]
    fn empty_id_is_invalid_input() {
        let dir = tempdir().unwrap();
        let gate = IdempotencyGate::local_only(LocalMarkerStore::new(dir.path()));

        assert!(matches!(
            gate.admit(&EventId::new("")),
            Err(GateError::InvalidInput)
        ));
        // Nothing written.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn local_only_never_touches_shared() {
        let dir = tempdir().unwrap();
        let store = MemoryMarkerStore::new();
        let gate = IdempotencyGate::new(
            ExecutionMode::LocalOnly,
            Some(Box::new(store.clone())),
            LocalMarkerStore::new(dir.path()),
        );

        gate.admit(&EventId::new("evt_1")).unwrap();

        assert_eq!(store.create_calls(), 0);
        assert_eq!(gate.mode(), ExecutionMode::LocalOnly);
    }

    #[test]
    fn local_processes_race_single_winner() {
        let dir = tempdir().unwrap();
        let id = EventId::new("evt_race");

        let first_seen = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let root = dir.path();
                    let id = &id;
                    s.spawn(move || {
                        IdempotencyGate::local_only(LocalMarkerStore::new(root))
                            .admit(id)
                            .unwrap()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(Admission::is_first_seen)
                .count()
        });

        assert_eq!(first_seen, 1);
    }

    // ─── Shared mode ───

    #[test]
    fn shared_first_seen_then_duplicate_and_mirrors() {
        let dir = tempdir().unwrap();
        let store = MemoryMarkerStore::new();
        let gate = shared_gate(&store, dir.path());
        let id = EventId::new("evt_1");

        assert_eq!(gate.admit(&id).unwrap(), Admission::FirstSeen);
        assert_eq!(gate.admit(&id).unwrap(), Admission::Duplicate);

        let fp = Fingerprint::of(&id);
        assert!(store.first_seen(&fp).is_some());
        assert!(LocalMarkerStore::new(dir.path()).exists(&fp).unwrap());
        // Duplicate detection issued no second create.
        assert_eq!(store.create_calls(), 1);
    }

    #[test]
    fn shared_duplicate_seen_by_other_process() {
        let store = MemoryMarkerStore::new();
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let id = EventId::new("evt_1");

        let a = shared_gate(&store, dir_a.path()).admit(&id).unwrap();
        let b = shared_gate(&store, dir_b.path()).admit(&id).unwrap();

        assert_eq!(a, Admission::FirstSeen);
        assert_eq!(b, Admission::Duplicate);
    }

    #[test]
    fn lost_create_race_is_duplicate() {
        let store = MemoryMarkerStore::new();
        let dir = tempdir().unwrap();
        let id = EventId::new("evt_1");
        shared_gate(&store, tempdir().unwrap().path())
            .admit(&id)
            .unwrap();

        store.set_stale_reads(true);
        let result = shared_gate(&store, dir.path()).admit(&id).unwrap();

        assert_eq!(result, Admission::Duplicate);
        // The loser does not mirror a marker it didn't win.
        assert!(!LocalMarkerStore::new(dir.path())
            .exists(&Fingerprint::of(&id))
            .unwrap());
    }

    #[test]
    fn unavailable_shared_store_falls_back_to_local() {
        let store = MemoryMarkerStore::new();
        store.set_unavailable(true);
        let dir = tempdir().unwrap();
        let gate = shared_gate(&store, dir.path());
        let id = EventId::new("evt_1");

        assert_eq!(gate.admit(&id).unwrap(), Admission::FirstSeen);
        assert_eq!(gate.admit(&id).unwrap(), Admission::Duplicate);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn shared_mode_without_store_uses_local() {
        let dir = tempdir().unwrap();
        let gate = IdempotencyGate::new(
            ExecutionMode::Shared,
            None,
            LocalMarkerStore::new(dir.path()),
        );
        let id = EventId::new("evt_1");

        assert_eq!(gate.admit(&id).unwrap(), Admission::FirstSeen);
        assert_eq!(gate.admit(&id).unwrap(), Admission::Duplicate);
    }

    #[test]
    fn local_store_failure_surfaces() {
        let dir = tempdir().unwrap();
        // A regular file where the marker directory should be.
        let root = dir.path().join("not-a-dir");
        std::fs::write(&root, b"").unwrap();
        let gate = IdempotencyGate::local_only(LocalMarkerStore::new(&root));

        let err = gate.admit(&EventId::new("evt_1")).unwrap_err();

        assert!(matches!(err, GateError::Local { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn admit_twice_is_first_seen_then_duplicate(id in "[A-Za-z0-9_]{1,32}") {
            let dir = tempdir().unwrap();
            let store = MemoryMarkerStore::new();
            let gate = shared_gate(&store, dir.path());
            let id = EventId::new(id);

            prop_assert_eq!(gate.admit(&id).unwrap(), Admission::FirstSeen);
            prop_assert_eq!(gate.admit(&id).unwrap(), Admission::Duplicate);
        }

        #[test]
        fn distinct_ids_are_independent(ids in prop::collection::hash_set("[a-z0-9]{1,12}", 1..16)) {
            let dir = tempdir().unwrap();
            let gate = IdempotencyGate::local_only(LocalMarkerStore::new(dir.path()));

            for id in &ids {
                prop_assert_eq!(gate.admit(&EventId::new(id.as_str())).unwrap(), Admission::FirstSeen);
            }
        }
    }
}
