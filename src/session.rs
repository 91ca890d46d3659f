use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{GateError, GateResult};
use crate::model::{DetectionPreview, NewPreview, SessionId};

/// Holds pending previews between the preview and commit steps.
///
/// Each preview is consumed at most once. Implementations backed by an
/// external cache or a table must keep `consume` an atomic get-and-remove.
pub trait SessionStore: Send + Sync {
    /// Store a preview under a fresh session id.
    fn put(&self, preview: NewPreview) -> GateResult<DetectionPreview>;

    /// Atomically remove and return the preview. `NotFound` if it was never
    /// stored, already consumed, or evicted.
    fn consume(&self, session_id: &str) -> GateResult<DetectionPreview>;

    /// Put a consumed preview back under its original id (used when the
    /// commit that consumed it could not be persisted).
    fn restore(&self, preview: DetectionPreview) -> GateResult<()>;

    /// Drop previews created before `cutoff` and hand them back so their
    /// images can be cleaned up.
    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> GateResult<Vec<DetectionPreview>>;

    fn len(&self) -> GateResult<usize>;
}

/// In-process store: one mutex around a map.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<SessionId, DetectionPreview>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned guard is still usable.
    fn entries(&self) -> MutexGuard<'_, HashMap<SessionId, DetectionPreview>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn put(&self, preview: NewPreview) -> GateResult<DetectionPreview> {
        let session_id = Uuid::new_v4().to_string();
        let stored = DetectionPreview {
            session_id: session_id.clone(),
            asset_id: preview.asset_id,
            asset_name: preview.asset_name,
            image_path: preview.image_path,
            confidence: preview.confidence,
            detected_class_id: preview.detected_class_id,
            created_at: preview.created_at,
        };
        self.entries().insert(session_id, stored.clone());
        Ok(stored)
    }

    fn consume(&self, session_id: &str) -> GateResult<DetectionPreview> {
        self.entries()
            .remove(session_id)
            .ok_or_else(|| GateError::NotFound("invalid or expired session".to_string()))
    }

    fn restore(&self, preview: DetectionPreview) -> GateResult<()> {
        debug!("restoring preview session {}", preview.session_id);
        self.entries().insert(preview.session_id.clone(), preview);
        Ok(())
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> GateResult<Vec<DetectionPreview>> {
        let mut entries = self.entries();
        let stale: Vec<SessionId> = entries
            .iter()
            .filter(|(_, p)| p.created_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        Ok(stale.iter().filter_map(|id| entries.remove(id)).collect())
    }

    fn len(&self) -> GateResult<usize> {
        Ok(self.entries().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn draft(asset: &str, created_at: DateTime<Utc>) -> NewPreview {
        NewPreview {
            asset_id: asset.to_string(),
            asset_name: "Car".to_string(),
            image_path: "uploads/a.jpg".to_string(),
            confidence: 0.9,
            detected_class_id: Some(2),
            created_at,
        }
    }

    #[test]
    fn consume_returns_preview_once() {
        let store = MemorySessionStore::new();
        let stored = store.put(draft("AB12CD3", Utc::now())).unwrap();

        let got = store.consume(&stored.session_id).unwrap();
        assert_eq!(got, stored);
        assert!(matches!(
            store.consume(&stored.session_id),
            Err(GateError::NotFound(_))
        ));
        assert!(matches!(store.consume("nope"), Err(GateError::NotFound(_))));
    }

    #[test]
    fn session_ids_are_distinct() {
        let store = MemorySessionStore::new();
        let a = store.put(draft("A", Utc::now())).unwrap();
        let b = store.put(draft("A", Utc::now())).unwrap();
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn concurrent_consume_succeeds_exactly_once() {
        let store = MemorySessionStore::new();
        for _ in 0..20 {
            let stored = store.put(draft("RACE1", Utc::now())).unwrap();
            let wins = AtomicUsize::new(0);
            let misses = AtomicUsize::new(0);

            std::thread::scope(|s| {
                for _ in 0..16 {
                    s.spawn(|| match store.consume(&stored.session_id) {
                        Ok(_) => {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(GateError::NotFound(_)) => {
                            misses.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => panic!("unexpected error {e}"),
                    });
                }
            });

            assert_eq!(wins.load(Ordering::SeqCst), 1);
            assert_eq!(misses.load(Ordering::SeqCst), 15);
        }
    }

    #[test]
    fn restore_makes_preview_consumable_again() {
        let store = MemorySessionStore::new();
        let stored = store.put(draft("AB12CD3", Utc::now())).unwrap();
        let taken = store.consume(&stored.session_id).unwrap();
        store.restore(taken).unwrap();
        assert_eq!(store.consume(&stored.session_id).unwrap(), stored);
    }

    #[test]
    fn eviction_drops_only_stale_previews() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let old = store.put(draft("OLD", now - Duration::minutes(30))).unwrap();
        let fresh = store.put(draft("NEW", now)).unwrap();

        let evicted = store.evict_older_than(now - Duration::minutes(10)).unwrap();
        assert_eq!(evicted, vec![old.clone()]);
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.consume(&old.session_id).is_err());
        assert!(store.consume(&fresh.session_id).is_ok());
    }
}
