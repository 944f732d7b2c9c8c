//! Session storage with optimistic concurrency.
//!
//! Every stored session carries a revision counter. A writer names the
//! revision it started from; if someone else saved in between, the write is
//! refused with [`StoreError::Conflict`] and the caller reloads and retries.
//! An absent session is at revision 0.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_core::{NormalizeOptions, SessionId};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::context::ConversationContext;
use crate::errors::{SessionError, StoreError};

/// Durable home for session snapshots.
pub trait SessionStore: Send + Sync {
    /// Latest snapshot, stamped with its stored revision.
    fn load(&self, session_id: &SessionId) -> Result<Option<ConversationContext>, StoreError>;

    /// Store `context` if the stored revision still equals `expected_revision`.
    ///
    /// Returns the new revision.
    fn save(&self, context: &ConversationContext, expected_revision: u64) -> Result<u64, StoreError>;

    /// Forget a session. Returns whether it existed.
    fn delete(&self, session_id: &SessionId) -> Result<bool, StoreError>;
}

/// Load (or start) a session, apply `update`, and save against the loaded revision.
///
/// On [`StoreError::Conflict`] nothing is written; reload and call again.
pub fn update_session<S, F>(
    store: &S,
    session_id: &SessionId,
    update: F,
) -> Result<ConversationContext, SessionError>
where
    S: SessionStore + ?Sized,
    F: FnOnce(&ConversationContext) -> parley_core::Result<ConversationContext>,
{
    let current = match store.load(session_id)? {
        Some(context) => context,
        None => ConversationContext::new(session_id.clone())?,
    };
    let next = update(&current)?;
    let revision = store.save(&next, current.revision())?;
    Ok(next.with_revision(revision))
}

#[derive(Debug)]
struct StoredSession {
    revision: u64,
    record: Value,
}

/// Process-local store keeping each session as its encoded JSON record.
///
/// Loads go through the same tolerant decoder as any external store would.
/// Records are written with the store's normalization, which is also the
/// fallback for records that lack one.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, StoredSession>,
    normalization: NormalizeOptions,
}

impl InMemorySessionStore {
    /// An empty store using default normalization.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store for sessions merged under `normalization`.
    #[must_use]
    pub fn with_normalization(normalization: NormalizeOptions) -> Self {
        Self {
            sessions: DashMap::new(),
            normalization,
        }
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Stored revision of a session (0 when absent).
    #[must_use]
    pub fn revision(&self, session_id: &SessionId) -> u64 {
        self.sessions.get(session_id).map_or(0, |s| s.revision)
    }
}

impl SessionStore for InMemorySessionStore {
    #[instrument(skip_all, fields(session_id = %session_id))]
    fn load(&self, session_id: &SessionId) -> Result<Option<ConversationContext>, StoreError> {
        // decode outside the shard lock
        let Some((revision, record)) = self
            .sessions
            .get(session_id)
            .map(|s| (s.revision, s.record.clone()))
        else {
            return Ok(None);
        };
        let decoded =
            ConversationContext::from_record_with(session_id, &record, Utc::now(), &self.normalization);
        if !decoded.is_clean() {
            warn!(warnings = decoded.warnings.len(), "stored session needed repair");
        }
        Ok(Some(decoded.value.with_revision(revision)))
    }

    #[instrument(skip_all, fields(session_id = %context.session_id(), expected_revision = expected_revision))]
    fn save(&self, context: &ConversationContext, expected_revision: u64) -> Result<u64, StoreError> {
        let record = serde_json::to_value(context.to_record_with(&self.normalization))?;
        let conflict = |actual: u64| {
            warn!(expected = expected_revision, actual, "stale session write rejected");
            StoreError::Conflict {
                session_id: context.session_id().clone(),
                expected: expected_revision,
                actual,
            }
        };
        let revision = match self.sessions.entry(context.session_id().clone()) {
            Entry::Occupied(mut entry) => {
                let actual = entry.get().revision;
                if actual != expected_revision {
                    return Err(conflict(actual));
                }
                let next = actual + 1;
                let _ = entry.insert(StoredSession { revision: next, record });
                next
            }
            Entry::Vacant(entry) => {
                if expected_revision != 0 {
                    return Err(conflict(0));
                }
                let _ = entry.insert(StoredSession { revision: 1, record });
                1
            }
        };
        debug!(revision, "session saved");
        Ok(revision)
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    fn delete(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.sessions.remove(session_id).is_some())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parley_entities::{AdditiveSlot, ExtractedValues, ExtractionContext, ExtractionInput, ReplaceableSlot};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sid() -> SessionId {
        SessionId::from("sess-7")
    }

    fn goal(value: &str, msg: &str) -> ExtractionInput {
        ExtractionInput {
            slot_name: "goals".into(),
            values: ExtractedValues::One(value.into()),
            confidence: 0.9,
            source_message_id: msg.into(),
        }
    }

    fn add_goal<'a>(
        value: &'a str,
        msg: &'a str,
    ) -> impl FnOnce(&ConversationContext) -> parley_core::Result<ConversationContext> + 'a {
        move |c| c.apply_extraction(&goal(value, msg), &ExtractionContext::new(msg))
    }

    #[test]
    fn missing_session_loads_as_none() {
        let store = InMemorySessionStore::new();
        assert!(store.load(&sid()).unwrap().is_none());
        assert_eq!(store.revision(&sid()), 0);
        assert!(!store.delete(&sid()).unwrap());
    }

    #[test]
    fn update_creates_then_advances_revision() {
        let store = InMemorySessionStore::new();
        let first = update_session(&store, &sid(), add_goal("Grow", "m1")).unwrap();
        assert_eq!(first.revision(), 1);
        let second = update_session(&store, &sid(), add_goal("Hire", "m2")).unwrap();
        assert_eq!(second.revision(), 2);

        let loaded = store.load(&sid()).unwrap().unwrap();
        assert_eq!(loaded.revision(), 2);
        assert_eq!(loaded.entities().additive(AdditiveSlot::Goals).len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn stale_write_is_rejected() {
        let store = InMemorySessionStore::new();
        let _ = update_session(&store, &sid(), add_goal("Grow", "m1")).unwrap();

        let a = store.load(&sid()).unwrap().unwrap();
        let b = store.load(&sid()).unwrap().unwrap();
        let a2 = a.apply_extraction(&goal("Hire", "m2"), &ExtractionContext::new("m2")).unwrap();
        let b2 = b
            .correct_entity(ReplaceableSlot::Budget, "$1M", &ExtractionContext::new("m3"), None)
            .unwrap();

        assert_eq!(store.save(&a2, a.revision()).unwrap(), 2);
        assert_matches!(
            store.save(&b2, b.revision()),
            Err(StoreError::Conflict {
                expected: 1,
                actual: 2,
                ..
            })
        );
        // the rejected write left no trace
        let stored = store.load(&sid()).unwrap().unwrap();
        assert!(stored.corrections().is_empty());
    }

    #[test]
    fn first_write_must_start_from_zero() {
        let store = InMemorySessionStore::new();
        let context = ConversationContext::new(sid()).unwrap();
        assert_matches!(
            store.save(&context, 5),
            Err(StoreError::Conflict { actual: 0, .. })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn validation_errors_surface_without_writing() {
        let store = InMemorySessionStore::new();
        let err = update_session(&store, &sid(), |c| {
            c.apply_extraction(&goal("  ", "m1"), &ExtractionContext::new("m1"))
        })
        .unwrap_err();
        assert_eq!(err.user_message(), "could not update context");
        assert!(!err.is_conflict());
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_writers_from_same_revision_exactly_one_wins() {
        let store = InMemorySessionStore::new();
        let base = ConversationContext::new(sid()).unwrap();
        let wins = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for i in 0..8 {
                let (store, base, wins) = (&store, &base, &wins);
                let _ = scope.spawn(move || {
                    let msg = format!("m{i}");
                    let next = base
                        .apply_extraction(&goal(&format!("Goal {i}"), &msg), &ExtractionContext::new(msg.as_str()))
                        .unwrap();
                    if store.save(&next, 0).is_ok() {
                        let _ = wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(store.revision(&sid()), 1);
    }

    #[test]
    fn corrupted_record_still_loads() {
        let store = InMemorySessionStore::new();
        let _ = store.sessions.insert(
            sid(),
            StoredSession {
                revision: 4,
                record: serde_json::json!({"entities": {"goals": "Grow"}}),
            },
        );
        let loaded = store.load(&sid()).unwrap().unwrap();
        assert_eq!(loaded.revision(), 4);
        assert_eq!(loaded.entities().additive(AdditiveSlot::Goals)[0].value(), "Grow");
    }

    #[test]
    fn configured_normalization_survives_save_and_load() {
        let case_sensitive = NormalizeOptions {
            lowercase: false,
            ..NormalizeOptions::default()
        };
        let store = InMemorySessionStore::with_normalization(case_sensitive);
        let ctx = ExtractionContext::new("m1").with_normalization(case_sensitive);
        let saved = update_session(&store, &sid(), |c| {
            c.apply_extraction(
                &ExtractionInput {
                    slot_name: "currentTools".into(),
                    values: ExtractedValues::Many(vec!["CRM".into(), "crm".into()]),
                    confidence: 0.9,
                    source_message_id: "m1".into(),
                },
                &ctx,
            )
        })
        .unwrap();
        assert_eq!(saved.entities().additive(AdditiveSlot::CurrentTools).len(), 2);

        let loaded = store.load(&sid()).unwrap().unwrap();
        assert_eq!(loaded.entities(), saved.entities());
        assert_eq!(store.sessions.get(&sid()).unwrap().record["entities"]["normalization"]["lowercase"], false);
    }

    #[test]
    fn save_span_records_expected_revision() {
        use std::sync::{Arc, Mutex};
        use tracing::field::{Field, Visit};
        use tracing::span::{Attributes, Id};
        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::{Layer, Registry};

        #[derive(Clone, Default)]
        struct Revisions(Arc<Mutex<Vec<u64>>>);

        impl Visit for Revisions {
            fn record_u64(&mut self, field: &Field, value: u64) {
                if field.name() == "expected_revision" {
                    self.0.lock().unwrap().push(value);
                }
            }
            fn record_debug(&mut self, _: &Field, _: &dyn std::fmt::Debug) {}
        }

        impl<S: tracing::Subscriber> Layer<S> for Revisions {
            fn on_new_span(&self, attrs: &Attributes<'_>, _: &Id, _: Context<'_, S>) {
                attrs.record(&mut self.clone());
            }
        }

        let revisions = Revisions::default();
        let subscriber = Registry::default().with(revisions.clone());
        tracing::subscriber::with_default(subscriber, || {
            let store = InMemorySessionStore::new();
            let context = ConversationContext::new(sid()).unwrap();
            let _ = store.save(&context, 0).unwrap();
            let _ = store.save(&context, 1).unwrap();
        });
        assert_eq!(*revisions.0.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn delete_forgets_session() {
        let store = InMemorySessionStore::new();
        let _ = update_session(&store, &sid(), add_goal("Grow", "m1")).unwrap();
        assert!(store.delete(&sid()).unwrap());
        assert!(store.load(&sid()).unwrap().is_none());
    }
}
