//! # Timestamp Store
//!
//! Persists, per action key, three time-ordered lists of epoch-millisecond
//! timestamps: impressions, dismissals, completions. This is the only state
//! that survives across page views; everything the frequency-cap logic knows
//! about the reader's past comes from here.
//!
//! The record is validated wholesale on every read: a malformed value is
//! discarded entirely and reported once, never partially trusted. Entries
//! older than the retention window (default 7 days) are pruned on read.
//!
//! Persistence failures are never surfaced to callers; the store keeps an
//! in-process mirror and serves that for the remainder of the session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::events::{Diagnostic, DiagnosticSink, TracingSink};
use crate::intervention::{Intervention, InterventionOrchestration, InterventionType};
use crate::storage::{KeyValueStore, PromptStorage, TIMESTAMPS_KEY};

pub const WEEK_IN_MILLIS: i64 = 604_800_000;

/// Current UNIX time in milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Event history for one action key. Sequences are insertion-ordered, which
/// for a single writer means ascending in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionTimestamps {
    pub impressions: Vec<i64>,
    pub dismissals: Vec<i64>,
    pub completions: Vec<i64>,
}

impl ActionTimestamps {
    pub fn push(&mut self, kind: EventKind, at_ms: i64) {
        match kind {
            EventKind::Impression => self.impressions.push(at_ms),
            EventKind::Dismissal => self.dismissals.push(at_ms),
            EventKind::Completion => self.completions.push(at_ms),
        }
    }

    fn pruned(&self, lifespan_ms: i64, now_ms: i64) -> Self {
        Self {
            impressions: prune(&self.impressions, lifespan_ms, now_ms),
            dismissals: prune(&self.dismissals, lifespan_ms, now_ms),
            completions: prune(&self.completions, lifespan_ms, now_ms),
        }
    }
}

/// Mapping from action key (intervention type for legacy history, or a
/// configuration id for multi-instance history) to its event series.
pub type ActionsTimestamps = HashMap<String, ActionTimestamps>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Impression,
    Dismissal,
    Completion,
}

/// Returns the suffix of `timestamps` whose entries are within `lifespan_ms`
/// of `now_ms`. Assumes ascending input: once one entry qualifies, the rest
/// do too.
pub fn prune(timestamps: &[i64], lifespan_ms: i64, now_ms: i64) -> Vec<i64> {
    let start = timestamps
        .iter()
        .position(|&t| now_ms - t <= lifespan_ms)
        .unwrap_or(timestamps.len());
    timestamps[start..].to_vec()
}

/// Which key family the frequency-cap history is read and aggregated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Legacy: one series per intervention type.
    TypeKeyed,
    /// Multi-instance: one series per configuration id; type-keyed series
    /// are still dual-written for continuity.
    ConfigKeyed,
}

/// Resolves which stored series applies to a given action or funnel entry,
/// isolating the transitional dual-key concern from the cap logic.
#[derive(Debug, Clone, Copy)]
pub struct KeyResolver {
    phase: MigrationPhase,
}

impl KeyResolver {
    pub fn new(phase: MigrationPhase) -> Self {
        Self { phase }
    }

    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    pub fn orchestration_key<'a>(&self, orchestration: &'a InterventionOrchestration) -> &'a str {
        match self.phase {
            MigrationPhase::ConfigKeyed => &orchestration.config_id,
            MigrationPhase::TypeKeyed => orchestration.intervention_type.as_key(),
        }
    }

    pub fn action_key<'a>(&self, action: &'a Intervention) -> &'a str {
        match self.phase {
            MigrationPhase::ConfigKeyed => action
                .configuration_id
                .as_deref()
                .unwrap_or_else(|| action.intervention_type.as_key()),
            MigrationPhase::TypeKeyed => action.intervention_type.as_key(),
        }
    }

    /// Whether a stored key participates in global-cap aggregation. In the
    /// legacy phase, configuration-id series are ignored.
    pub fn includes_in_global(&self, key: &str) -> bool {
        match self.phase {
            MigrationPhase::ConfigKeyed => true,
            MigrationPhase::TypeKeyed => InterventionType::from_key(key).is_some(),
        }
    }
}

/// Persistent store for [`ActionsTimestamps`].
pub struct TimestampStore {
    storage: PromptStorage,
    retention_ms: i64,
    sink: Arc<dyn DiagnosticSink>,
    /// In-process mirror served when the backend has nothing for us.
    mirror: Mutex<ActionsTimestamps>,
    /// Serializes read-modify-write cycles so near-simultaneous events
    /// cannot drop each other's appends.
    write_lock: Mutex<()>,
}

impl TimestampStore {
    pub fn new(storage: PromptStorage, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            storage,
            retention_ms: WEEK_IN_MILLIS,
            sink,
            mirror: Mutex::new(ActionsTimestamps::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Convenience constructor over a bare backend, without key scoping.
    pub fn in_memory(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(PromptStorage::new(store, None), Arc::new(TracingSink))
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_ms = retention.as_millis() as i64;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Reads the persisted record, validated and pruned to the retention
    /// window. Malformed state is discarded wholesale and reported; an empty
    /// backend falls back to the in-process mirror.
    pub fn timestamps(&self, now_ms: Option<i64>) -> ActionsTimestamps {
        let now = now_ms.unwrap_or_else(now_millis);
        let raw = match self.storage.get(TIMESTAMPS_KEY) {
            Some(raw) => raw,
            None => {
                let mirror = self.mirror.lock().expect("mirror mutex poisoned");
                return self.pruned(&mirror, now);
            }
        };

        match serde_json::from_str::<ActionsTimestamps>(&raw) {
            Ok(map) => {
                let pruned = self.pruned(&map, now);
                *self.mirror.lock().expect("mirror mutex poisoned") = pruned.clone();
                pruned
            }
            Err(_) => {
                self.sink.record(Diagnostic::TimestampsParseError);
                ActionsTimestamps::new()
            }
        }
    }

    /// Serializes and persists the full mapping, unconditionally overwriting.
    pub fn set_timestamps(&self, map: &ActionsTimestamps) {
        if let Ok(json) = serde_json::to_string(map) {
            self.storage.set(TIMESTAMPS_KEY, &json);
        }
        *self.mirror.lock().expect("mirror mutex poisoned") = map.clone();
    }

    /// Appends one event for `key`, and for `secondary_key` when given (the
    /// selected configuration id, during key migration). `at_ms` defaults to
    /// the current time.
    pub fn record_event(
        &self,
        key: &str,
        kind: EventKind,
        secondary_key: Option<&str>,
        at_ms: Option<i64>,
    ) {
        let _guard = self.write_lock.lock().expect("write mutex poisoned");
        let at = at_ms.unwrap_or_else(now_millis);

        let mut map = self.timestamps(Some(at));
        map.entry(key.to_string()).or_default().push(kind, at);
        if let Some(secondary) = secondary_key {
            map.entry(secondary.to_string()).or_default().push(kind, at);
        }
        self.set_timestamps(&map);
    }

    /// Drops the whole record, persisted and mirrored.
    pub fn clear(&self) {
        self.storage.remove(TIMESTAMPS_KEY);
        self.mirror.lock().expect("mirror mutex poisoned").clear();
    }

    fn pruned(&self, map: &ActionsTimestamps, now_ms: i64) -> ActionsTimestamps {
        map.iter()
            .map(|(k, v)| (k.clone(), v.pruned(self.retention_ms, now_ms)))
            .collect()
    }
}
