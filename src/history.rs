//! history.rs — in-memory log of recent prompt decisions for diagnostics.

use std::sync::Mutex;

use serde::Serialize;

use crate::intervention::{ContentType, InterventionType};
use crate::timestamps::now_millis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub ts_millis: i64,
    pub content_type: Option<ContentType>,
    /// `None` means no prompt was shown for this page view.
    pub intervention_type: Option<InterventionType>,
    pub configuration_id: Option<String>,
    pub closable: Option<bool>,
}

impl DecisionRecord {
    pub fn nothing_shown(content_type: Option<ContentType>) -> Self {
        Self {
            ts_millis: now_millis(),
            content_type,
            intervention_type: None,
            configuration_id: None,
            closable: None,
        }
    }

    pub fn shown(
        content_type: Option<ContentType>,
        intervention_type: InterventionType,
        configuration_id: Option<String>,
        closable: bool,
    ) -> Self {
        Self {
            ts_millis: now_millis(),
            content_type,
            intervention_type: Some(intervention_type),
            configuration_id,
            closable: Some(closable),
        }
    }
}

#[derive(Debug)]
pub struct DecisionHistory {
    inner: Mutex<Vec<DecisionRecord>>,
    cap: usize,
}

impl DecisionHistory {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(cap.min(10_000))),
            cap: cap.min(10_000),
        }
    }

    pub fn push(&self, record: DecisionRecord) {
        let mut v = self.inner.lock().expect("history mutex poisoned");
        v.push(record);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<DecisionRecord> {
        let v = self.inner.lock().expect("history mutex poisoned");
        let len = v.len();
        let start = len.saturating_sub(n);
        v[start..].to_vec()
    }
}
