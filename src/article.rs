//! article.rs — External inputs fetched fresh per page view.
//!
//! The article payload carries the available interventions and the publisher
//! funnel; entitlements tell us whether the reader already has access. Both
//! are read-only collaborators of the decision engine.

use serde::{Deserialize, Serialize};

use crate::intervention::{Intervention, InterventionFunnel, InterventionType};

/// Experiment flag enabling configuration-id-keyed frequency-cap history.
/// While absent, history stays keyed by intervention type.
pub const CONFIG_KEYED_TIMESTAMPS_FLAG: &str = "CONFIG_KEYED_TIMESTAMPS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceActions {
    #[serde(default)]
    pub actions: Vec<Intervention>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOrchestration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervention_funnel: Option<InterventionFunnel>,
}

/// Article payload for a single page view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience_actions: Option<AudienceActions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_orchestration: Option<ActionOrchestration>,
    /// Preview rendering requested by the publisher console; runs the full
    /// decision logic but suppresses configuration-id history writes.
    #[serde(default)]
    pub preview_enabled: bool,
    #[serde(default)]
    pub experiment_flags: Vec<String>,
}

impl Article {
    pub fn actions(&self) -> &[Intervention] {
        self.audience_actions
            .as_ref()
            .map(|a| a.actions.as_slice())
            .unwrap_or_default()
    }

    pub fn funnel(&self) -> Option<&InterventionFunnel> {
        self.action_orchestration
            .as_ref()
            .and_then(|o| o.intervention_funnel.as_ref())
    }

    pub fn has_experiment(&self, flag: &str) -> bool {
        self.experiment_flags.iter().any(|f| f == flag)
    }

    /// First declared action of the given type, if any.
    pub fn find_action(&self, intervention_type: InterventionType) -> Option<&Intervention> {
        self.actions()
            .iter()
            .find(|a| a.intervention_type == intervention_type)
    }
}

/// Reader entitlement state for the current publication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlements {
    #[serde(default)]
    pub enables_this: bool,
}

impl Entitlements {
    /// True when the reader already holds an entitlement that satisfies this
    /// page; no prompt should be shown in that case.
    pub fn enables_this(&self) -> bool {
        self.enables_this
    }
}
