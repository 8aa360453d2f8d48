//! eligibility.rs — Per-candidate checks independent of frequency caps.
//!
//! Surveys need a working analytics integration to report results through,
//! and are at-most-once per reader no matter what the repeatability config
//! says. Rewarded ads need their delivery integration loaded. Everything
//! else is eligible by default.
//!
//! Capability probing is behind an injected provider so the filter never
//! touches a concrete third-party library's object shape.

use serde::{Deserialize, Serialize};

use crate::events::{Diagnostic, DiagnosticSink};
use crate::intervention::{Intervention, InterventionType, PromptPreference};
use crate::timestamps::{ActionsTimestamps, KeyResolver};

/// Analytics integrations a hosting page may carry; any one of them makes
/// survey reporting possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsIntegration {
    PageAnalytics,
    GlobalSiteTag,
    TagManager,
}

/// Rewarded-ad delivery integrations, selected by the intervention's
/// preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdIntegration {
    HostedNetwork,
    AdServer,
}

/// Readiness probe for the hosting page's third-party integrations.
pub trait CapabilityProvider: Send + Sync {
    fn analytics_ready(&self, integration: AnalyticsIntegration) -> bool;
    fn ad_integration_ready(&self, integration: AdIntegration) -> bool;
}

/// Capability flags supplied directly by the caller, e.g. from the embed's
/// own probing of the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaticCapabilities {
    pub page_analytics: bool,
    pub global_site_tag: bool,
    pub tag_manager: bool,
    pub hosted_network_ready: bool,
    pub ad_server_ready: bool,
}

impl StaticCapabilities {
    /// Everything available; convenient for demos and tests.
    pub fn all() -> Self {
        Self {
            page_analytics: true,
            global_site_tag: true,
            tag_manager: true,
            hosted_network_ready: true,
            ad_server_ready: true,
        }
    }
}

impl CapabilityProvider for StaticCapabilities {
    fn analytics_ready(&self, integration: AnalyticsIntegration) -> bool {
        match integration {
            AnalyticsIntegration::PageAnalytics => self.page_analytics,
            AnalyticsIntegration::GlobalSiteTag => self.global_site_tag,
            AnalyticsIntegration::TagManager => self.tag_manager,
        }
    }

    fn ad_integration_ready(&self, integration: AdIntegration) -> bool {
        match integration {
            AdIntegration::HostedNetwork => self.hosted_network_ready,
            AdIntegration::AdServer => self.ad_server_ready,
        }
    }
}

/// Client-side eligibility for one declared action, evaluated before any
/// frequency-cap logic. Note: passing does not guarantee the integration
/// APIs stay available at render time.
pub fn is_action_eligible(
    action: &Intervention,
    timestamps: &ActionsTimestamps,
    resolver: &KeyResolver,
    capabilities: &dyn CapabilityProvider,
    sink: &dyn DiagnosticSink,
) -> bool {
    match action.intervention_type {
        InterventionType::RewardedSurvey => {
            let analytics_ready = capabilities.analytics_ready(AnalyticsIntegration::PageAnalytics)
                || capabilities.analytics_ready(AnalyticsIntegration::GlobalSiteTag)
                || capabilities.analytics_ready(AnalyticsIntegration::TagManager);
            if !analytics_ready {
                sink.record(Diagnostic::SurveyAnalyticsFiltered);
                return false;
            }
            // One completion ever, regardless of repeatability config. This
            // is checked client-side to survive identity transitions after
            // sign-in.
            let completions = timestamps
                .get(resolver.action_key(action))
                .map(|t| t.completions.as_slice())
                .unwrap_or_default();
            completions.is_empty()
        }
        InterventionType::RewardedAd => {
            if action.preference == Some(PromptPreference::HostedAdNetwork) {
                if !capabilities.ad_integration_ready(AdIntegration::HostedNetwork) {
                    sink.record(Diagnostic::RewardedAdHostedNetworkFiltered);
                    return false;
                }
            } else if !capabilities.ad_integration_ready(AdIntegration::AdServer) {
                sink.record(Diagnostic::RewardedAdAdServerFiltered);
                return false;
            }
            true
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::timestamps::{ActionTimestamps, MigrationPhase};

    fn survey() -> Intervention {
        Intervention::new(InterventionType::RewardedSurvey).with_config_id("survey_a")
    }

    fn type_keyed() -> KeyResolver {
        KeyResolver::new(MigrationPhase::TypeKeyed)
    }

    #[test]
    fn survey_needs_some_analytics_integration() {
        let sink = RecordingSink::new();
        let none = StaticCapabilities::default();
        assert!(!is_action_eligible(
            &survey(),
            &ActionsTimestamps::new(),
            &type_keyed(),
            &none,
            &sink
        ));
        assert!(sink.contains(Diagnostic::SurveyAnalyticsFiltered));

        let tag_manager_only = StaticCapabilities {
            tag_manager: true,
            ..StaticCapabilities::default()
        };
        assert!(is_action_eligible(
            &survey(),
            &ActionsTimestamps::new(),
            &type_keyed(),
            &tag_manager_only,
            &RecordingSink::new()
        ));
    }

    #[test]
    fn completed_survey_never_comes_back() {
        let mut ts = ActionsTimestamps::new();
        ts.insert(
            "REWARDED_SURVEY".to_string(),
            ActionTimestamps {
                completions: vec![1_000],
                ..ActionTimestamps::default()
            },
        );
        assert!(!is_action_eligible(
            &survey(),
            &ts,
            &type_keyed(),
            &StaticCapabilities::all(),
            &RecordingSink::new()
        ));
    }

    #[test]
    fn survey_completion_check_follows_migration_phase() {
        // History only under the configuration id.
        let mut ts = ActionsTimestamps::new();
        ts.insert(
            "survey_a".to_string(),
            ActionTimestamps {
                completions: vec![1_000],
                ..ActionTimestamps::default()
            },
        );

        // Legacy phase reads the type key and sees nothing.
        assert!(is_action_eligible(
            &survey(),
            &ts,
            &type_keyed(),
            &StaticCapabilities::all(),
            &RecordingSink::new()
        ));
        // Config-keyed phase sees the completion.
        assert!(!is_action_eligible(
            &survey(),
            &ts,
            &KeyResolver::new(MigrationPhase::ConfigKeyed),
            &StaticCapabilities::all(),
            &RecordingSink::new()
        ));
    }

    #[test]
    fn rewarded_ad_integration_gates() {
        let sink = RecordingSink::new();
        let ad = Intervention::new(InterventionType::RewardedAd);
        let none = StaticCapabilities::default();
        assert!(!is_action_eligible(
            &ad,
            &ActionsTimestamps::new(),
            &type_keyed(),
            &none,
            &sink
        ));
        assert!(sink.contains(Diagnostic::RewardedAdAdServerFiltered));

        let hosted = ad.clone().with_preference(PromptPreference::HostedAdNetwork);
        let sink2 = RecordingSink::new();
        assert!(!is_action_eligible(
            &hosted,
            &ActionsTimestamps::new(),
            &type_keyed(),
            &none,
            &sink2
        ));
        assert!(sink2.contains(Diagnostic::RewardedAdHostedNetworkFiltered));

        let server_ready = StaticCapabilities {
            ad_server_ready: true,
            ..StaticCapabilities::default()
        };
        assert!(is_action_eligible(
            &ad,
            &ActionsTimestamps::new(),
            &type_keyed(),
            &server_ready,
            &RecordingSink::new()
        ));
    }

    #[test]
    fn other_types_are_eligible_by_default() {
        let newsletter = Intervention::new(InterventionType::NewsletterSignup);
        assert!(is_action_eligible(
            &newsletter,
            &ActionsTimestamps::new(),
            &type_keyed(),
            &StaticCapabilities::default(),
            &RecordingSink::new()
        ));
    }
}
