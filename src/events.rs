//! events.rs — Analytics event routing and the diagnostic vocabulary.
//!
//! The presentation layer reports what actually happened on screen as a
//! stream of analytics events. The router classifies them into impressions,
//! dismissals and completions per intervention, applies the session flags
//! (manual-trigger suppression, monetization impression dedup, demo mode,
//! paygated content), and feeds the timestamp store so future page views see
//! the history.
//!
//! Diagnostics are the engine's own outbound events: a fixed vocabulary of
//! identifiers with no payload, handed to an injected sink.

use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::intervention::{AutoPromptType, ContentType, InterventionType};
use crate::timestamps::{EventKind, TimestampStore};

/// Engine-emitted diagnostic identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    FrequencyCapConfigNotFound,
    PromptFrequencyCapMet,
    GlobalFrequencyCapMet,
    PromptCapFallbackToDefault,
    CompletionCountMissing,
    TimestampsParseError,
    SurveyAnalyticsFiltered,
    RewardedAdHostedNetworkFiltered,
    RewardedAdAdServerFiltered,
}

impl Diagnostic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Diagnostic::FrequencyCapConfigNotFound => "frequency_cap_config_not_found",
            Diagnostic::PromptFrequencyCapMet => "prompt_frequency_cap_met",
            Diagnostic::GlobalFrequencyCapMet => "global_frequency_cap_met",
            Diagnostic::PromptCapFallbackToDefault => "prompt_cap_fallback_to_default",
            Diagnostic::CompletionCountMissing => "completion_count_missing",
            Diagnostic::TimestampsParseError => "timestamps_parse_error",
            Diagnostic::SurveyAnalyticsFiltered => "survey_analytics_filtered",
            Diagnostic::RewardedAdHostedNetworkFiltered => "rewarded_ad_hosted_network_filtered",
            Diagnostic::RewardedAdAdServerFiltered => "rewarded_ad_ad_server_filtered",
        }
    }
}

/// Outbound seam to the analytics collaborator.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

/// Default sink: structured log line plus a labelled counter.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: Diagnostic) {
        tracing::debug!(target: "diagnostics", event = diagnostic.as_str());
        metrics::counter!("prompt_diagnostic_events_total", "event" => diagnostic.as_str())
            .increment(1);
    }
}

/// Captures diagnostics in memory; used by tests and embedders that forward
/// them over their own transport.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.events.lock().expect("sink mutex poisoned"))
    }

    pub fn contains(&self, diagnostic: Diagnostic) -> bool {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .contains(&diagnostic)
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, diagnostic: Diagnostic) {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(diagnostic);
    }
}

/// Inbound analytics events from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsEvent {
    // Impressions. The mini variants are the banner form of the monetization
    // prompts; banner and dialog count as one impression per page view.
    ContributionMiniPromptShown,
    SubscriptionMiniPromptShown,
    ContributionOffersShown,
    SubscriptionOffersShown,
    NewsletterOptInShown,
    RegistrationWallShown,
    SurveyShown,
    RewardedAdShown,
    CustomCtaShown,

    // Dismissals.
    ContributionMiniPromptClosed,
    SubscriptionMiniPromptClosed,
    ContributionOffersClosed,
    SubscriptionOffersClosed,
    NewsletterOptInClosed,
    RegistrationWallClosed,
    SurveyClosed,
    RewardedAdClosed,
    CustomCtaClosed,

    // Completions.
    ContributionPaymentComplete,
    SubscriptionPaymentComplete,
    NewsletterOptInSubmitted,
    RegistrationWallOptIn,
    SurveySubmitted,
    RewardedAdViewed,
    CustomCtaClicked,

    /// Generic completion signal not tied to one intervention; attributed to
    /// the active monetization prompt type.
    PaymentFailed,

    // Manual CTA-button triggers; prompts opened this way do not count
    // toward frequency caps.
    ShowOffersButtonClick,
    ShowContributionsButtonClick,
}

pub fn impression_action(event: AnalyticsEvent) -> Option<InterventionType> {
    use AnalyticsEvent::*;
    match event {
        ContributionMiniPromptShown | ContributionOffersShown => {
            Some(InterventionType::Contribution)
        }
        SubscriptionMiniPromptShown | SubscriptionOffersShown => {
            Some(InterventionType::Subscription)
        }
        NewsletterOptInShown => Some(InterventionType::NewsletterSignup),
        RegistrationWallShown => Some(InterventionType::RegistrationWall),
        SurveyShown => Some(InterventionType::RewardedSurvey),
        RewardedAdShown => Some(InterventionType::RewardedAd),
        CustomCtaShown => Some(InterventionType::CustomCta),
        _ => None,
    }
}

pub fn dismissal_action(event: AnalyticsEvent) -> Option<InterventionType> {
    use AnalyticsEvent::*;
    match event {
        ContributionMiniPromptClosed | ContributionOffersClosed => {
            Some(InterventionType::Contribution)
        }
        SubscriptionMiniPromptClosed | SubscriptionOffersClosed => {
            Some(InterventionType::Subscription)
        }
        NewsletterOptInClosed => Some(InterventionType::NewsletterSignup),
        RegistrationWallClosed => Some(InterventionType::RegistrationWall),
        SurveyClosed => Some(InterventionType::RewardedSurvey),
        RewardedAdClosed => Some(InterventionType::RewardedAd),
        CustomCtaClosed => Some(InterventionType::CustomCta),
        _ => None,
    }
}

pub fn completion_action(event: AnalyticsEvent) -> Option<InterventionType> {
    use AnalyticsEvent::*;
    match event {
        ContributionPaymentComplete => Some(InterventionType::Contribution),
        SubscriptionPaymentComplete => Some(InterventionType::Subscription),
        NewsletterOptInSubmitted => Some(InterventionType::NewsletterSignup),
        RegistrationWallOptIn => Some(InterventionType::RegistrationWall),
        SurveySubmitted => Some(InterventionType::RewardedSurvey),
        RewardedAdViewed => Some(InterventionType::RewardedAd),
        CustomCtaClicked => Some(InterventionType::CustomCta),
        _ => None,
    }
}

pub fn is_generic_completion(event: AnalyticsEvent) -> bool {
    matches!(event, AnalyticsEvent::PaymentFailed)
}

pub fn is_cta_click(event: AnalyticsEvent) -> bool {
    matches!(
        event,
        AnalyticsEvent::ShowOffersButtonClick | AnalyticsEvent::ShowContributionsButtonClick
    )
}

/// Monetization impressions arrive once from the banner and once from the
/// dialog form; only the first per page view is persisted.
pub fn is_monetization_impression(event: AnalyticsEvent) -> bool {
    matches!(
        event,
        AnalyticsEvent::ContributionMiniPromptShown
            | AnalyticsEvent::SubscriptionMiniPromptShown
            | AnalyticsEvent::ContributionOffersShown
            | AnalyticsEvent::SubscriptionOffersShown
    )
}

/// Per-page-view state shared between the orchestration manager (writer)
/// and the event router (reader).
#[derive(Debug, Default)]
pub struct Session {
    pub content_type: Option<ContentType>,
    pub auto_prompt_type: Option<AutoPromptType>,
    /// Configuration id of the prompt selected for this view; analytics
    /// events are dual-written under this key during key migration.
    pub config_id: Option<String>,
    /// Demo/preview: run the full decision logic, suppress configuration-id
    /// history writes.
    pub demo_mode: bool,
    pub prompt_from_cta: bool,
    pub stored_monetization_impression: bool,
}

pub type SharedSession = Arc<RwLock<Session>>;

pub fn new_shared_session() -> SharedSession {
    Arc::new(RwLock::new(Session::default()))
}

/// Classifies inbound analytics events and persists qualifying ones.
pub struct EventRouter {
    store: Arc<TimestampStore>,
    session: SharedSession,
}

impl EventRouter {
    pub fn new(store: Arc<TimestampStore>, session: SharedSession) -> Self {
        Self { store, session }
    }

    pub fn handle(&self, event: AnalyticsEvent) {
        if is_cta_click(event) {
            self.session
                .write()
                .expect("session lock poisoned")
                .prompt_from_cta = true;
            return;
        }

        let mut session = self.session.write().expect("session lock poisoned");

        // Paygated content never counts toward frequency caps.
        if session.content_type == Some(ContentType::Closed) {
            return;
        }

        if let Some(action) = impression_action(event) {
            // Prompts the reader opened manually are not auto-prompt
            // impressions.
            if session.prompt_from_cta {
                return;
            }
            if is_monetization_impression(event) {
                if session.stored_monetization_impression {
                    return;
                }
                session.stored_monetization_impression = true;
            }
            self.record(action.as_key(), EventKind::Impression, &session);
        } else if let Some(action) = dismissal_action(event) {
            self.record(action.as_key(), EventKind::Dismissal, &session);
        } else if let Some(action) = completion_action(event) {
            self.record(action.as_key(), EventKind::Completion, &session);
        } else if is_generic_completion(event) {
            match session.auto_prompt_type {
                Some(t) if t.is_contribution() => self.record(
                    InterventionType::Contribution.as_key(),
                    EventKind::Completion,
                    &session,
                ),
                Some(t) if t.is_subscription() => self.record(
                    InterventionType::Subscription.as_key(),
                    EventKind::Completion,
                    &session,
                ),
                _ => {}
            }
        }
    }

    fn record(&self, key: &str, kind: EventKind, session: &Session) {
        let secondary = if session.demo_mode {
            None
        } else {
            session.config_id.as_deref()
        };
        self.store.record_event(key, kind, secondary, None);
    }
}
