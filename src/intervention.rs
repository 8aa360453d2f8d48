//! intervention.rs — Data model for candidate prompts and the publisher funnel.
//!
//! An article declares which interventions (subscription offer, contribution
//! ask, registration wall, newsletter sign-up, rewarded survey/ad, custom CTA)
//! are available, and the publisher orders them into a funnel with
//! closability, repeatability and per-prompt frequency-cap metadata. All of
//! these are immutable for the duration of one page view.

use serde::{Deserialize, Serialize};

/// Kinds of interventions an article can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterventionType {
    Contribution,
    Subscription,
    RegistrationWall,
    NewsletterSignup,
    RewardedSurvey,
    RewardedAd,
    CustomCta,
}

impl InterventionType {
    /// Stable string used as the legacy (type-keyed) timestamp storage key.
    pub fn as_key(&self) -> &'static str {
        match self {
            InterventionType::Contribution => "CONTRIBUTION",
            InterventionType::Subscription => "SUBSCRIPTION",
            InterventionType::RegistrationWall => "REGISTRATION_WALL",
            InterventionType::NewsletterSignup => "NEWSLETTER_SIGNUP",
            InterventionType::RewardedSurvey => "REWARDED_SURVEY",
            InterventionType::RewardedAd => "REWARDED_AD",
            InterventionType::CustomCta => "CUSTOM_CTA",
        }
    }

    /// Inverse of [`as_key`](Self::as_key); `None` for configuration-id keys.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "CONTRIBUTION" => Some(InterventionType::Contribution),
            "SUBSCRIPTION" => Some(InterventionType::Subscription),
            "REGISTRATION_WALL" => Some(InterventionType::RegistrationWall),
            "NEWSLETTER_SIGNUP" => Some(InterventionType::NewsletterSignup),
            "REWARDED_SURVEY" => Some(InterventionType::RewardedSurvey),
            "REWARDED_AD" => Some(InterventionType::RewardedAd),
            "CUSTOM_CTA" => Some(InterventionType::CustomCta),
            _ => None,
        }
    }

    /// Subscription and contribution prompts ask the reader for money.
    pub fn is_monetization(&self) -> bool {
        matches!(
            self,
            InterventionType::Subscription | InterventionType::Contribution
        )
    }
}

/// Rendering preference for interventions that have more than one
/// presentation or delivery integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptPreference {
    Default,
    /// Publisher supplies its own prompt markup.
    PublisherProvided,
    /// Rewarded ads delivered through the hosted ad network instead of the
    /// publisher's ad server.
    HostedAdNetwork,
}

/// A candidate prompt as declared by the article payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    #[serde(rename = "type")]
    pub intervention_type: InterventionType,
    /// Stable identity distinguishing multiple instances of the same type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference: Option<PromptPreference>,
    /// Server-reported count of prior completions for repeatable actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_completions: Option<u32>,
}

impl Intervention {
    pub fn new(intervention_type: InterventionType) -> Self {
        Self {
            intervention_type,
            configuration_id: None,
            preference: None,
            number_of_completions: None,
        }
    }

    pub fn with_config_id(mut self, id: impl Into<String>) -> Self {
        self.configuration_id = Some(id.into());
        self
    }

    pub fn with_preference(mut self, preference: PromptPreference) -> Self {
        self.preference = Some(preference);
        self
    }

    pub fn with_completions(mut self, count: u32) -> Self {
        self.number_of_completions = Some(count);
        self
    }
}

/// Whether a shown prompt can be dismissed without completing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Closability {
    /// Paywall-like; the reader must complete the action to continue.
    Blocking,
    Dismissible,
}

/// How often an intervention may be completed. Absent means once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Repeatability {
    Infinite,
    Finite {
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },
}

/// Duration of a frequency cap. A cap is configured only if at least one of
/// the two fields is non-zero; an all-zero duration means "no cap".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapDuration {
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub nanos: u32,
}

impl CapDuration {
    pub fn from_seconds(seconds: u64) -> Self {
        Self { seconds, nanos: 0 }
    }

    pub fn is_valid(&self) -> bool {
        self.seconds != 0 || self.nanos != 0
    }

    /// Millisecond equivalent; sub-millisecond nanos are floored away.
    pub fn as_millis(&self) -> i64 {
        self.seconds as i64 * 1000 + (self.nanos / 1_000_000) as i64
    }
}

/// One entry in the publisher-configured funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionOrchestration {
    pub config_id: String,
    #[serde(rename = "type")]
    pub intervention_type: InterventionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closability: Option<Closability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeatability: Option<Repeatability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_frequency_cap: Option<CapDuration>,
}

impl InterventionOrchestration {
    pub fn new(config_id: impl Into<String>, intervention_type: InterventionType) -> Self {
        Self {
            config_id: config_id.into(),
            intervention_type,
            closability: None,
            repeatability: None,
            prompt_frequency_cap: None,
        }
    }

    pub fn with_closability(mut self, closability: Closability) -> Self {
        self.closability = Some(closability);
        self
    }

    pub fn with_repeatability(mut self, repeatability: Repeatability) -> Self {
        self.repeatability = Some(repeatability);
        self
    }

    pub fn with_prompt_cap(mut self, cap: CapDuration) -> Self {
        self.prompt_frequency_cap = Some(cap);
        self
    }

    /// Maximum completions allowed before this entry drops out of the funnel.
    /// `None` means unbounded.
    pub fn max_completions(&self) -> Option<u32> {
        match self.repeatability {
            Some(Repeatability::Infinite) => None,
            Some(Repeatability::Finite { count }) => Some(count.unwrap_or(1)),
            None => Some(1),
        }
    }
}

/// Publisher-ordered priority list of interventions. Order is authoritative:
/// the first eligible, non-capped entry wins; there is no secondary sort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionFunnel {
    #[serde(default)]
    pub interventions: Vec<InterventionOrchestration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_frequency_cap: Option<CapDuration>,
}

/// Whether the page content is paywalled (CLOSED) or readable (OPEN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Open,
    Closed,
}

/// Legacy single-prompt configuration carried by the embed snippet.
/// Mini variants render as a banner, large variants as a full dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutoPromptType {
    None,
    Contribution,
    ContributionLarge,
    Subscription,
    SubscriptionLarge,
}

impl AutoPromptType {
    pub fn is_contribution(&self) -> bool {
        matches!(
            self,
            AutoPromptType::Contribution | AutoPromptType::ContributionLarge
        )
    }

    pub fn is_subscription(&self) -> bool {
        matches!(
            self,
            AutoPromptType::Subscription | AutoPromptType::SubscriptionLarge
        )
    }
}
