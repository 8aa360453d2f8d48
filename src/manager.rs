//! # Prompt Orchestration Manager
//! Top-level composition: one instance owns one page-view decision.
//!
//! Fetches client config, entitlements and the article concurrently through
//! injected sources, short-circuits on entitlement, then branches into the
//! legacy single-prompt path (no funnel configured) or the funnel path. The
//! winning selection is handed to an injected presenter, after the
//! configured display delay for dismissible prompts.
//!
//! Session state (content type, selected configuration id, demo flag) is
//! written here and read by the event router so later analytics events land
//! under the right storage keys.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::article::{Article, Entitlements, CONFIG_KEYED_TIMESTAMPS_FLAG};
use crate::client_config::ClientConfig;
use crate::eligibility::CapabilityProvider;
use crate::events::{DiagnosticSink, SharedSession};
use crate::history::{DecisionHistory, DecisionRecord};
use crate::intervention::{
    AutoPromptType, Closability, ContentType, Intervention, InterventionOrchestration,
    InterventionType,
};
use crate::selector::{select_orchestration, SelectionContext};
use crate::timestamps::{now_millis, KeyResolver, MigrationPhase, TimestampStore};

/// Options carried by the embed snippet for one page view.
#[derive(Debug, Clone, Copy)]
pub struct ShowPromptParams {
    pub auto_prompt_type: Option<AutoPromptType>,
    /// Manual override of display rules, for demo purposes. Requires a
    /// monetization auto-prompt type to be set.
    pub always_show: bool,
    pub content_type: ContentType,
}

/// The decision handed to the presentation layer. The engine does not know
/// or care how this gets rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSelection {
    #[serde(rename = "type")]
    pub intervention_type: InterventionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_prompt_type: Option<AutoPromptType>,
    pub closable: bool,
    /// Closability of the monetization flow a non-monetization prompt may
    /// hand off to.
    pub monetization_closable: bool,
}

#[async_trait]
pub trait ClientConfigSource: Send + Sync {
    async fn client_config(&self) -> Result<ClientConfig>;
}

#[async_trait]
pub trait EntitlementsSource: Send + Sync {
    async fn entitlements(&self) -> Result<Entitlements>;
    async fn article(&self) -> Result<Option<Article>>;
}

/// External "show" callback.
pub trait PromptPresenter: Send + Sync {
    fn show(&self, prompt: &PromptSelection);
}

/// Default presenter: a structured log line. Real embeds inject their own.
#[derive(Debug, Default)]
pub struct TracingPresenter;

impl PromptPresenter for TracingPresenter {
    fn show(&self, prompt: &PromptSelection) {
        tracing::info!(
            prompt_type = ?prompt.intervention_type,
            config_id = prompt.configuration_id.as_deref().unwrap_or(""),
            closable = prompt.closable,
            "showing prompt"
        );
    }
}

/// Fixed payloads standing in for the remote fetches; used per-request by
/// the HTTP surface and by tests.
pub struct StaticConfigSource(pub ClientConfig);

#[async_trait]
impl ClientConfigSource for StaticConfigSource {
    async fn client_config(&self) -> Result<ClientConfig> {
        Ok(self.0.clone())
    }
}

pub struct StaticEntitlementsSource {
    pub entitlements: Entitlements,
    pub article: Option<Article>,
}

#[async_trait]
impl EntitlementsSource for StaticEntitlementsSource {
    async fn entitlements(&self) -> Result<Entitlements> {
        Ok(self.entitlements.clone())
    }

    async fn article(&self) -> Result<Option<Article>> {
        Ok(self.article.clone())
    }
}

/// A display deferred by the configured delay. Cancel is a no-op once the
/// presenter has fired.
pub struct ScheduledDisplay {
    handle: JoinHandle<()>,
}

impl ScheduledDisplay {
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

/// Outcome of one page-view decision.
pub struct PromptDisplay {
    pub selection: PromptSelection,
    /// Present when the show was deferred by a display delay.
    pub scheduled: Option<ScheduledDisplay>,
}

pub struct PromptOrchestrationManager {
    config_source: Arc<dyn ClientConfigSource>,
    entitlements_source: Arc<dyn EntitlementsSource>,
    store: Arc<TimestampStore>,
    session: SharedSession,
    capabilities: Arc<dyn CapabilityProvider>,
    sink: Arc<dyn DiagnosticSink>,
    presenter: Arc<dyn PromptPresenter>,
    history: Arc<DecisionHistory>,
}

impl PromptOrchestrationManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config_source: Arc<dyn ClientConfigSource>,
        entitlements_source: Arc<dyn EntitlementsSource>,
        store: Arc<TimestampStore>,
        session: SharedSession,
        capabilities: Arc<dyn CapabilityProvider>,
        sink: Arc<dyn DiagnosticSink>,
        presenter: Arc<dyn PromptPresenter>,
        history: Arc<DecisionHistory>,
    ) -> Self {
        Self {
            config_source,
            entitlements_source,
            store,
            session,
            capabilities,
            sink,
            presenter,
            history,
        }
    }

    /// Runs the decision for one page view. Returns the selection (and a
    /// cancel handle when the show was deferred), or `None` when nothing
    /// qualifies to be shown.
    pub async fn show_auto_prompt(&self, params: ShowPromptParams) -> Result<Option<PromptDisplay>> {
        if params.auto_prompt_type == Some(AutoPromptType::None) {
            return Ok(None);
        }

        self.session
            .write()
            .expect("session lock poisoned")
            .content_type = Some(params.content_type);

        if params.always_show {
            return Ok(self.show_demo_prompt(params));
        }

        let (client_config, entitlements, article) = tokio::try_join!(
            self.config_source.client_config(),
            self.entitlements_source.entitlements(),
            self.entitlements_source.article(),
        )?;

        let Some(article) = article else {
            return Ok(None);
        };

        if article.preview_enabled {
            return Ok(self.show_preview_prompt(&article, params));
        }

        if !client_config.can_display_auto_prompt() || entitlements.enables_this() {
            self.history
                .push(DecisionRecord::nothing_shown(Some(params.content_type)));
            return Ok(None);
        }

        // Article actions win over the snippet in case of conflict, e.g.
        // when the publisher changed revenue model but not the snippet.
        let auto_prompt_type = resolve_auto_prompt_type(article.actions(), params.auto_prompt_type);

        let mut closable = params.content_type != ContentType::Closed;
        let selection: Option<PromptSelection> = if article.funnel().is_some() {
            let phase = if article.has_experiment(CONFIG_KEYED_TIMESTAMPS_FLAG) {
                MigrationPhase::ConfigKeyed
            } else {
                MigrationPhase::TypeKeyed
            };
            let now = now_millis();
            let timestamps = self.store.timestamps(Some(now));
            let next = select_orchestration(&SelectionContext {
                client_config: &client_config,
                article: &article,
                content_type: params.content_type,
                timestamps: &timestamps,
                resolver: KeyResolver::new(phase),
                capabilities: self.capabilities.as_ref(),
                sink: self.sink.as_ref(),
                now_ms: now,
            });

            next.and_then(|orchestration| {
                closable = orchestration_closable(&orchestration, params.content_type);
                let action = article
                    .actions()
                    .iter()
                    .find(|a| a.configuration_id.as_deref() == Some(orchestration.config_id.as_str()));
                action.map(|a| PromptSelection {
                    intervention_type: a.intervention_type,
                    configuration_id: a.configuration_id.clone(),
                    auto_prompt_type,
                    closable,
                    monetization_closable: closable,
                })
            })
        } else if params.content_type == ContentType::Closed {
            // Unexpected state with no orchestration configured: paywalled
            // content still shows an eligible subscription.
            article
                .find_action(InterventionType::Subscription)
                .map(|a| {
                    closable = false;
                    PromptSelection {
                        intervention_type: a.intervention_type,
                        configuration_id: a.configuration_id.clone(),
                        auto_prompt_type,
                        closable: false,
                        monetization_closable: false,
                    }
                })
        } else {
            None
        };

        let Some(mut selection) = selection else {
            self.history
                .push(DecisionRecord::nothing_shown(Some(params.content_type)));
            return Ok(None);
        };

        // The monetization flow a prompt may hand off to can carry its own
        // closability in the funnel.
        if auto_prompt_type.is_some_and(|t| t.is_contribution() || t.is_subscription()) {
            if let Some(entry) = article.funnel().and_then(|f| {
                f.interventions
                    .iter()
                    .find(|e| e.intervention_type.is_monetization())
            }) {
                selection.monetization_closable =
                    orchestration_closable(entry, params.content_type);
            }
        }

        {
            let mut session = self.session.write().expect("session lock poisoned");
            session.auto_prompt_type = auto_prompt_type;
            session.config_id = selection.configuration_id.clone();
        }

        self.history.push(DecisionRecord::shown(
            Some(params.content_type),
            selection.intervention_type,
            selection.configuration_id.clone(),
            selection.closable,
        ));

        // Dismissible prompts wait out the configured delay; blocking ones
        // show immediately.
        let delay = if selection.closable {
            Duration::from_secs(client_config.display_delay_seconds())
        } else {
            Duration::ZERO
        };

        let scheduled = if delay > Duration::ZERO {
            let presenter = self.presenter.clone();
            let deferred = selection.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                presenter.show(&deferred);
            });
            Some(ScheduledDisplay { handle })
        } else {
            self.presenter.show(&selection);
            None
        };

        Ok(Some(PromptDisplay {
            selection,
            scheduled,
        }))
    }

    /// Demo override (`always_show`): monetization prompt, immediately, with
    /// history writes reduced to the legacy type key.
    fn show_demo_prompt(&self, params: ShowPromptParams) -> Option<PromptDisplay> {
        let auto = params.auto_prompt_type?;
        let intervention_type = if auto.is_contribution() {
            InterventionType::Contribution
        } else if auto.is_subscription() {
            InterventionType::Subscription
        } else {
            return None;
        };
        let closable = params.content_type != ContentType::Closed;

        {
            let mut session = self.session.write().expect("session lock poisoned");
            session.demo_mode = true;
            session.auto_prompt_type = Some(auto);
        }

        let selection = PromptSelection {
            intervention_type,
            configuration_id: None,
            auto_prompt_type: Some(auto),
            closable,
            monetization_closable: closable,
        };
        self.presenter.show(&selection);
        self.history.push(DecisionRecord::shown(
            Some(params.content_type),
            selection.intervention_type,
            None,
            closable,
        ));
        Some(PromptDisplay {
            selection,
            scheduled: None,
        })
    }

    /// Onsite preview from the publisher console: first declared action,
    /// shown immediately, demo-mode persistence.
    fn show_preview_prompt(
        &self,
        article: &Article,
        params: ShowPromptParams,
    ) -> Option<PromptDisplay> {
        let action = article.actions().first()?;
        let auto_prompt_type = resolve_auto_prompt_type(article.actions(), params.auto_prompt_type);
        let closable = params.content_type != ContentType::Closed;

        {
            let mut session = self.session.write().expect("session lock poisoned");
            session.demo_mode = true;
            session.auto_prompt_type = auto_prompt_type;
        }

        let selection = PromptSelection {
            intervention_type: action.intervention_type,
            configuration_id: action.configuration_id.clone(),
            auto_prompt_type,
            closable,
            monetization_closable: closable,
        };
        self.presenter.show(&selection);
        self.history.push(DecisionRecord::shown(
            Some(params.content_type),
            selection.intervention_type,
            selection.configuration_id.clone(),
            closable,
        ));
        Some(PromptDisplay {
            selection,
            scheduled: None,
        })
    }
}

fn orchestration_closable(
    orchestration: &InterventionOrchestration,
    content_type: ContentType,
) -> bool {
    match orchestration.closability {
        Some(Closability::Blocking) => false,
        Some(Closability::Dismissible) => true,
        None => content_type != ContentType::Closed,
    }
}

/// Legacy monetization prompt type: determined by the first monetization
/// action the article declares; the banner (mini) variant is kept only when
/// the snippet asked for it.
fn resolve_auto_prompt_type(
    actions: &[Intervention],
    requested: Option<AutoPromptType>,
) -> Option<AutoPromptType> {
    let action = actions
        .iter()
        .find(|a| a.intervention_type.is_monetization())?;

    Some(match action.intervention_type {
        InterventionType::Contribution => {
            if requested == Some(AutoPromptType::Contribution) {
                AutoPromptType::Contribution
            } else {
                AutoPromptType::ContributionLarge
            }
        }
        _ => {
            if requested == Some(AutoPromptType::Subscription) {
                AutoPromptType::Subscription
            } else {
                AutoPromptType::SubscriptionLarge
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{ActionOrchestration, AudienceActions};
    use crate::eligibility::StaticCapabilities;
    use crate::events::{new_shared_session, RecordingSink};
    use crate::intervention::{CapDuration, InterventionFunnel};
    use crate::storage::MemoryStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPresenter {
        shown: Mutex<Vec<PromptSelection>>,
    }

    impl PromptPresenter for RecordingPresenter {
        fn show(&self, prompt: &PromptSelection) {
            self.shown
                .lock()
                .expect("presenter mutex poisoned")
                .push(prompt.clone());
        }
    }

    struct Harness {
        manager: PromptOrchestrationManager,
        presenter: Arc<RecordingPresenter>,
        session: SharedSession,
    }

    fn harness(config: ClientConfig, entitlements: Entitlements, article: Option<Article>) -> Harness {
        let presenter = Arc::new(RecordingPresenter::default());
        let session = new_shared_session();
        let manager = PromptOrchestrationManager::new(
            Arc::new(StaticConfigSource(config)),
            Arc::new(StaticEntitlementsSource {
                entitlements,
                article,
            }),
            Arc::new(TimestampStore::in_memory(Arc::new(MemoryStore::new()))),
            session.clone(),
            Arc::new(StaticCapabilities::all()),
            Arc::new(RecordingSink::new()),
            presenter.clone(),
            Arc::new(DecisionHistory::with_capacity(100)),
        );
        Harness {
            manager,
            presenter,
            session,
        }
    }

    fn subscription_article() -> Article {
        Article {
            audience_actions: Some(AudienceActions {
                actions: vec![
                    Intervention::new(InterventionType::Subscription).with_config_id("sub_1")
                ],
            }),
            action_orchestration: Some(ActionOrchestration {
                intervention_funnel: Some(InterventionFunnel {
                    interventions: vec![InterventionOrchestration::new(
                        "sub_1",
                        InterventionType::Subscription,
                    )
                    .with_closability(Closability::Blocking)],
                    global_frequency_cap: None,
                }),
            }),
            ..Article::default()
        }
    }

    fn open_params() -> ShowPromptParams {
        ShowPromptParams {
            auto_prompt_type: None,
            always_show: false,
            content_type: ContentType::Open,
        }
    }

    #[tokio::test]
    async fn entitled_reader_sees_nothing() {
        let h = harness(
            ClientConfig::default_seed(),
            Entitlements { enables_this: true },
            Some(subscription_article()),
        );
        let shown = h.manager.show_auto_prompt(open_params()).await.unwrap();
        assert!(shown.is_none());
        assert!(h.presenter.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_content_selects_blocking_subscription() {
        let h = harness(
            ClientConfig::default_seed(),
            Entitlements::default(),
            Some(subscription_article()),
        );
        let params = ShowPromptParams {
            content_type: ContentType::Closed,
            ..open_params()
        };
        let display = h.manager.show_auto_prompt(params).await.unwrap().unwrap();
        assert_eq!(
            display.selection.intervention_type,
            InterventionType::Subscription
        );
        assert_eq!(display.selection.configuration_id.as_deref(), Some("sub_1"));
        assert!(!display.selection.closable);
        // Blocking prompts show without delay.
        assert!(display.scheduled.is_none());
        assert_eq!(h.presenter.shown.lock().unwrap().len(), 1);
        // Later analytics events route under this configuration id.
        assert_eq!(
            h.session.read().unwrap().config_id.as_deref(),
            Some("sub_1")
        );
    }

    #[tokio::test]
    async fn disabled_predicate_shows_nothing() {
        let h = harness(
            ClientConfig::default(),
            Entitlements::default(),
            Some(subscription_article()),
        );
        assert!(h
            .manager
            .show_auto_prompt(open_params())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn legacy_closed_content_without_funnel_falls_back_to_subscription() {
        let article = Article {
            audience_actions: Some(AudienceActions {
                actions: vec![
                    Intervention::new(InterventionType::Subscription).with_config_id("sub_1")
                ],
            }),
            ..Article::default()
        };
        let h = harness(ClientConfig::default_seed(), Entitlements::default(), Some(article));
        let params = ShowPromptParams {
            content_type: ContentType::Closed,
            ..open_params()
        };
        let display = h.manager.show_auto_prompt(params).await.unwrap().unwrap();
        assert!(!display.selection.closable);
        assert_eq!(
            display.selection.intervention_type,
            InterventionType::Subscription
        );
    }

    #[tokio::test]
    async fn legacy_open_content_without_funnel_shows_nothing() {
        let article = Article {
            audience_actions: Some(AudienceActions {
                actions: vec![
                    Intervention::new(InterventionType::Subscription).with_config_id("sub_1")
                ],
            }),
            ..Article::default()
        };
        let h = harness(ClientConfig::default_seed(), Entitlements::default(), Some(article));
        assert!(h
            .manager
            .show_auto_prompt(open_params())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn always_show_is_demo_mode() {
        let h = harness(ClientConfig::default(), Entitlements::default(), None);
        let params = ShowPromptParams {
            auto_prompt_type: Some(AutoPromptType::ContributionLarge),
            always_show: true,
            content_type: ContentType::Open,
        };
        let display = h.manager.show_auto_prompt(params).await.unwrap().unwrap();
        assert_eq!(
            display.selection.intervention_type,
            InterventionType::Contribution
        );
        assert!(display.selection.closable);
        assert!(h.session.read().unwrap().demo_mode);
    }

    #[tokio::test]
    async fn display_delay_defers_and_cancels() {
        let mut config = ClientConfig::default_seed();
        if let Some(auto) = config.auto_prompt_config.as_mut() {
            auto.client_display_trigger = Some(crate::client_config::ClientDisplayTrigger {
                display_delay_seconds: 5,
            });
        }
        let article = Article {
            audience_actions: Some(AudienceActions {
                actions: vec![
                    Intervention::new(InterventionType::NewsletterSignup).with_config_id("news_1")
                ],
            }),
            action_orchestration: Some(ActionOrchestration {
                intervention_funnel: Some(InterventionFunnel {
                    interventions: vec![InterventionOrchestration::new(
                        "news_1",
                        InterventionType::NewsletterSignup,
                    )
                    .with_closability(Closability::Dismissible)
                    .with_prompt_cap(CapDuration::from_seconds(60))],
                    global_frequency_cap: None,
                }),
            }),
            ..Article::default()
        };

        let h = harness(config, Entitlements::default(), Some(article));
        let display = h.manager.show_auto_prompt(open_params()).await.unwrap().unwrap();
        let scheduled = display.scheduled.expect("dismissible prompt should defer");

        // Cancelled before the delay elapses: the presenter never fires.
        scheduled.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.presenter.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn preview_article_runs_in_demo_mode() {
        let mut article = subscription_article();
        article.preview_enabled = true;
        let h = harness(
            // Preview skips predicates entirely.
            ClientConfig::default(),
            Entitlements::default(),
            Some(article),
        );
        let display = h.manager.show_auto_prompt(open_params()).await.unwrap().unwrap();
        assert_eq!(
            display.selection.intervention_type,
            InterventionType::Subscription
        );
        assert!(h.session.read().unwrap().demo_mode);
    }

    #[test]
    fn auto_prompt_type_resolution() {
        let contribution =
            vec![Intervention::new(InterventionType::Contribution).with_config_id("c")];
        assert_eq!(
            resolve_auto_prompt_type(&contribution, Some(AutoPromptType::Contribution)),
            Some(AutoPromptType::Contribution)
        );
        assert_eq!(
            resolve_auto_prompt_type(&contribution, None),
            Some(AutoPromptType::ContributionLarge)
        );

        let survey = vec![Intervention::new(InterventionType::RewardedSurvey)];
        assert_eq!(resolve_auto_prompt_type(&survey, None), None);
    }
}
