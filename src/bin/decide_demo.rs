//! Demo that runs a funnel decision, dismisses the prompt, and decides again
//! to show the frequency cap kicking in (stdout/log only, in-memory store).

use std::sync::Arc;

use prompt_orchestrator::article::{ActionOrchestration, Article, AudienceActions, Entitlements};
use prompt_orchestrator::client_config::ClientConfig;
use prompt_orchestrator::eligibility::StaticCapabilities;
use prompt_orchestrator::events::{new_shared_session, AnalyticsEvent, EventRouter, TracingSink};
use prompt_orchestrator::history::DecisionHistory;
use prompt_orchestrator::intervention::{
    CapDuration, ContentType, Intervention, InterventionFunnel, InterventionOrchestration,
    InterventionType,
};
use prompt_orchestrator::manager::{
    PromptOrchestrationManager, ShowPromptParams, StaticConfigSource, StaticEntitlementsSource,
    TracingPresenter,
};
use prompt_orchestrator::storage::MemoryStore;
use prompt_orchestrator::timestamps::TimestampStore;

fn demo_article() -> Article {
    Article {
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
                .with_prompt_cap(CapDuration::from_seconds(3600))],
                global_frequency_cap: None,
            }),
        }),
        ..Article::default()
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let store = Arc::new(TimestampStore::in_memory(Arc::new(MemoryStore::new())));
    let session = new_shared_session();
    let events = EventRouter::new(store.clone(), session.clone());

    let manager = PromptOrchestrationManager::new(
        Arc::new(StaticConfigSource(ClientConfig::load_default())),
        Arc::new(StaticEntitlementsSource {
            entitlements: Entitlements::default(),
            article: Some(demo_article()),
        }),
        store.clone(),
        session,
        Arc::new(StaticCapabilities::all()),
        Arc::new(TracingSink),
        Arc::new(TracingPresenter),
        Arc::new(DecisionHistory::with_capacity(100)),
    );

    let params = ShowPromptParams {
        auto_prompt_type: None,
        always_show: false,
        content_type: ContentType::Open,
    };

    let first = manager.show_auto_prompt(params).await.expect("decision");
    println!(
        "first view: {:?}",
        first.as_ref().map(|d| d.selection.intervention_type)
    );

    // The reader closes the prompt; the dismissal lands in the store.
    events.handle(AnalyticsEvent::NewsletterOptInShown);
    events.handle(AnalyticsEvent::NewsletterOptInClosed);

    let second = manager.show_auto_prompt(params).await.expect("decision");
    println!(
        "second view (within cap): {:?}",
        second.as_ref().map(|d| d.selection.intervention_type)
    );

    println!("decide-demo done");
}
