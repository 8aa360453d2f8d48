//! # Orchestration Selector
//! Pure, testable logic that walks the publisher funnel and returns at most
//! one intervention to present. No I/O; all inputs, including the clock,
//! arrive as arguments.
//!
//! Policy: funnel order is authoritative priority. An entry survives when it
//! is client-side eligible, has repeatability budget left, is purchasable in
//! the reader's region, and is not frequency-capped. Paywalled (CLOSED)
//! content bypasses cap evaluation entirely. The per-prompt cap is evaluated
//! before the global cap so "capped on this prompt" and "no prompts left"
//! stay distinguishable in the diagnostics.

use std::collections::{HashMap, HashSet};

use crate::article::Article;
use crate::client_config::ClientConfig;
use crate::eligibility::{is_action_eligible, CapabilityProvider};
use crate::events::{Diagnostic, DiagnosticSink};
use crate::frequency_cap::{global_cap_duration, is_capped, is_config_valid, prompt_cap_duration};
use crate::intervention::{
    Closability, ContentType, InterventionOrchestration, Repeatability,
};
use crate::timestamps::{ActionsTimestamps, KeyResolver};

/// Everything one selection needs, borrowed for the duration of the call.
pub struct SelectionContext<'a> {
    pub client_config: &'a ClientConfig,
    pub article: &'a Article,
    pub content_type: ContentType,
    pub timestamps: &'a ActionsTimestamps,
    pub resolver: KeyResolver,
    pub capabilities: &'a dyn CapabilityProvider,
    pub sink: &'a dyn DiagnosticSink,
    pub now_ms: i64,
}

/// Walks the funnel and returns the entry to present next, or `None`.
pub fn select_orchestration(ctx: &SelectionContext) -> Option<InterventionOrchestration> {
    let actions = ctx.article.actions();
    let funnel = ctx.article.funnel()?;
    if actions.is_empty() || funnel.interventions.is_empty() {
        return None;
    }

    // Client-side eligibility over the article's declared actions.
    let eligible_ids: HashSet<&str> = actions
        .iter()
        .filter(|action| {
            is_action_eligible(action, ctx.timestamps, &ctx.resolver, ctx.capabilities, ctx.sink)
        })
        .filter_map(|action| action.configuration_id.as_deref())
        .collect();
    if eligible_ids.is_empty() {
        return None;
    }

    let completions_by_id: HashMap<&str, u32> = actions
        .iter()
        .filter_map(|action| {
            Some((
                action.configuration_id.as_deref()?,
                action.number_of_completions?,
            ))
        })
        .collect();

    let candidates: Vec<&InterventionOrchestration> = funnel
        .interventions
        .iter()
        .filter(|entry| is_entry_admissible(ctx, entry, &eligible_ids, &completions_by_id))
        .collect();
    if candidates.is_empty() {
        return None;
    }

    // Paywalled content shows its first candidate regardless of history;
    // capping applies only to dismissible/open-content flows.
    if ctx.content_type == ContentType::Closed {
        return Some(candidates[0].clone());
    }

    let cap_config = ctx.client_config.frequency_cap_config();
    let Some(cap_config) = cap_config.filter(|c| is_config_valid(c)) else {
        ctx.sink.record(Diagnostic::FrequencyCapConfigNotFound);
        return Some(candidates[0].clone());
    };

    // Per-prompt caps first: the first non-capped entry wins.
    let mut winner: Option<&InterventionOrchestration> = None;
    for &entry in &candidates {
        if let Some(duration) = prompt_cap_duration(cap_config, entry, ctx.sink) {
            if duration.is_valid() {
                let series = prompt_cap_timestamps(ctx, entry);
                if is_capped(duration, &series, ctx.now_ms) {
                    ctx.sink.record(Diagnostic::PromptFrequencyCapMet);
                    continue;
                }
            }
        }
        winner = Some(entry);
        break;
    }
    let winner = winner?;

    if let Some(duration) = global_cap_duration(cap_config, funnel) {
        if duration.is_valid() {
            let series = global_cap_timestamps(ctx, winner);
            if is_capped(duration, &series, ctx.now_ms) {
                ctx.sink.record(Diagnostic::GlobalFrequencyCapMet);
                return None;
            }
        }
    }
    Some(winner.clone())
}

fn is_entry_admissible(
    ctx: &SelectionContext,
    entry: &InterventionOrchestration,
    eligible_ids: &HashSet<&str>,
    completions_by_id: &HashMap<&str, u32>,
) -> bool {
    if !eligible_ids.contains(entry.config_id.as_str()) {
        return false;
    }

    if let Some(max_completions) = entry.max_completions() {
        let completions = match completions_by_id.get(entry.config_id.as_str()) {
            Some(&n) => n,
            None => {
                if matches!(entry.repeatability, Some(Repeatability::Finite { .. })) {
                    ctx.sink.record(Diagnostic::CompletionCountMissing);
                }
                0
            }
        };
        if completions >= max_completions {
            return false;
        }
    }

    // Don't show readers a dismissible purchase CTA they cannot complete.
    let reader_cannot_purchase = ctx.client_config.purchase_unavailable_region()
        && entry.intervention_type.is_monetization();
    let is_dismissible = ctx.content_type != ContentType::Closed
        || entry.closability == Some(Closability::Dismissible);
    if is_dismissible && reader_cannot_purchase {
        return false;
    }

    true
}

/// Qualifying history for one entry's own cap: blocking prompts can only be
/// completed, so only completions count; dismissible ones count dismissals
/// and completions.
fn prompt_cap_timestamps(ctx: &SelectionContext, entry: &InterventionOrchestration) -> Vec<i64> {
    let series = ctx.timestamps.get(ctx.resolver.orchestration_key(entry));
    match series {
        None => Vec::new(),
        Some(t) if entry.closability == Some(Closability::Blocking) => t.completions.clone(),
        Some(t) => t
            .dismissals
            .iter()
            .chain(t.completions.iter())
            .copied()
            .collect(),
    }
}

/// Qualifying history for the funnel-level cap, aggregated across actions.
/// The winner's own series contributes completions (completed repeatable
/// actions count toward the global cap); every other series contributes
/// impressions. Which keys participate depends on the migration phase.
fn global_cap_timestamps(ctx: &SelectionContext, winner: &InterventionOrchestration) -> Vec<i64> {
    let winner_type_key = winner.intervention_type.as_key();
    let mut out = Vec::new();
    for (key, series) in ctx.timestamps {
        if !ctx.resolver.includes_in_global(key) {
            continue;
        }
        let use_completions = key == &winner.config_id || key == winner_type_key;
        if use_completions {
            out.extend_from_slice(&series.completions);
        } else {
            out.extend_from_slice(&series.impressions);
        }
    }
    out
}
