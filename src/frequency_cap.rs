//! frequency_cap.rs — Pure frequency-cap evaluation.
//!
//! A cap suppresses a prompt while too little time has passed since the last
//! qualifying event. Everything here is a pure function of its inputs; `now`
//! is always passed in explicitly so the laws are testable at exact instants.

use crate::client_config::FrequencyCapConfig;
use crate::events::{Diagnostic, DiagnosticSink};
use crate::intervention::{CapDuration, InterventionFunnel, InterventionOrchestration};

/// True when the most recent timestamp is still inside the cap window.
/// Empty history is never capped; the boundary instant itself is no longer
/// capped (strict comparison).
pub fn is_capped(duration: &CapDuration, timestamps: &[i64], now_ms: i64) -> bool {
    let Some(last) = timestamps.iter().max().copied() else {
        return false;
    };
    now_ms - last < duration.as_millis()
}

/// Cap duration for one funnel entry: the entry's own cap wins; otherwise
/// fall back to the platform-wide any-prompt default, noting the fallback.
/// Neither configured means no cap.
pub fn prompt_cap_duration<'a>(
    config: &'a FrequencyCapConfig,
    orchestration: &'a InterventionOrchestration,
    sink: &dyn DiagnosticSink,
) -> Option<&'a CapDuration> {
    if let Some(duration) = orchestration.prompt_frequency_cap.as_ref() {
        return Some(duration);
    }
    sink.record(Diagnostic::PromptCapFallbackToDefault);
    config
        .any_prompt_frequency_cap
        .as_ref()
        .and_then(|cap| cap.duration())
}

/// Global cap duration: the funnel's own cap wins over the config default.
pub fn global_cap_duration<'a>(
    config: &'a FrequencyCapConfig,
    funnel: &'a InterventionFunnel,
) -> Option<&'a CapDuration> {
    funnel.global_frequency_cap.as_ref().or_else(|| {
        config
            .global_frequency_cap
            .as_ref()
            .and_then(|cap| cap.duration())
    })
}

/// A cap system with no valid duration anywhere is treated as disabled:
/// the first eligible candidate is admitted unconditionally.
pub fn is_config_valid(config: &FrequencyCapConfig) -> bool {
    let valid = |cap: &Option<crate::client_config::FrequencyCap>| {
        cap.as_ref()
            .and_then(|c| c.duration())
            .is_some_and(CapDuration::is_valid)
    };
    valid(&config.global_frequency_cap)
        || valid(&config.any_prompt_frequency_cap)
        || config
            .prompt_frequency_caps
            .iter()
            .any(|cap| cap.duration().is_some_and(CapDuration::is_valid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_config::FrequencyCap;
    use crate::events::RecordingSink;
    use crate::intervention::InterventionType;

    #[test]
    fn empty_history_is_never_capped() {
        let hour = CapDuration::from_seconds(3600);
        assert!(!is_capped(&hour, &[], 0));
        assert!(!is_capped(&hour, &[], i64::MAX));
    }

    #[test]
    fn boundary_is_exclusive() {
        let cap = CapDuration::from_seconds(1);
        // Exactly at the boundary: no longer capped.
        assert!(!is_capped(&cap, &[1_000], 2_000));
        // One millisecond earlier: still capped.
        assert!(is_capped(&cap, &[1_000], 1_999));
    }

    #[test]
    fn most_recent_timestamp_governs() {
        let cap = CapDuration::from_seconds(10);
        // Unsorted input; the max is what matters.
        assert!(is_capped(&cap, &[9_000, 1_000, 5_000], 10_000));
        assert!(!is_capped(&cap, &[9_000, 1_000, 5_000], 19_000));
    }

    #[test]
    fn nanos_contribute_to_the_window() {
        let cap = CapDuration {
            seconds: 0,
            nanos: 2_000_000, // 2ms
        };
        assert!(is_capped(&cap, &[1_000], 1_001));
        assert!(!is_capped(&cap, &[1_000], 1_002));
    }

    #[test]
    fn prompt_cap_prefers_own_duration() {
        let sink = RecordingSink::new();
        let config = FrequencyCapConfig {
            any_prompt_frequency_cap: Some(FrequencyCap::of(CapDuration::from_seconds(600))),
            ..FrequencyCapConfig::default()
        };
        let entry = InterventionOrchestration::new("a", InterventionType::Contribution)
            .with_prompt_cap(CapDuration::from_seconds(60));

        let d = prompt_cap_duration(&config, &entry, &sink).unwrap();
        assert_eq!(d.seconds, 60);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn prompt_cap_falls_back_to_any_prompt_default() {
        let sink = RecordingSink::new();
        let config = FrequencyCapConfig {
            any_prompt_frequency_cap: Some(FrequencyCap::of(CapDuration::from_seconds(600))),
            ..FrequencyCapConfig::default()
        };
        let entry = InterventionOrchestration::new("a", InterventionType::Contribution);

        let d = prompt_cap_duration(&config, &entry, &sink).unwrap();
        assert_eq!(d.seconds, 600);
        assert!(sink.contains(Diagnostic::PromptCapFallbackToDefault));
    }

    #[test]
    fn funnel_global_cap_wins_over_config() {
        let config = FrequencyCapConfig {
            global_frequency_cap: Some(FrequencyCap::of(CapDuration::from_seconds(7200))),
            ..FrequencyCapConfig::default()
        };
        let funnel = InterventionFunnel {
            interventions: Vec::new(),
            global_frequency_cap: Some(CapDuration::from_seconds(60)),
        };
        assert_eq!(global_cap_duration(&config, &funnel).unwrap().seconds, 60);

        let bare = InterventionFunnel::default();
        assert_eq!(global_cap_duration(&config, &bare).unwrap().seconds, 7200);
    }

    #[test]
    fn config_validity_needs_one_valid_duration() {
        assert!(!is_config_valid(&FrequencyCapConfig::default()));

        // A present-but-zero duration does not count.
        let zeroed = FrequencyCapConfig {
            global_frequency_cap: Some(FrequencyCap::of(CapDuration::default())),
            ..FrequencyCapConfig::default()
        };
        assert!(!is_config_valid(&zeroed));

        let named_only = FrequencyCapConfig {
            prompt_frequency_caps: vec![FrequencyCap::of(CapDuration::from_seconds(30))],
            ..FrequencyCapConfig::default()
        };
        assert!(is_config_valid(&named_only));
    }
}
