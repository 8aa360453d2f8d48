//! # Client Configuration
//!
//! Remote, publisher-scoped configuration consulted on every decision:
//! UI predicates, default frequency caps, and the display-delay trigger.
//!
//! - Loads from a JSON or TOML config file (path overridable via env).
//! - Falls back to a built-in `default_seed()` when no config is found, so a
//!   missing file never disables the engine.
//! - All sections are optional on the wire; absence means "not configured".

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::intervention::{CapDuration, InterventionType};

pub const DEFAULT_CLIENT_CONFIG_PATH: &str = "config/client_config.json";
pub const ENV_CLIENT_CONFIG_PATH: &str = "CLIENT_CONFIG_PATH";

/// Client-side display predicates computed server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPredicates {
    #[serde(default)]
    pub can_display_auto_prompt: bool,
    /// Purchases cannot complete in the reader's region; dismissible
    /// monetization prompts are pointless there.
    #[serde(default)]
    pub purchase_unavailable_region: bool,
}

/// A named default cap from the platform configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyCap {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience_action_type: Option<InterventionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_cap_duration: Option<CapDuration>,
}

impl FrequencyCap {
    pub fn of(duration: CapDuration) -> Self {
        Self {
            audience_action_type: None,
            frequency_cap_duration: Some(duration),
        }
    }

    pub fn duration(&self) -> Option<&CapDuration> {
        self.frequency_cap_duration.as_ref()
    }
}

/// Platform/publisher default caps. An orchestration entry's own cap always
/// takes precedence; `any_prompt_frequency_cap` is the fallback when the
/// entry omits one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyCapConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_frequency_cap: Option<FrequencyCap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_prompt_frequency_cap: Option<FrequencyCap>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prompt_frequency_caps: Vec<FrequencyCap>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDisplayTrigger {
    #[serde(default)]
    pub display_delay_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPromptConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_cap_config: Option<FrequencyCapConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_display_trigger: Option<ClientDisplayTrigger>,
}

/// Remote client configuration, fetched fresh per page view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_predicates: Option<UiPredicates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_prompt_config: Option<AutoPromptConfig>,
}

impl ClientConfig {
    /// Load configuration from a JSON or TOML file (picked by extension).
    /// Falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match fs::read_to_string(path) {
            Ok(s) if ext == "toml" => {
                toml::from_str(&s).unwrap_or_else(|_| Self::default_seed())
            }
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    /// Load using the env-var path override, then the default path.
    pub fn load_default() -> Self {
        let path = std::env::var(ENV_CLIENT_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_CLIENT_CONFIG_PATH.to_string());
        Self::load_from_file(path)
    }

    /// Built-in seed: prompts enabled, ten-minute per-prompt cap, two-hour
    /// global cap, no display delay.
    pub(crate) fn default_seed() -> Self {
        Self {
            ui_predicates: Some(UiPredicates {
                can_display_auto_prompt: true,
                purchase_unavailable_region: false,
            }),
            auto_prompt_config: Some(AutoPromptConfig {
                frequency_cap_config: Some(FrequencyCapConfig {
                    global_frequency_cap: Some(FrequencyCap::of(CapDuration::from_seconds(7200))),
                    any_prompt_frequency_cap: Some(FrequencyCap::of(CapDuration::from_seconds(
                        600,
                    ))),
                    prompt_frequency_caps: Vec::new(),
                }),
                client_display_trigger: Some(ClientDisplayTrigger {
                    display_delay_seconds: 0,
                }),
            }),
        }
    }

    pub fn can_display_auto_prompt(&self) -> bool {
        self.ui_predicates
            .as_ref()
            .map(|p| p.can_display_auto_prompt)
            .unwrap_or(false)
    }

    pub fn purchase_unavailable_region(&self) -> bool {
        self.ui_predicates
            .as_ref()
            .map(|p| p.purchase_unavailable_region)
            .unwrap_or(false)
    }

    pub fn frequency_cap_config(&self) -> Option<&FrequencyCapConfig> {
        self.auto_prompt_config
            .as_ref()
            .and_then(|c| c.frequency_cap_config.as_ref())
    }

    pub fn display_delay_seconds(&self) -> u64 {
        self.auto_prompt_config
            .as_ref()
            .and_then(|c| c.client_display_trigger.as_ref())
            .map(|t| t.display_delay_seconds)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_enables_prompts_with_caps() {
        let cfg = ClientConfig::default_seed();
        assert!(cfg.can_display_auto_prompt());
        assert!(!cfg.purchase_unavailable_region());
        let caps = cfg.frequency_cap_config().unwrap();
        assert_eq!(
            caps.any_prompt_frequency_cap
                .as_ref()
                .and_then(|c| c.duration())
                .map(|d| d.seconds),
            Some(600)
        );
        assert_eq!(cfg.display_delay_seconds(), 0);
    }

    #[test]
    fn empty_config_is_fully_permissive_nothing() {
        let cfg = ClientConfig::default();
        assert!(!cfg.can_display_auto_prompt());
        assert!(cfg.frequency_cap_config().is_none());
        assert_eq!(cfg.display_delay_seconds(), 0);
    }

    #[test]
    fn parses_wire_shape() {
        let raw = serde_json::json!({
            "uiPredicates": {"canDisplayAutoPrompt": true, "purchaseUnavailableRegion": true},
            "autoPromptConfig": {
                "frequencyCapConfig": {
                    "anyPromptFrequencyCap": {"frequencyCapDuration": {"seconds": 300}}
                },
                "clientDisplayTrigger": {"displayDelaySeconds": 5}
            }
        });
        let cfg: ClientConfig = serde_json::from_value(raw).unwrap();
        assert!(cfg.can_display_auto_prompt());
        assert!(cfg.purchase_unavailable_region());
        assert_eq!(cfg.display_delay_seconds(), 5);
    }

    #[test]
    fn missing_file_falls_back_to_seed() {
        let cfg = ClientConfig::load_from_file("definitely/not/a/real/path.json");
        assert_eq!(cfg, ClientConfig::default_seed());
    }

    #[test]
    fn toml_files_parse_too() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_config.toml");
        std::fs::write(
            &path,
            r#"
[uiPredicates]
canDisplayAutoPrompt = true

[autoPromptConfig.clientDisplayTrigger]
displayDelaySeconds = 3
"#,
        )
        .unwrap();

        let cfg = ClientConfig::load_from_file(&path);
        assert!(cfg.can_display_auto_prompt());
        assert_eq!(cfg.display_delay_seconds(), 3);
    }

    #[serial_test::serial]
    #[test]
    fn env_path_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override.json");
        std::fs::write(
            &path,
            r#"{"uiPredicates": {"canDisplayAutoPrompt": false, "purchaseUnavailableRegion": true}}"#,
        )
        .unwrap();

        std::env::set_var(ENV_CLIENT_CONFIG_PATH, path.display().to_string());
        let cfg = ClientConfig::load_default();
        std::env::remove_var(ENV_CLIENT_CONFIG_PATH);

        assert!(!cfg.can_display_auto_prompt());
        assert!(cfg.purchase_unavailable_region());
    }
}
