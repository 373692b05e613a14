use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::interval::parse_duration_list;
use crate::selfwatch::SelfWatch;
use crate::travel::RouteClass;
use crate::types::{ActivityKind, BarKind, CoarseState, CooldownKind};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub account: AccountConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Accounts to track from boot.
    #[serde(default)]
    pub users: Vec<UserSeed>,
    /// Factions to track from boot.
    #[serde(default)]
    pub factions: Vec<FactionSeed>,
    /// Own-account tracking toggles.
    #[serde(default, rename = "self")]
    pub self_seed: SelfSeed,
}

/// Account credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Torn API key.
    pub api_key: String,
}

/// Poll timing and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_user_poll")]
    pub user_poll_secs: u64,
    #[serde(default = "default_faction_poll")]
    pub faction_poll_secs: u64,
    #[serde(default = "default_bars_poll")]
    pub bars_poll_secs: u64,
    #[serde(default = "default_chain_poll")]
    pub chain_poll_secs: u64,
    #[serde(default = "default_icons_poll")]
    pub icons_poll_secs: u64,
    #[serde(default = "default_company_poll")]
    pub company_poll_secs: u64,
    #[serde(default = "default_stats_log")]
    pub stats_log_secs: u64,
    /// Default pre-alert offsets, e.g. "5m, 1m".
    #[serde(default = "default_pre_alerts")]
    pub pre_alerts: String,
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

fn default_user_poll() -> u64 {
    30
}
fn default_faction_poll() -> u64 {
    60
}
fn default_bars_poll() -> u64 {
    60
}
fn default_chain_poll() -> u64 {
    15
}
fn default_icons_poll() -> u64 {
    60
}
fn default_company_poll() -> u64 {
    300
}
fn default_stats_log() -> u64 {
    300
}
fn default_pre_alerts() -> String {
    "5m, 1m".to_string()
}
fn default_state_path() -> String {
    crate::STATE_PATH.to_string()
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            user_poll_secs: default_user_poll(),
            faction_poll_secs: default_faction_poll(),
            bars_poll_secs: default_bars_poll(),
            chain_poll_secs: default_chain_poll(),
            icons_poll_secs: default_icons_poll(),
            company_poll_secs: default_company_poll(),
            stats_log_secs: default_stats_log(),
            pre_alerts: default_pre_alerts(),
            state_path: default_state_path(),
        }
    }
}

impl SettingsConfig {
    pub fn pre_times(&self) -> Result<Vec<u64>> {
        let times = parse_duration_list(&self.pre_alerts);
        if times.is_empty() {
            bail!("settings.pre_alerts '{}' contains no valid durations", self.pre_alerts);
        }
        Ok(times)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Optional webhook receiving rendered alert text.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSeed {
    pub id: u64,
    /// Interest states, e.g. ["jail", "traveling"].
    pub states: Vec<String>,
    /// Per-user pre-alert override, same format as settings.pre_alerts.
    #[serde(default)]
    pub pre_alerts: Option<String>,
    #[serde(default)]
    pub travel_class: Option<RouteClass>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionSeed {
    pub id: u64,
    pub states: Vec<String>,
    #[serde(default)]
    pub pre_alerts: Option<String>,
    /// Presence enables member-offline alerts at this threshold.
    #[serde(default)]
    pub offline_hours: Option<u32>,
    #[serde(default)]
    pub daily_respect: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainSeed {
    #[serde(default = "default_chain_min")]
    pub min: u64,
    /// Timeout thresholds, e.g. "2m, 1m, 30s".
    #[serde(default = "default_chain_thresholds")]
    pub thresholds: String,
}

fn default_chain_min() -> u64 {
    10
}
fn default_chain_thresholds() -> String {
    "2m, 1m, 30s".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelfSeed {
    #[serde(default)]
    pub bars: Vec<BarKind>,
    #[serde(default)]
    pub cooldowns: Vec<CooldownKind>,
    #[serde(default)]
    pub activities: Vec<ActivityKind>,
    /// Presence enables chain countdown alerts.
    #[serde(default)]
    pub chain: Option<ChainSeed>,
    /// Presence enables addiction alerts at this threshold.
    #[serde(default)]
    pub addiction_threshold: Option<i64>,
}

impl SelfSeed {
    /// Apply toggles onto the (possibly persisted) self-watch slice,
    /// preserving runtime debounce state.
    pub fn apply(&self, watch: &mut SelfWatch) -> Result<()> {
        for kind in BarKind::ALL {
            watch.bars.get_mut(kind).enabled = self.bars.contains(&kind);
        }
        for kind in CooldownKind::ALL {
            watch.cooldowns.get_mut(kind).enabled = self.cooldowns.contains(&kind);
        }
        for kind in ActivityKind::ALL {
            watch.activities.get_mut(kind).enabled = self.activities.contains(&kind);
        }
        match &self.chain {
            Some(seed) => {
                let thresholds = parse_duration_list(&seed.thresholds);
                if thresholds.is_empty() {
                    bail!("self.chain.thresholds '{}' contains no valid durations", seed.thresholds);
                }
                watch.chain.enabled = true;
                watch.chain.min = seed.min;
                watch.chain.thresholds = thresholds;
            }
            None => watch.chain.enabled = false,
        }
        match self.addiction_threshold {
            Some(threshold) => {
                watch.addiction.enabled = true;
                watch.addiction.threshold = threshold;
            }
            None => watch.addiction.enabled = false,
        }
        Ok(())
    }
}

/// Parse operator state names into an interest set; unknown names are a
/// configuration error, surfaced synchronously.
pub fn parse_states(states: &[String]) -> Result<BTreeSet<CoarseState>> {
    states
        .iter()
        .map(|s| {
            s.parse::<CoarseState>()
                .map_err(|e| anyhow::anyhow!("invalid state in config: {e}"))
        })
        .collect()
}

/// Parse an optional per-entity pre-alert override.
pub fn parse_pre_alerts(text: &Option<String>, fallback: &[u64]) -> Result<Vec<u64>> {
    match text {
        Some(t) => {
            let times = parse_duration_list(t);
            if times.is_empty() {
                bail!("pre_alerts '{t}' contains no valid durations");
            }
            Ok(times)
        }
        None => Ok(fallback.to_vec()),
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.account.api_key.trim().is_empty() {
            bail!("account.api_key is empty");
        }
        let defaults = self.settings.pre_times()?;
        for user in &self.users {
            parse_states(&user.states)
                .with_context(|| format!("user {}", user.id))?;
            parse_pre_alerts(&user.pre_alerts, &defaults)
                .with_context(|| format!("user {}", user.id))?;
        }
        for faction in &self.factions {
            parse_states(&faction.states)
                .with_context(|| format!("faction {}", faction.id))?;
            parse_pre_alerts(&faction.pre_alerts, &defaults)
                .with_context(|| format!("faction {}", faction.id))?;
        }
        Ok(())
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<AppConfig> {
        let config: AppConfig = toml::from_str(toml_text)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [account]
            api_key = "abc123"
            "#,
        )
        .unwrap();
        assert_eq!(config.settings.user_poll_secs, 30);
        assert_eq!(config.settings.pre_times().unwrap(), vec![300, 60]);
        assert!(config.users.is_empty());
        assert!(config.notify.webhook_url.is_none());
    }

    #[test]
    fn full_config_parses() {
        let config = parse(
            r#"
            [account]
            api_key = "abc123"

            [settings]
            user_poll_secs = 10
            pre_alerts = "10m, 2m, 30s"

            [notify]
            webhook_url = "https://example.test/hook"

            [[users]]
            id = 123
            states = ["jail", "traveling"]
            travel_class = "airstrip"

            [[factions]]
            id = 777
            states = ["hospital"]
            offline_hours = 12
            daily_respect = true

            [self]
            bars = ["energy", "nerve"]
            cooldowns = ["drug"]
            activities = ["racing"]
            chain = { min = 25, thresholds = "90s, 45s" }
            addiction_threshold = -8
            "#,
        )
        .unwrap();
        assert_eq!(config.settings.pre_times().unwrap(), vec![600, 120, 30]);
        assert_eq!(config.users[0].travel_class, Some(RouteClass::Airstrip));
        assert_eq!(config.factions[0].offline_hours, Some(12));

        let mut watch = SelfWatch::default();
        config.self_seed.apply(&mut watch).unwrap();
        assert!(watch.bars.energy.enabled);
        assert!(watch.bars.nerve.enabled);
        assert!(!watch.bars.happy.enabled);
        assert!(watch.cooldowns.drug.enabled);
        assert!(watch.activities.racing.enabled);
        assert!(watch.chain.enabled);
        assert_eq!(watch.chain.min, 25);
        assert_eq!(watch.chain.thresholds, vec![90, 45]);
        assert!(watch.addiction.enabled);
        assert_eq!(watch.addiction.threshold, -8);
    }

    #[test]
    fn unknown_state_name_is_rejected() {
        let err = parse(
            r#"
            [account]
            api_key = "abc123"

            [[users]]
            id = 1
            states = ["limbo"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("user 1"), "{err}");
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(parse("[account]\napi_key = \"  \"\n").is_err());
    }

    #[test]
    fn garbage_pre_alerts_rejected() {
        let err = parse(
            r#"
            [account]
            api_key = "abc123"

            [settings]
            pre_alerts = "whenever"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("pre_alerts"), "{err}");
    }

    #[test]
    fn apply_preserves_runtime_debounce_state() {
        let seed = SelfSeed {
            bars: vec![BarKind::Energy],
            ..SelfSeed::default()
        };
        let mut watch = SelfWatch::default();
        watch.bars.energy.was_full = true;
        seed.apply(&mut watch).unwrap();
        assert!(watch.bars.energy.enabled);
        assert!(watch.bars.energy.was_full, "debounce flags survive re-seeding");
    }
}
