use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::interval::parse_duration;

/// Coarse account state as reported by the profile endpoint.
///
/// `Unknown` (a not-yet-observed baseline) is represented as
/// `Option<CoarseState>::None` wherever a previous state is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CoarseState {
    Okay,
    Traveling,
    Abroad,
    Jail,
    Hospital,
}

impl CoarseState {
    /// Parse the `status.state` field of an API response. Unknown labels
    /// (e.g. "Federal") yield `None`; callers skip the update.
    pub fn from_api(s: &str) -> Option<Self> {
        match s {
            "Okay" => Some(CoarseState::Okay),
            "Traveling" => Some(CoarseState::Traveling),
            "Abroad" => Some(CoarseState::Abroad),
            "Jail" => Some(CoarseState::Jail),
            "Hospital" => Some(CoarseState::Hospital),
            _ => None,
        }
    }
}

impl fmt::Display for CoarseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoarseState::Okay => "Okay",
            CoarseState::Traveling => "Traveling",
            CoarseState::Abroad => "Abroad",
            CoarseState::Jail => "Jail",
            CoarseState::Hospital => "Hospital",
        };
        f.write_str(s)
    }
}

impl FromStr for CoarseState {
    type Err = String;

    /// Lenient parse for operator input ("jail", "HOSPITAL", ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "okay" | "ok" => Ok(CoarseState::Okay),
            "traveling" | "travelling" | "travel" => Ok(CoarseState::Traveling),
            "abroad" => Ok(CoarseState::Abroad),
            "jail" => Ok(CoarseState::Jail),
            "hospital" | "hosp" => Ok(CoarseState::Hospital),
            other => Err(format!("unknown state '{other}'")),
        }
    }
}

/// The four personal resource bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarKind {
    Energy,
    Nerve,
    Happy,
    Life,
}

impl BarKind {
    pub const ALL: [BarKind; 4] = [BarKind::Energy, BarKind::Nerve, BarKind::Happy, BarKind::Life];

    pub fn label(&self) -> &'static str {
        match self {
            BarKind::Energy => "Energy",
            BarKind::Nerve => "Nerve",
            BarKind::Happy => "Happy",
            BarKind::Life => "Life",
        }
    }
}

/// Personal cooldowns, each tied to one status badge id; the cooldown is
/// over when the badge is absent from the icon feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownKind {
    Drug,
    Medical,
    Booster,
    Alcohol,
}

impl CooldownKind {
    pub const ALL: [CooldownKind; 4] = [
        CooldownKind::Drug,
        CooldownKind::Medical,
        CooldownKind::Booster,
        CooldownKind::Alcohol,
    ];

    /// Upstream badge id carrying this cooldown.
    pub fn icon_id(&self) -> u32 {
        match self {
            CooldownKind::Drug => 39,
            CooldownKind::Medical => 40,
            CooldownKind::Booster => 53,
            CooldownKind::Alcohol => 49,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CooldownKind::Drug => "Drug",
            CooldownKind::Medical => "Medical",
            CooldownKind::Booster => "Booster",
            CooldownKind::Alcohol => "Alcohol",
        }
    }
}

/// Timed activities surfaced through the icon feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Racing,
    OrganizedCrime,
    BankInvestment,
    Education,
    Donator,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 5] = [
        ActivityKind::Racing,
        ActivityKind::OrganizedCrime,
        ActivityKind::BankInvestment,
        ActivityKind::Education,
        ActivityKind::Donator,
    ];

    /// Primary badge id. Racing additionally owns the "finished" badge
    /// ([`RACING_FINISHED_ICON`]).
    pub fn icon_id(&self) -> u32 {
        match self {
            ActivityKind::Racing => RACING_ACTIVE_ICON,
            ActivityKind::OrganizedCrime => 9,
            ActivityKind::BankInvestment => 29,
            ActivityKind::Education => 31,
            ActivityKind::Donator => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityKind::Racing => "Racing",
            ActivityKind::OrganizedCrime => "Organized crime",
            ActivityKind::BankInvestment => "Bank investment",
            ActivityKind::Education => "Education",
            ActivityKind::Donator => "Donator",
        }
    }
}

pub const RACING_ACTIVE_ICON: u32 = 17;
pub const RACING_FINISHED_ICON: u32 = 18;

// ── wire types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub player_id: u64,
    pub name: String,
    pub status: StatusBlock,
    pub last_action: LastAction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusBlock {
    #[serde(default)]
    pub description: String,
    pub state: String,
    /// Unix release timestamp for Jail/Hospital, 0 otherwise.
    #[serde(default)]
    pub until: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastAction {
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FactionResponse {
    pub name: String,
    pub respect: i64,
    /// Member id (stringified by the API) → member record.
    pub members: HashMap<String, FactionMemberWire>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FactionMemberWire {
    pub name: String,
    pub last_action: LastAction,
    pub status: StatusBlock,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Bar {
    pub current: i64,
    pub maximum: i64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ChainBar {
    pub current: u64,
    /// Seconds until the chain drops.
    #[serde(default)]
    pub timeout: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BarsResponse {
    pub energy: Bar,
    pub nerve: Bar,
    pub happy: Bar,
    pub life: Bar,
    #[serde(default)]
    pub chain: ChainBar,
}

impl BarsResponse {
    pub fn bar(&self, kind: BarKind) -> Bar {
        match kind {
            BarKind::Energy => self.energy,
            BarKind::Nerve => self.nerve,
            BarKind::Happy => self.happy,
            BarKind::Life => self.life,
        }
    }
}

/// Raw icon feed. The API returns a `{"icon17": "Racing - ..."}` map, or
/// an empty JSON array when no badges are active.
#[derive(Debug, Clone, Deserialize)]
pub struct IconsResponse {
    #[serde(deserialize_with = "icons_map_or_empty")]
    pub icons: HashMap<String, String>,
}

fn icons_map_or_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Map(HashMap<String, String>),
        Empty(Vec<serde_json::Value>),
    }
    match Wire::deserialize(deserializer)? {
        Wire::Map(m) => Ok(m),
        Wire::Empty(_) => Ok(HashMap::new()),
    }
}

/// Normalized icon feed: badge id → absolute expiry (unix seconds), when
/// the badge text carries a remaining-time suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IconSnapshot {
    pub entries: HashMap<u32, Option<i64>>,
}

impl IconSnapshot {
    /// Build from the raw feed at time `now` (unix seconds). Keys look
    /// like "icon17"; remaining time is parsed from the description tail
    /// ("... - 2 hrs 14 mins") and anchored to `now`.
    pub fn from_feed(feed: &IconsResponse, now: i64) -> Self {
        let mut entries = HashMap::new();
        for (key, text) in &feed.icons {
            let Some(id) = key.strip_prefix("icon").and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            let until = text
                .rsplit(" - ")
                .next()
                .and_then(parse_duration)
                .map(|secs| now + secs as i64);
            entries.insert(id, until);
        }
        Self { entries }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn until(&self, id: u32) -> Option<i64> {
        self.entries.get(&id).copied().flatten()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyResponse {
    pub company_employees: HashMap<String, CompanyEmployee>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyEmployee {
    pub name: String,
    #[serde(default)]
    pub effectiveness: Effectiveness,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Effectiveness {
    /// Addiction penalty, zero or negative.
    #[serde(default)]
    pub addiction: i64,
    #[serde(default)]
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarse_state_round_trips_api_labels() {
        for s in ["Okay", "Traveling", "Abroad", "Jail", "Hospital"] {
            let parsed = CoarseState::from_api(s).unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert_eq!(CoarseState::from_api("Federal"), None);
    }

    #[test]
    fn coarse_state_lenient_operator_parse() {
        assert_eq!("hosp".parse::<CoarseState>().unwrap(), CoarseState::Hospital);
        assert_eq!("Travelling".parse::<CoarseState>().unwrap(), CoarseState::Traveling);
        assert!("limbo".parse::<CoarseState>().is_err());
    }

    #[test]
    fn icons_empty_array_deserializes() {
        let r: IconsResponse = serde_json::from_str(r#"{"icons": []}"#).unwrap();
        assert!(r.icons.is_empty());
    }

    #[test]
    fn icons_map_deserializes() {
        let r: IconsResponse =
            serde_json::from_str(r#"{"icons": {"icon17": "Racing - You are racing"}}"#).unwrap();
        assert_eq!(r.icons.len(), 1);
    }

    #[test]
    fn icon_snapshot_parses_ids_and_expiry() {
        let mut icons = HashMap::new();
        icons.insert(
            "icon39".to_string(),
            "Drug Cooldown - Effects wearing off - 2 hrs 14 mins".to_string(),
        );
        icons.insert("icon3".to_string(), "Donator".to_string());
        icons.insert("bogus".to_string(), "ignored".to_string());
        let snap = IconSnapshot::from_feed(&IconsResponse { icons }, 1_000);
        assert!(snap.contains(39));
        assert_eq!(snap.until(39), Some(1_000 + 2 * 3600 + 14 * 60));
        assert!(snap.contains(3));
        assert_eq!(snap.until(3), None);
        assert!(!snap.contains(99));
    }
}
