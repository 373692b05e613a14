use serde::{Deserialize, Serialize};

use crate::chain::ChainWatch;
use crate::notify::Alert;
use crate::types::{
    ActivityKind, BarKind, BarsResponse, CooldownKind, IconSnapshot, RACING_ACTIVE_ICON,
};

/// Expiry drift tolerated before an already-present badge counts as a new
/// occurrence. Badge text has minute granularity, so the parsed absolute
/// expiry of one occurrence wobbles by up to a minute between polls.
const UNTIL_SLACK_SECS: i64 = 120;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BarWatch {
    pub enabled: bool,
    #[serde(default)]
    pub last_value: i64,
    #[serde(default)]
    pub was_full: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BarsWatch {
    pub energy: BarWatch,
    pub nerve: BarWatch,
    pub happy: BarWatch,
    pub life: BarWatch,
}

impl BarsWatch {
    pub fn get_mut(&mut self, kind: BarKind) -> &mut BarWatch {
        match kind {
            BarKind::Energy => &mut self.energy,
            BarKind::Nerve => &mut self.nerve,
            BarKind::Happy => &mut self.happy,
            BarKind::Life => &mut self.life,
        }
    }

    pub fn any_enabled(&self) -> bool {
        self.energy.enabled || self.nerve.enabled || self.happy.enabled || self.life.enabled
    }

    /// Edge-detect full bars: one alert on not-full → full, silence while
    /// the bar stays full.
    pub fn observe(&mut self, resp: &BarsResponse) -> Vec<Alert> {
        let mut out = Vec::new();
        for kind in BarKind::ALL {
            let bar = resp.bar(kind);
            let watch = self.get_mut(kind);
            if !watch.enabled {
                continue;
            }
            let full = bar.maximum > 0 && bar.current >= bar.maximum;
            if full && !watch.was_full {
                out.push(Alert::BarFull { bar: kind });
            }
            watch.was_full = full;
            watch.last_value = bar.current;
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CooldownWatch {
    pub enabled: bool,
    /// Starts true so enabling while already ready stays silent; the
    /// first not-ready observation arms the edge.
    #[serde(default = "default_true")]
    pub was_ready: bool,
    #[serde(default)]
    pub last_until: Option<i64>,
}

impl Default for CooldownWatch {
    fn default() -> Self {
        Self {
            enabled: false,
            was_ready: true,
            last_until: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CooldownsWatch {
    pub drug: CooldownWatch,
    pub medical: CooldownWatch,
    pub booster: CooldownWatch,
    pub alcohol: CooldownWatch,
}

impl CooldownsWatch {
    pub fn get_mut(&mut self, kind: CooldownKind) -> &mut CooldownWatch {
        match kind {
            CooldownKind::Drug => &mut self.drug,
            CooldownKind::Medical => &mut self.medical,
            CooldownKind::Booster => &mut self.booster,
            CooldownKind::Alcohol => &mut self.alcohol,
        }
    }

    pub fn any_enabled(&self) -> bool {
        self.drug.enabled || self.medical.enabled || self.booster.enabled || self.alcohol.enabled
    }

    /// A cooldown is ready when its badge is absent from the feed; one
    /// alert per not-ready → ready edge.
    pub fn observe(&mut self, snap: &IconSnapshot) -> Vec<Alert> {
        let mut out = Vec::new();
        for kind in CooldownKind::ALL {
            let present = snap.contains(kind.icon_id());
            let until = snap.until(kind.icon_id());
            let watch = self.get_mut(kind);
            if !watch.enabled {
                continue;
            }
            let ready = !present;
            if ready && !watch.was_ready {
                out.push(Alert::CooldownReady { cooldown: kind });
            }
            watch.was_ready = ready;
            watch.last_until = until;
        }
        out
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityWatch {
    pub enabled: bool,
    #[serde(default)]
    pub last_until: Option<i64>,
    #[serde(default)]
    pub notified: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivitiesWatch {
    pub racing: ActivityWatch,
    pub organized_crime: ActivityWatch,
    pub bank_investment: ActivityWatch,
    pub education: ActivityWatch,
    pub donator: ActivityWatch,
}

impl ActivitiesWatch {
    pub fn get_mut(&mut self, kind: ActivityKind) -> &mut ActivityWatch {
        match kind {
            ActivityKind::Racing => &mut self.racing,
            ActivityKind::OrganizedCrime => &mut self.organized_crime,
            ActivityKind::BankInvestment => &mut self.bank_investment,
            ActivityKind::Education => &mut self.education,
            ActivityKind::Donator => &mut self.donator,
        }
    }

    pub fn any_enabled(&self) -> bool {
        ActivityKind::ALL
            .iter()
            .any(|k| match k {
                ActivityKind::Racing => self.racing.enabled,
                ActivityKind::OrganizedCrime => self.organized_crime.enabled,
                ActivityKind::BankInvestment => self.bank_investment.enabled,
                ActivityKind::Education => self.education.enabled,
                ActivityKind::Donator => self.donator.enabled,
            })
    }

    /// Started/ended edge detection per activity. Racing only counts the
    /// "actively racing" badge as presence; the "finished" badge fires the
    /// ended edge and nothing else, so active → finished → absent yields
    /// exactly one started and one ended alert.
    pub fn observe(&mut self, snap: &IconSnapshot) -> Vec<Alert> {
        let mut out = Vec::new();
        for kind in ActivityKind::ALL {
            let (present, until) = match kind {
                ActivityKind::Racing => (
                    snap.contains(RACING_ACTIVE_ICON),
                    snap.until(RACING_ACTIVE_ICON),
                ),
                other => (snap.contains(other.icon_id()), snap.until(other.icon_id())),
            };
            let watch = self.get_mut(kind);
            if !watch.enabled {
                continue;
            }

            if present {
                let replaced = match (watch.last_until, until) {
                    // A fresh occurrence carries a later expiry than the
                    // decaying one it replaced.
                    (Some(old), Some(new)) => new > old + UNTIL_SLACK_SECS,
                    _ => false,
                };
                if !watch.notified || replaced {
                    out.push(Alert::ActivityStarted {
                        activity: kind,
                        until,
                    });
                    watch.notified = true;
                }
                watch.last_until = until;
            } else if watch.notified {
                out.push(Alert::ActivityEnded { activity: kind });
                watch.notified = false;
                watch.last_until = None;
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddictionWatch {
    pub enabled: bool,
    /// Alert at or below this (addiction is zero or negative).
    pub threshold: i64,
    #[serde(default)]
    pub last_value: i64,
    #[serde(default)]
    pub notified: bool,
}

impl Default for AddictionWatch {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: -5,
            last_value: 0,
            notified: false,
        }
    }
}

impl AddictionWatch {
    pub fn observe(&mut self, value: i64) -> Vec<Alert> {
        let mut out = Vec::new();
        if self.enabled {
            if value <= self.threshold && !self.notified {
                out.push(Alert::AddictionBelow {
                    value,
                    threshold: self.threshold,
                });
                self.notified = true;
            } else if value > self.threshold && self.notified {
                out.push(Alert::AddictionRecovered { value });
                self.notified = false;
            }
        }
        self.last_value = value;
        out
    }
}

/// Everything tracked on the operator's own account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelfWatch {
    #[serde(default)]
    pub bars: BarsWatch,
    #[serde(default)]
    pub cooldowns: CooldownsWatch,
    #[serde(default)]
    pub activities: ActivitiesWatch,
    #[serde(default)]
    pub chain: ChainWatch,
    #[serde(default)]
    pub addiction: AddictionWatch,
}
