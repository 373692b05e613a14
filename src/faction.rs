use std::collections::{BTreeSet, HashMap};
use std::collections::hash_map::Entry;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::notify::Alert;
use crate::travel::RouteClass;
use crate::types::{CoarseState, FactionMemberWire, FactionResponse};
use crate::watch::{StateWatch, StatusSnapshot};

/// Respect milestone granularity.
pub const RESPECT_STEP: i64 = 100_000;

/// Rosters at or above this size get the attrition glitch guard.
const GLITCH_MIN_ROSTER: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflineWatch {
    pub enabled: bool,
    /// Hours of inactivity before a member counts as offline.
    pub hours: u32,
}

impl Default for OfflineWatch {
    fn default() -> Self {
        Self {
            enabled: false,
            hours: 24,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DailyRespect {
    pub enabled: bool,
    #[serde(default)]
    pub respect_at_midnight: i64,
    /// UTC day the baseline was taken.
    #[serde(default)]
    pub day: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemberCache {
    pub name: String,
    #[serde(default)]
    pub watch: StateWatch,
    #[serde(default)]
    pub last_action_ts: i64,
    /// Set once when the member crosses the offline threshold, cleared on
    /// activity; suppresses repeat alerts every tick.
    #[serde(default)]
    pub offline_notified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedFaction {
    pub id: u64,
    pub name: String,
    /// Member coarse states the operator wants alerts for.
    pub states: BTreeSet<CoarseState>,
    pub enabled: bool,
    #[serde(default)]
    pub members: HashMap<u64, MemberCache>,
    #[serde(default)]
    pub offline: OfflineWatch,
    #[serde(default)]
    pub daily: DailyRespect,
    #[serde(default)]
    pub last_respect: i64,
    /// floor(respect / 100k) at last poll; `None` until first observed,
    /// so the first poll never reads as a milestone.
    #[serde(default)]
    pub last_respect_step: Option<u64>,
    /// Pre-alert offsets (seconds, descending) applied to members.
    #[serde(default)]
    pub pre_times: Vec<u64>,
}

impl TrackedFaction {
    pub fn new(id: u64, name: String, states: BTreeSet<CoarseState>) -> Self {
        Self {
            id,
            name,
            states,
            enabled: true,
            members: HashMap::new(),
            offline: OfflineWatch::default(),
            daily: DailyRespect::default(),
            last_respect: 0,
            last_respect_step: None,
            pre_times: Vec::new(),
        }
    }

    /// Diff one roster poll. `now` is unix seconds.
    pub fn observe(&mut self, resp: &FactionResponse, now: i64) -> Vec<Alert> {
        let roster: HashMap<u64, &FactionMemberWire> = resp
            .members
            .iter()
            .filter_map(|(k, v)| k.parse::<u64>().ok().map(|id| (id, v)))
            .collect();

        // An empty roster for a faction we have members cached for is an
        // upstream fault, not a mass exodus. Skip the whole tick.
        if roster.is_empty() && !self.members.is_empty() {
            warn!(
                faction = self.id,
                known = self.members.len(),
                "empty roster response, skipping update"
            );
            return Vec::new();
        }

        // Attrition guard: a transient upstream fault can return a roster
        // missing half the faction; processing it would cascade into false
        // "member left" alerts. Skip the whole tick instead.
        let missing = self
            .members
            .keys()
            .filter(|id| !roster.contains_key(id))
            .count();
        if self.members.len() >= GLITCH_MIN_ROSTER && missing * 2 > self.members.len() {
            warn!(
                faction = self.id,
                known = self.members.len(),
                missing,
                "suspect roster attrition, skipping update"
            );
            return Vec::new();
        }

        self.name = resp.name.clone();
        let mut alerts = Vec::new();

        // Leaves.
        let left: Vec<u64> = self
            .members
            .keys()
            .filter(|id| !roster.contains_key(id))
            .copied()
            .collect();
        for id in left {
            if let Some(cache) = self.members.remove(&id) {
                alerts.push(Alert::MemberLeft {
                    faction: self.name.clone(),
                    id,
                    name: cache.name,
                });
            }
        }

        // Joins and state diffs.
        for (id, wire) in roster {
            match self.members.entry(id) {
                Entry::Vacant(slot) => {
                    alerts.push(Alert::MemberJoined {
                        faction: self.name.clone(),
                        id,
                        name: wire.name.clone(),
                    });
                    let mut cache = MemberCache {
                        name: wire.name.clone(),
                        last_action_ts: wire.last_action.timestamp,
                        ..MemberCache::default()
                    };
                    // Baseline state, silently (no pre-alert history).
                    if let Some(snap) = StatusSnapshot::from_wire(&wire.status) {
                        cache.watch.observe(&snap, now, RouteClass::Standard, &[]);
                    }
                    slot.insert(cache);
                }
                Entry::Occupied(slot) => {
                    let cache = slot.into_mut();
                    cache.name = wire.name.clone();
                    cache.last_action_ts = wire.last_action.timestamp;

                    if let Some(snap) = StatusSnapshot::from_wire(&wire.status) {
                        let observations = cache.watch.observe(
                            &snap,
                            now,
                            RouteClass::Standard,
                            &self.pre_times,
                        );
                        for obs in observations {
                            if let Some(alert) = crate::notify::observation_alert(
                                id,
                                &cache.name,
                                &self.states,
                                Some(&self.name),
                                obs,
                            ) {
                                alerts.push(alert);
                            }
                        }
                    }

                    if self.offline.enabled {
                        let idle = now - cache.last_action_ts;
                        if idle >= self.offline.hours as i64 * 3600 {
                            if !cache.offline_notified {
                                cache.offline_notified = true;
                                alerts.push(Alert::MemberOffline {
                                    faction: self.name.clone(),
                                    id,
                                    name: cache.name.clone(),
                                    idle_secs: idle,
                                });
                            }
                        } else {
                            cache.offline_notified = false;
                        }
                    }
                }
            }
        }

        // Respect milestone: step increase, and the previous step must be
        // nonzero so a fresh track never reads as a milestone.
        let step = (resp.respect / RESPECT_STEP).max(0) as u64;
        if let Some(prev_step) = self.last_respect_step {
            if step > prev_step && prev_step > 0 {
                alerts.push(Alert::RespectMilestone {
                    faction: self.name.clone(),
                    respect: resp.respect,
                    step,
                });
            }
        }
        self.last_respect_step = Some(step);
        self.last_respect = resp.respect;

        // Daily respect delta at UTC day rollover.
        if self.daily.enabled {
            let today = DateTime::from_timestamp(now, 0)
                .map(|t| t.date_naive());
            if let Some(today) = today {
                match self.daily.day {
                    None => {
                        self.daily.day = Some(today);
                        self.daily.respect_at_midnight = resp.respect;
                    }
                    Some(day) if day != today => {
                        alerts.push(Alert::DailyRespect {
                            faction: self.name.clone(),
                            gained: resp.respect - self.daily.respect_at_midnight,
                            total: resp.respect,
                        });
                        self.daily.day = Some(today);
                        self.daily.respect_at_midnight = resp.respect;
                    }
                    Some(_) => {}
                }
            }
        }

        alerts
    }
}
