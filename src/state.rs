use std::collections::{BTreeSet, HashMap};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::faction::TrackedFaction;
use crate::notify::{Alert, observation_alert};
use crate::selfwatch::SelfWatch;
use crate::travel::RouteClass;
use crate::types::{CoarseState, ProfileResponse};
use crate::watch::{StateWatch, StatusSnapshot};

/// One tracked player account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedUser {
    pub id: u64,
    pub name: String,
    /// Coarse states the operator wants alerts for.
    pub states: BTreeSet<CoarseState>,
    pub enabled: bool,
    #[serde(default)]
    pub watch: StateWatch,
    /// Pre-alert offsets in seconds, sorted descending.
    #[serde(default)]
    pub pre_times: Vec<u64>,
    /// Route class this account is assumed to fly.
    #[serde(default)]
    pub travel_class: RouteClass,
}

impl TrackedUser {
    pub fn new(id: u64, name: String, states: BTreeSet<CoarseState>) -> Self {
        Self {
            id,
            name,
            states,
            enabled: true,
            watch: StateWatch::default(),
            pre_times: Vec::new(),
            travel_class: RouteClass::default(),
        }
    }

    /// Diff one profile poll. Unrecognized coarse states are treated as an
    /// untrusted response and skipped.
    pub fn observe(&mut self, profile: &ProfileResponse, now: i64) -> Vec<Alert> {
        self.name = profile.name.clone();
        let Some(snap) = StatusSnapshot::from_wire(&profile.status) else {
            return Vec::new();
        };
        self.watch
            .observe(&snap, now, self.travel_class, &self.pre_times)
            .into_iter()
            .filter_map(|obs| observation_alert(self.id, &self.name, &self.states, None, obs))
            .collect()
    }
}

/// Liveness snapshot for external monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub users_tracked: usize,
    pub users_active: usize,
    pub factions_tracked: usize,
    pub factions_active: usize,
    pub faction_members: usize,
    pub uptime_secs: u64,
}

/// The process-wide mutable store. Every poller reads and mutates its own
/// slice in place; cross-poller slices are disjoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WatchState {
    #[serde(default)]
    pub users: HashMap<u64, TrackedUser>,
    #[serde(default)]
    pub factions: HashMap<u64, TrackedFaction>,
    #[serde(default)]
    pub selfwatch: SelfWatch,
    /// Operator's own player id, learned at startup.
    #[serde(default)]
    pub own_id: u64,
}

impl WatchState {
    pub fn track_user(
        &mut self,
        id: u64,
        name: String,
        states: BTreeSet<CoarseState>,
    ) -> Result<&mut TrackedUser> {
        if self.users.contains_key(&id) {
            bail!("user {id} is already tracked");
        }
        Ok(self
            .users
            .entry(id)
            .or_insert_with(|| TrackedUser::new(id, name, states)))
    }

    pub fn untrack_user(&mut self, id: u64) -> Result<TrackedUser> {
        match self.users.remove(&id) {
            Some(u) => Ok(u),
            None => bail!("user {id} is not tracked"),
        }
    }

    pub fn track_faction(
        &mut self,
        id: u64,
        name: String,
        states: BTreeSet<CoarseState>,
    ) -> Result<&mut TrackedFaction> {
        if self.factions.contains_key(&id) {
            bail!("faction {id} is already tracked");
        }
        Ok(self
            .factions
            .entry(id)
            .or_insert_with(|| TrackedFaction::new(id, name, states)))
    }

    pub fn untrack_faction(&mut self, id: u64) -> Result<TrackedFaction> {
        match self.factions.remove(&id) {
            Some(f) => Ok(f),
            None => bail!("faction {id} is not tracked"),
        }
    }

    /// Operator-applied manual delay on a user's current travel window.
    pub fn delay_user_travel(&mut self, id: u64, secs: i64) -> Result<()> {
        let user = match self.users.get_mut(&id) {
            Some(u) => u,
            None => bail!("user {id} is not tracked"),
        };
        match user.watch.travel.as_mut() {
            Some(travel) => {
                travel.apply_delay(secs);
                Ok(())
            }
            None => bail!("user {id} is not traveling"),
        }
    }

    /// Enabled user ids in a stable order for round-robin polling.
    pub fn active_user_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .users
            .values()
            .filter(|u| u.enabled)
            .map(|u| u.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn active_faction_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .factions
            .values()
            .filter(|f| f.enabled)
            .map(|f| f.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn stats(&self, uptime_secs: u64) -> Stats {
        Stats {
            users_tracked: self.users.len(),
            users_active: self.users.values().filter(|u| u.enabled).count(),
            factions_tracked: self.factions.len(),
            factions_active: self.factions.values().filter(|f| f.enabled).count(),
            faction_members: self.factions.values().map(|f| f.members.len()).sum(),
            uptime_secs,
        }
    }
}
