use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::travel::{RouteClass, TravelInfo, estimate_travel, parse_destination};
use crate::types::CoarseState;

/// Normalized per-poll view of one account's status.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub state: CoarseState,
    pub description: String,
    /// Unix release timestamp for Jail/Hospital.
    pub until: Option<i64>,
}

impl StatusSnapshot {
    /// Build from raw wire fields; `None` when the coarse state label is
    /// unrecognized (the caller skips the update).
    pub fn from_wire(status: &crate::types::StatusBlock) -> Option<Self> {
        let state = CoarseState::from_api(&status.state)?;
        let until = (status.until > 0).then_some(status.until);
        Some(Self {
            state,
            description: status.description.clone(),
            until,
        })
    }
}

/// What one poll of one entity produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// First-ever observation; recorded silently.
    Baseline { state: CoarseState },
    StateChanged {
        from: CoarseState,
        to: CoarseState,
        travel: Option<TravelInfo>,
        until: Option<i64>,
    },
    /// Same coarse state but the status text now names a different
    /// destination or direction; treated like a state change.
    TravelDrift { travel: TravelInfo },
    /// A pre-alert threshold was crossed for the current episode.
    EndingSoon {
        state: CoarseState,
        threshold: u64,
        seconds_left: i64,
    },
}

/// Per-entity state machine over coarse states, with per-episode pre-alert
/// history. Embedded in both tracked users and faction member caches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateWatch {
    pub last_state: Option<CoarseState>,
    pub travel: Option<TravelInfo>,
    /// Session key → thresholds (seconds) already fired. Only the current
    /// episode's entry is retained.
    #[serde(default)]
    pub pre_fired: HashMap<String, BTreeSet<u64>>,
}

/// Identifier for one continuous timed episode. Two back-to-back jail
/// sentences get distinct keys even though the coarse state label never
/// changed, re-arming the pre-alert thresholds.
pub fn session_key(
    state: CoarseState,
    until: Option<i64>,
    travel: Option<&TravelInfo>,
) -> Option<String> {
    match state {
        CoarseState::Traveling => {
            travel.map(|t| format!("T:{}:{}", t.direction, t.started_at))
        }
        CoarseState::Jail => until.map(|u| format!("J:{u}")),
        CoarseState::Hospital => until.map(|u| format!("H:{u}")),
        CoarseState::Okay | CoarseState::Abroad => None,
    }
}

impl StateWatch {
    fn compute_travel(&self, snap: &StatusSnapshot, now: i64, class: RouteClass) -> Option<TravelInfo> {
        parse_destination(&snap.description)
            .map(|(dest, dir)| estimate_travel(now * 1000, class, dest, dir))
    }

    fn current_key(&self, snap: &StatusSnapshot) -> Option<String> {
        session_key(snap.state, snap.until, self.travel.as_ref())
    }

    /// Episode end time used for pre-alerts: the release timestamp for
    /// Jail/Hospital, the earliest arrival bound for travel (warn before
    /// the earliest possible landing).
    fn end_time(&self, snap: &StatusSnapshot) -> Option<i64> {
        match snap.state {
            CoarseState::Jail | CoarseState::Hospital => snap.until,
            CoarseState::Traveling => self.travel.as_ref().and_then(|t| t.earliest),
            CoarseState::Okay | CoarseState::Abroad => None,
        }
    }

    /// Diff one poll against the recorded state. `now` is unix seconds;
    /// `pre_times` must be sorted descending so a poll that lands after
    /// several thresholds have elapsed fires all of them in one pass,
    /// least-urgent first.
    pub fn observe(
        &mut self,
        snap: &StatusSnapshot,
        now: i64,
        class: RouteClass,
        pre_times: &[u64],
    ) -> Vec<Observation> {
        let Some(prev) = self.last_state else {
            // Silent baseline: no notification storm on first observation.
            self.last_state = Some(snap.state);
            self.travel = if snap.state == CoarseState::Traveling {
                self.compute_travel(snap, now, class)
            } else {
                None
            };
            self.prune_to_current(snap);
            return vec![Observation::Baseline { state: snap.state }];
        };

        if prev != snap.state {
            let travel = if snap.state == CoarseState::Traveling {
                self.compute_travel(snap, now, class)
            } else {
                None
            };
            self.travel = travel.clone();
            self.last_state = Some(snap.state);
            self.pre_fired.clear();
            self.prune_to_current(snap);
            return vec![Observation::StateChanged {
                from: prev,
                to: snap.state,
                travel,
                until: snap.until,
            }];
        }

        let mut out = Vec::new();

        // Mid-flight drift: status text updated to a different destination
        // or direction while the coarse state stayed "Traveling".
        if snap.state == CoarseState::Traveling {
            if let Some((dest, dir)) = parse_destination(&snap.description) {
                let drifted = match &self.travel {
                    Some(t) => t.destination != dest || t.direction != dir,
                    None => true,
                };
                if drifted {
                    let info = estimate_travel(now * 1000, class, dest, dir);
                    self.travel = Some(info.clone());
                    out.push(Observation::TravelDrift { travel: info });
                }
            }
        }

        // Pre-alert evaluation. Pruning to the current session key clears
        // fired history from the previous episode even when the coarse
        // state label never changed.
        match self.current_key(snap) {
            Some(key) => {
                self.pre_fired.retain(|k, _| *k == key);
                if let Some(end) = self.end_time(snap) {
                    let seconds_left = end - now;
                    if seconds_left > 0 {
                        let fired = self.pre_fired.entry(key).or_default();
                        for &threshold in pre_times {
                            if seconds_left <= threshold as i64 && fired.insert(threshold) {
                                out.push(Observation::EndingSoon {
                                    state: snap.state,
                                    threshold,
                                    seconds_left,
                                });
                            }
                        }
                    }
                }
            }
            None => self.pre_fired.clear(),
        }

        out
    }

    fn prune_to_current(&mut self, snap: &StatusSnapshot) {
        match self.current_key(snap) {
            Some(key) => self.pre_fired.retain(|k, _| *k == key),
            None => self.pre_fired.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(state: CoarseState, description: &str, until: Option<i64>) -> StatusSnapshot {
        StatusSnapshot {
            state,
            description: description.to_string(),
            until,
        }
    }

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn first_poll_is_silent_baseline() {
        let mut w = StateWatch::default();
        let obs = w.observe(
            &snap(CoarseState::Jail, "In jail", Some(NOW + 500)),
            NOW,
            RouteClass::Standard,
            &[300, 60],
        );
        assert_eq!(obs, vec![Observation::Baseline { state: CoarseState::Jail }]);
        assert_eq!(w.last_state, Some(CoarseState::Jail));
    }

    #[test]
    fn state_change_reported_with_until() {
        let mut w = StateWatch::default();
        w.observe(&snap(CoarseState::Okay, "Okay", None), NOW, RouteClass::Standard, &[]);
        let obs = w.observe(
            &snap(CoarseState::Hospital, "In hospital", Some(NOW + 900)),
            NOW + 30,
            RouteClass::Standard,
            &[],
        );
        assert_eq!(obs.len(), 1);
        match &obs[0] {
            Observation::StateChanged { from, to, until, .. } => {
                assert_eq!(*from, CoarseState::Okay);
                assert_eq!(*to, CoarseState::Hospital);
                assert_eq!(*until, Some(NOW + 900));
            }
            other => panic!("unexpected observation {other:?}"),
        }
    }

    #[test]
    fn pre_alert_fires_once_per_threshold() {
        let mut w = StateWatch::default();
        let until = Some(NOW + 50);
        w.observe(&snap(CoarseState::Jail, "In jail", until), NOW - 100, RouteClass::Standard, &[60]);
        // 50s left, threshold 60s → fires.
        let obs = w.observe(&snap(CoarseState::Jail, "In jail", until), NOW, RouteClass::Standard, &[60]);
        assert_eq!(obs.len(), 1);
        assert!(matches!(obs[0], Observation::EndingSoon { threshold: 60, .. }));
        // Same sample again → no double fire.
        let obs = w.observe(&snap(CoarseState::Jail, "In jail", until), NOW + 10, RouteClass::Standard, &[60]);
        assert!(obs.is_empty());
    }

    #[test]
    fn lagged_poll_bursts_all_thresholds_descending() {
        let mut w = StateWatch::default();
        let until = Some(NOW + 20);
        w.observe(&snap(CoarseState::Hospital, "hosp", until), NOW - 600, RouteClass::Standard, &[300, 120, 60]);
        let obs = w.observe(&snap(CoarseState::Hospital, "hosp", until), NOW, RouteClass::Standard, &[300, 120, 60]);
        let fired: Vec<u64> = obs
            .iter()
            .map(|o| match o {
                Observation::EndingSoon { threshold, .. } => *threshold,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(fired, vec![300, 120, 60]);
    }

    #[test]
    fn no_pre_alert_after_release_time() {
        let mut w = StateWatch::default();
        let until = Some(NOW - 5);
        w.observe(&snap(CoarseState::Jail, "jail", until), NOW - 100, RouteClass::Standard, &[60]);
        let obs = w.observe(&snap(CoarseState::Jail, "jail", until), NOW, RouteClass::Standard, &[60]);
        assert!(obs.is_empty());
    }

    #[test]
    fn new_session_key_rearms_thresholds() {
        let mut w = StateWatch::default();
        let first = Some(NOW + 30);
        w.observe(&snap(CoarseState::Jail, "jail", first), NOW - 60, RouteClass::Standard, &[60]);
        let obs = w.observe(&snap(CoarseState::Jail, "jail", first), NOW, RouteClass::Standard, &[60]);
        assert_eq!(obs.len(), 1);
        // New sentence, same coarse state: until moved → new session key.
        let second = Some(NOW + 50);
        let obs = w.observe(&snap(CoarseState::Jail, "jail", second), NOW + 10, RouteClass::Standard, &[60]);
        assert_eq!(obs.len(), 1, "old episode must not suppress the new one");
        assert!(matches!(obs[0], Observation::EndingSoon { .. }));
    }

    #[test]
    fn travel_change_computes_window() {
        let mut w = StateWatch::default();
        w.observe(&snap(CoarseState::Okay, "Okay", None), NOW, RouteClass::Standard, &[]);
        let obs = w.observe(
            &snap(CoarseState::Traveling, "Traveling to Mexico", None),
            NOW + 10,
            RouteClass::Standard,
            &[],
        );
        match &obs[0] {
            Observation::StateChanged { travel: Some(t), .. } => {
                assert!(t.earliest.unwrap() <= t.latest.unwrap());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn travel_drift_renotifies_and_rearms() {
        let mut w = StateWatch::default();
        w.observe(
            &snap(CoarseState::Traveling, "Traveling to Mexico", None),
            NOW,
            RouteClass::Standard,
            &[],
        );
        // Status text flips to the return leg while state stays Traveling.
        let obs = w.observe(
            &snap(CoarseState::Traveling, "Returning to Torn from Mexico", None),
            NOW + 60,
            RouteClass::Standard,
            &[],
        );
        assert_eq!(obs.len(), 1);
        match &obs[0] {
            Observation::TravelDrift { travel } => {
                assert_eq!(travel.direction, crate::travel::Direction::Return);
            }
            other => panic!("unexpected {other:?}"),
        }
        // Unchanged leg afterwards: no drift.
        let obs = w.observe(
            &snap(CoarseState::Traveling, "Returning to Torn from Mexico", None),
            NOW + 120,
            RouteClass::Standard,
            &[],
        );
        assert!(obs.is_empty());
    }

    #[test]
    fn okay_clears_fired_history() {
        let mut w = StateWatch::default();
        let until = Some(NOW + 30);
        w.observe(&snap(CoarseState::Jail, "jail", until), NOW - 60, RouteClass::Standard, &[60]);
        w.observe(&snap(CoarseState::Jail, "jail", until), NOW, RouteClass::Standard, &[60]);
        assert!(!w.pre_fired.is_empty());
        w.observe(&snap(CoarseState::Okay, "Okay", None), NOW + 40, RouteClass::Standard, &[60]);
        assert!(w.pre_fired.is_empty());
    }
}
