use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::notify::Alert;

/// Chain countdown tracking with exactly-once alerts per threshold per
/// epoch. An epoch is one continuous chain-building streak; the fired map
/// is keyed by epoch id so the history survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainWatch {
    pub enabled: bool,
    /// Minimum chain length before countdown alerts apply.
    pub min: u64,
    /// Timeout thresholds in seconds, sorted descending.
    pub thresholds: Vec<u64>,
    #[serde(default)]
    pub epoch_id: u64,
    #[serde(default)]
    pub last_count: Option<u64>,
    /// Epoch id → thresholds already fired. Only the current epoch's
    /// entry is kept.
    #[serde(default)]
    pub fired: HashMap<u64, BTreeSet<u64>>,
}

impl Default for ChainWatch {
    fn default() -> Self {
        Self {
            enabled: false,
            min: 10,
            thresholds: vec![120, 60, 30],
            epoch_id: 0,
            last_count: None,
            fired: HashMap::new(),
        }
    }
}

impl ChainWatch {
    /// Diff one chain sample. `current` is the chain counter, `timeout`
    /// the seconds until the chain drops.
    pub fn observe(&mut self, current: u64, timeout: i64) -> Vec<Alert> {
        // Epoch edges: a reset to a lower value, or a start from idle.
        let new_epoch = match self.last_count {
            Some(prev) => current < prev || (prev == 0 && current > 0),
            None => false,
        };
        if new_epoch {
            self.epoch_id += 1;
            self.fired.retain(|epoch, _| *epoch == self.epoch_id);
        }
        self.last_count = Some(current);

        if !self.enabled || current < self.min || timeout <= 0 {
            return Vec::new();
        }

        let fired = self.fired.entry(self.epoch_id).or_default();
        let mut out = Vec::new();
        for &threshold in &self.thresholds {
            if timeout <= threshold as i64 && fired.insert(threshold) {
                out.push(Alert::ChainWarning {
                    current,
                    threshold,
                    timeout,
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watch() -> ChainWatch {
        ChainWatch {
            enabled: true,
            min: 10,
            thresholds: vec![120, 60, 30],
            ..ChainWatch::default()
        }
    }

    fn thresholds_of(alerts: &[Alert]) -> Vec<u64> {
        alerts
            .iter()
            .map(|a| match a {
                Alert::ChainWarning { threshold, .. } => *threshold,
                other => panic!("unexpected alert {other:?}"),
            })
            .collect()
    }

    #[test]
    fn below_min_never_alerts() {
        let mut w = watch();
        assert!(w.observe(5, 20).is_empty());
        assert!(w.observe(9, 10).is_empty());
    }

    #[test]
    fn fires_each_threshold_once_per_epoch() {
        let mut w = watch();
        let a = w.observe(12, 110);
        assert_eq!(thresholds_of(&a), vec![120]);
        let a = w.observe(13, 55);
        assert_eq!(thresholds_of(&a), vec![60]);
        // Same band again → suppressed.
        assert!(w.observe(14, 50).is_empty());
        let a = w.observe(15, 20);
        assert_eq!(thresholds_of(&a), vec![30]);
        assert!(w.observe(16, 10).is_empty());
    }

    #[test]
    fn lagged_poll_bursts_descending() {
        let mut w = watch();
        let a = w.observe(25, 15);
        assert_eq!(thresholds_of(&a), vec![120, 60, 30]);
    }

    #[test]
    fn reset_starts_new_epoch_with_empty_fired_set() {
        // Counts [5, 9, 14, 3, 8] with min 10 across one reset.
        let mut w = watch();
        assert!(w.observe(5, 130).is_empty()); // below min
        assert!(w.observe(9, 100).is_empty()); // below min
        let a = w.observe(14, 25); // ≥ min, timeout under every threshold
        assert_eq!(thresholds_of(&a), vec![120, 60, 30]);
        let epoch_one = w.epoch_id;

        assert!(w.observe(3, 200).is_empty()); // reset: 3 < 14 → new epoch
        assert_eq!(w.epoch_id, epoch_one + 1);
        assert!(w.observe(8, 40).is_empty()); // below min in epoch two

        // Epoch two's fired set starts empty: same thresholds re-fire.
        let a = w.observe(12, 25);
        assert_eq!(thresholds_of(&a), vec![120, 60, 30]);
    }

    #[test]
    fn start_from_zero_is_new_epoch() {
        let mut w = watch();
        w.observe(15, 20); // fires all three
        w.observe(0, 0); // chain dropped (reset, epoch++)
        let before = w.epoch_id;
        w.observe(4, 300); // started again from idle → another epoch
        assert_eq!(w.epoch_id, before + 1);
    }

    #[test]
    fn disabled_tracks_epochs_but_stays_silent() {
        let mut w = watch();
        w.enabled = false;
        assert!(w.observe(50, 10).is_empty());
        w.observe(2, 100);
        assert!(w.epoch_id > 0, "epoch bookkeeping continues while disabled");
    }
}
