use serde::Serialize;
use tracing::warn;

use crate::interval::format_duration;
use crate::travel::TravelInfo;
use crate::types::{ActivityKind, BarKind, CoarseState, CooldownKind};

/// Everything the engine can notify the operator about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    StateChange {
        id: u64,
        name: String,
        from: CoarseState,
        to: CoarseState,
        until: Option<i64>,
        travel: Option<TravelInfo>,
        /// Faction name when the entity is a tracked faction's member.
        faction: Option<String>,
    },
    EndingSoon {
        id: u64,
        name: String,
        state: CoarseState,
        threshold: u64,
        seconds_left: i64,
        faction: Option<String>,
    },
    TravelDrift {
        id: u64,
        name: String,
        travel: TravelInfo,
        faction: Option<String>,
    },
    MemberJoined {
        faction: String,
        id: u64,
        name: String,
    },
    MemberLeft {
        faction: String,
        id: u64,
        name: String,
    },
    MemberOffline {
        faction: String,
        id: u64,
        name: String,
        idle_secs: i64,
    },
    RespectMilestone {
        faction: String,
        respect: i64,
        step: u64,
    },
    DailyRespect {
        faction: String,
        gained: i64,
        total: i64,
    },
    BarFull {
        bar: BarKind,
    },
    CooldownReady {
        cooldown: CooldownKind,
    },
    ActivityStarted {
        activity: ActivityKind,
        until: Option<i64>,
    },
    ActivityEnded {
        activity: ActivityKind,
    },
    ChainWarning {
        current: u64,
        threshold: u64,
        timeout: i64,
    },
    AddictionBelow {
        value: i64,
        threshold: i64,
    },
    AddictionRecovered {
        value: i64,
    },
}

fn eta(travel: &TravelInfo, now: i64) -> String {
    match (travel.earliest, travel.latest) {
        (Some(e), Some(l)) => format!(
            "lands in {}–{}",
            format_duration(e - now, 2),
            format_duration(l - now, 2)
        ),
        _ => "ETA unknown".to_string(),
    }
}

fn who(name: &str, id: u64, faction: &Option<String>) -> String {
    match faction {
        Some(f) => format!("{name} [{id}] ({f})"),
        None => format!("{name} [{id}]"),
    }
}

impl Alert {
    /// Human rendering at time `now` (unix seconds).
    pub fn render(&self, now: i64) -> String {
        match self {
            Alert::StateChange {
                id,
                name,
                to,
                until,
                travel,
                faction,
                ..
            } => {
                let subject = who(name, *id, faction);
                match (to, until, travel) {
                    (CoarseState::Traveling, _, Some(t)) => {
                        format!("{subject} is now traveling to {} ({})", t.destination, eta(t, now))
                    }
                    (_, Some(u), _) => {
                        format!("{subject} is now in {to} (out {})", format_duration(u - now, 2))
                    }
                    _ => format!("{subject} is now {to}"),
                }
            }
            Alert::EndingSoon {
                id,
                name,
                state,
                seconds_left,
                faction,
                ..
            } => {
                let subject = who(name, *id, faction);
                let left = format_duration(*seconds_left, 2);
                match state {
                    CoarseState::Traveling => format!("{subject} lands in {left}"),
                    other => format!("{subject} leaves {other} in {left}"),
                }
            }
            Alert::TravelDrift {
                id,
                name,
                travel,
                faction,
            } => format!(
                "{} changed course: {} {} ({})",
                who(name, *id, faction),
                travel.direction,
                travel.destination,
                eta(travel, now)
            ),
            Alert::MemberJoined { faction, id, name } => {
                format!("{name} [{id}] joined {faction}")
            }
            Alert::MemberLeft { faction, id, name } => {
                format!("{name} [{id}] left {faction}")
            }
            Alert::MemberOffline {
                faction,
                id,
                name,
                idle_secs,
            } => format!(
                "{name} [{id}] of {faction} has been offline for {}",
                format_duration(*idle_secs, 1)
            ),
            Alert::RespectMilestone {
                faction,
                respect,
                step,
            } => format!("{faction} passed {}00k respect ({respect} total)", step),
            Alert::DailyRespect {
                faction,
                gained,
                total,
            } => format!("{faction} gained {gained} respect today ({total} total)"),
            Alert::BarFull { bar } => format!("{} bar is full", bar.label()),
            Alert::CooldownReady { cooldown } => {
                format!("{} cooldown is over", cooldown.label())
            }
            Alert::ActivityStarted { activity, until } => match until {
                Some(u) => format!(
                    "{} started (ends in {})",
                    activity.label(),
                    format_duration(u - now, 2)
                ),
                None => format!("{} started", activity.label()),
            },
            Alert::ActivityEnded { activity } => format!("{} ended", activity.label()),
            Alert::ChainWarning {
                current,
                timeout,
                ..
            } => format!(
                "Chain at {current} drops in {}",
                format_duration(*timeout, 2)
            ),
            Alert::AddictionBelow { value, threshold } => {
                format!("Addiction hit {value} (threshold {threshold})")
            }
            Alert::AddictionRecovered { value } => {
                format!("Addiction recovered to {value}")
            }
        }
    }
}

/// Map one state-machine observation to an alert, honoring the entity's
/// interest-state set. Baselines are always silent.
pub fn observation_alert(
    id: u64,
    name: &str,
    states: &std::collections::BTreeSet<CoarseState>,
    faction: Option<&str>,
    obs: crate::watch::Observation,
) -> Option<Alert> {
    use crate::watch::Observation;
    let faction = faction.map(str::to_string);
    match obs {
        Observation::Baseline { .. } => None,
        Observation::StateChanged {
            from,
            to,
            travel,
            until,
        } => states.contains(&to).then(|| Alert::StateChange {
            id,
            name: name.to_string(),
            from,
            to,
            until,
            travel,
            faction,
        }),
        Observation::TravelDrift { travel } => states
            .contains(&CoarseState::Traveling)
            .then(|| Alert::TravelDrift {
                id,
                name: name.to_string(),
                travel,
                faction,
            }),
        Observation::EndingSoon {
            state,
            threshold,
            seconds_left,
        } => states.contains(&state).then(|| Alert::EndingSoon {
            id,
            name: name.to_string(),
            state,
            threshold,
            seconds_left,
            faction,
        }),
    }
}

/// One emitted notification, reported as a JSON line.
#[derive(Debug, Serialize)]
struct AlertEvent<'a> {
    timestamp: String,
    message: String,
    #[serde(flatten)]
    alert: &'a Alert,
}

/// Best-effort notification sink: every alert is emitted as a JSON line on
/// stdout; a webhook, when configured, additionally receives the rendered
/// text. Delivery failures are logged and never retried.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    webhook: Option<String>,
}

impl Notifier {
    pub fn new(webhook: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook,
        }
    }

    pub async fn send(&self, alert: &Alert) {
        let now = chrono::Utc::now();
        let message = alert.render(now.timestamp());
        let event = AlertEvent {
            timestamp: now.to_rfc3339(),
            message: message.clone(),
            alert,
        };
        if let Ok(json) = serde_json::to_string(&event) {
            println!("{json}");
        }

        if let Some(url) = &self.webhook {
            let body = serde_json::json!({ "content": message });
            match self.http.post(url).json(&body).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    warn!("webhook returned status {}", resp.status());
                }
                Ok(_) => {}
                Err(e) => warn!("webhook delivery failed: {e}"),
            }
        }
    }

    pub async fn send_all(&self, alerts: &[Alert]) {
        for alert in alerts {
            self.send(alert).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::travel::{Country, Destination, Direction, RouteClass, estimate_travel};

    #[test]
    fn renders_state_change_with_release() {
        let a = Alert::StateChange {
            id: 1,
            name: "Duke".to_string(),
            from: CoarseState::Okay,
            to: CoarseState::Hospital,
            until: Some(1_000 + 3660),
            travel: None,
            faction: None,
        };
        assert_eq!(a.render(1_000), "Duke [1] is now in Hospital (out 1h 1m)");
    }

    #[test]
    fn renders_travel_with_window() {
        let travel = estimate_travel(
            1_000_000,
            RouteClass::Economy,
            Destination::Known(Country::Mexico),
            Direction::Outbound,
        );
        let a = Alert::StateChange {
            id: 2,
            name: "Ana".to_string(),
            from: CoarseState::Okay,
            to: CoarseState::Traveling,
            until: None,
            travel: Some(travel),
            faction: Some("The Crew".to_string()),
        };
        let text = a.render(1_000);
        assert!(text.starts_with("Ana [2] (The Crew) is now traveling to Mexico"), "{text}");
        assert!(text.contains("lands in"), "{text}");
    }

    #[test]
    fn renders_unresolved_eta() {
        let travel = estimate_travel(
            0,
            RouteClass::Standard,
            Destination::Raw("Narnia".to_string()),
            Direction::Outbound,
        );
        let a = Alert::TravelDrift {
            id: 3,
            name: "Bo".to_string(),
            travel,
            faction: None,
        };
        assert!(a.render(0).contains("ETA unknown"));
    }

    #[test]
    fn event_json_carries_kind_tag() {
        let a = Alert::BarFull { bar: BarKind::Energy };
        let event = AlertEvent {
            timestamp: "t".to_string(),
            message: a.render(0),
            alert: &a,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""kind":"bar_full""#), "{json}");
        assert!(json.contains("Energy bar is full"), "{json}");
    }
}
