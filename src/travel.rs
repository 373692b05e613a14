use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Fractional padding applied to both arrival bounds to absorb the jitter
/// between the true departure and the poll that first observed "Traveling".
const BOUND_PAD: f64 = 0.03;

/// Known travel destinations with fixed route durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Country {
    Mexico,
    CaymanIslands,
    Canada,
    Hawaii,
    UnitedKingdom,
    Argentina,
    Switzerland,
    Japan,
    China,
    Uae,
    SouthAfrica,
}

impl Country {
    const ALL: [Country; 11] = [
        Country::Mexico,
        Country::CaymanIslands,
        Country::Canada,
        Country::Hawaii,
        Country::UnitedKingdom,
        Country::Argentina,
        Country::Switzerland,
        Country::Japan,
        Country::China,
        Country::Uae,
        Country::SouthAfrica,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Country::Mexico => "Mexico",
            Country::CaymanIslands => "Cayman Islands",
            Country::Canada => "Canada",
            Country::Hawaii => "Hawaii",
            Country::UnitedKingdom => "United Kingdom",
            Country::Argentina => "Argentina",
            Country::Switzerland => "Switzerland",
            Country::Japan => "Japan",
            Country::China => "China",
            Country::Uae => "UAE",
            Country::SouthAfrica => "South Africa",
        }
    }

    /// One-way economy flight time in seconds.
    fn economy_secs(&self) -> u64 {
        let minutes = match self {
            Country::Mexico => 26,
            Country::CaymanIslands => 35,
            Country::Canada => 41,
            Country::Hawaii => 134,
            Country::UnitedKingdom => 159,
            Country::Argentina => 167,
            Country::Switzerland => 175,
            Country::Japan => 225,
            Country::China => 242,
            Country::Uae => 271,
            Country::SouthAfrica => 297,
        };
        minutes * 60
    }

    fn match_name(text: &str) -> Option<Country> {
        Country::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(text))
    }
}

/// Parsed destination: a known country, or raw status text we could not
/// match (no route duration, so no ETA).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    Known(Country),
    Raw(String),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Known(c) => f.write_str(c.name()),
            Destination::Raw(s) => f.write_str(s),
        }
    }
}

/// How the entity is flying. `Standard` means the operator does not know
/// whether an economy or business ticket was booked, so the estimate keeps
/// both as bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    #[default]
    Standard,
    Economy,
    Business,
    Airstrip,
    Private,
}

impl RouteClass {
    fn flight_secs(&self, country: Country) -> u64 {
        let eco = country.economy_secs() as f64;
        let secs = match self {
            RouteClass::Standard | RouteClass::Economy => eco,
            RouteClass::Business => eco * 0.30,
            RouteClass::Airstrip => eco * 0.70,
            RouteClass::Private => eco * 0.50,
        };
        secs.round() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Return,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => f.write_str("out"),
            Direction::Return => f.write_str("back"),
        }
    }
}

/// One travel leg: when it was first observed, where it goes, and the
/// estimated arrival window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelInfo {
    /// Wall-clock ms when travel was first observed.
    pub started_at: i64,
    pub class: RouteClass,
    pub destination: Destination,
    pub direction: Direction,
    /// Unix seconds bounding the arrival estimate. Both `None` when the
    /// destination or class could not be resolved.
    pub earliest: Option<i64>,
    pub latest: Option<i64>,
}

impl TravelInfo {
    /// Shift both bounds by an operator-supplied delay (seconds, may be
    /// negative). No-op on an unresolved window.
    pub fn apply_delay(&mut self, secs: i64) {
        if let Some(e) = self.earliest.as_mut() {
            *e += secs;
        }
        if let Some(l) = self.latest.as_mut() {
            *l += secs;
        }
    }
}

fn from_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bfrom\s+(.+?)\s*$").unwrap())
}

fn to_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bto\s+(.+?)\s*$").unwrap())
}

/// Parse destination and direction out of a free-text status description.
///
/// A trailing "from X" wins over an earlier "to X" (return legs read
/// "Returning to Torn from X"); the destination is matched against the
/// known country list case-insensitively, else passed through raw.
pub fn parse_destination(description: &str) -> Option<(Destination, Direction)> {
    let (cap, direction) = if let Some(cap) = from_re().captures(description) {
        (cap, Direction::Return)
    } else if let Some(cap) = to_re().captures(description) {
        (cap, Direction::Outbound)
    } else {
        return None;
    };
    let raw = cap[1].trim();
    if raw.is_empty() {
        return None;
    }
    let destination = match Country::match_name(raw) {
        Some(c) => Destination::Known(c),
        None => Destination::Raw(raw.to_string()),
    };
    Some((destination, direction))
}

/// Estimate the arrival window for a travel leg first observed at
/// `started_at` (wall-clock ms).
///
/// `Standard` uses the business duration for the earliest bound and the
/// economy duration for the latest; a resolved class pins both to one
/// duration. Each bound is padded ±3%. An unresolved destination yields
/// `earliest == latest == None`, meaning "unknown ETA", not an error.
pub fn estimate_travel(
    started_at: i64,
    class: RouteClass,
    destination: Destination,
    direction: Direction,
) -> TravelInfo {
    let (earliest, latest) = match &destination {
        Destination::Known(country) => {
            let (short, long) = match class {
                RouteClass::Standard => (
                    RouteClass::Business.flight_secs(*country),
                    RouteClass::Economy.flight_secs(*country),
                ),
                other => {
                    let d = other.flight_secs(*country);
                    (d, d)
                }
            };
            let start = started_at / 1000;
            let earliest = start + ((short as f64) * (1.0 - BOUND_PAD)).round() as i64;
            let latest = start + ((long as f64) * (1.0 + BOUND_PAD)).round() as i64;
            (Some(earliest), Some(latest))
        }
        Destination::Raw(_) => (None, None),
    };

    TravelInfo {
        started_at,
        class,
        destination,
        direction,
        earliest,
        latest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_outbound_destination() {
        let (dest, dir) = parse_destination("Traveling to Mexico").unwrap();
        assert_eq!(dest, Destination::Known(Country::Mexico));
        assert_eq!(dir, Direction::Outbound);
    }

    #[test]
    fn parses_return_leg() {
        let (dest, dir) = parse_destination("Returning to Torn from Cayman Islands").unwrap();
        assert_eq!(dest, Destination::Known(Country::CaymanIslands));
        assert_eq!(dir, Direction::Return);
    }

    #[test]
    fn destination_match_is_case_insensitive() {
        let (dest, _) = parse_destination("Traveling to south africa").unwrap();
        assert_eq!(dest, Destination::Known(Country::SouthAfrica));
    }

    #[test]
    fn unknown_destination_passes_through_raw() {
        let (dest, dir) = parse_destination("Traveling to Narnia").unwrap();
        assert_eq!(dest, Destination::Raw("Narnia".to_string()));
        assert_eq!(dir, Direction::Outbound);
    }

    #[test]
    fn no_pattern_yields_none() {
        assert!(parse_destination("In hospital for 2 hours").is_none());
        assert!(parse_destination("Okay").is_none());
    }

    #[test]
    fn window_bounds_ordered() {
        let info = estimate_travel(
            1_700_000_000_000,
            RouteClass::Standard,
            Destination::Known(Country::Japan),
            Direction::Outbound,
        );
        let (e, l) = (info.earliest.unwrap(), info.latest.unwrap());
        assert!(e <= l);
        // Standard spans business..economy: strictly widened by the split.
        assert!(l - e > 0);
    }

    #[test]
    fn resolved_class_still_padded() {
        let start = 1_700_000_000_000i64;
        let info = estimate_travel(
            start,
            RouteClass::Airstrip,
            Destination::Known(Country::Mexico),
            Direction::Return,
        );
        let flight = RouteClass::Airstrip.flight_secs(Country::Mexico) as f64;
        let e = info.earliest.unwrap() - start / 1000;
        let l = info.latest.unwrap() - start / 1000;
        assert_eq!(e, (flight * 0.97).round() as i64);
        assert_eq!(l, (flight * 1.03).round() as i64);
        assert!(e <= l);
    }

    #[test]
    fn unresolved_destination_gives_null_window() {
        let info = estimate_travel(
            0,
            RouteClass::Standard,
            Destination::Raw("Narnia".to_string()),
            Direction::Outbound,
        );
        assert_eq!(info.earliest, None);
        assert_eq!(info.latest, None);
    }

    #[test]
    fn delay_shifts_both_bounds() {
        let mut info = estimate_travel(
            0,
            RouteClass::Private,
            Destination::Known(Country::Canada),
            Direction::Outbound,
        );
        let (e0, l0) = (info.earliest.unwrap(), info.latest.unwrap());
        info.apply_delay(120);
        assert_eq!(info.earliest.unwrap(), e0 + 120);
        assert_eq!(info.latest.unwrap(), l0 + 120);
    }
}
