use std::sync::OnceLock;

use regex::Regex;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(h|hours?|m|min(?:utes?)?|s|sec(?:onds?)?)")
            .unwrap()
    })
}

/// Parse a human duration string into seconds.
///
/// Accepts a bare integer (seconds) or any combination of `<number><unit>`
/// tokens with units `h`, `m`/`min`, `s`/`sec`, in any order, fractional
/// values allowed ("1.5h 10m"). Returns `None` when nothing parses.
pub fn parse_duration(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Some(secs);
    }

    let mut total = 0.0f64;
    let mut matched = false;
    for cap in token_re().captures_iter(text) {
        let value: f64 = match cap[1].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let unit = cap[2].to_ascii_lowercase();
        let mult = match unit.as_bytes()[0] {
            b'h' => 3600.0,
            b'm' => 60.0,
            _ => 1.0,
        };
        total += value * mult;
        matched = true;
    }

    if matched { Some(total.round() as u64) } else { None }
}

/// Render seconds as "XhYmZs", omitting zero components.
///
/// Non-positive input renders as `"now"`. `max_units` truncates the output
/// to the most significant components ("1h 2m 3s" with `max_units = 2` is
/// "1h 2m").
pub fn format_duration(secs: i64, max_units: usize) -> String {
    if secs <= 0 {
        return "now".to_string();
    }
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;

    let mut parts = Vec::new();
    if h > 0 {
        parts.push(format!("{h}h"));
    }
    if m > 0 {
        parts.push(format!("{m}m"));
    }
    if s > 0 {
        parts.push(format!("{s}s"));
    }
    parts.truncate(max_units.max(1));
    parts.join(" ")
}

/// Parse a comma/whitespace separated list of durations into deduplicated
/// seconds, sorted descending (largest threshold first; pre-alert firing
/// iterates in this order). Tokens that fail to parse are skipped.
pub fn parse_duration_list(text: &str) -> Vec<u64> {
    let mut out: Vec<u64> = text
        .split([',', ' ', '\t'])
        .filter(|s| !s.trim().is_empty())
        .filter_map(parse_duration)
        .collect();
    out.sort_unstable_by(|a, b| b.cmp(a));
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_duration ─────────────────────────────────────────────

    #[test]
    fn parse_bare_seconds() {
        assert_eq!(parse_duration("90"), Some(90));
    }

    #[test]
    fn parse_units_any_order() {
        assert_eq!(parse_duration("1h30m"), Some(5400));
        assert_eq!(parse_duration("30m 1h"), Some(5400));
        assert_eq!(parse_duration("2m10s"), Some(130));
    }

    #[test]
    fn parse_long_unit_names() {
        assert_eq!(parse_duration("5min"), Some(300));
        assert_eq!(parse_duration("10 sec"), Some(10));
        assert_eq!(parse_duration("2 hours"), Some(7200));
    }

    #[test]
    fn parse_fractional() {
        assert_eq!(parse_duration("1.5h"), Some(5400));
        assert_eq!(parse_duration("0.5m"), Some(30));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("   "), None);
        assert_eq!(parse_duration("now"), None);
        assert_eq!(parse_duration("abc"), None);
    }

    // ── format_duration ────────────────────────────────────────────

    #[test]
    fn format_zero_and_negative_are_now() {
        assert_eq!(format_duration(0, 3), "now");
        assert_eq!(format_duration(-5, 3), "now");
    }

    #[test]
    fn format_omits_zero_components() {
        assert_eq!(format_duration(3600, 3), "1h");
        assert_eq!(format_duration(3661, 3), "1h 1m 1s");
        assert_eq!(format_duration(61, 3), "1m 1s");
    }

    #[test]
    fn format_truncates_to_max_units() {
        assert_eq!(format_duration(3661, 2), "1h 1m");
        assert_eq!(format_duration(3661, 1), "1h");
    }

    #[test]
    fn roundtrip_same_bucket() {
        for d in [1i64, 59, 60, 3599, 3600, 5400, 86399] {
            let text = format_duration(d, 3);
            assert_eq!(parse_duration(&text), Some(d as u64), "roundtrip {d} via {text}");
        }
    }

    // ── parse_duration_list ────────────────────────────────────────

    #[test]
    fn list_sorted_descending_no_dupes() {
        let list = parse_duration_list("1m, 5m 30s,5m");
        assert_eq!(list, vec![300, 60, 30]);
    }

    #[test]
    fn list_skips_invalid_tokens() {
        let list = parse_duration_list("bogus, 2m, ???");
        assert_eq!(list, vec![120]);
    }

    #[test]
    fn list_empty_input() {
        assert!(parse_duration_list("").is_empty());
        assert!(parse_duration_list("nope").is_empty());
    }
}
