use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::session::Session;

/// Which sessions a cycle should look at.
#[derive(Debug, Clone, Default)]
pub struct SelectionPolicy {
    /// Session codes requested explicitly. Overrides every other rule.
    pub explicit_codes: BTreeSet<String>,
    /// Only the current or next qualifying session.
    pub current_only: bool,
    /// Require every configured station to take part.
    pub all_stations_required: bool,
    pub look_ahead_days: f64,
    pub configured_stations: BTreeSet<String>,
}

impl SelectionPolicy {
    fn admits_stations(&self, session: &Session) -> bool {
        if self.all_stations_required {
            session.relevant_stations == self.configured_stations
        } else {
            !session.relevant_stations.is_empty()
        }
    }

    fn look_ahead(&self) -> Duration {
        Duration::try_milliseconds((self.look_ahead_days * 86_400_000.0).round() as i64)
            .unwrap_or(Duration::MAX)
    }
}

/// Choose the sessions to process from a catalog sorted by start time.
///
/// An empty result is a normal outcome.
pub fn select_sessions<'a>(
    sessions: &'a [Session],
    now: DateTime<Utc>,
    policy: &SelectionPolicy,
) -> Vec<&'a Session> {
    if !policy.explicit_codes.is_empty() {
        return sessions
            .iter()
            .filter(|s| {
                policy
                    .explicit_codes
                    .iter()
                    .any(|code| code.eq_ignore_ascii_case(&s.code))
            })
            .collect();
    }

    if policy.current_only {
        return sessions
            .iter()
            .find(|s| (s.is_running(now) || s.start >= now) && policy.admits_stations(s))
            .into_iter()
            .collect();
    }

    let horizon = now
        .checked_add_signed(policy.look_ahead())
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    sessions
        .iter()
        .filter(|s| s.is_running(now) || (now <= s.start && s.start < horizon))
        .filter(|s| policy.admits_stations(s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stations(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|s| s.to_string()).collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn session(code: &str, start_offset_h: i64, length_h: i64, stns: &[&str]) -> Session {
        let start = now() + Duration::hours(start_offset_h);
        Session::new(
            code,
            start,
            start + Duration::hours(length_h),
            stations(stns),
            &stations(&["hb", "ke", "yg"]),
        )
    }

    fn policy() -> SelectionPolicy {
        SelectionPolicy {
            look_ahead_days: 14.0,
            configured_stations: stations(&["hb", "ke", "yg"]),
            ..Default::default()
        }
    }

    fn catalog() -> Vec<Session> {
        vec![
            session("past", -48, 24, &["hb", "ke"]),
            session("running", -2, 24, &["ny", "wz"]),
            session("soon", 5, 24, &["hb"]),
            session("allof", 30, 24, &["hb", "ke", "yg", "wz"]),
            session("far", 24 * 20, 24, &["hb", "ke", "yg"]),
        ]
    }

    fn codes(sel: Vec<&Session>) -> Vec<&str> {
        sel.into_iter().map(|s| s.code.as_str()).collect()
    }

    #[test]
    fn test_explicit_codes_ignore_time_and_stations() {
        let mut p = policy();
        p.explicit_codes = stations(&["PAST", "running"]);
        p.current_only = true;
        let sessions = catalog();
        assert_eq!(codes(select_sessions(&sessions, now(), &p)), vec!["past", "running"]);
    }

    #[test]
    fn test_current_only_returns_first_qualifying() {
        let mut p = policy();
        p.current_only = true;
        let sessions = catalog();
        // "running" has none of our stations, so "soon" is the current-or-next one
        assert_eq!(codes(select_sessions(&sessions, now(), &p)), vec!["soon"]);

        p.all_stations_required = true;
        assert_eq!(codes(select_sessions(&sessions, now(), &p)), vec!["allof"]);
    }

    #[test]
    fn test_current_only_no_match_is_empty() {
        let mut p = policy();
        p.current_only = true;
        let sessions = vec![session("past", -48, 24, &["hb"])];
        assert!(select_sessions(&sessions, now(), &p).is_empty());
    }

    #[test]
    fn test_periodic_window() {
        let sessions = catalog();
        assert_eq!(
            codes(select_sessions(&sessions, now(), &policy())),
            vec!["soon", "allof"]
        );
    }

    #[test]
    fn test_all_stations_required() {
        let mut p = policy();
        p.all_stations_required = true;
        let sessions = catalog();
        assert_eq!(codes(select_sessions(&sessions, now(), &p)), vec!["allof"]);
    }

    #[test]
    fn test_look_ahead_boundary() {
        let sessions = vec![
            session("in10d", 24 * 10, 24, &["hb"]),
            session("in20d", 24 * 20, 24, &["hb"]),
        ];
        assert_eq!(
            codes(select_sessions(&sessions, now(), &policy())),
            vec!["in10d"]
        );
    }

    #[test]
    fn test_huge_look_ahead_saturates() {
        let mut p = policy();
        p.look_ahead_days = 1e18;
        let sessions = catalog();
        assert_eq!(
            codes(select_sessions(&sessions, now(), &p)),
            vec!["soon", "allof", "far"]
        );
    }

    #[test]
    fn test_running_session_with_our_station_is_selected() {
        let sessions = vec![session("now", -1, 24, &["ke"])];
        let mut p = policy();
        p.look_ahead_days = 0.0;
        assert_eq!(codes(select_sessions(&sessions, now(), &p)), vec!["now"]);
    }
}
