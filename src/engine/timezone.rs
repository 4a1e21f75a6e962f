//! Store timezone resolution and local/UTC conversion.

use chrono::{DateTime, LocalResult, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Why a store ended up on the default zone even though it had a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneFallback {
    #[error("unrecognised zone id {0:?}")]
    Malformed(String),
    #[error("conflicting zone ids {0:?}")]
    Conflicting(Vec<String>),
}

/// Parse an IANA zone identifier such as `America/Chicago`.
pub fn parse_zone(zone_id: &str) -> Option<Tz> {
    zone_id.trim().parse::<Tz>().ok()
}

/// Resolve the zone for one store from its mapped zone ids.
///
/// No mapping, or only blank ids, means the default zone without complaint. A
/// malformed id or several distinct ids also yield the default zone, but
/// report why.
pub fn resolve_zone(zone_ids: &[&str], default_zone: Tz) -> (Tz, Option<ZoneFallback>) {
    let mut distinct: Vec<&str> = zone_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect();
    distinct.sort_unstable();
    distinct.dedup();

    match distinct.as_slice() {
        [] => (default_zone, None),
        [zone_id] => match parse_zone(zone_id) {
            Some(tz) => (tz, None),
            None => (
                default_zone,
                Some(ZoneFallback::Malformed((*zone_id).to_string())),
            ),
        },
        many => (
            default_zone,
            Some(ZoneFallback::Conflicting(
                many.iter().map(|id| (*id).to_string()).collect(),
            )),
        ),
    }
}

pub fn to_local(instant: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    instant.with_timezone(&tz).naive_local()
}

/// Map a local wall-clock time to a UTC instant.
///
/// Times repeated by a DST fold resolve to the earlier instant. Times skipped
/// by a DST gap are read with the offset in force before the transition,
/// which moves them forward by the length of the gap.
pub fn local_to_utc(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Transitions are never closer than a day apart.
            let before = local - TimeDelta::days(1);
            let offset_secs = tz
                .offset_from_utc_datetime(&before)
                .fix()
                .local_minus_utc();
            (local - TimeDelta::seconds(i64::from(offset_secs))).and_utc()
        }
    }
}
