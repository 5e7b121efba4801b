//! Look-ahead window checks against a coverage's time axis.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

use crate::util::truncate_to_hour;

/// The `hours` hourly timestamps following `now`, starting at the next full hour.
pub fn required_timestamps(now: DateTime<Utc>, hours: usize) -> Vec<DateTime<Utc>> {
    let start = truncate_to_hour(now);
    (1..=hours as i64)
        .map(|i| start + Duration::hours(i))
        .collect()
}

/// Timestamps of `required` absent from `available`, in order.
pub fn missing_timestamps(
    required: &[DateTime<Utc>],
    available: &[DateTime<Utc>],
) -> Vec<DateTime<Utc>> {
    let available: BTreeSet<_> = available.iter().collect();
    required
        .iter()
        .filter(|t| !available.contains(t))
        .copied()
        .collect()
}

pub fn covers(required: &[DateTime<Utc>], available: &[DateTime<Utc>]) -> bool {
    missing_timestamps(required, available).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hourly_range;
    use chrono::TimeZone;

    #[test]
    fn window_starts_at_next_full_hour() {
        let now = Utc.with_ymd_and_hms(2020, 3, 24, 6, 42, 0).unwrap();
        let req = required_timestamps(now, 3);
        assert_eq!(
            req,
            vec![
                Utc.with_ymd_and_hms(2020, 3, 24, 7, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2020, 3, 24, 8, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2020, 3, 24, 9, 0, 0).unwrap(),
            ]
        );
        assert!(required_timestamps(now, 0).is_empty());
    }

    #[test]
    fn twenty_four_hours_fit_twenty_five_do_not() {
        let now = Utc.with_ymd_and_hms(2020, 3, 24, 6, 10, 0).unwrap();
        let reference = Utc.with_ymd_and_hms(2020, 3, 24, 7, 0, 0).unwrap();
        let available = hourly_range(reference, reference + Duration::hours(23));
        assert_eq!(available.len(), 24);

        assert!(covers(&required_timestamps(now, 24), &available));
        let missing = missing_timestamps(&required_timestamps(now, 25), &available);
        assert_eq!(missing, vec![reference + Duration::hours(24)]);
    }
}
