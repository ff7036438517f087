// Service-day calendar arithmetic.
//
// Service availability is compacted to a u64 bitmap: bit d is set iff
// the service runs d days after the tile's reference date. A 64-bit
// mask bounds one tile build to a rolling ~two-month window; feeds
// whose window misses the tile entirely compact to 0 and are rejected
// upstream with a warning.

use anyhow::{Context, Result};
use chrono::{Datelike, Days, NaiveDate};

/// Fixed epoch for day counts stored in tiles.
pub fn pivot_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2014, 1, 1).unwrap()
}

/// Width of the service-day bitmap window.
pub const MAX_SERVICE_DAYS: u32 = 60;

/// Days from the pivot date, saturating at 0 for earlier dates.
pub fn days_from_pivot(date: NaiveDate) -> u32 {
    let delta = date.signed_duration_since(pivot_date()).num_days();
    delta.max(0) as u32
}

/// Parse a YYYYMMDD integer. Malformed dates are a hard error.
pub fn parse_yyyymmdd(value: u32) -> Result<NaiveDate> {
    let year = (value / 10000) as i32;
    let month = (value / 100) % 100;
    let day = value % 100;
    NaiveDate::from_ymd_opt(year, month, day)
        .with_context(|| format!("invalid YYYYMMDD date {}", value))
}

/// Build a day-of-week mask from the seven-entry Monday-first flag
/// vector. Monday = bit 0 .. Sunday = bit 6.
pub fn dow_mask(days_of_week: &[bool]) -> u32 {
    let mut mask = 0;
    for (i, &dow) in days_of_week.iter().take(7).enumerate() {
        if dow {
            mask |= 1 << i;
        }
    }
    mask
}

fn matches_dow(date: NaiveDate, mask: u32) -> bool {
    mask & (1 << date.weekday().num_days_from_monday()) != 0
}

/// Bitmap of calendar days in [start, end] matching `dow_mask`,
/// aligned so bit 0 is `tile_ref` (days from pivot). Empty
/// intersection yields 0.
pub fn service_days(start: NaiveDate, end: NaiveDate, tile_ref: u32, dow_mask: u32) -> u64 {
    let ref_date = pivot_date() + Days::new(u64::from(tile_ref));
    let mut days = 0u64;
    for d in 0..MAX_SERVICE_DAYS {
        let date = ref_date + Days::new(u64::from(d));
        if date < start || date > end {
            continue;
        }
        if matches_dow(date, dow_mask) {
            days |= 1 << d;
        }
    }
    days
}

/// Number of days from feed start to feed end, stored per departure
/// for later expiry handling.
pub fn end_day(start: NaiveDate, end: NaiveDate) -> u32 {
    days_from_pivot(end).saturating_sub(days_from_pivot(start))
}

/// Bit position of `date` in a bitmap anchored at `tile_ref`, if the
/// date lies inside the feed window and the bitmap window.
fn service_day_bit(start: NaiveDate, end: NaiveDate, tile_ref: u32, date: NaiveDate) -> Option<u32> {
    if date < start || date > end {
        return None;
    }
    let ref_date = pivot_date() + Days::new(u64::from(tile_ref));
    let day = date.signed_duration_since(ref_date).num_days();
    if day < 0 || day >= i64::from(MAX_SERVICE_DAYS) {
        return None;
    }
    Some(day as u32)
}

/// Set the bit for `date` if it lies within the feed's validity
/// window. No-op out of window.
pub fn add_service_day(
    days: u64,
    start: NaiveDate,
    end: NaiveDate,
    tile_ref: u32,
    date: NaiveDate,
) -> u64 {
    match service_day_bit(start, end, tile_ref, date) {
        Some(bit) => days | 1 << bit,
        None => days,
    }
}

/// Clear the bit for `date` if it lies within the feed's validity
/// window. No-op out of window.
pub fn remove_service_day(
    days: u64,
    start: NaiveDate,
    end: NaiveDate,
    tile_ref: u32,
    date: NaiveDate,
) -> u64 {
    match service_day_bit(start, end, tile_ref, date) {
        Some(bit) => days & !(1 << bit),
        None => days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ref_day() -> u32 {
        // 2016-01-04 is a Monday.
        days_from_pivot(NaiveDate::from_ymd_opt(2016, 1, 4).unwrap())
    }

    fn ref_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 1, 4).unwrap()
    }

    #[test]
    fn test_weekday_window() {
        // Mon-Fri service, start = ref, end = ref + 20 days.
        let mask = dow_mask(&[true, true, true, true, true, false, false]);
        let start = ref_date();
        let end = start + Days::new(20);
        let days = service_days(start, end, ref_day(), mask);

        for d in 0..MAX_SERVICE_DAYS {
            let date = start + Days::new(u64::from(d));
            let expected = d <= 20 && date.weekday().num_days_from_monday() < 5;
            assert_eq!(days & (1 << d) != 0, expected, "bit {}", d);
        }
    }

    #[test]
    fn test_alignment_to_tile_ref() {
        // Feed starts 3 days after the tile reference; bits 0..2 must
        // stay clear.
        let mask = dow_mask(&[true; 7]);
        let start = ref_date() + Days::new(3);
        let end = start + Days::new(10);
        let days = service_days(start, end, ref_day(), mask);
        assert_eq!(days & 0b111, 0);
        assert!(days & (1 << 3) != 0);
    }

    #[test]
    fn test_window_ends_before_ref() {
        let mask = dow_mask(&[true; 7]);
        let start = ref_date() - Days::new(30);
        let end = ref_date() - Days::new(10);
        assert_eq!(service_days(start, end, ref_day(), mask), 0);
    }

    #[test]
    fn test_exception_clears_bit() {
        let mask = dow_mask(&[true; 7]);
        let start = ref_date();
        let end = start + Days::new(20);
        let days = service_days(start, end, ref_day(), mask);
        let except = start + Days::new(3);
        let removed = remove_service_day(days, start, end, ref_day(), except);
        assert_eq!(days & !(1 << 3), removed);
        // Adding it back restores the original bitmap.
        assert_eq!(
            add_service_day(removed, start, end, ref_day(), except),
            days
        );
    }

    #[test]
    fn test_add_is_idempotent_and_windowed() {
        let mask = dow_mask(&[true, true, true, true, true, false, false]);
        let start = ref_date();
        let end = start + Days::new(20);
        let days = service_days(start, end, ref_day(), mask);

        // Saturday inside the window: added once, adding twice changes
        // nothing further.
        let saturday = start + Days::new(5);
        let once = add_service_day(days, start, end, ref_day(), saturday);
        assert!(once & (1 << 5) != 0);
        assert_eq!(add_service_day(once, start, end, ref_day(), saturday), once);

        // A date past the feed end is a no-op.
        let out = end + Days::new(10);
        assert_eq!(add_service_day(days, start, end, ref_day(), out), days);
        // So is one before the tile reference.
        let early = start - Days::new(1);
        assert_eq!(
            add_service_day(days, start - Days::new(5), end, ref_day(), early),
            days
        );
    }

    #[test]
    fn test_end_day() {
        let start = ref_date();
        let end = start + Days::new(57);
        assert_eq!(end_day(start, end), 57);
        assert_eq!(end_day(end, start), 0);
    }

    #[test]
    fn test_parse_yyyymmdd() {
        assert_eq!(
            parse_yyyymmdd(20160104).unwrap(),
            NaiveDate::from_ymd_opt(2016, 1, 4).unwrap()
        );
        assert!(parse_yyyymmdd(20161350).is_err());
        assert!(parse_yyyymmdd(0).is_err());
    }
}
