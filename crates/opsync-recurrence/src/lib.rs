//! # opsync-recurrence
//!
//! Pure recurrence expansion: given a rule and a last occurrence date,
//! compute the next one; given a template anchor and a window, enumerate
//! the occurrences inside it. No I/O, no clocks — callers supply every
//! date, which keeps the whole crate deterministic and trivially testable.
//!
//! Day-of-week numbering is 0 = Sunday … 6 = Saturday.

#![deny(unsafe_code)]

use chrono::{Datelike, Days, NaiveDate};
use opsync_core::types::{Frequency, RecurrenceRule};

/// One occurrence slot produced by [`generate_occurrences`].
///
/// `index` is the 0-based ordinal within the template's series and stays
/// stable across repeated calls with growing windows: pre-window dates are
/// skipped but still consume an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OccurrenceSlot {
    /// Due date of the occurrence.
    pub date: NaiveDate,
    /// Ordinal within the series, 0-based.
    pub index: u32,
}

/// Compute the next occurrence after `last`, or `None` when the rule's
/// `end_date` terminates the series.
///
/// - Daily: `last + interval` days.
/// - Weekly without explicit days: `last + 7 * interval` days.
/// - Weekly with `days_of_week`: smallest day in the set strictly after
///   `last`'s weekday within the same calendar week; otherwise the smallest
///   day of the week `interval` weeks ahead.
/// - Monthly: advance `interval` months; the day is `day_of_month` (or
///   `last`'s day) clamped to the target month's length, so Jan 31 + 1 month
///   is Feb 28/29, never Mar 3.
#[must_use]
pub fn next_occurrence(last: NaiveDate, rule: &RecurrenceRule) -> Option<NaiveDate> {
    let step = u64::from(rule.step());
    let next = match rule.frequency {
        Frequency::Daily => last.checked_add_days(Days::new(step))?,
        Frequency::Weekly => next_weekly(last, rule, step)?,
        Frequency::Monthly => next_monthly(last, rule)?,
    };

    match rule.end_date {
        Some(end) if next > end => None,
        _ => Some(next),
    }
}

/// Enumerate the occurrences of a template between `from` and
/// `from + window_days`, anchored at `seed` (the template's due date).
///
/// The series is exactly `next_occurrence` chained from `seed`; the seed
/// itself is the template's own row and is not emitted. `existing_count`
/// counts occurrences already materialized and is charged against
/// `max_occurrences`. Dates before `from` are skipped but consume their
/// index so `(template, index)` stays stable as the window advances.
#[must_use]
pub fn generate_occurrences(
    seed: NaiveDate,
    rule: &RecurrenceRule,
    from: NaiveDate,
    window_days: u32,
    existing_count: u32,
) -> Vec<OccurrenceSlot> {
    let Some(horizon) = from.checked_add_days(Days::new(u64::from(window_days))) else {
        return Vec::new();
    };

    let mut slots = Vec::new();
    let mut cursor = seed;
    let mut index = 0u32;
    let mut emitted = 0u32;

    loop {
        if let Some(max) = rule.max_occurrences {
            if existing_count.saturating_add(emitted) >= max {
                break;
            }
        }
        let Some(next) = next_occurrence(cursor, rule) else {
            break;
        };
        if next > horizon {
            break;
        }
        cursor = next;
        if next >= from {
            slots.push(OccurrenceSlot { date: next, index });
            emitted += 1;
        }
        index += 1;
    }

    slots
}

fn next_weekly(last: NaiveDate, rule: &RecurrenceRule, step: u64) -> Option<NaiveDate> {
    let mut days: Vec<u8> = rule
        .days_of_week
        .iter()
        .copied()
        .filter(|d| *d <= 6)
        .collect();
    if days.is_empty() {
        return last.checked_add_days(Days::new(7 * step));
    }
    days.sort_unstable();
    days.dedup();

    let current = last.weekday().num_days_from_sunday() as u8;

    // Later day in the same calendar week, if any.
    if let Some(day) = days.iter().copied().find(|d| *d > current) {
        return last.checked_add_days(Days::new(u64::from(day - current)));
    }

    // Wrap to the first listed day, `interval` weeks ahead.
    let first = days[0];
    let advance = u64::from(7 - current + first) + (step - 1) * 7;
    last.checked_add_days(Days::new(advance))
}

fn next_monthly(last: NaiveDate, rule: &RecurrenceRule) -> Option<NaiveDate> {
    let months_ahead = last.month0() + rule.step();
    let year = last.year() + (months_ahead / 12) as i32;
    let month = months_ahead % 12 + 1;

    let len = days_in_month(year, month);
    let day = rule.day_of_month.unwrap_or_else(|| last.day()).clamp(1, len);
    NaiveDate::from_ymd_opt(year, month, day)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |d| d.day())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
