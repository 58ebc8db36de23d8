//! Wall-clock parsing for the loosely formatted timestamps in listings and
//! minutes documents. All values are naive; the archive server and the
//! documents both speak Helsinki local time.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use time::{Date, Month, PrimitiveDateTime, Time};

// Free-text meeting time, e.g. "Torstai 3.3.2016 kello 16:00 - 19:04".
static DATE_RANGE_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:\w+ )?(?P<date>\d{1,2}.\d{1,2}.\d{4}) (?:\w+ )?(?P<start>\d{1,2}[:.]\d\d) ?- ?(?P<end>\d{1,2}[:.]\d\d)",
    )
    .expect("valid date range regex")
});

// Decision dates. Twelve-hour layouts come first in each family.
static TIMESTAMP_FORMATS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(?P<m>\d{1,2})/(?P<d>\d{1,2})/(?P<y>\d{4}) (?P<h>\d{1,2}):(?P<min>\d{1,2}):(?P<s>\d{1,2}) (?P<ampm>(?i:am|pm))$",
        r"^(?P<m>\d{1,2})/(?P<d>\d{1,2})/(?P<y>\d{4}) (?P<h>\d{1,2}):(?P<min>\d{1,2}):(?P<s>\d{1,2})$",
        r"^(?P<d>\d{1,2})\.(?P<m>\d{1,2})\.(?P<y>\d{4}) (?P<h>\d{1,2}):(?P<min>\d{1,2}):(?P<s>\d{1,2}) (?P<ampm>(?i:am|pm))$",
        r"^(?P<d>\d{1,2})\.(?P<m>\d{1,2})\.(?P<y>\d{4}) (?P<h>\d{1,2}):(?P<min>\d{1,2}):(?P<s>\d{1,2})$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid timestamp regex"))
    .collect()
});

/// Builds a date from calendar numbers, rejecting out-of-range values.
pub fn civil_date(year: i32, month: u8, day: u8) -> Option<Date> {
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

pub fn civil_datetime(
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Option<PrimitiveDateTime> {
    let date = civil_date(year, month, day)?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

/// Converts a 12-hour clock reading to 24-hour.
pub fn hour_from_12h(hour: u8, meridiem: &str) -> Option<u8> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = meridiem.eq_ignore_ascii_case("pm");
    Some(match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    })
}

/// Parses an ISO `YYYY-MM-DD` date.
pub fn parse_iso_date(raw: &str) -> Option<Date> {
    let mut parts = raw.trim().splitn(3, '-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    civil_date(year, month, day)
}

/// Parses a decision timestamp in any of the known layouts.
pub fn parse_timestamp(raw: &str) -> Option<PrimitiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|rx| rx.captures(raw).and_then(|caps| timestamp_from_captures(&caps)))
}

fn timestamp_from_captures(caps: &Captures<'_>) -> Option<PrimitiveDateTime> {
    let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u8>().ok());
    let year = caps.name("y")?.as_str().parse().ok()?;
    let mut hour = number("h")?;
    if let Some(meridiem) = caps.name("ampm") {
        hour = hour_from_12h(hour, meridiem.as_str())?;
    }
    civil_datetime(year, number("m")?, number("d")?, hour, number("min")?, number("s")?)
}

/// Parses a human-written meeting time such as `"02.02.2016 16:30 - 19:37"`
/// into start and end. Trailing text (breaks, extra sessions) is ignored.
/// Returns `None` for anything that does not look like a range.
pub fn parse_datetime_range(raw: Option<&str>) -> Option<(PrimitiveDateTime, PrimitiveDateTime)> {
    let caps = DATE_RANGE_RX.captures(raw?)?;
    let date = parse_dotted_date(caps.name("date")?.as_str())?;
    let start = parse_clock(caps.name("start")?.as_str())?;
    let end = parse_clock(caps.name("end")?.as_str())?;
    Some((PrimitiveDateTime::new(date, start), PrimitiveDateTime::new(date, end)))
}

fn parse_dotted_date(raw: &str) -> Option<Date> {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    civil_date(parts[2].parse().ok()?, parts[1].parse().ok()?, parts[0].parse().ok()?)
}

fn parse_clock(raw: &str) -> Option<Time> {
    let (hour, minute) = raw.split_once([':', '.'])?;
    Time::from_hms(hour.parse().ok()?, minute.parse().ok()?, 0).ok()
}
