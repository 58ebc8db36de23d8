//! Value-level parsers for individual minutes fields.

use super::ParseError;
use crate::schema::{AttendeeCategory, Resolution};
use regex::Regex;
use std::sync::LazyLock;

static GUID_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{([A-F0-9]{8}-(?:[A-F0-9]{4}-){3}[A-F0-9]{12})\}$").expect("valid guid regex")
});

static FUNCID_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^((?:\d\d )*\d\d) (.*)$").expect("valid function id regex"));

/// `{123E4567-E89B-12D3-A456-426655440000}` → `123e4567-e89b-12d3-a456-426655440000`.
pub fn parse_guid(raw: &str) -> Result<String, ParseError> {
    GUID_RX
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|guid| guid.as_str().to_ascii_lowercase())
        .ok_or_else(|| ParseError::InvalidGuid(raw.to_string()))
}

/// Splits `"00 00 03 Valtuuston aloitetoiminta"` into the numeric class path
/// and its label.
pub fn parse_funcid(raw: &str) -> Option<(String, String)> {
    let caps = FUNCID_RX.captures(raw)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// `"Last, First"` → `"First Last"`. Anything else is returned unchanged.
pub fn parse_name(raw: &str) -> String {
    let parts: Vec<&str> = raw.split(", ").collect();
    match parts.as_slice() {
        [last, first, ..] => format!("{first} {last}"),
        _ => raw.to_string(),
    }
}

pub fn parse_number(field: &str, raw: &str) -> Result<u32, ParseError> {
    raw.trim().parse().map_err(|_| ParseError::InvalidNumber {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

/// Classifies an attendee group by its heading. Unknown or missing headings
/// count as participants.
pub fn attendee_category(heading: Option<&str>) -> AttendeeCategory {
    match heading.map(|h| h.trim().to_lowercase()).as_deref() {
        Some("asiantuntija" | "asiantuntijat") => AttendeeCategory::Expert,
        Some("muut" | "övriga") => AttendeeCategory::Other,
        _ => AttendeeCategory::Participant,
    }
}

pub fn resolution_from_text(raw: &str) -> Option<Resolution> {
    match raw.trim().to_lowercase().as_str() {
        "hyväksytty" => Some(Resolution::Accepted),
        _ => None,
    }
}
