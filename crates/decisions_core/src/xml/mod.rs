//! Fault-tolerant parser for Ahjo decision XML.
//!
//! Missing or odd fields become [`Diagnostic`](crate::schema::Diagnostic)s on
//! the returned document. Parsing only fails when a diagnostic reaches the
//! configured threshold or a field is broken beyond use (malformed GUID,
//! unreadable decision date, no meeting date at all).

mod context;
mod fields;
mod minutes;
mod tree;

pub use context::{OnMissing, ParseContext};
pub use fields::{attendee_category, parse_funcid, parse_guid, parse_name, resolution_from_text};
pub use tree::{read_tree, Element};

use crate::fetch::XmlPayload;
use crate::schema::{DecisionDocument, Severity};
use std::io::BufRead;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    /// A diagnostic at or above the failure threshold.
    #[error("{message}")]
    Threshold { message: String, severity: Severity },
    #[error("Invalid GUID format: {0}")]
    InvalidGuid(String),
    #[error("Unknown timestamp: {0}")]
    UnknownTimestamp(String),
    #[error("Invalid number in {field}: {value:?}")]
    InvalidNumber { field: String, value: String },
    #[error("No date information found")]
    NoDateInformation,
    #[error("Parsing of agendas is not implemented")]
    AgendaNotImplemented,
    #[error("Unknown root tag: {0:?}")]
    UnknownRootTag(String),
    #[error("Malformed XML in {filename}: {source}")]
    Xml {
        filename: String,
        #[source]
        source: quick_xml::Error,
    },
    #[error("Malformed XML in {filename}: {message}")]
    Malformed { filename: String, message: String },
}

/// Parses one decision document.
///
/// `filename` only labels diagnostics. Diagnostics with severity at or above
/// `threshold` abort the parse.
pub fn parse<R: BufRead>(reader: R, filename: &str, threshold: Severity) -> Result<DecisionDocument, ParseError> {
    let root = read_tree(reader, filename)?;
    let mut ctx = ParseContext::new(filename, threshold);
    let mut document = match root.name.as_str() {
        "Poytakirja" => minutes::parse_minutes(&mut ctx, &root)?,
        "Esityslista" => return Err(ParseError::AgendaNotImplemented),
        other => return Err(ParseError::UnknownRootTag(other.to_string())),
    };
    document.errors = ctx.into_errors();
    Ok(document)
}

pub fn parse_payload(payload: &XmlPayload, threshold: Severity) -> Result<DecisionDocument, ParseError> {
    parse(payload.bytes(), &payload.display_name(), threshold)
}
