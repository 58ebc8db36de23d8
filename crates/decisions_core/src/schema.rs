use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::{Date, PrimitiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// One row of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DirectoryEntry {
    pub href: String, // percent-encoded, exactly as in the listing
    #[schemars(with = "String")]
    pub modified_at: PrimitiveDateTime, // server wall clock, no zone
    pub modified_text: String, // verbatim listing timestamp
    pub size: Option<u64>,     // None for directories
    pub kind: EntryKind,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Minutes,
    Agenda,
}

impl DocumentType {
    /// Looks up the two-letter type code used in archive filenames.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "Pk" => Some(Self::Minutes),
            "El" => Some(Self::Agenda),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Agenda => "agenda",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate source document discovered by the scanner.
///
/// Only `path` and `last_modified_text` outlive a scan pass; they are what the
/// import-state store remembers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentDescriptor {
    pub path: String,
    pub url: String,
    pub org: String,
    #[schemars(with = "String")]
    pub date: Date,
    pub year: i32,
    pub policymaker_abbr: String,
    pub policymaker_id: String,
    pub meeting_nr: u32,
    pub doc_type_code: String,
    pub doc_type: DocumentType,
    pub language: String,
    pub origin_id: String,
    pub last_modified_text: String, // version token, compared verbatim
    #[schemars(with = "String")]
    pub last_modified: PrimitiveDateTime,
    pub size: u64,
}

impl fmt::Display for DocumentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.origin_id, self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(format!("Unknown severity: {other}")),
        }
    }
}

/// Parser state captured when a diagnostic was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosticState {
    pub filename: String,
    pub current_action: Option<String>,
}

/// A non-fatal problem found while parsing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
    pub state: DiagnosticState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttendeeCategory {
    Participant,
    Expert,
    Other,
}

impl AttendeeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Expert => "expert",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Attendee {
    pub name: String, // "First Last"
    pub role: Option<String>,
    pub title: Option<String>,
    pub category: AttendeeCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub name: String,
    pub location: Option<String>,
    #[schemars(with = "String")]
    pub start_date: PrimitiveDateTime, // Europe/Helsinki wall clock
    #[schemars(with = "String")]
    pub end_date: PrimitiveDateTime,
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Accepted,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Attachment {
    pub id: Option<String>, // lowercase GUID
    pub name: Option<String>,
    pub ordering: Option<u32>,
}

/// One agenda item of a meeting, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Action {
    pub title: Option<String>,
    pub function_id: Option<String>,
    pub function_name: Option<String>,
    pub case_guid: Option<String>,
    pub register_id: Option<String>,
    #[schemars(with = "Option<String>")]
    pub date: Option<PrimitiveDateTime>,
    pub article_number: Option<u32>,
    pub resolution: Option<Resolution>,
    pub content: Option<String>, // HTML fragment
    pub keywords: Vec<String>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionDocument {
    pub document_type: DocumentType,
    pub event: Event,
    pub actions: Vec<Action>,
    pub errors: Vec<Diagnostic>,
}

impl DecisionDocument {
    /// Pretty JSON as `{"document": {...}, "errors": [...]}`.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        let envelope = DocumentEnvelope {
            document: DocumentBody {
                document_type: self.document_type,
                event: &self.event,
                actions: &self.actions,
            },
            errors: &self.errors,
        };
        serde_json::to_string_pretty(&envelope)
    }
}

#[derive(Serialize)]
struct DocumentEnvelope<'a> {
    document: DocumentBody<'a>,
    errors: &'a [Diagnostic],
}

#[derive(Serialize)]
struct DocumentBody<'a> {
    document_type: DocumentType,
    event: &'a Event,
    actions: &'a [Action],
}
