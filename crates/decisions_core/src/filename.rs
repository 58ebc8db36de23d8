//! Metadata carried in archive file paths.
//!
//! A well-formed path looks like
//! `/files/Tietokeskus_02300/Tieke%202016-01-04%20023400VH1%201%20Pk%20Su.zip`:
//! the parent directory ends in `_<policymaker id>` and the filename holds
//! organization, date, policymaker, meeting number, type code and an optional
//! language, separated by encoded spaces.

use crate::datetime::parse_iso_date;
use crate::schema::DocumentType;
use regex::Regex;
use std::sync::LazyLock;
use time::Date;

/// Language code assumed when the filename does not carry one.
pub const DEFAULT_LANGUAGE: &str = "Su";

static FILENAME_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<org>.+)",
        r"%20(?P<date>\d{4}-\d\d-\d\d)",
        r"%20(?P<policymaker>.+)",
        r"%20(?P<meeting_nr>\d+)",
        r"%20(?P<doc_type_code>[^%./]+)",
        r"(?:%20(?P<language>[^.%/][^./]*))?",
        r"\.zip$",
    ))
    .expect("valid filename regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePathInfo {
    pub org: String,
    pub date: Date,
    pub year: i32,
    pub policymaker_abbr: String,
    pub policymaker_id: String,
    pub meeting_nr: u32,
    pub doc_type_code: String,
    /// `None` when the type code is not in the code table.
    pub doc_type: Option<DocumentType>,
    /// As written in the filename; `None` when absent.
    pub language: Option<String>,
    pub origin_id: String,
}

impl FilePathInfo {
    /// Language with the Finnish default applied.
    pub fn language_or_default(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }

    /// Rebuilds the percent-encoded filename these fields were parsed from.
    pub fn file_name(&self) -> String {
        let mut name = format!(
            "{}%20{}%20{}%20{}%20{}",
            self.org, self.date, self.policymaker_abbr, self.meeting_nr, self.doc_type_code
        );
        if let Some(language) = &self.language {
            name.push_str("%20");
            name.push_str(language);
        }
        name.push_str(".zip");
        name
    }
}

/// Parses a listing href into document metadata.
///
/// Returns `None` for anything that does not follow the naming scheme; the
/// archive is full of those and callers skip them.
pub fn parse_file_path(path: &str) -> Option<FilePathInfo> {
    let (dir_path, file_name) = path.rsplit_once('/')?;
    let dir_name = dir_path.rsplit('/').next().unwrap_or_default();
    let policymaker_id = dir_name.rsplit('_').next().unwrap_or_default().trim();

    let caps = FILENAME_RX.captures(file_name)?;
    let org = caps.name("org")?.as_str();
    let date_text = caps.name("date")?.as_str();
    let policymaker = caps.name("policymaker")?.as_str();
    let doc_type_code = caps.name("doc_type_code")?.as_str();

    let date = parse_iso_date(date_text)?;
    let meeting_nr: u32 = caps.name("meeting_nr")?.as_str().parse().ok()?;
    let year = date.year();

    Some(FilePathInfo {
        org: org.to_string(),
        date,
        year,
        policymaker_abbr: policymaker.to_string(),
        policymaker_id: policymaker_id.to_string(),
        meeting_nr,
        doc_type_code: doc_type_code.to_string(),
        doc_type: DocumentType::from_code(doc_type_code),
        language: caps.name("language").map(|m| m.as_str().to_string()),
        origin_id: format!("{org}_{policymaker}_{year}-{meeting_nr}_{doc_type_code}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    const TIEKE: &str = "/files/Tietokeskus_02300/Tilasto-%20ja%20tietopalvelupaallikko_023400VH1/Tieke%202016-01-04%20023400VH1%201%20Pk%20Su.zip";

    #[test]
    fn parses_listing_href() {
        let info = parse_file_path(TIEKE).unwrap();
        assert_eq!(
            info,
            FilePathInfo {
                org: "Tieke".into(),
                date: date!(2016 - 01 - 04),
                year: 2016,
                policymaker_abbr: "023400VH1".into(),
                policymaker_id: "023400VH1".into(),
                meeting_nr: 1,
                doc_type_code: "Pk".into(),
                doc_type: Some(DocumentType::Minutes),
                language: Some("Su".into()),
                origin_id: "Tieke_023400VH1_2016-1_Pk".into(),
            }
        );
    }

    #[test]
    fn policymaker_id_comes_from_parent_directory() {
        let info = parse_file_path("/files/Org_X/Org%202016-01-04%20ABC%201%20Pk%20Su.zip").unwrap();
        assert_eq!(info.org, "Org");
        assert_eq!(info.policymaker_abbr, "ABC");
        assert_eq!(info.policymaker_id, "X");
        assert_eq!(info.meeting_nr, 1);
        assert_eq!(info.doc_type, Some(DocumentType::Minutes));
        assert_eq!(info.language.as_deref(), Some("Su"));
        assert_eq!(info.origin_id, "Org_ABC_2016-1_Pk");
    }

    #[test]
    fn multi_word_fields_and_missing_language() {
        let info = parse_file_path(
            "/files/Kaupunginhallitus_00400/Halke%202013-08-26%20Koja%20jaosto%2011%20El.zip",
        )
        .unwrap();
        assert_eq!(info.policymaker_abbr, "Koja%20jaosto");
        assert_eq!(info.meeting_nr, 11);
        assert_eq!(info.doc_type, Some(DocumentType::Agenda));
        assert_eq!(info.language, None);
        assert_eq!(info.language_or_default(), "Su");
        assert_eq!(info.origin_id, "Halke_Koja%20jaosto_2013-11_El");
    }

    #[test]
    fn unknown_type_code_is_kept_raw() {
        let info = parse_file_path("/files/A_1/Org%202016-01-04%20ABC%201%20Xx%20Su.zip").unwrap();
        assert_eq!(info.doc_type_code, "Xx");
        assert_eq!(info.doc_type, None);
    }

    #[test]
    fn non_matching_names_are_none() {
        for path in [
            "/files/A_1/readme.txt",
            "/files/A_1/Org 2016-01-04 ABC 1 Pk Su.zip",
            "/files/A_1/Org%20201-01-04%20ABC%201%20Pk.zip",
            "/files/A_1/Org%202016-01-04%20ABC%20x%20Pk.zip",
            "/files/A_1/Org%202016-13-04%20ABC%201%20Pk.zip",
            "no-slash.zip",
        ] {
            assert_eq!(parse_file_path(path), None, "{path}");
        }
    }

    #[test]
    fn reparsing_rebuilt_name_is_stable() {
        for path in [
            TIEKE,
            "/files/Kaupunginhallitus_00400/Halke%202013-08-26%20Koja%2011%20El.zip",
            "/files/Sote_81000/Sote%202013-06-04%20Sotelk%209%20Pk%20Ru.zip",
        ] {
            let info = parse_file_path(path).unwrap();
            let (dir, _) = path.rsplit_once('/').unwrap();
            let rebuilt = format!("{dir}/{}", info.file_name());
            assert_eq!(rebuilt, path);
            assert_eq!(parse_file_path(&rebuilt), Some(info));
        }
    }
}
