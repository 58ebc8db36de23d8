//! Parser for the IIS-style HTML directory listings of the archive server.
//!
//! Each entry is an anchor preceded by a text line such as
//! ` 5/23/2017 10:04 AM        &lt;dir&gt;` or `  1/5/2016 11:06 AM       129710`.

use crate::datetime::{civil_datetime, hour_from_12h};
use crate::schema::{DirectoryEntry, EntryKind};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use thiserror::Error;

const PARENT_DIRECTORY_TEXT: &str = "[To Parent Directory]";

static LINE_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*",
        r"(?P<datetime>(?P<month> ?\d|\d\d)/(?P<day> ?\d|\d\d)/(?P<year>\d{4}) (?P<hour> ?\d|\d\d):(?P<minute>\d\d) (?P<ampm>AM|PM))",
        r"\s+",
        r"(?P<size>\d+|<dir>)",
    ))
    .expect("valid listing line regex")
});

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("valid selector"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("Cannot parse preceding text of {href}: {text:?}")]
    UnparseableLine { href: String, text: String },
}

/// A listing row before its text line has been interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListingRow {
    pub href: String,
    pub preceding_text: String,
}

impl RawListingRow {
    pub fn parse(&self) -> Result<DirectoryEntry, ListingError> {
        let fail = || ListingError::UnparseableLine {
            href: self.href.clone(),
            text: self.preceding_text.clone(),
        };
        let caps = LINE_RX.captures(&self.preceding_text).ok_or_else(fail)?;
        let number = |name: &str| {
            caps.name(name)
                .and_then(|m| m.as_str().trim().parse::<u8>().ok())
        };
        let year: i32 = caps["year"].parse().map_err(|_| fail())?;
        let hour = number("hour")
            .and_then(|hour| hour_from_12h(hour, &caps["ampm"]))
            .ok_or_else(fail)?;
        let modified_at = number("month")
            .zip(number("day"))
            .zip(number("minute"))
            .and_then(|((month, day), minute)| civil_datetime(year, month, day, hour, minute, 0))
            .ok_or_else(fail)?;

        let (size, kind) = match &caps["size"] {
            "<dir>" => (None, EntryKind::Directory),
            digits => (Some(digits.parse().map_err(|_| fail())?), EntryKind::File),
        };

        Ok(DirectoryEntry {
            href: self.href.clone(),
            modified_at,
            modified_text: caps["datetime"].to_string(),
            size,
            kind,
        })
    }
}

/// A fetched listing. Rows are interpreted on iteration, so a listing can be
/// walked more than once and a malformed row surfaces exactly where it sits.
#[derive(Debug, Clone, Default)]
pub struct DirListing {
    rows: Vec<RawListingRow>,
}

impl DirListing {
    pub fn iter(&self) -> impl Iterator<Item = Result<DirectoryEntry, ListingError>> + '_ {
        self.rows.iter().map(RawListingRow::parse)
    }
}

impl IntoIterator for DirListing {
    type Item = Result<DirectoryEntry, ListingError>;
    type IntoIter = std::iter::Map<std::vec::IntoIter<RawListingRow>, fn(RawListingRow) -> Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        fn parse_row(row: RawListingRow) -> Result<DirectoryEntry, ListingError> {
            row.parse()
        }
        self.rows.into_iter().map(parse_row as fn(RawListingRow) -> _)
    }
}

pub fn parse_dir_listing(content: &[u8]) -> DirListing {
    let html = String::from_utf8_lossy(content);
    let document = Html::parse_document(&html);
    let rows = document
        .select(&ANCHOR)
        .filter(|anchor| anchor.text().collect::<String>().trim() != PARENT_DIRECTORY_TEXT)
        .map(|anchor| RawListingRow {
            href: anchor.value().attr("href").unwrap_or_default().to_string(),
            preceding_text: preceding_text(anchor),
        })
        .collect();
    DirListing { rows }
}

/// Text between the anchor and the closest element before it. Empty when the
/// anchor has no element sibling in front of it.
fn preceding_text(anchor: ElementRef<'_>) -> String {
    let mut pieces = Vec::new();
    for node in anchor.prev_siblings() {
        if let Some(text) = node.value().as_text() {
            pieces.push(&**text);
        } else if node.value().is_element() {
            pieces.reverse();
            return pieces.concat();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn flatten(raw: &str) -> Vec<u8> {
        raw.replace('\n', "").replace(r"\r\n", "\r\n").into_bytes()
    }

    fn root_listing() -> Vec<u8> {
        flatten(
            r#"
<html><head><title>openhelsinki.hel.fi - /files/</title></head>
<body><H1>openhelsinki.hel.fi - /files/</H1><hr>\r\n\r\n
<pre>
<A HREF="/">[To Parent Directory]</A><br><br>

 5/23/2017 10:04 AM        &lt;dir&gt;
 <A HREF="/files/Asuntolautakunta_60014/">
Asuntolautakunta_60014</A><br>

11/22/2014 11:02 AM        &lt;dir&gt;
 <A HREF="/files/Henkiloston%20kehittamispalvelut-liikelaitos_01900/">
Henkiloston kehittamispalvelut-liikelaitos_01900</A><br>

 6/21/2017  1:00 PM        &lt;dir&gt;
 <A HREF="/files/Kaupunkiymparistolautakunta_U540/">
Kaupunkiymparistolautakunta_U540</A><br>

</pre><hr></body></html>
"#,
        )
    }

    fn subdir_listing() -> Vec<u8> {
        flatten(
            r#"
<html><head><title>openhelsinki.hel.fi - /files/Tietokeskus_02300/</title></head><body>
<hr>\r\n\r\n
<pre>
<A HREF="/files/Tietokeskus_02300/">[To Parent Directory]</A><br><br>

  1/5/2016 11:06 AM       129710
 <A HREF="/files/Tietokeskus_02300/
Tilasto-%20ja%20tietopalvelupaallikko_023400VH1/
Tieke%202016-01-04%20023400VH1%201%20Pk%20Su.zip">
Tieke 2016-01-04 023400VH1 1 Pk Su.zip</A><br>

10/27/2016 12:03 PM       179324
 <A HREF="/files/Tietokeskus_02300/
Tilasto-%20ja%20tietopalvelupaallikko_023400VH1/
Tieke%202016-10-26%20023400VH1%203%20Pk%20Su.zip">
Tieke 2016-10-26 023400VH1 3 Pk Su.zip</A><br>

</pre><hr></body></html>
"#,
        )
    }

    fn expand(listing: &DirListing) -> Vec<(String, time::PrimitiveDateTime, Option<u64>, EntryKind)> {
        listing
            .iter()
            .map(|entry| {
                let entry = entry.unwrap();
                (entry.href, entry.modified_at, entry.size, entry.kind)
            })
            .collect()
    }

    #[test]
    fn root_listing_entries() {
        let listing = parse_dir_listing(&root_listing());
        assert_eq!(
            expand(&listing),
            vec![
                (
                    "/files/Asuntolautakunta_60014/".to_string(),
                    datetime!(2017-05-23 10:04),
                    None,
                    EntryKind::Directory
                ),
                (
                    "/files/Henkiloston%20kehittamispalvelut-liikelaitos_01900/".to_string(),
                    datetime!(2014-11-22 11:02),
                    None,
                    EntryKind::Directory
                ),
                (
                    "/files/Kaupunkiymparistolautakunta_U540/".to_string(),
                    datetime!(2017-06-21 13:00),
                    None,
                    EntryKind::Directory
                ),
            ]
        );
    }

    #[test]
    fn subdir_listing_entries() {
        let prefix = "/files/Tietokeskus_02300/Tilasto-%20ja%20tietopalvelupaallikko_023400VH1/";
        let listing = parse_dir_listing(&subdir_listing());
        assert_eq!(
            expand(&listing),
            vec![
                (
                    format!("{prefix}Tieke%202016-01-04%20023400VH1%201%20Pk%20Su.zip"),
                    datetime!(2016-01-05 11:06),
                    Some(129710),
                    EntryKind::File
                ),
                (
                    format!("{prefix}Tieke%202016-10-26%20023400VH1%203%20Pk%20Su.zip"),
                    datetime!(2016-10-27 12:03),
                    Some(179324),
                    EntryKind::File
                ),
            ]
        );
    }

    #[test]
    fn version_token_is_verbatim_listing_text() {
        let listing = parse_dir_listing(&root_listing());
        let tokens: Vec<String> = listing.iter().map(|e| e.unwrap().modified_text).collect();
        assert_eq!(tokens, vec!["5/23/2017 10:04 AM", "11/22/2014 11:02 AM", "6/21/2017  1:00 PM"]);
    }

    #[test]
    fn listing_can_be_walked_twice() {
        let listing = parse_dir_listing(&subdir_listing());
        assert_eq!(listing.iter().count(), 2);
        assert_eq!(expand(&listing), expand(&listing));
        assert_eq!(listing.clone().into_iter().count(), 2);
    }

    #[test]
    fn malformed_row_is_an_error() {
        let html = b"<pre><A HREF=\"/\">[To Parent Directory]</A><br><br>\
            yesterday <A HREF=\"/files/x.zip\">x.zip</A><br></pre>";
        let listing = parse_dir_listing(html);
        let results: Vec<_> = listing.iter().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0],
            Err(ListingError::UnparseableLine {
                href: "/files/x.zip".into(),
                text: "yesterday ".into()
            })
        );
    }
}
