//! Access to the remote archive: directory listings and the XML payload of
//! the ZIP files they point to.

mod http;
mod range;
mod retry;

pub use http::{FetchMode, HttpArchive, HttpConfig};
pub use range::RangeReader;
pub use retry::{BackoffPolicy, RetryPolicy};

use regex::Regex;
use std::io::{Cursor, Read, Seek};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

// One batch was zipped with members named like "Pk2016xml_..." and no suffix.
// Declared member sizes come from the archive and only bound the first allocation.
const MAX_PREALLOCATED: u64 = 1 << 20;

static MISZIPPED_XML_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+\d+xml_").expect("valid member regex"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to fetch {url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("Server does not support HTTP Range feature: {0}")]
    RangeUnsupported(String),
    #[error("No XML file in ZIP: {0}")]
    NoXmlMember(String),
    #[error("Too many XML files in ZIP: {0}")]
    TooManyXmlMembers(String),
    #[error("Invalid ZIP archive {url}: {source}")]
    Zip {
        url: String,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("I/O error reading {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("No such path: {0}")]
    NotFound(String),
}

/// Fetches raw listing pages, `GET {base}{path}`.
pub trait DirectoryFetcher {
    fn fetch_listing(&self, path: &str) -> Result<Vec<u8>, FetchError>;
}

/// Opens the single XML document inside a remote ZIP archive.
pub trait DocumentFetcher {
    fn open_remote_xml(&self, url: &str) -> Result<XmlPayload, FetchError>;
}

/// The XML member of an archive, fully read and seekable.
#[derive(Debug, Clone)]
pub struct XmlPayload {
    pub url: String,
    pub member_name: String,
    pub reader: Cursor<Vec<u8>>,
}

impl XmlPayload {
    pub fn bytes(&self) -> &[u8] {
        self.reader.get_ref()
    }

    /// Name used in parser diagnostics.
    pub fn display_name(&self) -> String {
        format!("{}!{}", self.url, self.member_name)
    }
}

/// Picks the XML member out of a ZIP archive and reads it.
pub fn extract_xml<R: Read + Seek>(url: &str, archive: R) -> Result<XmlPayload, FetchError> {
    let mut zip = zip::ZipArchive::new(archive).map_err(|source| FetchError::Zip {
        url: url.to_string(),
        source,
    })?;
    let names: Vec<String> = zip.file_names().map(str::to_string).collect();
    let member_name = select_xml_member(url, &names)?;
    debug!(url, member = %member_name, "reading XML member");

    let mut member = zip.by_name(&member_name).map_err(|source| FetchError::Zip {
        url: url.to_string(),
        source,
    })?;
    let mut bytes = Vec::with_capacity(member.size().min(MAX_PREALLOCATED) as usize);
    member.read_to_end(&mut bytes).map_err(|source| FetchError::Io {
        url: url.to_string(),
        source,
    })?;

    Ok(XmlPayload {
        url: url.to_string(),
        member_name,
        reader: Cursor::new(bytes),
    })
}

fn select_xml_member(url: &str, names: &[String]) -> Result<String, FetchError> {
    let mut xml_names: Vec<&String> = names.iter().filter(|name| name.ends_with(".xml")).collect();
    if xml_names.is_empty() {
        xml_names = names
            .iter()
            .filter(|name| MISZIPPED_XML_RX.is_match(name))
            .collect();
    }
    match xml_names.as_slice() {
        [single] => Ok((*single).clone()),
        [] => Err(FetchError::NoXmlMember(url.to_string())),
        _ => Err(FetchError::TooManyXmlMembers(url.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_with(members: &[(&str, &str)]) -> Cursor<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in members {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn reads_single_xml_member() {
        let archive = zip_with(&[("liite.pdf", "%PDF"), ("poytakirja.xml", "<Poytakirja/>")]);
        let payload = extract_xml("http://x/a.zip", archive).unwrap();
        assert_eq!(payload.member_name, "poytakirja.xml");
        assert_eq!(payload.bytes(), b"<Poytakirja/>");
    }

    #[test]
    fn falls_back_to_miszipped_member_name() {
        let archive = zip_with(&[("Pk2016xml_12345", "<Poytakirja/>"), ("notes.txt", "")]);
        let payload = extract_xml("http://x/a.zip", archive).unwrap();
        assert_eq!(payload.member_name, "Pk2016xml_12345");
    }

    #[test]
    fn zero_or_many_xml_members_fail() {
        let none = extract_xml("http://x/none.zip", zip_with(&[("a.txt", "")]));
        assert!(matches!(none, Err(FetchError::NoXmlMember(url)) if url == "http://x/none.zip"));

        let many = extract_xml("http://x/many.zip", zip_with(&[("a.xml", ""), ("b.xml", "")]));
        assert!(matches!(many, Err(FetchError::TooManyXmlMembers(_))));
    }

    fn patch_u32(bytes: &mut [u8], signature: u32, offset: usize, value: u32) {
        let signature = signature.to_le_bytes();
        let start = bytes
            .windows(4)
            .position(|window| window == signature)
            .unwrap();
        bytes[start + offset..start + offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn declared_member_size_does_not_drive_allocation() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("poytakirja.xml", stored).unwrap();
        writer.write_all(b"<Poytakirja/>").unwrap();
        let mut bytes = writer.finish().unwrap().into_inner();
        // uncompressed size in the local header and in the central directory
        patch_u32(&mut bytes, 0x0403_4b50, 22, 0xFFFF_FF00);
        patch_u32(&mut bytes, 0x0201_4b50, 24, 0xFFFF_FF00);

        match extract_xml("http://x/huge.zip", Cursor::new(bytes)) {
            Ok(payload) => {
                assert_eq!(payload.bytes(), b"<Poytakirja/>");
                assert!(payload.reader.get_ref().capacity() <= MAX_PREALLOCATED as usize);
            }
            Err(err) => assert!(matches!(err, FetchError::Zip { .. } | FetchError::Io { .. })),
        }
    }

    #[test]
    fn garbage_is_not_a_zip() {
        let result = extract_xml("http://x/bad.zip", Cursor::new(b"not a zip".to_vec()));
        assert!(matches!(result, Err(FetchError::Zip { .. })));
    }
}
