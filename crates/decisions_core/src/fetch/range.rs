use super::http::is_transient;
use super::retry::RetryPolicy;
use super::FetchError;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::io::{self, Read, Seek, SeekFrom};

/// A remote file read through HTTP `Range` requests.
///
/// Every `read` is one request for exactly the bytes asked for, so wrap it in
/// a `BufReader` before handing it to anything that reads in small pieces.
#[derive(Debug)]
pub struct RangeReader {
    client: Client,
    url: String,
    retry: RetryPolicy,
    pos: u64,
    len: Option<u64>,
}

impl RangeReader {
    pub fn new(client: Client, url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            url: url.into(),
            retry,
            pos: 0,
            len: None,
        }
    }

    fn fetch_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>, FetchError> {
        let url = self.url.clone();
        let client = self.client.clone();
        let (body, total) = self.retry.run(
            || {
                let response = client
                    .get(&url)
                    .header(RANGE, format!("bytes={start}-{end}"))
                    .send()
                    .map_err(|source| FetchError::Http {
                        url: url.clone(),
                        source,
                    })?;
                match response.status() {
                    StatusCode::PARTIAL_CONTENT => {}
                    StatusCode::RANGE_NOT_SATISFIABLE => return Ok((Vec::new(), None)),
                    status if status.is_success() => return Err(FetchError::RangeUnsupported(url.clone())),
                    status => {
                        return Err(FetchError::Status {
                            url: url.clone(),
                            status: status.as_u16(),
                        });
                    }
                }
                let total = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_content_range_total);
                let body = response.bytes().map_err(|source| FetchError::Http {
                    url: url.clone(),
                    source,
                })?;
                Ok((body.to_vec(), total))
            },
            is_transient,
        )?;
        if total.is_some() {
            self.len = total;
        }
        Ok(body)
    }

    fn length(&mut self) -> io::Result<u64> {
        if let Some(len) = self.len {
            return Ok(len);
        }
        self.fetch_range(0, 0).map_err(into_io)?;
        self.len
            .ok_or_else(|| io::Error::other(format!("No Content-Range length for {}", self.url)))
    }
}

/// Total length from a `Content-Range: bytes 0-0/12345` header.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.split_once('/')?.1.trim().parse().ok()
}

fn into_io(err: FetchError) -> io::Error {
    io::Error::other(err)
}

impl Read for RangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(len) = self.len {
            if self.pos >= len {
                return Ok(0);
            }
        }
        let start = self.pos;
        let end = start + buf.len() as u64 - 1;
        let data = self.fetch_range(start, end).map_err(into_io)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for RangeReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => self.length()?.checked_add_signed(delta),
        };
        self.pos = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of remote file")
        })?;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-0/129710"), Some(129710));
        assert_eq!(parse_content_range_total("bytes 10-19/ 20"), Some(20));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn seeking_without_network() {
        let mut reader = RangeReader::new(Client::new(), "http://archive.test/a.zip", RetryPolicy::default());
        reader.len = Some(100);
        assert_eq!(reader.seek(SeekFrom::Start(10)).unwrap(), 10);
        assert_eq!(reader.seek(SeekFrom::Current(-4)).unwrap(), 6);
        assert_eq!(reader.seek(SeekFrom::End(-22)).unwrap(), 78);
        assert!(reader.seek(SeekFrom::Current(-100)).is_err());
        let mut buf = [0u8; 4];
        reader.seek(SeekFrom::Start(100)).unwrap();
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
}
