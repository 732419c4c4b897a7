//! HEAD probe used to decide whether a partial file can be continued.

use std::str;
use std::time::Duration;

use crate::retry::AttemptError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadResult {
    pub content_length: Option<u64>,
    /// Server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    pub etag: Option<String>,
}

/// HEAD `url` (following redirects) and parse the headers of the final response.
/// Blocking; the HTTP transport calls it from its worker thread.
pub fn probe(url: &str, connect_timeout: Duration) -> Result<HeadResult, AttemptError> {
    let mut lines: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(AttemptError::Curl)?;
    easy.nobody(true).map_err(AttemptError::Curl)?;
    easy.follow_location(true).map_err(AttemptError::Curl)?;
    easy.connect_timeout(connect_timeout).map_err(AttemptError::Curl)?;
    easy.timeout(connect_timeout.saturating_mul(2)).map_err(AttemptError::Curl)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    let s = s.trim_end();
                    // A redirect starts a new header block.
                    if s.starts_with("HTTP/") {
                        lines.clear();
                    }
                    lines.push(s.to_string());
                }
                true
            })
            .map_err(AttemptError::Curl)?;
        transfer.perform().map_err(AttemptError::Curl)?;
    }

    let code = easy.response_code().map_err(AttemptError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(AttemptError::Http(code));
    }
    Ok(parse_headers(&lines))
}

pub(crate) fn parse_headers(lines: &[String]) -> HeadResult {
    let mut out = HeadResult::default();
    for line in lines {
        let Some((name, value)) = line.trim().split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            out.content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            out.accept_ranges = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("etag") {
            out.etag = Some(value.trim_matches('"').to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn content_length_and_ranges() {
        let r = parse_headers(&lines(&[
            "HTTP/1.1 200 OK",
            "Content-Length: 12345",
            "Accept-Ranges: bytes",
        ]));
        assert_eq!(r.content_length, Some(12345));
        assert!(r.accept_ranges);
        assert!(r.etag.is_none());
    }

    #[test]
    fn ranges_none_and_etag() {
        let r = parse_headers(&lines(&["accept-ranges: none", "ETag: \"v1\""]));
        assert!(!r.accept_ranges);
        assert_eq!(r.etag.as_deref(), Some("v1"));
        assert_eq!(r.content_length, None);
    }
}
