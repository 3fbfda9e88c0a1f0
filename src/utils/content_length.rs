//! Content length extraction utilities.
//!
//! Helpers for working out the full size of a remote file from the response to
//! a plain or ranged GET request.

use reqwest::{header::CONTENT_RANGE, Response, StatusCode};

/// Parse Content-Range header to extract total size.
///
/// Content-Range header format: "bytes start-end/total"
///
/// ```rust
/// use haul::utils::parse_content_range_total;
///
/// assert_eq!(parse_content_range_total("bytes 0-1023/2048"), Some(2048));
/// assert_eq!(parse_content_range_total("bytes 0-1023/*"), None);
/// ```
pub fn parse_content_range_total(content_range: &str) -> Option<u64> {
    content_range
        .split('/')
        .next_back()
        .and_then(|size| size.trim().parse::<u64>().ok())
}

/// Full size of the remote file, 0 when it cannot be determined.
///
/// A `206 Partial Content` answer to a request starting at `offset` carries the
/// total in its Content-Range header; when that header is missing the body
/// length is added to the offset. Any other answer carries the whole file.
pub fn total_size(response: &Response, offset: u64) -> u64 {
    let body = response.content_length();
    if response.status() == StatusCode::PARTIAL_CONTENT {
        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
            .or_else(|| body.map(|len| len + offset))
            .unwrap_or(0)
    } else {
        body.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-1023/2048"), Some(2048));
        assert_eq!(parse_content_range_total("bytes 200-1023/5000"), Some(5000));
        assert_eq!(parse_content_range_total("bytes 0-0/1"), Some(1));
        assert_eq!(parse_content_range_total("invalid"), None);
        assert_eq!(parse_content_range_total("bytes 0-1023"), None);
        assert_eq!(parse_content_range_total(""), None);
    }

    #[test]
    fn test_parse_content_range_total_edge_cases() {
        assert_eq!(parse_content_range_total("bytes 0-1023/ 2048 "), Some(2048));
        assert_eq!(parse_content_range_total("bytes 0-0/0"), Some(0));
        assert_eq!(
            parse_content_range_total("bytes 0-1023/999999999999"),
            Some(999999999999)
        );
    }
}
