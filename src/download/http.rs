//! Minimal HTTP/1.1 client surface for firmware downloads.
//!
//! One fixed request shape and an incremental response-header parser that
//! can be fed arbitrary byte slices across ticks.  Recognized headers:
//! `Content-Length` (case-insensitive) and `Transfer-Encoding: chunked`
//! (detected so the downloader can decline it).

use heapless::Vec as HVec;

use crate::error::OtaError;

/// Longest header line we retain.  Longer lines are still consumed and
/// line-framed correctly, just not inspected; the headers we care about
/// are short.
const MAX_HEADER_LINE: usize = 256;

/// Render the firmware GET request.
pub fn format_request(host: &str, path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n")
}

// ───────────────────────────────────────────────────────────────
// Header parser
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProgress {
    /// More header bytes needed; the whole input was consumed.
    Incomplete,
    /// Headers finished; `body_offset` is the index of the first body byte
    /// in the most recent input slice.
    Complete { body_offset: usize },
}

/// Incremental response-header parser.
#[derive(Debug)]
pub struct HeaderParser {
    line: HVec<u8, MAX_HEADER_LINE>,
    line_overflow: bool,
    status_seen: bool,
    pub content_length: Option<u64>,
    pub chunked: bool,
}

impl HeaderParser {
    pub fn new() -> Self {
        Self {
            line: HVec::new(),
            line_overflow: false,
            status_seen: false,
            content_length: None,
            chunked: false,
        }
    }

    /// Feed a slice of response bytes.  Returns where the headers ended, or
    /// an error for a malformed/rejected status line.
    pub fn feed(&mut self, data: &[u8]) -> Result<HeaderProgress, OtaError> {
        for (i, &b) in data.iter().enumerate() {
            if b != b'\n' {
                if self.line.push(b).is_err() {
                    self.line_overflow = true;
                }
                continue;
            }

            let complete = self.finish_line()?;
            if complete {
                return Ok(HeaderProgress::Complete { body_offset: i + 1 });
            }
        }
        Ok(HeaderProgress::Incomplete)
    }

    /// Process the accumulated line.  Returns `true` on the blank line that
    /// terminates the header block.
    fn finish_line(&mut self) -> Result<bool, OtaError> {
        let overflow = core::mem::take(&mut self.line_overflow);
        let mut line = core::mem::take(&mut self.line);
        while line.last() == Some(&b'\r') {
            line.pop();
        }

        if line.is_empty() && !overflow {
            if !self.status_seen {
                // Blank line before any status line: not an HTTP response.
                return Err(OtaError::NetworkFailure("malformed response"));
            }
            return Ok(true);
        }

        if !self.status_seen {
            self.status_seen = true;
            self.parse_status_line(&line)?;
            return Ok(false);
        }
        if overflow {
            return Ok(false);
        }

        if let Some(rest) = strip_prefix_ignore_case(&line, b"content-length:") {
            let text = core::str::from_utf8(rest).unwrap_or("");
            self.content_length = text.trim().parse::<u64>().ok();
        } else if strip_prefix_ignore_case(&line, b"transfer-encoding:")
            .is_some_and(|rest| contains_ignore_case(rest, b"chunked"))
        {
            self.chunked = true;
        }
        Ok(false)
    }

    fn parse_status_line(&self, line: &[u8]) -> Result<(), OtaError> {
        let text = core::str::from_utf8(line)
            .map_err(|_| OtaError::NetworkFailure("malformed status line"))?;
        let code = text
            .split_whitespace()
            .nth(1)
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or(OtaError::NetworkFailure("malformed status line"))?;
        if code != 200 {
            return Err(OtaError::NetworkFailure("server returned non-200 status"));
        }
        Ok(())
    }
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}
