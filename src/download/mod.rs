//! Downloader — streams an HTTP(S) response body into the flash sink while
//! incrementally computing SHA-256, one bounded chunk of socket I/O per
//! tick.
//!
//! ```text
//! Idle ──begin()──▶ Connecting ──headers done──▶ Downloading ──▶ Verifying
//!                        │                           │               │
//!                        └──────────▶ Failed ◀───────┘          Complete
//! ```
//!
//! The flash sink is open from `begin` until the installer commits or a
//! failure path aborts it.  Cleanup is idempotent and guaranteed on every
//! exit: socket closed, hasher dropped, a still-open sink aborted.

pub mod http;
pub mod socket;
pub mod url;

use log::{info, warn};
use sha2::{Digest, Sha256};

use crate::agent::ports::{FlashSink, SystemPort};
use crate::config::{OtaConfig, TlsSettings};
use crate::error::OtaError;
use self::http::{HeaderParser, HeaderProgress};
use self::socket::{DownloadSocket, SocketError};

/// Deadline for the response-header phase.
pub const HEADER_TIMEOUT_MS: u64 = 5_000;

// ───────────────────────────────────────────────────────────────
// State
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    Connecting,
    Downloading,
    Verifying,
    Complete,
    Failed,
}

/// Outcome of one tick, dispatched by the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// Still working (or nothing to do).
    Pending,
    /// Downloaded percentage changed.
    Progress(u8),
    /// Image streamed and verified; the sink is ready for the installer.
    Complete,
    /// The attempt failed; cleanup already ran.
    Failed(OtaError),
}

/// Per-attempt working state, created by `begin` and destroyed by cleanup.
struct DownloadContext {
    /// Start of the body phase; the overall timeout counts from here.
    start_ms: u64,
    header_deadline_ms: u64,
    headers: HeaderParser,
    hasher: Option<Sha256>,
    expected_checksum: String,
    total_bytes: u64,
    downloaded: u64,
    last_progress: Option<u8>,
    last_yield_ms: u64,
    buf: Vec<u8>,
}

// ───────────────────────────────────────────────────────────────
// Downloader
// ───────────────────────────────────────────────────────────────

pub struct Downloader {
    state: DownloadState,
    ctx: Option<DownloadContext>,
}

impl Downloader {
    pub fn new() -> Self {
        Self {
            state: DownloadState::Idle,
            ctx: None,
        }
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.ctx.as_ref().map_or(0, |c| c.downloaded)
    }

    /// Start a download attempt: open the flash sink, connect a dedicated
    /// socket, send the request.  On error the attempt is already cleaned
    /// up when this returns.
    pub fn begin(
        &mut self,
        now_ms: u64,
        url: &str,
        expected_checksum: &str,
        cfg: &OtaConfig,
        tls: &TlsSettings,
        sock: &mut impl DownloadSocket,
        flash: &mut impl FlashSink,
    ) -> Result<(), OtaError> {
        if self.state != DownloadState::Idle {
            return Err(OtaError::NotReady("download already in progress"));
        }

        let parsed = url::parse(url)?;
        info!(
            "download: {} {}:{}{}",
            if parsed.https { "https" } else { "http" },
            parsed.host,
            parsed.port,
            parsed.path
        );

        flash.begin(None)?;

        let tls_opt = if parsed.https {
            if tls.insecure {
                warn!("download: accepting any server certificate (insecure mode)");
            }
            Some(tls)
        } else {
            None
        };

        if let Err(e) = sock.connect(parsed.host, parsed.port, tls_opt) {
            flash.abort();
            return Err(match e {
                SocketError::Tls => OtaError::NetworkFailure("TLS handshake failed"),
                _ => OtaError::NetworkFailure("connection to server failed"),
            });
        }

        let request = http::format_request(parsed.host, parsed.path);
        if sock.write_all(request.as_bytes()).is_err() {
            sock.close();
            flash.abort();
            return Err(OtaError::NetworkFailure("request send failed"));
        }

        self.ctx = Some(DownloadContext {
            start_ms: now_ms,
            header_deadline_ms: now_ms + HEADER_TIMEOUT_MS,
            headers: HeaderParser::new(),
            hasher: Some(Sha256::new()),
            expected_checksum: expected_checksum.to_string(),
            total_bytes: 0,
            downloaded: 0,
            last_progress: None,
            last_yield_ms: now_ms,
            buf: vec![0u8; cfg.chunk_size],
        });
        self.state = DownloadState::Connecting;
        Ok(())
    }

    /// Advance the attempt by at most one chunk of socket I/O.
    pub fn tick(
        &mut self,
        now_ms: u64,
        cfg: &OtaConfig,
        sock: &mut impl DownloadSocket,
        flash: &mut impl FlashSink,
        sys: &mut impl SystemPort,
    ) -> DownloadEvent {
        match self.state {
            DownloadState::Connecting => self.tick_headers(now_ms, sock, flash),
            DownloadState::Downloading => self.tick_body(now_ms, cfg, sock, flash, sys),
            DownloadState::Verifying => self.tick_verify(cfg, sock, flash),
            DownloadState::Idle | DownloadState::Complete | DownloadState::Failed => {
                DownloadEvent::Pending
            }
        }
    }

    /// Tear down the attempt from any state.  Idempotent.
    pub fn abort(&mut self, sock: &mut impl DownloadSocket, flash: &mut impl FlashSink) {
        self.cleanup(sock, flash);
    }

    /// Acknowledge a reported completion or failure and return to Idle so
    /// the next attempt can start.
    pub fn reset(&mut self, sock: &mut impl DownloadSocket, flash: &mut impl FlashSink) {
        self.cleanup(sock, flash);
    }

    // ── Header phase ──────────────────────────────────────────

    fn tick_headers(
        &mut self,
        now_ms: u64,
        sock: &mut impl DownloadSocket,
        flash: &mut impl FlashSink,
    ) -> DownloadEvent {
        let Some(ctx) = self.ctx.as_mut() else {
            return DownloadEvent::Pending;
        };

        if now_ms > ctx.header_deadline_ms {
            return self.fail(OtaError::HeaderTimeout, sock, flash);
        }

        let n = match sock.read(&mut ctx.buf) {
            Ok(0) => return DownloadEvent::Pending,
            Ok(n) => n,
            Err(SocketError::Closed) => {
                return self.fail(
                    OtaError::NetworkFailure("connection closed during headers"),
                    sock,
                    flash,
                );
            }
            Err(_) => {
                return self.fail(OtaError::NetworkFailure("socket read failed"), sock, flash)
            }
        };

        let chunk = ctx.buf[..n].to_vec();
        match ctx.headers.feed(&chunk) {
            Ok(HeaderProgress::Incomplete) => DownloadEvent::Pending,
            Ok(HeaderProgress::Complete { body_offset }) => {
                if ctx.headers.chunked {
                    return self.fail(OtaError::UnsupportedEncoding, sock, flash);
                }
                ctx.total_bytes = ctx.headers.content_length.unwrap_or(0);
                ctx.start_ms = now_ms;
                ctx.last_yield_ms = now_ms;
                info!(
                    "download: headers done, content-length {}",
                    ctx.total_bytes
                );
                self.state = DownloadState::Downloading;

                // Body bytes that arrived with the final header read.
                let body = &chunk[body_offset..];
                if body.is_empty() {
                    return DownloadEvent::Pending;
                }
                match Self::process_body(self.ctx.as_mut().expect("ctx set"), body, flash) {
                    Ok(progress) => self.after_body_progress(progress),
                    Err(e) => self.fail(e, sock, flash),
                }
            }
            Err(e) => self.fail(e, sock, flash),
        }
    }

    // ── Body phase ────────────────────────────────────────────

    fn tick_body(
        &mut self,
        now_ms: u64,
        cfg: &OtaConfig,
        sock: &mut impl DownloadSocket,
        flash: &mut impl FlashSink,
        sys: &mut impl SystemPort,
    ) -> DownloadEvent {
        let Some(ctx) = self.ctx.as_mut() else {
            return DownloadEvent::Pending;
        };

        if now_ms.saturating_sub(ctx.start_ms) > cfg.download_timeout_ms {
            return self.fail(OtaError::Timeout, sock, flash);
        }

        if now_ms.saturating_sub(ctx.last_yield_ms) >= cfg.yield_interval_ms {
            ctx.last_yield_ms = now_ms;
            sys.yield_now();
        }

        match sock.read(&mut ctx.buf) {
            Ok(0) => DownloadEvent::Pending,
            Ok(n) => {
                let chunk = ctx.buf[..n].to_vec();
                match Self::process_body(ctx, &chunk, flash) {
                    Ok(progress) => self.after_body_progress(progress),
                    Err(e) => self.fail(e, sock, flash),
                }
            }
            Err(SocketError::Closed) => self.on_eof(sock, flash),
            Err(_) => self.fail(OtaError::NetworkFailure("socket read failed"), sock, flash),
        }
    }

    /// Hash and flash one body slice; the hasher covers exactly the bytes
    /// handed to the sink.  Returns the new progress percentage when it
    /// changed.
    fn process_body(
        ctx: &mut DownloadContext,
        data: &[u8],
        flash: &mut impl FlashSink,
    ) -> Result<Option<u8>, OtaError> {
        if let Some(hasher) = ctx.hasher.as_mut() {
            hasher.update(data);
        }
        flash.write(data)?;
        ctx.downloaded += data.len() as u64;

        if ctx.total_bytes > 0 {
            let pct = ((ctx.downloaded * 100) / ctx.total_bytes).min(100) as u8;
            if ctx.last_progress != Some(pct) {
                ctx.last_progress = Some(pct);
                return Ok(Some(pct));
            }
        }
        Ok(None)
    }

    /// After a successful body write: transition to Verifying when the
    /// declared length is fully received.
    fn after_body_progress(&mut self, progress: Option<u8>) -> DownloadEvent {
        let ctx = self.ctx.as_ref().expect("ctx set");
        if ctx.total_bytes > 0 && ctx.downloaded >= ctx.total_bytes {
            self.state = DownloadState::Verifying;
        }
        match progress {
            Some(p) => DownloadEvent::Progress(p),
            None => DownloadEvent::Pending,
        }
    }

    /// Orderly EOF: completion when the byte count is consistent, failure
    /// otherwise.
    fn on_eof(
        &mut self,
        sock: &mut impl DownloadSocket,
        flash: &mut impl FlashSink,
    ) -> DownloadEvent {
        let ctx = self.ctx.as_ref().expect("ctx set");
        if ctx.downloaded == 0 {
            return self.fail(OtaError::EmptyResponse, sock, flash);
        }
        if ctx.total_bytes == 0 || ctx.downloaded == ctx.total_bytes {
            self.state = DownloadState::Verifying;
            return DownloadEvent::Pending;
        }
        self.fail(
            OtaError::NetworkFailure("connection closed mid-body"),
            sock,
            flash,
        )
    }

    // ── Verification ──────────────────────────────────────────

    fn tick_verify(
        &mut self,
        cfg: &OtaConfig,
        sock: &mut impl DownloadSocket,
        flash: &mut impl FlashSink,
    ) -> DownloadEvent {
        let Some(ctx) = self.ctx.as_mut() else {
            return DownloadEvent::Pending;
        };

        let Some(hasher) = ctx.hasher.take() else {
            return DownloadEvent::Pending;
        };
        let digest = hasher.finalize();
        let calculated = to_hex(&digest);
        info!(
            "download: {} bytes, sha256 {}",
            ctx.downloaded, calculated
        );

        if cfg.verify_checksum && !calculated.eq_ignore_ascii_case(&ctx.expected_checksum) {
            warn!(
                "download: checksum mismatch (expected {})",
                ctx.expected_checksum
            );
            return self.fail(OtaError::ChecksumMismatch, sock, flash);
        }

        // The socket is spent; the sink stays open for the installer.
        sock.close();
        self.state = DownloadState::Complete;
        DownloadEvent::Complete
    }

    // ── Cleanup ───────────────────────────────────────────────

    fn fail(
        &mut self,
        err: OtaError,
        sock: &mut impl DownloadSocket,
        flash: &mut impl FlashSink,
    ) -> DownloadEvent {
        warn!("download: failed: {err}");
        self.cleanup(sock, flash);
        self.state = DownloadState::Failed;
        DownloadEvent::Failed(err)
    }

    fn cleanup(&mut self, sock: &mut impl DownloadSocket, flash: &mut impl FlashSink) {
        sock.close();
        if flash.is_open() {
            flash.abort();
        }
        self.ctx = None;
        self.state = DownloadState::Idle;
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase hex rendering of a digest.
pub fn to_hex(digest: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(digest.len() * 2);
    for &b in digest {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}
