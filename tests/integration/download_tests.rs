//! Downloader state-machine tests against scripted sockets and a mock
//! flash sink, covering the boundary cases the streaming pipeline must
//! honor.

use std::collections::VecDeque;

use crate::mock_hw::*;

use otalink::agent::ports::Clock;
use otalink::config::{OtaConfig, TlsSettings};
use otalink::download::socket::DownloadSocket;
use otalink::download::{DownloadEvent, DownloadState, Downloader, HEADER_TIMEOUT_MS};
use otalink::error::OtaError;

struct Bench {
    clock: FakeClock,
    sock: ScriptedSocket,
    flash: MockFlash,
    sys: MockSystem,
    cfg: OtaConfig,
    tls: TlsSettings,
    dl: Downloader,
}

impl Bench {
    fn new() -> Self {
        Self::with_config(OtaConfig::default())
    }

    fn with_config(cfg: OtaConfig) -> Self {
        Self {
            clock: FakeClock::new(),
            sock: ScriptedSocket::new(),
            flash: MockFlash::new(),
            sys: MockSystem::new(),
            cfg,
            tls: TlsSettings::default(),
            dl: Downloader::new(),
        }
    }

    fn begin(&mut self, url: &str, checksum: &str) -> Result<(), OtaError> {
        self.dl.begin(
            self.clock.now_ms(),
            url,
            checksum,
            &self.cfg,
            &self.tls,
            &mut self.sock,
            &mut self.flash,
        )
    }

    fn tick(&mut self) -> DownloadEvent {
        self.dl.tick(
            self.clock.now_ms(),
            &self.cfg,
            &mut self.sock,
            &mut self.flash,
            &mut self.sys,
        )
    }

    /// Tick until a non-pending event or the step budget runs out.
    fn run(&mut self, max_steps: usize) -> DownloadEvent {
        for _ in 0..max_steps {
            self.clock.advance(5);
            match self.tick() {
                DownloadEvent::Pending | DownloadEvent::Progress(_) => continue,
                terminal => return terminal,
            }
        }
        panic!("downloader made no terminal progress in {max_steps} steps");
    }
}

fn serve(bench: &mut Bench, body: &[u8], with_length: bool) {
    bench
        .sock
        .push_script(SocketScript::serving(&http_ok(body, with_length)));
}

// ── URL and startup failures ─────────────────────────────────

#[test]
fn bad_url_fails_before_touching_flash() {
    let mut b = Bench::new();
    assert!(matches!(
        b.begin("ftp://h/fw.bin", "aa"),
        Err(OtaError::BadUrl(_))
    ));
    assert_eq!(b.flash.begun, 0);
    assert!(b.sock.connects.is_empty());
}

#[test]
fn refused_connection_aborts_the_sink() {
    let mut b = Bench::new();
    b.sock.push_script(SocketScript::refused());
    assert!(matches!(
        b.begin("http://h/fw.bin", "aa"),
        Err(OtaError::NetworkFailure(_))
    ));
    assert_eq!(b.flash.begun, 1);
    assert_eq!(b.flash.aborted, 1);
    assert_eq!(b.dl.state(), DownloadState::Idle);
}

// ── Happy paths ──────────────────────────────────────────────

#[test]
fn single_byte_chunks_still_complete() {
    let mut b = Bench::with_config(OtaConfig {
        chunk_size: 1,
        ..Default::default()
    });
    let body = b"tiny image";
    serve(&mut b, body, true);

    b.begin("http://h/fw.bin", &sha256_hex(body)).unwrap();
    assert_eq!(b.run(2000), DownloadEvent::Complete);
    assert_eq!(b.flash.data, body);
}

#[test]
fn missing_content_length_completes_on_clean_close() {
    let mut b = Bench::new();
    let body = b"no length header on this one";
    serve(&mut b, body, false);

    b.begin("http://h/fw.bin", &sha256_hex(body)).unwrap();
    assert_eq!(b.run(100), DownloadEvent::Complete);
    assert_eq!(b.flash.data, body);
    // Sink is left open for the installer.
    assert!(b.flash.open);
}

#[test]
fn checksum_comparison_is_case_insensitive() {
    let mut b = Bench::new();
    let body = b"MixedCaseDigest";
    serve(&mut b, body, true);

    let upper = sha256_hex(body).to_uppercase();
    b.begin("http://h/fw.bin", &upper).unwrap();
    assert_eq!(b.run(100), DownloadEvent::Complete);
}

#[test]
fn verification_can_be_disabled() {
    let mut b = Bench::with_config(OtaConfig {
        verify_checksum: false,
        ..Default::default()
    });
    let body = b"whatever";
    serve(&mut b, body, true);

    b.begin("http://h/fw.bin", "definitely-not-the-hash").unwrap();
    assert_eq!(b.run(100), DownloadEvent::Complete);
}

// ── Deadlines ────────────────────────────────────────────────

#[test]
fn zero_download_timeout_times_out_on_first_chunk() {
    let mut b = Bench::with_config(OtaConfig {
        download_timeout_ms: 0,
        ..Default::default()
    });
    let body = b"never arrives in time";
    serve(&mut b, body, true);

    b.begin("http://h/fw.bin", &sha256_hex(body)).unwrap();
    assert_eq!(b.run(10), DownloadEvent::Failed(OtaError::Timeout));
    assert_eq!(b.flash.aborted, 1);
}

#[test]
fn stalled_headers_hit_the_header_deadline() {
    let mut b = Bench::new();
    // Connection accepted but the server never sends a byte.
    b.sock.push_script(SocketScript {
        refuse: false,
        reads: VecDeque::new(),
        close_at_end: false,
    });

    b.begin("http://h/fw.bin", "aa").unwrap();
    b.clock.advance(HEADER_TIMEOUT_MS + 1);
    assert_eq!(b.tick(), DownloadEvent::Failed(OtaError::HeaderTimeout));
}

#[test]
fn slow_body_hits_the_download_timeout() {
    let mut b = Bench::with_config(OtaConfig {
        download_timeout_ms: 1_000,
        ..Default::default()
    });
    // Headers arrive, then the body stalls forever.
    let mut headers_only = http_ok(b"some body", true);
    headers_only.truncate(headers_only.len() - 9);
    b.sock.push_script(SocketScript {
        refuse: false,
        reads: VecDeque::from([headers_only]),
        close_at_end: false,
    });

    b.begin("http://h/fw.bin", "aa").unwrap();
    assert_eq!(b.tick(), DownloadEvent::Pending); // headers
    b.clock.advance(1_001);
    assert_eq!(b.tick(), DownloadEvent::Failed(OtaError::Timeout));
}

// ── Response shapes ──────────────────────────────────────────

#[test]
fn chunked_encoding_is_declined() {
    let mut b = Bench::new();
    b.sock.push_script(SocketScript::serving(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
    ));

    b.begin("http://h/fw.bin", "aa").unwrap();
    assert_eq!(
        b.run(10),
        DownloadEvent::Failed(OtaError::UnsupportedEncoding)
    );
}

#[test]
fn non_200_status_is_a_network_failure() {
    let mut b = Bench::new();
    b.sock.push_script(SocketScript::serving(
        b"HTTP/1.1 503 Service Unavailable\r\n\r\n",
    ));

    b.begin("http://h/fw.bin", "aa").unwrap();
    assert!(matches!(
        b.run(10),
        DownloadEvent::Failed(OtaError::NetworkFailure(_))
    ));
}

#[test]
fn zero_length_response_is_empty_not_success() {
    let mut b = Bench::new();
    serve(&mut b, b"", true);

    b.begin("http://h/fw.bin", "aa").unwrap();
    assert_eq!(b.run(10), DownloadEvent::Failed(OtaError::EmptyResponse));
    assert_eq!(b.flash.aborted, 1);
}

#[test]
fn close_short_of_content_length_is_a_network_failure() {
    let mut b = Bench::new();
    let body = b"only half of this arrives";
    let mut resp = http_ok(body, true);
    resp.truncate(resp.len() - 10);
    b.sock.push_script(SocketScript::serving(&resp));

    b.begin("http://h/fw.bin", &sha256_hex(body)).unwrap();
    assert!(matches!(
        b.run(100),
        DownloadEvent::Failed(OtaError::NetworkFailure(_))
    ));
}

#[test]
fn checksum_mismatch_aborts_the_sink() {
    let mut b = Bench::new();
    let body = b"payload bytes";
    serve(&mut b, body, true);

    b.begin("http://h/fw.bin", &sha256_hex(b"different")).unwrap();
    assert_eq!(
        b.run(100),
        DownloadEvent::Failed(OtaError::ChecksumMismatch)
    );
    assert_eq!(b.flash.aborted, 1);
    assert!(!b.flash.open);
    assert!(b.flash.data.is_empty());
}

// ── Flash behavior ───────────────────────────────────────────

#[test]
fn flash_write_failure_carries_the_primitive_code() {
    let mut b = Bench::new();
    b.flash.fail_write_after = Some(100);
    let body = firmware_bytes(400);
    serve(&mut b, &body, true);

    b.begin("http://h/fw.bin", &sha256_hex(&body)).unwrap();
    match b.run(100) {
        DownloadEvent::Failed(e @ OtaError::FlashError { .. }) => assert_eq!(e.code(), 14),
        other => panic!("expected flash failure, got {other:?}"),
    }
}

#[test]
fn abort_is_idempotent() {
    let mut b = Bench::new();
    let body = b"abcdef";
    serve(&mut b, body, true);
    b.begin("http://h/fw.bin", &sha256_hex(body)).unwrap();

    b.dl.abort(&mut b.sock, &mut b.flash);
    assert_eq!(b.dl.state(), DownloadState::Idle);
    let aborts = b.flash.aborted;

    b.dl.abort(&mut b.sock, &mut b.flash);
    assert_eq!(b.dl.state(), DownloadState::Idle);
    assert_eq!(b.flash.aborted, aborts);
    assert!(!b.sock.is_open());
}

#[test]
fn begin_while_active_is_rejected() {
    let mut b = Bench::new();
    let body = b"abcdef";
    serve(&mut b, body, true);
    b.begin("http://h/fw.bin", &sha256_hex(body)).unwrap();

    assert!(matches!(
        b.begin("http://h/other.bin", "bb"),
        Err(OtaError::NotReady(_))
    ));
}

// ── Cooperative yield cadence ────────────────────────────────

#[test]
fn long_transfers_yield_to_the_platform() {
    let mut b = Bench::with_config(OtaConfig {
        chunk_size: 16,
        yield_interval_ms: 10,
        ..Default::default()
    });
    let body = firmware_bytes(1024);
    serve(&mut b, &body, true);

    b.begin("http://h/fw.bin", &sha256_hex(&body)).unwrap();
    assert_eq!(b.run(500), DownloadEvent::Complete);
    assert!(b.sys.yields > 0, "hot loop must yield for the watchdog");
}

fn firmware_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 249) as u8).collect()
}
