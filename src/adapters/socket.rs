//! Download socket adapter.
//!
//! Plain HTTP uses non-blocking `std::net::TcpStream` on every target
//! (ESP-IDF ships the std networking surface).  HTTPS:
//!
//! - **`target_os = "espidf"`**: ESP-IDF mbedTLS via `esp_idf_svc::tls`,
//!   verifying against the configured CA blob, or skipping verification in
//!   the logged insecure mode.
//! - **all other targets**: plaintext TCP standing in for TLS, for
//!   host-side testing and simulation.
//!
//! The `connect` call is the one documented blocking point (resolution +
//! handshake); the agent's retry throttling bounds how often it can run.

use log::{info, warn};
use std::io::{Read, Write};
use std::net::TcpStream;

use crate::config::TlsSettings;
use crate::download::socket::{DownloadSocket, SocketError};

enum Conn {
    Plain(TcpStream),
    #[cfg(target_os = "espidf")]
    Tls(esp_idf_svc::tls::EspTls),
}

pub struct TcpDownloadSocket {
    conn: Option<Conn>,
}

impl TcpDownloadSocket {
    pub fn new() -> Self {
        Self { conn: None }
    }

    fn connect_plain(host: &str, port: u16) -> Result<TcpStream, SocketError> {
        let stream = TcpStream::connect((host, port)).map_err(|e| {
            warn!("socket: connect to {host}:{port} failed: {e}");
            match e.kind() {
                std::io::ErrorKind::ConnectionRefused => SocketError::Refused,
                _ => SocketError::Io,
            }
        })?;
        stream.set_nonblocking(true).map_err(|_| SocketError::Io)?;
        Ok(stream)
    }

    #[cfg(target_os = "espidf")]
    fn connect_tls(
        host: &str,
        port: u16,
        tls: &TlsSettings,
    ) -> Result<esp_idf_svc::tls::EspTls, SocketError> {
        use esp_idf_svc::tls::{Config, EspTls, X509};

        fn nul_terminated(pem: &[u8]) -> Vec<u8> {
            let mut v = pem.to_vec();
            v.push(0);
            v
        }
        fn as_x509(blob: &Option<Vec<u8>>) -> Result<Option<X509<'_>>, SocketError> {
            match blob {
                Some(v) => Ok(Some(X509::pem(
                    core::ffi::CStr::from_bytes_with_nul(v).map_err(|_| SocketError::Tls)?,
                ))),
                None => Ok(None),
            }
        }

        let ca_nul = tls.ca_pem.as_deref().map(nul_terminated);
        // Client identity for origins that demand mutual TLS; both blobs
        // are present together or not at all (enforced at configure time).
        let client_nul = tls.client_cert_pem.as_deref().map(nul_terminated);
        let key_nul = tls.client_key_pem.as_deref().map(nul_terminated);

        let mut conn = EspTls::new().map_err(|_| SocketError::Tls)?;
        let config = Config {
            common_name: Some(host),
            ca_cert: as_x509(&ca_nul)?,
            client_cert: as_x509(&client_nul)?,
            private_key: as_x509(&key_nul)?,
            // Insecure mode: no trust anchor, no name check.  Requires the
            // ESP_TLS_INSECURE sdkconfig option; opted into and logged at
            // the downloader level.
            skip_common_name: tls.insecure,
            non_block: true,
            ..Default::default()
        };
        conn.connect(host, port, &config).map_err(|e| {
            warn!("socket: TLS connect to {host}:{port} failed: {e}");
            SocketError::Tls
        })?;
        Ok(conn)
    }
}

impl Default for TcpDownloadSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadSocket for TcpDownloadSocket {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        tls: Option<&TlsSettings>,
    ) -> Result<(), SocketError> {
        self.close();

        match tls {
            None => {
                let stream = Self::connect_plain(host, port)?;
                info!("socket: connected to {host}:{port}");
                self.conn = Some(Conn::Plain(stream));
            }
            Some(settings) => {
                #[cfg(target_os = "espidf")]
                {
                    let conn = Self::connect_tls(host, port, settings)?;
                    info!("socket: TLS session established with {host}:{port}");
                    self.conn = Some(Conn::Tls(conn));
                }
                #[cfg(not(target_os = "espidf"))]
                {
                    let _ = settings;
                    warn!("socket(sim): https requested, using plaintext TCP");
                    let stream = Self::connect_plain(host, port)?;
                    self.conn = Some(Conn::Plain(stream));
                }
            }
        }
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), SocketError> {
        let conn = self.conn.as_mut().ok_or(SocketError::NotConnected)?;
        match conn {
            Conn::Plain(stream) => {
                let mut sent = 0;
                while sent < data.len() {
                    match stream.write(&data[sent..]) {
                        Ok(0) => return Err(SocketError::Closed),
                        Ok(n) => sent += n,
                        Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            std::thread::yield_now();
                        }
                        Err(_) => return Err(SocketError::Io),
                    }
                }
                Ok(())
            }
            #[cfg(target_os = "espidf")]
            Conn::Tls(tls) => {
                let mut sent = 0;
                while sent < data.len() {
                    match tls.write(&data[sent..]) {
                        Ok(0) => return Err(SocketError::Closed),
                        Ok(n) => sent += n,
                        Err(_) => return Err(SocketError::Io),
                    }
                }
                Ok(())
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SocketError> {
        let conn = self.conn.as_mut().ok_or(SocketError::NotConnected)?;
        match conn {
            Conn::Plain(stream) => match stream.read(buf) {
                Ok(0) => {
                    self.close();
                    Err(SocketError::Closed)
                }
                Ok(n) => Ok(n),
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
                Err(_) => Err(SocketError::Io),
            },
            #[cfg(target_os = "espidf")]
            Conn::Tls(tls) => {
                use esp_idf_svc::sys::{ESP_TLS_ERR_SSL_WANT_READ, ESP_TLS_ERR_SSL_WANT_WRITE};
                match tls.read(buf) {
                    Ok(0) => {
                        self.close();
                        Err(SocketError::Closed)
                    }
                    Ok(n) => Ok(n),
                    Err(e)
                        if e.0.code() == ESP_TLS_ERR_SSL_WANT_READ as i32
                            || e.0.code() == ESP_TLS_ERR_SSL_WANT_WRITE as i32 =>
                    {
                        Ok(0)
                    }
                    Err(_) => Err(SocketError::Io),
                }
            }
        }
    }

    fn close(&mut self) {
        self.conn.take();
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }
}
