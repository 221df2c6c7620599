//! Firmware URL grammar: `scheme "://" host [":" port] [path]`.
//!
//! Only `http` and `https` are accepted; the port defaults to 80/443 and
//! the path to `/`.

use crate::error::OtaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareUrl<'a> {
    pub https: bool,
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

pub fn parse(url: &str) -> Result<FirmwareUrl<'_>, OtaError> {
    let (https, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (false, rest)
    } else {
        return Err(OtaError::BadUrl("scheme must be http or https"));
    };

    let (host_port, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };

    let (host, port) = match host_port.find(':') {
        Some(i) => {
            let port = host_port[i + 1..]
                .parse::<u16>()
                .map_err(|_| OtaError::BadUrl("invalid port"))?;
            (&host_port[..i], port)
        }
        None => (host_port, if https { 443 } else { 80 }),
    };

    if host.is_empty() {
        return Err(OtaError::BadUrl("empty host"));
    }

    Ok(FirmwareUrl {
        https,
        host,
        port,
        path,
    })
}
