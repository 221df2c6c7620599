//! TLS material loading from flash.
//!
//! On ESP-IDF targets the PEM blobs live in the `certs` NVS namespace
//! (provisioned at factory or over a management channel).  On simulation
//! targets there is no store and the agent runs without them.
//!
//! ## Flash layout
//!
//! | Key           | Content                                      |
//! |---------------|----------------------------------------------|
//! | `ca_cert`     | PEM CA chain for broker and origin trust     |
//! | `client_cert` | PEM client certificate (mutual TLS, optional)|
//! | `client_key`  | PEM private key paired with `client_cert`    |

/// TLS material read from the store.  Invalid blobs are reported and
/// dropped rather than handed to mbedTLS; a client certificate without
/// its key (or vice versa) is treated as absent.
#[derive(Debug, Default)]
pub struct TlsMaterial {
    pub ca_pem: Option<Vec<u8>>,
    pub client_cert_pem: Option<Vec<u8>>,
    pub client_key_pem: Option<Vec<u8>>,
}

impl TlsMaterial {
    /// The complete client identity, when both halves are provisioned.
    pub fn client_identity(self) -> Option<(Vec<u8>, Vec<u8>)> {
        match (self.client_cert_pem, self.client_key_pem) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }
}

/// Load and validate whatever TLS material is provisioned.
#[cfg(target_os = "espidf")]
pub fn load() -> TlsMaterial {
    use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
    use log::{info, warn};

    use crate::cert;

    let Ok(partition) = EspNvsPartition::<NvsDefault>::take() else {
        warn!("cert_store: NVS partition unavailable");
        return TlsMaterial::default();
    };
    let Ok(nvs) = EspNvs::new(partition, "certs", false) else {
        info!("cert_store: no certs namespace provisioned");
        return TlsMaterial::default();
    };

    let read = |key: &str| -> Option<Vec<u8>> {
        let mut buf = [0u8; cert::MAX_CERT_SIZE];
        match nvs.get_blob(key, &mut buf) {
            Ok(Some(data)) => Some(data.to_vec()),
            _ => None,
        }
    };
    let validated = |key: &str, check: fn(&[u8]) -> Result<(), cert::CertError>| {
        let blob = read(key)?;
        match check(&blob) {
            Ok(()) => {
                info!("cert_store: loaded '{}' ({} bytes)", key, blob.len());
                Some(blob)
            }
            Err(e) => {
                warn!("cert_store: provisioned '{}' rejected: {}", key, e);
                None
            }
        }
    };

    let mut material = TlsMaterial {
        ca_pem: validated("ca_cert", cert::validate_cert_pem),
        client_cert_pem: validated("client_cert", cert::validate_cert_pem),
        client_key_pem: validated("client_key", cert::validate_key_pem),
    };

    // Half a client identity is useless; drop the stray half.
    if material.client_cert_pem.is_some() != material.client_key_pem.is_some() {
        warn!("cert_store: incomplete client identity, ignoring it");
        material.client_cert_pem = None;
        material.client_key_pem = None;
    }

    material
}

#[cfg(not(target_os = "espidf"))]
pub fn load() -> TlsMaterial {
    log::info!("cert_store(sim): no certificate store on this target");
    TlsMaterial::default()
}
