//! Trust anchors shared by every session.

use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;

use crate::error::{Error, Result};

/// An ordered set of PEM-encoded root certificates and the rustls client
/// configuration built from them.
///
/// Built once and shared read-only across sessions, so the root store is
/// parsed a single time per set.
#[derive(Clone)]
pub struct TrustAnchorSet {
    pems: Arc<[String]>,
    client_config: Arc<rustls::ClientConfig>,
}

impl TrustAnchorSet {
    /// Parse `pems` into a root store. Every string may hold one or more
    /// `CERTIFICATE` blocks; a string with none, or any certificate rustls
    /// rejects, fails the whole set.
    pub fn from_pems(pems: Vec<String>) -> Result<Self> {
        let mut roots = rustls::RootCertStore::empty();
        for (index, pem) in pems.iter().enumerate() {
            let mut found = 0usize;
            for cert in CertificateDer::pem_slice_iter(pem.as_bytes()) {
                let cert = cert
                    .map_err(|e| Error::TrustAnchor(format!("anchor {index}: {e}")))?;
                roots
                    .add(cert)
                    .map_err(|e| Error::TrustAnchor(format!("anchor {index}: {e}")))?;
                found += 1;
            }
            if found == 0 {
                return Err(Error::TrustAnchor(format!(
                    "anchor {index}: no certificate found"
                )));
            }
        }

        let client_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            pems: pems.into(),
            client_config: Arc::new(client_config),
        })
    }

    /// The PEM strings, in load order.
    pub fn pems(&self) -> &[String] {
        &self.pems
    }

    pub fn len(&self) -> usize {
        self.pems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pems.is_empty()
    }

    /// Client configuration trusting exactly these anchors.
    pub fn client_config(&self) -> Arc<rustls::ClientConfig> {
        self.client_config.clone()
    }
}

impl std::fmt::Debug for TrustAnchorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustAnchorSet")
            .field("anchors", &self.pems.len())
            .finish()
    }
}
