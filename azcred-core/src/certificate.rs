//! Client certificates used to sign client assertions.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey};
use sha1::{Digest, Sha1};
use std::fmt;
use std::path::Path;

use crate::error::CredentialError;

const KEY_TAGS: [&str; 2] = ["RSA PRIVATE KEY", "PRIVATE KEY"];

/// A certificate and private key able to sign JWT client assertions.
pub trait ClientCertificate: Send + Sync {
    /// Signing algorithm of the private key.
    fn algorithm(&self) -> Algorithm;

    /// SHA-1 thumbprint of the DER encoded certificate.
    fn thumbprint(&self) -> &[u8];

    /// Key used to sign assertions.
    fn encoding_key(&self) -> &EncodingKey;
}

/// An RSA certificate and private key loaded from a PEM bundle.
pub struct PemClientCertificate {
    thumbprint: Vec<u8>,
    key: EncodingKey,
}

impl PemClientCertificate {
    /// Load a certificate from a PEM bundle holding a `CERTIFICATE` block and
    /// an unencrypted RSA private key.
    ///
    /// Password protected bundles are not supported; passing a non-empty
    /// `password` is an error.
    pub fn from_pem(pem: &str, password: Option<&str>) -> Result<Self, CredentialError> {
        if password.is_some_and(|p| !p.is_empty()) {
            return Err(certificate_error(
                "password protected client certificates are not supported",
            ));
        }

        let blocks = pem::parse_many(pem)
            .map_err(|e| certificate_error(format!("failed to parse PEM bundle: {}", e)))?;

        if blocks.iter().any(|b| b.tag() == "ENCRYPTED PRIVATE KEY") {
            return Err(certificate_error(
                "encrypted private keys are not supported",
            ));
        }

        let certificate = blocks
            .iter()
            .find(|b| b.tag() == "CERTIFICATE")
            .ok_or_else(|| certificate_error("no CERTIFICATE block found in PEM bundle"))?;

        let private_key = blocks
            .iter()
            .find(|b| KEY_TAGS.contains(&b.tag()))
            .ok_or_else(|| certificate_error("no private key found in PEM bundle"))?;

        let key = EncodingKey::from_rsa_pem(pem::encode(private_key).as_bytes())
            .map_err(|e| certificate_error(format!("failed to load private key: {}", e)))?;

        Ok(Self {
            thumbprint: Sha1::digest(certificate.contents()).to_vec(),
            key,
        })
    }

    /// Load a certificate from a PEM file.
    pub fn from_file(path: impl AsRef<Path>, password: Option<&str>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| {
            certificate_error(format!(
                "failed to read certificate file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_pem(&pem, password)
    }
}

impl ClientCertificate for PemClientCertificate {
    fn algorithm(&self) -> Algorithm {
        Algorithm::RS256
    }

    fn thumbprint(&self) -> &[u8] {
        &self.thumbprint
    }

    fn encoding_key(&self) -> &EncodingKey {
        &self.key
    }
}

impl fmt::Debug for PemClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PemClientCertificate")
            .field("x5t", &URL_SAFE_NO_PAD.encode(&self.thumbprint))
            .finish_non_exhaustive()
    }
}

fn certificate_error(message: impl Into<String>) -> CredentialError {
    CredentialError::Certificate {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = include_str!("../tests/fixtures/client-certificate.pem");

    #[test]
    fn test_thumbprint_is_sha1_of_der() {
        let cert = PemClientCertificate::from_pem(BUNDLE, None).unwrap();
        assert_eq!(cert.thumbprint().len(), 20);
        assert_eq!(
            URL_SAFE_NO_PAD.encode(cert.thumbprint()),
            "1qjCYALKPKQBoGRp3C7T9rA-o4A"
        );
        assert_eq!(cert.algorithm(), Algorithm::RS256);
    }

    #[test]
    fn test_empty_password_is_accepted() {
        assert!(PemClientCertificate::from_pem(BUNDLE, Some("")).is_ok());
    }

    #[test]
    fn test_password_is_rejected() {
        assert!(matches!(
            PemClientCertificate::from_pem(BUNDLE, Some("hunter2")),
            Err(CredentialError::Certificate { .. })
        ));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let cert_only: String = BUNDLE
            .split_inclusive('\n')
            .take_while(|line| !line.contains("PRIVATE KEY"))
            .collect();

        let err = PemClientCertificate::from_pem(&cert_only, None).unwrap_err();
        assert!(err.to_string().contains("no private key"));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(PemClientCertificate::from_pem("not a pem", None).is_err());
    }

    #[test]
    fn test_from_missing_file() {
        let err = PemClientCertificate::from_file("/nonexistent/cert.pem", None).unwrap_err();
        assert!(matches!(err, CredentialError::Certificate { .. }));
    }

    #[test]
    fn test_debug_hides_key() {
        let cert = PemClientCertificate::from_pem(BUNDLE, None).unwrap();
        let debug = format!("{:?}", cert);
        assert!(debug.contains("1qjCYALKPKQBoGRp3C7T9rA-o4A"));
        assert!(!debug.contains("PRIVATE"));
    }
}
