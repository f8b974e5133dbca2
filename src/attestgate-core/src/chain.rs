//! Certificate-chain decoding and attestation-extension extraction.
//!
//! Chains arrive leaf-first as base64 blobs. Decoding validates every entry
//! up front; later operations re-parse from the owned DER on demand so no
//! borrowed certificate escapes this module.

use asn1_rs::{oid, Oid};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use x509_parser::prelude::*;

use crate::error::VerifyError;

/// OID of the vendor key-attestation extension (1.3.6.1.4.1.11129.2.1.17).
pub const KEY_ATTESTATION_OID: Oid<'static> = oid!(1.3.6.1.4.1.11129.2.1.17);

/// An ordered, validated certificate chain, leaf first.
#[derive(Debug, Clone)]
pub struct CertificateChain {
    ders: Vec<Vec<u8>>,
}

impl CertificateChain {
    /// Decode a transport-encoded chain.
    ///
    /// Every blob is base64-decoded and parsed as X.509; the first bad
    /// entry aborts with an index-tagged error.
    ///
    /// # Errors
    ///
    /// [`VerifyError::EmptyChain`] for an empty input,
    /// [`VerifyError::DecodeError`] / [`VerifyError::CertificateParseError`]
    /// for the first bad entry.
    pub fn decode(encoded: &[String]) -> Result<Self, VerifyError> {
        if encoded.is_empty() {
            return Err(VerifyError::EmptyChain);
        }

        let mut ders = Vec::with_capacity(encoded.len());
        for (index, blob) in encoded.iter().enumerate() {
            let der = BASE64
                .decode(blob.trim())
                .map_err(|e| VerifyError::DecodeError {
                    index,
                    reason: e.to_string(),
                })?;
            ders.push(der);
        }
        Self::from_der_blobs(ders)
    }

    /// Build a chain from raw DER blobs (transports that skip base64).
    ///
    /// # Errors
    ///
    /// Same validation as [`decode`](Self::decode), minus transport decoding.
    pub fn from_der_blobs(ders: Vec<Vec<u8>>) -> Result<Self, VerifyError> {
        if ders.is_empty() {
            return Err(VerifyError::EmptyChain);
        }
        for (index, der) in ders.iter().enumerate() {
            X509Certificate::from_der(der).map_err(|e| VerifyError::CertificateParseError {
                index,
                reason: e.to_string(),
            })?;
        }
        Ok(Self { ders })
    }

    /// Number of certificates in the chain.
    pub fn len(&self) -> usize {
        self.ders.len()
    }

    /// Chains are never empty once constructed.
    pub fn is_empty(&self) -> bool {
        self.ders.is_empty()
    }

    /// Walk the chain verifying each certificate's signature against its
    /// issuer's public key.
    ///
    /// Only meaningful when more than one certificate is present; a
    /// single-certificate chain passes trivially. Whether a failure here is
    /// fatal is the caller's policy decision — the engine default treats it
    /// as advisory.
    ///
    /// # Errors
    ///
    /// [`VerifyError::ChainVerificationFailed`] naming the first broken
    /// link.
    pub fn verify_chain_of_trust(&self) -> Result<(), VerifyError> {
        if self.ders.len() < 2 {
            return Ok(());
        }

        let mut certs = Vec::with_capacity(self.ders.len());
        for (index, der) in self.ders.iter().enumerate() {
            let (_, cert) =
                X509Certificate::from_der(der).map_err(|e| VerifyError::CertificateParseError {
                    index,
                    reason: e.to_string(),
                })?;
            certs.push(cert);
        }

        for index in 0..certs.len() - 1 {
            let issuer = &certs[index + 1];
            certs[index]
                .verify_signature(Some(issuer.public_key()))
                .map_err(|e| VerifyError::ChainVerificationFailed {
                    index,
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Extract the raw key-attestation extension from the leaf certificate.
    ///
    /// # Errors
    ///
    /// [`VerifyError::ExtensionMissing`] when the leaf carries no extension
    /// with [`KEY_ATTESTATION_OID`].
    pub fn attestation_extension(&self) -> Result<Vec<u8>, VerifyError> {
        let (_, leaf) = X509Certificate::from_der(&self.ders[0]).map_err(|e| {
            VerifyError::CertificateParseError {
                index: 0,
                reason: e.to_string(),
            }
        })?;

        leaf.extensions()
            .iter()
            .find(|ext| ext.oid == KEY_ATTESTATION_OID)
            .map(|ext| ext.value.to_vec())
            .ok_or(VerifyError::ExtensionMissing)
    }
}
