//! Signature verification seam.
//!
//! The ledger does not verify signatures. `AcceptAllSignatures` is the
//! default and says yes to everything; it is NOT a security control and no
//! caller should treat an admitted or confirmed transaction as
//! cryptographically attested. Deployments that need real verification
//! plug in their own `SignatureVerifier`.

pub trait SignatureVerifier: Send + Sync {
    /// `signature` is `None` at submission time, when callers supply no blob.
    fn verify(&self, signer: &str, payload_hash: &str, signature: Option<&str>) -> bool;
}

/// Non-authoritative verifier that accepts every signature.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllSignatures;

impl SignatureVerifier for AcceptAllSignatures {
    fn verify(&self, _signer: &str, _payload_hash: &str, _signature: Option<&str>) -> bool {
        true
    }
}
