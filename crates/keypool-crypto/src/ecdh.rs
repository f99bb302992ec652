//! P-256 ECDH key pairs.
//!
//! Private halves are raw 32-byte scalars; public halves are SEC1
//! uncompressed points (0x04 || x || y, 65 bytes).

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;
use crate::types::{P256_PUBLIC_LENGTH, P256_SCALAR_LENGTH};

/// A freshly generated P-256 key pair. The scalar is wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EcdhKeyMaterial {
    private: [u8; P256_SCALAR_LENGTH],
    public: Vec<u8>,
}

impl EcdhKeyMaterial {
    pub fn private_scalar(&self) -> &[u8; P256_SCALAR_LENGTH] {
        &self.private
    }

    pub fn public_point(&self) -> &[u8] {
        &self.public
    }
}

impl std::fmt::Debug for EcdhKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKeyMaterial")
            .field("public", &hex::encode(&self.public))
            .finish_non_exhaustive()
    }
}

/// Generate a new random P-256 key pair.
pub fn generate_key_pair() -> EcdhKeyMaterial {
    let secret = SecretKey::random(&mut p256::elliptic_curve::rand_core::OsRng);
    let mut private = [0u8; P256_SCALAR_LENGTH];
    private.copy_from_slice(&secret.to_bytes());
    let public = secret
        .public_key()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec();
    EcdhKeyMaterial { private, public }
}

/// Compute the raw ECDH shared secret (x-coordinate, 32 bytes).
///
/// # Arguments
/// * `private` - Our 32-byte private scalar
/// * `peer_public` - Peer's SEC1 encoded point (compressed or uncompressed)
pub fn diffie_hellman(
    private: &[u8],
    peer_public: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let secret = import_private(private)?;
    let public = PublicKey::from_sec1_bytes(peer_public)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
}

fn import_private(private: &[u8]) -> Result<SecretKey, CryptoError> {
    if private.len() != P256_SCALAR_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: P256_SCALAR_LENGTH,
            got: private.len(),
        });
    }
    SecretKey::from_slice(private).map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
}

/// Check that `bytes` is a valid uncompressed P-256 point.
pub fn validate_public_point(bytes: &[u8]) -> Result<(), CryptoError> {
    if bytes.len() != P256_PUBLIC_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: P256_PUBLIC_LENGTH,
            got: bytes.len(),
        });
    }
    PublicKey::from_sec1_bytes(bytes)
        .map(|_| ())
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}
