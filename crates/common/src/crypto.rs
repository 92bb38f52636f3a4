//! Key material for `ActivityPub` HTTP Signatures.
//!
//! Keys are always supplied by the caller: a local actor's key pair comes
//! from account storage, a remote actor's public key from its actor
//! document. Both PKCS#8 (`BEGIN PRIVATE KEY` / `BEGIN PUBLIC KEY`) and
//! PKCS#1 (`BEGIN RSA PRIVATE KEY` / `BEGIN RSA PUBLIC KEY`) encodings are
//! accepted, since both appear in the wild.
//!
//! # Examples
//!
//! ```
//! use apub_common::crypto::{KeyMaterial, parse_public_key};
//!
//! let pem = "-----BEGIN PUBLIC KEY-----\nnot a key\n-----END PUBLIC KEY-----";
//! let keys = KeyMaterial::public_only("https://example.com/users/alice#main-key", pem);
//! assert!(keys.private_key_pem.is_none());
//! assert!(parse_public_key(&keys.public_key_pem).is_err());
//! ```

use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey},
};
use thiserror::Error;

/// Failure to turn PEM text into a usable RSA key.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// An actor's RSA key pair in PEM form.
///
/// Immutable once issued; its lifetime is the owning account's lifetime.
/// Remote actors only ever have the public half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Key id advertised in the `Signature` header, usually `<actor>#main-key`.
    pub key_id: String,
    /// Public key in PEM format.
    pub public_key_pem: String,
    /// Private key in PEM format. Present only for local actors.
    pub private_key_pem: Option<String>,
}

impl KeyMaterial {
    /// Key material for a local actor that can sign requests.
    #[must_use]
    pub fn new(
        key_id: impl Into<String>,
        public_key_pem: impl Into<String>,
        private_key_pem: impl Into<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            public_key_pem: public_key_pem.into(),
            private_key_pem: Some(private_key_pem.into()),
        }
    }

    /// Key material for a remote actor, verification only.
    #[must_use]
    pub fn public_only(key_id: impl Into<String>, public_key_pem: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            public_key_pem: public_key_pem.into(),
            private_key_pem: None,
        }
    }

    /// Actor id owning this key (the key id without its fragment).
    #[must_use]
    pub fn actor_id(&self) -> &str {
        actor_id_from_key_id(&self.key_id)
    }
}

/// Strip the fragment from a key id: `https://a/users/x#main-key` -> `https://a/users/x`.
#[must_use]
pub fn actor_id_from_key_id(key_id: &str) -> &str {
    key_id.split('#').next().unwrap_or(key_id)
}

/// Parse an RSA private key from PEM (PKCS#8 first, then PKCS#1).
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, KeyError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))
}

/// Parse an RSA public key from PEM (SPKI first, then PKCS#1).
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, KeyError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))
}

/// Generate a throwaway 2048-bit key pair.
///
/// Only available to tests; production keys are issued outside this engine.
#[cfg(any(test, feature = "test-utils"))]
pub fn generate_rsa_keypair(key_id: &str) -> Result<KeyMaterial, KeyError> {
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 2048)
        .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?
        .to_string();
    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;

    Ok(KeyMaterial::new(key_id, public_key_pem, private_key_pem))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generated_keys() {
        let keys = generate_rsa_keypair("https://example.com/users/alice#main-key").unwrap();

        assert!(keys.public_key_pem.contains("BEGIN PUBLIC KEY"));
        let _private = parse_private_key(keys.private_key_pem.as_deref().unwrap()).unwrap();
        let _public = parse_public_key(&keys.public_key_pem).unwrap();
    }

    #[test]
    fn test_parse_pkcs1_private_key() {
        use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};

        let keys = generate_rsa_keypair("k").unwrap();
        let private = parse_private_key(keys.private_key_pem.as_deref().unwrap()).unwrap();
        let pkcs1 = private.to_pkcs1_pem(LineEnding::LF).unwrap();

        assert!(pkcs1.contains("BEGIN RSA PRIVATE KEY"));
        assert!(parse_private_key(&pkcs1).is_ok());
    }

    #[test]
    fn test_invalid_pem() {
        assert!(matches!(
            parse_private_key("garbage"),
            Err(KeyError::InvalidPrivateKey(_))
        ));
        assert!(matches!(
            parse_public_key("garbage"),
            Err(KeyError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_actor_id_from_key_id() {
        assert_eq!(
            actor_id_from_key_id("https://example.com/users/alice#main-key"),
            "https://example.com/users/alice"
        );
        assert_eq!(
            actor_id_from_key_id("https://example.com/users/alice"),
            "https://example.com/users/alice"
        );
    }
}
