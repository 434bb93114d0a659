use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use core_types::ClusterConfig;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;
/// Used when no secret is configured. Obscures, does not protect.
const BUILTIN_SECRET: &str = "clusterstore/password-codec/v1";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("failed to encrypt {field}")]
    Encrypt { field: &'static str },
    #[error("encoded {field} is not valid base64")]
    Base64 { field: &'static str },
    #[error("encoded {field} is too short")]
    Truncated { field: &'static str },
    #[error("encoded {field} failed authentication (wrong key or tampered value)")]
    Decrypt { field: &'static str },
    #[error("decoded {field} is not valid UTF-8")]
    Utf8 { field: &'static str },
}

/// Turns the secret fields of a cluster config into their at-rest form and back.
///
/// Both directions borrow the input and return a new value; the caller's
/// config is never touched.
pub trait PasswordCodec: Send + Sync {
    fn encode(&self, conf: &ClusterConfig) -> Result<ClusterConfig, CodecError>;
    fn decode(&self, conf: &ClusterConfig) -> Result<ClusterConfig, CodecError>;
}

/// Default codec: ChaCha20-Poly1305 with a random per-value nonce, base64 text.
///
/// The output is `base64(nonce || ciphertext)`; the key is the SHA-256 of the
/// configured secret. Empty secrets are left empty.
#[derive(Clone)]
pub struct ObscuringCodec {
    cipher: ChaCha20Poly1305,
}

impl ObscuringCodec {
    pub fn new(secret: &str) -> Self {
        let key: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        }
    }

    /// Uses `secret` when given, the built-in key otherwise.
    pub fn from_secret(secret: Option<&str>) -> Self {
        Self::new(secret.unwrap_or(BUILTIN_SECRET))
    }

    fn encode_str(&self, field: &'static str, plain: &str) -> Result<String, CodecError> {
        if plain.is_empty() {
            return Ok(String::new());
        }
        let nonce: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plain.as_bytes())
            .map_err(|_| CodecError::Encrypt { field })?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    fn decode_str(&self, field: &'static str, encoded: &str) -> Result<String, CodecError> {
        if encoded.is_empty() {
            return Ok(String::new());
        }
        let raw = STANDARD
            .decode(encoded)
            .map_err(|_| CodecError::Base64 { field })?;
        if raw.len() <= NONCE_LEN {
            return Err(CodecError::Truncated { field });
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::Decrypt { field })?;
        String::from_utf8(plain).map_err(|_| CodecError::Utf8 { field })
    }
}

impl Default for ObscuringCodec {
    fn default() -> Self {
        Self::from_secret(None)
    }
}

impl std::fmt::Debug for ObscuringCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObscuringCodec").finish_non_exhaustive()
    }
}

impl PasswordCodec for ObscuringCodec {
    fn encode(&self, conf: &ClusterConfig) -> Result<ClusterConfig, CodecError> {
        let mut out = conf.clone();
        out.password = self.encode_str("password", &conf.password)?;
        out.ssh_password = self.encode_str("ssh_password", &conf.ssh_password)?;
        Ok(out)
    }

    fn decode(&self, conf: &ClusterConfig) -> Result<ClusterConfig, CodecError> {
        let mut out = conf.clone();
        out.password = self.decode_str("password", &conf.password)?;
        out.ssh_password = self.decode_str("ssh_password", &conf.ssh_password)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf() -> ClusterConfig {
        let mut conf = ClusterConfig::new("prod");
        conf.password = "secret".to_string();
        conf.ssh_password = "a much longer ssh password than the cluster one".to_string();
        conf
    }

    #[test]
    fn encode_hides_and_decode_restores() {
        let codec = ObscuringCodec::default();
        let original = conf();
        let encoded = codec.encode(&original).unwrap();

        assert_ne!(encoded.password, "secret");
        assert!(!encoded.ssh_password.contains("ssh password"));
        assert_eq!(original.password, "secret");
        assert_eq!(codec.decode(&encoded).unwrap(), original);
    }

    #[test]
    fn nonce_makes_encodings_differ() {
        let codec = ObscuringCodec::new("k");
        let a = codec.encode(&conf()).unwrap();
        let b = codec.encode(&conf()).unwrap();
        assert_ne!(a.password, b.password);
    }

    #[test]
    fn wrong_key_is_rejected() {
        for _ in 0..50 {
            let mut short = ClusterConfig::new("prod");
            short.password = "s".to_string();
            let encoded = ObscuringCodec::new("one").encode(&short).unwrap();
            assert_eq!(
                ObscuringCodec::new("two").decode(&encoded).unwrap_err(),
                CodecError::Decrypt { field: "password" }
            );
        }
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let codec = ObscuringCodec::default();
        let encoded = codec.encode(&conf()).unwrap();

        let mut raw = STANDARD.decode(&encoded.password).unwrap();
        let last = raw.len() - 1;
        raw[NONCE_LEN] ^= 0x01;
        let mut tampered = encoded.clone();
        tampered.password = STANDARD.encode(&raw);
        assert_eq!(
            codec.decode(&tampered).unwrap_err(),
            CodecError::Decrypt { field: "password" }
        );

        raw[NONCE_LEN] ^= 0x01;
        raw[last] ^= 0x80;
        tampered.password = STANDARD.encode(&raw);
        assert!(codec.decode(&tampered).is_err());
    }

    #[test]
    fn empty_passwords_stay_empty() {
        let codec = ObscuringCodec::default();
        let plain = ClusterConfig::new("dev");
        let encoded = codec.encode(&plain).unwrap();
        assert!(encoded.password.is_empty());
        assert_eq!(codec.decode(&encoded).unwrap(), plain);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let codec = ObscuringCodec::default();
        let mut bad = ClusterConfig::new("x");
        bad.password = "***not base64***".to_string();
        assert_eq!(
            codec.decode(&bad).unwrap_err(),
            CodecError::Base64 { field: "password" }
        );
        bad.password = STANDARD.encode([0u8; 4]);
        assert_eq!(
            codec.decode(&bad).unwrap_err(),
            CodecError::Truncated { field: "password" }
        );
    }
}
