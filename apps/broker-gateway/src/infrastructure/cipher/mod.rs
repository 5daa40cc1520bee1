//! Credential Cipher
//!
//! Symmetric encryption and hashing used to obscure credentials before they
//! cross the wire to the brokerage endpoint.
//!
//! # Wire Contract
//!
//! - Key material is the brokerage-assigned API code, base64-decoded. The
//!   `API-` prefix of a full API key is stripped before decoding.
//! - Payload encryption is AES-CBC with an all-zero IV and PKCS#7 padding;
//!   ciphertext is base64-encoded. The zero IV is fixed by the endpoint's
//!   protocol, not chosen here.
//! - Every REST call and the streaming handshake carry a `Checker` header:
//!   the SHA-256 hex digest of `api_key + hostname + endpoint + body`, with
//!   all whitespace stripped from the body.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// The protocol fixes the IV to sixteen zero bytes.
const ZERO_IV: [u8; 16] = [0u8; 16];

/// Prefix carried by full API keys; the remainder is the API code.
const API_KEY_PREFIX: &str = "API-";

/// Errors from cipher operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// The API code did not base64-decode.
    #[error("API code is not valid base64")]
    InvalidApiCode,

    /// The decoded key has an unsupported length.
    #[error("unsupported key length {0} (expected 16 or 32 bytes)")]
    UnsupportedKeyLength(usize),

    /// Ciphertext did not base64-decode.
    #[error("ciphertext is not valid base64")]
    InvalidCiphertext,

    /// Decryption produced invalid padding.
    #[error("decryption failed: bad padding")]
    BadPadding,

    /// Decrypted bytes are not valid UTF-8.
    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Symmetric cipher keyed by the brokerage-assigned API code.
#[derive(Clone)]
pub struct CredentialCipher {
    key: Vec<u8>,
}

impl CredentialCipher {
    /// Build a cipher from the API code (or a full `API-`-prefixed key).
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not base64 or decodes to a key length
    /// other than 16 or 32 bytes.
    pub fn from_api_code(api_code: &str) -> Result<Self, CipherError> {
        let code = api_code.strip_prefix(API_KEY_PREFIX).unwrap_or(api_code);
        let key = BASE64
            .decode(code.as_bytes())
            .map_err(|_| CipherError::InvalidApiCode)?;
        match key.len() {
            16 | 32 => Ok(Self { key }),
            other => Err(CipherError::UnsupportedKeyLength(other)),
        }
    }

    /// Encrypt a credential value; returns base64 ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let encrypted = match self.key.len() {
            16 => Aes128CbcEnc::new_from_slices(&self.key, &ZERO_IV)
                .map_err(|_| CipherError::UnsupportedKeyLength(self.key.len()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()),
            _ => Aes256CbcEnc::new_from_slices(&self.key, &ZERO_IV)
                .map_err(|_| CipherError::UnsupportedKeyLength(self.key.len()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()),
        };
        Ok(BASE64.encode(encrypted))
    }

    /// Decrypt a base64 ciphertext back to the original string.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let encrypted = BASE64
            .decode(ciphertext.as_bytes())
            .map_err(|_| CipherError::InvalidCiphertext)?;
        let decrypted = match self.key.len() {
            16 => Aes128CbcDec::new_from_slices(&self.key, &ZERO_IV)
                .map_err(|_| CipherError::UnsupportedKeyLength(self.key.len()))?
                .decrypt_padded_vec_mut::<Pkcs7>(&encrypted)
                .map_err(|_| CipherError::BadPadding)?,
            _ => Aes256CbcDec::new_from_slices(&self.key, &ZERO_IV)
                .map_err(|_| CipherError::UnsupportedKeyLength(self.key.len()))?
                .decrypt_padded_vec_mut::<Pkcs7>(&encrypted)
                .map_err(|_| CipherError::BadPadding)?,
        };
        String::from_utf8(decrypted).map_err(|_| CipherError::InvalidUtf8)
    }

    /// Compute the `Checker` request hash.
    ///
    /// Hashes `api_key + hostname + endpoint + body` where the body has all
    /// whitespace removed; an empty body contributes the empty string.
    #[must_use]
    pub fn request_checker(api_key: &str, hostname: &str, endpoint: &str, payload: &str) -> String {
        let body: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        hasher.update(hostname.as_bytes());
        hasher.update(endpoint.as_bytes());
        hasher.update(body.as_bytes());
        let digest = hasher.finalize();
        digest.iter().fold(String::with_capacity(64), |mut acc, b| {
            use std::fmt::Write;
            let _ = write!(acc, "{b:02x}");
            acc
        })
    }

    /// Whether an API key is well-formed (non-empty, base64 after prefix strip).
    #[must_use]
    pub fn validate_api_key(api_key: &str) -> bool {
        if api_key.is_empty() {
            return false;
        }
        let code = api_key.strip_prefix(API_KEY_PREFIX).unwrap_or(api_key);
        BASE64.decode(code.as_bytes()).is_ok()
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// 16 zero bytes, base64-encoded: a valid AES-128 test code.
    const TEST_CODE_128: &str = "AAAAAAAAAAAAAAAAAAAAAA==";
    /// 32 bytes, base64-encoded: a valid AES-256 test code.
    const TEST_CODE_256: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

    #[test]
    fn round_trip_basic() {
        let cipher = CredentialCipher::from_api_code(TEST_CODE_128).unwrap();
        let ct = cipher.encrypt("hunter2").unwrap();
        assert_ne!(ct, "hunter2");
        assert_eq!(cipher.decrypt(&ct).unwrap(), "hunter2");
    }

    #[test]
    fn round_trip_turkish_characters() {
        let cipher = CredentialCipher::from_api_code(TEST_CODE_128).unwrap();
        let plaintext = "şifre-çğıöşü-ĞÜŞİÖÇ";
        let ct = cipher.encrypt(plaintext).unwrap();
        assert_eq!(cipher.decrypt(&ct).unwrap(), plaintext);
    }

    #[test]
    fn round_trip_empty_string() {
        let cipher = CredentialCipher::from_api_code(TEST_CODE_128).unwrap();
        let ct = cipher.encrypt("").unwrap();
        assert_eq!(cipher.decrypt(&ct).unwrap(), "");
    }

    #[test]
    fn aes256_key_round_trip() {
        let cipher = CredentialCipher::from_api_code(TEST_CODE_256).unwrap();
        let ct = cipher.encrypt("parola").unwrap();
        assert_eq!(cipher.decrypt(&ct).unwrap(), "parola");
    }

    #[test]
    fn api_prefix_is_stripped() {
        let with_prefix = format!("API-{TEST_CODE_128}");
        let a = CredentialCipher::from_api_code(&with_prefix).unwrap();
        let b = CredentialCipher::from_api_code(TEST_CODE_128).unwrap();
        let ct = a.encrypt("x").unwrap();
        assert_eq!(b.decrypt(&ct).unwrap(), "x");
    }

    #[test]
    fn invalid_base64_code_rejected() {
        assert_eq!(
            CredentialCipher::from_api_code("not-base64!!!").unwrap_err(),
            CipherError::InvalidApiCode
        );
    }

    #[test]
    fn unsupported_key_length_rejected() {
        // 8 bytes decodes fine but is not an AES key size.
        let err = CredentialCipher::from_api_code("AAAAAAAAAAA=").unwrap_err();
        assert_eq!(err, CipherError::UnsupportedKeyLength(8));
    }

    #[test]
    fn decrypt_rejects_garbage() {
        let cipher = CredentialCipher::from_api_code(TEST_CODE_128).unwrap();
        assert_eq!(
            cipher.decrypt("%%%").unwrap_err(),
            CipherError::InvalidCiphertext
        );
        // Valid base64 but not a ciphertext produced with this key.
        assert!(cipher.decrypt("AAAAAAAAAAAAAAAAAAAAAA==").is_err());
    }

    #[test]
    fn checker_is_stable_hex_sha256() {
        let checker = CredentialCipher::request_checker(
            "API-key",
            "https://broker.example.com",
            "/api/LoginUser",
            "",
        );
        assert_eq!(checker.len(), 64);
        assert!(checker.chars().all(|c| c.is_ascii_hexdigit()));
        // Deterministic for identical inputs.
        let again = CredentialCipher::request_checker(
            "API-key",
            "https://broker.example.com",
            "/api/LoginUser",
            "",
        );
        assert_eq!(checker, again);
    }

    #[test]
    fn checker_strips_body_whitespace() {
        let compact = CredentialCipher::request_checker("k", "h", "/e", r#"{"a":1,"b":2}"#);
        let spaced = CredentialCipher::request_checker("k", "h", "/e", "{ \"a\": 1,\n \"b\": 2 }");
        assert_eq!(compact, spaced);
    }

    #[test]
    fn checker_differs_per_endpoint() {
        let a = CredentialCipher::request_checker("k", "h", "/api/SendOrder", "");
        let b = CredentialCipher::request_checker("k", "h", "/api/DeleteOrder", "");
        assert_ne!(a, b);
    }

    #[test]
    fn api_key_validation() {
        assert!(CredentialCipher::validate_api_key(TEST_CODE_128));
        assert!(CredentialCipher::validate_api_key(&format!(
            "API-{TEST_CODE_128}"
        )));
        assert!(!CredentialCipher::validate_api_key(""));
        assert!(!CredentialCipher::validate_api_key("API-!!!"));
    }

    #[test]
    fn debug_redacts_key() {
        let cipher = CredentialCipher::from_api_code(TEST_CODE_128).unwrap();
        let debug = format!("{cipher:?}");
        assert!(debug.contains("[REDACTED]"));
    }

    proptest! {
        #[test]
        fn round_trip_arbitrary_utf8(plaintext in "\\PC{0,128}") {
            let cipher = CredentialCipher::from_api_code(TEST_CODE_128).unwrap();
            let ct = cipher.encrypt(&plaintext).unwrap();
            prop_assert_eq!(cipher.decrypt(&ct).unwrap(), plaintext);
        }
    }
}
