//! Packaging applied to objects before upload.
//!
//! Layout of a sealed object, outermost first:
//!
//! - password set: `MAGIC || salt(16) || nonce(12) || AES-256-GCM(ciphertext || tag)`
//!   where the key is derived from the password with Argon2id.
//! - compression on: the plaintext above (or the whole object) is a zstd frame.

use anyhow::{anyhow, bail, Context, Result};
use argon2::Argon2;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};

use super::UploadOptions;

/// Prefix marking a password-protected object.
pub const ENCRYPTED_MAGIC: &[u8; 4] = b"TAB1";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const ZSTD_LEVEL: i32 = 3;

/// Compress and/or encrypt `data` according to `options`.
///
/// # Errors
///
/// Returns an error if compression, key derivation or encryption fails.
pub fn seal(data: &[u8], options: &UploadOptions) -> Result<Vec<u8>> {
    let packed = if options.compression {
        zstd::encode_all(data, ZSTD_LEVEL).context("Failed to compress payload")?
    } else {
        data.to_vec()
    };

    match options.effective_password() {
        Some(password) => encrypt(&packed, password),
        None => Ok(packed),
    }
}

/// Reverse [`seal`].
///
/// # Errors
///
/// Returns an error if the password is wrong, the data was tampered with, or
/// the object is not in the expected format.
pub fn open(data: &[u8], options: &UploadOptions) -> Result<Vec<u8>> {
    let packed = match options.effective_password() {
        Some(password) => decrypt(data, password)?,
        None => data.to_vec(),
    };

    if options.compression {
        zstd::decode_all(packed.as_slice()).context("Failed to decompress payload")
    } else {
        Ok(packed)
    }
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| anyhow!("Argon2id key derivation failed: {e}"))?;
    Ok(key)
}

fn aead_key(key: &[u8; 32]) -> Result<LessSafeKey> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| anyhow!("Failed to create AES-256-GCM key"))?;
    Ok(LessSafeKey::new(unbound))
}

fn encrypt(plaintext: &[u8], password: &str) -> Result<Vec<u8>> {
    let salt: [u8; SALT_LEN] = rand::random();
    let nonce_bytes: [u8; NONCE_LEN] = rand::random();
    let key = aead_key(&derive_key(password, &salt)?)?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| anyhow!("AES-256-GCM encryption failed"))?;

    let mut out = Vec::with_capacity(ENCRYPTED_MAGIC.len() + SALT_LEN + NONCE_LEN + in_out.len());
    out.extend_from_slice(ENCRYPTED_MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&in_out);
    Ok(out)
}

fn decrypt(data: &[u8], password: &str) -> Result<Vec<u8>> {
    let header_len = ENCRYPTED_MAGIC.len() + SALT_LEN + NONCE_LEN;
    if data.len() < header_len || &data[..ENCRYPTED_MAGIC.len()] != ENCRYPTED_MAGIC {
        bail!("Payload is not password protected");
    }

    let salt = &data[ENCRYPTED_MAGIC.len()..ENCRYPTED_MAGIC.len() + SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&data[ENCRYPTED_MAGIC.len() + SALT_LEN..header_len]);
    let key = aead_key(&derive_key(password, salt)?)?;

    let mut in_out = data[header_len..].to_vec();
    let plaintext = key
        .open_in_place(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| anyhow!("Decryption failed: wrong password or corrupted data"))?;
    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(compression: bool, password: Option<&str>) -> UploadOptions {
        UploadOptions {
            compression,
            password: password.map(ToString::to_string),
        }
    }

    #[test]
    fn test_plain_passthrough() {
        let opts = options(false, None);
        assert_eq!(seal(b"hello", &opts).unwrap(), b"hello");
    }

    #[test]
    fn test_empty_password_means_unencrypted() {
        let opts = options(false, Some(""));
        assert_eq!(seal(b"hello", &opts).unwrap(), b"hello");
    }

    #[test]
    fn test_compressed_payload_is_zstd_frame() {
        let data = "archive ".repeat(200);
        let sealed = seal(data.as_bytes(), &options(true, None)).unwrap();
        assert!(sealed.len() < data.len());
        // zstd frame magic number
        assert_eq!(&sealed[..4], &[0x28, 0xB5, 0x2F, 0xFD]);
        assert_eq!(open(&sealed, &options(true, None)).unwrap(), data.as_bytes());
    }

    #[test]
    fn test_password_protected_payload() {
        let opts = options(true, Some("correct horse"));
        let sealed = seal(br#"{"tweet":{}}"#, &opts).unwrap();
        assert_eq!(&sealed[..4], ENCRYPTED_MAGIC);
        assert_eq!(open(&sealed, &opts).unwrap(), br#"{"tweet":{}}"#);
    }

    #[test]
    fn test_wrong_password_fails() {
        let sealed = seal(b"secret", &options(false, Some("right"))).unwrap();
        assert!(open(&sealed, &options(false, Some("wrong"))).is_err());
    }

    #[test]
    fn test_encryption_uses_fresh_salt_and_nonce() {
        let opts = options(false, Some("pw"));
        let a = seal(b"same", &opts).unwrap();
        let b = seal(b"same", &opts).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_rejects_unprotected_data() {
        assert!(open(b"short", &options(false, Some("pw"))).is_err());
    }
}
