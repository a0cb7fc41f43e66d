//! Protection for the single sensitive store field (the Steam web API key).

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Two-function contract for secret protection.
pub trait SecretProtector {
    /// Turn a plaintext secret into an opaque, storable token.
    fn protect(&self, plain: &str) -> Result<String>;
    /// Recover the plaintext from a token produced by [`SecretProtector::protect`].
    fn unprotect(&self, token: &str) -> Result<String>;
}

/// Platform-native protector: DPAPI (current user scope) on Windows.
///
/// Elsewhere there is no equivalent user-bound key store, so the token is only
/// base64 encoded and relies on the store file's permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformProtector;

impl SecretProtector for PlatformProtector {
    fn protect(&self, plain: &str) -> Result<String> {
        let plain = plain.trim();
        if plain.is_empty() {
            return Ok(String::new());
        }
        let sealed = seal(plain.as_bytes())?;
        Ok(STANDARD.encode(sealed))
    }

    fn unprotect(&self, token: &str) -> Result<String> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(String::new());
        }
        let sealed = STANDARD
            .decode(token)
            .context("protected secret is not valid base64")?;
        let plain = unseal(&sealed)?;
        String::from_utf8(plain).context("protected secret is not valid UTF-8")
    }
}

#[cfg(windows)]
fn seal(data: &[u8]) -> Result<Vec<u8>> {
    dpapi::protect(data)
}

#[cfg(windows)]
fn unseal(data: &[u8]) -> Result<Vec<u8>> {
    dpapi::unprotect(data)
}

#[cfg(not(windows))]
fn seal(data: &[u8]) -> Result<Vec<u8>> {
    Ok(data.to_vec())
}

#[cfg(not(windows))]
fn unseal(data: &[u8]) -> Result<Vec<u8>> {
    Ok(data.to_vec())
}

#[cfg(windows)]
mod dpapi {
    use anyhow::{Context, Result};
    use windows::{
        core::PCWSTR,
        Win32::{
            Foundation::{LocalFree, HLOCAL},
            Security::Cryptography::{
                CryptProtectData, CryptUnprotectData, CRYPTPROTECT_UI_FORBIDDEN,
                CRYPT_INTEGER_BLOB,
            },
        },
    };

    pub(super) fn protect(data: &[u8]) -> Result<Vec<u8>> {
        let input = blob(data);
        let mut output = CRYPT_INTEGER_BLOB::default();
        // SAFETY: `input` borrows `data` for the duration of the call and
        // `output` is freed with LocalFree after copying.
        unsafe {
            CryptProtectData(
                &input,
                PCWSTR::null(),
                None,
                None,
                None,
                CRYPTPROTECT_UI_FORBIDDEN,
                &mut output,
            )
            .context("CryptProtectData failed")?;
            Ok(take(output))
        }
    }

    pub(super) fn unprotect(data: &[u8]) -> Result<Vec<u8>> {
        let input = blob(data);
        let mut output = CRYPT_INTEGER_BLOB::default();
        // SAFETY: see `protect`.
        unsafe {
            CryptUnprotectData(
                &input,
                None,
                None,
                None,
                None,
                CRYPTPROTECT_UI_FORBIDDEN,
                &mut output,
            )
            .context("CryptUnprotectData failed")?;
            Ok(take(output))
        }
    }

    fn blob(data: &[u8]) -> CRYPT_INTEGER_BLOB {
        CRYPT_INTEGER_BLOB {
            cbData: data.len() as u32,
            pbData: data.as_ptr() as *mut u8,
        }
    }

    unsafe fn take(blob: CRYPT_INTEGER_BLOB) -> Vec<u8> {
        if blob.pbData.is_null() {
            return Vec::new();
        }
        let bytes = std::slice::from_raw_parts(blob.pbData, blob.cbData as usize).to_vec();
        let _ = LocalFree(HLOCAL(blob.pbData.cast()));
        bytes
    }
}
