//! Password authentication against `/U` and `/O`

use log::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::{aes256_cbc_decrypt_no_padding, aes256_ecb_decrypt_block};
use crate::error::{PDFError, PDFResult};
use crate::handlers::StandardSecurityHandler;
use super::key_derivation::{legacy_password_bytes, r6_password_bytes};

const ZERO_IV: [u8; 16] = [0; 16];

/// Compare without an early exit on the first differing byte
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl StandardSecurityHandler {
    /// Authenticate with password, trying it as the user password first
    /// and then as the owner password; returns the file key
    pub fn authenticate_password(&self, password: &str) -> PDFResult<Zeroizing<Vec<u8>>> {
        if let Some(key) = self.authenticate_user_password(password)? {
            debug!("Authenticated with user password");
            return Ok(key);
        }
        if let Some(key) = self.authenticate_owner_password(password)? {
            debug!("Authenticated with owner password");
            return Ok(key);
        }
        Err(PDFError::InvalidPassword)
    }

    /// Algorithm 6 (revisions 2-4) and 11 (revision 6)
    pub fn authenticate_user_password(&self, password: &str) -> PDFResult<Option<Zeroizing<Vec<u8>>>> {
        if self.revision >= 5 {
            let password = r6_password_bytes(password);
            let hash = self.hash_password(password, &self.u_value[32..40], &[])?;
            if !constant_time_eq(hash.as_slice(), &self.u_value[..32]) {
                return Ok(None);
            }
            let key = self.hash_password(password, &self.u_value[40..48], &[])?;
            let encrypted = self.ue_value.as_deref().unwrap_or_default();
            return self.unwrap_file_key(key.as_slice(), encrypted).map(Some);
        }

        self.check_user_bytes(&legacy_password_bytes(password))
    }

    /// Algorithm 7 (revisions 2-4) and 12 (revision 6)
    pub fn authenticate_owner_password(&self, password: &str) -> PDFResult<Option<Zeroizing<Vec<u8>>>> {
        if self.revision >= 5 {
            let password = r6_password_bytes(password);
            let user_key = &self.u_value[..48];
            let hash = self.hash_password(password, &self.o_value[32..40], user_key)?;
            if !constant_time_eq(hash.as_slice(), &self.o_value[..32]) {
                return Ok(None);
            }
            let key = self.hash_password(password, &self.o_value[40..48], user_key)?;
            let encrypted = self.oe_value.as_deref().unwrap_or_default();
            return self.unwrap_file_key(key.as_slice(), encrypted).map(Some);
        }

        let user_password = self.recover_user_password(&legacy_password_bytes(password))?;
        self.check_user_bytes(&user_password)
    }

    /// Derive the file key and compare the `/U` it produces
    fn check_user_bytes(&self, password: &[u8]) -> PDFResult<Option<Zeroizing<Vec<u8>>>> {
        let file_key = self.compute_file_key(password);
        let expected = self.compute_user_value(&file_key)?;
        let compared = if self.revision == 2 { 32 } else { 16 };
        if constant_time_eq(&expected[..compared], &self.u_value[..compared]) {
            Ok(Some(file_key))
        } else {
            Ok(None)
        }
    }

    /// Decrypt `/UE` or `/OE` and check the key against `/Perms`
    fn unwrap_file_key(&self, key: &[u8], encrypted: &[u8]) -> PDFResult<Zeroizing<Vec<u8>>> {
        if encrypted.len() != 32 {
            return Err(PDFError::malformed("Encrypted file key must be 32 bytes"));
        }
        let file_key = Zeroizing::new(aes256_cbc_decrypt_no_padding(key, &ZERO_IV, encrypted)?);

        if let Some(perms) = self.perms_value.as_deref().and_then(|p| <&[u8; 16]>::try_from(p).ok()) {
            let block = aes256_ecb_decrypt_block(&file_key, perms)?;
            if &block[9..12] != b"adb" {
                warn!("/Perms does not verify against the file key");
            } else if block[..4] != (self.permissions.p_value() as u32).to_le_bytes() {
                warn!("/Perms permissions differ from /P");
            }
        }
        Ok(file_key)
    }
}
