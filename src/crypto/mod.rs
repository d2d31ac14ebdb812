//! PDF cryptographic engine implementation

mod rc4;
mod aes;
mod engine;

pub use engine::ObjectCipher;
pub(crate) use self::aes::{aes128_cbc_encrypt_no_padding, aes256_cbc_decrypt_no_padding,
    aes256_cbc_encrypt_no_padding, aes256_ecb_decrypt_block, aes256_ecb_encrypt_block};
pub(crate) use self::rc4::rc4_apply;

use crate::error::PDFResult;

/// Trait for PDF object encryption/decryption
pub(crate) trait CryptoProvider: Send + Sync {
    /// Encrypt `data` under an object key
    fn encrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>>;
    /// Decrypt `data` under an object key
    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>>;
}
