//! AES encryption provider implementation
//!
//! Object data is AES-CBC with PKCS#7 padding and a random 16-byte IV
//! prepended to the ciphertext. The unpadded and ECB helpers serve the
//! revision 6 key derivation.

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes256, Block};
use rand::{thread_rng, RngCore};

use crate::error::{PDFError, PDFResult};
use super::CryptoProvider;

const BLOCK_SIZE: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub(crate) struct AESProvider {
    key_length: usize,
}

impl AESProvider {
    pub const fn new(key_length: usize) -> Self {
        Self { key_length }
    }

    fn check_key(&self, key: &[u8]) -> PDFResult<()> {
        if key.len() != self.key_length {
            return Err(PDFError::InvalidKeyLength(key.len()));
        }
        Ok(())
    }
}

impl CryptoProvider for AESProvider {
    fn encrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        self.check_key(key)?;
        let mut iv = [0u8; BLOCK_SIZE];
        thread_rng().fill_bytes(&mut iv);

        let ciphertext = match self.key_length {
            16 => Aes128CbcEnc::new_from_slices(key, &iv)?.encrypt_padded_vec_mut::<Pkcs7>(data),
            _ => Aes256CbcEnc::new_from_slices(key, &iv)?.encrypt_padded_vec_mut::<Pkcs7>(data),
        };

        let mut output = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
        output.extend_from_slice(&iv);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        self.check_key(key)?;
        if data.len() < BLOCK_SIZE {
            return Err(PDFError::invalid_length("AES decryption"));
        }

        let (iv, ciphertext) = data.split_at(BLOCK_SIZE);
        if ciphertext.is_empty() {
            return Ok(Vec::new());
        }
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(PDFError::invalid_length("AES decryption"));
        }

        let plaintext = match self.key_length {
            16 => Aes128CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            _ => Aes256CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        };
        plaintext.map_err(|_| PDFError::invalid_length("AES padding"))
    }
}

fn check_blocks(data: &[u8], operation: &str) -> PDFResult<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(PDFError::invalid_length(operation));
    }
    Ok(())
}

/// AES-128-CBC over whole blocks, no padding
pub(crate) fn aes128_cbc_encrypt_no_padding(key: &[u8], iv: &[u8], data: &[u8]) -> PDFResult<Vec<u8>> {
    check_blocks(data, "AES-128 block encryption")?;
    Ok(Aes128CbcEnc::new_from_slices(key, iv)?.encrypt_padded_vec_mut::<NoPadding>(data))
}

/// AES-256-CBC over whole blocks, no padding
pub(crate) fn aes256_cbc_encrypt_no_padding(key: &[u8], iv: &[u8], data: &[u8]) -> PDFResult<Vec<u8>> {
    check_blocks(data, "AES-256 block encryption")?;
    Ok(Aes256CbcEnc::new_from_slices(key, iv)?.encrypt_padded_vec_mut::<NoPadding>(data))
}

pub(crate) fn aes256_cbc_decrypt_no_padding(key: &[u8], iv: &[u8], data: &[u8]) -> PDFResult<Vec<u8>> {
    check_blocks(data, "AES-256 block decryption")?;
    Aes256CbcDec::new_from_slices(key, iv)?
        .decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| PDFError::invalid_length("AES-256 block decryption"))
}

/// Encrypt a single block with AES-256 in ECB mode
pub(crate) fn aes256_ecb_encrypt_block(key: &[u8], data: &[u8; BLOCK_SIZE]) -> PDFResult<[u8; BLOCK_SIZE]> {
    let cipher = Aes256::new_from_slice(key)?;
    let mut block = Block::clone_from_slice(data);
    cipher.encrypt_block(&mut block);
    Ok(block.into())
}

pub(crate) fn aes256_ecb_decrypt_block(key: &[u8], data: &[u8; BLOCK_SIZE]) -> PDFResult<[u8; BLOCK_SIZE]> {
    let cipher = Aes256::new_from_slice(key)?;
    let mut block = Block::clone_from_slice(data);
    cipher.decrypt_block(&mut block);
    Ok(block.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_aes_128_encryption() -> PDFResult<()> {
        let provider = AESProvider::new(16);
        let key = [1u8; 16];
        let data = b"Test AES-128 encryption with CBC mode".to_vec();

        let encrypted = provider.encrypt(&data, &key)?;
        // IV plus data padded to the next block boundary
        assert_eq!(encrypted.len(), 16 + 48);
        assert_eq!(provider.decrypt(&encrypted, &key)?, data);
        Ok(())
    }

    #[test]
    fn test_aes_256_encryption() -> PDFResult<()> {
        let provider = AESProvider::new(32);
        let key = [7u8; 32];
        let data = vec![0x42u8; 32];

        let encrypted = provider.encrypt(&data, &key)?;
        // Whole blocks still gain a full padding block
        assert_eq!(encrypted.len(), 16 + 48);
        assert_eq!(provider.decrypt(&encrypted, &key)?, data);
        Ok(())
    }

    #[test]
    fn test_fresh_iv_per_encryption() -> PDFResult<()> {
        let provider = AESProvider::new(16);
        let key = [3u8; 16];
        let first = provider.encrypt(b"same", &key)?;
        let second = provider.encrypt(b"same", &key)?;
        assert_ne!(first[..16], second[..16]);
        Ok(())
    }

    #[test]
    fn test_invalid_key_length() {
        let provider = AESProvider::new(16);
        assert!(matches!(
            provider.decrypt(&[0u8; 32], &[1u8; 24]),
            Err(PDFError::InvalidKeyLength(24))
        ));
    }

    #[test]
    fn test_invalid_data_length() {
        let provider = AESProvider::new(16);
        assert!(matches!(
            provider.decrypt(&[0u8; 8], &[1u8; 16]),
            Err(PDFError::InvalidDataLength { .. })
        ));
        assert!(matches!(
            provider.decrypt(&[0u8; 20], &[1u8; 16]),
            Err(PDFError::InvalidDataLength { .. })
        ));
    }

    #[test]
    fn test_ecb_block_roundtrip() -> PDFResult<()> {
        let key = [9u8; 32];
        let block = *b"perms block 0123";
        let encrypted = aes256_ecb_encrypt_block(&key, &block)?;
        assert_ne!(encrypted, block);
        assert_eq!(aes256_ecb_decrypt_block(&key, &encrypted)?, block);
        Ok(())
    }
}
