//! RC4 encryption provider implementation

use rc4::consts::{U10, U11, U12, U13, U14, U15, U16, U5, U6, U7, U8, U9};
use rc4::{KeyInit, Rc4, StreamCipher};
use crate::error::{PDFError, PDFResult};
use super::CryptoProvider;

/// Apply the RC4 keystream for a 5 to 16 byte key in place
pub(crate) fn rc4_apply(key: &[u8], data: &mut [u8]) -> PDFResult<()> {
    macro_rules! apply {
        ($size:ty) => {{
            let mut cipher = Rc4::<$size>::new_from_slice(key)
                .map_err(|_| PDFError::InvalidKeyLength(key.len()))?;
            cipher.apply_keystream(data);
        }};
    }

    match key.len() {
        5 => apply!(U5),
        6 => apply!(U6),
        7 => apply!(U7),
        8 => apply!(U8),
        9 => apply!(U9),
        10 => apply!(U10),
        11 => apply!(U11),
        12 => apply!(U12),
        13 => apply!(U13),
        14 => apply!(U14),
        15 => apply!(U15),
        16 => apply!(U16),
        other => return Err(PDFError::InvalidKeyLength(other)),
    }
    Ok(())
}

/// RC4 encryption provider
#[derive(Debug, Default)]
pub struct RC4Provider;

impl CryptoProvider for RC4Provider {
    fn encrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        let mut output = data.to_vec();
        rc4_apply(key, &mut output)?;
        Ok(output)
    }

    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        // RC4 is symmetric
        self.encrypt(data, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_rc4_encryption() -> PDFResult<()> {
        let provider = RC4Provider;
        let key = hex::decode("0102030405").unwrap();
        let original = b"Test RC4 encryption".to_vec();

        let encrypted = provider.encrypt(&original, &key)?;
        assert_ne!(encrypted, original);
        assert_eq!(provider.decrypt(&encrypted, &key)?, original);
        Ok(())
    }

    #[test]
    fn test_rc4_known_vector() -> PDFResult<()> {
        let key = hex::decode("0102030405").unwrap();
        let mut data = vec![0u8; 8];
        rc4_apply(&key, &mut data)?;
        assert_eq!(hex::encode(data), "b2396305f03dc027");
        Ok(())
    }

    #[test]
    fn test_invalid_key_length() {
        let mut data = b"Test data".to_vec();
        assert!(matches!(
            rc4_apply(&[1, 2, 3], &mut data),
            Err(PDFError::InvalidKeyLength(3))
        ));
    }

    #[test]
    fn test_empty_data() {
        assert!(RC4Provider.encrypt(&[], &[1u8; 16]).unwrap().is_empty());
    }
}
