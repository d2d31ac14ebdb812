//! Per-object encryption of strings and streams

use log::{trace, warn};
use md5::{Digest, Md5};
use zeroize::Zeroizing;

use crate::error::{PDFError, PDFResult};
use crate::pdf::{Object, ObjectId};
use crate::security::EncryptionAlgorithm;
use super::aes::AESProvider;
use super::rc4::RC4Provider;
use super::CryptoProvider;

static RC4: RC4Provider = RC4Provider;
static AES_128: AESProvider = AESProvider::new(16);
static AES_256: AESProvider = AESProvider::new(32);

/// Encrypts and decrypts the strings and streams of indirect objects
/// under one file encryption key
#[derive(Clone)]
pub struct ObjectCipher {
    algorithm: EncryptionAlgorithm,
    file_key: Zeroizing<Vec<u8>>,
    encrypt_metadata: bool,
}

impl std::fmt::Debug for ObjectCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCipher")
            .field("algorithm", &self.algorithm)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .finish_non_exhaustive()
    }
}

impl ObjectCipher {
    pub fn new(algorithm: EncryptionAlgorithm, file_key: Vec<u8>) -> Self {
        Self {
            algorithm,
            file_key: Zeroizing::new(file_key),
            encrypt_metadata: true,
        }
    }

    /// Leave `/Type /Metadata` streams in the clear when `false`
    pub fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }

    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    pub fn file_key(&self) -> &[u8] {
        &self.file_key
    }

    fn provider(&self) -> &'static dyn CryptoProvider {
        match self.algorithm {
            EncryptionAlgorithm::Rc4_40 | EncryptionAlgorithm::Rc4_128 => &RC4,
            EncryptionAlgorithm::Aes128 => &AES_128,
            EncryptionAlgorithm::Aes256 => &AES_256,
        }
    }

    /// Key for one object
    ///
    /// Revision 6 uses the file key directly. Earlier revisions hash the key
    /// with the low three bytes of the object number and the two bytes of
    /// the generation (plus `sAlT` for AES), keeping `n + 5` bytes, at most 16.
    fn object_key(&self, id: ObjectId) -> Zeroizing<Vec<u8>> {
        if self.algorithm == EncryptionAlgorithm::Aes256 {
            return self.file_key.clone();
        }

        let mut hasher = Md5::new();
        hasher.update(self.file_key.as_slice());
        hasher.update(&id.number.to_le_bytes()[..3]);
        hasher.update(id.generation.to_le_bytes());
        if self.algorithm == EncryptionAlgorithm::Aes128 {
            hasher.update(b"sAlT");
        }
        let hash = hasher.finalize();
        let key_len = (self.file_key.len() + 5).min(16);
        Zeroizing::new(hash[..key_len].to_vec())
    }

    pub fn encrypt_data(&self, id: ObjectId, data: &[u8]) -> PDFResult<Vec<u8>> {
        self.provider().encrypt(data, &self.object_key(id))
    }

    pub fn decrypt_data(&self, id: ObjectId, data: &[u8]) -> PDFResult<Vec<u8>> {
        self.provider().decrypt(data, &self.object_key(id))
    }

    fn skips_stream(&self, object: &Object) -> bool {
        match object {
            Object::Stream(stream) => {
                stream.dict.type_is("XRef")
                    || (!self.encrypt_metadata && stream.dict.type_is("Metadata"))
            }
            _ => false,
        }
    }

    /// Encrypt every string and the stream data of an object
    pub fn encrypt_object(&self, id: ObjectId, object: &mut Object) -> PDFResult<()> {
        if self.skips_stream(object) {
            return Ok(());
        }
        trace!("Encrypting object {}", id);
        let key = self.object_key(id);
        let provider = self.provider();

        object.try_for_each_string_mut(&mut |bytes: &mut Vec<u8>| {
            *bytes = provider.encrypt(bytes.as_slice(), &key)?;
            Ok::<(), PDFError>(())
        })?;
        if let Object::Stream(stream) = object {
            let encrypted = provider.encrypt(&stream.content, &key)?;
            stream.set_content(encrypted);
        }
        Ok(())
    }

    /// Decrypt every string and the stream data of an object
    ///
    /// A string that fails to decrypt is kept as read; some producers
    /// leave individual strings unencrypted.
    pub fn decrypt_object(&self, id: ObjectId, object: &mut Object) -> PDFResult<()> {
        if self.skips_stream(object) {
            return Ok(());
        }
        trace!("Decrypting object {}", id);
        let key = self.object_key(id);
        let provider = self.provider();

        object.try_for_each_string_mut(&mut |bytes: &mut Vec<u8>| {
            match provider.decrypt(bytes.as_slice(), &key) {
                Ok(plain) => *bytes = plain,
                Err(e) => warn!("Keeping undecryptable string in object {}: {}", id, e),
            }
            Ok::<(), PDFError>(())
        })?;
        if let Object::Stream(stream) = object {
            let decrypted = provider.decrypt(&stream.content, &key)?;
            stream.set_content(decrypted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{Dictionary, Stream};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sample_object() -> Object {
        let mut dict = Dictionary::new();
        dict.set("Title", Object::string("Quarterly report"));
        dict.set("Names", vec![Object::string("a"), Object::name("Keep")]);
        Object::Stream(Stream::new(dict, b"BT /F1 12 Tf (Hi) Tj ET".to_vec()))
    }

    #[test_log::test]
    fn test_object_key_length() {
        let rc4_40 = ObjectCipher::new(EncryptionAlgorithm::Rc4_40, vec![1; 5]);
        assert_eq!(rc4_40.object_key(ObjectId::new(1, 0)).len(), 10);

        let rc4_128 = ObjectCipher::new(EncryptionAlgorithm::Rc4_128, vec![1; 16]);
        assert_eq!(rc4_128.object_key(ObjectId::new(1, 0)).len(), 16);

        let aes_256 = ObjectCipher::new(EncryptionAlgorithm::Aes256, vec![1; 32]);
        assert_eq!(aes_256.object_key(ObjectId::new(1, 0)).as_slice(), &[1u8; 32][..]);
    }

    #[test_log::test]
    fn test_keys_differ_per_object() {
        let cipher = ObjectCipher::new(EncryptionAlgorithm::Aes128, vec![5; 16]);
        assert_ne!(
            cipher.object_key(ObjectId::new(1, 0)),
            cipher.object_key(ObjectId::new(2, 0))
        );
        assert_ne!(
            cipher.object_key(ObjectId::new(1, 0)),
            cipher.object_key(ObjectId::new(1, 1))
        );
    }

    #[rstest]
    #[case(EncryptionAlgorithm::Rc4_40, 5)]
    #[case(EncryptionAlgorithm::Rc4_128, 16)]
    #[case(EncryptionAlgorithm::Aes128, 16)]
    #[case(EncryptionAlgorithm::Aes256, 32)]
    fn test_object_roundtrip(#[case] algorithm: EncryptionAlgorithm, #[case] key_len: usize) {
        let cipher = ObjectCipher::new(algorithm, vec![0xA5; key_len]);
        let id = ObjectId::new(12, 0);
        let original = sample_object();

        let mut object = original.clone();
        cipher.encrypt_object(id, &mut object).unwrap();
        assert_ne!(object, original);
        let stream = object.as_stream().unwrap();
        assert_eq!(stream.dict.get_integer("Length"), Some(stream.content.len() as i64));
        assert_eq!(stream.dict.get_array("Names").unwrap()[1], Object::name("Keep"));

        cipher.decrypt_object(id, &mut object).unwrap();
        assert_eq!(object, original);
    }

    #[test_log::test]
    fn test_xref_streams_untouched() -> PDFResult<()> {
        let cipher = ObjectCipher::new(EncryptionAlgorithm::Rc4_128, vec![1; 16]);
        let mut object = Object::Stream(Stream::new(Dictionary::with_type("XRef"), vec![1, 2, 3]));
        let original = object.clone();
        cipher.encrypt_object(ObjectId::new(3, 0), &mut object)?;
        assert_eq!(object, original);
        Ok(())
    }
}
