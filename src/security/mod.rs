//! Document encryption state machine and password-based security
//!
//! A document moves from unencrypted to pending encryption with
//! [`encrypt`]; its objects stay in plaintext and are encrypted by the
//! writer on save. A parsed encrypted file is locked until [`decrypt`]
//! authenticates a password and decrypts every object.

mod key_derivation;
mod authentication;

use std::fmt;
use log::debug;
use rand::{thread_rng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::ObjectCipher;
use crate::document::Document;
use crate::error::{PDFError, PDFResult};
use crate::handlers::{SecurityHandler, StandardSecurityHandler};
use crate::pdf::{expand_object_streams, Object, Version, DEFAULT_MAX_NESTING};

/// Supported encryption algorithms for PDF encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionAlgorithm {
    /// RC4 encryption with 40-bit key (PDF 1.1)
    Rc4_40,
    /// RC4 encryption with a key of up to 128 bits (PDF 1.4)
    Rc4_128,
    /// AES encryption with 128-bit key (PDF 1.6)
    Aes128,
    /// AES encryption with 256-bit key (PDF 2.0)
    Aes256,
}

impl EncryptionAlgorithm {
    /// `(V, R, key length in bytes)` written to the encryption dictionary
    pub fn parameters(&self) -> (u32, u32, usize) {
        match self {
            EncryptionAlgorithm::Rc4_40 => (1, 2, 5),
            EncryptionAlgorithm::Rc4_128 => (2, 3, 16),
            EncryptionAlgorithm::Aes128 => (4, 4, 16),
            EncryptionAlgorithm::Aes256 => (5, 6, 32),
        }
    }

    /// Select the algorithm for a requested key length in bits
    pub fn from_key_length(bits: u32) -> PDFResult<Self> {
        match bits {
            40 => Ok(EncryptionAlgorithm::Rc4_40),
            128 => Ok(EncryptionAlgorithm::Aes128),
            256 => Ok(EncryptionAlgorithm::Aes256),
            other => Err(PDFError::InvalidKeyLength(other as usize)),
        }
    }

    /// Lowest file version that can carry this algorithm
    pub fn minimum_version(&self) -> Version {
        match self {
            EncryptionAlgorithm::Rc4_40 => Version::new(1, 1),
            EncryptionAlgorithm::Rc4_128 => Version::new(1, 4),
            EncryptionAlgorithm::Aes128 => Version::new(1, 6),
            EncryptionAlgorithm::Aes256 => Version::new(1, 7),
        }
    }

    pub fn is_aes(&self) -> bool {
        matches!(self, EncryptionAlgorithm::Aes128 | EncryptionAlgorithm::Aes256)
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionAlgorithm::Rc4_40 => write!(f, "RC4-40"),
            EncryptionAlgorithm::Rc4_128 => write!(f, "RC4-128"),
            EncryptionAlgorithm::Aes128 => write!(f, "AES-128"),
            EncryptionAlgorithm::Aes256 => write!(f, "AES-256"),
        }
    }
}

/// PDF permissions flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PDFPermissions(u32);

impl PDFPermissions {
    /// No permissions
    pub const NONE: u32 = 0;
    /// Print the document
    pub const PRINT: u32 = 1 << 2;
    /// Modify the document
    pub const MODIFY: u32 = 1 << 3;
    /// Copy text and graphics
    pub const COPY: u32 = 1 << 4;
    /// Add or modify annotations
    pub const ANNOTATE: u32 = 1 << 5;
    /// Fill form fields
    pub const FILL_FORMS: u32 = 1 << 8;
    /// Extract text and graphics for accessibility
    pub const EXTRACT: u32 = 1 << 9;
    /// Assemble the document
    pub const ASSEMBLE: u32 = 1 << 10;
    /// Print in high quality
    pub const PRINT_HIGH: u32 = 1 << 11;
    /// All permissions
    pub const ALL: u32 = Self::PRINT
        | Self::MODIFY
        | Self::COPY
        | Self::ANNOTATE
        | Self::FILL_FORMS
        | Self::EXTRACT
        | Self::ASSEMBLE
        | Self::PRINT_HIGH;

    /// Bits 7-8 and 13-32 must be set in `/P`
    const RESERVED: u32 = 0xFFFF_F0C0;

    /// Create new permissions from raw bits
    pub fn new(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    /// Read permissions from a `/P` value
    pub fn from_p_value(p: i32) -> Self {
        Self::new(p as u32)
    }

    /// Get raw permission bits
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Signed `/P` value with the reserved bits set
    pub fn p_value(&self) -> i32 {
        (self.0 | Self::RESERVED) as i32
    }

    /// Check if specific permission is granted
    pub fn has_permission(&self, permission: u32) -> bool {
        (self.0 & permission) == permission
    }

    pub fn deny(self, permission: u32) -> Self {
        Self(self.0 & !permission)
    }

    pub fn allow(self, permission: u32) -> Self {
        Self::new(self.0 | permission)
    }
}

impl Default for PDFPermissions {
    /// Everything allowed
    fn default() -> Self {
        Self(Self::ALL)
    }
}

/// Parameters for [`encrypt`]
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptOptions {
    pub user_password: String,
    /// Defaults to the user password when absent or empty
    pub owner_password: Option<String>,
    #[zeroize(skip)]
    pub permissions: PDFPermissions,
    #[zeroize(skip)]
    pub algorithm: EncryptionAlgorithm,
    #[zeroize(skip)]
    pub encrypt_metadata: bool,
}

impl EncryptOptions {
    /// AES-256 with every permission granted
    pub fn new(user_password: impl Into<String>) -> Self {
        Self {
            user_password: user_password.into(),
            owner_password: None,
            permissions: PDFPermissions::default(),
            algorithm: EncryptionAlgorithm::Aes256,
            encrypt_metadata: true,
        }
    }

    pub fn with_owner_password(mut self, owner_password: impl Into<String>) -> Self {
        self.owner_password = Some(owner_password.into());
        self
    }

    pub fn with_permissions(mut self, permissions: PDFPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_algorithm(mut self, algorithm: EncryptionAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Pick the algorithm from a key length of 40, 128 or 256 bits
    pub fn with_key_length(self, bits: u32) -> PDFResult<Self> {
        Ok(self.with_algorithm(EncryptionAlgorithm::from_key_length(bits)?))
    }

    pub fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }

    fn effective_owner_password(&self) -> &str {
        self.owner_password
            .as_deref()
            .filter(|password| !password.is_empty())
            .unwrap_or(&self.user_password)
    }
}

impl fmt::Debug for EncryptOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptOptions")
            .field("permissions", &self.permissions)
            .field("algorithm", &self.algorithm)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .finish_non_exhaustive()
    }
}

/// Where a document stands with respect to encryption
#[derive(Debug, Clone, Default)]
pub enum SecurityState {
    /// Plain document
    #[default]
    Unencrypted,
    /// Parsed from an encrypted file; objects are still ciphertext
    Locked(SecurityHandler),
    /// Objects are plaintext and will be encrypted on save
    Pending {
        handler: SecurityHandler,
        cipher: ObjectCipher,
    },
}

impl SecurityState {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, SecurityState::Unencrypted)
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, SecurityState::Locked(_))
    }

    pub fn handler(&self) -> Option<&SecurityHandler> {
        match self {
            SecurityState::Unencrypted => None,
            SecurityState::Locked(handler) | SecurityState::Pending { handler, .. } => Some(handler),
        }
    }

    /// Cipher the writer applies on save
    pub(crate) fn pending_cipher(&self) -> Option<&ObjectCipher> {
        match self {
            SecurityState::Pending { cipher, .. } => Some(cipher),
            _ => None,
        }
    }
}

/// Return a copy of `document` that is encrypted with the standard
/// security handler when saved
///
/// Encrypting a document that is already pending encryption replaces the
/// previous settings. A locked document must be decrypted first.
pub fn encrypt(document: &Document, options: &EncryptOptions) -> PDFResult<Document> {
    let mut output = document.clone();
    match &output.security {
        SecurityState::Locked(_) => return Err(PDFError::DocumentLocked),
        SecurityState::Pending { .. } => {
            if let Some(previous) = output.trailer.encrypt.take() {
                output.store.remove(previous);
            }
        }
        SecurityState::Unencrypted => {}
    }
    debug!("Encrypting document with {}", options.algorithm);

    let file_id = match &output.trailer.id {
        Some([first, _]) if !first.is_empty() => first.clone(),
        _ => {
            let mut id = vec![0u8; 16];
            thread_rng().fill_bytes(&mut id);
            output.trailer.id = Some([id.clone(), id.clone()]);
            id
        }
    };

    let (handler, file_key) = StandardSecurityHandler::new(
        options.algorithm,
        options.permissions,
        &options.user_password,
        options.effective_owner_password(),
        &file_id,
        options.encrypt_metadata,
    )?;
    let cipher = handler.cipher(&file_key);
    let encrypt_id = output.store.add(Object::Dictionary(handler.to_dict()));
    output.trailer.encrypt = Some(encrypt_id);
    output.security = SecurityState::Pending {
        handler: SecurityHandler::Standard(handler),
        cipher,
    };
    Ok(output)
}

/// Return a decrypted copy of `document`
///
/// The password is tried as the user password, then as the owner
/// password. Decryption works on a copy, so a failure leaves nothing
/// half-decrypted. An unencrypted document is returned unchanged.
pub fn decrypt(document: &Document, password: &str) -> PDFResult<Document> {
    let handler = match &document.security {
        SecurityState::Unencrypted => {
            debug!("Document is not encrypted");
            return Ok(document.clone());
        }
        SecurityState::Pending { handler, .. } => {
            handler.authenticate_password(password)?;
            let mut output = document.clone();
            if let Some(id) = output.trailer.encrypt.take() {
                output.store.remove(id);
            }
            output.security = SecurityState::Unencrypted;
            return Ok(output);
        }
        SecurityState::Locked(handler) => handler,
    };

    let file_key = handler.authenticate_password(password)?;
    let cipher = handler.cipher(&file_key);
    debug!("Decrypting document with {}", cipher.algorithm());

    let mut output = document.clone();
    let encrypt_id = output.trailer.encrypt;
    for id in output.store.ids() {
        if Some(id) == encrypt_id {
            continue;
        }
        if let Some(object) = output.store.get_mut(id) {
            cipher.decrypt_object(id, object)?;
        }
    }

    if !output.deferred.is_empty() {
        expand_object_streams(&mut output.store, &output.deferred, DEFAULT_MAX_NESTING)?;
        output.deferred.clear();
    }
    if let Some(id) = encrypt_id {
        output.store.remove(id);
    }
    output.trailer.encrypt = None;
    output.security = SecurityState::Unencrypted;
    output.invalidate_page_cache();

    output.store.require(output.trailer.root)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;
    use crate::editor::{add_page, PageSize};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sample_document() -> PDFResult<Document> {
        let document = Document::new();
        let document = add_page(&document, PageSize::A4, None)?;
        let document = add_page(&document, PageSize::Letter, None)?;
        document.set_metadata(&Metadata {
            title: Some("Encrypted report".to_string()),
            author: Some("Ops".to_string()),
            ..Metadata::default()
        })
    }

    #[test_log::test]
    fn test_permissions() {
        let perms = PDFPermissions::new(PDFPermissions::PRINT | PDFPermissions::COPY);
        assert!(perms.has_permission(PDFPermissions::PRINT));
        assert!(perms.has_permission(PDFPermissions::COPY));
        assert!(!perms.has_permission(PDFPermissions::MODIFY));
    }

    #[test_log::test]
    fn test_default_permissions_allow_everything() {
        let perms = PDFPermissions::default();
        assert_eq!(perms.p_value(), -4);
        assert!(perms.has_permission(PDFPermissions::ASSEMBLE));

        let no_print = perms.deny(PDFPermissions::PRINT);
        assert_eq!(no_print.p_value(), -8);
        assert_eq!(PDFPermissions::from_p_value(no_print.p_value()), no_print);
    }

    #[test_log::test]
    fn test_key_length_selection() -> PDFResult<()> {
        assert_eq!(EncryptionAlgorithm::from_key_length(40)?, EncryptionAlgorithm::Rc4_40);
        assert_eq!(EncryptionAlgorithm::from_key_length(128)?, EncryptionAlgorithm::Aes128);
        assert_eq!(EncryptionAlgorithm::from_key_length(256)?, EncryptionAlgorithm::Aes256);
        assert!(matches!(
            EncryptionAlgorithm::from_key_length(64),
            Err(PDFError::InvalidKeyLength(64))
        ));
        Ok(())
    }

    #[rstest]
    #[case(EncryptionAlgorithm::Rc4_40)]
    #[case(EncryptionAlgorithm::Rc4_128)]
    #[case(EncryptionAlgorithm::Aes128)]
    #[case(EncryptionAlgorithm::Aes256)]
    fn test_encrypt_save_decrypt(#[case] algorithm: EncryptionAlgorithm) -> PDFResult<()> {
        let document = sample_document()?;
        let options = EncryptOptions::new("pw")
            .with_owner_password("owner")
            .with_algorithm(algorithm);
        let encrypted = encrypt(&document, &options)?;
        assert!(encrypted.is_encrypted());

        let bytes = encrypted.to_bytes()?;
        let parsed = Document::parse(&bytes)?;
        assert!(parsed.security_state().is_locked());
        assert!(matches!(parsed.metadata(), Err(PDFError::DocumentLocked)));

        for password in ["pw", "owner"] {
            let decrypted = decrypt(&parsed, password)?;
            assert!(!decrypted.is_encrypted());
            assert_eq!(decrypted.page_count()?, 2);
            assert_eq!(decrypted.metadata()?, document.metadata()?);
        }

        assert!(matches!(decrypt(&parsed, "wrong"), Err(PDFError::InvalidPassword)));
        Ok(())
    }

    #[test_log::test]
    fn test_encrypted_output_hides_strings() -> PDFResult<()> {
        let document = sample_document()?;
        let encrypted = encrypt(&document, &EncryptOptions::new("pw"))?;
        let bytes = encrypted.to_bytes()?;
        assert!(!bytes.windows(16).any(|w| w == b"Encrypted report"));
        assert!(bytes.starts_with(b"%PDF-1.7"));
        Ok(())
    }

    #[test_log::test]
    fn test_locked_document_cannot_be_reencrypted() -> PDFResult<()> {
        let document = sample_document()?;
        let bytes = encrypt(&document, &EncryptOptions::new("pw"))?.to_bytes()?;
        let parsed = Document::parse(&bytes)?;
        assert!(matches!(
            encrypt(&parsed, &EncryptOptions::new("other")),
            Err(PDFError::DocumentLocked)
        ));
        Ok(())
    }

    #[test_log::test]
    fn test_decrypt_pending_document() -> PDFResult<()> {
        let document = sample_document()?;
        let encrypted = encrypt(&document, &EncryptOptions::new("pw"))?;
        assert!(matches!(decrypt(&encrypted, "nope"), Err(PDFError::InvalidPassword)));

        let plain = decrypt(&encrypted, "pw")?;
        assert!(!plain.is_encrypted());
        assert_eq!(plain.trailer().encrypt, None);
        Ok(())
    }
}
