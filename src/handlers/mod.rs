//! Security handlers for PDF encryption/decryption

mod standard;

pub use standard::StandardSecurityHandler;

use log::debug;
use zeroize::Zeroizing;

use crate::crypto::ObjectCipher;
use crate::error::{PDFError, PDFResult};
use crate::pdf::Dictionary;
use crate::security::{EncryptionAlgorithm, PDFPermissions};

/// Security handler named by the `/Filter` of an encryption dictionary
#[derive(Debug, Clone)]
pub enum SecurityHandler {
    /// Standard password-based security handler
    Standard(StandardSecurityHandler),
}

impl SecurityHandler {
    /// Select the handler for an `/Encrypt` dictionary
    pub fn from_dict(dict: &Dictionary, file_id: &[u8]) -> PDFResult<Self> {
        match dict.get_name("Filter") {
            Some("Standard") => Ok(SecurityHandler::Standard(StandardSecurityHandler::from_dict(dict, file_id)?)),
            Some(other) => Err(PDFError::UnsupportedEncryption(format!("security handler /{}", other))),
            None => Err(PDFError::malformed("Encryption dictionary has no /Filter")),
        }
    }

    /// Authenticate with password
    pub fn authenticate_password(&self, password: &str) -> PDFResult<Zeroizing<Vec<u8>>> {
        debug!("Attempting password authentication");
        match self {
            SecurityHandler::Standard(handler) => handler.authenticate_password(password),
        }
    }

    /// Get encryption algorithm
    pub fn algorithm(&self) -> EncryptionAlgorithm {
        match self {
            SecurityHandler::Standard(handler) => handler.algorithm(),
        }
    }

    pub fn permissions(&self) -> PDFPermissions {
        match self {
            SecurityHandler::Standard(handler) => handler.permissions(),
        }
    }

    /// Create dictionary representation
    pub fn to_dict(&self) -> Dictionary {
        match self {
            SecurityHandler::Standard(handler) => handler.to_dict(),
        }
    }

    pub fn cipher(&self, file_key: &[u8]) -> ObjectCipher {
        match self {
            SecurityHandler::Standard(handler) => handler.cipher(file_key),
        }
    }
}
