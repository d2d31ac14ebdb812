//! Standard Security Handler implementation according to PDF specification

use std::fmt;
use log::{debug, trace};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::crypto::ObjectCipher;
use crate::error::{PDFError, PDFResult};
use crate::pdf::{Dictionary, Object};
use crate::security::{EncryptionAlgorithm, PDFPermissions};

const CRYPT_FILTER: &str = "StdCF";

/// Standard security handler for password-based encryption
#[derive(Clone, ZeroizeOnDrop)]
pub struct StandardSecurityHandler {
    #[zeroize(skip)]
    pub(crate) algorithm: EncryptionAlgorithm,
    #[zeroize(skip)]
    pub(crate) version: u32,
    #[zeroize(skip)]
    pub(crate) revision: u32,
    /// File key length in bytes
    #[zeroize(skip)]
    pub(crate) key_length: usize,
    #[zeroize(skip)]
    pub(crate) permissions: PDFPermissions,
    pub(crate) o_value: Vec<u8>,
    pub(crate) u_value: Vec<u8>,
    pub(crate) oe_value: Option<Vec<u8>>,
    pub(crate) ue_value: Option<Vec<u8>>,
    pub(crate) perms_value: Option<Vec<u8>>,
    pub(crate) file_id: Vec<u8>,
    #[zeroize(skip)]
    pub(crate) encrypt_metadata: bool,
}

impl StandardSecurityHandler {
    /// Build a handler for new passwords, returning it with the file key
    pub fn new(
        algorithm: EncryptionAlgorithm,
        permissions: PDFPermissions,
        user_password: &str,
        owner_password: &str,
        file_id: &[u8],
        encrypt_metadata: bool,
    ) -> PDFResult<(Self, Zeroizing<Vec<u8>>)> {
        let (version, revision, key_length) = algorithm.parameters();

        let mut handler = Self {
            algorithm,
            version,
            revision,
            key_length,
            permissions,
            o_value: Vec::new(),
            u_value: Vec::new(),
            oe_value: None,
            ue_value: None,
            perms_value: None,
            file_id: file_id.to_vec(),
            encrypt_metadata,
        };

        let file_key = handler.generate_encryption_values(user_password, owner_password)?;
        debug!("Created standard security handler V{} R{}", version, revision);
        Ok((handler, file_key))
    }

    /// Read the handler from an `/Encrypt` dictionary
    pub fn from_dict(dict: &Dictionary, file_id: &[u8]) -> PDFResult<Self> {
        let filter = dict.get_name("Filter").unwrap_or_default();
        if filter != "Standard" {
            return Err(PDFError::UnsupportedEncryption(format!("security handler /{}", filter)));
        }

        let version = dict.get_integer("V").unwrap_or(0);
        let revision = dict
            .get_integer("R")
            .ok_or_else(|| PDFError::malformed("Encryption dictionary has no /R"))?;
        if !(2..=6).contains(&revision) {
            return Err(PDFError::UnsupportedRevision(revision.clamp(0, i64::from(u32::MAX)) as u32));
        }
        let length_bits = dict.get_integer("Length").unwrap_or(40);

        let (algorithm, key_length) = match version {
            1 => (EncryptionAlgorithm::Rc4_40, 5),
            2 => (EncryptionAlgorithm::Rc4_128, rc4_key_length(length_bits)),
            4 => crypt_filter_algorithm(dict)?,
            5 => (EncryptionAlgorithm::Aes256, 32),
            other => {
                return Err(PDFError::UnsupportedEncryption(format!("encryption version V{}", other)))
            }
        };

        let (hash_len, needs_keys) = if revision >= 5 { (48, true) } else { (32, false) };
        let o_value = password_entry(dict, "O", hash_len)?;
        let u_value = password_entry(dict, "U", hash_len)?;
        let (oe_value, ue_value) = if needs_keys {
            (
                Some(password_entry(dict, "OE", 32)?),
                Some(password_entry(dict, "UE", 32)?),
            )
        } else {
            (None, None)
        };

        let p = dict
            .get_integer("P")
            .ok_or_else(|| PDFError::malformed("Encryption dictionary has no /P"))?;

        trace!("Read standard security handler V{} R{} ({})", version, revision, algorithm);
        Ok(Self {
            algorithm,
            version: version as u32,
            revision: revision as u32,
            key_length,
            permissions: PDFPermissions::from_p_value(p as u32 as i32),
            o_value,
            u_value,
            oe_value,
            ue_value,
            perms_value: dict.get_string("Perms").map(<[u8]>::to_vec),
            file_id: file_id.to_vec(),
            encrypt_metadata: dict.get_bool("EncryptMetadata").unwrap_or(true),
        })
    }

    /// Create dictionary representation
    pub fn to_dict(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("Standard"));
        dict.set("V", self.version);
        dict.set("R", self.revision);
        dict.set("Length", self.key_length * 8);
        dict.set("O", Object::String(self.o_value.clone()));
        dict.set("U", Object::String(self.u_value.clone()));
        dict.set("P", i64::from(self.permissions.p_value()));

        if self.version >= 4 {
            let method = if self.algorithm == EncryptionAlgorithm::Aes256 { "AESV3" } else { "AESV2" };
            let mut std_cf = Dictionary::with_type("CryptFilter");
            std_cf.set("CFM", Object::name(method));
            std_cf.set("AuthEvent", Object::name("DocOpen"));
            std_cf.set("Length", self.key_length);
            let mut filters = Dictionary::new();
            filters.set(CRYPT_FILTER, std_cf);
            dict.set("CF", filters);
            dict.set("StmF", Object::name(CRYPT_FILTER));
            dict.set("StrF", Object::name(CRYPT_FILTER));
            if !self.encrypt_metadata {
                dict.set("EncryptMetadata", false);
            }
        }

        if let (Some(oe), Some(ue)) = (&self.oe_value, &self.ue_value) {
            dict.set("OE", Object::String(oe.clone()));
            dict.set("UE", Object::String(ue.clone()));
        }
        if let Some(perms) = &self.perms_value {
            dict.set("Perms", Object::String(perms.clone()));
        }
        dict
    }

    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn permissions(&self) -> PDFPermissions {
        self.permissions
    }

    pub fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    /// Object cipher for an authenticated file key
    pub fn cipher(&self, file_key: &[u8]) -> ObjectCipher {
        ObjectCipher::new(self.algorithm, file_key.to_vec()).with_encrypt_metadata(self.encrypt_metadata)
    }
}

impl fmt::Debug for StandardSecurityHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardSecurityHandler")
            .field("algorithm", &self.algorithm)
            .field("version", &self.version)
            .field("revision", &self.revision)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

/// RC4 `/Length` is in bits, 40 to 128 in steps of 8
fn rc4_key_length(length_bits: i64) -> usize {
    (length_bits / 8).clamp(5, 16) as usize
}

/// Algorithm named by the default stream crypt filter of a V4 dictionary
fn crypt_filter_algorithm(dict: &Dictionary) -> PDFResult<(EncryptionAlgorithm, usize)> {
    let name = dict.get_name("StmF").unwrap_or("Identity");
    if name == "Identity" {
        return Err(PDFError::UnsupportedEncryption("Identity stream crypt filter".to_string()));
    }
    let filter = dict
        .get_dict("CF")
        .and_then(|filters| filters.get_dict(name))
        .ok_or_else(|| PDFError::malformed(format!("Crypt filter /{} not defined", name)))?;

    match filter.get_name("CFM").unwrap_or("None") {
        "AESV2" => Ok((EncryptionAlgorithm::Aes128, 16)),
        "V2" => {
            // Some writers give the crypt filter length in bytes
            let length = filter.get_integer("Length").unwrap_or(16);
            let bits = if length <= 16 { length * 8 } else { length };
            Ok((EncryptionAlgorithm::Rc4_128, rc4_key_length(bits)))
        }
        other => Err(PDFError::UnsupportedEncryption(format!("crypt filter method /{}", other))),
    }
}

fn password_entry(dict: &Dictionary, key: &str, min_len: usize) -> PDFResult<Vec<u8>> {
    let value = dict
        .get_string(key)
        .ok_or_else(|| PDFError::malformed(format!("Encryption dictionary has no /{}", key)))?;
    if value.len() < min_len {
        return Err(PDFError::malformed(format!(
            "Encryption dictionary /{} is {} bytes, expected {}",
            key,
            value.len(),
            min_len
        )));
    }
    Ok(value[..min_len].to_vec())
}
