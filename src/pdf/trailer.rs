//! Document trailer

use crate::error::{PDFError, PDFResult};
use super::{Dictionary, Object, ObjectId};

/// Entries of the document trailer the core acts on
#[derive(Debug, Clone, PartialEq)]
pub struct Trailer {
    /// One past the highest object number
    pub size: u32,
    /// Document catalog
    pub root: ObjectId,
    /// Document information dictionary
    pub info: Option<ObjectId>,
    /// Encryption dictionary
    pub encrypt: Option<ObjectId>,
    /// File identifier pair
    pub id: Option<[Vec<u8>; 2]>,
}

impl Trailer {
    /// Create trailer for a fresh document
    pub fn new(root: ObjectId) -> Self {
        Self {
            size: root.number + 1,
            root,
            info: None,
            encrypt: None,
            id: None,
        }
    }

    /// Read trailer entries from a trailer or XRef stream dictionary
    pub fn from_dict(dict: &Dictionary) -> PDFResult<Self> {
        let root = dict
            .get_reference("Root")
            .ok_or_else(|| PDFError::malformed("Trailer has no /Root reference"))?;

        let id = dict.get_array("ID").and_then(|items| match items.as_slice() {
            [Object::String(first), Object::String(second)] => Some([first.clone(), second.clone()]),
            _ => None,
        });

        Ok(Self {
            size: dict
                .get_integer("Size")
                .and_then(|s| u32::try_from(s).ok())
                .unwrap_or(0),
            root,
            info: dict.get_reference("Info"),
            encrypt: dict.get_reference("Encrypt"),
            id,
        })
    }

    /// Trailer dictionary as written by a full save
    pub fn to_dict(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Size", self.size);
        dict.set("Root", self.root);
        if let Some(info) = self.info {
            dict.set("Info", info);
        }
        if let Some(encrypt) = self.encrypt {
            dict.set("Encrypt", encrypt);
        }
        if let Some([first, second]) = &self.id {
            dict.set(
                "ID",
                vec![Object::String(first.clone()), Object::String(second.clone())],
            );
        }
        dict
    }

    /// First element of the file identifier, used in key derivation
    pub fn first_id(&self) -> &[u8] {
        self.id.as_ref().map_or(&[], |[first, _]| first.as_slice())
    }
}
