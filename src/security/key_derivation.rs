//! File key derivation and password validation values
//!
//! Revisions 2 to 4 follow ISO 32000-1 algorithms 2 to 5 (MD5 and RC4).
//! Revision 6 follows ISO 32000-2 algorithms 2.A, 2.B, 8, 9 and 10
//! (SHA-2 with AES rounds); revision 5 uses its plain SHA-256 variant.

use md5::{Digest, Md5};
use rand::{thread_rng, RngCore};
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use crate::crypto::{aes128_cbc_encrypt_no_padding, aes256_cbc_encrypt_no_padding, aes256_ecb_encrypt_block, rc4_apply};
use crate::error::PDFResult;
use crate::handlers::StandardSecurityHandler;

/// Standard padding string from PDF spec
pub(crate) const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41,
    0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80,
    0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Longest password revision 6 looks at, in bytes
const R6_PASSWORD_LIMIT: usize = 127;

const ZERO_IV: [u8; 16] = [0; 16];

/// Truncate or pad a password to 32 bytes
pub(crate) fn pad_password(password: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut padded = Zeroizing::new([0u8; 32]);
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// Password bytes for revisions 2 to 4
///
/// These revisions expect PDFDocEncoding; text inside Latin-1 maps byte
/// for byte, anything else falls back to its UTF-8 bytes.
pub(crate) fn legacy_password_bytes(password: &str) -> Zeroizing<Vec<u8>> {
    let latin1: Option<Vec<u8>> = password
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect();
    Zeroizing::new(latin1.unwrap_or_else(|| password.as_bytes().to_vec()))
}

/// Password bytes for revisions 5 and 6: UTF-8, at most 127 bytes
pub(crate) fn r6_password_bytes(password: &str) -> &[u8] {
    let bytes = password.as_bytes();
    &bytes[..bytes.len().min(R6_PASSWORD_LIMIT)]
}

/// Algorithm 2.B: iterated SHA-2 hash with AES-128 rounds
pub(crate) fn hash_r6(password: &[u8], salt: &[u8], user_key: &[u8]) -> PDFResult<Zeroizing<[u8; 32]>> {
    let mut k = Zeroizing::new(
        Sha256::new()
            .chain_update(password)
            .chain_update(salt)
            .chain_update(user_key)
            .finalize()
            .to_vec(),
    );

    let mut round = 0usize;
    loop {
        let mut k1 = Zeroizing::new(Vec::with_capacity(64 * (password.len() + k.len() + user_key.len())));
        for _ in 0..64 {
            k1.extend_from_slice(password);
            k1.extend_from_slice(&k);
            k1.extend_from_slice(user_key);
        }

        let e = aes128_cbc_encrypt_no_padding(&k[..16], &k[16..32], &k1)?;
        // The first 16 bytes as a big-endian number mod 3; 256 = 1 (mod 3)
        let remainder = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
        *k = match remainder {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        round += 1;
        let last = usize::from(e[e.len() - 1]);
        if round >= 64 && last <= round - 32 {
            break;
        }
    }

    let mut hash = Zeroizing::new([0u8; 32]);
    hash.copy_from_slice(&k[..32]);
    Ok(hash)
}

/// Revision 5 hash: a single SHA-256
fn hash_r5(password: &[u8], salt: &[u8], user_key: &[u8]) -> Zeroizing<[u8; 32]> {
    let digest = Sha256::new()
        .chain_update(password)
        .chain_update(salt)
        .chain_update(user_key)
        .finalize();
    let mut hash = Zeroizing::new([0u8; 32]);
    hash.copy_from_slice(&digest);
    hash
}

/// Run the 19 extra RC4 passes of revisions 3 and 4 with `key XOR i`
fn rc4_rounds(key: &[u8], data: &mut [u8], rounds: impl Iterator<Item = u8>) -> PDFResult<()> {
    let mut round_key = Zeroizing::new(vec![0u8; key.len()]);
    for i in rounds {
        for (dst, src) in round_key.iter_mut().zip(key) {
            *dst = src ^ i;
        }
        rc4_apply(&round_key, data)?;
    }
    Ok(())
}

impl StandardSecurityHandler {
    /// Revision-appropriate hash for revisions 5 and 6
    pub(crate) fn hash_password(&self, password: &[u8], salt: &[u8], user_key: &[u8]) -> PDFResult<Zeroizing<[u8; 32]>> {
        if self.revision == 5 {
            Ok(hash_r5(password, salt, user_key))
        } else {
            hash_r6(password, salt, user_key)
        }
    }

    /// Algorithm 2: file key from a (padded) user password
    pub(crate) fn compute_file_key(&self, password: &[u8]) -> Zeroizing<Vec<u8>> {
        let n = self.key_length;
        let mut hasher = Md5::new();
        hasher.update(pad_password(password).as_slice());
        hasher.update(&self.o_value);
        hasher.update((self.permissions.p_value() as u32).to_le_bytes());
        hasher.update(&self.file_id);
        if self.revision >= 4 && !self.encrypt_metadata {
            hasher.update([0xFF; 4]);
        }
        let mut key = Zeroizing::new(hasher.finalize().to_vec());

        if self.revision >= 3 {
            for _ in 0..50 {
                *key = Md5::digest(&key[..n]).to_vec();
            }
        }
        key.truncate(n);
        key
    }

    /// Algorithm 3 steps a to d: RC4 key from the owner password
    pub(crate) fn owner_rc4_key(&self, owner_password: &[u8]) -> Zeroizing<Vec<u8>> {
        let mut hash = Zeroizing::new(Md5::digest(pad_password(owner_password).as_slice()).to_vec());
        if self.revision >= 3 {
            for _ in 0..50 {
                *hash = Md5::digest(hash.as_slice()).to_vec();
            }
        }
        hash.truncate(self.key_length);
        hash
    }

    /// Algorithm 3: the `/O` value
    pub(crate) fn compute_owner_value(&self, owner_password: &[u8], user_password: &[u8]) -> PDFResult<Vec<u8>> {
        let key = self.owner_rc4_key(owner_password);
        let mut value = pad_password(user_password).to_vec();
        rc4_apply(&key, &mut value)?;
        if self.revision >= 3 {
            rc4_rounds(&key, &mut value, 1..=19)?;
        }
        Ok(value)
    }

    /// Algorithms 4 and 5: the `/U` value for a file key
    pub(crate) fn compute_user_value(&self, file_key: &[u8]) -> PDFResult<Vec<u8>> {
        if self.revision == 2 {
            let mut value = PADDING.to_vec();
            rc4_apply(file_key, &mut value)?;
            return Ok(value);
        }

        let mut value = Md5::new()
            .chain_update(PADDING)
            .chain_update(&self.file_id)
            .finalize()
            .to_vec();
        rc4_apply(file_key, &mut value)?;
        rc4_rounds(file_key, &mut value, 1..=19)?;
        // Only the first 16 bytes are compared; the rest is arbitrary padding
        value.extend_from_slice(&[0u8; 16]);
        Ok(value)
    }

    /// Recover the padded user password from `/O` (algorithm 7)
    pub(crate) fn recover_user_password(&self, owner_password: &[u8]) -> PDFResult<Zeroizing<Vec<u8>>> {
        let key = self.owner_rc4_key(owner_password);
        let mut value = Zeroizing::new(self.o_value.clone());
        if self.revision == 2 {
            rc4_apply(&key, &mut value)?;
        } else {
            rc4_rounds(&key, &mut value, (0..=19).rev())?;
        }
        Ok(value)
    }

    /// Fill in O, U (and OE, UE, Perms) for new passwords; returns the file key
    pub(crate) fn generate_encryption_values(&mut self, user_password: &str, owner_password: &str) -> PDFResult<Zeroizing<Vec<u8>>> {
        if self.revision >= 5 {
            return self.generate_r6_values(r6_password_bytes(user_password), r6_password_bytes(owner_password));
        }

        let user = legacy_password_bytes(user_password);
        let owner = legacy_password_bytes(owner_password);
        self.o_value = self.compute_owner_value(&owner, &user)?;
        let file_key = self.compute_file_key(&user);
        self.u_value = self.compute_user_value(&file_key)?;
        Ok(file_key)
    }

    /// Algorithms 8, 9 and 10 with a random file key and salts
    fn generate_r6_values(&mut self, user_password: &[u8], owner_password: &[u8]) -> PDFResult<Zeroizing<Vec<u8>>> {
        let mut rng = thread_rng();
        let mut file_key = Zeroizing::new(vec![0u8; 32]);
        rng.fill_bytes(&mut file_key);
        let mut salts = [0u8; 32];
        rng.fill_bytes(&mut salts);
        let (user_salts, owner_salts) = salts.split_at(16);

        let user_hash = self.hash_password(user_password, &user_salts[..8], &[])?;
        let mut u_value = user_hash.to_vec();
        u_value.extend_from_slice(user_salts);
        let user_key = self.hash_password(user_password, &user_salts[8..], &[])?;
        self.ue_value = Some(aes256_cbc_encrypt_no_padding(user_key.as_slice(), &ZERO_IV, &file_key)?);

        let owner_hash = self.hash_password(owner_password, &owner_salts[..8], &u_value)?;
        let mut o_value = owner_hash.to_vec();
        o_value.extend_from_slice(owner_salts);
        let owner_key = self.hash_password(owner_password, &owner_salts[8..], &u_value)?;
        self.oe_value = Some(aes256_cbc_encrypt_no_padding(owner_key.as_slice(), &ZERO_IV, &file_key)?);

        self.u_value = u_value;
        self.o_value = o_value;
        self.perms_value = Some(self.compute_perms(&file_key)?);
        Ok(file_key)
    }

    /// Algorithm 10: the encrypted `/Perms` block
    fn compute_perms(&self, file_key: &[u8]) -> PDFResult<Vec<u8>> {
        let mut block = [0u8; 16];
        block[..4].copy_from_slice(&(self.permissions.p_value() as u32).to_le_bytes());
        block[4..8].copy_from_slice(&[0xFF; 4]);
        block[8] = if self.encrypt_metadata { b'T' } else { b'F' };
        block[9..12].copy_from_slice(b"adb");
        thread_rng().fill_bytes(&mut block[12..]);
        Ok(aes256_ecb_encrypt_block(file_key, &block)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{EncryptionAlgorithm, PDFPermissions};
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn handler(algorithm: EncryptionAlgorithm) -> PDFResult<StandardSecurityHandler> {
        let (handler, _) = StandardSecurityHandler::new(
            algorithm,
            PDFPermissions::default(),
            "user",
            "owner",
            &[0x11; 16],
            true,
        )?;
        Ok(handler)
    }

    #[test]
    fn test_password_padding() {
        let padded = pad_password(b"test");
        assert_eq!(&padded[..4], b"test");
        assert_eq!(&padded[4..], &PADDING[..28]);
        assert_eq!(pad_password(b"")[..], PADDING[..]);
        assert_eq!(&pad_password(&[b'x'; 40])[..], &[b'x'; 32][..]);
    }

    #[test]
    fn test_legacy_password_bytes() {
        assert_eq!(legacy_password_bytes("caf\u{e9}").as_slice(), &[b'c', b'a', b'f', 0xE9][..]);
        assert_eq!(legacy_password_bytes("\u{4e2d}").as_slice(), "\u{4e2d}".as_bytes());
    }

    #[test]
    fn test_r6_password_limit() {
        let long = "p".repeat(200);
        assert_eq!(r6_password_bytes(&long).len(), 127);
    }

    #[test]
    fn test_file_key_length() -> PDFResult<()> {
        assert_eq!(handler(EncryptionAlgorithm::Rc4_40)?.compute_file_key(b"user").len(), 5);
        assert_eq!(handler(EncryptionAlgorithm::Rc4_128)?.compute_file_key(b"user").len(), 16);
        Ok(())
    }

    #[test]
    fn test_owner_value_recovers_user_password() -> PDFResult<()> {
        for algorithm in [EncryptionAlgorithm::Rc4_40, EncryptionAlgorithm::Aes128] {
            let handler = handler(algorithm)?;
            assert_eq!(handler.o_value.len(), 32);
            let recovered = handler.recover_user_password(b"owner")?;
            assert_eq!(recovered.as_slice(), pad_password(b"user").as_slice());
        }
        Ok(())
    }

    #[test]
    fn test_hash_r6_is_deterministic() -> PDFResult<()> {
        let first = hash_r6(b"secret", b"saltsalt", &[])?;
        let second = hash_r6(b"secret", b"saltsalt", &[])?;
        assert_eq!(first, second);
        assert_ne!(*first, *hash_r6(b"secret", b"tlastlas", &[])?);
        Ok(())
    }

    #[test]
    fn test_r6_values_layout() -> PDFResult<()> {
        let handler = handler(EncryptionAlgorithm::Aes256)?;
        assert_eq!(handler.u_value.len(), 48);
        assert_eq!(handler.o_value.len(), 48);
        assert_eq!(handler.ue_value.as_ref().map(Vec::len), Some(32));
        assert_eq!(handler.oe_value.as_ref().map(Vec::len), Some(32));
        Ok(())
    }
}
