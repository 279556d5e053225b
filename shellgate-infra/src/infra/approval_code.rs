use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use std::fmt;
use std::path::Path;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// Characters used for the RAW half; no 0/O or 1/I look-alikes.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const HALF_LEN: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalCodeError {
    #[error("code must look like RAW-SIG with 8 characters on each side")]
    Malformed,
    #[error("secret cannot be used as an HMAC key")]
    InvalidKey,
}

/// Shared secret read from the secret file. Wiped on drop.
pub struct ApprovalSecret(Vec<u8>);

impl ApprovalSecret {
    /// Returns `None` for empty or whitespace-only input.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let start = bytes.iter().position(|b| !b.is_ascii_whitespace())?;
        let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace())?;
        Some(Self(bytes[start..=end].to_vec()))
    }

    /// Reads and trims the file; any read error or an empty file yields `None`.
    pub fn from_file(path: &Path) -> Option<Self> {
        let mut bytes = std::fs::read(path).ok()?;
        let secret = Self::from_bytes(&bytes);
        bytes.zeroize();
        secret
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for ApprovalSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for ApprovalSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApprovalSecret(..)")
    }
}

/// `upper(hex(HMAC-SHA256(secret, raw ++ request_id)))[..8]`
pub fn sign(secret: &ApprovalSecret, raw: &str, request_id: &str) -> Result<String, ApprovalCodeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ApprovalCodeError::InvalidKey)?;
    mac.update(raw.as_bytes());
    mac.update(request_id.as_bytes());
    let digest = hex::encode_upper(mac.finalize().into_bytes());
    Ok(digest[..HALF_LEN].to_string())
}

/// Eight random characters from [`CODE_ALPHABET`].
pub fn generate_raw<R: Rng>(rng: &mut R) -> String {
    (0..HALF_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// A parsed `RAW-SIG` approval code, canonicalized to upper case.
#[derive(Clone, PartialEq, Eq)]
pub struct ApprovalCode {
    raw: String,
    sig: String,
}

impl ApprovalCode {
    /// Trims, upper-cases and splits on the first `-`. Both halves must be
    /// exactly eight ASCII characters.
    pub fn parse(text: &str) -> Result<Self, ApprovalCodeError> {
        let text = text.trim().to_ascii_uppercase();
        let (raw, sig) = text.split_once('-').ok_or(ApprovalCodeError::Malformed)?;
        let well_formed = |half: &str| half.len() == HALF_LEN && half.is_ascii();
        if !well_formed(raw) || !well_formed(sig) {
            return Err(ApprovalCodeError::Malformed);
        }
        Ok(Self {
            raw: raw.to_string(),
            sig: sig.to_string(),
        })
    }

    /// Generates a fresh RAW half and signs it for `request_id`.
    pub fn issue(secret: &ApprovalSecret, request_id: &str) -> Result<Self, ApprovalCodeError> {
        let raw = generate_raw(&mut rand::thread_rng());
        let sig = sign(secret, &raw, request_id)?;
        Ok(Self { raw, sig })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Constant-time check of the signature half.
    pub fn verify(&self, secret: &ApprovalSecret, request_id: &str) -> bool {
        match sign(secret, &self.raw, request_id) {
            Ok(expected) => bool::from(expected.as_bytes().ct_eq(self.sig.as_bytes())),
            Err(_) => false,
        }
    }
}

impl fmt::Display for ApprovalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.raw, self.sig)
    }
}

impl fmt::Debug for ApprovalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApprovalCode({}-********)", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn secret() -> ApprovalSecret {
        ApprovalSecret::from_bytes(b"  correct horse battery staple\n").unwrap()
    }

    #[test]
    fn test_signature_matches_hmac_prefix() {
        let mut mac = HmacSha256::new_from_slice(b"correct horse battery staple").unwrap();
        mac.update(b"XY987Z65AB12CD34");
        let expected = hex::encode_upper(mac.finalize().into_bytes())[..8].to_string();

        assert_eq!(sign(&secret(), "XY987Z65", "AB12CD34").unwrap(), expected);
    }

    #[test]
    fn test_valid_code_verifies() {
        let sig = sign(&secret(), "XY987Z65", "AB12CD34").unwrap();
        let code = ApprovalCode::parse(&format!("XY987Z65-{}", sig)).unwrap();
        assert!(code.verify(&secret(), "AB12CD34"));
        assert!(!code.verify(&secret(), "AB12CD35"));
    }

    #[test]
    fn test_every_single_character_mutation_is_rejected() {
        let sig = sign(&secret(), "XY987Z65", "AB12CD34").unwrap();
        for i in 0..sig.len() {
            for replacement in "0123456789ABCDEF".chars() {
                let mut mutated: Vec<char> = sig.chars().collect();
                if mutated[i] == replacement {
                    continue;
                }
                mutated[i] = replacement;
                let mutated: String = mutated.into_iter().collect();
                let code = ApprovalCode::parse(&format!("XY987Z65-{}", mutated)).unwrap();
                assert!(!code.verify(&secret(), "AB12CD34"), "accepted {}", mutated);
            }
        }
    }

    #[test]
    fn test_parse_is_case_insensitive_and_trimmed() {
        let code = ApprovalCode::parse("  xy987z65-abcdef12 \n").unwrap();
        assert_eq!(code.to_string(), "XY987Z65-ABCDEF12");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "XY987Z65", "XY987Z6-ABCDEF12", "XY987Z65-ABCDEF123", "XY987Z65ABCDEF12"] {
            assert_eq!(ApprovalCode::parse(bad), Err(ApprovalCodeError::Malformed), "{}", bad);
        }
    }

    #[test]
    fn test_issued_code_round_trips_through_parse() {
        let code = ApprovalCode::issue(&secret(), "AB12CD34").unwrap();
        let parsed = ApprovalCode::parse(&code.to_string().to_lowercase()).unwrap();
        assert!(parsed.verify(&secret(), "AB12CD34"));
    }

    #[test]
    fn test_raw_uses_unambiguous_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let raw = generate_raw(&mut rng);
            assert_eq!(raw.len(), 8);
            assert!(raw.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_blank_secret_is_rejected() {
        assert!(ApprovalSecret::from_bytes(b" \n\t").is_none());
        assert!(ApprovalSecret::from_bytes(b"").is_none());
    }

    #[test]
    fn test_secret_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "s3cret\n").unwrap();
        assert!(ApprovalSecret::from_file(&path).is_some());
        assert!(ApprovalSecret::from_file(&dir.path().join("missing")).is_none());
    }
}
