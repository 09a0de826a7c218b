//! Stored credentials
//!
//! Secrets are never stored as given. A credential is kept as
//! `sha256$<salt>$<digest>`, where both parts are lowercase hex and the digest is
//! SHA-256 over the salt followed by the secret. Comparison is constant-time.

use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq as _;

use super::CatalogError;

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

fn digest(salt: &[u8], secret: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret);
    hasher.finalize().into()
}

/// Produces a storable credential for `secret`, with a fresh random salt
#[must_use]
pub fn hash_secret(secret: &[u8]) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    format!(
        "{SCHEME}${}${}",
        hex::encode(salt),
        hex::encode(digest(&salt, secret))
    )
}

/// Checks `secret` against a stored credential.
///
/// `username` is only used to describe a malformed credential.
pub fn verify_secret(username: &str, stored: &str, secret: &[u8]) -> Result<bool, CatalogError> {
    let malformed = || CatalogError::MalformedCredential(username.to_string());
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(salt), Some(expected), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    let salt = hex::decode(salt).map_err(|_| malformed())?;
    let expected = hex::decode(expected).map_err(|_| malformed())?;
    let computed = digest(&salt, secret);
    Ok(computed[..].ct_eq(expected.as_slice()).into())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{hash_secret, verify_secret};
    use crate::catalog::CatalogError;
    use assertables::assert_starts_with;
    use pretty_assertions::assert_ne;

    #[test]
    fn matches_only_the_right_secret() {
        let stored = hash_secret(b"correct horse");
        assert!(verify_secret("u", &stored, b"correct horse").unwrap());
        assert!(!verify_secret("u", &stored, b"correct horse ").unwrap());
        assert!(!verify_secret("u", &stored, b"").unwrap());
    }

    #[test]
    fn salted() {
        let a = hash_secret(b"pw");
        let b = hash_secret(b"pw");
        assert_ne!(a, b);
        assert_starts_with!(a, "sha256$");
    }

    #[test]
    fn empty_secret_is_storable() {
        let stored = hash_secret(b"");
        assert!(verify_secret("u", &stored, b"").unwrap());
    }

    #[test]
    fn malformed() {
        for bad in ["", "plaintext", "md5$00$00", "sha256$zz$00", "sha256$00$00$00"] {
            assert!(
                matches!(verify_secret("bob", bad, b"x"), Err(CatalogError::MalformedCredential(u)) if u == "bob"),
                "{bad}"
            );
        }
    }

    #[test]
    fn wrong_digest_length_is_a_mismatch() {
        assert!(!verify_secret("u", "sha256$00$abcd", b"x").unwrap());
    }
}
