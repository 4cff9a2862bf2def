use aws_lc_rs::pbkdf2::{self, PBKDF2_HMAC_SHA256};
use std::num::NonZeroU32;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;

///
/// Hash a password for storage as `pbkdf2-sha256$<iterations>$<salt>$<hash>`.
///
pub fn hash(password: &str, iterations: u32) -> String {
    let iterations = NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN);
    let salt: [u8; SALT_LENGTH] = rand::random();

    let mut hash = [0u8; HASH_LENGTH];
    pbkdf2::derive(
        PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &mut hash,
    );

    format!(
        "{SCHEME}${iterations}${}${}",
        hex::encode(salt),
        hex::encode(hash)
    )
}

///
/// Constant time comparison against a stored hash.
/// Malformed stored values never verify.
///
pub fn verify(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');

    let (Some(SCHEME), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Some(iterations) = iterations.parse().ok().and_then(NonZeroU32::new) else {
        return false;
    };

    let (Ok(salt), Ok(hash)) = (hex::decode(salt), hex::decode(hash)) else {
        return false;
    };

    pbkdf2::verify(
        PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &hash,
    )
    .is_ok()
}
