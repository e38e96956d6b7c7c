//! RFC 6238 time-based one-time codes.
//!
//! HMAC-SHA1 over a base32-encoded shared secret, 30-second steps and six
//! digits by default, which is what standard authenticator apps expect. The
//! functions here are pure; persistence of the secret and of the replay
//! watermark lives in [`super::two_factor`].

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::prelude::RngExt;
use rand::rng;
use sha1::Sha1;

/// Secret length in raw bytes (160 bits, the RFC 4226 recommendation).
pub const SECRET_BYTES: usize = 20;

const BASE32: base32::Alphabet = base32::Alphabet::Rfc4648 { padding: false };

/// Generate a fresh base32-encoded shared secret from the CSPRNG.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rng().fill(&mut bytes);
    base32::encode(BASE32, &bytes)
}

/// Build the `otpauth://` provisioning URI for out-of-band enrollment
/// (typically rendered as a QR code by the caller).
pub fn provisioning_uri(issuer: &str, account_name: &str, secret: &str) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}",
        percent_encode(issuer),
        percent_encode(account_name),
        secret,
        percent_encode(issuer),
    )
}

/// Time step index for `now` given the step length in seconds.
pub fn time_step(now: DateTime<Utc>, step_secs: i64) -> i64 {
    now.timestamp().div_euclid(step_secs)
}

/// The code for one specific time step, or None when the secret is not valid
/// base32 or the step is out of range.
pub fn code_at(secret: &str, step: i64, digits: u32) -> Option<String> {
    let key = base32::decode(BASE32, secret)?;
    let counter = u64::try_from(step).ok()?;

    let mut mac = Hmac::<Sha1>::new_from_slice(&key).ok()?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // Dynamic truncation per RFC 4226 §5.3
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);

    let code = binary % 10u32.pow(digits);
    Some(format!("{code:0width$}", width = digits as usize))
}

/// Check `code` against the steps within `skew` of the current one.
///
/// Returns the matched step so the caller can enforce its replay watermark.
/// Fails closed: a malformed secret or code never matches.
pub fn verify_with_skew(secret: &str, code: &str, now: DateTime<Utc>, step_secs: i64, skew: i64, digits: u32) -> Option<i64> {
    let code = code.trim();
    if code.len() != digits as usize || !code.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let current = time_step(now, step_secs);
    for offset in -skew..=skew {
        let step = current + offset;
        if code_at(secret, step, digits).is_some_and(|expected| expected == code) {
            return Some(step);
        }
    }
    None
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
