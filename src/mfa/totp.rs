use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{AuthError, AuthResult};

type HmacSha1 = Hmac<Sha1>;

/// Width of one code window in seconds.
pub const TOTP_PERIOD: u64 = 30;

/// Digits in a generated code.
pub const TOTP_DIGITS: u32 = 6;

/// Accepted windows on each side of the current one.
pub const TOTP_TOLERANCE: i64 = 1;

/// HOTP (RFC 4226): HMAC-SHA1 with dynamic truncation, reduced to
/// `TOTP_DIGITS` decimal digits.
pub fn hotp(secret: &[u8], counter: u64) -> AuthResult<u32> {
    let mut mac = HmacSha1::new_from_slice(secret).map_err(|_| AuthError::Crypto)?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let code = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);

    Ok(code % 10u32.pow(TOTP_DIGITS))
}

/// TOTP (RFC 6238): HOTP over the 30-second window containing
/// `unix_time`.
pub fn totp(secret: &[u8], unix_time: u64) -> AuthResult<u32> {
    hotp(secret, unix_time / TOTP_PERIOD)
}

/// Window number containing `unix_time`.
pub fn window_of(unix_time: u64) -> u64 {
    unix_time / TOTP_PERIOD
}

/// Base32 encoding used by authenticator apps.
pub fn encode_secret(secret: &[u8]) -> String {
    BASE32_NOPAD.encode(secret)
}

pub fn decode_secret(encoded: &str) -> AuthResult<Vec<u8>> {
    BASE32_NOPAD
        .decode(encoded.as_bytes())
        .map_err(|_| AuthError::Invalid)
}

/// otpauth:// provisioning URL for QR enrollment.
pub fn provisioning_url(issuer: &str, username: &str, secret: &[u8]) -> String {
    format!(
        "otpauth://totp/{issuer}:{username}?secret={}&issuer={issuer}&algorithm=SHA1&digits={TOTP_DIGITS}&period={TOTP_PERIOD}",
        encode_secret(secret),
    )
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
