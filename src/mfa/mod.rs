pub mod engine;
pub mod totp;

pub use engine::{MfaEngine, MfaStatus};
pub use totp::{TOTP_DIGITS, TOTP_PERIOD, TOTP_TOLERANCE};
