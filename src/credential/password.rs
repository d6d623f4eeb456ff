use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

use crate::{
    config::{AuthConfig, HashAlgorithm},
    error::{AuthError, AuthResult},
};

/// Salt length in bytes. Matches the bcrypt salt size so one salt
/// field serves both algorithms.
pub const SALT_LENGTH: usize = 16;

/// Output length of an Argon2id digest.
pub const ARGON2_OUTPUT_LENGTH: usize = 32;

/// Maximum username length in characters.
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Generate a fresh random salt.
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Hash `password` under the given salt, algorithm and cost.
///
/// The cost parameter is the Argon2 time cost or the bcrypt cost
/// factor depending on the algorithm.
pub fn hash_password(
    password: &str,
    salt: &[u8; SALT_LENGTH],
    algorithm: HashAlgorithm,
    rounds: u32,
) -> AuthResult<Vec<u8>> {
    match algorithm {
        HashAlgorithm::Argon2id => {
            let params = Params::new(
                Params::DEFAULT_M_COST,
                rounds.max(1),
                Params::DEFAULT_P_COST,
                Some(ARGON2_OUTPUT_LENGTH),
            )
            .map_err(|_| AuthError::Crypto)?;
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

            let mut output = [0u8; ARGON2_OUTPUT_LENGTH];
            argon2
                .hash_password_into(password.as_bytes(), salt, &mut output)
                .map_err(|_| AuthError::Crypto)?;
            Ok(output.to_vec())
        }
        HashAlgorithm::Bcrypt => {
            // bcrypt accepts cost factors 4..=31 only.
            let cost = rounds.clamp(4, 31);
            let parts =
                bcrypt::hash_with_salt(password, cost, *salt).map_err(|_| AuthError::Crypto)?;
            Ok(parts.format_for_version(bcrypt::Version::TwoB).into_bytes())
        }
    }
}

/// Verify `password` against a stored digest in constant time.
pub fn verify_password_hash(
    password: &str,
    salt: &[u8; SALT_LENGTH],
    expected: &[u8],
    algorithm: HashAlgorithm,
    rounds: u32,
) -> AuthResult<()> {
    let computed = hash_password(password, salt, algorithm, rounds)?;
    if constant_time_eq(&computed, expected) {
        Ok(())
    } else {
        Err(AuthError::InvalidPassword)
    }
}

/// Constant-time byte comparison. A length mismatch still burns a
/// full comparison pass before failing.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        let _ = a.ct_eq(a);
        return false;
    }
    a.ct_eq(b).into()
}

/// Check `password` against the configured complexity policy.
pub fn check_password_policy(password: &str, config: &AuthConfig) -> AuthResult<()> {
    let length = password.chars().count();
    if length < config.min_password_length || length > config.max_password_length {
        return Err(AuthError::InvalidPassword);
    }

    let mut has_upper = false;
    let mut has_lower = false;
    let mut has_digit = false;
    let mut has_symbol = false;
    for ch in password.chars() {
        if ch.is_ascii_uppercase() {
            has_upper = true;
        } else if ch.is_ascii_lowercase() {
            has_lower = true;
        } else if ch.is_ascii_digit() {
            has_digit = true;
        } else {
            has_symbol = true;
        }
    }

    if config.require_uppercase && !has_upper
        || config.require_lowercase && !has_lower
        || config.require_numbers && !has_digit
        || config.require_symbols && !has_symbol
    {
        return Err(AuthError::InvalidPassword);
    }
    Ok(())
}

/// Usernames: 1..=64 characters from `[A-Za-z0-9._-]`.
pub fn validate_username(username: &str) -> bool {
    let length = username.chars().count();
    if length == 0 || length > MAX_USERNAME_LENGTH {
        return false;
    }
    username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig::default()
    }

    #[test]
    fn test_argon2_hash_and_verify() {
        let salt = generate_salt();
        let hash = hash_password("Correct1Horse", &salt, HashAlgorithm::Argon2id, 1).unwrap();

        assert_eq!(hash.len(), ARGON2_OUTPUT_LENGTH);
        assert!(
            verify_password_hash("Correct1Horse", &salt, &hash, HashAlgorithm::Argon2id, 1)
                .is_ok()
        );
        assert_eq!(
            verify_password_hash("WrongHorse99", &salt, &hash, HashAlgorithm::Argon2id, 1),
            Err(AuthError::InvalidPassword)
        );
    }

    #[test]
    fn test_bcrypt_hash_and_verify() {
        let salt = generate_salt();
        let hash = hash_password("Correct1Horse", &salt, HashAlgorithm::Bcrypt, 4).unwrap();

        assert!(
            verify_password_hash("Correct1Horse", &salt, &hash, HashAlgorithm::Bcrypt, 4).is_ok()
        );
        assert!(
            verify_password_hash("WrongHorse99", &salt, &hash, HashAlgorithm::Bcrypt, 4).is_err()
        );
    }

    /// Одинаковый пароль с разными солями даёт разные дайджесты.
    #[test]
    fn test_salt_changes_digest() {
        let salt_a = generate_salt();
        let salt_b = generate_salt();
        assert_ne!(salt_a, salt_b);

        let hash_a = hash_password("Correct1Horse", &salt_a, HashAlgorithm::Argon2id, 1).unwrap();
        let hash_b = hash_password("Correct1Horse", &salt_b, HashAlgorithm::Argon2id, 1).unwrap();
        assert_ne!(hash_a, hash_b);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abcdef", b"abcdef"));
        assert!(!constant_time_eq(b"abcdef", b"abcdeg"));
        assert!(!constant_time_eq(b"abc", b"abcdef"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_password_policy() {
        let config = test_config();

        assert!(check_password_policy("Sup3rSecret", &config).is_ok());
        // Короткий.
        assert_eq!(
            check_password_policy("Ab1", &config),
            Err(AuthError::InvalidPassword)
        );
        // Нет заглавной.
        assert_eq!(
            check_password_policy("sup3rsecret", &config),
            Err(AuthError::InvalidPassword)
        );
        // Нет цифры.
        assert_eq!(
            check_password_policy("SuperSecret", &config),
            Err(AuthError::InvalidPassword)
        );
    }

    #[test]
    fn test_password_policy_symbols() {
        let mut config = test_config();
        config.require_symbols = true;

        assert_eq!(
            check_password_policy("Sup3rSecret", &config),
            Err(AuthError::InvalidPassword)
        );
        assert!(check_password_policy("Sup3rSecret!", &config).is_ok());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice"));
        assert!(validate_username("svc-backup_01.local"));
        assert!(!validate_username(""));
        assert!(!validate_username("bad name"));
        assert!(!validate_username("bad/name"));
        assert!(!validate_username(&"a".repeat(MAX_USERNAME_LENGTH + 1)));
    }
}
