use std::{fmt, str::FromStr, time::Duration};

use bitflags::bitflags;
use data_encoding::HEXLOWER;
use rand::{rngs::OsRng, RngCore};
use tokio::time::Instant;

use crate::error::AuthError;

/// Длина идентификатора сессии в байтах энтропии.
pub const SESSION_ID_BYTES: usize = 24;

/// Уровень привилегий гостевой сессии.
pub const PRIVILEGE_GUEST: u32 = 0;
/// Уровень привилегий обычной сессии.
pub const PRIVILEGE_USER: u32 = 1;
/// Уровень привилегий административной сессии.
pub const PRIVILEGE_ADMIN: u32 = 2;

bitflags! {
    /// Факторы, подтверждённые в рамках сессии.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AuthFactors: u8 {
        const PASSWORD  = 0b0000_0001;
        const TOTP      = 0b0000_0010;
        const SMS       = 0b0000_0100;
        const HARDWARE  = 0b0000_1000;
        const BIOMETRIC = 0b0001_0000;
    }
}

/// Идентификатор сессии: 24 случайных байта в шестнадцатеричной записи.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

/// Состояние сессии.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Valid,
    Expired,
    /// Аннулирована по иным причинам; проверки отвергают её так же,
    /// как отозванную.
    Invalid,
    Revoked,
}

/// Сессия пользователя. Временные метки монотонные, чтобы переводы
/// системных часов не продлевали и не убивали сессии.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub user_id: u32,
    pub created_at: Instant,
    /// Последняя активность; двигается при каждой успешной проверке.
    pub last_activity: Instant,
    /// Абсолютный срок; двигается только явным продлением.
    pub expires_at: Instant,
    pub state: SessionState,
    /// Второй фактор подтверждён. При входе без MFA ставится сразу.
    pub mfa_verified: bool,
    pub factors: AuthFactors,
    pub privilege_level: u32,
    pub client_ip: Option<String>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SessionId {
    /// Генерирует новый криптослучайный идентификатор.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(HEXLOWER.encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Session {
    /// Сессия просрочена к моменту `now` по абсолютному сроку или
    /// по таймауту простоя?
    pub fn is_expired(&self, idle_timeout: Duration, now: Instant) -> bool {
        now >= self.expires_at || now >= self.last_activity + idle_timeout
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для SessionId
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = AuthError;

    /// Принимает только канонический вид: ровно 48 шестнадцатеричных
    /// символов нижнего регистра.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SESSION_ID_BYTES * 2 {
            return Err(AuthError::InvalidToken);
        }
        if !s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
            return Err(AuthError::InvalidToken);
        }
        Ok(Self(s.to_string()))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_format() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), SESSION_ID_BYTES * 2);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_session_id_uniqueness() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_session_id_parse() {
        let id = SessionId::generate();
        let parsed: SessionId = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);

        assert_eq!("short".parse::<SessionId>(), Err(AuthError::InvalidToken));
        assert_eq!(
            "Z".repeat(SESSION_ID_BYTES * 2).parse::<SessionId>(),
            Err(AuthError::InvalidToken)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expiry_checks() {
        let now = Instant::now();
        let session = Session {
            id: SessionId::generate(),
            user_id: 1,
            created_at: now,
            last_activity: now,
            expires_at: now + Duration::from_secs(3600),
            state: SessionState::Valid,
            mfa_verified: true,
            factors: AuthFactors::PASSWORD,
            privilege_level: PRIVILEGE_USER,
            client_ip: None,
        };
        let idle = Duration::from_secs(1800);

        assert!(!session.is_expired(idle, now));
        // Таймаут простоя срабатывает раньше абсолютного.
        assert!(session.is_expired(idle, now + Duration::from_secs(1800)));
        assert!(session.is_expired(idle, now + Duration::from_secs(3600)));
    }
}
