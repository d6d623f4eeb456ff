use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Алгоритм хеширования паролей.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// Argon2id — алгоритм по умолчанию.
    Argon2id,
    /// Bcrypt — для совместимости с унаследованными хранилищами.
    Bcrypt,
}

/// Конфигурация ядра аутентификации.
///
/// Все поля открыты: значения задаются мутацией перед созданием
/// [`crate::AuthCore`] и после этого не меняются.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Минимальная длина пароля.
    pub min_password_length: usize,
    /// Максимальная длина пароля.
    pub max_password_length: usize,
    /// Требовать хотя бы одну заглавную букву.
    pub require_uppercase: bool,
    /// Требовать хотя бы одну строчную букву.
    pub require_lowercase: bool,
    /// Требовать хотя бы одну цифру.
    pub require_numbers: bool,
    /// Требовать хотя бы один спецсимвол (не буква и не цифра).
    pub require_symbols: bool,
    /// Глубина истории паролей: столько последних паролей нельзя
    /// использовать повторно при смене.
    pub password_history: usize,
    /// Максимальный возраст пароля до принудительной смены.
    pub password_max_age: Duration,

    /// Число неудачных входов подряд до блокировки учётной записи.
    pub max_login_attempts: u32,
    /// Длительность блокировки после исчерпания попыток.
    pub lockout_duration: Duration,
    /// Учитывать регистр в именах пользователей.
    pub case_sensitive_usernames: bool,
    /// Вставлять ли вызывающей стороне задержку после неудачного входа.
    /// Ядро само не спит — флаг только транслируется наружу.
    pub failed_login_delay: bool,

    /// Абсолютное время жизни сессии.
    pub session_timeout: Duration,
    /// Таймаут простоя сессии.
    pub idle_timeout: Duration,
    /// Максимум одновременных сессий одного пользователя.
    pub max_concurrent_sessions: usize,

    /// Требовать второй фактор для всех пользователей.
    pub require_mfa: bool,

    /// Алгоритм хеширования для новых паролей.
    pub default_hash_algorithm: HashAlgorithm,
    /// Стоимость хеширования: t_cost для Argon2id, cost (4..=31) для bcrypt.
    pub hash_rounds: u32,

    /// Вести ли журнал аудита.
    pub audit_enabled: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для AuthConfig
////////////////////////////////////////////////////////////////////////////////

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_length: 8,
            max_password_length: 256,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_symbols: false,
            password_history: 5,
            password_max_age: Duration::from_secs(90 * 24 * 3600),

            max_login_attempts: 5,
            lockout_duration: Duration::from_secs(900),
            case_sensitive_usernames: true,
            failed_login_delay: true,

            session_timeout: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(1800),
            max_concurrent_sessions: 5,

            require_mfa: false,

            default_hash_algorithm: HashAlgorithm::Argon2id,
            hash_rounds: 3,

            audit_enabled: true,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет значения по умолчанию, на которые завязаны
    /// машина блокировки и тайминги сессий.
    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();

        assert_eq!(config.max_login_attempts, 5);
        assert_eq!(config.lockout_duration, Duration::from_secs(900));
        assert_eq!(config.session_timeout, Duration::from_secs(3600));
        assert_eq!(config.idle_timeout, Duration::from_secs(1800));
        assert_eq!(config.max_concurrent_sessions, 5);
        assert_eq!(config.default_hash_algorithm, HashAlgorithm::Argon2id);
        assert!(config.audit_enabled);
        assert!(!config.require_mfa);
    }

    /// Тест проверяет, что конфигурация настраивается простой мутацией полей.
    #[test]
    fn test_config_mutation() {
        let mut config = AuthConfig::default();
        config.max_login_attempts = 3;
        config.require_symbols = true;
        config.default_hash_algorithm = HashAlgorithm::Bcrypt;
        config.hash_rounds = 4;

        assert_eq!(config.max_login_attempts, 3);
        assert!(config.require_symbols);
        assert_eq!(config.default_hash_algorithm, HashAlgorithm::Bcrypt);
    }
}
