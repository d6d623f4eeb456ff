use std::time::SystemTime;

use serde::Serialize;
use tokio::time::Instant;

use crate::{config::HashAlgorithm, credential::password::SALT_LENGTH};

/// Максимум ролей у одного пользователя.
pub const MAX_ROLES_PER_USER: usize = 16;

/// Максимум групп у одного пользователя.
pub const MAX_GROUPS_PER_USER: usize = 32;

/// Длина секрета TOTP в байтах.
pub const MFA_SECRET_LENGTH: usize = 20;

/// Число резервных кодов, выдаваемых при включении MFA.
pub const BACKUP_CODE_COUNT: usize = 10;

/// Статус учётной записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccountStatus {
    Active,
    Locked,
    Disabled,
    Expired,
    Pending,
}

/// Резервный код восстановления. Одноразовый.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupCode {
    pub code: String,
    pub used: bool,
}

/// Состояние второго фактора пользователя.
#[derive(Debug, Clone, Default)]
pub struct MfaState {
    /// Второй фактор включён (секрет подтверждён кодом при настройке).
    pub enabled: bool,
    /// Секрет TOTP. Присутствует и до включения, пока настройка
    /// не подтверждена.
    pub secret: Option<[u8; MFA_SECRET_LENGTH]>,
    pub backup_codes: Vec<BackupCode>,
    /// Последнее 30-секундное окно, в котором код был принят.
    /// Защита от повтора в том же окне.
    pub last_used_window: Option<u64>,
}

/// Запись истории паролей: достаточно для повторной проверки
/// кандидата под старой солью.
#[derive(Debug, Clone)]
pub struct PasswordRecord {
    pub salt: [u8; SALT_LENGTH],
    pub hash: Vec<u8>,
    pub algorithm: HashAlgorithm,
    pub rounds: u32,
}

/// Учётная запись пользователя.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub user_id: u32,
    pub username: String,
    pub full_name: String,

    pub password_hash: Vec<u8>,
    pub salt: [u8; SALT_LENGTH],
    pub hash_algorithm: HashAlgorithm,
    pub hash_rounds: u32,
    pub password_history: Vec<PasswordRecord>,

    pub status: AccountStatus,
    /// Счётчик неудачных входов подряд. Сбрасывается успешным входом.
    pub login_attempts: u32,
    /// Момент блокировки; учётная запись разблокируется лениво,
    /// когда пройдёт срок блокировки.
    pub lockout_time: Option<Instant>,

    pub created_at: SystemTime,
    pub last_login: Option<SystemTime>,
    pub last_password_change: SystemTime,

    pub mfa: MfaState,

    /// Идентификаторы назначенных ролей в порядке назначения.
    pub roles: Vec<u32>,
    /// Идентификаторы групп в порядке добавления.
    pub groups: Vec<u32>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl UserAccount {
    pub fn has_role(&self, role_id: u32) -> bool {
        self.roles.contains(&role_id)
    }

    pub fn in_group(&self, group_id: u32) -> bool {
        self.groups.contains(&group_id)
    }

    /// Остаток неиспользованных резервных кодов.
    pub fn backup_codes_remaining(&self) -> usize {
        self.mfa.backup_codes.iter().filter(|c| !c.used).count()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_account() -> UserAccount {
        UserAccount {
            user_id: 1,
            username: "alice".into(),
            full_name: "Alice".into(),
            password_hash: vec![0; 32],
            salt: [0; SALT_LENGTH],
            hash_algorithm: HashAlgorithm::Argon2id,
            hash_rounds: 1,
            password_history: Vec::new(),
            status: AccountStatus::Active,
            login_attempts: 0,
            lockout_time: None,
            created_at: SystemTime::now(),
            last_login: None,
            last_password_change: SystemTime::now(),
            mfa: MfaState::default(),
            roles: vec![2, 7],
            groups: vec![10],
        }
    }

    #[test]
    fn test_role_and_group_membership() {
        let account = blank_account();
        assert!(account.has_role(2));
        assert!(!account.has_role(3));
        assert!(account.in_group(10));
        assert!(!account.in_group(11));
    }

    #[test]
    fn test_backup_codes_remaining() {
        let mut account = blank_account();
        account.mfa.backup_codes = vec![
            BackupCode {
                code: "00000001".into(),
                used: false,
            },
            BackupCode {
                code: "00000002".into(),
                used: true,
            },
        ];
        assert_eq!(account.backup_codes_remaining(), 1);
    }
}
