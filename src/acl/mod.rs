use std::{collections::HashMap, sync::RwLock, time::SystemTime};

use bitflags::bitflags;
use tokio::time::Instant;

use crate::{
    credential::UserAccount,
    error::{AuthError, AuthResult},
};

/// Предел числа ресурсов со списками доступа.
pub const MAX_ACLS: usize = 512;

bitflags! {
    /// Маска действий в записи ACL. Бит соответствует встроенному
    /// праву с идентификатором `бит + 1`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AclPermissions: u32 {
        const LOGIN           = 1 << 0;
        const CHANGE_PASSWORD = 1 << 1;
        const READ            = 1 << 2;
        const WRITE           = 1 << 3;
        const EXECUTE         = 1 << 4;
    }
}

/// Запись списка доступа.
#[derive(Debug, Clone)]
pub struct AclEntry {
    /// Пользователь или группа, к которым применяется запись.
    pub subject_id: u32,
    pub is_group: bool,
    pub permissions: AclPermissions,
    /// `true` — разрешить, `false` — запретить.
    pub allow: bool,
    /// Просроченная запись не применяется.
    pub expires_at: Option<Instant>,
}

/// Список доступа ресурса. Порядок записей значим: побеждает
/// первая применимая.
#[derive(Debug, Clone)]
pub struct Acl {
    pub resource: String,
    pub entries: Vec<AclEntry>,
    pub modified_at: SystemTime,
}

/// Движок списков доступа по ресурсам. Отказы в аудит пишет
/// вызывающая сторона, у которой есть контекст действия.
pub struct AclEngine {
    acls: RwLock<HashMap<String, Acl>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl AclPermissions {
    /// Маска для встроенного права по его идентификатору.
    pub fn from_permission_id(permission_id: u32) -> Option<Self> {
        if permission_id == 0 || permission_id > 32 {
            return None;
        }
        Self::from_bits(1 << (permission_id - 1))
    }
}

impl AclEngine {
    pub(crate) fn new() -> Self {
        Self {
            acls: RwLock::new(HashMap::new()),
        }
    }

    /// Устанавливает список доступа ресурса целиком, затирая прежний.
    pub fn set_acl(&self, resource: &str, entries: Vec<AclEntry>) -> AuthResult<()> {
        if resource.is_empty() {
            return Err(AuthError::Invalid);
        }
        let mut acls = self.acls.write().unwrap();
        if !acls.contains_key(resource) && acls.len() >= MAX_ACLS {
            return Err(AuthError::Memory);
        }
        acls.insert(
            resource.to_string(),
            Acl {
                resource: resource.to_string(),
                entries,
                modified_at: SystemTime::now(),
            },
        );
        Ok(())
    }

    pub fn get_acl(&self, resource: &str) -> AuthResult<Acl> {
        let acls = self.acls.read().unwrap();
        acls.get(resource).cloned().ok_or(AuthError::NotFound)
    }

    pub fn remove_acl(&self, resource: &str) -> AuthResult<()> {
        let mut acls = self.acls.write().unwrap();
        acls.remove(resource).map(|_| ()).ok_or(AuthError::NotFound)
    }

    pub fn acl_count(&self) -> usize {
        self.acls.read().unwrap().len()
    }

    /// Вердикт списка доступа для пользователя и действия.
    ///
    /// Записи просматриваются в порядке установки; первая применимая
    /// (по субъекту и маске, не просроченная) решает. `None` — ни
    /// список, ни применимая запись не найдены.
    pub fn evaluate(
        &self,
        user: &UserAccount,
        resource: &str,
        needed: AclPermissions,
    ) -> Option<bool> {
        let now = Instant::now();
        let acls = self.acls.read().unwrap();
        let acl = acls.get(resource)?;

        for entry in &acl.entries {
            if let Some(expires_at) = entry.expires_at {
                if now >= expires_at {
                    continue;
                }
            }
            let applies = if entry.is_group {
                user.in_group(entry.subject_id)
            } else {
                entry.subject_id == user.user_id
            };
            if applies && entry.permissions.contains(needed) {
                return Some(entry.allow);
            }
        }
        None
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::HashAlgorithm,
        credential::{AccountStatus, MfaState},
        rbac::{PERM_EXECUTE_FILE, PERM_READ_FILE, PERM_WRITE_FILE},
    };

    fn test_engine() -> AclEngine {
        AclEngine::new()
    }

    fn account(user_id: u32, groups: Vec<u32>) -> UserAccount {
        UserAccount {
            user_id,
            username: format!("user{user_id}"),
            full_name: String::new(),
            password_hash: vec![0; 32],
            salt: [0; 16],
            hash_algorithm: HashAlgorithm::Bcrypt,
            hash_rounds: 4,
            password_history: Vec::new(),
            status: AccountStatus::Active,
            login_attempts: 0,
            lockout_time: None,
            created_at: SystemTime::now(),
            last_login: None,
            last_password_change: SystemTime::now(),
            mfa: MfaState::default(),
            roles: Vec::new(),
            groups,
        }
    }

    fn entry(subject_id: u32, is_group: bool, permissions: AclPermissions, allow: bool) -> AclEntry {
        AclEntry {
            subject_id,
            is_group,
            permissions,
            allow,
            expires_at: None,
        }
    }

    /// Биты маски согласованы с идентификаторами встроенных прав.
    #[test]
    fn test_permission_bit_mapping() {
        assert_eq!(
            AclPermissions::from_permission_id(PERM_READ_FILE),
            Some(AclPermissions::READ)
        );
        assert_eq!(
            AclPermissions::from_permission_id(PERM_WRITE_FILE),
            Some(AclPermissions::WRITE)
        );
        assert_eq!(
            AclPermissions::from_permission_id(PERM_EXECUTE_FILE),
            Some(AclPermissions::EXECUTE)
        );
        assert_eq!(AclPermissions::from_permission_id(0), None);
        assert_eq!(AclPermissions::from_permission_id(33), None);
    }

    #[test]
    fn test_set_and_get_acl() {
        let engine = test_engine();

        assert_eq!(engine.set_acl("", Vec::new()), Err(AuthError::Invalid));
        assert!(matches!(engine.get_acl("/data"), Err(AuthError::NotFound)));

        engine
            .set_acl("/data", vec![entry(1, false, AclPermissions::READ, true)])
            .unwrap();
        let acl = engine.get_acl("/data").unwrap();
        assert_eq!(acl.resource, "/data");
        assert_eq!(acl.entries.len(), 1);

        // Повторная установка затирает список целиком.
        engine.set_acl("/data", Vec::new()).unwrap();
        assert!(engine.get_acl("/data").unwrap().entries.is_empty());
        assert_eq!(engine.acl_count(), 1);
    }

    /// Побеждает первая применимая запись, независимо от вердикта
    /// последующих.
    #[test]
    fn test_first_match_wins() {
        let engine = test_engine();
        engine
            .set_acl(
                "/data",
                vec![
                    entry(1, false, AclPermissions::READ, false),
                    entry(1, false, AclPermissions::READ, true),
                ],
            )
            .unwrap();

        let user = account(1, Vec::new());
        assert_eq!(engine.evaluate(&user, "/data", AclPermissions::READ), Some(false));
    }

    #[test]
    fn test_group_entries() {
        let engine = test_engine();
        engine
            .set_acl(
                "/share",
                vec![entry(10, true, AclPermissions::READ | AclPermissions::WRITE, true)],
            )
            .unwrap();

        let member = account(1, vec![10]);
        let outsider = account(2, Vec::new());

        assert_eq!(
            engine.evaluate(&member, "/share", AclPermissions::WRITE),
            Some(true)
        );
        assert_eq!(engine.evaluate(&outsider, "/share", AclPermissions::WRITE), None);
    }

    /// Запись, чья маска не покрывает действие, пропускается,
    /// и просмотр продолжается.
    #[test]
    fn test_mask_mismatch_skips_entry() {
        let engine = test_engine();
        engine
            .set_acl(
                "/bin/tool",
                vec![
                    entry(1, false, AclPermissions::READ, false),
                    entry(1, false, AclPermissions::EXECUTE, true),
                ],
            )
            .unwrap();

        let user = account(1, Vec::new());
        assert_eq!(
            engine.evaluate(&user, "/bin/tool", AclPermissions::EXECUTE),
            Some(true)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_skipped() {
        let engine = test_engine();
        let expiring = AclEntry {
            subject_id: 1,
            is_group: false,
            permissions: AclPermissions::READ,
            allow: true,
            expires_at: Some(Instant::now() + Duration::from_secs(60)),
        };
        engine.set_acl("/tmp/grant", vec![expiring]).unwrap();

        let user = account(1, Vec::new());
        assert_eq!(
            engine.evaluate(&user, "/tmp/grant", AclPermissions::READ),
            Some(true)
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(engine.evaluate(&user, "/tmp/grant", AclPermissions::READ), None);
    }

    #[test]
    fn test_unknown_resource() {
        let engine = test_engine();
        let user = account(1, Vec::new());
        assert_eq!(engine.evaluate(&user, "/nowhere", AclPermissions::READ), None);
    }
}
