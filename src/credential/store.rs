use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::SystemTime,
};

use tokio::time::Instant;

use crate::{
    audit::{AuditEventKind, AuditPipe},
    config::AuthConfig,
    credential::{
        account::{AccountStatus, MfaState, PasswordRecord, UserAccount, MAX_GROUPS_PER_USER,
                  MAX_ROLES_PER_USER},
        password,
    },
    error::{AuthError, AuthResult},
};

/// Предел числа учётных записей.
pub const MAX_USERS: usize = 4096;

/// Хранилище учётных данных: таблица пользователей с индексами по
/// идентификатору и имени, парольные операции и машина блокировки.
pub struct CredentialStore {
    config: Arc<AuthConfig>,
    audit: Arc<AuditPipe>,
    users: RwLock<UserTable>,
}

struct UserTable {
    by_id: HashMap<u32, UserAccount>,
    /// Имя (нормализованное по регистру) -> идентификатор.
    by_name: HashMap<String, u32>,
    next_user_id: u32,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl CredentialStore {
    pub(crate) fn new(config: Arc<AuthConfig>, audit: Arc<AuditPipe>) -> Self {
        Self {
            config,
            audit,
            users: RwLock::new(UserTable {
                by_id: HashMap::new(),
                by_name: HashMap::new(),
                next_user_id: 1,
            }),
        }
    }

    /// Создаёт пользователя. Имя проверяется синтаксически, пароль —
    /// парольной политикой. Возвращает присвоенный идентификатор.
    pub fn create_user(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> AuthResult<u32> {
        if !password::validate_username(username) {
            return Err(AuthError::Invalid);
        }
        password::check_password_policy(password, &self.config)?;
        let user_id = self.insert_user(username, password, full_name)?;

        self.audit.emit(
            AuditEventKind::UserCreated,
            user_id,
            username,
            "",
            "user account created",
            true,
        );
        Ok(user_id)
    }

    /// Создаёт стартовую учётную запись, минуя парольную политику.
    /// Используется только при инициализации ядра.
    pub(crate) fn bootstrap_user(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> AuthResult<u32> {
        if !password::validate_username(username) {
            return Err(AuthError::Invalid);
        }
        self.insert_user(username, password, full_name)
    }

    fn insert_user(&self, username: &str, password: &str, full_name: &str) -> AuthResult<u32> {
        let salt = password::generate_salt();
        let hash = password::hash_password(
            password,
            &salt,
            self.config.default_hash_algorithm,
            self.config.hash_rounds,
        )?;

        let mut table = self.users.write().unwrap();
        let key = self.name_key(username);
        if table.by_name.contains_key(&key) {
            return Err(AuthError::AlreadyExists);
        }
        if table.by_id.len() >= MAX_USERS {
            return Err(AuthError::Memory);
        }

        let user_id = table.next_user_id;
        table.next_user_id += 1;

        let now = SystemTime::now();
        let account = UserAccount {
            user_id,
            username: username.to_string(),
            full_name: full_name.to_string(),
            password_hash: hash,
            salt,
            hash_algorithm: self.config.default_hash_algorithm,
            hash_rounds: self.config.hash_rounds,
            password_history: Vec::new(),
            status: AccountStatus::Active,
            login_attempts: 0,
            lockout_time: None,
            created_at: now,
            last_login: None,
            last_password_change: now,
            mfa: MfaState::default(),
            roles: Vec::new(),
            groups: Vec::new(),
        };
        table.by_name.insert(key, user_id);
        table.by_id.insert(user_id, account);
        Ok(user_id)
    }

    pub fn get(&self, user_id: u32) -> AuthResult<UserAccount> {
        let table = self.users.read().unwrap();
        table.by_id.get(&user_id).cloned().ok_or(AuthError::NotFound)
    }

    pub fn get_by_name(&self, username: &str) -> AuthResult<UserAccount> {
        let table = self.users.read().unwrap();
        let user_id = table
            .by_name
            .get(&self.name_key(username))
            .ok_or(AuthError::NotFound)?;
        table.by_id.get(user_id).cloned().ok_or(AuthError::NotFound)
    }

    pub fn delete_user(&self, user_id: u32) -> AuthResult<()> {
        let username = {
            let mut table = self.users.write().unwrap();
            let account = table.by_id.remove(&user_id).ok_or(AuthError::NotFound)?;
            let key = self.name_key(&account.username);
            table.by_name.remove(&key);
            account.username
        };
        self.audit.emit(
            AuditEventKind::UserDeleted,
            user_id,
            &username,
            "",
            "user account deleted",
            true,
        );
        Ok(())
    }

    pub fn list_users(&self) -> Vec<UserAccount> {
        let table = self.users.read().unwrap();
        let mut users: Vec<UserAccount> = table.by_id.values().cloned().collect();
        users.sort_by_key(|u| u.user_id);
        users
    }

    pub fn user_count(&self) -> usize {
        self.users.read().unwrap().by_id.len()
    }

    /// Счётчики по статусам: (всего, активных, заблокированных).
    pub fn status_counts(&self) -> (usize, usize, usize) {
        let table = self.users.read().unwrap();
        let total = table.by_id.len();
        let active = table
            .by_id
            .values()
            .filter(|u| u.status == AccountStatus::Active)
            .count();
        let locked = table
            .by_id
            .values()
            .filter(|u| u.status == AccountStatus::Locked)
            .count();
        (total, active, locked)
    }

    /// Проверка пароля с машиной блокировки.
    ///
    /// Просроченная блокировка снимается лениво прямо здесь. Неудача
    /// увеличивает счётчик попыток; на пороге учётная запись
    /// блокируется, но сама пороговая попытка возвращает
    /// `InvalidPassword` — `AccountLocked` увидят только последующие.
    pub fn verify_password(&self, user_id: u32, password: &str) -> AuthResult<()> {
        let mut events: Vec<(AuditEventKind, String, String, bool)> = Vec::new();
        let result = self.verify_password_locked(user_id, password, &mut events);
        for (kind, username, details, success) in events {
            self.audit.emit(kind, user_id, &username, "", &details, success);
        }
        result
    }

    fn verify_password_locked(
        &self,
        user_id: u32,
        password: &str,
        events: &mut Vec<(AuditEventKind, String, String, bool)>,
    ) -> AuthResult<()> {
        let mut table = self.users.write().unwrap();
        let user = table.by_id.get_mut(&user_id).ok_or(AuthError::NotFound)?;
        let username = user.username.clone();
        let now = Instant::now();

        if user.status == AccountStatus::Locked {
            // Без отметки времени блокировка административная и
            // бессрочная: её снимает только unlock_account.
            let elapsed = user
                .lockout_time
                .map(|t| now >= t + self.config.lockout_duration)
                .unwrap_or(false);
            if elapsed {
                user.status = AccountStatus::Active;
                user.login_attempts = 0;
                user.lockout_time = None;
                events.push((
                    AuditEventKind::AccountUnlocked,
                    username.clone(),
                    "lockout period elapsed".into(),
                    true,
                ));
            } else {
                return Err(AuthError::AccountLocked);
            }
        }
        if user.status != AccountStatus::Active {
            return Err(AuthError::AccessDenied);
        }

        match password::verify_password_hash(
            password,
            &user.salt,
            &user.password_hash,
            user.hash_algorithm,
            user.hash_rounds,
        ) {
            Ok(()) => {
                user.login_attempts = 0;
                user.last_login = Some(SystemTime::now());
                Ok(())
            }
            Err(AuthError::InvalidPassword) => {
                user.login_attempts += 1;
                events.push((
                    AuditEventKind::LoginFailure,
                    username.clone(),
                    format!(
                        "password verification failed, attempt {} of {}",
                        user.login_attempts, self.config.max_login_attempts
                    ),
                    false,
                ));
                if user.login_attempts >= self.config.max_login_attempts {
                    user.status = AccountStatus::Locked;
                    user.lockout_time = Some(now);
                    events.push((
                        AuditEventKind::AccountLocked,
                        username,
                        "account locked due to failed login attempts".into(),
                        false,
                    ));
                }
                Err(AuthError::InvalidPassword)
            }
            Err(e) => Err(e),
        }
    }

    /// Смена пароля владельцем: требует действующий старый пароль,
    /// новый проходит политику и проверку на повтор по истории.
    pub fn change_password(&self, user_id: u32, old: &str, new: &str) -> AuthResult<()> {
        password::check_password_policy(new, &self.config)?;

        let username = {
            let mut table = self.users.write().unwrap();
            let user = table.by_id.get_mut(&user_id).ok_or(AuthError::NotFound)?;
            if user.status != AccountStatus::Active {
                return Err(AuthError::AccessDenied);
            }
            password::verify_password_hash(
                old,
                &user.salt,
                &user.password_hash,
                user.hash_algorithm,
                user.hash_rounds,
            )?;
            if Self::password_reused(user, new, self.config.password_history)? {
                return Err(AuthError::InvalidPassword);
            }
            Self::rotate_password(user, new, &self.config)?;
            user.username.clone()
        };

        self.audit.emit(
            AuditEventKind::PasswordChange,
            user_id,
            &username,
            "",
            "password changed",
            true,
        );
        Ok(())
    }

    /// Административный сброс пароля: старый пароль не требуется,
    /// политика и история применяются так же.
    pub fn reset_password(&self, user_id: u32, new: &str) -> AuthResult<()> {
        password::check_password_policy(new, &self.config)?;

        let username = {
            let mut table = self.users.write().unwrap();
            let user = table.by_id.get_mut(&user_id).ok_or(AuthError::NotFound)?;
            if Self::password_reused(user, new, self.config.password_history)? {
                return Err(AuthError::InvalidPassword);
            }
            Self::rotate_password(user, new, &self.config)?;
            user.login_attempts = 0;
            user.username.clone()
        };

        self.audit.emit(
            AuditEventKind::PasswordChange,
            user_id,
            &username,
            "",
            "password reset",
            true,
        );
        Ok(())
    }

    /// Административная блокировка. Бессрочная: по таймеру не
    /// снимается, в отличие от блокировки за неудачные попытки.
    pub fn lock_account(&self, user_id: u32) -> AuthResult<()> {
        let username = self.update_user(user_id, |user| {
            user.status = AccountStatus::Locked;
            user.lockout_time = None;
            Ok(user.username.clone())
        })?;
        self.audit.emit(
            AuditEventKind::AccountLocked,
            user_id,
            &username,
            "",
            "account locked by administrator",
            true,
        );
        Ok(())
    }

    pub fn unlock_account(&self, user_id: u32) -> AuthResult<()> {
        let username = self.update_user(user_id, |user| {
            user.status = AccountStatus::Active;
            user.login_attempts = 0;
            user.lockout_time = None;
            Ok(user.username.clone())
        })?;
        self.audit.emit(
            AuditEventKind::AccountUnlocked,
            user_id,
            &username,
            "",
            "account unlocked by administrator",
            true,
        );
        Ok(())
    }

    pub fn disable_account(&self, user_id: u32) -> AuthResult<()> {
        self.update_user(user_id, |user| {
            user.status = AccountStatus::Disabled;
            Ok(())
        })
    }

    pub fn enable_account(&self, user_id: u32) -> AuthResult<()> {
        self.update_user(user_id, |user| {
            user.status = AccountStatus::Active;
            user.login_attempts = 0;
            user.lockout_time = None;
            Ok(())
        })
    }

    /// Назначает роль. Существование роли проверяет вызывающая
    /// сторона; здесь атомарно контролируются дубликат и ёмкость.
    pub fn assign_role(&self, user_id: u32, role_id: u32) -> AuthResult<()> {
        self.update_user(user_id, |user| {
            if user.roles.contains(&role_id) {
                return Err(AuthError::AlreadyExists);
            }
            if user.roles.len() >= MAX_ROLES_PER_USER {
                return Err(AuthError::Memory);
            }
            user.roles.push(role_id);
            Ok(())
        })
    }

    pub fn revoke_role(&self, user_id: u32, role_id: u32) -> AuthResult<()> {
        self.update_user(user_id, |user| {
            let index = user
                .roles
                .iter()
                .position(|&r| r == role_id)
                .ok_or(AuthError::NotFound)?;
            user.roles.remove(index);
            Ok(())
        })
    }

    pub fn add_to_group(&self, user_id: u32, group_id: u32) -> AuthResult<()> {
        self.update_user(user_id, |user| {
            if user.groups.contains(&group_id) {
                return Err(AuthError::AlreadyExists);
            }
            if user.groups.len() >= MAX_GROUPS_PER_USER {
                return Err(AuthError::Memory);
            }
            user.groups.push(group_id);
            Ok(())
        })
    }

    pub fn remove_from_group(&self, user_id: u32, group_id: u32) -> AuthResult<()> {
        self.update_user(user_id, |user| {
            let index = user
                .groups
                .iter()
                .position(|&g| g == group_id)
                .ok_or(AuthError::NotFound)?;
            user.groups.remove(index);
            Ok(())
        })
    }

    ////////////////////////////////////////////////////////////////////////////
    // Внутренние методы и функции
    ////////////////////////////////////////////////////////////////////////////

    fn name_key(&self, username: &str) -> String {
        if self.config.case_sensitive_usernames {
            username.to_string()
        } else {
            username.to_lowercase()
        }
    }

    /// Кандидат совпадает с текущим паролем или с одним из последних
    /// `depth` паролей из истории?
    fn password_reused(user: &UserAccount, candidate: &str, depth: usize) -> AuthResult<bool> {
        let current = password::hash_password(
            candidate,
            &user.salt,
            user.hash_algorithm,
            user.hash_rounds,
        )?;
        if password::constant_time_eq(&current, &user.password_hash) {
            return Ok(true);
        }
        for record in user.password_history.iter().rev().take(depth) {
            let digest =
                password::hash_password(candidate, &record.salt, record.algorithm, record.rounds)?;
            if password::constant_time_eq(&digest, &record.hash) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn rotate_password(user: &mut UserAccount, new: &str, config: &AuthConfig) -> AuthResult<()> {
        let salt = password::generate_salt();
        let hash =
            password::hash_password(new, &salt, config.default_hash_algorithm, config.hash_rounds)?;

        user.password_history.push(PasswordRecord {
            salt: user.salt,
            hash: std::mem::take(&mut user.password_hash),
            algorithm: user.hash_algorithm,
            rounds: user.hash_rounds,
        });
        if user.password_history.len() > config.password_history {
            let excess = user.password_history.len() - config.password_history;
            user.password_history.drain(..excess);
        }

        user.salt = salt;
        user.password_hash = hash;
        user.hash_algorithm = config.default_hash_algorithm;
        user.hash_rounds = config.hash_rounds;
        user.last_password_change = SystemTime::now();
        Ok(())
    }

    pub(crate) fn with_user<T>(
        &self,
        user_id: u32,
        f: impl FnOnce(&UserAccount) -> T,
    ) -> AuthResult<T> {
        let table = self.users.read().unwrap();
        let user = table.by_id.get(&user_id).ok_or(AuthError::NotFound)?;
        Ok(f(user))
    }

    pub(crate) fn update_user<T>(
        &self,
        user_id: u32,
        f: impl FnOnce(&mut UserAccount) -> AuthResult<T>,
    ) -> AuthResult<T> {
        let mut table = self.users.write().unwrap();
        let user = table.by_id.get_mut(&user_id).ok_or(AuthError::NotFound)?;
        f(user)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
