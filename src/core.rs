use std::sync::Arc;

use serde::Serialize;

use crate::{
    acl::{AclEngine, AclEntry, AclPermissions},
    audit::{AuditEventKind, AuditPipe, AuditSink, NullSink, TracingSink},
    config::AuthConfig,
    credential::{BackupCode, CredentialStore, UserAccount},
    error::{AuthError, AuthResult},
    mfa::{MfaEngine, MfaStatus},
    rbac::{
        PermissionSet, RbacEngine, Role, PERM_ADMIN_SYSTEM, PERM_CREATE_USER, PERM_DELETE_USER,
        PERM_EXECUTE_FILE, PERM_MODIFY_PERMISSIONS, PERM_MODIFY_ROLES, PERM_READ_FILE,
        PERM_WRITE_FILE, ROLE_ADMIN,
    },
    session::{Session, SessionId, SessionManager},
};

/// Имя стартовой административной учётной записи.
pub const BOOTSTRAP_ADMIN: &str = "admin";

/// Стартовый пароль администратора. Подлежит немедленной смене.
const BOOTSTRAP_ADMIN_PASSWORD: &str = "admin";

/// Сводные счётчики ядра.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthStats {
    pub total_users: usize,
    pub active_users: usize,
    pub locked_users: usize,
    pub active_sessions: usize,
    pub roles: usize,
    pub permissions: usize,
    pub acls: usize,
}

/// Ядро аутентификации и авторизации: фасад над хранилищем учётных
/// данных, менеджером сессий и движками RBAC, ACL и MFA.
///
/// Движки разделяют один конвейер аудита; сквозные операции вроде
/// входа и проверки доступа живут здесь.
pub struct AuthCore {
    config: Arc<AuthConfig>,
    audit: Arc<AuditPipe>,
    credentials: Arc<CredentialStore>,
    sessions: SessionManager,
    rbac: RbacEngine,
    acl: AclEngine,
    mfa: MfaEngine,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl AuthCore {
    /// Создаёт ядро с аудитом в `tracing`.
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        let sink: Arc<dyn AuditSink> = if config.audit_enabled {
            Arc::new(TracingSink)
        } else {
            Arc::new(NullSink)
        };
        Self::with_sink(config, sink)
    }

    /// Создаёт ядро с внешним приёмником аудита.
    pub fn with_sink(config: AuthConfig, sink: Arc<dyn AuditSink>) -> AuthResult<Self> {
        let audit_enabled = config.audit_enabled;
        let config = Arc::new(config);
        let audit = Arc::new(AuditPipe::new(audit_enabled, sink));

        let credentials = Arc::new(CredentialStore::new(config.clone(), audit.clone()));
        let core = Self {
            sessions: SessionManager::new(config.clone(), audit.clone()),
            rbac: RbacEngine::new(audit.clone()),
            acl: AclEngine::new(),
            mfa: MfaEngine::new(credentials.clone(), audit.clone()),
            credentials,
            config,
            audit,
        };

        // Стартовый администратор со встроенной ролью.
        let admin_id = core.credentials.bootstrap_user(
            BOOTSTRAP_ADMIN,
            BOOTSTRAP_ADMIN_PASSWORD,
            "System Administrator",
        )?;
        core.credentials.assign_role(admin_id, ROLE_ADMIN)?;

        tracing::info!(admin_id, "auth core initialized");
        Ok(core)
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    ////////////////////////////////////////////////////////////////////////////
    // Учётные записи
    ////////////////////////////////////////////////////////////////////////////

    pub fn create_user(&self, username: &str, password: &str, full_name: &str) -> AuthResult<u32> {
        self.credentials.create_user(username, password, full_name)
    }

    pub fn get_user(&self, user_id: u32) -> AuthResult<UserAccount> {
        self.credentials.get(user_id)
    }

    pub fn get_user_by_name(&self, username: &str) -> AuthResult<UserAccount> {
        self.credentials.get_by_name(username)
    }

    /// Удаляет учётную запись и отзывает все её сессии.
    pub fn delete_user(&self, user_id: u32) -> AuthResult<()> {
        self.credentials.delete_user(user_id)?;
        self.sessions.revoke_all(user_id);
        Ok(())
    }

    pub fn list_users(&self) -> Vec<UserAccount> {
        self.credentials.list_users()
    }

    pub fn verify_password(&self, user_id: u32, password: &str) -> AuthResult<()> {
        self.credentials.verify_password(user_id, password)
    }

    pub fn change_password(&self, user_id: u32, old: &str, new: &str) -> AuthResult<()> {
        self.credentials.change_password(user_id, old, new)
    }

    pub fn reset_password(&self, user_id: u32, new: &str) -> AuthResult<()> {
        self.credentials.reset_password(user_id, new)
    }

    pub fn lock_account(&self, user_id: u32) -> AuthResult<()> {
        self.credentials.lock_account(user_id)?;
        self.sessions.revoke_all(user_id);
        Ok(())
    }

    pub fn unlock_account(&self, user_id: u32) -> AuthResult<()> {
        self.credentials.unlock_account(user_id)
    }

    pub fn disable_account(&self, user_id: u32) -> AuthResult<()> {
        self.credentials.disable_account(user_id)?;
        self.sessions.revoke_all(user_id);
        Ok(())
    }

    pub fn enable_account(&self, user_id: u32) -> AuthResult<()> {
        self.credentials.enable_account(user_id)
    }

    pub fn add_to_group(&self, user_id: u32, group_id: u32) -> AuthResult<()> {
        self.credentials.add_to_group(user_id, group_id)
    }

    pub fn remove_from_group(&self, user_id: u32, group_id: u32) -> AuthResult<()> {
        self.credentials.remove_from_group(user_id, group_id)
    }

    ////////////////////////////////////////////////////////////////////////////
    // Сессии
    ////////////////////////////////////////////////////////////////////////////

    /// Вход по имени и паролю: проверка учётных данных через машину
    /// блокировки, затем создание сессии. При включённом втором
    /// факторе сессия создаётся неподтверждённой.
    pub fn login(
        &self,
        username: &str,
        password: &str,
        client_ip: Option<&str>,
    ) -> AuthResult<Session> {
        let account = match self.credentials.get_by_name(username) {
            Ok(account) => account,
            Err(e) => {
                self.audit.emit(
                    AuditEventKind::LoginFailure,
                    0,
                    username,
                    client_ip.unwrap_or(""),
                    "unknown user",
                    false,
                );
                return Err(e);
            }
        };

        self.credentials.verify_password(account.user_id, password)?;

        // Свежий снимок: verify_password обновил счётчики и отметки.
        let account = self.credentials.get(account.user_id)?;
        let session = self.sessions.create_session(&account, client_ip)?;

        self.audit.emit(
            AuditEventKind::LoginSuccess,
            account.user_id,
            &account.username,
            client_ip.unwrap_or(""),
            "user logged in",
            true,
        );
        Ok(session)
    }

    pub fn verify_session(&self, session_id: &SessionId) -> AuthResult<Session> {
        self.sessions.verify_session(session_id)
    }

    pub fn refresh_session(&self, session_id: &SessionId) -> AuthResult<Session> {
        self.sessions.refresh_session(session_id)
    }

    pub fn logout(&self, session_id: &SessionId) -> AuthResult<()> {
        self.sessions.logout(session_id)
    }

    pub fn revoke_all_sessions(&self, user_id: u32) -> usize {
        self.sessions.revoke_all(user_id)
    }

    pub fn active_sessions(&self, user_id: u32) -> Vec<Session> {
        self.sessions.active_sessions(user_id)
    }

    pub fn sweep_sessions(&self) -> usize {
        self.sessions.sweep_expired()
    }

    /// Подтверждение второго фактора действующей сессии одноразовым
    /// кодом её пользователя.
    pub fn complete_mfa(&self, session_id: &SessionId, code: &str) -> AuthResult<Session> {
        let session = self.sessions.verify_session(session_id)?;
        self.mfa.verify_code(session.user_id, code)?;
        self.sessions.mark_mfa_verified(session_id)?;
        self.sessions.verify_session(session_id)
    }

    ////////////////////////////////////////////////////////////////////////////
    // Роли и права
    ////////////////////////////////////////////////////////////////////////////

    pub fn create_role(&self, name: &str, description: &str) -> AuthResult<u32> {
        self.rbac.create_role(name, description)
    }

    pub fn create_permission(
        &self,
        name: &str,
        description: &str,
        scope: crate::rbac::PermissionScope,
    ) -> AuthResult<u32> {
        self.rbac.create_permission(name, description, scope)
    }

    pub fn get_role(&self, role_id: u32) -> AuthResult<Role> {
        self.rbac.get_role(role_id)
    }

    pub fn list_roles(&self) -> Vec<Role> {
        self.rbac.list_roles()
    }

    pub fn list_permissions(&self) -> Vec<crate::rbac::Permission> {
        self.rbac.list_permissions()
    }

    pub fn role_permissions(&self, role_id: u32) -> AuthResult<Vec<u32>> {
        self.rbac.role_permissions(role_id)
    }

    /// Назначает роль пользователю. Существование роли проверяется
    /// до мутации, дубликат и ёмкость — атомарно в хранилище.
    pub fn assign_role(&self, user_id: u32, role_id: u32) -> AuthResult<()> {
        let role = self.rbac.get_role(role_id)?;
        self.credentials.assign_role(user_id, role_id)?;

        let username = self
            .credentials
            .with_user(user_id, |u| u.username.clone())
            .unwrap_or_default();
        self.audit.emit(
            AuditEventKind::RoleAssigned,
            user_id,
            &username,
            "",
            &format!("role '{}' assigned", role.name),
            true,
        );
        Ok(())
    }

    pub fn revoke_role(&self, user_id: u32, role_id: u32) -> AuthResult<()> {
        self.credentials.revoke_role(user_id, role_id)?;
        let username = self
            .credentials
            .with_user(user_id, |u| u.username.clone())
            .unwrap_or_default();
        self.audit.emit(
            AuditEventKind::RoleRevoked,
            user_id,
            &username,
            "",
            &format!("role {role_id} revoked"),
            true,
        );
        Ok(())
    }

    pub fn add_permission_to_role(&self, role_id: u32, permission_id: u32) -> AuthResult<()> {
        self.rbac.add_permission_to_role(role_id, permission_id)
    }

    pub fn remove_permission_from_role(&self, role_id: u32, permission_id: u32) -> AuthResult<()> {
        self.rbac.remove_permission_from_role(role_id, permission_id)
    }

    pub fn check_role(&self, user_id: u32, role_id: u32) -> AuthResult<bool> {
        let account = self.credentials.get(user_id)?;
        Ok(self.rbac.check_role(&account, role_id))
    }

    pub fn check_permission(&self, user_id: u32, permission_id: u32) -> AuthResult<()> {
        let account = self.credentials.get(user_id)?;
        self.rbac.check_permission(&account, permission_id)
    }

    pub fn effective_permissions(&self, user_id: u32) -> AuthResult<PermissionSet> {
        let account = self.credentials.get(user_id)?;
        Ok(self.rbac.effective_permissions(&account))
    }

    ////////////////////////////////////////////////////////////////////////////
    // Доступ к ресурсам
    ////////////////////////////////////////////////////////////////////////////

    pub fn set_acl(&self, resource: &str, entries: Vec<AclEntry>) -> AuthResult<()> {
        self.acl.set_acl(resource, entries)
    }

    pub fn get_acl(&self, resource: &str) -> AuthResult<crate::acl::Acl> {
        self.acl.get_acl(resource)
    }

    pub fn remove_acl(&self, resource: &str) -> AuthResult<()> {
        self.acl.remove_acl(resource)
    }

    /// Проверка доступа к ресурсу для действий `read`, `write`,
    /// `execute`.
    ///
    /// Ролевое право решает первым: его обладателя список доступа
    /// ограничить не может, в том числе явным запретом. Только при
    /// отсутствии ролевого права слово получает ACL ресурса; нет
    /// применимой записи — отказ.
    pub fn check_access(&self, user_id: u32, resource: &str, action: &str) -> AuthResult<()> {
        let required = match action {
            "read" => PERM_READ_FILE,
            "write" => PERM_WRITE_FILE,
            "execute" => PERM_EXECUTE_FILE,
            _ => return Err(AuthError::Invalid),
        };
        let account = self.credentials.get(user_id)?;

        if self.rbac.check_permission(&account, required).is_ok() {
            return Ok(());
        }

        let mask = AclPermissions::from_permission_id(required).ok_or(AuthError::Invalid)?;
        if let Some(allow) = self.acl.evaluate(&account, resource, mask) {
            if allow {
                return Ok(());
            }
        }

        self.audit.emit(
            AuditEventKind::PermissionDenied,
            user_id,
            &account.username,
            "",
            &format!("access denied to resource: {resource}, action: {action}"),
            false,
        );
        Err(AuthError::AccessDenied)
    }

    ////////////////////////////////////////////////////////////////////////////
    // Второй фактор
    ////////////////////////////////////////////////////////////////////////////

    pub fn mfa_generate_secret(&self, user_id: u32) -> AuthResult<String> {
        self.mfa.generate_secret(user_id)
    }

    pub fn mfa_provisioning_url(&self, user_id: u32, issuer: &str) -> AuthResult<String> {
        self.mfa.provisioning_url(user_id, issuer)
    }

    pub fn mfa_verify_setup(&self, user_id: u32, code: &str) -> AuthResult<Vec<String>> {
        self.mfa.verify_setup(user_id, code)
    }

    pub fn mfa_verify_setup_at(
        &self,
        user_id: u32,
        code: &str,
        now_unix: u64,
    ) -> AuthResult<Vec<String>> {
        self.mfa.verify_setup_at(user_id, code, now_unix)
    }

    pub fn mfa_verify_code(&self, user_id: u32, code: &str) -> AuthResult<()> {
        self.mfa.verify_code(user_id, code)
    }

    pub fn mfa_verify_code_at(&self, user_id: u32, code: &str, now_unix: u64) -> AuthResult<()> {
        self.mfa.verify_code_at(user_id, code, now_unix)
    }

    pub fn mfa_verify_backup_code(&self, user_id: u32, code: &str) -> AuthResult<()> {
        self.mfa.verify_backup_code(user_id, code)
    }

    pub fn mfa_backup_codes(&self, user_id: u32) -> AuthResult<Vec<BackupCode>> {
        self.mfa.backup_codes(user_id)
    }

    pub fn mfa_disable(&self, user_id: u32) -> AuthResult<()> {
        self.mfa.disable(user_id)
    }

    pub fn mfa_status(&self, user_id: u32) -> AuthResult<MfaStatus> {
        self.mfa.status(user_id)
    }

    /// Обязателен ли второй фактор для пользователя: глобальная
    /// политика, административная роль или высокопривилегированные
    /// права.
    pub fn mfa_required(&self, user_id: u32) -> AuthResult<bool> {
        if self.config.require_mfa {
            return Ok(true);
        }
        let account = self.credentials.get(user_id)?;
        if account.has_role(ROLE_ADMIN) {
            return Ok(true);
        }
        let effective = self.rbac.effective_permissions(&account);
        Ok([
            PERM_CREATE_USER,
            PERM_DELETE_USER,
            PERM_ADMIN_SYSTEM,
            PERM_MODIFY_ROLES,
            PERM_MODIFY_PERMISSIONS,
        ]
        .iter()
        .any(|&p| effective.contains(p)))
    }

    ////////////////////////////////////////////////////////////////////////////
    // Статистика
    ////////////////////////////////////////////////////////////////////////////

    pub fn statistics(&self) -> AuthStats {
        let (total_users, active_users, locked_users) = self.credentials.status_counts();
        AuthStats {
            total_users,
            active_users,
            locked_users,
            active_sessions: self.sessions.active_count(),
            roles: self.rbac.role_count(),
            permissions: self.rbac.permission_count(),
            acls: self.acl.acl_count(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
