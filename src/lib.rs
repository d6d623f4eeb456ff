//! Sentra — ядро аутентификации и авторизации.
//!
//! Учётные записи с парольной политикой и машиной блокировки, сессии
//! с абсолютным и простойным таймаутами, ролевая модель, списки
//! доступа по ресурсам и второй фактор на TOTP с резервными кодами.
//! Всё состояние в памяти; персистентность — забота обвязки.

/// Списки доступа по ресурсам.
pub mod acl;
/// Журнал аудита: события, приёмники, конвейер.
pub mod audit;
/// Конфигурация ядра.
pub mod config;
/// Фасад ядра.
pub mod core;
/// Учётные записи, пароли, машина блокировки.
pub mod credential;
/// Таксономия ошибок.
pub mod error;
/// Инициализация логирования.
pub mod logging;
/// Второй фактор: TOTP и резервные коды.
pub mod mfa;
/// Ролевая модель: роли, права, эффективные права.
pub mod rbac;
/// Сессии и их жизненный цикл.
pub mod session;

pub use acl::{Acl, AclEngine, AclEntry, AclPermissions, MAX_ACLS};
pub use audit::{AuditEvent, AuditEventKind, AuditSink, MemorySink, NullSink, TracingSink};
pub use config::{AuthConfig, HashAlgorithm};
pub use core::{AuthCore, AuthStats, BOOTSTRAP_ADMIN};
pub use credential::{
    AccountStatus, BackupCode, CredentialStore, MfaState, UserAccount, BACKUP_CODE_COUNT,
    MAX_GROUPS_PER_USER, MAX_ROLES_PER_USER, MAX_USERS, MFA_SECRET_LENGTH,
};
pub use error::{AuthError, AuthResult};
pub use logging::init_logging;
pub use mfa::{MfaEngine, MfaStatus, TOTP_DIGITS, TOTP_PERIOD, TOTP_TOLERANCE};
pub use rbac::{
    Permission, PermissionScope, PermissionSet, RbacEngine, Role, MAX_PERMISSIONS, MAX_ROLES,
    PERM_ADMIN_SYSTEM, PERM_CHANGE_PASSWORD, PERM_CREATE_USER, PERM_DELETE_USER,
    PERM_EXECUTE_FILE, PERM_LOGIN, PERM_MODIFY_PERMISSIONS, PERM_MODIFY_ROLES, PERM_MODIFY_USER,
    PERM_READ_FILE, PERM_VIEW_LOGS, PERM_WRITE_FILE, ROLE_ADMIN, ROLE_AUDITOR, ROLE_GUEST,
    ROLE_OPERATOR, ROLE_USER,
};
pub use session::{
    AuthFactors, Session, SessionId, SessionManager, SessionState, MAX_SESSIONS,
    PRIVILEGE_ADMIN, PRIVILEGE_GUEST, PRIVILEGE_USER, SESSION_ID_BYTES,
};
