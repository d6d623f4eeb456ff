use std::time::SystemTime;

use serde::Serialize;

/// Область действия права.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PermissionScope {
    System,
    User,
    Group,
    Resource,
}

/// Право. После создания запись не меняется.
#[derive(Debug, Clone, Serialize)]
pub struct Permission {
    pub permission_id: u32,
    pub name: String,
    pub description: String,
    pub scope: PermissionScope,
    /// Категория для группировки в интерфейсах; политикой не
    /// интерпретируется.
    pub category: u32,
    pub inheritable: bool,
    pub priority: u32,
}

/// Роль: именованный набор идентификаторов прав.
#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub role_id: u32,
    pub name: String,
    pub description: String,
    /// Права в порядке добавления; проверки идут линейным проходом
    /// до первого совпадения.
    pub permissions: Vec<u32>,
    /// Системные роли создаются при инициализации и не удаляются.
    pub system_role: bool,
    pub priority: u32,
    pub created_at: SystemTime,
}

// Встроенные роли.
pub const ROLE_ADMIN: u32 = 1;
pub const ROLE_USER: u32 = 2;
pub const ROLE_GUEST: u32 = 3;
pub const ROLE_OPERATOR: u32 = 4;
pub const ROLE_AUDITOR: u32 = 5;

// Встроенные права.
pub const PERM_LOGIN: u32 = 1;
pub const PERM_CHANGE_PASSWORD: u32 = 2;
pub const PERM_READ_FILE: u32 = 3;
pub const PERM_WRITE_FILE: u32 = 4;
pub const PERM_EXECUTE_FILE: u32 = 5;
pub const PERM_CREATE_USER: u32 = 6;
pub const PERM_DELETE_USER: u32 = 7;
pub const PERM_MODIFY_USER: u32 = 8;
pub const PERM_ADMIN_SYSTEM: u32 = 9;
pub const PERM_VIEW_LOGS: u32 = 10;
pub const PERM_MODIFY_ROLES: u32 = 11;
pub const PERM_MODIFY_PERMISSIONS: u32 = 12;
