pub mod engine;
pub mod permission_set;
pub mod types;

pub use engine::{RbacEngine, MAX_ROLES};
pub use permission_set::{PermissionSet, MAX_PERMISSIONS};
pub use types::{
    Permission, PermissionScope, Role, PERM_ADMIN_SYSTEM, PERM_CHANGE_PASSWORD, PERM_CREATE_USER,
    PERM_DELETE_USER, PERM_EXECUTE_FILE, PERM_LOGIN, PERM_MODIFY_PERMISSIONS, PERM_MODIFY_ROLES,
    PERM_MODIFY_USER, PERM_READ_FILE, PERM_VIEW_LOGS, PERM_WRITE_FILE, ROLE_ADMIN, ROLE_AUDITOR,
    ROLE_GUEST, ROLE_OPERATOR, ROLE_USER,
};
