use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::SystemTime,
};

use crate::{
    audit::{AuditEventKind, AuditPipe},
    credential::UserAccount,
    error::{AuthError, AuthResult},
    rbac::{
        permission_set::{PermissionSet, MAX_PERMISSIONS},
        types::{
            Permission, PermissionScope, Role, PERM_ADMIN_SYSTEM, PERM_CHANGE_PASSWORD,
            PERM_CREATE_USER, PERM_DELETE_USER, PERM_EXECUTE_FILE, PERM_LOGIN,
            PERM_MODIFY_PERMISSIONS, PERM_MODIFY_ROLES, PERM_MODIFY_USER, PERM_READ_FILE,
            PERM_VIEW_LOGS, PERM_WRITE_FILE, ROLE_ADMIN, ROLE_AUDITOR, ROLE_GUEST, ROLE_USER,
        },
    },
};

/// Предел числа ролей.
pub const MAX_ROLES: usize = 256;

/// Движок ролевой модели: каталоги ролей и прав, проверки
/// принадлежности и вычисление эффективных прав.
///
/// Данные пользователя движок не хранит: методы принимают
/// [`UserAccount`], назначениями владеет хранилище учётных данных.
pub struct RbacEngine {
    audit: Arc<AuditPipe>,
    catalog: RwLock<Catalog>,
}

struct Catalog {
    roles: HashMap<u32, Role>,
    role_names: HashMap<String, u32>,
    permissions: HashMap<u32, Permission>,
    permission_names: HashMap<String, u32>,
    next_role_id: u32,
    next_permission_id: u32,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl RbacEngine {
    /// Создаёт движок со встроенными каталогами: двенадцать прав
    /// и роли admin/user/guest.
    pub(crate) fn new(audit: Arc<AuditPipe>) -> Self {
        let mut catalog = Catalog {
            roles: HashMap::new(),
            role_names: HashMap::new(),
            permissions: HashMap::new(),
            permission_names: HashMap::new(),
            next_role_id: ROLE_AUDITOR + 1,
            next_permission_id: PERM_MODIFY_PERMISSIONS + 1,
        };
        catalog.seed_builtin();
        Self {
            audit,
            catalog: RwLock::new(catalog),
        }
    }

    pub fn create_role(&self, name: &str, description: &str) -> AuthResult<u32> {
        if name.is_empty() {
            return Err(AuthError::Invalid);
        }
        let mut catalog = self.catalog.write().unwrap();
        if catalog.role_names.contains_key(name) {
            return Err(AuthError::AlreadyExists);
        }
        if catalog.roles.len() >= MAX_ROLES {
            return Err(AuthError::Memory);
        }

        let role_id = catalog.next_role_id;
        catalog.next_role_id += 1;
        catalog.roles.insert(
            role_id,
            Role {
                role_id,
                name: name.to_string(),
                description: description.to_string(),
                permissions: Vec::new(),
                system_role: false,
                priority: 50,
                created_at: SystemTime::now(),
            },
        );
        catalog.role_names.insert(name.to_string(), role_id);
        Ok(role_id)
    }

    pub fn create_permission(
        &self,
        name: &str,
        description: &str,
        scope: PermissionScope,
    ) -> AuthResult<u32> {
        if name.is_empty() {
            return Err(AuthError::Invalid);
        }
        let mut catalog = self.catalog.write().unwrap();
        if catalog.permission_names.contains_key(name) {
            return Err(AuthError::AlreadyExists);
        }
        if catalog.permissions.len() >= MAX_PERMISSIONS {
            return Err(AuthError::Memory);
        }

        let permission_id = catalog.next_permission_id;
        catalog.next_permission_id += 1;
        let priority = catalog.permissions.len() as u32 + 1;
        catalog.permissions.insert(
            permission_id,
            Permission {
                permission_id,
                name: name.to_string(),
                description: description.to_string(),
                scope,
                category: 0,
                inheritable: true,
                priority,
            },
        );
        catalog.permission_names.insert(name.to_string(), permission_id);
        Ok(permission_id)
    }

    pub fn get_role(&self, role_id: u32) -> AuthResult<Role> {
        let catalog = self.catalog.read().unwrap();
        catalog.roles.get(&role_id).cloned().ok_or(AuthError::NotFound)
    }

    /// Список прав роли в порядке добавления.
    pub fn role_permissions(&self, role_id: u32) -> AuthResult<Vec<u32>> {
        self.get_role(role_id).map(|role| role.permissions)
    }

    pub fn get_permission(&self, permission_id: u32) -> AuthResult<Permission> {
        let catalog = self.catalog.read().unwrap();
        catalog
            .permissions
            .get(&permission_id)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    pub fn find_role(&self, name: &str) -> AuthResult<Role> {
        let catalog = self.catalog.read().unwrap();
        let role_id = catalog.role_names.get(name).ok_or(AuthError::NotFound)?;
        catalog.roles.get(role_id).cloned().ok_or(AuthError::NotFound)
    }

    pub fn list_roles(&self) -> Vec<Role> {
        let catalog = self.catalog.read().unwrap();
        let mut roles: Vec<Role> = catalog.roles.values().cloned().collect();
        roles.sort_by_key(|r| r.role_id);
        roles
    }

    pub fn list_permissions(&self) -> Vec<Permission> {
        let catalog = self.catalog.read().unwrap();
        let mut permissions: Vec<Permission> = catalog.permissions.values().cloned().collect();
        permissions.sort_by_key(|p| p.permission_id);
        permissions
    }

    pub fn add_permission_to_role(&self, role_id: u32, permission_id: u32) -> AuthResult<()> {
        let mut catalog = self.catalog.write().unwrap();
        if !catalog.permissions.contains_key(&permission_id) {
            return Err(AuthError::NotFound);
        }
        let role = catalog.roles.get_mut(&role_id).ok_or(AuthError::NotFound)?;
        if role.permissions.contains(&permission_id) {
            return Err(AuthError::AlreadyExists);
        }
        role.permissions.push(permission_id);
        Ok(())
    }

    pub fn remove_permission_from_role(&self, role_id: u32, permission_id: u32) -> AuthResult<()> {
        let mut catalog = self.catalog.write().unwrap();
        let role = catalog.roles.get_mut(&role_id).ok_or(AuthError::NotFound)?;
        let index = role
            .permissions
            .iter()
            .position(|&p| p == permission_id)
            .ok_or(AuthError::NotFound)?;
        role.permissions.remove(index);
        Ok(())
    }

    /// Пользователь носит роль?
    pub fn check_role(&self, user: &UserAccount, role_id: u32) -> bool {
        user.has_role(role_id)
    }

    /// Есть ли у пользователя право: линейный проход по ролям
    /// в порядке назначения до первого совпадения. Отказ пишется
    /// в аудит.
    pub fn check_permission(&self, user: &UserAccount, permission_id: u32) -> AuthResult<()> {
        {
            let catalog = self.catalog.read().unwrap();
            for role_id in &user.roles {
                if let Some(role) = catalog.roles.get(role_id) {
                    if role.permissions.contains(&permission_id) {
                        return Ok(());
                    }
                }
            }
        }
        self.audit.emit(
            AuditEventKind::PermissionDenied,
            user.user_id,
            &user.username,
            "",
            &format!("permission {permission_id} denied"),
            false,
        );
        Err(AuthError::AccessDenied)
    }

    /// Эффективные права: объединение прав всех ролей пользователя.
    /// Счётчик в снимке растёт на каждое ребро роль-право.
    pub fn effective_permissions(&self, user: &UserAccount) -> PermissionSet {
        let catalog = self.catalog.read().unwrap();
        let mut set = PermissionSet::new();
        for role_id in &user.roles {
            if let Some(role) = catalog.roles.get(role_id) {
                for &permission_id in &role.permissions {
                    set.insert(permission_id);
                }
            }
        }
        set
    }

    pub fn role_count(&self) -> usize {
        self.catalog.read().unwrap().roles.len()
    }

    pub fn permission_count(&self) -> usize {
        self.catalog.read().unwrap().permissions.len()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

impl Catalog {
    fn seed_builtin(&mut self) {
        let builtin: [(u32, &str, &str, PermissionScope, u32, bool); 12] = [
            (PERM_LOGIN, "login", "User login permission", PermissionScope::System, 0, true),
            (PERM_CHANGE_PASSWORD, "change_password", "Change own password", PermissionScope::User, 0, false),
            (PERM_READ_FILE, "read_file", "Read file permission", PermissionScope::Resource, 1, true),
            (PERM_WRITE_FILE, "write_file", "Write file permission", PermissionScope::Resource, 1, true),
            (PERM_EXECUTE_FILE, "execute_file", "Execute file permission", PermissionScope::Resource, 1, true),
            (PERM_CREATE_USER, "create_user", "Create user accounts", PermissionScope::System, 2, false),
            (PERM_DELETE_USER, "delete_user", "Delete user accounts", PermissionScope::System, 2, false),
            (PERM_MODIFY_USER, "modify_user", "Modify user accounts", PermissionScope::System, 2, false),
            (PERM_ADMIN_SYSTEM, "admin_system", "System administration", PermissionScope::System, 3, false),
            (PERM_VIEW_LOGS, "view_logs", "View system logs", PermissionScope::System, 1, false),
            (PERM_MODIFY_ROLES, "modify_roles", "Modify roles and permissions", PermissionScope::System, 3, false),
            (PERM_MODIFY_PERMISSIONS, "modify_permissions", "Modify permissions", PermissionScope::System, 3, false),
        ];
        for (permission_id, name, description, scope, category, inheritable) in builtin {
            self.permissions.insert(
                permission_id,
                Permission {
                    permission_id,
                    name: name.to_string(),
                    description: description.to_string(),
                    scope,
                    category,
                    inheritable,
                    priority: permission_id,
                },
            );
            self.permission_names.insert(name.to_string(), permission_id);
        }

        let all: Vec<u32> = (PERM_LOGIN..=PERM_MODIFY_PERMISSIONS).collect();
        self.seed_role(ROLE_ADMIN, "admin", "System Administrator", all, 100);
        self.seed_role(
            ROLE_USER,
            "user",
            "Regular User",
            vec![
                PERM_LOGIN,
                PERM_CHANGE_PASSWORD,
                PERM_READ_FILE,
                PERM_WRITE_FILE,
                PERM_EXECUTE_FILE,
            ],
            10,
        );
        self.seed_role(
            ROLE_GUEST,
            "guest",
            "Guest User",
            vec![PERM_LOGIN, PERM_READ_FILE],
            1,
        );
    }

    fn seed_role(
        &mut self,
        role_id: u32,
        name: &str,
        description: &str,
        permissions: Vec<u32>,
        priority: u32,
    ) {
        self.roles.insert(
            role_id,
            Role {
                role_id,
                name: name.to_string(),
                description: description.to_string(),
                permissions,
                system_role: true,
                priority,
                created_at: SystemTime::now(),
            },
        );
        self.role_names.insert(name.to_string(), role_id);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::{
        audit::MemorySink,
        config::HashAlgorithm,
        credential::{AccountStatus, MfaState},
    };

    fn test_engine() -> (RbacEngine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let audit = Arc::new(AuditPipe::new(true, sink.clone()));
        (RbacEngine::new(audit), sink)
    }

    fn account_with_roles(roles: Vec<u32>) -> UserAccount {
        UserAccount {
            user_id: 7,
            username: "alice".into(),
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
            roles,
            groups: Vec::new(),
        }
    }

    /// Тест проверяет встроенные каталоги после инициализации.
    #[test]
    fn test_builtin_catalog() {
        let (engine, _) = test_engine();

        assert_eq!(engine.permission_count(), 12);
        assert_eq!(engine.role_count(), 3);

        let admin = engine.get_role(ROLE_ADMIN).unwrap();
        assert!(admin.system_role);
        assert_eq!(admin.permissions.len(), 12);

        let guest = engine.get_role(ROLE_GUEST).unwrap();
        assert_eq!(guest.permissions, vec![PERM_LOGIN, PERM_READ_FILE]);

        assert_eq!(engine.find_role("user").unwrap().role_id, ROLE_USER);
        assert_eq!(engine.get_permission(PERM_READ_FILE).unwrap().name, "read_file");
    }

    /// Новые идентификаторы монотонные и начинаются за встроенными.
    #[test]
    fn test_create_role_and_permission() {
        let (engine, _) = test_engine();

        let role_id = engine.create_role("operator", "Operations").unwrap();
        assert_eq!(role_id, ROLE_AUDITOR + 1);
        assert_eq!(
            engine.create_role("operator", ""),
            Err(AuthError::AlreadyExists)
        );
        assert_eq!(engine.create_role("", ""), Err(AuthError::Invalid));

        let perm_id = engine
            .create_permission("backup", "Run backups", PermissionScope::System)
            .unwrap();
        assert_eq!(perm_id, PERM_MODIFY_PERMISSIONS + 1);
        assert_eq!(
            engine.create_permission("backup", "", PermissionScope::System),
            Err(AuthError::AlreadyExists)
        );
    }

    #[test]
    fn test_role_permission_mutation() {
        let (engine, _) = test_engine();
        let role_id = engine.create_role("operator", "").unwrap();

        engine.add_permission_to_role(role_id, PERM_VIEW_LOGS).unwrap();
        assert_eq!(
            engine.add_permission_to_role(role_id, PERM_VIEW_LOGS),
            Err(AuthError::AlreadyExists)
        );
        assert_eq!(
            engine.add_permission_to_role(role_id, 9999),
            Err(AuthError::NotFound)
        );
        assert_eq!(
            engine.add_permission_to_role(9999, PERM_VIEW_LOGS),
            Err(AuthError::NotFound)
        );

        engine.remove_permission_from_role(role_id, PERM_VIEW_LOGS).unwrap();
        assert_eq!(
            engine.remove_permission_from_role(role_id, PERM_VIEW_LOGS),
            Err(AuthError::NotFound)
        );
    }

    /// Право достижимо через любую из ролей пользователя; отказ
    /// попадает в аудит.
    #[test]
    fn test_check_permission() {
        let (engine, sink) = test_engine();

        let user = account_with_roles(vec![ROLE_USER]);
        assert!(engine.check_permission(&user, PERM_WRITE_FILE).is_ok());
        assert_eq!(
            engine.check_permission(&user, PERM_ADMIN_SYSTEM),
            Err(AuthError::AccessDenied)
        );

        let guest = account_with_roles(vec![ROLE_GUEST]);
        assert!(engine.check_permission(&guest, PERM_READ_FILE).is_ok());
        assert_eq!(
            engine.check_permission(&guest, PERM_WRITE_FILE),
            Err(AuthError::AccessDenied)
        );

        let denied: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| e.kind == AuditEventKind::PermissionDenied)
            .collect();
        assert_eq!(denied.len(), 2);
    }

    /// Пересечение ролей: бит один, счётчик рёбер — два.
    #[test]
    fn test_effective_permissions() {
        let (engine, _) = test_engine();

        let user = account_with_roles(vec![ROLE_USER, ROLE_GUEST]);
        let set = engine.effective_permissions(&user);

        assert!(set.contains(PERM_LOGIN));
        assert!(set.contains(PERM_WRITE_FILE));
        assert!(!set.contains(PERM_ADMIN_SYSTEM));
        // user: 5 прав, guest: 2, из них login и read_file общие.
        assert_eq!(set.distinct(), 5);
        assert_eq!(set.count, 7);
    }

    #[test]
    fn test_effective_permissions_no_roles() {
        let (engine, _) = test_engine();
        let user = account_with_roles(Vec::new());
        let set = engine.effective_permissions(&user);
        assert!(set.is_empty());
        assert_eq!(set.count, 0);
    }
}
