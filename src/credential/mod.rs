pub mod account;
pub mod password;
pub mod store;

pub use account::{
    AccountStatus, BackupCode, MfaState, UserAccount, BACKUP_CODE_COUNT, MAX_GROUPS_PER_USER,
    MAX_ROLES_PER_USER, MFA_SECRET_LENGTH,
};
pub use password::{
    check_password_policy, constant_time_eq, validate_username, MAX_USERNAME_LENGTH, SALT_LENGTH,
};
pub use store::{CredentialStore, MAX_USERS};
