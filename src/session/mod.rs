pub mod data;
pub mod manager;

pub use data::{
    AuthFactors, Session, SessionId, SessionState, PRIVILEGE_ADMIN, PRIVILEGE_GUEST,
    PRIVILEGE_USER, SESSION_ID_BYTES,
};
pub use manager::{SessionManager, MAX_SESSIONS};
