use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;

/// Тип события аудита.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditEventKind {
    LoginSuccess,
    LoginFailure,
    Logout,
    PasswordChange,
    AccountLocked,
    AccountUnlocked,
    UserCreated,
    UserDeleted,
    SessionCreated,
    SessionExpired,
    RoleAssigned,
    RoleRevoked,
    PermissionGranted,
    PermissionDenied,
    MfaSecretGenerated,
    MfaEnabled,
    MfaDisabled,
    MfaSuccess,
    MfaFailure,
    MfaReplayAttack,
    MfaBackupGenerated,
    MfaBackupUsed,
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Запись журнала аудита.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// Монотонный идентификатор события в пределах одного ядра.
    pub event_id: u64,
    pub kind: AuditEventKind,
    /// Идентификатор пользователя; 0, если пользователь не установлен.
    pub user_id: u32,
    pub username: String,
    /// Unix-время эмиссии, секунды.
    pub timestamp: u64,
    pub client_ip: String,
    pub details: String,
    pub success: bool,
}

/// Приёмник событий аудита.
///
/// Эмиссия best-effort: приёмник не возвращает ошибок и не должен
/// блокировать вызывающий поток надолго.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Приёмник, публикующий события через `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "sentra::audit",
            event_id = event.event_id,
            kind = %event.kind,
            user_id = event.user_id,
            username = %event.username,
            client_ip = %event.client_ip,
            success = event.success,
            "{}",
            event.details,
        );
    }
}

/// Приёмник, отбрасывающий события. Для ядер с выключенным аудитом.
#[derive(Debug, Default)]
pub struct NullSink;

impl AuditSink for NullSink {
    fn record(&self, _event: AuditEvent) {}
}

/// Приёмник, накапливающий события в памяти. Используется в тестах
/// и в обвязках, которые выгружают журнал сами.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Снимок накопленных событий.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemorySink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Конвейер аудита: нумерует события и отдаёт их приёмнику.
///
/// Движки собирают события под своими замками в локальный буфер и
/// вызывают `emit` уже после освобождения замка.
pub(crate) struct AuditPipe {
    enabled: bool,
    next_id: AtomicU64,
    sink: Arc<dyn AuditSink>,
}

impl AuditPipe {
    pub fn new(enabled: bool, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            enabled,
            next_id: AtomicU64::new(1),
            sink,
        }
    }

    pub fn emit(
        &self,
        kind: AuditEventKind,
        user_id: u32,
        username: &str,
        client_ip: &str,
        details: &str,
        success: bool,
    ) {
        if !self.enabled {
            return;
        }
        let event = AuditEvent {
            event_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            user_id,
            username: username.to_string(),
            timestamp: unix_now(),
            client_ip: client_ip.to_string(),
            details: details.to_string(),
            success,
        };
        self.sink.record(event);
    }
}

impl fmt::Debug for AuditPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditPipe")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
