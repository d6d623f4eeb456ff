use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tokio::time::Instant;

use crate::{
    audit::{AuditEventKind, AuditPipe},
    config::AuthConfig,
    credential::UserAccount,
    error::{AuthError, AuthResult},
    session::data::{AuthFactors, Session, SessionId, SessionState, PRIVILEGE_USER},
};

/// Общий предел числа живых сессий в таблице.
pub const MAX_SESSIONS: usize = 256;

/// Менеджер сессий: таблица живых сессий и их жизненный цикл.
///
/// Истечение оценивается лениво при обращении; периодическая уборка
/// доступна через [`SessionManager::sweep_expired`] и выполняется
/// также перед созданием новой сессии.
pub struct SessionManager {
    config: Arc<AuthConfig>,
    audit: Arc<AuditPipe>,
    sessions: RwLock<HashMap<SessionId, Session>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SessionManager {
    pub(crate) fn new(config: Arc<AuthConfig>, audit: Arc<AuditPipe>) -> Self {
        Self {
            config,
            audit,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Создаёт сессию для аутентифицированного пользователя.
    ///
    /// Перед вставкой убираются истёкшие записи. Превышение лимита
    /// пользователя или общего предела — ошибка `Memory`, без
    /// вытеснения чужих сессий.
    pub fn create_session(
        &self,
        user: &UserAccount,
        client_ip: Option<&str>,
    ) -> AuthResult<Session> {
        let now = Instant::now();
        let mut expired: Vec<(u32, SessionId)> = Vec::new();

        let result = {
            let mut sessions = self.sessions.write().unwrap();
            Self::sweep_locked(&mut sessions, self.config.idle_timeout, now, &mut expired);

            let user_sessions = sessions
                .values()
                .filter(|s| s.user_id == user.user_id)
                .count();
            if user_sessions >= self.config.max_concurrent_sessions
                || sessions.len() >= MAX_SESSIONS
            {
                Err(AuthError::Memory)
            } else {
                let session = Session {
                    id: SessionId::generate(),
                    user_id: user.user_id,
                    created_at: now,
                    last_activity: now,
                    expires_at: now + self.config.session_timeout,
                    state: SessionState::Valid,
                    // Без включённого второго фактора сессия считается
                    // подтверждённой сразу.
                    mfa_verified: !user.mfa.enabled,
                    factors: AuthFactors::PASSWORD,
                    privilege_level: PRIVILEGE_USER,
                    client_ip: client_ip.map(str::to_string),
                };
                sessions.insert(session.id.clone(), session.clone());
                Ok(session)
            }
        };

        self.emit_expired(&expired);
        if let Ok(session) = &result {
            self.audit.emit(
                AuditEventKind::SessionCreated,
                user.user_id,
                &user.username,
                session.client_ip.as_deref().unwrap_or(""),
                &format!("session {} created", session.id),
                true,
            );
        }
        result
    }

    /// Проверяет сессию и продвигает отметку активности.
    ///
    /// Абсолютный срок не продлевается: для этого есть
    /// [`SessionManager::refresh_session`].
    pub fn verify_session(&self, id: &SessionId) -> AuthResult<Session> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(id).ok_or(AuthError::InvalidToken)?;

        // Отозванная или иначе недействительная сессия не становится
        // истёкшей: из Revoked/Expired переходов нет.
        if session.state != SessionState::Valid {
            return Err(AuthError::InvalidToken);
        }
        if session.is_expired(self.config.idle_timeout, now) {
            session.state = SessionState::Expired;
            return Err(AuthError::SessionExpired);
        }

        session.last_activity = now;
        Ok(session.clone())
    }

    /// Явное продление: двигает и абсолютный срок, и отметку
    /// активности. Требует действующую сессию.
    pub fn refresh_session(&self, id: &SessionId) -> AuthResult<Session> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(id).ok_or(AuthError::InvalidToken)?;

        if session.state != SessionState::Valid {
            return Err(AuthError::InvalidToken);
        }
        if session.is_expired(self.config.idle_timeout, now) {
            session.state = SessionState::Expired;
            return Err(AuthError::SessionExpired);
        }

        session.expires_at = now + self.config.session_timeout;
        session.last_activity = now;
        Ok(session.clone())
    }

    /// Помечает второй фактор сессии подтверждённым.
    pub(crate) fn mark_mfa_verified(&self, id: &SessionId) -> AuthResult<()> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(id).ok_or(AuthError::InvalidToken)?;
        session.mfa_verified = true;
        session.factors |= AuthFactors::TOTP;
        Ok(())
    }

    /// Завершает сессию. Запись остаётся в таблице как отозванная
    /// до ближайшей уборки.
    pub fn logout(&self, id: &SessionId) -> AuthResult<()> {
        let user_id = {
            let mut sessions = self.sessions.write().unwrap();
            let session = sessions.get_mut(id).ok_or(AuthError::NotFound)?;
            session.state = SessionState::Revoked;
            session.user_id
        };
        self.audit.emit(
            AuditEventKind::Logout,
            user_id,
            "",
            "",
            &format!("session {id} revoked"),
            true,
        );
        Ok(())
    }

    /// Отзывает все действующие сессии пользователя. Возвращает
    /// число отозванных.
    pub fn revoke_all(&self, user_id: u32) -> usize {
        let mut revoked = 0;
        {
            let mut sessions = self.sessions.write().unwrap();
            for session in sessions.values_mut() {
                if session.user_id == user_id && session.state == SessionState::Valid {
                    session.state = SessionState::Revoked;
                    revoked += 1;
                }
            }
        }
        if revoked > 0 {
            self.audit.emit(
                AuditEventKind::Logout,
                user_id,
                "",
                "",
                &format!("{revoked} sessions revoked"),
                true,
            );
        }
        revoked
    }

    /// Действующие (не истёкшие, не отозванные) сессии пользователя.
    pub fn active_sessions(&self, user_id: u32) -> Vec<Session> {
        let now = Instant::now();
        let sessions = self.sessions.read().unwrap();
        sessions
            .values()
            .filter(|s| {
                s.user_id == user_id
                    && s.state == SessionState::Valid
                    && !s.is_expired(self.config.idle_timeout, now)
            })
            .cloned()
            .collect()
    }

    /// Число действующих сессий во всей таблице.
    pub fn active_count(&self) -> usize {
        let now = Instant::now();
        let sessions = self.sessions.read().unwrap();
        sessions
            .values()
            .filter(|s| {
                s.state == SessionState::Valid && !s.is_expired(self.config.idle_timeout, now)
            })
            .count()
    }

    /// Уборка: помечает истёкшие и выбрасывает все недействующие
    /// записи. Возвращает число удалённых.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut expired: Vec<(u32, SessionId)> = Vec::new();
        let removed = {
            let mut sessions = self.sessions.write().unwrap();
            Self::sweep_locked(&mut sessions, self.config.idle_timeout, now, &mut expired)
        };
        self.emit_expired(&expired);
        removed
    }

    ////////////////////////////////////////////////////////////////////////////
    // Внутренние методы и функции
    ////////////////////////////////////////////////////////////////////////////

    fn sweep_locked(
        sessions: &mut HashMap<SessionId, Session>,
        idle_timeout: std::time::Duration,
        now: Instant,
        expired: &mut Vec<(u32, SessionId)>,
    ) -> usize {
        for session in sessions.values_mut() {
            if session.state == SessionState::Valid && session.is_expired(idle_timeout, now) {
                session.state = SessionState::Expired;
                expired.push((session.user_id, session.id.clone()));
            }
        }
        let before = sessions.len();
        sessions.retain(|_, s| s.state == SessionState::Valid);
        before - sessions.len()
    }

    fn emit_expired(&self, expired: &[(u32, SessionId)]) {
        for (user_id, id) in expired {
            self.audit.emit(
                AuditEventKind::SessionExpired,
                *user_id,
                "",
                "",
                &format!("session {id} expired"),
                false,
            );
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
