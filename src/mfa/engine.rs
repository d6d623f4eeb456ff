use std::sync::Arc;

use rand::{rngs::OsRng, RngCore};
use serde::Serialize;

use crate::{
    audit::{unix_now, AuditEventKind, AuditPipe},
    credential::{
        constant_time_eq, BackupCode, CredentialStore, MfaState, BACKUP_CODE_COUNT,
        MFA_SECRET_LENGTH,
    },
    error::{AuthError, AuthResult},
    mfa::totp::{self, TOTP_PERIOD, TOTP_TOLERANCE},
};

/// Сводка состояния второго фактора пользователя.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MfaStatus {
    pub enabled: bool,
    /// Секрет выдан (возможно, ещё не подтверждён).
    pub secret_configured: bool,
    pub backup_codes_remaining: usize,
}

/// Движок второго фактора: выдача секрета, подтверждение настройки,
/// проверка кодов и резервные коды. Состояние живёт в учётных
/// записях, движок только оперирует им.
pub struct MfaEngine {
    credentials: Arc<CredentialStore>,
    audit: Arc<AuditPipe>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl MfaEngine {
    pub(crate) fn new(credentials: Arc<CredentialStore>, audit: Arc<AuditPipe>) -> Self {
        Self { credentials, audit }
    }

    /// Выдаёт новый секрет TOTP. Второй фактор при этом выключается
    /// до подтверждения кодом; прежние резервные коды аннулируются.
    /// Возвращает секрет в Base32 для ввода в приложение.
    pub fn generate_secret(&self, user_id: u32) -> AuthResult<String> {
        let mut secret = [0u8; MFA_SECRET_LENGTH];
        OsRng.fill_bytes(&mut secret);

        let username = self.credentials.update_user(user_id, |user| {
            user.mfa = MfaState {
                enabled: false,
                secret: Some(secret),
                backup_codes: Vec::new(),
                last_used_window: None,
            };
            Ok(user.username.clone())
        })?;

        self.audit.emit(
            AuditEventKind::MfaSecretGenerated,
            user_id,
            &username,
            "",
            "TOTP secret generated",
            true,
        );
        Ok(totp::encode_secret(&secret))
    }

    /// otpauth-URL для регистрации секрета по QR-коду.
    pub fn provisioning_url(&self, user_id: u32, issuer: &str) -> AuthResult<String> {
        self.credentials.with_user(user_id, |user| {
            user.mfa
                .secret
                .map(|secret| totp::provisioning_url(issuer, &user.username, &secret))
                .ok_or(AuthError::NotFound)
        })?
    }

    /// Подтверждение настройки текущим временем.
    pub fn verify_setup(&self, user_id: u32, code: &str) -> AuthResult<Vec<String>> {
        self.verify_setup_at(user_id, code, unix_now())
    }

    /// Подтверждение настройки: код против выданного секрета в окнах
    /// ±1. Успех включает второй фактор и выдаёт резервные коды —
    /// единственный момент, когда они видны открытым текстом.
    pub fn verify_setup_at(
        &self,
        user_id: u32,
        code: &str,
        now_unix: u64,
    ) -> AuthResult<Vec<String>> {
        let provided = parse_code(code)?;

        let result = self.credentials.update_user(user_id, |user| {
            let secret = user.mfa.secret.ok_or(AuthError::NotFound)?;
            if !code_matches(&secret, provided, now_unix)? {
                return Err(AuthError::MfaInvalid);
            }

            user.mfa.enabled = true;
            user.mfa.last_used_window = Some(totp::window_of(now_unix));

            let codes = generate_backup_codes();
            user.mfa.backup_codes = codes
                .iter()
                .map(|code| BackupCode {
                    code: code.clone(),
                    used: false,
                })
                .collect();
            Ok((user.username.clone(), codes))
        });

        match result {
            Ok((username, codes)) => {
                self.audit.emit(
                    AuditEventKind::MfaEnabled,
                    user_id,
                    &username,
                    "",
                    "MFA enabled for user",
                    true,
                );
                self.audit.emit(
                    AuditEventKind::MfaBackupGenerated,
                    user_id,
                    &username,
                    "",
                    "MFA backup codes generated",
                    true,
                );
                Ok(codes)
            }
            Err(AuthError::MfaInvalid) => {
                self.audit.emit(
                    AuditEventKind::MfaFailure,
                    user_id,
                    "",
                    "",
                    "MFA setup verification failed",
                    false,
                );
                Err(AuthError::MfaInvalid)
            }
            Err(e) => Err(e),
        }
    }

    /// Проверка кода текущим временем.
    pub fn verify_code(&self, user_id: u32, code: &str) -> AuthResult<()> {
        self.verify_code_at(user_id, code, unix_now())
    }

    /// Проверка одноразового кода.
    ///
    /// Сначала защита от повтора: если текущее окно совпадает с
    /// окном последнего принятого кода, попытка отвергается ещё до
    /// сверки, даже с верным кодом. Затем код сверяется в окнах ±1.
    pub fn verify_code_at(&self, user_id: u32, code: &str, now_unix: u64) -> AuthResult<()> {
        let provided = parse_code(code)?;

        let result = self.credentials.update_user(user_id, |user| {
            if !user.mfa.enabled {
                return Err(AuthError::NotFound);
            }
            let secret = user.mfa.secret.ok_or(AuthError::NotFound)?;

            let current_window = totp::window_of(now_unix);
            if user.mfa.last_used_window == Some(current_window) {
                return Err(AuthError::ReplayAttack);
            }

            if !code_matches(&secret, provided, now_unix)? {
                return Err(AuthError::MfaInvalid);
            }
            user.mfa.last_used_window = Some(current_window);
            Ok(user.username.clone())
        });

        match result {
            Ok(username) => {
                self.audit.emit(
                    AuditEventKind::MfaSuccess,
                    user_id,
                    &username,
                    "",
                    "MFA verification successful",
                    true,
                );
                Ok(())
            }
            Err(AuthError::ReplayAttack) => {
                self.audit.emit(
                    AuditEventKind::MfaReplayAttack,
                    user_id,
                    "",
                    "",
                    "MFA replay attack detected",
                    false,
                );
                Err(AuthError::ReplayAttack)
            }
            Err(AuthError::MfaInvalid) => {
                self.audit.emit(
                    AuditEventKind::MfaFailure,
                    user_id,
                    "",
                    "",
                    "MFA verification failed",
                    false,
                );
                Err(AuthError::MfaInvalid)
            }
            Err(e) => Err(e),
        }
    }

    /// Проверка резервного кода. Код одноразовый: совпадение гасит
    /// его навсегда.
    pub fn verify_backup_code(&self, user_id: u32, code: &str) -> AuthResult<()> {
        let candidate = code.trim();

        let result = self.credentials.update_user(user_id, |user| {
            if !user.mfa.enabled {
                return Err(AuthError::NotFound);
            }
            let slot = user.mfa.backup_codes.iter_mut().find(|backup| {
                !backup.used && constant_time_eq(backup.code.as_bytes(), candidate.as_bytes())
            });
            match slot {
                Some(backup) => {
                    backup.used = true;
                    Ok(user.username.clone())
                }
                None => Err(AuthError::MfaInvalid),
            }
        });

        match result {
            Ok(username) => {
                self.audit.emit(
                    AuditEventKind::MfaBackupUsed,
                    user_id,
                    &username,
                    "",
                    "MFA backup code used",
                    true,
                );
                Ok(())
            }
            Err(AuthError::MfaInvalid) => {
                self.audit.emit(
                    AuditEventKind::MfaFailure,
                    user_id,
                    "",
                    "",
                    "invalid MFA backup code",
                    false,
                );
                Err(AuthError::MfaInvalid)
            }
            Err(e) => Err(e),
        }
    }

    /// Резервные коды с отметками использования.
    pub fn backup_codes(&self, user_id: u32) -> AuthResult<Vec<BackupCode>> {
        self.credentials
            .with_user(user_id, |user| user.mfa.backup_codes.clone())
    }

    /// Выключает второй фактор и стирает секрет с резервными кодами.
    pub fn disable(&self, user_id: u32) -> AuthResult<()> {
        let username = self.credentials.update_user(user_id, |user| {
            user.mfa = MfaState::default();
            Ok(user.username.clone())
        })?;
        self.audit.emit(
            AuditEventKind::MfaDisabled,
            user_id,
            &username,
            "",
            "MFA disabled for user",
            true,
        );
        Ok(())
    }

    pub fn status(&self, user_id: u32) -> AuthResult<MfaStatus> {
        self.credentials.with_user(user_id, |user| MfaStatus {
            enabled: user.mfa.enabled,
            secret_configured: user.mfa.secret.is_some(),
            backup_codes_remaining: user.backup_codes_remaining(),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

fn parse_code(code: &str) -> AuthResult<u32> {
    code.trim().parse::<u32>().map_err(|_| AuthError::MfaInvalid)
}

/// Код совпадает с одним из окон в пределах допуска?
fn code_matches(secret: &[u8], provided: u32, now_unix: u64) -> AuthResult<bool> {
    for i in -TOTP_TOLERANCE..=TOTP_TOLERANCE {
        let shifted = now_unix as i64 + i * TOTP_PERIOD as i64;
        if shifted < 0 {
            continue;
        }
        if totp::totp(secret, shifted as u64)? == provided {
            return Ok(true);
        }
    }
    Ok(false)
}

fn generate_backup_codes() -> Vec<String> {
    (0..BACKUP_CODE_COUNT)
        .map(|_| format!("{:08}", OsRng.next_u32() % 100_000_000))
        .collect()
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audit::{AuditEventKind, MemorySink},
        config::{AuthConfig, HashAlgorithm},
    };

    const NOW: u64 = 1_700_000_000;

    fn setup() -> (MfaEngine, Arc<CredentialStore>, Arc<MemorySink>, u32) {
        let mut config = AuthConfig::default();
        config.default_hash_algorithm = HashAlgorithm::Bcrypt;
        config.hash_rounds = 4;

        let sink = Arc::new(MemorySink::new());
        let audit = Arc::new(AuditPipe::new(true, sink.clone()));
        let credentials = Arc::new(CredentialStore::new(Arc::new(config), audit.clone()));
        let user_id = credentials
            .create_user("alice", "Sup3rSecret", "Alice")
            .unwrap();
        let engine = MfaEngine::new(credentials.clone(), audit);
        (engine, credentials, sink, user_id)
    }

    /// Включает второй фактор честным путём и возвращает резервные коды.
    fn enable(engine: &MfaEngine, credentials: &CredentialStore, user_id: u32) -> Vec<String> {
        engine.generate_secret(user_id).unwrap();
        let secret = credentials
            .with_user(user_id, |u| u.mfa.secret.unwrap())
            .unwrap();
        let code = totp::totp(&secret, NOW).unwrap();
        engine
            .verify_setup_at(user_id, &format!("{code:06}"), NOW)
            .unwrap()
    }

    #[test]
    fn test_generate_secret_resets_state() {
        let (engine, credentials, _, user_id) = setup();

        let encoded = engine.generate_secret(user_id).unwrap();
        let secret = totp::decode_secret(&encoded).unwrap();
        assert_eq!(secret.len(), MFA_SECRET_LENGTH);

        let status = engine.status(user_id).unwrap();
        assert!(!status.enabled);
        assert!(status.secret_configured);
        assert_eq!(status.backup_codes_remaining, 0);

        // Повторная выдача меняет секрет и снова требует подтверждения.
        enable(&engine, &credentials, user_id);
        let second = engine.generate_secret(user_id).unwrap();
        assert_ne!(encoded, second);
        assert!(!engine.status(user_id).unwrap().enabled);
    }

    #[test]
    fn test_setup_requires_valid_code() {
        let (engine, _, _, user_id) = setup();
        engine.generate_secret(user_id).unwrap();

        assert_eq!(
            engine.verify_setup_at(user_id, "000000", NOW),
            Err(AuthError::MfaInvalid)
        );
        assert_eq!(
            engine.verify_setup_at(user_id, "garbage", NOW),
            Err(AuthError::MfaInvalid)
        );
        assert!(!engine.status(user_id).unwrap().enabled);
    }

    #[test]
    fn test_setup_without_secret() {
        let (engine, _, _, user_id) = setup();
        assert_eq!(
            engine.verify_setup_at(user_id, "123456", NOW),
            Err(AuthError::NotFound)
        );
        assert!(matches!(
            engine.provisioning_url(user_id, "sentra"),
            Err(AuthError::NotFound)
        ));
    }

    #[test]
    fn test_setup_enables_and_issues_backup_codes() {
        let (engine, credentials, sink, user_id) = setup();
        let codes = enable(&engine, &credentials, user_id);

        assert_eq!(codes.len(), BACKUP_CODE_COUNT);
        assert!(codes.iter().all(|c| c.len() == 8));

        let status = engine.status(user_id).unwrap();
        assert!(status.enabled);
        assert_eq!(status.backup_codes_remaining, BACKUP_CODE_COUNT);

        let kinds: Vec<_> = sink.events().into_iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&AuditEventKind::MfaEnabled));
        assert!(kinds.contains(&AuditEventKind::MfaBackupGenerated));
    }

    /// Код принимается из соседних окон, но не дальше допуска.
    #[test]
    fn test_verify_code_tolerance() {
        let (engine, credentials, _, user_id) = setup();
        enable(&engine, &credentials, user_id);
        let secret = credentials
            .with_user(user_id, |u| u.mfa.secret.unwrap())
            .unwrap();

        // Код предыдущего окна, проверка в следующем окне.
        let late = totp::totp(&secret, NOW + TOTP_PERIOD).unwrap();
        assert!(engine
            .verify_code_at(user_id, &format!("{late:06}"), NOW + 2 * TOTP_PERIOD)
            .is_ok());

        // Два окна назад — уже вне допуска.
        let stale = totp::totp(&secret, NOW).unwrap();
        assert_eq!(
            engine.verify_code_at(user_id, &format!("{stale:06}"), NOW + 5 * TOTP_PERIOD),
            Err(AuthError::MfaInvalid)
        );
    }

    /// Повтор в том же окне отвергается до сверки кода.
    #[test]
    fn test_replay_guard() {
        let (engine, credentials, sink, user_id) = setup();
        enable(&engine, &credentials, user_id);
        let secret = credentials
            .with_user(user_id, |u| u.mfa.secret.unwrap())
            .unwrap();

        // Setup уже занял окно NOW: даже верный код в нём — повтор.
        let code = totp::totp(&secret, NOW).unwrap();
        assert_eq!(
            engine.verify_code_at(user_id, &format!("{code:06}"), NOW),
            Err(AuthError::ReplayAttack)
        );

        // Следующее окно — принимается, и само становится занятым.
        let next = totp::totp(&secret, NOW + TOTP_PERIOD).unwrap();
        assert!(engine
            .verify_code_at(user_id, &format!("{next:06}"), NOW + TOTP_PERIOD)
            .is_ok());
        assert_eq!(
            engine.verify_code_at(user_id, &format!("{next:06}"), NOW + TOTP_PERIOD),
            Err(AuthError::ReplayAttack)
        );

        let kinds: Vec<_> = sink.events().into_iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&AuditEventKind::MfaReplayAttack));
    }

    #[test]
    fn test_verify_code_requires_enabled() {
        let (engine, _, _, user_id) = setup();
        engine.generate_secret(user_id).unwrap();
        assert_eq!(
            engine.verify_code_at(user_id, "123456", NOW),
            Err(AuthError::NotFound)
        );
    }

    /// Резервный код работает ровно один раз.
    #[test]
    fn test_backup_code_single_use() {
        let (engine, credentials, _, user_id) = setup();
        let codes = enable(&engine, &credentials, user_id);

        assert!(engine.verify_backup_code(user_id, &codes[0]).is_ok());
        assert_eq!(
            engine.verify_backup_code(user_id, &codes[0]),
            Err(AuthError::MfaInvalid)
        );
        assert_eq!(
            engine.status(user_id).unwrap().backup_codes_remaining,
            BACKUP_CODE_COUNT - 1
        );

        assert_eq!(
            engine.verify_backup_code(user_id, "99999999"),
            Err(AuthError::MfaInvalid)
        );
    }

    #[test]
    fn test_disable_wipes_state() {
        let (engine, credentials, _, user_id) = setup();
        enable(&engine, &credentials, user_id);

        engine.disable(user_id).unwrap();
        let status = engine.status(user_id).unwrap();
        assert!(!status.enabled);
        assert!(!status.secret_configured);
        assert_eq!(status.backup_codes_remaining, 0);

        assert_eq!(
            engine.verify_code_at(user_id, "123456", NOW + 10 * TOTP_PERIOD),
            Err(AuthError::NotFound)
        );
    }

    #[test]
    fn test_provisioning_url_contains_identity() {
        let (engine, _, _, user_id) = setup();
        engine.generate_secret(user_id).unwrap();

        let url = engine.provisioning_url(user_id, "sentra").unwrap();
        assert!(url.contains("sentra:alice"));
    }
}
