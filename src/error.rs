use thiserror::Error;

/// Результат операций аутентификации и авторизации.
pub type AuthResult<T> = Result<T, AuthError>;

/// Единая таксономия ошибок подсистемы.
///
/// Варианты без полей, чтобы коды можно было сравнивать в тестах и
/// транслировать во внешние протоколы без потери информации.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Некорректный аргумент (пустое имя, неизвестное действие и т.п.).
    #[error("invalid argument")]
    Invalid,

    /// Пользователь, роль, право или ресурс не найдены.
    #[error("not found")]
    NotFound,

    /// Сущность с таким идентификатором или именем уже существует.
    #[error("already exists")]
    AlreadyExists,

    /// Доступ запрещён политикой авторизации или статусом учётной записи.
    #[error("access denied")]
    AccessDenied,

    /// Пароль не совпал или не прошёл парольную политику.
    #[error("invalid password")]
    InvalidPassword,

    /// Учётная запись заблокирована после серии неудачных входов.
    #[error("account locked")]
    AccountLocked,

    /// Сессия истекла по абсолютному или простойному таймауту.
    #[error("session expired")]
    SessionExpired,

    /// Идентификатор сессии неизвестен, отозван или синтаксически неверен.
    #[error("invalid session token")]
    InvalidToken,

    /// Операция требует подтверждённый второй фактор.
    #[error("multi-factor authentication required")]
    MfaRequired,

    /// Одноразовый код не совпал ни с одним допустимым окном.
    #[error("invalid one-time code")]
    MfaInvalid,

    /// Повторное использование кода в том же временном окне.
    #[error("one-time code replay detected")]
    ReplayAttack,

    /// Сбой криптопримитива (хеширование, HMAC).
    #[error("cryptographic failure")]
    Crypto,

    /// Сбой нижележащего хранилища. Само ядро держит состояние в
    /// памяти; код зарезервирован для персистентных обвязок.
    #[error("storage failure")]
    Storage,

    /// Достигнут предел ёмкости (пользователи, сессии, роли, ACL).
    #[error("capacity limit exceeded")]
    Memory,

    /// Слишком много попыток за короткое время.
    #[error("too many attempts")]
    TooManyAttempts,
}
