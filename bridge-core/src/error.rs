use thiserror::Error;

use crate::value::ValueKind;

/// Таксономия ошибок моста.
///
/// Каждый вариант имеет стабильный числовой код ([`BridgeError::code`]),
/// который уходит через границу вместо исключения.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Хэндл не зарегистрирован
    #[error("session not found: handle = {0}")]
    SessionNotFound(i32),

    /// Повторный attach без detach
    #[error("duplicate expert handle: {0}")]
    DuplicateHandle(i32),

    /// Нет ожидающей команды
    #[error("no pending command")]
    NoPendingCommand,

    /// Индекс позиционного параметра за пределами списка
    #[error("parameter index {index} out of range (count = {count})")]
    IndexOutOfRange {
        /// запрошенный индекс
        index: usize,
        /// количество позиционных параметров
        count: usize,
    },

    /// Тег хранимого значения не совпал с запрошенным типом
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// запрошенный тип
        expected: ValueKind,
        /// фактический тег
        actual: ValueKind,
    },

    /// Именованный параметр отсутствует
    #[error("named parameter not found: {0}")]
    NameNotFound(String),

    /// Redelivery при непрочитанной команде (strict-режим)
    #[error("command already pending for handle {0}")]
    CommandPending(i32),

    /// Исходящая отправка не уложилась в таймаут
    #[error("backend send timed out on port {0}")]
    BackendTimeout(u16),

    /// Соединение с бэкендом мертво
    #[error("backend unavailable on port {0}")]
    BackendUnavailable(u16),

    /// Некорректный аргумент вызова
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl BridgeError {
    /// Стабильный числовой код для границы (0 зарезервирован под успех).
    pub fn code(&self) -> i32 {
        match self {
            BridgeError::SessionNotFound(_) => 1,
            BridgeError::DuplicateHandle(_) => 2,
            BridgeError::NoPendingCommand => 3,
            BridgeError::IndexOutOfRange { .. } => 4,
            BridgeError::TypeMismatch { .. } => 5,
            BridgeError::NameNotFound(_) => 6,
            BridgeError::CommandPending(_) => 7,
            BridgeError::BackendTimeout(_) => 8,
            BridgeError::BackendUnavailable(_) => 9,
            BridgeError::InvalidArgument(_) => 10,
        }
    }
}

/// Ошибки wire-уровня.
#[derive(Debug, Error)]
pub enum WireError {
    /// Пакет короче минимального (нет даже байта версии)
    #[error("packet too short")]
    PacketTooShort,

    /// Неверная версия протокола
    #[error("unsupported wire version: {0}")]
    UnsupportedWireVersion(u8),

    /// Фрейм превышает допустимый размер
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u32),

    /// Ошибка сериализации/десериализации
    #[error("postcard encode/decode error: {0}")]
    Postcard(#[from] postcard::Error),

    /// Ошибка ввода/вывода при чтении/записи фрейма
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
