use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::TypedValue;

/// Вариант терминала, из которого подключился эксперт.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalVariant {
    /// MetaTrader 4
    Mt4,
    /// MetaTrader 5
    Mt5,
}

impl fmt::Display for TerminalVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalVariant::Mt4 => f.write_str("MT4"),
            TerminalVariant::Mt5 => f.write_str("MT5"),
        }
    }
}

/// Котировка, уходящая на бэкенд.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Хэндл эксперта-отправителя
    pub handle: i32,
    /// Символ инструмента
    pub symbol: String,
    /// bid
    pub bid: f64,
    /// ask
    pub ask: f64,
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} bid={} ask={}",
            self.handle, self.symbol, self.bid, self.ask
        )
    }
}

/// Доменное событие (тип + строковая нагрузка), fire-and-forget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Хэндл эксперта-отправителя
    pub handle: i32,
    /// Тип события (семантику задаёт протокол бэкенда)
    pub event_type: i32,
    /// Полезная нагрузка
    pub payload: String,
}

/// Ответ эксперта на команду.
///
/// Каналы значения и ошибки независимы: ответ с ненулевым `error_code`
/// всё равно несёт полезную нагрузку, если она есть.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Полезная нагрузка; `None` — void-ответ
    pub value: Option<TypedValue>,
    /// 0 — успех
    pub error_code: i32,
    /// Диагностика при ненулевом коде
    pub error_message: Option<String>,
}

impl Response {
    /// Успешный ответ со значением.
    pub fn ok(value: TypedValue) -> Self {
        Self {
            value: Some(value),
            error_code: 0,
            error_message: None,
        }
    }

    /// Void-ответ без значения.
    pub fn void() -> Self {
        Self {
            value: None,
            error_code: 0,
            error_message: None,
        }
    }

    /// Ответ-ошибка; сообщение уходит и как строковая нагрузка.
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            value: Some(TypedValue::Str(message.clone())),
            error_code: code,
            error_message: Some(message),
        }
    }
}

/// Исходящий трафик сессии в сторону бэкенда.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundMessage {
    /// котировка
    Quote(Quote),
    /// событие
    Event(Event),
    /// ответ на команду
    Response {
        /// хэндл эксперта, отвечающего на команду
        handle: i32,
        /// сам ответ
        response: Response,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_keeps_both_channels() {
        let r = Response::error(134, "not enough money");

        assert_eq!(r.error_code, 134);
        assert_eq!(r.error_message.as_deref(), Some("not enough money"));
        // нагрузка не теряется
        assert_eq!(r.value, Some(TypedValue::Str("not enough money".into())));
    }

    #[test]
    fn void_response_has_no_value_and_no_error() {
        let r = Response::void();
        assert_eq!(r.value, None);
        assert_eq!(r.error_code, 0);
        assert_eq!(r.error_message, None);
    }
}
