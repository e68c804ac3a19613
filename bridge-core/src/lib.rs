//! # bridge-core
//!
//! Базовые типы и протокол моста "эксперт в терминале <-> бэкенд".
//!
//! Этот крейт содержит:
//!
//! - [`value`] — размеченное объединение [`TypedValue`] и извлечение типов
//! - [`command`] — команда бэкенда с позиционными и именованными параметрами
//! - [`message`] — котировки, события, ответы
//! - [`wire`] — компактный wire-формат (версия + бинарный payload + framing)
//! - [`error`] — таксономия ошибок моста
//!
//! ## Быстрый пример: чтение параметра команды
//!
//! ```rust
//! use bridge_core::{Command, FromValue, TypedValue};
//!
//! let cmd = Command::new(7)
//!     .with_positional(TypedValue::Int32(42))
//!     .with_named("symbol", TypedValue::Str("EURUSD".into()));
//!
//! assert_eq!(i32::from_value(&cmd.positional[0]), Some(42));
//! // несовпадение тега -> None, никаких неявных приведений
//! assert_eq!(f64::from_value(&cmd.positional[0]), None);
//! ```
//!
//! ## Пример: wire-формат
//!
//! ```rust
//! use bridge_core::wire::{encode_v1, decode, PacketV1};
//! use bridge_core::Quote;
//!
//! let pkt = PacketV1::Quote(Quote {
//!     handle: 1,
//!     symbol: "EURUSD".to_string(),
//!     bid: 1.1000,
//!     ask: 1.1002,
//! });
//!
//! let bytes = encode_v1(&pkt).unwrap();
//! let decoded = decode(&bytes).unwrap();
//! assert_eq!(decoded, pkt);
//! ```
//!
//! ## Дизайн
//!
//! `bridge-core` — "нулевая" зависимость для всех частей системы: адаптера,
//! бэкенда, тестов. Здесь только чистые типы, сериализация и ошибки,
//! без потоков, каналов и I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Размеченное объединение значений и извлечение типов.
pub mod value;

/// Команда бэкенда.
pub mod command;

/// Котировки, события, ответы.
pub mod message;

/// Wire-уровень (сериализация + framing).
pub mod wire;

/// Ошибки моста.
pub mod error;

// --- Re-exports (публичный фасад API) ---

pub use crate::command::Command;
pub use crate::error::{BridgeError, WireError};
pub use crate::message::{Event, OutboundMessage, Quote, Response, TerminalVariant};
pub use crate::value::{FromValue, OhlcRate, TypedValue, ValueKind};
