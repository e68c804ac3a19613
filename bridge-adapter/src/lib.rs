//! # bridge-adapter
//!
//! Потокобезопасный реестр сессий экспертов и мост команда/ответ до бэкенда.
//!
//! Структура:
//!
//! - [`registry`] — директория "хэндл -> сессия", единая точка входа
//! - [`boundary`] — fail-soft операции для терминала (флаг + буфер сообщения)
//! - [`config`] — конфигурация и политики strict/lenient
//! - `connection` — соединения по портам: ограниченный канал, writer-поток,
//!   refcount-арена; транспортные seam'ы [`Transport`] / [`TransportFactory`]
//! - [`tcp`] — TCP-транспорт по умолчанию
//!
//! Реестр создаётся явно и передаётся по `Arc`:
//!
//! ```rust,no_run
//! use bridge_adapter::{AdapterConfig, Registry, TcpTransportFactory};
//! use bridge_core::TerminalVariant;
//!
//! let registry = Registry::new(
//!     AdapterConfig::default(),
//!     Box::new(TcpTransportFactory::default()),
//! );
//!
//! registry
//!     .attach(1, 5000, "EURUSD", 1.1000, 1.1002, TerminalVariant::Mt5, false)
//!     .unwrap();
//! registry.push_quote(1, "EURUSD", 1.1010, 1.1012).unwrap();
//! registry.detach(1).unwrap();
//! ```

/// Fail-soft граница для терминала.
pub mod boundary;

/// Конфигурация адаптера и политики.
pub mod config;

/// Реестр сессий.
pub mod registry;

/// TCP-транспорт по умолчанию.
pub mod tcp;

mod connection;
mod session;

#[cfg(test)]
pub(crate) mod testutil;

// --- Re-exports (публичный фасад API) ---

pub use crate::config::{AdapterConfig, NullPolicy, RedeliveryPolicy};
pub use crate::connection::{CommandSink, Transport, TransportFactory};
pub use crate::registry::Registry;
pub use crate::tcp::TcpTransportFactory;
