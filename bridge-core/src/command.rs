use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::value::TypedValue;

/// Команда, присланная бэкендом эксперту.
///
/// Параметры адресуются позиционно (по индексу) и по имени
/// (ключи уникальны, чувствительны к регистру). Команда читается,
/// но никогда не мутируется на стороне терминала.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Тег типа команды (семантику задаёт протокол бэкенда)
    pub command_type: i32,
    /// Позиционные параметры
    pub positional: Vec<TypedValue>,
    /// Именованные параметры
    pub named: HashMap<String, TypedValue>,
}

impl Command {
    /// Команда без параметров.
    pub fn new(command_type: i32) -> Self {
        Self {
            command_type,
            positional: Vec::new(),
            named: HashMap::new(),
        }
    }

    /// Добавить позиционный параметр (builder для тестов и бэкенда).
    pub fn with_positional(mut self, v: TypedValue) -> Self {
        self.positional.push(v);
        self
    }

    /// Добавить именованный параметр.
    pub fn with_named(mut self, name: impl Into<String>, v: TypedValue) -> Self {
        self.named.insert(name.into(), v);
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command_type={} positional={} named={}",
            self.command_type,
            self.positional.len(),
            self.named.len()
        )
    }
}
