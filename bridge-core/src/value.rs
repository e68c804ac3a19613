use serde::{Deserialize, Serialize};
use std::fmt;

/// Один OHLC-бар, присланный бэкендом. Никогда не мутируется.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcRate {
    /// Начало периода, epoch seconds
    pub time: i64,
    /// Цена открытия
    pub open: f64,
    /// Максимум периода
    pub high: f64,
    /// Минимум периода
    pub low: f64,
    /// Цена закрытия
    pub close: f64,
    /// Тиковый объём
    pub tick_volume: i64,
    /// Спред
    pub spread: i32,
    /// Реальный объём
    pub real_volume: i64,
}

/// Тег типа для [`TypedValue`]; используется в сообщениях об ошибках.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    /// отсутствующее значение
    Null,
    /// i32
    Int32,
    /// i64
    Int64,
    /// u64
    UInt64,
    /// f64
    Double,
    /// bool
    Bool,
    /// строка
    Str,
    /// массив i32
    Int32Array,
    /// массив i64
    Int64Array,
    /// массив f64
    DoubleArray,
    /// массив OHLC-баров
    RatesArray,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Null => "null",
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::UInt64 => "uint64",
            ValueKind::Double => "double",
            ValueKind::Bool => "bool",
            ValueKind::Str => "string",
            ValueKind::Int32Array => "int32[]",
            ValueKind::Int64Array => "int64[]",
            ValueKind::DoubleArray => "double[]",
            ValueKind::RatesArray => "rates[]",
        };
        f.write_str(s)
    }
}

/// Размеченное объединение: параметры команд и полезная нагрузка ответов.
///
/// `Null` моделирует отсутствующее именованное значение со стороны бэкенда;
/// геттеры его никогда не возвращают (см. [`FromValue::null_default`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    /// отсутствующее значение (только в named-параметрах)
    Null,
    /// i32
    Int32(i32),
    /// i64
    Int64(i64),
    /// u64
    UInt64(u64),
    /// f64
    Double(f64),
    /// bool
    Bool(bool),
    /// строка
    Str(String),
    /// массив i32
    Int32Array(Vec<i32>),
    /// массив i64
    Int64Array(Vec<i64>),
    /// массив f64
    DoubleArray(Vec<f64>),
    /// массив OHLC-баров
    RatesArray(Vec<OhlcRate>),
}

impl TypedValue {
    /// Тег типа хранимого значения.
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::Null => ValueKind::Null,
            TypedValue::Int32(_) => ValueKind::Int32,
            TypedValue::Int64(_) => ValueKind::Int64,
            TypedValue::UInt64(_) => ValueKind::UInt64,
            TypedValue::Double(_) => ValueKind::Double,
            TypedValue::Bool(_) => ValueKind::Bool,
            TypedValue::Str(_) => ValueKind::Str,
            TypedValue::Int32Array(_) => ValueKind::Int32Array,
            TypedValue::Int64Array(_) => ValueKind::Int64Array,
            TypedValue::DoubleArray(_) => ValueKind::DoubleArray,
            TypedValue::RatesArray(_) => ValueKind::RatesArray,
        }
    }

    /// Хранится ли здесь `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }
}

/// Извлечение конкретного типа из [`TypedValue`].
///
/// Проверка строгая: геттер сверяет тег и не делает неявных приведений.
pub trait FromValue: Sized {
    /// Тег, который обязан нести [`TypedValue`] для этого типа.
    const KIND: ValueKind;

    /// `Some(..)`, если тег совпал.
    fn from_value(v: &TypedValue) -> Option<Self>;

    /// Нулевой эквивалент для `Null` в lenient-режиме;
    /// `None` — у типа нет такого дефолта (массивы).
    fn null_default() -> Option<Self> {
        None
    }
}

impl FromValue for i32 {
    const KIND: ValueKind = ValueKind::Int32;

    fn from_value(v: &TypedValue) -> Option<Self> {
        match v {
            TypedValue::Int32(x) => Some(*x),
            _ => None,
        }
    }

    fn null_default() -> Option<Self> {
        Some(0)
    }
}

impl FromValue for i64 {
    const KIND: ValueKind = ValueKind::Int64;

    fn from_value(v: &TypedValue) -> Option<Self> {
        match v {
            TypedValue::Int64(x) => Some(*x),
            _ => None,
        }
    }

    fn null_default() -> Option<Self> {
        Some(0)
    }
}

impl FromValue for u64 {
    const KIND: ValueKind = ValueKind::UInt64;

    fn from_value(v: &TypedValue) -> Option<Self> {
        match v {
            TypedValue::UInt64(x) => Some(*x),
            _ => None,
        }
    }

    fn null_default() -> Option<Self> {
        Some(0)
    }
}

impl FromValue for f64 {
    const KIND: ValueKind = ValueKind::Double;

    fn from_value(v: &TypedValue) -> Option<Self> {
        match v {
            TypedValue::Double(x) => Some(*x),
            _ => None,
        }
    }

    fn null_default() -> Option<Self> {
        Some(0.0)
    }
}

impl FromValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn from_value(v: &TypedValue) -> Option<Self> {
        match v {
            TypedValue::Bool(x) => Some(*x),
            _ => None,
        }
    }

    fn null_default() -> Option<Self> {
        Some(false)
    }
}

impl FromValue for String {
    const KIND: ValueKind = ValueKind::Str;

    fn from_value(v: &TypedValue) -> Option<Self> {
        match v {
            TypedValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    // null-строка читается как пустая, не как ошибка
    fn null_default() -> Option<Self> {
        Some(String::new())
    }
}

impl FromValue for Vec<i32> {
    const KIND: ValueKind = ValueKind::Int32Array;

    fn from_value(v: &TypedValue) -> Option<Self> {
        match v {
            TypedValue::Int32Array(xs) => Some(xs.clone()),
            _ => None,
        }
    }
}

impl FromValue for Vec<i64> {
    const KIND: ValueKind = ValueKind::Int64Array;

    fn from_value(v: &TypedValue) -> Option<Self> {
        match v {
            TypedValue::Int64Array(xs) => Some(xs.clone()),
            _ => None,
        }
    }
}

impl FromValue for Vec<f64> {
    const KIND: ValueKind = ValueKind::DoubleArray;

    fn from_value(v: &TypedValue) -> Option<Self> {
        match v {
            TypedValue::DoubleArray(xs) => Some(xs.clone()),
            _ => None,
        }
    }
}

impl FromValue for Vec<OhlcRate> {
    const KIND: ValueKind = ValueKind::RatesArray;

    fn from_value(v: &TypedValue) -> Option<Self> {
        match v {
            TypedValue::RatesArray(xs) => Some(xs.clone()),
            _ => None,
        }
    }
}
