use std::time::Duration;

/// Политика повторной доставки команды при непрочитанной предыдущей.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedeliveryPolicy {
    /// Новая команда молча вытесняет непрочитанную.
    #[default]
    Replace,
    /// Повторная доставка отклоняется с `CommandPending`.
    Reject,
}

/// Политика чтения `Null` в именованных параметрах.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullPolicy {
    /// `Null` читается как нулевой эквивалент типа.
    #[default]
    ZeroDefault,
    /// `Null` — это `TypeMismatch`.
    Strict,
}

/// Конфигурация адаптера.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Таймаут постановки исходящего сообщения в канал соединения.
    /// Медленный бэкенд деградирует в ошибку, а не вешает поток терминала.
    pub send_timeout: Duration,
    /// Ёмкость исходящего канала на соединение.
    pub channel_capacity: usize,
    /// Политика redelivery команд.
    pub redelivery: RedeliveryPolicy,
    /// Политика чтения `Null` в именованных параметрах.
    pub null_named: NullPolicy,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            channel_capacity: 256,
            redelivery: RedeliveryPolicy::default(),
            null_named: NullPolicy::default(),
        }
    }
}

/// Тик writer-потока соединения: период проверки shutdown-флага.
pub(crate) const WRITER_TICK: Duration = Duration::from_millis(10);

/// Подряд идущие ошибки транспорта, после которых writer останавливается.
pub(crate) const BACK_TO_BACK_SEND_ERR_LIMIT: usize = 20;
