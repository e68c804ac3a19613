use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use bridge_core::{BridgeError, Command, FromValue, TerminalVariant, TypedValue};

use crate::config::{NullPolicy, RedeliveryPolicy};
use crate::connection::Connection;

/// Состояние одного подключённого эксперта.
///
/// Сессия принадлежит реестру; наружу не отдаётся ни одна ссылка на её
/// внутренности, только копии значений. Внутренний мьютекс держится только
/// на время обновления полей, никогда поверх вызова транспорта.
pub(crate) struct Session {
    handle: i32,
    port: u16,
    variant: TerminalVariant,
    test_mode: bool,
    connection: Arc<Connection>,
    state: Mutex<SessionState>,
}

struct SessionState {
    symbol: String,
    bid: f64,
    ask: f64,
    pending: Option<Command>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        handle: i32,
        port: u16,
        symbol: String,
        bid: f64,
        ask: f64,
        variant: TerminalVariant,
        test_mode: bool,
        connection: Arc<Connection>,
    ) -> Self {
        Self {
            handle,
            port,
            variant,
            test_mode,
            connection,
            state: Mutex::new(SessionState {
                symbol,
                bid,
                ask,
                pending: None,
            }),
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(), // продолжаем, несмотря на poison
        }
    }

    /// Обновляет последние известные symbol/bid/ask.
    pub(crate) fn update_quote(&self, symbol: &str, bid: f64, ask: f64) {
        let mut st = self.state();
        st.symbol = symbol.to_string();
        st.bid = bid;
        st.ask = ask;
    }

    /// Копия последней котировки (symbol, bid, ask).
    pub(crate) fn quote(&self) -> (String, f64, f64) {
        let st = self.state();
        (st.symbol.clone(), st.bid, st.ask)
    }

    /// Устанавливает ожидающую команду.
    ///
    /// При `Replace` непрочитанная команда молча вытесняется,
    /// при `Reject` повторная доставка — ошибка.
    pub(crate) fn install_command(
        &self,
        command: Command,
        policy: RedeliveryPolicy,
    ) -> Result<(), BridgeError> {
        let mut st = self.state();

        if st.pending.is_some() && policy == RedeliveryPolicy::Reject {
            return Err(BridgeError::CommandPending(self.handle));
        }

        st.pending = Some(command);
        Ok(())
    }

    /// Забирает ожидающую команду (вызывается при отправке ответа).
    pub(crate) fn take_pending(&self) -> Option<Command> {
        self.state().pending.take()
    }

    /// Тип ожидающей команды; чтение не потребляет команду.
    pub(crate) fn command_type(&self) -> Result<i32, BridgeError> {
        let st = self.state();
        st.pending
            .as_ref()
            .map(|c| c.command_type)
            .ok_or(BridgeError::NoPendingCommand)
    }

    /// Позиционный параметр ожидающей команды.
    pub(crate) fn positional<T: FromValue>(&self, index: usize) -> Result<T, BridgeError> {
        let st = self.state();
        let cmd = st.pending.as_ref().ok_or(BridgeError::NoPendingCommand)?;

        let count = cmd.positional.len();
        let v = cmd
            .positional
            .get(index)
            .ok_or(BridgeError::IndexOutOfRange { index, count })?;

        extract::<T>(v)
    }

    /// Есть ли именованный параметр; без ожидающей команды — `false`.
    pub(crate) fn contains_named(&self, name: &str) -> bool {
        let st = self.state();
        match st.pending.as_ref() {
            Some(cmd) => cmd.named.contains_key(name),
            None => false,
        }
    }

    /// Именованный параметр ожидающей команды.
    ///
    /// `Null` при `ZeroDefault` читается как нулевой эквивалент типа
    /// (если он у типа есть), при `Strict` — это `TypeMismatch`.
    pub(crate) fn named<T: FromValue>(
        &self,
        name: &str,
        policy: NullPolicy,
    ) -> Result<T, BridgeError> {
        let st = self.state();
        let cmd = st.pending.as_ref().ok_or(BridgeError::NoPendingCommand)?;

        let v = cmd
            .named
            .get(name)
            .ok_or_else(|| BridgeError::NameNotFound(name.to_string()))?;

        if v.is_null() && policy == NullPolicy::ZeroDefault {
            if let Some(d) = T::null_default() {
                return Ok(d);
            }
        }

        extract::<T>(v)
    }
}

fn extract<T: FromValue>(v: &TypedValue) -> Result<T, BridgeError> {
    T::from_value(v).ok_or(BridgeError::TypeMismatch {
        expected: T::KIND,
        actual: v.kind(),
    })
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (symbol, bid, ask) = self.quote();
        write!(
            f,
            "handle={} port={} variant={} test_mode={} symbol={} bid={} ask={}",
            self.handle, self.port, self.variant, self.test_mode, symbol, bid, ask
        )
    }
}
