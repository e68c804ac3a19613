use log::{debug, info, warn};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bridge_core::{
    BridgeError, Command, Event, FromValue, OutboundMessage, Quote, Response, TerminalVariant,
};

use crate::config::AdapterConfig;
use crate::connection::{CommandSink, ConnectionPool, TransportFactory};
use crate::session::Session;

/// Директория сессий "хэндл -> сессия" и единая точка входа всех операций.
///
/// Создаётся явно (`Registry::new`) и передаётся по общей ссылке в слой,
/// который выставляет операции наружу; никакого глобального синглтона.
/// Все операции синхронны и потокобезопасны; ошибка бэкенда никогда
/// не валит и надолго не блокирует вызывающий поток терминала.
pub struct Registry {
    config: AdapterConfig,
    sessions: Mutex<HashMap<i32, Arc<Session>>>,
    pool: ConnectionPool,
    sink: CommandSink,
}

impl Registry {
    /// Создаёт реестр поверх фабрики транспортов.
    ///
    /// Sink входящих команд держит только `Weak` на реестр,
    /// поэтому живые транспорты не мешают реестру умереть.
    pub fn new(config: AdapterConfig, factory: Box<dyn TransportFactory>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Registry>| {
            let weak = weak.clone();
            let sink: CommandSink = Arc::new(move |port, handle, command| {
                match weak.upgrade() {
                    Some(registry) => {
                        if let Err(e) = registry.deliver_command(port, handle, command) {
                            warn!("inbound command dropped: {e}");
                        }
                    }
                    None => {
                        warn!("inbound command after registry drop: port={port} handle={handle}");
                    }
                }
            });

            let pool = ConnectionPool::new(factory, config.channel_capacity, config.send_timeout);

            Registry {
                config,
                sessions: Mutex::new(HashMap::new()),
                pool,
                sink,
            }
        })
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<i32, Arc<Session>>> {
        match self.sessions.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(), // продолжаем, несмотря на poison
        }
    }

    fn session(&self, handle: i32) -> Result<Arc<Session>, BridgeError> {
        self.sessions()
            .get(&handle)
            .cloned()
            .ok_or(BridgeError::SessionNotFound(handle))
    }

    /// Регистрирует эксперта и привязывает его к соединению порта.
    ///
    /// Соединение создаётся при первом использовании порта и шарится
    /// всеми сессиями на нём. TCP connect может длиться секунды, поэтому
    /// блокировка карты сессий на время acquire не держится: остальные
    /// хэндлы продолжают работать. Проигравший гонку конкурентный attach
    /// на тот же хэндл получает `DuplicateHandle`.
    #[allow(clippy::too_many_arguments)]
    pub fn attach(
        &self,
        handle: i32,
        port: u16,
        symbol: &str,
        bid: f64,
        ask: f64,
        variant: TerminalVariant,
        test_mode: bool,
    ) -> Result<(), BridgeError> {
        if self.sessions().contains_key(&handle) {
            return Err(BridgeError::DuplicateHandle(handle));
        }

        // соединение открывается вне блокировки карты сессий
        let conn = self.pool.acquire(port, self.sink.clone())?;

        let session = Arc::new(Session::new(
            handle,
            port,
            symbol.to_string(),
            bid,
            ask,
            variant,
            test_mode,
            conn,
        ));

        let mut sessions = self.sessions();
        match sessions.entry(handle) {
            Entry::Occupied(_) => {
                // конкурент успел первым; отпускаем только что взятую ссылку
                drop(sessions);
                self.pool.release(port);
                Err(BridgeError::DuplicateHandle(handle))
            }
            Entry::Vacant(v) => {
                info!("attach: {session}");
                v.insert(session);
                Ok(())
            }
        }
    }

    /// Снимает эксперта с учёта и отпускает соединение его порта.
    ///
    /// Повторный вызов — `SessionNotFound`, не паника.
    pub fn detach(&self, handle: i32) -> Result<(), BridgeError> {
        let session = self
            .sessions()
            .remove(&handle)
            .ok_or(BridgeError::SessionNotFound(handle))?;

        info!("detach: {session}");
        self.pool.release(session.port());
        Ok(())
    }

    /// Обновляет котировку сессии и пересылает её на бэкенд.
    ///
    /// Поля сессии обновляются до отправки: медленный бэкенд даёт
    /// ошибку таймаута, но не теряет последние bid/ask.
    pub fn push_quote(
        &self,
        handle: i32,
        symbol: &str,
        bid: f64,
        ask: f64,
    ) -> Result<(), BridgeError> {
        let session = self.session(handle)?;

        session.update_quote(symbol, bid, ask);
        debug!("push_quote: handle={handle} {symbol} bid={bid} ask={ask}");

        session.connection().send(OutboundMessage::Quote(Quote {
            handle,
            symbol: symbol.to_string(),
            bid,
            ask,
        }))
    }

    /// Пересылает событие на бэкенд; подтверждения не ждёт.
    pub fn push_event(&self, handle: i32, event_type: i32, payload: &str) -> Result<(), BridgeError> {
        let session = self.session(handle)?;

        debug!("push_event: handle={handle} event_type={event_type}");

        session.connection().send(OutboundMessage::Event(Event {
            handle,
            event_type,
            payload: payload.to_string(),
        }))
    }

    /// Отправляет ответ на ожидающую команду и очищает pending-слот.
    ///
    /// Если ожидающей команды нет, ответ всё равно уходит (см. DESIGN.md).
    pub fn send_response(&self, handle: i32, response: Response) -> Result<(), BridgeError> {
        let session = self.session(handle)?;

        if session.take_pending().is_none() {
            debug!("send_response: no pending command for handle {handle}");
        }

        session
            .connection()
            .send(OutboundMessage::Response { handle, response })
    }

    /// Тип ожидающей команды; чтение команду не потребляет.
    pub fn command_type(&self, handle: i32) -> Result<i32, BridgeError> {
        self.session(handle)?.command_type()
    }

    /// Позиционный параметр ожидающей команды, строго типизированный.
    pub fn positional<T: FromValue>(&self, handle: i32, index: usize) -> Result<T, BridgeError> {
        self.session(handle)?.positional::<T>(index)
    }

    /// Есть ли у ожидающей команды именованный параметр `name`.
    pub fn contains_named(&self, handle: i32, name: &str) -> Result<bool, BridgeError> {
        Ok(self.session(handle)?.contains_named(name))
    }

    /// Именованный параметр ожидающей команды, строго типизированный.
    pub fn named<T: FromValue>(&self, handle: i32, name: &str) -> Result<T, BridgeError> {
        self.session(handle)?.named::<T>(name, self.config.null_named)
    }

    /// Входящая доставка команды от соединения порта `port`.
    ///
    /// Хэндл должен быть привязан именно к этому порту; непрочитанная
    /// команда вытесняется или отклоняется по политике redelivery.
    pub fn deliver_command(
        &self,
        port: u16,
        handle: i32,
        command: Command,
    ) -> Result<(), BridgeError> {
        let session = self.session(handle)?;

        if session.port() != port {
            // чужой порт не может адресовать эту сессию
            return Err(BridgeError::SessionNotFound(handle));
        }

        debug!("deliver_command: handle={handle} {command}");
        session.install_command(command, self.config.redelivery)
    }
}
