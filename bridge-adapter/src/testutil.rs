//! Тестовые дублёры бэкенда: in-memory транспорт со счётчиком живых
//! соединений и ручной доставкой входящих команд.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bridge_core::{Command, OutboundMessage};

use crate::connection::{CommandSink, Connection, Transport, TransportFactory};

#[derive(Default)]
struct MockState {
    connects: AtomicUsize,
    live: AtomicUsize,
    block: AtomicBool,
    connect_delay_ms: AtomicU64,
    sent: Mutex<Vec<(u16, OutboundMessage)>>,
    sinks: Mutex<HashMap<u16, CommandSink>>,
}

/// Дублёр бэкенда для тестов реестра/соединений.
#[derive(Clone)]
pub(crate) struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
        }
    }

    /// Фабрика для реестра/пула.
    pub(crate) fn factory(&self) -> MockFactory {
        MockFactory {
            state: self.state.clone(),
        }
    }

    /// Sink-заглушка для тестов пула без реестра.
    pub(crate) fn null_sink(&self) -> CommandSink {
        Arc::new(|_, _, _| {})
    }

    /// Соединение напрямую, мимо пула (для тестов сессии/соединения).
    pub(crate) fn connect(&self, port: u16) -> Arc<Connection> {
        self.connect_with(port, 256, Duration::from_secs(5))
    }

    pub(crate) fn connect_with(
        &self,
        port: u16,
        capacity: usize,
        send_timeout: Duration,
    ) -> Arc<Connection> {
        let transport = self
            .factory()
            .connect(port, self.null_sink())
            .expect("mock connect cannot fail");
        Arc::new(Connection::start(port, transport, capacity, send_timeout))
    }

    /// Сколько раз вызывался connect.
    pub(crate) fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Сколько транспортов живо сейчас.
    pub(crate) fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    /// Блокирует/разблокирует транспорт (для теста таймаута отправки).
    pub(crate) fn set_block(&self, block: bool) {
        self.state.block.store(block, Ordering::SeqCst);
    }

    /// Задержка каждого последующего connect ("медленный бэкенд").
    pub(crate) fn set_connect_delay(&self, delay: Duration) {
        self.state
            .connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Снимок отправленного трафика.
    pub(crate) fn sent(&self) -> Vec<(u16, OutboundMessage)> {
        match self.state.sent.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Ждёт, пока наберётся `n` отправленных сообщений.
    pub(crate) fn wait_sent(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.sent().len() >= n {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Имитация входящей команды от бэкенда через sink соединения.
    pub(crate) fn push_command(&self, port: u16, handle: i32, command: Command) {
        let sink = {
            let sinks = match self.state.sinks.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            sinks.get(&port).cloned()
        };

        match sink {
            Some(sink) => sink(port, handle, command),
            None => panic!("no transport connected on port {port}"),
        }
    }
}

#[derive(Clone)]
pub(crate) struct MockFactory {
    state: Arc<MockState>,
}

impl TransportFactory for MockFactory {
    fn connect(&self, port: u16, sink: CommandSink) -> io::Result<Box<dyn Transport>> {
        let delay = self.state.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }

        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.live.fetch_add(1, Ordering::SeqCst);

        {
            let mut sinks = match self.state.sinks.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            sinks.insert(port, sink);
        }

        Ok(Box::new(MockTransport {
            port,
            state: self.state.clone(),
        }))
    }
}

struct MockTransport {
    port: u16,
    state: Arc<MockState>,
}

impl Transport for MockTransport {
    fn send(&mut self, msg: &OutboundMessage) -> io::Result<()> {
        // "завис" бэкенд: держим writer, пока тест не разблокирует
        while self.state.block.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(5));
        }

        let mut sent = match self.state.sent.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.push((self.port, msg.clone()));
        Ok(())
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
    }
}
