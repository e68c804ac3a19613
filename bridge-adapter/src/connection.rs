use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use bridge_core::{BridgeError, Command, OutboundMessage};

use crate::config::{BACK_TO_BACK_SEND_ERR_LIMIT, WRITER_TICK};

/// Callback доставки входящей команды: (port, handle, command).
///
/// Транспорт вызывает его из своего потока; реестр кладёт команду
/// в pending-слот целевой сессии.
pub type CommandSink = Arc<dyn Fn(u16, i32, Command) + Send + Sync>;

/// Транспорт до бэкенда. Wire-формат для ядра непрозрачен.
pub trait Transport: Send {
    /// Доставить одно исходящее сообщение.
    fn send(&mut self, msg: &OutboundMessage) -> io::Result<()>;
}

/// Фабрика транспортов: одно соединение на порт.
pub trait TransportFactory: Send + Sync {
    /// Открыть транспорт к бэкенду на `port`; `sink` получает входящие команды.
    fn connect(&self, port: u16, sink: CommandSink) -> io::Result<Box<dyn Transport>>;
}

/// Одно логическое соединение с бэкендом.
///
/// Исходящий трафик идёт через ограниченный канал в writer-поток;
/// поток терминала блокируется не дольше `send_timeout`.
pub(crate) struct Connection {
    port: u16,
    tx: Sender<OutboundMessage>,
    send_timeout: Duration,
    shutdown: Arc<AtomicBool>,
    writer: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Connection {
    pub(crate) fn start(
        port: u16,
        transport: Box<dyn Transport>,
        capacity: usize,
        send_timeout: Duration,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let shutdown = Arc::new(AtomicBool::new(false));

        let sd = shutdown.clone();
        let writer = thread::spawn(move || run_writer(port, transport, rx, sd));

        Self {
            port,
            tx,
            send_timeout,
            shutdown,
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Ставит сообщение в исходящий канал с ограниченным таймаутом.
    pub(crate) fn send(&self, msg: OutboundMessage) -> Result<(), BridgeError> {
        match self.tx.send_timeout(msg, self.send_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(BridgeError::BackendTimeout(self.port)),
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(BridgeError::BackendUnavailable(self.port))
            }
        }
    }

    /// Останавливает writer-поток. Вызывается пулом на последнем release.
    pub(crate) fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);

        let handle = {
            let mut writer = match self.writer.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            writer.take()
        };

        if let Some(h) = handle {
            if let Err(panic) = h.join() {
                warn!("writer thread for port {} panicked: {:?}", self.port, panic);
            }
        }
    }
}

fn run_writer(
    port: u16,
    mut transport: Box<dyn Transport>,
    rx: Receiver<OutboundMessage>,
    shutdown: Arc<AtomicBool>,
) {
    let mut back_to_back_err_count = 0;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("writer for port {port}: shutting down");
            break;
        }

        // ждём сообщение + роль тика для проверки shutdown
        match rx.recv_timeout(WRITER_TICK) {
            Ok(msg) => match transport.send(&msg) {
                Ok(()) => back_to_back_err_count = 0,
                Err(e) => {
                    warn!("failed to send to backend on port {port}: {e}");
                    back_to_back_err_count += 1;
                    if back_to_back_err_count >= BACK_TO_BACK_SEND_ERR_LIMIT {
                        warn!("writer for port {port}: stopping after {back_to_back_err_count} consecutive errors");
                        break;
                    }
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                // ничего, просто тик
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    // rx дропается здесь; дальнейшие send получат BackendUnavailable
}

struct PoolEntry {
    conn: Arc<Connection>,
    refs: usize,
}

/// Арена соединений по порту с явным acquire/release.
///
/// Соединение создаётся при первом acquire и уничтожается,
/// когда счётчик ссылок падает до нуля.
pub(crate) struct ConnectionPool {
    factory: Box<dyn TransportFactory>,
    capacity: usize,
    send_timeout: Duration,
    entries: Mutex<HashMap<u16, PoolEntry>>,
}

impl ConnectionPool {
    pub(crate) fn new(
        factory: Box<dyn TransportFactory>,
        capacity: usize,
        send_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            capacity,
            send_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u16, PoolEntry>> {
        match self.entries.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(), // продолжаем, несмотря на poison
        }
    }

    pub(crate) fn acquire(
        &self,
        port: u16,
        sink: CommandSink,
    ) -> Result<Arc<Connection>, BridgeError> {
        if port == 0 {
            return Err(BridgeError::InvalidArgument("port must be nonzero".into()));
        }

        {
            let mut entries = self.entries();
            if let Some(entry) = entries.get_mut(&port) {
                entry.refs += 1;
                debug!("pool: port {port} reused, refs = {}", entry.refs);
                return Ok(entry.conn.clone());
            }
        }

        // connect вне блокировки арены: долгий connect одного порта
        // не задерживает acquire/release остальных
        let transport = self.factory.connect(port, sink).map_err(|e| {
            warn!("pool: connect to port {port} failed: {e}");
            BridgeError::BackendUnavailable(port)
        })?;

        let mut entries = self.entries();
        match entries.entry(port) {
            Entry::Occupied(mut e) => {
                // конкурент открыл этот порт первым; наш transport лишний
                let entry = e.get_mut();
                entry.refs += 1;
                debug!("pool: port {port} reused, refs = {}", entry.refs);
                Ok(entry.conn.clone())
            }
            Entry::Vacant(v) => {
                let conn = Arc::new(Connection::start(
                    port,
                    transport,
                    self.capacity,
                    self.send_timeout,
                ));
                info!("pool: connection to port {port} created");

                v.insert(PoolEntry {
                    conn: conn.clone(),
                    refs: 1,
                });
                Ok(conn)
            }
        }
    }

    pub(crate) fn release(&self, port: u16) {
        let dead = {
            let mut entries = self.entries();

            let refs_left = match entries.get_mut(&port) {
                Some(entry) => {
                    entry.refs -= 1;
                    Some(entry.refs)
                }
                None => None,
            };

            match refs_left {
                Some(0) => entries.remove(&port).map(|e| e.conn),
                Some(refs) => {
                    debug!("pool: port {port} released, refs = {refs}");
                    None
                }
                None => {
                    warn!("pool: release for unknown port {port}");
                    None
                }
            }
        };

        // остановка writer-потока вне блокировки арены
        if let Some(conn) = dead {
            conn.stop();
            info!("pool: connection to port {port} destroyed");
        }
    }
}
