//! TCP-транспорт по умолчанию: wire-формат `bridge-core` поверх
//! length-prefixed фреймов. Writer живёт в потоке соединения,
//! reader-поток разбирает входящие команды бэкенда и отдаёт их в sink.

use log::{info, warn};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use bridge_core::wire::{PacketV1, read_frame, write_frame};
use bridge_core::{OutboundMessage, WireError};

use crate::connection::{CommandSink, Transport, TransportFactory};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Фабрика TCP-транспортов: порт сессии -> `host:port` бэкенда.
#[derive(Debug, Clone)]
pub struct TcpTransportFactory {
    host: IpAddr,
}

impl TcpTransportFactory {
    /// Фабрика для бэкенда на `host`.
    pub fn new(host: IpAddr) -> Self {
        Self { host }
    }
}

impl Default for TcpTransportFactory {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl TransportFactory for TcpTransportFactory {
    fn connect(&self, port: u16, sink: CommandSink) -> io::Result<Box<dyn Transport>> {
        let addr = SocketAddr::new(self.host, port);
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;

        stream.set_nodelay(true).ok();
        stream.set_write_timeout(Some(WRITE_TIMEOUT)).ok();

        let reader_stream = stream.try_clone()?;
        let shutdown = Arc::new(AtomicBool::new(false));

        let sd = shutdown.clone();
        let reader = thread::spawn(move || run_reader(port, reader_stream, sink, sd));

        info!("tcp: connected to backend {addr}");

        Ok(Box::new(TcpTransport {
            port,
            stream,
            shutdown,
            reader: Some(reader),
        }))
    }
}

struct TcpTransport {
    port: u16,
    stream: TcpStream,
    shutdown: Arc<AtomicBool>,
    reader: Option<thread::JoinHandle<()>>,
}

impl Transport for TcpTransport {
    fn send(&mut self, msg: &OutboundMessage) -> io::Result<()> {
        let pkt = PacketV1::from(msg.clone());
        write_frame(&mut self.stream, &pkt).map_err(wire_to_io)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // shutdown сокета выбивает reader из блокирующего read
        self.stream.shutdown(Shutdown::Both).ok();

        if let Some(h) = self.reader.take() {
            if let Err(panic) = h.join() {
                warn!("tcp reader for port {} panicked: {:?}", self.port, panic);
            }
        }
    }
}

fn wire_to_io(e: WireError) -> io::Error {
    match e {
        WireError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}

fn run_reader(port: u16, mut stream: TcpStream, sink: CommandSink, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match read_frame(&mut stream) {
            Ok(PacketV1::Command { handle, command }) => {
                sink(port, handle, command);
            }
            Ok(other) => {
                // бэкенд не должен слать терминалу исходящие пакеты
                warn!("tcp: unexpected packet from backend on port {port}: {other:?}");
            }
            Err(WireError::Io(e)) => {
                if !shutdown.load(Ordering::Relaxed) {
                    info!("tcp: backend connection on port {port} closed: {e}");
                }
                break;
            }
            Err(e) => {
                // фрейм прочитан целиком, но не разобрался; не валим соединение
                warn!("tcp: bad frame from backend on port {port}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::{Command, Quote, TypedValue};
    use crossbeam_channel::{Receiver, Sender};
    use std::net::TcpListener;

    fn mk_sink() -> (CommandSink, Receiver<(u16, i32, Command)>) {
        let (tx, rx): (Sender<(u16, i32, Command)>, _) = crossbeam_channel::unbounded();
        let sink: CommandSink = Arc::new(move |port, handle, command| {
            tx.send((port, handle, command)).ok();
        });
        (sink, rx)
    }

    #[test]
    fn outbound_messages_arrive_framed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let factory = TcpTransportFactory::default();
        let (sink, _rx) = mk_sink();
        let mut transport = factory.connect(port, sink).unwrap();

        let (mut server, _) = listener.accept().unwrap();

        let msg = OutboundMessage::Quote(Quote {
            handle: 1,
            symbol: "EURUSD".to_string(),
            bid: 1.1000,
            ask: 1.1002,
        });
        transport.send(&msg).unwrap();

        let got = read_frame(&mut server).unwrap();
        assert_eq!(got, PacketV1::from(msg));
    }

    #[test]
    fn inbound_command_frames_reach_the_sink() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let factory = TcpTransportFactory::default();
        let (sink, rx) = mk_sink();
        let _transport = factory.connect(port, sink).unwrap();

        let (mut server, _) = listener.accept().unwrap();

        let cmd = Command::new(7).with_positional(TypedValue::Int32(42));
        write_frame(
            &mut server,
            &PacketV1::Command {
                handle: 1,
                command: cmd.clone(),
            },
        )
        .unwrap();

        let (got_port, got_handle, got_cmd) =
            rx.recv_timeout(Duration::from_secs(2)).expect("command should arrive");
        assert_eq!(got_port, port);
        assert_eq!(got_handle, 1);
        assert_eq!(got_cmd, cmd);
    }

    #[test]
    fn connect_to_dead_port_fails() {
        // резервируем порт и сразу закрываем listener
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let factory = TcpTransportFactory::default();
        let (sink, _rx) = mk_sink();
        assert!(factory.connect(port, sink).is_err());
    }

    #[test]
    fn dropping_transport_stops_reader_thread() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let factory = TcpTransportFactory::default();
        let (sink, _rx) = mk_sink();
        let transport = factory.connect(port, sink).unwrap();
        let (_server, _) = listener.accept().unwrap();

        // Drop join-ит reader; зависание здесь завалило бы тест по таймауту
        drop(transport);
    }
}
