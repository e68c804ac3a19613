use anyhow::Context;
use log::{info, warn};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, atomic::AtomicBool, atomic::Ordering};
use std::thread;
use std::time::Duration;

use bridge_core::Command;
use bridge_core::wire::{PacketV1, read_frame, write_frame};

const READ_TICK: Duration = Duration::from_millis(200);

// accept loop: по потоку на подключение терминала
pub(crate) fn run_listener(
    bind: SocketAddr,
    command_type: Option<i32>,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).with_context(|| format!("bind listener {bind}"))?;
    listener
        .set_nonblocking(true)
        .context("listener.set_nonblocking(true)")?;

    info!("listening on {bind}");

    let mut conn_handles = Vec::new();

    loop {
        reap_finished_conns(&mut conn_handles);

        if shutdown.load(Ordering::Relaxed) {
            info!("shutting down listener");
            break;
        }

        match listener.accept() {
            Ok((stream, addr)) => {
                info!("terminal connected from {addr}");
                stream
                    .set_nonblocking(false)
                    .context("stream.set_nonblocking(false)")?;

                let shutdown = shutdown.clone();
                let h = thread::spawn(move || {
                    if let Err(e) = handle_conn(stream, command_type, shutdown) {
                        warn!("handle_conn error: {e}");
                    }
                });
                conn_handles.push(h);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // нет новых соединений прямо сейчас
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                warn!("accept error: {e}");
                thread::sleep(Duration::from_millis(50));
            }
        }
    }

    for h in conn_handles {
        if let Err(panic) = h.join() {
            warn!("connection thread panicked: {:?}", panic);
        }
    }

    Ok(())
}

fn reap_finished_conns(handles: &mut Vec<thread::JoinHandle<()>>) {
    let mut i = 0;
    while i < handles.len() {
        if handles[i].is_finished() {
            let h = handles.swap_remove(i);
            if let Err(panic) = h.join() {
                warn!("connection thread panicked: {:?}", panic);
            }
        } else {
            i += 1;
        }
    }
}

pub(crate) fn handle_conn(
    mut stream: TcpStream,
    command_type: Option<i32>,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    stream.set_read_timeout(Some(READ_TICK)).ok();

    // команду шлём один раз, после первой котировки
    let mut command_sent = false;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match read_frame(&mut stream) {
            Ok(PacketV1::Quote(q)) => {
                info!("quote: {q}");

                if let Some(cmd_type) = command_type {
                    if !command_sent {
                        let pkt = PacketV1::Command {
                            handle: q.handle,
                            command: Command::new(cmd_type),
                        };
                        write_frame(&mut stream, &pkt)?;
                        info!("sent command type {cmd_type} to handle {}", q.handle);
                        command_sent = true;
                    }
                }
            }
            Ok(PacketV1::Event(e)) => {
                info!("event: handle={} type={} payload={}", e.handle, e.event_type, e.payload);
            }
            Ok(PacketV1::Response { handle, response }) => {
                info!(
                    "response: handle={handle} error_code={} value={:?}",
                    response.error_code, response.value
                );
            }
            Ok(PacketV1::Command { .. }) => {
                warn!("terminal is not supposed to send commands");
            }
            Err(bridge_core::WireError::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // ничего, просто тик
            }
            Err(bridge_core::WireError::Io(e)) => {
                info!("terminal disconnected: {e}");
                break;
            }
            Err(e) => {
                warn!("bad frame from terminal: {e}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::Quote;
    use std::net::{TcpListener, TcpStream};

    fn connect_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        (client, server)
    }

    fn mk_quote_packet() -> PacketV1 {
        PacketV1::Quote(Quote {
            handle: 1,
            symbol: "EURUSD".to_string(),
            bid: 1.1000,
            ask: 1.1002,
        })
    }

    #[test]
    fn handle_conn_exits_on_client_eof() {
        let (mut client, server) = connect_pair();

        write_frame(&mut client, &mk_quote_packet()).unwrap();
        drop(client); // EOF

        let shutdown = Arc::new(AtomicBool::new(false));
        handle_conn(server, None, shutdown).unwrap();
    }

    #[test]
    fn handle_conn_exits_fast_on_shutdown() {
        let (_client, server) = connect_pair();

        let shutdown = Arc::new(AtomicBool::new(true));
        handle_conn(server, None, shutdown).unwrap();
    }

    #[test]
    fn quote_triggers_synthetic_command_once() {
        let (mut client, server) = connect_pair();

        let shutdown = Arc::new(AtomicBool::new(false));
        let h = thread::spawn(move || handle_conn(server, Some(7), shutdown));

        write_frame(&mut client, &mk_quote_packet()).unwrap();
        write_frame(&mut client, &mk_quote_packet()).unwrap();

        // в ответ приходит ровно одна команда
        let got = read_frame(&mut client).unwrap();
        match got {
            PacketV1::Command { handle, command } => {
                assert_eq!(handle, 1);
                assert_eq!(command.command_type, 7);
            }
            other => panic!("expected Command, got {other:?}"),
        }

        drop(client);
        h.join().unwrap().unwrap();
    }
}
