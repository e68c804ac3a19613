//! Точка входа `bridge-backend`.
//!
//! Жизненный цикл:
//! - парсинг CLI
//! - accept loop на bind-адресе, по потоку на подключение терминала
//! - логирование входящих котировок/событий/ответов
//! - опциональная синтетическая команда после первой котировки
//! - корректная остановка по `Ctrl+C`

mod cli;
mod serve;

use std::sync::{Arc, atomic::AtomicBool, atomic::Ordering};

use clap::Parser;
use log::info;

fn main() -> anyhow::Result<()> {
    // Логи через RUST_LOG=info/trace
    env_logger::init();

    let shutdown = Arc::new(AtomicBool::new(false));

    // Ctrl+C => ставим shutdown=true
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
            info!("shutting down...");
        })?;
    }

    let args = cli::Args::parse();

    info!(
        "Starting bridge-backend: bind={}, command_type={:?}",
        args.bind, args.command_type
    );

    serve::run_listener(args.bind, args.command_type, shutdown)
}
