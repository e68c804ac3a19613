use clap::Parser;
use std::net::SocketAddr;

/// Stub-бэкенд: принимает подключения терминала, логирует котировки,
/// события и ответы; умеет отправить эксперту синтетическую команду.
#[derive(Parser, Debug, Clone)]
#[command(name = "bridge-backend", version, about)]
pub(crate) struct Args {
    /// TCP bind address, например 0.0.0.0:5000
    #[arg(long, default_value = "0.0.0.0:5000")]
    pub(crate) bind: SocketAddr,

    /// Отправить эксперту команду этого типа после первой котировки от него
    #[arg(long)]
    pub(crate) command_type: Option<i32>,
}
