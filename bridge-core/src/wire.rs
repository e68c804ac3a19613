use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::command::Command;
use crate::error::WireError;
use crate::message::{Event, OutboundMessage, Quote, Response};

/// Текущая версия wire-протокола.
pub const WIRE_VERSION: u8 = 1;

/// Максимальный размер фрейма (защита от мусора в length-префиксе).
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Пакет протокола моста (обе стороны используют один enum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PacketV1 {
    /// терминал -> бэкенд: котировка
    Quote(Quote),
    /// терминал -> бэкенд: событие
    Event(Event),
    /// терминал -> бэкенд: ответ на команду
    Response {
        /// хэндл эксперта
        handle: i32,
        /// ответ
        response: Response,
    },
    /// бэкенд -> терминал: команда для эксперта
    Command {
        /// целевой хэндл
        handle: i32,
        /// команда
        command: Command,
    },
}

impl From<OutboundMessage> for PacketV1 {
    fn from(msg: OutboundMessage) -> Self {
        match msg {
            OutboundMessage::Quote(q) => PacketV1::Quote(q),
            OutboundMessage::Event(e) => PacketV1::Event(e),
            OutboundMessage::Response { handle, response } => {
                PacketV1::Response { handle, response }
            }
        }
    }
}

/// Кодирует пакет: байт версии + postcard payload.
pub fn encode_v1(pkt: &PacketV1) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    out.push(WIRE_VERSION);
    out.extend_from_slice(&postcard::to_allocvec(pkt)?);
    Ok(out)
}

/// Декодирует пакет, проверяя версию.
pub fn decode(buf: &[u8]) -> Result<PacketV1, WireError> {
    let (&ver, payload) = buf.split_first().ok_or(WireError::PacketTooShort)?;
    if ver != WIRE_VERSION {
        return Err(WireError::UnsupportedWireVersion(ver));
    }
    Ok(postcard::from_bytes(payload)?)
}

/// Пишет пакет в поток: u32-LE длина + закодированный пакет.
pub fn write_frame<W: Write>(w: &mut W, pkt: &PacketV1) -> Result<(), WireError> {
    let bytes = encode_v1(pkt)?;
    let len = bytes.len() as u32;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&bytes)?;
    w.flush()?;
    Ok(())
}

/// Читает один пакет из потока.
pub fn read_frame<R: Read>(r: &mut R) -> Result<PacketV1, WireError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf);

    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    decode(&buf)
}
