//! Fail-soft граница для терминала.
//!
//! Каждая операция возвращает флаг успеха (1/0 или bool) и на ошибке пишет
//! короткую диагностику в буфер фиксированной ёмкости, который даёт
//! вызывающая сторона. Наружу не уходит ни одна паника и ни один
//! языковой механизм распространения ошибок; каждая транслированная
//! ошибка логируется ровно один раз здесь.

use log::error;
use std::panic::{AssertUnwindSafe, catch_unwind};

use bridge_core::{BridgeError, FromValue, OhlcRate, Response, TerminalVariant, TypedValue};

use crate::registry::Registry;

/// Пишет `msg` в `dst` с усечением по границе UTF-8 символа.
/// Возвращает число записанных байт; переполнение буфера невозможно.
pub fn write_message(dst: &mut [u8], msg: &str) -> usize {
    let mut end = msg.len().min(dst.len());
    while end > 0 && !msg.is_char_boundary(end) {
        end -= 1;
    }
    dst[..end].copy_from_slice(&msg.as_bytes()[..end]);
    end
}

/// Общий контур операции: ошибки и паники превращаются в
/// (значение по умолчанию, сообщение в буфере, запись в лог).
fn execute<T>(
    op: &str,
    err: &mut [u8],
    default: T,
    f: impl FnOnce() -> Result<T, BridgeError>,
) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => {
            error!("{op}: {e}");
            write_message(err, &e.to_string());
            default
        }
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            error!("{op}: internal failure: {msg}");
            write_message(err, &format!("internal failure: {msg}"));
            default
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn checked_port(port: i32) -> Result<u16, BridgeError> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| BridgeError::InvalidArgument(format!("port out of range: {port}")))
}

fn checked_index(index: i32) -> Result<usize, BridgeError> {
    usize::try_from(index)
        .map_err(|_| BridgeError::InvalidArgument(format!("negative parameter index: {index}")))
}

// --- жизненный цикл сессии ---------------------------------------------

/// Регистрация эксперта (init). 1 — успех, 0 — ошибка + сообщение в `err`.
#[allow(clippy::too_many_arguments)]
pub fn init_expert(
    registry: &Registry,
    handle: i32,
    port: i32,
    symbol: &str,
    bid: f64,
    ask: f64,
    variant: TerminalVariant,
    test_mode: bool,
    err: &mut [u8],
) -> i32 {
    execute("init_expert", err, 0, || {
        let port = checked_port(port)?;
        registry.attach(handle, port, symbol, bid, ask, variant, test_mode)?;
        Ok(1)
    })
}

/// Снятие эксперта с учёта (deinit).
pub fn deinit_expert(registry: &Registry, handle: i32, err: &mut [u8]) -> i32 {
    execute("deinit_expert", err, 0, || {
        registry.detach(handle)?;
        Ok(1)
    })
}

// --- исходящая телеметрия ----------------------------------------------

/// Обновление котировки сессии + пересылка на бэкенд.
pub fn update_quote(
    registry: &Registry,
    handle: i32,
    symbol: &str,
    bid: f64,
    ask: f64,
    err: &mut [u8],
) -> i32 {
    execute("update_quote", err, 0, || {
        registry.push_quote(handle, symbol, bid, ask)?;
        Ok(1)
    })
}

/// Отправка доменного события.
pub fn send_event(
    registry: &Registry,
    handle: i32,
    event_type: i32,
    payload: &str,
    err: &mut [u8],
) -> i32 {
    execute("send_event", err, 0, || {
        registry.push_event(handle, event_type, payload)?;
        Ok(1)
    })
}

// --- типизированные ответы ---------------------------------------------

fn respond(registry: &Registry, handle: i32, response: Response, err: &mut [u8]) -> i32 {
    execute("send_response", err, 0, || {
        registry.send_response(handle, response)?;
        Ok(1)
    })
}

/// Ответ int32.
pub fn send_int_response(registry: &Registry, handle: i32, value: i32, err: &mut [u8]) -> i32 {
    respond(registry, handle, Response::ok(TypedValue::Int32(value)), err)
}

/// Ответ int64.
pub fn send_long_response(registry: &Registry, handle: i32, value: i64, err: &mut [u8]) -> i32 {
    respond(registry, handle, Response::ok(TypedValue::Int64(value)), err)
}

/// Ответ uint64.
pub fn send_ulong_response(registry: &Registry, handle: i32, value: u64, err: &mut [u8]) -> i32 {
    respond(registry, handle, Response::ok(TypedValue::UInt64(value)), err)
}

/// Ответ double.
pub fn send_double_response(registry: &Registry, handle: i32, value: f64, err: &mut [u8]) -> i32 {
    respond(registry, handle, Response::ok(TypedValue::Double(value)), err)
}

/// Ответ bool.
pub fn send_boolean_response(registry: &Registry, handle: i32, value: bool, err: &mut [u8]) -> i32 {
    respond(registry, handle, Response::ok(TypedValue::Bool(value)), err)
}

/// Ответ строкой.
pub fn send_string_response(registry: &Registry, handle: i32, value: &str, err: &mut [u8]) -> i32 {
    respond(
        registry,
        handle,
        Response::ok(TypedValue::Str(value.to_string())),
        err,
    )
}

/// Void-ответ без значения.
pub fn send_void_response(registry: &Registry, handle: i32, err: &mut [u8]) -> i32 {
    respond(registry, handle, Response::void(), err)
}

/// Ответ-ошибка: код + сообщение; нагрузка и код уходят вместе.
pub fn send_error_response(
    registry: &Registry,
    handle: i32,
    code: i32,
    message: &str,
    err: &mut [u8],
) -> i32 {
    respond(registry, handle, Response::error(code, message), err)
}

/// Ответ массивом int32.
pub fn send_int_array_response(
    registry: &Registry,
    handle: i32,
    values: &[i32],
    err: &mut [u8],
) -> i32 {
    respond(
        registry,
        handle,
        Response::ok(TypedValue::Int32Array(values.to_vec())),
        err,
    )
}

/// Ответ массивом int64.
pub fn send_long_array_response(
    registry: &Registry,
    handle: i32,
    values: &[i64],
    err: &mut [u8],
) -> i32 {
    respond(
        registry,
        handle,
        Response::ok(TypedValue::Int64Array(values.to_vec())),
        err,
    )
}

/// Ответ массивом double.
pub fn send_double_array_response(
    registry: &Registry,
    handle: i32,
    values: &[f64],
    err: &mut [u8],
) -> i32 {
    respond(
        registry,
        handle,
        Response::ok(TypedValue::DoubleArray(values.to_vec())),
        err,
    )
}

/// Ответ массивом OHLC-баров.
pub fn send_rates_array_response(
    registry: &Registry,
    handle: i32,
    values: &[OhlcRate],
    err: &mut [u8],
) -> i32 {
    respond(
        registry,
        handle,
        Response::ok(TypedValue::RatesArray(values.to_vec())),
        err,
    )
}

// --- чтение входящей команды -------------------------------------------

/// Тип ожидающей команды в `res`.
pub fn get_command_type(registry: &Registry, handle: i32, res: &mut i32, err: &mut [u8]) -> i32 {
    execute("get_command_type", err, 0, || {
        *res = registry.command_type(handle)?;
        Ok(1)
    })
}

fn get_positional_into<T: FromValue>(
    op: &str,
    registry: &Registry,
    handle: i32,
    index: i32,
    res: &mut T,
    err: &mut [u8],
) -> i32 {
    execute(op, err, 0, || {
        *res = registry.positional::<T>(handle, checked_index(index)?)?;
        Ok(1)
    })
}

/// Позиционный параметр int32.
pub fn get_int_value(
    registry: &Registry,
    handle: i32,
    index: i32,
    res: &mut i32,
    err: &mut [u8],
) -> i32 {
    get_positional_into("get_int_value", registry, handle, index, res, err)
}

/// Позиционный параметр int64.
pub fn get_long_value(
    registry: &Registry,
    handle: i32,
    index: i32,
    res: &mut i64,
    err: &mut [u8],
) -> i32 {
    get_positional_into("get_long_value", registry, handle, index, res, err)
}

/// Позиционный параметр uint64.
pub fn get_ulong_value(
    registry: &Registry,
    handle: i32,
    index: i32,
    res: &mut u64,
    err: &mut [u8],
) -> i32 {
    get_positional_into("get_ulong_value", registry, handle, index, res, err)
}

/// Позиционный параметр double.
pub fn get_double_value(
    registry: &Registry,
    handle: i32,
    index: i32,
    res: &mut f64,
    err: &mut [u8],
) -> i32 {
    get_positional_into("get_double_value", registry, handle, index, res, err)
}

/// Позиционный параметр bool; в `res` уходит 1/0.
pub fn get_boolean_value(
    registry: &Registry,
    handle: i32,
    index: i32,
    res: &mut i32,
    err: &mut [u8],
) -> i32 {
    execute("get_boolean_value", err, 0, || {
        let v = registry.positional::<bool>(handle, checked_index(index)?)?;
        *res = i32::from(v);
        Ok(1)
    })
}

/// Позиционный строковый параметр; пишется в `res` с усечением.
pub fn get_string_value(
    registry: &Registry,
    handle: i32,
    index: i32,
    res: &mut [u8],
    err: &mut [u8],
) -> i32 {
    execute("get_string_value", err, 0, || {
        let s = registry.positional::<String>(handle, checked_index(index)?)?;
        write_message(res, &s);
        Ok(1)
    })
}

// --- именованные параметры ---------------------------------------------

/// Есть ли именованный параметр; ошибки не возвращаются, только логируются.
pub fn contains_named_value(registry: &Registry, handle: i32, name: &str) -> bool {
    let mut err = [0u8; 256];
    execute("contains_named_value", &mut err, false, || {
        registry.contains_named(handle, name)
    })
}

fn get_named_into<T: FromValue>(
    op: &str,
    registry: &Registry,
    handle: i32,
    name: &str,
    res: &mut T,
    err: &mut [u8],
) -> i32 {
    execute(op, err, 0, || {
        *res = registry.named::<T>(handle, name)?;
        Ok(1)
    })
}

/// Именованный параметр int32.
pub fn get_named_int_value(
    registry: &Registry,
    handle: i32,
    name: &str,
    res: &mut i32,
    err: &mut [u8],
) -> i32 {
    get_named_into("get_named_int_value", registry, handle, name, res, err)
}

/// Именованный параметр int64.
pub fn get_named_long_value(
    registry: &Registry,
    handle: i32,
    name: &str,
    res: &mut i64,
    err: &mut [u8],
) -> i32 {
    get_named_into("get_named_long_value", registry, handle, name, res, err)
}

/// Именованный параметр double.
pub fn get_named_double_value(
    registry: &Registry,
    handle: i32,
    name: &str,
    res: &mut f64,
    err: &mut [u8],
) -> i32 {
    get_named_into("get_named_double_value", registry, handle, name, res, err)
}

/// Именованный параметр bool; в `res` уходит 1/0.
pub fn get_named_boolean_value(
    registry: &Registry,
    handle: i32,
    name: &str,
    res: &mut i32,
    err: &mut [u8],
) -> i32 {
    execute("get_named_boolean_value", err, 0, || {
        let v = registry.named::<bool>(handle, name)?;
        *res = i32::from(v);
        Ok(1)
    })
}

/// Именованный строковый параметр; пишется в `res` с усечением.
pub fn get_named_string_value(
    registry: &Registry,
    handle: i32,
    name: &str,
    res: &mut [u8],
    err: &mut [u8],
) -> i32 {
    execute("get_named_string_value", err, 0, || {
        let s = registry.named::<String>(handle, name)?;
        write_message(res, &s);
        Ok(1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use crate::testutil::MockBackend;
    use bridge_core::{Command, OutboundMessage};
    use std::sync::Arc;
    use std::time::Duration;

    fn msg(buf: &[u8]) -> &str {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        std::str::from_utf8(&buf[..end]).unwrap()
    }

    fn mk_registry(backend: &MockBackend) -> Arc<crate::registry::Registry> {
        crate::registry::Registry::new(AdapterConfig::default(), Box::new(backend.factory()))
    }

    #[test]
    fn write_message_truncates_on_char_boundary() {
        let mut buf = [0u8; 8];
        // "котировка" в UTF-8 — по 2 байта на символ
        let n = write_message(&mut buf, "котировка");
        assert_eq!(n, 8);
        assert_eq!(std::str::from_utf8(&buf[..n]).unwrap(), "коти");

        let mut buf = [0u8; 7];
        let n = write_message(&mut buf, "котировка");
        assert_eq!(n, 6); // 7-й байт разрезал бы символ
        assert_eq!(std::str::from_utf8(&buf[..n]).unwrap(), "кот");
    }

    #[test]
    fn init_and_deinit_return_success_flag() {
        let backend = MockBackend::new();
        let reg = mk_registry(&backend);
        let mut err = [0u8; 256];

        let ok = init_expert(
            &reg,
            1,
            5000,
            "EURUSD",
            1.1000,
            1.1002,
            TerminalVariant::Mt5,
            false,
            &mut err,
        );
        assert_eq!(ok, 1);
        assert_eq!(msg(&err), "");

        assert_eq!(deinit_expert(&reg, 1, &mut err), 1);
    }

    #[test]
    fn init_with_bad_port_fails_soft() {
        let backend = MockBackend::new();
        let reg = mk_registry(&backend);

        for port in [0, -1, 70000] {
            let mut err = [0u8; 256];
            let ok = init_expert(
                &reg,
                1,
                port,
                "EURUSD",
                1.0,
                1.0,
                TerminalVariant::Mt4,
                false,
                &mut err,
            );
            assert_eq!(ok, 0);
            assert!(msg(&err).starts_with("invalid argument"), "got: {}", msg(&err));
        }
        assert_eq!(backend.connects(), 0);
    }

    #[test]
    fn errors_are_reported_not_thrown() {
        let backend = MockBackend::new();
        let reg = mk_registry(&backend);
        let mut err = [0u8; 256];

        // detach незарегистрированного хэндла
        assert_eq!(deinit_expert(&reg, 42, &mut err), 0);
        assert_eq!(msg(&err), "session not found: handle = 42");

        // повторный attach
        init_expert(&reg, 1, 5000, "EURUSD", 1.0, 1.0, TerminalVariant::Mt5, false, &mut err);
        let mut err2 = [0u8; 256];
        let ok = init_expert(&reg, 1, 5000, "EURUSD", 1.0, 1.0, TerminalVariant::Mt5, false, &mut err2);
        assert_eq!(ok, 0);
        assert_eq!(msg(&err2), "duplicate expert handle: 1");
    }

    #[test]
    fn command_scenario_through_the_boundary() {
        let backend = MockBackend::new();
        let reg = mk_registry(&backend);
        let mut err = [0u8; 256];

        init_expert(&reg, 1, 5000, "EURUSD", 1.0, 1.0, TerminalVariant::Mt5, false, &mut err);

        backend.push_command(
            5000,
            1,
            Command::new(7)
                .with_positional(TypedValue::Int32(42))
                .with_positional(TypedValue::Str("готово".into()))
                .with_named("volume", TypedValue::Double(0.1)),
        );

        let mut cmd_type = 0;
        assert_eq!(get_command_type(&reg, 1, &mut cmd_type, &mut err), 1);
        assert_eq!(cmd_type, 7);

        let mut v = 0;
        assert_eq!(get_int_value(&reg, 1, 0, &mut v, &mut err), 1);
        assert_eq!(v, 42);

        // строка с усечением
        let mut s = [0u8; 64];
        assert_eq!(get_string_value(&reg, 1, 1, &mut s, &mut err), 1);
        assert_eq!(msg(&s), "готово");

        // за пределами списка
        let mut err3 = [0u8; 256];
        assert_eq!(get_int_value(&reg, 1, 2, &mut v, &mut err3), 0);
        assert_eq!(msg(&err3), "parameter index 2 out of range (count = 2)");

        // отрицательный индекс — InvalidArgument
        let mut err4 = [0u8; 256];
        assert_eq!(get_int_value(&reg, 1, -1, &mut v, &mut err4), 0);
        assert!(msg(&err4).starts_with("invalid argument"));

        assert!(contains_named_value(&reg, 1, "volume"));
        let mut vol = 0.0;
        assert_eq!(get_named_double_value(&reg, 1, "volume", &mut vol, &mut err), 1);
        assert_eq!(vol, 0.1);

        // ответ очищает pending
        assert_eq!(send_string_response(&reg, 1, "done", &mut err), 1);
        let mut err5 = [0u8; 256];
        assert_eq!(get_command_type(&reg, 1, &mut cmd_type, &mut err5), 0);
        assert_eq!(msg(&err5), "no pending command");
    }

    #[test]
    fn error_response_carries_code_and_payload() {
        let backend = MockBackend::new();
        let reg = mk_registry(&backend);
        let mut err = [0u8; 256];

        init_expert(&reg, 1, 5000, "EURUSD", 1.0, 1.0, TerminalVariant::Mt5, false, &mut err);
        assert_eq!(send_error_response(&reg, 1, 134, "not enough money", &mut err), 1);

        assert!(backend.wait_sent(1, Duration::from_secs(2)));
        match &backend.sent()[0].1 {
            OutboundMessage::Response { response, .. } => {
                assert_eq!(response.error_code, 134);
                assert_eq!(response.error_message.as_deref(), Some("not enough money"));
                assert_eq!(response.value, Some(TypedValue::Str("not enough money".into())));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }
}
