//! Guest import registration.
//!
//! The evaluator is a wasm-bindgen style module. It imports a small set of
//! glue functions from `wbg` for passing strings and errors by reference,
//! plus `scry::log` for diagnostics.

use scry_common::{AbiError, RuntimeError};
use scry_core::abi::{guest_offset, read_string};
use scry_core::reftable::{GuestThrow, RefValue};
use scry_core::store::SandboxContext;
use tracing::{debug, warn};
use wasmtime::{Caller, Extern, Linker};

use crate::logging::{LoggingHost, level_from_i32};

/// Import module for wasm-bindgen glue.
pub const WBG: &str = "wbg";

/// Import module for scry-specific host functions.
pub const SCRY: &str = "scry";

/// Register every import the evaluator may link against.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(linker: &mut Linker<SandboxContext>) -> Result<(), RuntimeError> {
    register_bindgen(linker)?;
    register_logging(linker)?;
    Ok(())
}

#[allow(clippy::cast_sign_loss)]
fn slot(index: i32) -> u32 {
    index as u32
}

#[allow(clippy::cast_possible_wrap)]
fn to_index(slot: u32) -> i32 {
    slot as i32
}

/// Copy a guest string out through the caller's exported memory.
fn guest_string(
    caller: &mut Caller<'_, SandboxContext>,
    ptr: i32,
    len: i32,
) -> Result<String, AbiError> {
    let memory = caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or(AbiError::MissingMemory)?;
    read_string(&memory, &*caller, guest_offset(ptr), guest_offset(len))
}

fn wrap_err(what: &str) -> impl FnOnce(wasmtime::Error) -> RuntimeError + '_ {
    move |e| RuntimeError::invalid_config(format!("Failed to register {what}: {e}"))
}

/// Register the `wbg` reference-table glue.
///
/// - `__wbindgen_init_externref_table()`: reset the table to its constants
/// - `__wbindgen_string_new(ptr, len) -> idx`
/// - `__wbindgen_error_new(ptr, len) -> idx`
/// - `__wbindgen_object_drop_ref(idx)`
/// - `__wbindgen_rethrow(idx)`: trap with the value at `idx`
/// - `__wbindgen_throw(ptr, len)`: trap with a new error built from the string
pub fn register_bindgen(linker: &mut Linker<SandboxContext>) -> Result<(), RuntimeError> {
    linker
        .func_wrap(
            WBG,
            "__wbindgen_init_externref_table",
            |mut caller: Caller<'_, SandboxContext>| {
                caller.data_mut().refs.reset();
            },
        )
        .map_err(wrap_err("__wbindgen_init_externref_table"))?;

    linker
        .func_wrap(
            WBG,
            "__wbindgen_string_new",
            |mut caller: Caller<'_, SandboxContext>, ptr: i32, len: i32| -> wasmtime::Result<i32> {
                let text = guest_string(&mut caller, ptr, len)?;
                Ok(to_index(caller.data_mut().refs.insert(RefValue::String(text))))
            },
        )
        .map_err(wrap_err("__wbindgen_string_new"))?;

    linker
        .func_wrap(
            WBG,
            "__wbindgen_error_new",
            |mut caller: Caller<'_, SandboxContext>, ptr: i32, len: i32| -> wasmtime::Result<i32> {
                let message = guest_string(&mut caller, ptr, len)?;
                Ok(to_index(caller.data_mut().refs.insert(RefValue::Error(message))))
            },
        )
        .map_err(wrap_err("__wbindgen_error_new"))?;

    linker
        .func_wrap(
            WBG,
            "__wbindgen_object_drop_ref",
            |mut caller: Caller<'_, SandboxContext>, index: i32| -> wasmtime::Result<()> {
                caller.data_mut().refs.drop_ref(slot(index))?;
                Ok(())
            },
        )
        .map_err(wrap_err("__wbindgen_object_drop_ref"))?;

    linker
        .func_wrap(
            WBG,
            "__wbindgen_rethrow",
            |caller: Caller<'_, SandboxContext>, index: i32| -> wasmtime::Result<()> {
                let index = slot(index);
                debug!(request_id = %caller.data().request_id, index, "Guest rethrew reference");
                Err(wasmtime::Error::new(GuestThrow { index }))
            },
        )
        .map_err(wrap_err("__wbindgen_rethrow"))?;

    linker
        .func_wrap(
            WBG,
            "__wbindgen_throw",
            |mut caller: Caller<'_, SandboxContext>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let message = guest_string(&mut caller, ptr, len)?;
                let index = caller.data_mut().refs.insert(RefValue::Error(message));
                Err(wasmtime::Error::new(GuestThrow { index }))
            },
        )
        .map_err(wrap_err("__wbindgen_throw"))?;

    Ok(())
}

/// Register `scry::log(level: i32, ptr: i32, len: i32)`.
///
/// A malformed log call is dropped with a warning; it never fails the
/// evaluation.
pub fn register_logging(linker: &mut Linker<SandboxContext>) -> Result<(), RuntimeError> {
    linker
        .func_wrap(
            SCRY,
            "log",
            |mut caller: Caller<'_, SandboxContext>, level: i32, ptr: i32, len: i32| {
                match guest_string(&mut caller, ptr, len) {
                    Ok(message) => {
                        LoggingHost::log(caller.data_mut(), level_from_i32(level), &message);
                    }
                    Err(e) => {
                        warn!(
                            request_id = %caller.data().request_id,
                            error = %e,
                            "Dropping malformed guest log line"
                        );
                    }
                }
            },
        )
        .map_err(wrap_err("scry::log"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_common::EngineConfig;
    use scry_core::WasmEngine;

    fn engine() -> WasmEngine {
        WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_register_all() {
        let engine = engine();
        let mut linker = Linker::new(engine.inner());

        tokio_test::assert_ok!(register_all(&mut linker));
    }

    #[test]
    fn test_register_twice_is_rejected() {
        let engine = engine();
        let mut linker = Linker::new(engine.inner());

        tokio_test::assert_ok!(register_logging(&mut linker));
        let err = tokio_test::assert_err!(register_logging(&mut linker));
        assert!(err.to_string().contains("scry::log"));
    }

    #[test]
    fn test_slot_conversions() {
        assert_eq!(slot(5), 5);
        assert_eq!(to_index(5), 5);
        assert_eq!(slot(to_index(u32::MAX)), u32::MAX);
    }
}
