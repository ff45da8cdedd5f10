//! Typed boundary over guest linear memory.
//!
//! Every read or write of guest memory goes through this module. Views are
//! borrowed from the store for the duration of a single access and are
//! re-derived from the live [`Memory`] each time, so a call that grows the
//! guest memory can never leave a stale slice behind.

use tracing::trace;
use wasmtime::{Instance, Memory, Store, StoreContext, TypedFunc};

use crate::module::exports;
use crate::reftable::{GuestThrow, RefTable};
use crate::store::SandboxContext;
use scry_common::{AbiError, RuntimeError};

/// Alignment passed to the guest allocator for UTF-8 strings.
const STRING_ALIGN: i32 = 1;

/// Reinterpret a guest `i32` address or length as an unsigned host offset.
#[allow(clippy::cast_sign_loss)]
pub fn guest_offset(value: i32) -> usize {
    value as u32 as usize
}

/// Convert a host length into the guest's `i32` representation.
#[allow(clippy::cast_possible_wrap)]
pub fn to_guest(len: usize) -> Result<i32, AbiError> {
    u32::try_from(len)
        .map(|v| v as i32)
        .map_err(|_| AbiError::LengthOverflow { len })
}

/// Borrow `len` bytes at `offset` from the current memory.
///
/// Works for anything that exposes the store, including a host-import
/// [`wasmtime::Caller`].
pub fn read_bytes<'a, T: 'a>(
    memory: &Memory,
    store: impl Into<StoreContext<'a, T>>,
    offset: usize,
    len: usize,
) -> Result<&'a [u8], AbiError> {
    let data = memory.data(store);
    let out_of_bounds = AbiError::OutOfBounds {
        offset,
        len,
        memory_size: data.len(),
    };
    let end = offset.checked_add(len).ok_or_else(|| out_of_bounds.clone())?;
    data.get(offset..end).ok_or(out_of_bounds)
}

/// Copy `len` bytes at `offset` out of guest memory as a validated string.
pub fn read_string<'a, T: 'a>(
    memory: &Memory,
    store: impl Into<StoreContext<'a, T>>,
    offset: usize,
    len: usize,
) -> Result<String, AbiError> {
    let bytes = read_bytes(memory, store, offset, len)?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| AbiError::InvalidUtf8 {
            offset,
            reason: e.to_string(),
        })
}

/// Map a failed guest call onto the runtime error taxonomy.
///
/// Thrown values are resolved through the reference table before the
/// store is dropped.
pub fn classify_call_error(err: &wasmtime::Error, refs: &RefTable, timeout_ms: u64) -> RuntimeError {
    if let Some(GuestThrow { index }) = err.downcast_ref::<GuestThrow>() {
        let message = refs
            .get(*index)
            .map_or_else(|e| e.to_string(), |value| value.describe());
        return RuntimeError::GuestThrow { message };
    }

    if let Some(abi) = err.downcast_ref::<AbiError>() {
        return RuntimeError::Abi(abi.clone());
    }

    match err.downcast_ref::<wasmtime::Trap>() {
        Some(wasmtime::Trap::OutOfFuel) => RuntimeError::FuelExhausted,
        Some(wasmtime::Trap::Interrupt) => RuntimeError::ExecutionTimeout {
            duration_ms: timeout_ms,
        },
        Some(trap) => RuntimeError::trap(trap.to_string()),
        None => RuntimeError::trap(err.root_cause().to_string()),
    }
}

/// Guest exports used to move data across the boundary.
///
/// Bound once per instance. Holds handles only; every access takes the store.
pub struct GuestAbi {
    memory: Memory,
    malloc: TypedFunc<(i32, i32), i32>,
    free: TypedFunc<(i32, i32, i32), ()>,
    stack_pointer: TypedFunc<i32, i32>,
    timeout_ms: u64,
}

impl GuestAbi {
    /// Resolve the boundary exports on a fresh instance.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::MissingExport`] if an export is absent or has
    /// the wrong signature.
    pub fn bind(
        store: &mut Store<SandboxContext>,
        instance: &Instance,
        timeout_ms: u64,
    ) -> Result<Self, RuntimeError> {
        let memory = instance
            .get_memory(&mut *store, exports::MEMORY)
            .ok_or(AbiError::MissingMemory)?;
        let malloc = instance
            .get_typed_func(&mut *store, exports::MALLOC)
            .map_err(|_| RuntimeError::missing_export(exports::MALLOC))?;
        let free = instance
            .get_typed_func(&mut *store, exports::FREE)
            .map_err(|_| RuntimeError::missing_export(exports::FREE))?;
        let stack_pointer = instance
            .get_typed_func(&mut *store, exports::STACK_POINTER)
            .map_err(|_| RuntimeError::missing_export(exports::STACK_POINTER))?;

        Ok(Self {
            memory,
            malloc,
            free,
            stack_pointer,
            timeout_ms,
        })
    }

    /// Current size of guest memory in bytes.
    pub fn memory_size(&self, store: &Store<SandboxContext>) -> usize {
        self.memory.data_size(store)
    }

    /// Allocate guest memory for `text` and copy its UTF-8 bytes in.
    ///
    /// Returns the guest `(offset, length)` pair.
    pub async fn encode_string(
        &self,
        store: &mut Store<SandboxContext>,
        text: &str,
    ) -> Result<(i32, i32), RuntimeError> {
        let len = to_guest(text.len())?;
        let ptr = self
            .malloc
            .call_async(&mut *store, (len, STRING_ALIGN))
            .await
            .map_err(|e| self.classify(store, &e))?;

        if ptr == 0 && len != 0 {
            return Err(AbiError::AllocationFailed { size: text.len() }.into());
        }

        // The allocator may have grown memory; resolve the view afresh.
        let offset = guest_offset(ptr);
        self.memory
            .write(&mut *store, offset, text.as_bytes())
            .map_err(|_| AbiError::OutOfBounds {
                offset,
                len: text.len(),
                memory_size: self.memory.data_size(&*store),
            })?;

        trace!(offset, len = text.len(), "String encoded into guest memory");
        Ok((ptr, len))
    }

    /// Copy a guest string out and validate it as UTF-8.
    pub fn decode_string(
        &self,
        store: &Store<SandboxContext>,
        ptr: i32,
        len: i32,
    ) -> Result<String, AbiError> {
        read_string(&self.memory, store, guest_offset(ptr), guest_offset(len))
    }

    /// Borrow raw guest bytes, bounds-checked against the current memory size.
    pub fn read_bytes<'a>(
        &self,
        store: &'a Store<SandboxContext>,
        ptr: i32,
        len: i32,
    ) -> Result<&'a [u8], AbiError> {
        read_bytes(&self.memory, store, guest_offset(ptr), guest_offset(len))
    }

    /// Read the `(ptr, len)` pair a guest function stored at `retptr`.
    pub fn read_return_pair(
        &self,
        store: &Store<SandboxContext>,
        retptr: i32,
    ) -> Result<(i32, i32), AbiError> {
        let bytes = self.read_bytes(store, retptr, 8)?;
        let mut ptr = [0u8; 4];
        let mut len = [0u8; 4];
        ptr.copy_from_slice(&bytes[0..4]);
        len.copy_from_slice(&bytes[4..8]);
        Ok((i32::from_le_bytes(ptr), i32::from_le_bytes(len)))
    }

    /// Return a string allocation to the guest allocator.
    pub async fn free(
        &self,
        store: &mut Store<SandboxContext>,
        ptr: i32,
        len: i32,
    ) -> Result<(), RuntimeError> {
        self.free
            .call_async(&mut *store, (ptr, len, STRING_ALIGN))
            .await
            .map_err(|e| self.classify(store, &e))
    }

    /// Move the guest shadow stack pointer by `delta` bytes.
    pub async fn add_to_stack_pointer(
        &self,
        store: &mut Store<SandboxContext>,
        delta: i32,
    ) -> Result<i32, RuntimeError> {
        self.stack_pointer
            .call_async(&mut *store, delta)
            .await
            .map_err(|e| self.classify(store, &e))
    }

    /// Map a failed call using this instance's reference table.
    pub fn classify(&self, store: &Store<SandboxContext>, err: &wasmtime::Error) -> RuntimeError {
        classify_call_error(err, &store.data().refs, self.timeout_ms)
    }
}

impl std::fmt::Debug for GuestAbi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestAbi").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reftable::RefValue;

    #[test]
    fn test_guest_offset_is_unsigned() {
        assert_eq!(guest_offset(16), 16);
        assert_eq!(guest_offset(-1), u32::MAX as usize);
    }

    #[test]
    fn test_to_guest_rejects_oversized() {
        assert_eq!(to_guest(12).unwrap(), 12);
        assert!(matches!(
            to_guest(u32::MAX as usize + 1),
            Err(AbiError::LengthOverflow { .. })
        ));
    }

    #[test]
    fn test_classify_guest_throw() {
        let mut refs = RefTable::new();
        let index = refs.insert(RefValue::Error("x is not defined".into()));
        let err = wasmtime::Error::new(GuestThrow { index });

        let classified = classify_call_error(&err, &refs, 2000);
        assert!(matches!(
            classified,
            RuntimeError::GuestThrow { message } if message == "x is not defined"
        ));
    }

    #[test]
    fn test_classify_fuel_and_interrupt() {
        let refs = RefTable::new();

        let err = wasmtime::Error::new(wasmtime::Trap::OutOfFuel);
        assert!(matches!(
            classify_call_error(&err, &refs, 2000),
            RuntimeError::FuelExhausted
        ));

        let err = wasmtime::Error::new(wasmtime::Trap::Interrupt);
        assert!(matches!(
            classify_call_error(&err, &refs, 250),
            RuntimeError::ExecutionTimeout { duration_ms: 250 }
        ));
    }

    #[test]
    fn test_classify_host_abi_error() {
        let refs = RefTable::new();
        let err = wasmtime::Error::new(AbiError::MissingMemory);

        assert!(matches!(
            classify_call_error(&err, &refs, 2000),
            RuntimeError::Abi(AbiError::MissingMemory)
        ));
    }
}
