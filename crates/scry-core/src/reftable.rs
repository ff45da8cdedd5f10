//! Host-side reference table for values the guest hands across the boundary.
//!
//! The guest never sees host values directly; it holds `u32` slot indexes.
//! The first four slots are reserved for the well-known constants and are
//! never freed. Dropped slots are recycled through a free list.

use scry_common::AbiError;

/// Number of reserved slots at the start of the table.
pub const RESERVED_SLOTS: u32 = 4;

/// Slot index of `undefined`.
pub const UNDEFINED: u32 = 0;
/// Slot index of `null`.
pub const NULL: u32 = 1;
/// Slot index of `true`.
pub const TRUE: u32 = 2;
/// Slot index of `false`.
pub const FALSE: u32 = 3;

/// A value stored in the reference table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    Undefined,
    Null,
    Bool(bool),
    String(String),
    /// An error object created by the guest, carrying its message.
    Error(String),
}

impl RefValue {
    /// Human-readable description used when the value is thrown.
    pub fn describe(&self) -> String {
        match self {
            RefValue::Undefined => "undefined".to_string(),
            RefValue::Null => "null".to_string(),
            RefValue::Bool(b) => b.to_string(),
            RefValue::String(s) | RefValue::Error(s) => s.clone(),
        }
    }
}

/// Trap payload raised when the guest throws a table value.
///
/// Host imports return this as their error; the evaluator downcasts it after
/// the call unwinds and resolves the message from the table.
#[derive(Debug, thiserror::Error)]
#[error("guest threw reference {index}")]
pub struct GuestThrow {
    /// Slot holding the thrown value.
    pub index: u32,
}

/// Indexed table of guest-visible host values.
#[derive(Debug)]
pub struct RefTable {
    slots: Vec<Option<RefValue>>,
    free: Vec<u32>,
}

impl Default for RefTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RefTable {
    /// Create a table with the well-known slots populated.
    pub fn new() -> Self {
        let mut table = Self {
            slots: Vec::with_capacity(16),
            free: Vec::new(),
        };
        table.reset();
        table
    }

    /// Clear every slot and restore the well-known constants.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.slots.extend([
            Some(RefValue::Undefined),
            Some(RefValue::Null),
            Some(RefValue::Bool(true)),
            Some(RefValue::Bool(false)),
        ]);
    }

    /// Store a value and return its slot index.
    pub fn insert(&mut self, value: RefValue) -> u32 {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(value);
            return index;
        }
        // Tables never grow past u32 in practice; the guest addresses slots as i32.
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Some(value));
        index
    }

    /// Look up a live slot.
    pub fn get(&self, index: u32) -> Result<&RefValue, AbiError> {
        self.slots
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(AbiError::InvalidReference { index })
    }

    /// Release a slot. Reserved slots are ignored.
    pub fn drop_ref(&mut self, index: u32) -> Result<(), AbiError> {
        if index < RESERVED_SLOTS {
            return Ok(());
        }
        match self.slots.get_mut(index as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                self.free.push(index);
                Ok(())
            }
            _ => Err(AbiError::InvalidReference { index }),
        }
    }

    /// Number of live slots, including the reserved ones.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
