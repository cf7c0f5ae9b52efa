//! Fiber state.
//!
//! A fiber is a resumable call: the callable it wraps plus, while suspended,
//! the saved interpreter frame stack. This module only holds the data; the
//! resume machinery lives in the interpreter.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::funcdef::Definition;
use crate::value::{Callable, Value};

// Signal numbers carried by the SIGNAL instruction. 0 and 1 are reserved
// for ok/error outcomes and never appear in the instruction stream.
pub const SIG_DEBUG: u8 = 2;
pub const SIG_YIELD: u8 = 3;
pub const SIG_USER0: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberStatus {
    /// Created, never resumed.
    New,
    /// Currently executing.
    Alive,
    /// Suspended at a signal, resumable.
    Pending,
    /// Returned normally.
    Dead,
    /// Terminated by an error.
    Error,
}

impl FiberStatus {
    pub fn name(self) -> &'static str {
        match self {
            FiberStatus::New => "new",
            FiberStatus::Alive => "alive",
            FiberStatus::Pending => "pending",
            FiberStatus::Dead => "dead",
            FiberStatus::Error => "error",
        }
    }
}

/// One interpreter frame: a definition mid-execution.
///
/// `pc` points at the next instruction. `result_slot` is the slot that
/// receives whatever the frame above produces: a call's return value, or the
/// resume value after this frame raised a signal.
#[derive(Debug, Clone)]
pub struct Frame {
    pub def: Arc<Definition>,
    pub slots: Vec<Value>,
    pub pending: Vec<Value>,
    pub pc: usize,
    pub result_slot: u8,
}

/// Mutable fiber state: status plus, while suspended, the frame stack.
pub struct FiberState {
    pub status: FiberStatus,
    pub stack: Vec<Frame>,
}

pub struct Fiber {
    pub entry: Callable,
    pub state: Mutex<FiberState>,
}

impl Fiber {
    pub fn new(entry: Callable) -> Fiber {
        Fiber {
            entry,
            state: Mutex::new(FiberState {
                status: FiberStatus::New,
                stack: Vec::new(),
            }),
        }
    }

    pub fn status(&self) -> FiberStatus {
        self.state.lock().status
    }
}
