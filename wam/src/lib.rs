#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

//! A deterministic unification engine in the style of the Warren Abstract Machine.
//!
//! A [Machine] runs a [Program] of textual instructions (`get_structure`, `get_variable`,
//! `get_value`, `put_variable`, `put_value`, `put_structure`, `allocate`, `deallocate`, `call`)
//! over a heap, a register file, and an environment stack. There is no backtracking: the first
//! failure is fatal, and leaves the machine inspectable.

extern crate alloc;

#[cfg(feature = "logging")]
pub use log;

mod logging;
mod machine;

pub use machine::{
    Address, Arity, BindingInvariantViolation, Cell, DecodeError, Error, ExecutionFailure,
    Functor, HeapAddress, Inspect, Instruction, Line, Machine, MachineRegisters, MemoryError,
    Procedure, Program, ProgramCounter, ReadWriteMode, Register, RegisterIndex, Resolved,
    StackSlot, Status, UnificationError, Yn,
};
