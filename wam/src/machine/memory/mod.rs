use alloc::vec::Vec;
use core::fmt;

use crate::log_trace;

use super::basic_types::{Address, Cell, Functor, HeapAddress, RegisterIndex, Yn};

mod environment;
pub mod structure_iteration;
mod unification;

pub use unification::{BindingInvariantViolation, Dereferenced, UnificationError};

/// Frame header layout, relative to the frame base `E`
const SAVED_ENVIRONMENT: usize = 0;
const SAVED_CONTINUATION_POINT: usize = 1;
const FRAME_SIZE: usize = 2;
const FRAME_HEADER_SIZE: usize = 3;

/// The base frame always sits at the bottom of the stack
pub const BASE_ENVIRONMENT: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    HeapIndexOutOfRange {
        address: HeapAddress,
        heap_size: usize,
    },
    RegisterHasNoValue {
        index: RegisterIndex,
    },
    LocalHasNoValue {
        yn: Yn,
        slot: usize,
    },
    LocalIndexZero,
    BadFrameHeader {
        slot: usize,
    },
    ReferenceCycle {
        address: Address,
    },
    UnexpectedCell {
        address: Address,
        cell: Cell,
    },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::HeapIndexOutOfRange { address, heap_size } => write!(
                f,
                "heap index {} is out of range (heap size {})",
                address, heap_size
            ),
            MemoryError::RegisterHasNoValue { index } => {
                write!(f, "register X{} holds no value", index)
            }
            MemoryError::LocalHasNoValue { yn, slot } => {
                write!(f, "Y{} (stack slot {}) holds no value", yn, slot)
            }
            MemoryError::LocalIndexZero => write!(f, "Y0 overlaps the frame header"),
            MemoryError::BadFrameHeader { slot } => {
                write!(f, "stack slot {} is not a frame header word", slot)
            }
            MemoryError::ReferenceCycle { address } => {
                write!(f, "reference chain from {} does not terminate", address)
            }
            MemoryError::UnexpectedCell { address, cell } => {
                write!(f, "unexpected cell {} at {}", cell, address)
            }
        }
    }
}

/// A slot of the environment stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackSlot {
    /// Grown over but never written
    Empty,
    /// A frame header word: saved `E`, saved `CP`, or frame size
    Word(usize),
    /// A local variable
    Cell(Cell),
}

impl From<&StackSlot> for comms::StackSlot {
    fn from(slot: &StackSlot) -> Self {
        match slot {
            StackSlot::Empty => Self::Empty,
            StackSlot::Word(word) => Self::Word(*word),
            StackSlot::Cell(cell) => Self::Cell(cell.into()),
        }
    }
}

/// The argument registers. Grows on store, unwritten registers hold `None`
#[derive(Debug, Default)]
pub struct RegisterBlock(Vec<Option<Cell>>);

impl RegisterBlock {
    fn load(&self, index: RegisterIndex) -> Result<&Cell, MemoryError> {
        log_trace!("Loading Register {}", index);

        self.0
            .get(index.0)
            .and_then(Option::as_ref)
            .ok_or(MemoryError::RegisterHasNoValue { index })
    }

    fn store(&mut self, index: RegisterIndex, cell: Cell) {
        log_trace!("Storing {} in Register {}", cell, index);

        if index.0 >= self.0.len() {
            self.0.resize(index.0 + 1, None);
        }

        self.0[index.0] = Some(cell);
    }

    pub fn all(&self) -> &[Option<Cell>] {
        &self.0
    }
}

/// The heap, the register file, and the environment stack, together with `E`
#[derive(Debug)]
pub struct Memory {
    heap: Vec<Cell>,
    registers: RegisterBlock,
    stack: Vec<StackSlot>,
    current_environment: usize,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            registers: RegisterBlock::default(),
            stack: Vec::from([
                StackSlot::Word(BASE_ENVIRONMENT),
                StackSlot::Word(0),
                StackSlot::Word(0),
            ]),
            current_environment: BASE_ENVIRONMENT,
        }
    }

    pub fn heap(&self) -> &[Cell] {
        &self.heap
    }

    pub fn registers(&self) -> &[Option<Cell>] {
        self.registers.all()
    }

    pub fn stack(&self) -> &[StackSlot] {
        &self.stack
    }

    /// `H`, the next free heap index
    pub fn heap_top(&self) -> HeapAddress {
        HeapAddress(self.heap.len())
    }

    pub fn current_environment(&self) -> usize {
        self.current_environment
    }

    fn local_slot(&self, yn: Yn) -> Result<usize, MemoryError> {
        if yn.yn == 0 {
            return Err(MemoryError::LocalIndexZero);
        }

        Ok(self.current_environment + FRAME_SIZE + yn.yn)
    }

    pub fn load(&self, address: Address) -> Result<&Cell, MemoryError> {
        match address {
            Address::Heap(heap_address) => {
                self.heap
                    .get(heap_address.0)
                    .ok_or(MemoryError::HeapIndexOutOfRange {
                        address: heap_address,
                        heap_size: self.heap.len(),
                    })
            }
            Address::Register(index) => self.registers.load(index),
            Address::Local(yn) => {
                let slot = self.local_slot(yn)?;
                match self.stack.get(slot) {
                    Some(StackSlot::Cell(cell)) => Ok(cell),
                    _ => Err(MemoryError::LocalHasNoValue { yn, slot }),
                }
            }
        }
    }

    /// Overwrites an existing heap cell, or stores into a register or local, growing the storage
    pub fn store(&mut self, address: Address, cell: Cell) -> Result<(), MemoryError> {
        match address {
            Address::Heap(heap_address) => {
                let heap_size = self.heap.len();
                let target =
                    self.heap
                        .get_mut(heap_address.0)
                        .ok_or(MemoryError::HeapIndexOutOfRange {
                            address: heap_address,
                            heap_size,
                        })?;
                log_trace!("Storing {} at {}", cell, address);
                *target = cell;
            }
            Address::Register(index) => self.registers.store(index, cell),
            Address::Local(yn) => {
                let slot = self.local_slot(yn)?;
                log_trace!("Storing {} in Y{} (slot {})", cell, yn, slot);
                self.store_stack(slot, StackSlot::Cell(cell));
            }
        }

        Ok(())
    }

    fn store_stack(&mut self, slot: usize, value: StackSlot) {
        if slot >= self.stack.len() {
            self.stack.resize(slot + 1, StackSlot::Empty);
        }

        self.stack[slot] = value;
    }

    fn load_word(&self, slot: usize) -> Result<usize, MemoryError> {
        match self.stack.get(slot) {
            Some(&StackSlot::Word(word)) => Ok(word),
            _ => Err(MemoryError::BadFrameHeader { slot }),
        }
    }

    fn push(&mut self, cell: Cell) -> HeapAddress {
        let address = self.heap_top();
        log_trace!("HEAP[{}] <= {}", address, cell);
        self.heap.push(cell);
        address
    }

    /// Allocates an unbound variable at `H`
    pub fn new_variable(&mut self) -> HeapAddress {
        let address = self.heap_top();
        self.push(Cell::Ref(address))
    }

    /// Allocates a `Structure` cell and its `Functor` at `H`, returning the address of the `Structure` cell
    pub fn new_structure(&mut self, functor: Functor) -> HeapAddress {
        let functor_address = self.heap_top().offset(1);
        let address = self.push(Cell::Structure(functor_address));
        self.push(Cell::Functor(functor));
        address
    }

    pub fn functor_at(&self, address: HeapAddress) -> Result<&Functor, MemoryError> {
        match self.load(Address::Heap(address))? {
            Cell::Functor(functor) => Ok(functor),
            cell => Err(MemoryError::UnexpectedCell {
                address: Address::Heap(address),
                cell: cell.clone(),
            }),
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
