use alloc::string::String;
use core::fmt;

use comms::{CommsFromInto, IndexNewType};

/// An index into the heap
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IndexNewType, CommsFromInto)]
pub struct HeapAddress(pub usize);

impl HeapAddress {
    pub const ZERO: Self = Self(0);

    pub fn offset(self, offset: usize) -> Self {
        Self(self.0 + offset)
    }
}

/// A Register Index. `X` and `A` registers share one bank
#[derive(Clone, Copy, PartialEq, Eq, IndexNewType)]
pub struct RegisterIndex(pub usize);

/// An Environment "Register Index", i.e. the nth variable in the current frame
#[derive(Clone, Copy, PartialEq, Eq, IndexNewType)]
pub struct Yn {
    pub yn: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IndexNewType, CommsFromInto)]
pub struct Arity(pub u8);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IndexNewType, CommsFromInto)]
pub struct ProgramCounter(pub usize);

impl ProgramCounter {
    pub const START: Self = Self(0);

    pub fn offset(self, offset: usize) -> Self {
        Self(self.0 + offset)
    }

    pub fn into_usize(self) -> usize {
        self.0
    }
}

/// A function or predicate symbol with its argument count
#[derive(Clone, PartialEq, Eq)]
pub struct Functor {
    pub name: String,
    pub arity: Arity,
}

impl Functor {
    pub fn new(name: impl Into<String>, arity: Arity) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Debug for Functor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Functor({})", self)
    }
}

impl fmt::Display for Functor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

impl From<&Functor> for comms::Functor {
    fn from(Functor { name, arity }: &Functor) -> Self {
        Self {
            name: name.clone(),
            arity: (*arity).into(),
        }
    }
}

/// A tagged value held in a heap, register, or environment slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// Unbound when pointing at its own heap slot, bound otherwise
    Ref(HeapAddress),
    /// Points at the [Functor](Cell::Functor) cell heading a compound term
    Structure(HeapAddress),
    Functor(Functor),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Ref(address) => write!(f, "REF {}", address),
            Cell::Structure(address) => write!(f, "STR {}", address),
            Cell::Functor(functor) => fmt::Display::fmt(functor, f),
        }
    }
}

impl From<&Cell> for comms::Cell {
    fn from(cell: &Cell) -> Self {
        match cell {
            Cell::Ref(address) => Self::Ref((*address).into()),
            Cell::Structure(address) => Self::Structure((*address).into()),
            Cell::Functor(functor) => Self::Functor(functor.into()),
        }
    }
}

/// A register as written in program text: `X3`, `A1`, `Y2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Argument(RegisterIndex),
    Local(Yn),
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Argument(index) => write!(f, "X{}", index),
            Register::Local(yn) => write!(f, "Y{}", yn),
        }
    }
}

/// Where a [Cell] lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Heap(HeapAddress),
    Register(RegisterIndex),
    Local(Yn),
}

impl From<Register> for Address {
    fn from(register: Register) -> Self {
        match register {
            Register::Argument(index) => Address::Register(index),
            Register::Local(yn) => Address::Local(yn),
        }
    }
}

impl From<HeapAddress> for Address {
    fn from(address: HeapAddress) -> Self {
        Address::Heap(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Heap(address) => write!(f, "HEAP[{}]", address),
            Address::Register(index) => write!(f, "X{}", index),
            Address::Local(yn) => write!(f, "Y{}", yn),
        }
    }
}
