use alloc::vec::Vec;
use core::fmt;

use crate::log_trace;

use super::{Address, Cell, Functor, HeapAddress, Memory, MemoryError};

/// What an address holds once its reference chain has been followed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dereferenced {
    Unbound(HeapAddress),
    /// The address of the structure's functor cell
    Structure(HeapAddress),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInvariantViolation {
    pub left: Address,
    pub right: Address,
}

impl fmt::Display for BindingInvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot bind {} to {}: neither is an unbound variable",
            self.left, self.right
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnificationError {
    Mismatch { left: Functor, right: Functor },
    Binding(BindingInvariantViolation),
    Memory(MemoryError),
}

impl From<MemoryError> for UnificationError {
    fn from(inner: MemoryError) -> Self {
        Self::Memory(inner)
    }
}

impl From<BindingInvariantViolation> for UnificationError {
    fn from(inner: BindingInvariantViolation) -> Self {
        Self::Binding(inner)
    }
}

impl Memory {
    /// Follows `Ref` cells from `address` until reaching an unbound variable or a non-`Ref` cell
    pub fn deref(&self, mut address: Address) -> Result<Address, MemoryError> {
        // Chains built by `bind` only point downwards, so each heap cell is visited at most once
        for _ in 0..=self.heap.len() {
            match *self.load(address)? {
                Cell::Ref(target) if Address::Heap(target) != address => {
                    log_trace!("{} => {}", address, target);
                    address = Address::Heap(target);
                }
                _ => return Ok(address),
            }
        }

        Err(MemoryError::ReferenceCycle { address })
    }

    /// Classifies an already dereferenced address
    pub fn dereferenced(&self, address: Address) -> Result<Dereferenced, MemoryError> {
        match *self.load(address)? {
            Cell::Ref(target) if Address::Heap(target) == address => {
                Ok(Dereferenced::Unbound(target))
            }
            Cell::Structure(functor_address) => Ok(Dereferenced::Structure(functor_address)),
            ref cell => Err(MemoryError::UnexpectedCell {
                address,
                cell: cell.clone(),
            }),
        }
    }

    /// Binds two dereferenced addresses, at least one of which must hold an unbound variable
    pub fn bind(&mut self, a1: Address, a2: Address) -> Result<(), UnificationError> {
        match (self.dereferenced(a1)?, self.dereferenced(a2)?) {
            (Dereferenced::Unbound(h1), Dereferenced::Unbound(h2)) => {
                // Younger variables point at older ones, never the reverse
                if h1 < h2 {
                    self.bind_variable(h2, a1)
                } else {
                    self.bind_variable(h1, a2)
                }
            }
            (Dereferenced::Unbound(h1), Dereferenced::Structure(_)) => self.bind_variable(h1, a2),
            (Dereferenced::Structure(_), Dereferenced::Unbound(h2)) => self.bind_variable(h2, a1),
            (Dereferenced::Structure(_), Dereferenced::Structure(_)) => {
                Err(BindingInvariantViolation {
                    left: a1,
                    right: a2,
                }
                .into())
            }
        }
    }

    fn bind_variable(
        &mut self,
        variable: HeapAddress,
        value: Address,
    ) -> Result<(), UnificationError> {
        log_trace!("Binding {} to {}", variable, value);

        let cell = match value {
            Address::Heap(value) => Cell::Ref(value),
            // Registers and locals aren't heap addressable, so take a copy of the structure pointer
            Address::Register(_) | Address::Local(_) => self.load(value)?.clone(),
        };

        Ok(self.store(Address::Heap(variable), cell)?)
    }

    /// Unifies the terms at `a1` and `a2`, using an explicit worklist rather than recursion
    pub fn unify(&mut self, a1: Address, a2: Address) -> Result<(), UnificationError> {
        let mut pdl = Vec::from([(a1, a2)]);

        while let Some((a1, a2)) = pdl.pop() {
            let d1 = self.deref(a1)?;
            let d2 = self.deref(a2)?;

            if d1 == d2 {
                continue;
            }

            match (self.dereferenced(d1)?, self.dereferenced(d2)?) {
                (Dereferenced::Unbound(_), _) | (_, Dereferenced::Unbound(_)) => {
                    self.bind(d1, d2)?
                }
                (Dereferenced::Structure(f1), Dereferenced::Structure(f2)) => {
                    let left = self.functor_at(f1)?;
                    let right = self.functor_at(f2)?;

                    if left != right {
                        log_trace!("Cannot unify {} with {}", left, right);
                        return Err(UnificationError::Mismatch {
                            left: left.clone(),
                            right: right.clone(),
                        });
                    }

                    let arity = usize::from(left.arity.0);

                    // Pushed in reverse so the first argument is unified first
                    for index in (1..=arity).rev() {
                        pdl.push((
                            Address::Heap(f1.offset(index)),
                            Address::Heap(f2.offset(index)),
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}
