#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

use alloc::{string::String, vec::Vec};
use core::fmt;

pub use comms_derive::{CommsFromInto, IndexNewType};
pub use minicbor;

#[derive(Clone, Copy, PartialEq, Eq, IndexNewType, minicbor::Encode, minicbor::Decode)]
#[cbor(transparent)]
pub struct HeapAddress(#[n(0)] pub usize);

#[derive(Clone, Copy, PartialEq, Eq, IndexNewType, minicbor::Encode, minicbor::Decode)]
#[cbor(transparent)]
pub struct Arity(#[n(0)] pub u8);

#[derive(Clone, Copy, PartialEq, Eq, IndexNewType, minicbor::Encode, minicbor::Decode)]
#[cbor(transparent)]
pub struct ProgramCounter(#[n(0)] pub usize);

#[derive(Clone, PartialEq, Eq)]
pub struct Hash(pub sha2::digest::Output<sha2::Sha256>);

impl Hash {
    /// Digest of a program listing, one newline-terminated line at a time
    pub fn of_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        use sha2::digest::{Digest, FixedOutput};
        let mut hasher = sha2::Sha256::new();

        for line in lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }

        Hash(hasher.finalize_fixed())
    }
}

impl fmt::UpperHex for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self, f)
    }
}

impl<C> minicbor::Encode<C> for Hash {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(self.0.as_slice())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Hash {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _ctx: &mut C,
    ) -> Result<Self, minicbor::decode::Error> {
        d.bytes().and_then(|bytes| {
            <[u8; 32]>::try_from(bytes)
                .map(|bytes| Hash(bytes.into()))
                .map_err(|_| minicbor::decode::Error::message("Bad Hash Length"))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Functor {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub arity: Arity,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Cell {
    #[n(0)]
    Ref(#[n(0)] HeapAddress),
    #[n(1)]
    Structure(#[n(0)] HeapAddress),
    #[n(2)]
    Functor(#[n(0)] Functor),
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum StackSlot {
    #[n(0)]
    Empty,
    #[n(1)]
    Word(#[n(0)] usize),
    #[n(2)]
    Cell(#[n(0)] Cell),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum ReadWriteMode {
    #[n(0)]
    Read,
    #[n(1)]
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Status {
    #[n(0)]
    Running,
    #[n(1)]
    Halted,
    #[n(2)]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct MachineRegisters {
    #[n(0)]
    pub h: HeapAddress,
    #[n(1)]
    pub p: ProgramCounter,
    #[n(2)]
    pub cp: ProgramCounter,
    #[n(3)]
    pub e: usize,
    #[n(4)]
    pub s: HeapAddress,
    #[n(5)]
    pub mode: ReadWriteMode,
}

/// An owned copy of a machine's state, for tracers on the far side of a channel
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Snapshot {
    #[n(0)]
    pub program_digest: Hash,
    #[n(1)]
    pub status: Status,
    #[n(2)]
    pub registers: MachineRegisters,
    #[n(3)]
    pub heap: Vec<Cell>,
    #[n(4)]
    pub argument_registers: Vec<Option<Cell>>,
    #[n(5)]
    pub stack: Vec<StackSlot>,
}

impl Snapshot {
    pub fn encode_to_vec(
        &self,
    ) -> Result<Vec<u8>, minicbor::encode::Error<core::convert::Infallible>> {
        minicbor::to_vec(self)
    }

    pub fn decode_from_slice(bytes: &[u8]) -> Result<Self, minicbor::decode::Error> {
        minicbor::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn functor(name: &str, arity: u8) -> Functor {
        Functor {
            name: name.into(),
            arity: Arity(arity),
        }
    }

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            program_digest: Hash::of_lines(["p/0", "allocate 0", "deallocate"]),
            status: Status::Halted,
            registers: MachineRegisters {
                h: HeapAddress(4),
                p: ProgramCounter(3),
                cp: ProgramCounter(0),
                e: 0,
                s: HeapAddress(2),
                mode: ReadWriteMode::Read,
            },
            heap: vec![
                Cell::Ref(HeapAddress(2)),
                Cell::Ref(HeapAddress(1)),
                Cell::Structure(HeapAddress(3)),
                Cell::Functor(functor("a", 0)),
            ],
            argument_registers: vec![None, Some(Cell::Ref(HeapAddress(0)))],
            stack: vec![
                StackSlot::Word(0),
                StackSlot::Word(0),
                StackSlot::Word(0),
                StackSlot::Word(0),
                StackSlot::Word(2),
                StackSlot::Word(1),
                StackSlot::Cell(Cell::Ref(HeapAddress(1))),
                StackSlot::Empty,
            ],
        }
    }

    #[test]
    fn snapshot_survives_cbor() {
        let snapshot = sample_snapshot();

        let bytes = snapshot.encode_to_vec().unwrap();
        let decoded = Snapshot::decode_from_slice(&bytes).unwrap();

        assert_eq!(snapshot, decoded);
    }

    #[test]
    fn program_digest_depends_on_line_boundaries() {
        let split = Hash::of_lines(["allocate 0", "deallocate"]);
        let joined = Hash::of_lines(["allocate 0deallocate"]);

        assert_ne!(split, joined);
        assert_eq!(split, Hash::of_lines(["allocate 0", "deallocate"]));
    }

    #[test]
    fn index_newtypes_format_in_decimal() {
        assert_eq!(format!("{}", HeapAddress(12)), "12");
        assert_eq!(format!("{:?}", Arity(3)), "Arity(3)");
    }
}
