use crate::log_trace;

use super::{
    Memory, MemoryError, StackSlot, BASE_ENVIRONMENT, FRAME_HEADER_SIZE, FRAME_SIZE,
    SAVED_CONTINUATION_POINT, SAVED_ENVIRONMENT,
};
use crate::machine::basic_types::{Arity, ProgramCounter};

impl Memory {
    /// Pushes a frame with `n` local variables above the current one
    pub fn allocate(
        &mut self,
        n: Arity,
        continuation_point: ProgramCounter,
    ) -> Result<(), MemoryError> {
        let continuation_environment = self.current_environment;
        let current_size = self.load_word(continuation_environment + FRAME_SIZE)?;
        let new_environment = continuation_environment + current_size + FRAME_HEADER_SIZE;

        self.store_stack(
            new_environment + SAVED_ENVIRONMENT,
            StackSlot::Word(continuation_environment),
        );
        self.store_stack(
            new_environment + SAVED_CONTINUATION_POINT,
            StackSlot::Word(continuation_point.into_usize()),
        );
        self.store_stack(
            new_environment + FRAME_SIZE,
            StackSlot::Word(usize::from(n.0)),
        );

        self.current_environment = new_environment;

        log_trace!("E => {}", self.current_environment);

        Ok(())
    }

    /// Pops the current frame, returning its saved continuation point
    pub fn deallocate(&mut self) -> Result<ProgramCounter, MemoryError> {
        let continuation_point =
            self.load_word(self.current_environment + SAVED_CONTINUATION_POINT)?;
        let continuation_environment =
            self.load_word(self.current_environment + SAVED_ENVIRONMENT)?;

        self.current_environment = continuation_environment;

        log_trace!("E => {}", self.current_environment);
        log_trace!("P => {}", continuation_point);

        Ok(ProgramCounter(continuation_point))
    }

    pub fn has_environment(&self) -> bool {
        self.current_environment != BASE_ENVIRONMENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::basic_types::{Address, Cell, HeapAddress, Yn};

    #[test]
    fn frames_stack_above_their_callers_locals() {
        let mut memory = Memory::new();

        memory.allocate(Arity(2), ProgramCounter(7)).unwrap();
        assert_eq!(memory.current_environment(), 3);
        assert_eq!(
            memory.stack()[3..6],
            [StackSlot::Word(0), StackSlot::Word(7), StackSlot::Word(2)]
        );

        memory
            .store(Address::Local(Yn { yn: 1 }), Cell::Ref(HeapAddress(0)))
            .unwrap();
        assert_eq!(memory.stack()[6], StackSlot::Cell(Cell::Ref(HeapAddress(0))));

        memory.allocate(Arity(0), ProgramCounter(11)).unwrap();
        assert_eq!(memory.current_environment(), 8);

        assert_eq!(memory.deallocate(), Ok(ProgramCounter(11)));
        assert_eq!(memory.current_environment(), 3);
        assert_eq!(
            memory.load(Address::Local(Yn { yn: 1 })),
            Ok(&Cell::Ref(HeapAddress(0)))
        );

        assert_eq!(memory.deallocate(), Ok(ProgramCounter(7)));
        assert_eq!(memory.current_environment(), BASE_ENVIRONMENT);
        assert!(!memory.has_environment());
    }

    #[test]
    fn locals_leave_header_words_alone() {
        let mut memory = Memory::new();
        memory.allocate(Arity(1), ProgramCounter(2)).unwrap();

        memory
            .store(Address::Local(Yn { yn: 1 }), Cell::Ref(HeapAddress(4)))
            .unwrap();

        assert_eq!(memory.deallocate(), Ok(ProgramCounter(2)));
    }

    #[test]
    fn corrupt_headers_are_reported() {
        let mut memory = Memory::new();
        memory.allocate(Arity(1), ProgramCounter(2)).unwrap();
        memory.stack[3] = StackSlot::Empty;

        assert_eq!(
            memory.deallocate(),
            Err(MemoryError::BadFrameHeader { slot: 3 })
        );
    }
}
