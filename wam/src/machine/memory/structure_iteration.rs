use crate::{log_trace, machine::basic_types::HeapAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadWriteMode {
    Read,
    Write,
}

impl From<ReadWriteMode> for comms::ReadWriteMode {
    fn from(mode: ReadWriteMode) -> Self {
        match mode {
            ReadWriteMode::Read => Self::Read,
            ReadWriteMode::Write => Self::Write,
        }
    }
}

/// `MODE` and `S`, set by `get_structure`
///
/// In read mode, `S` addresses the next argument of the structure being matched.
/// In write mode, the arguments are yet to be written and `S` is left untouched.
#[derive(Debug, Clone)]
pub struct State {
    read_write_mode: ReadWriteMode,
    next_argument: HeapAddress,
}

impl State {
    pub fn new() -> Self {
        Self {
            read_write_mode: ReadWriteMode::Read,
            next_argument: HeapAddress::ZERO,
        }
    }

    pub fn start_reading(&mut self, first_argument: HeapAddress) {
        log_trace!("Reading structure arguments from {}", first_argument);

        self.read_write_mode = ReadWriteMode::Read;
        self.next_argument = first_argument;
    }

    pub fn start_writing(&mut self) {
        log_trace!("Writing structure arguments");

        self.read_write_mode = ReadWriteMode::Write;
    }

    pub fn read_write_mode(&self) -> ReadWriteMode {
        self.read_write_mode
    }

    pub fn next_argument(&self) -> HeapAddress {
        self.next_argument
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_reading_at_zero() {
        let state = State::new();

        assert_eq!(state.read_write_mode(), ReadWriteMode::Read);
        assert_eq!(state.next_argument(), HeapAddress::ZERO);
    }

    #[test]
    fn writing_keeps_the_last_read_position() {
        let mut state = State::new();

        state.start_reading(HeapAddress(5));
        state.start_writing();

        assert_eq!(state.read_write_mode(), ReadWriteMode::Write);
        assert_eq!(state.next_argument(), HeapAddress(5));

        state.start_reading(HeapAddress(9));

        assert_eq!(state.read_write_mode(), ReadWriteMode::Read);
        assert_eq!(state.next_argument(), HeapAddress(9));
    }
}
