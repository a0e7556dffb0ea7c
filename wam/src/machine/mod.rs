use alloc::string::{String, ToString};
use core::fmt;

use crate::{log_debug, log_error, log_info, log_trace, log_warn};

mod basic_types;
mod instructions;
mod memory;

pub use basic_types::{
    Address, Arity, Cell, Functor, HeapAddress, ProgramCounter, Register, RegisterIndex, Yn,
};
pub use instructions::{DecodeError, Instruction, Line, Procedure, Program};
pub use memory::{
    structure_iteration::ReadWriteMode, BindingInvariantViolation, MemoryError, StackSlot,
    UnificationError,
};

use memory::{structure_iteration::State as StructureIterationState, Dereferenced, Memory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    UnknownInstruction(DecodeError),
    AddressingViolation(MemoryError),
    UnificationMismatch { left: Functor, right: Functor },
    ProcedureNotFound { name: String, arity: Arity },
    BindingInvariantViolation(BindingInvariantViolation),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownInstruction(inner) => write!(f, "Unknown instruction: {}", inner),
            Error::AddressingViolation(inner) => write!(f, "Addressing violation: {}", inner),
            Error::UnificationMismatch { left, right } => {
                write!(f, "Unification mismatch: {} does not unify with {}", left, right)
            }
            Error::ProcedureNotFound { name, arity } => {
                write!(f, "Procedure not found: {}/{}", name, arity)
            }
            Error::BindingInvariantViolation(inner) => {
                write!(f, "Binding invariant violation: {}", inner)
            }
        }
    }
}

impl From<DecodeError> for Error {
    fn from(inner: DecodeError) -> Self {
        Self::UnknownInstruction(inner)
    }
}

impl From<MemoryError> for Error {
    fn from(inner: MemoryError) -> Self {
        Self::AddressingViolation(inner)
    }
}

impl From<UnificationError> for Error {
    fn from(inner: UnificationError) -> Self {
        match inner {
            UnificationError::Mismatch { left, right } => Self::UnificationMismatch { left, right },
            UnificationError::Binding(inner) => Self::BindingInvariantViolation(inner),
            UnificationError::Memory(inner) => Self::AddressingViolation(inner),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// A fatal error, with the instruction which raised it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFailure {
    pub pc: ProgramCounter,
    pub instruction: String,
    pub error: Error,
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {} ({:?})", self.error, self.pc, self.instruction)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ExecutionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
}

/// `H`, `P`, `CP`, `E`, `S`, and `MODE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineRegisters {
    pub h: HeapAddress,
    pub p: ProgramCounter,
    pub cp: ProgramCounter,
    pub e: usize,
    pub s: HeapAddress,
    pub mode: ReadWriteMode,
}

impl From<MachineRegisters> for comms::MachineRegisters {
    fn from(
        MachineRegisters {
            h,
            p,
            cp,
            e,
            s,
            mode,
        }: MachineRegisters,
    ) -> Self {
        Self {
            h: h.into(),
            p: p.into(),
            cp: cp.into(),
            e,
            s: s.into(),
            mode: mode.into(),
        }
    }
}

/// The result of following an address to the end of its reference chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'m> {
    Unbound(HeapAddress),
    Structure {
        functor: &'m Functor,
        first_argument: HeapAddress,
    },
}

/// A read-only view of a machine's memory and registers
pub struct Inspect<'m> {
    memory: &'m Memory,
    registers: MachineRegisters,
}

impl<'m> Inspect<'m> {
    pub fn heap(&self) -> &'m [Cell] {
        self.memory.heap()
    }

    /// The argument registers. `None` marks a register which has never been written
    pub fn argument_registers(&self) -> &'m [Option<Cell>] {
        self.memory.registers()
    }

    pub fn stack(&self) -> &'m [StackSlot] {
        self.memory.stack()
    }

    pub fn registers(&self) -> MachineRegisters {
        self.registers
    }

    pub fn load(&self, address: Address) -> Result<&'m Cell, MemoryError> {
        self.memory.load(address)
    }

    pub fn resolve(&self, address: impl Into<Address>) -> Result<Resolved<'m>, MemoryError> {
        let memory = self.memory;
        let address = memory.deref(address.into())?;

        Ok(match memory.dereferenced(address)? {
            Dereferenced::Unbound(variable) => Resolved::Unbound(variable),
            Dereferenced::Structure(functor_address) => Resolved::Structure {
                functor: memory.functor_at(functor_address)?,
                first_argument: functor_address.offset(1),
            },
        })
    }
}

/// Everything the instructions mutate
#[derive(Debug)]
struct Engine {
    pc: ProgramCounter,
    cp: ProgramCounter,
    structure_iteration_state: StructureIterationState,
    memory: Memory,
    halted: bool,
}

impl Engine {
    fn new() -> Self {
        Self {
            pc: ProgramCounter::START,
            cp: ProgramCounter::START,
            structure_iteration_state: StructureIterationState::new(),
            memory: Memory::new(),
            halted: false,
        }
    }

    fn registers(&self) -> MachineRegisters {
        MachineRegisters {
            h: self.memory.heap_top(),
            p: self.pc,
            cp: self.cp,
            e: self.memory.current_environment(),
            s: self.structure_iteration_state.next_argument(),
            mode: self.structure_iteration_state.read_write_mode(),
        }
    }

    fn execute(&mut self, program: &Program, line: Line) -> Result<(), Error> {
        let instruction = match line {
            Line::Label(procedure) => {
                log_trace!("Passing label {}", procedure);
                self.pc = self.pc.offset(1);
                return Ok(());
            }
            Line::Instruction(instruction) => instruction,
        };

        match instruction {
            Instruction::GetStructure { f, register } => {
                let address = self.memory.deref(register.into())?;

                match self.memory.dereferenced(address)? {
                    Dereferenced::Unbound(_) => {
                        log_trace!("Writing structure {}", f);
                        let structure = self.memory.new_structure(f);
                        self.memory.bind(address, Address::Heap(structure))?;
                        self.structure_iteration_state.start_writing();
                    }
                    Dereferenced::Structure(functor_address) => {
                        let found = self.memory.functor_at(functor_address)?;
                        if *found != f {
                            return Err(Error::UnificationMismatch {
                                left: f,
                                right: found.clone(),
                            });
                        }
                        log_trace!("Reading structure {}", f);
                        self.structure_iteration_state
                            .start_reading(functor_address.offset(1));
                    }
                }
            }
            Instruction::GetVariable { x, a } => {
                let cell = self.memory.load(a.into())?.clone();
                self.memory.store(x.into(), cell)?;
            }
            Instruction::GetValue { x, a } => {
                self.memory.unify(x.into(), a.into())?;
            }
            Instruction::PutVariable { x, a } => {
                let variable = self.memory.new_variable();
                self.memory.store(x.into(), Cell::Ref(variable))?;
                self.memory.store(a.into(), Cell::Ref(variable))?;
            }
            Instruction::PutValue { x, a } => {
                let cell = self.memory.load(x.into())?.clone();
                self.memory.store(a.into(), cell)?;
            }
            Instruction::PutStructure { f, x } => {
                let structure = self.memory.new_structure(f);
                self.memory
                    .store(x.into(), Cell::Structure(structure.offset(1)))?;
            }
            Instruction::Allocate { n } => {
                self.memory.allocate(n, self.cp)?;
            }
            Instruction::Deallocate => {
                self.pc = self.memory.deallocate()?;

                if !self.memory.has_environment() {
                    log_trace!("No frames remain");
                    self.halted = true;
                }

                return Ok(());
            }
            Instruction::Call { procedure } => {
                let label =
                    program
                        .find_procedure(&procedure)
                        .ok_or_else(|| Error::ProcedureNotFound {
                            name: procedure.name.to_string(),
                            arity: procedure.arity,
                        })?;

                log_trace!("Calling {} at {}", procedure, label);

                self.cp = self.pc.offset(1);
                self.pc = label.offset(1);

                return Ok(());
            }
        }

        self.pc = self.pc.offset(1);

        Ok(())
    }
}

/// A deterministic unification machine running a single [Program]
#[derive(Debug)]
pub struct Machine {
    program: Program,
    engine: Engine,
    failure: Option<ExecutionFailure>,
}

impl Machine {
    pub fn new(program: Program) -> Self {
        log_info!(
            "Loaded program of {} lines, digest {:X}",
            program.len(),
            program.digest()
        );

        Self {
            program,
            engine: Engine::new(),
            failure: None,
        }
    }

    /// Installs `program`, clearing all memory and resetting every register
    pub fn load(&mut self, program: Program) {
        *self = Self::new(program);
    }

    /// Sets `P`. Also allows a halted machine to run again, but a failed machine stays failed
    pub fn set_entry(&mut self, entry: ProgramCounter) {
        log_debug!("Entry point: {}", entry);

        if self.program.line(entry).is_none() {
            log_warn!("Entry point {} is past the end of the program", entry);
        }

        self.engine.pc = entry;
        self.engine.halted = false;
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn failure(&self) -> Option<&ExecutionFailure> {
        self.failure.as_ref()
    }

    fn status(&self) -> Status {
        if self.engine.halted || self.program.line(self.engine.pc).is_none() {
            Status::Halted
        } else {
            Status::Running
        }
    }

    /// Executes the instruction at `P`
    pub fn step(&mut self) -> Result<Status, ExecutionFailure> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        if self.engine.halted {
            return Ok(Status::Halted);
        }

        let pc = self.engine.pc;

        let Some(text) = self.program.line(pc) else {
            return Ok(Status::Halted);
        };

        log_debug!("{}: {}", pc, text);

        let result = Line::decode(text)
            .map_err(Error::from)
            .and_then(|line| self.engine.execute(&self.program, line));

        if let Err(error) = result {
            let failure = ExecutionFailure {
                pc,
                instruction: text.to_string(),
                error,
            };

            log_error!("{}", failure);

            self.failure = Some(failure.clone());

            return Err(failure);
        }

        let status = self.status();

        if let Status::Halted = status {
            log_info!("Halted with P = {}", self.engine.pc);
        }

        Ok(status)
    }

    /// Steps until the machine halts or fails
    pub fn run(&mut self) -> Result<(), ExecutionFailure> {
        while let Status::Running = self.step()? {}

        Ok(())
    }

    pub fn inspect(&self) -> Inspect<'_> {
        Inspect {
            memory: &self.engine.memory,
            registers: self.engine.registers(),
        }
    }

    pub fn snapshot(&self) -> comms::Snapshot {
        let memory = &self.engine.memory;

        comms::Snapshot {
            program_digest: self.program.digest(),
            status: match (&self.failure, self.status()) {
                (Some(_), _) => comms::Status::Failed,
                (None, Status::Running) => comms::Status::Running,
                (None, Status::Halted) => comms::Status::Halted,
            },
            registers: self.engine.registers().into(),
            heap: memory.heap().iter().map(comms::Cell::from).collect(),
            argument_registers: memory
                .registers()
                .iter()
                .map(|register| register.as_ref().map(comms::Cell::from))
                .collect(),
            stack: memory.stack().iter().map(comms::StackSlot::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACTS_AND_RULE: &str = "
        q/2
        allocate 0
        get_structure a 0 A1
        get_structure b 0 A2
        deallocate
        r/2
        allocate 0
        get_structure b 0 A1
        get_structure c 0 A2
        deallocate
        p/2
        allocate 3
        get_variable Y1 A1
        get_variable Y2 A2
        put_value Y1 A1
        put_variable Y3 A2
        call q 2
        put_value Y3 A1
        put_value Y2 A2
        call r 2
        deallocate
        query/0
        allocate 2
        put_variable Y1 A1
        put_variable Y2 A2
        call p 2
        put_value Y1 X1
        put_value Y2 X2
        deallocate
    ";

    fn x(index: usize) -> Address {
        Address::Register(RegisterIndex(index))
    }

    fn machine_at_query(text: &str) -> Machine {
        let program = Program::from_text(text);
        let entry = program
            .find_procedure(&Procedure {
                name: "query",
                arity: Arity(0),
            })
            .unwrap()
            .offset(1);

        let mut machine = Machine::new(program);
        machine.set_entry(entry);
        machine
    }

    fn functor_of(machine: &Machine, address: Address) -> Functor {
        match machine.inspect().resolve(address).unwrap() {
            Resolved::Structure { functor, .. } => functor.clone(),
            resolved => panic!("{:?} is not a structure", resolved),
        }
    }

    #[test]
    fn query_is_answered_through_nested_calls() {
        let mut machine = machine_at_query(FACTS_AND_RULE);

        let mut steps = 0;
        while machine.step().unwrap() == Status::Running {
            steps += 1;
            assert!(steps < 100, "the query should finish");
        }

        assert_eq!(functor_of(&machine, x(1)), Functor::new("a", Arity(0)));
        assert_eq!(functor_of(&machine, x(2)), Functor::new("c", Arity(0)));

        let registers = machine.inspect().registers();
        assert_eq!(registers.e, 0);
        assert_eq!(registers.h, HeapAddress(9));

        assert_eq!(machine.step(), Ok(Status::Halted));
    }

    #[test]
    fn mismatch_stops_the_machine_and_preserves_the_heap() {
        let mut machine = Machine::new(Program::from_text(
            "
            put_structure f 1 X1
            put_structure a 0 X2
            put_structure g 1 X3
            put_structure a 0 X4
            get_value X1 X3
            ",
        ));

        for _ in 0..4 {
            assert_eq!(machine.step(), Ok(Status::Running));
        }

        let heap_before = machine.inspect().heap().to_vec();

        let failure = machine.step().unwrap_err();
        assert_eq!(failure.pc, ProgramCounter(4));
        assert_eq!(failure.instruction, "get_value X1 X3");
        assert_eq!(
            failure.error,
            Error::UnificationMismatch {
                left: Functor::new("f", Arity(1)),
                right: Functor::new("g", Arity(1)),
            }
        );

        assert_eq!(machine.inspect().heap(), &heap_before[..]);
        assert_eq!(machine.inspect().registers().p, ProgramCounter(4));
        assert_eq!(machine.failure(), Some(&failure));
        assert_eq!(machine.step(), Err(failure));
    }

    #[test]
    fn structure_round_trip_enters_read_mode() {
        let mut machine = Machine::new(Program::from_text(
            "
            put_structure f 2 X1
            get_structure f 2 X1
            ",
        ));

        machine.step().unwrap();
        let h = machine.inspect().registers().h;

        assert_eq!(machine.step(), Ok(Status::Halted));

        let registers = machine.inspect().registers();
        assert_eq!(registers.mode, ReadWriteMode::Read);
        assert_eq!(registers.s, HeapAddress(2));
        assert_eq!(registers.h, h);
        assert_eq!(
            machine.inspect().resolve(x(1)),
            Ok(Resolved::Structure {
                functor: &Functor::new("f", Arity(2)),
                first_argument: HeapAddress(2),
            })
        );
    }

    #[test]
    fn get_structure_on_a_variable_builds_the_structure() {
        let mut machine = Machine::new(Program::from_text(
            "
            put_variable X1 A2
            get_structure h 0 A2
            ",
        ));

        machine.run().unwrap();

        let inspect = machine.inspect();
        assert_eq!(inspect.registers().mode, ReadWriteMode::Write);
        assert_eq!(inspect.heap()[0], Cell::Ref(HeapAddress(1)));
        assert_eq!(inspect.heap()[1], Cell::Structure(HeapAddress(2)));
        assert_eq!(functor_of(&machine, x(1)), Functor::new("h", Arity(0)));
    }

    #[test]
    fn get_structure_reports_a_different_functor() {
        let mut machine = Machine::new(Program::from_text(
            "
            put_structure f 1 X1
            get_structure f 2 X1
            ",
        ));

        machine.step().unwrap();

        assert_eq!(
            machine.step().map_err(|failure| failure.error),
            Err(Error::UnificationMismatch {
                left: Functor::new("f", Arity(2)),
                right: Functor::new("f", Arity(1)),
            })
        );
    }

    #[test]
    fn allocate_then_deallocate_returns_to_the_continuation() {
        let mut machine = machine_at_query(
            "
            empty/0
            allocate 4
            deallocate
            query/0
            allocate 1
            call empty 0
            put_variable X1 A1
            deallocate
            ",
        );

        machine.step().unwrap();
        let before = machine.inspect().registers();
        assert_eq!(before.e, 3);

        machine.step().unwrap();
        assert_eq!(machine.inspect().registers().p, ProgramCounter(1));

        machine.step().unwrap();
        assert_eq!(machine.inspect().registers().e, 7);

        assert_eq!(machine.step(), Ok(Status::Running));
        let after = machine.inspect().registers();
        assert_eq!(after.p, ProgramCounter(6));
        assert_eq!(after.e, before.e);

        assert_eq!(machine.step(), Ok(Status::Running));
        assert_eq!(machine.step(), Ok(Status::Halted));
    }

    #[test]
    fn unknown_opcodes_are_fatal() {
        let mut machine = Machine::new(Program::new(["unify_variable X1"]));

        let failure = machine.step().unwrap_err();

        assert_eq!(failure.pc, ProgramCounter(0));
        assert!(matches!(failure.error, Error::UnknownInstruction(_)));
    }

    #[test]
    fn missing_procedures_are_fatal() {
        let mut machine = Machine::new(Program::from_text(
            "
            p/1
            call p 2
            ",
        ));
        machine.set_entry(ProgramCounter(1));

        assert_eq!(
            machine.run().map_err(|failure| failure.error),
            Err(Error::ProcedureNotFound {
                name: "p".into(),
                arity: Arity(2),
            })
        );
    }

    #[test]
    fn reading_an_unwritten_register_is_an_addressing_violation() {
        let mut machine = Machine::new(Program::new(["put_value X3 A1"]));

        assert_eq!(
            machine.step().map_err(|failure| failure.error),
            Err(Error::AddressingViolation(MemoryError::RegisterHasNoValue {
                index: RegisterIndex(3)
            }))
        );
    }

    #[test]
    fn labels_reached_in_sequence_are_skipped() {
        let mut machine = Machine::new(Program::from_text(
            "
            start/0
            put_variable X1 A2
            ",
        ));

        assert_eq!(machine.step(), Ok(Status::Running));
        assert_eq!(machine.inspect().registers().p, ProgramCounter(1));
        assert_eq!(machine.step(), Ok(Status::Halted));
    }

    #[test]
    fn load_resets_everything() {
        let mut machine = machine_at_query(FACTS_AND_RULE);
        machine.run().unwrap();

        machine.load(Program::new(["put_value X1 A1"]));

        let inspect = machine.inspect();
        assert!(inspect.heap().is_empty());
        assert!(inspect.argument_registers().is_empty());
        assert_eq!(
            inspect.stack(),
            &[StackSlot::Word(0), StackSlot::Word(0), StackSlot::Word(0)]
        );
        assert_eq!(
            inspect.registers(),
            MachineRegisters {
                h: HeapAddress(0),
                p: ProgramCounter(0),
                cp: ProgramCounter(0),
                e: 0,
                s: HeapAddress(0),
                mode: ReadWriteMode::Read,
            }
        );
    }

    #[test]
    fn snapshot_reflects_the_machine() {
        let mut machine = machine_at_query(FACTS_AND_RULE);
        machine.run().unwrap();

        let snapshot = machine.snapshot();

        assert_eq!(snapshot.status, comms::Status::Halted);
        assert_eq!(snapshot.program_digest, machine.program().digest());
        assert_eq!(snapshot.heap.len(), 9);
        assert_eq!(snapshot.registers.e, 0);
        assert_eq!(
            comms::Snapshot::decode_from_slice(&snapshot.encode_to_vec().unwrap()).unwrap(),
            snapshot
        );

        let mut machine = Machine::new(Program::new(["bogus"]));
        machine.step().unwrap_err();
        assert_eq!(machine.snapshot().status, comms::Status::Failed);
    }
}
