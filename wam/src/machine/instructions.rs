use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use core::{fmt, str::SplitWhitespace};

use itertools::Itertools;

use super::basic_types::{Arity, Functor, ProgramCounter, Register, RegisterIndex, Yn};

/// A procedure label, written `name/arity`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure<'p> {
    pub name: &'p str,
    pub arity: Arity,
}

impl<'p> Procedure<'p> {
    fn parse_label(line: &'p str) -> Option<Self> {
        let (name, arity) = line.rsplit_once('/')?;

        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }

        Some(Self {
            name,
            arity: parse_arity(arity).ok()?,
        })
    }
}

impl<'p> fmt::Display for Procedure<'p> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    EmptyLine,
    UnknownOpcode(String),
    OperandCount {
        opcode: &'static str,
        expected: usize,
    },
    BadRegister(String),
    BadArity(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::EmptyLine => write!(f, "empty line"),
            DecodeError::UnknownOpcode(opcode) => write!(f, "unknown opcode {:?}", opcode),
            DecodeError::OperandCount { opcode, expected } => {
                write!(f, "{} takes {} operands", opcode, expected)
            }
            DecodeError::BadRegister(token) => write!(f, "bad register {:?}", token),
            DecodeError::BadArity(token) => write!(f, "bad arity {:?}", token),
        }
    }
}

fn parse_arity(token: &str) -> Result<Arity, DecodeError> {
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::BadArity(token.to_string()));
    }

    token
        .parse()
        .map(Arity)
        .map_err(|_| DecodeError::BadArity(token.to_string()))
}

fn parse_register(token: &str) -> Result<Register, DecodeError> {
    let bad_register = || DecodeError::BadRegister(token.to_string());

    let mut chars = token.chars();
    let tag = chars.next().ok_or_else(bad_register)?;
    let index = chars.as_str();

    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad_register());
    }

    let index = index.parse::<usize>().map_err(|_| bad_register())?;

    match tag {
        'X' | 'x' | 'A' | 'a' => Ok(Register::Argument(RegisterIndex(index))),
        'Y' | 'y' => Ok(Register::Local(Yn { yn: index })),
        _ => Err(bad_register()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction<'p> {
    GetStructure { f: Functor, register: Register },
    GetVariable { x: Register, a: Register },
    GetValue { x: Register, a: Register },
    PutVariable { x: Register, a: Register },
    PutValue { x: Register, a: Register },
    PutStructure { f: Functor, x: Register },
    Allocate { n: Arity },
    Deallocate,
    Call { procedure: Procedure<'p> },
}

impl<'p> fmt::Display for Instruction<'p> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::GetStructure {
                f: functor,
                register,
            } => write!(
                f,
                "get_structure {} {} {}",
                functor.name, functor.arity, register
            ),
            Instruction::GetVariable { x, a } => write!(f, "get_variable {} {}", x, a),
            Instruction::GetValue { x, a } => write!(f, "get_value {} {}", x, a),
            Instruction::PutVariable { x, a } => write!(f, "put_variable {} {}", x, a),
            Instruction::PutValue { x, a } => write!(f, "put_value {} {}", x, a),
            Instruction::PutStructure { f: functor, x } => {
                write!(f, "put_structure {} {} {}", functor.name, functor.arity, x)
            }
            Instruction::Allocate { n } => write!(f, "allocate {}", n),
            Instruction::Deallocate => write!(f, "deallocate"),
            Instruction::Call { procedure } => {
                write!(f, "call {} {}", procedure.name, procedure.arity)
            }
        }
    }
}

/// A decoded program line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'p> {
    Label(Procedure<'p>),
    Instruction(Instruction<'p>),
}

impl<'p> Line<'p> {
    pub fn decode(line: &'p str) -> Result<Self, DecodeError> {
        let mut tokens = line.split_whitespace();

        let opcode = tokens.next().ok_or(DecodeError::EmptyLine)?;

        let instruction = match opcode.to_ascii_lowercase().as_str() {
            "get_structure" => {
                let (f, register) = structure_operands("get_structure", tokens)?;
                Instruction::GetStructure { f, register }
            }
            "get_variable" => {
                let (x, a) = register_operands("get_variable", tokens)?;
                Instruction::GetVariable { x, a }
            }
            "get_value" => {
                let (x, a) = register_operands("get_value", tokens)?;
                Instruction::GetValue { x, a }
            }
            "put_variable" => {
                let (x, a) = register_operands("put_variable", tokens)?;
                Instruction::PutVariable { x, a }
            }
            "put_value" => {
                let (x, a) = register_operands("put_value", tokens)?;
                Instruction::PutValue { x, a }
            }
            "put_structure" => {
                let (f, x) = structure_operands("put_structure", tokens)?;
                Instruction::PutStructure { f, x }
            }
            "allocate" => {
                let (n,) = tokens
                    .collect_tuple()
                    .ok_or_else(|| operand_count("allocate", 1))?;
                Instruction::Allocate {
                    n: parse_arity(n)?,
                }
            }
            "deallocate" => {
                if tokens.next().is_some() {
                    return Err(operand_count("deallocate", 0));
                }
                Instruction::Deallocate
            }
            "call" => {
                let (name, arity) = tokens
                    .collect_tuple()
                    .ok_or_else(|| operand_count("call", 2))?;
                Instruction::Call {
                    procedure: Procedure {
                        name,
                        arity: parse_arity(arity)?,
                    },
                }
            }
            _ => {
                if tokens.next().is_none() {
                    if let Some(procedure) = Procedure::parse_label(opcode) {
                        return Ok(Line::Label(procedure));
                    }
                }

                return Err(DecodeError::UnknownOpcode(opcode.to_string()));
            }
        };

        Ok(Line::Instruction(instruction))
    }
}

fn operand_count(opcode: &'static str, expected: usize) -> DecodeError {
    DecodeError::OperandCount { opcode, expected }
}

fn register_operands(
    opcode: &'static str,
    tokens: SplitWhitespace,
) -> Result<(Register, Register), DecodeError> {
    let (x, a) = tokens
        .collect_tuple()
        .ok_or_else(|| operand_count(opcode, 2))?;

    Ok((parse_register(x)?, parse_register(a)?))
}

fn structure_operands(
    opcode: &'static str,
    tokens: SplitWhitespace,
) -> Result<(Functor, Register), DecodeError> {
    let (name, arity, register) = tokens
        .collect_tuple()
        .ok_or_else(|| operand_count(opcode, 3))?;

    Ok((
        Functor::new(name, parse_arity(arity)?),
        parse_register(register)?,
    ))
}

/// An immutable sequence of program lines, addressed by [ProgramCounter]
#[derive(Debug, Clone, Default)]
pub struct Program {
    lines: Vec<String>,
}

impl Program {
    pub fn new<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// One line per instruction or label. Blank lines are dropped
    pub fn from_text(text: &str) -> Self {
        Self::new(text.lines().map(str::trim).filter(|line| !line.is_empty()))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, pc: ProgramCounter) -> Option<&str> {
        self.lines.get(pc.into_usize()).map(String::as_str)
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.lines.iter().map(String::as_str)
    }

    /// The position of the first label matching `procedure`
    pub fn find_procedure(&self, procedure: &Procedure) -> Option<ProgramCounter> {
        self.lines
            .iter()
            .position(|line| Procedure::parse_label(line.trim()).as_ref() == Some(procedure))
            .map(ProgramCounter)
    }

    pub fn digest(&self) -> comms::Hash {
        comms::Hash::of_lines(self.lines())
    }
}
