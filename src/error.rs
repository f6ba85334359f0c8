//! Compiler error implementation.
//!
//! Every unrecoverable condition the lowerings can hit maps to one
//! [`CompileError`] variant. The compiler never recovers from these; they
//! propagate to the binary, which prints a `fatal:` diagnostic and exits
//! with code 1. Recoverable observations go through
//! [`crate::diagnostics::Reporter`] instead.

use std::io;
use thiserror::Error;

use crate::compiler::pool::PoolDump;

/// Convenience alias for fallible compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Fatal compilation error variants.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The script-local variable pool has no free run of the requested size.
    /// Carries a dump of the live allocations as a diagnostic aid.
    #[error("out of pool space\n{0}")]
    OutOfPool(PoolDump),
    /// `drop` or an internal release referenced a name with no live cell.
    #[error("no variable named \"{0}\"")]
    UnknownVariable(String),
    /// An operation destination or operand is not a live pool variable.
    #[error("use of undeclared variable \"{0}\"")]
    UndeclaredVariable(String),
    /// A script called a name its environment does not define.
    #[error("definition of {0} not found")]
    MissingDefinition(String),
    /// A lowering needed a primitive the environment does not provide.
    #[error(
        "definition of {0} not found\n\
         please `use std;` in your environment or provide an implementation of {0}"
    )]
    MissingPrimitive(String),
    /// Fewer caller arguments than a bytecode definition's parameters.
    #[error("not enough arguments to {name} (expected {expected}, found {found})")]
    NotEnoughArguments {
        /// Callee name.
        name: String,
        /// Parameter count of the definition.
        expected: usize,
        /// Arguments actually supplied.
        found: usize,
    },
    /// A macro definition aliases a name that is not a bytecode definition.
    #[error("{mac} must alias a bytecode definition, but {alias} is not one")]
    NonBytecodeAlias {
        /// The macro being emitted.
        mac: String,
        /// The name it aliases.
        alias: String,
    },
    /// Neither side of a copy is a pool variable.
    #[error("cannot copy between two global vars")]
    OffPoolCopy,
    /// A value width outside the 1..=4 byte range was requested.
    #[error("cannot output value of size {0}")]
    UnsupportedWidth(usize),
    /// `repeat` counters are at most 16 bits wide.
    #[error("repeat is limited to 65536 iterations (got {0})")]
    RepeatTooLarge(u32),
    /// Positional `$n` references are only meaningful inside `mac` bodies.
    #[error("positional arguments are only allowed in macro definitions")]
    PositionalArgOutsideMacro,
    /// A statement kind with no lowering path was encountered.
    #[error("`{0}` is not supported by the bytecode target")]
    Unsupported(&'static str),
    /// Accumulated non-fatal errors escalated at a checkpoint.
    #[error("failed with {0} error{s}", s = plural(.0))]
    ErrorsReported(usize),
    /// I/O failure on the output sink.
    #[error("unrecoverable error: {0}")]
    Io(#[from] io::Error),
}

fn plural(count: &usize) -> &'static str {
    if *count == 1 {
        ""
    } else {
        "s"
    }
}

/// Front-end syntax error variants.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A character outside the language's alphabet.
    #[error("line {line}: unexpected character {found:?}")]
    UnexpectedCharacter {
        /// Source line of the offending character.
        line: usize,
        /// The character itself.
        found: char,
    },
    /// A token that does not fit the grammar at this position.
    #[error("line {line}: unexpected {found}, expected {expected}")]
    UnexpectedToken {
        /// Source line of the offending token.
        line: usize,
        /// Rendering of the token found.
        found: String,
        /// What the parser was looking for.
        expected: &'static str,
    },
    /// The input ended mid-construct.
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof {
        /// What the parser was looking for.
        expected: &'static str,
    },
    /// A numeric literal that does not fit 32 bits or uses bad digits.
    #[error("line {line}: invalid number \"{text}\"")]
    InvalidNumber {
        /// Source line of the literal.
        line: usize,
        /// The literal text.
        text: String,
    },
    /// A string literal with no closing quote.
    #[error("line {line}: unterminated string literal")]
    UnterminatedString {
        /// Source line where the string opened.
        line: usize,
    },
    /// A `/*` comment with no closing `*/`.
    #[error("line {line}: unterminated block comment")]
    UnterminatedComment {
        /// Source line where the comment opened.
        line: usize,
    },
    /// Any other structural problem, described in prose.
    #[error("line {line}: {message}")]
    Invalid {
        /// Source line of the construct.
        line: usize,
        /// Description of the problem.
        message: String,
    },
}
