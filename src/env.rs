//! Environments: the "ISA" a script compiles against.
//!
//! An environment binds primitive names to bytecode numbers and parameter
//! layouts. The standard environment mirrors the interpreter shipped with
//! the runtime: control transfer, three-operand arithmetic in four widths,
//! copies between pool and global memory, and width casts. Bytecodes are
//! assigned monotonically from zero in the declaration order below, so the
//! table here is the single source of truth for the instruction numbering.

use std::collections::HashMap;

use strum::IntoEnumIterator;

use crate::ast::{Arg, Op, Width};
use crate::error::{CompileError, CompileResult};

/// How a primitive consumes one argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// The caller supplies a variable operand.
    Arg,
    /// The caller supplies a constant.
    Con,
    /// Start of a variadic tail; meaningful only on assembler-macro
    /// aliases.
    Varargs,
}

/// One parameter slot of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    /// Slot kind.
    pub kind: ParamKind,
    /// Encoded width of the slot.
    pub size: Width,
}

impl Param {
    /// A variable slot of the given width.
    pub const fn arg(size: Width) -> Self {
        Self {
            kind: ParamKind::Arg,
            size,
        }
    }

    /// A constant slot of the given width.
    pub const fn con(size: Width) -> Self {
        Self {
            kind: ParamKind::Con,
            size,
        }
    }

    /// The variadic tail marker.
    pub const fn varargs() -> Self {
        Self {
            kind: ParamKind::Varargs,
            size: Width::Byte,
        }
    }
}

/// A named binding describing how a primitive invocation is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    /// Emit a bytecode, then each caller argument at its parameter width.
    Def {
        /// The bytecode number.
        bytecode: u32,
        /// Parameter layout.
        parameters: Vec<Param>,
    },
    /// Emit the aliased primitive's bytecode with a stored argument
    /// template; `$n` slots splice the caller's arguments in.
    Mac {
        /// Name of the `Def` this macro expands to.
        alias: String,
        /// Argument template, one entry per parameter of the alias.
        arguments: Vec<Arg>,
    },
    /// Emit a call to a downstream assembler macro.
    Alias {
        /// Assembler macro name.
        target: String,
        /// Parameter layout; a `Varargs` entry opens the verbatim tail.
        parameters: Vec<Param>,
    },
}

/// A bundle of definitions plus the script-facing knobs: pool size,
/// section name, terminator byte, and opcode width.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Primitive name to definition.
    pub defines: HashMap<String, Definition>,
    /// Section name for the script prologue; empty or `"none"` suppresses
    /// the section directive.
    pub section: String,
    /// Byte appended after the script body; negative disables it.
    pub terminator: i32,
    /// Script-local variable pool size in bytes.
    pub pool: usize,
    /// Next bytecode number to assign.
    pub bytecode_count: u32,
    /// Width of emitted opcodes.
    pub bytecode_size: Width,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            defines: HashMap::new(),
            section: "ROMX".to_owned(),
            terminator: 0,
            pool: 0,
            bytecode_count: 0,
            bytecode_size: Width::Byte,
        }
    }
}

impl Environment {
    /// An empty environment with the default knobs.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard environment: every primitive the lowerings reference.
    pub fn standard() -> Self {
        let mut env = Self::new();
        env.import_standard();
        env
    }

    /// Look up a definition by name.
    pub fn get_define(&self, name: &str) -> Option<&Definition> {
        self.defines.get(name)
    }

    /// Look up a definition the compiler itself depends on.
    pub fn required_define(&self, name: &str) -> CompileResult<&Definition> {
        self.defines
            .get(name)
            .ok_or_else(|| CompileError::MissingPrimitive(name.to_owned()))
    }

    /// Bind `name` to the next bytecode with the given parameter layout.
    pub fn define(&mut self, name: &str, parameters: Vec<Param>) {
        let bytecode = self.bytecode_count;
        self.bytecode_count += 1;
        self.defines.insert(
            name.to_owned(),
            Definition::Def {
                bytecode,
                parameters,
            },
        );
    }

    /// Bind `name` to a macro over an existing bytecode definition.
    pub fn define_mac(&mut self, name: &str, alias: &str, arguments: Vec<Arg>) {
        self.defines.insert(
            name.to_owned(),
            Definition::Mac {
                alias: alias.to_owned(),
                arguments,
            },
        );
    }

    /// Bind `name` to a downstream assembler macro call.
    pub fn define_alias(&mut self, name: &str, target: &str, parameters: Vec<Param>) {
        self.defines.insert(
            name.to_owned(),
            Definition::Alias {
                target: target.to_owned(),
                parameters,
            },
        );
    }

    /// Merge the standard primitive set into this environment, assigning
    /// bytecodes from the current count onward.
    pub fn import_standard(&mut self) {
        self.define("return", vec![]);
        self.define("yield", vec![]);
        self.define("goto", vec![Param::con(Width::Word)]);
        self.define("goto_far", vec![Param::con(Width::Short)]);
        self.define(
            "goto_conditional",
            vec![Param::arg(Width::Byte), Param::con(Width::Word)],
        );
        self.define(
            "goto_conditional_far",
            vec![Param::arg(Width::Byte), Param::con(Width::Short)],
        );
        self.define(
            "goto_conditional_not",
            vec![Param::arg(Width::Byte), Param::con(Width::Word)],
        );
        self.define("callasm", vec![Param::con(Width::Word)]);
        self.define("callasm_far", vec![Param::con(Width::Short)]);

        for width in Width::iter() {
            let suffix = width.suffix();
            for op in Op::iter() {
                self.define(
                    &format!("{}{suffix}", op.name()),
                    vec![
                        Param::arg(width),
                        Param::arg(width),
                        Param::arg(width),
                    ],
                );
            }
            for op in Op::iter() {
                self.define(
                    &format!("{}{suffix}_const", op.name()),
                    vec![
                        Param::arg(width),
                        Param::con(width),
                        Param::arg(width),
                    ],
                );
            }
        }

        for width in Width::iter() {
            let suffix = width.suffix();
            self.define(
                &format!("copy{suffix}"),
                vec![Param::arg(width), Param::arg(width)],
            );
            self.define(
                &format!("load{suffix}"),
                vec![Param::arg(width), Param::arg(width)],
            );
            self.define(
                &format!("store{suffix}"),
                vec![Param::arg(width), Param::arg(width)],
            );
            self.define(
                &format!("copy{suffix}_const"),
                vec![Param::arg(width), Param::con(width)],
            );
            self.define(
                &format!("load{suffix}_const"),
                vec![Param::arg(width), Param::con(width)],
            );
            self.define(
                &format!("store{suffix}_const"),
                vec![Param::con(width), Param::arg(width)],
            );
        }

        for from in Width::iter() {
            for to in Width::iter() {
                if from == to {
                    continue;
                }
                self.define(
                    &format!("cast_{}to{}", from.bits(), to.bits()),
                    vec![Param::arg(to), Param::arg(from)],
                );
            }
        }
    }
}
