//! Operand rendering and definition emission.
//!
//! Every value leaves the compiler as single-byte directives of the form
//! `(expr >> 8k) & 255`, least significant byte first, so any width from
//! one to four bytes is expressible without width-specific directives.

use std::io::Write;

use itertools::Itertools;

use crate::ast::{Arg, Width};
use crate::dialect::expand;
use crate::env::{Definition, ParamKind};
use crate::error::{CompileError, CompileResult};

use super::tables::StringTable;
use super::Compiler;

impl<W: Write> Compiler<'_, W> {
    /// Render an argument to its textual operand form.
    ///
    /// Live pool names become cell indices; free identifiers are emitted
    /// verbatim, with the local-label sigil when the name is a known
    /// label. String literals are deferred into the string table and
    /// rendered as a reference to their entry's label.
    pub(super) fn render_argument(&mut self, argument: &Arg) -> CompileResult<String> {
        Ok(match argument {
            Arg::Var(name) => match self.pool.lookup(name) {
                Some(index) => index.to_string(),
                None if self.labels.contains(name) => {
                    expand(&self.dialect.local_label, &[name])
                }
                None => name.clone(),
            },
            Arg::Num(value) => expand(&self.dialect.number, &[&value.to_string()]),
            Arg::Con(text) => text.clone(),
            Arg::Str(text) => {
                let ordinal = self.strings.intern(text);
                expand(&self.dialect.local_label, &[&StringTable::label(ordinal)])
            }
            Arg::Positional(_) => return Err(CompileError::PositionalArgOutsideMacro),
        })
    }

    /// Emit `expr` spread over `size` byte directives, little-endian.
    pub(super) fn emit_spread(&mut self, size: Width, expr: &str) -> CompileResult<()> {
        for shift in 0..size.bytes() {
            writeln!(
                self.out,
                "\t{} ({} >> {}) & 255",
                self.dialect.byte,
                expr,
                shift * 8
            )?;
        }
        Ok(())
    }

    /// Emit a numeric value spread over `size` bytes.
    pub(super) fn print_value(&mut self, size: Width, value: u32) -> CompileResult<()> {
        self.emit_spread(size, &value.to_string())
    }

    pub(super) fn print_comment(&mut self, text: &str) -> CompileResult<()> {
        writeln!(self.out, "\t{}", expand(&self.dialect.comment, &[text]))?;
        Ok(())
    }

    /// Emit a column-zero local label definition.
    pub(super) fn emit_local_label(&mut self, name: &str) -> CompileResult<()> {
        writeln!(self.out, "{}", expand(&self.dialect.local_label, &[name]))?;
        Ok(())
    }

    /// Emit a primitive the lowerings themselves depend on.
    pub(super) fn print_standard(&mut self, name: &str, args: &[Arg]) -> CompileResult<()> {
        let def = self.env.required_define(name)?;
        self.print_definition(name, def, args)
    }

    /// Emit one invocation of `def` with the caller's arguments.
    pub(super) fn print_definition(
        &mut self,
        name: &str,
        def: &Definition,
        args: &[Arg],
    ) -> CompileResult<()> {
        self.print_comment(name)?;
        match def {
            Definition::Def {
                bytecode,
                parameters,
            } => {
                if args.len() < parameters.len() {
                    return Err(CompileError::NotEnoughArguments {
                        name: name.to_owned(),
                        expected: parameters.len(),
                        found: args.len(),
                    });
                }
                if args.len() > parameters.len() {
                    let excess = args.len() - parameters.len();
                    self.reporter.warn(format!(
                        "{excess} excess argument{} to {name}",
                        if excess == 1 { "" } else { "s" }
                    ));
                }
                self.print_value(self.env.bytecode_size, *bytecode)?;
                for (param, argument) in parameters.iter().zip(args) {
                    let expr = self.render_argument(argument)?;
                    self.emit_spread(param.size, &expr)?;
                }
            }
            Definition::Mac { alias, arguments } => {
                let Definition::Def {
                    bytecode,
                    parameters,
                } = self.env.required_define(alias)?
                else {
                    return Err(CompileError::NonBytecodeAlias {
                        mac: name.to_owned(),
                        alias: alias.clone(),
                    });
                };
                self.print_value(self.env.bytecode_size, *bytecode)?;
                for (param, template) in parameters.iter().zip(arguments) {
                    match template {
                        Arg::Str(text) => {
                            writeln!(self.out, "\t{} \"{}\"", self.dialect.byte, text)?;
                        }
                        Arg::Positional(position) => {
                            let caller = (*position as usize)
                                .checked_sub(1)
                                .and_then(|index| args.get(index))
                                .ok_or_else(|| CompileError::NotEnoughArguments {
                                    name: name.to_owned(),
                                    expected: *position as usize,
                                    found: args.len(),
                                })?;
                            let expr = self.render_argument(caller)?;
                            self.emit_spread(param.size, &expr)?;
                        }
                        other => {
                            let expr = self.render_argument(other)?;
                            self.emit_spread(param.size, &expr)?;
                        }
                    }
                }
            }
            Definition::Alias { target, parameters } => {
                let varargs_at = parameters
                    .iter()
                    .position(|param| param.kind == ParamKind::Varargs)
                    .unwrap_or(parameters.len());
                if args.len() < varargs_at {
                    return Err(CompileError::NotEnoughArguments {
                        name: name.to_owned(),
                        expected: varargs_at,
                        found: args.len(),
                    });
                }
                let mut rendered = Vec::with_capacity(args.len());
                for (index, argument) in args.iter().enumerate() {
                    // String literals in the variadic tail pass through
                    // quoted, for the assembler macro to consume.
                    if index >= varargs_at {
                        if let Arg::Str(text) = argument {
                            rendered.push(format!("\"{text}\""));
                            continue;
                        }
                    }
                    rendered.push(self.render_argument(argument)?);
                }
                let open = expand(&self.dialect.macro_open, &[target]);
                let joined = rendered.iter().join(", ");
                if self.dialect.macro_end.is_empty() {
                    writeln!(self.out, "\t{open}{joined}")?;
                } else {
                    writeln!(self.out, "\t{open}{joined} {}", self.dialect.macro_end)?;
                }
            }
        }
        Ok(())
    }
}
