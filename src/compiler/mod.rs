//! Statement lowering: scripts in, assembler directives out.
//!
//! Each script compiles against one environment with its own fresh pool,
//! label table, and string table. Lowerings compose the pool allocator,
//! the label generator, the operand renderer, and the definition emitter
//! to turn structured control flow into linear byte emissions with local
//! labels. Emission is streaming; nothing is buffered between statements.

use std::io::Write;

use tracing::{debug, trace};

use crate::ast::{Arg, Op, Operand, Script, SourceUnit, Statement, Width};
use crate::dialect::{expand, Dialect};
use crate::diagnostics::Reporter;
use crate::env::Environment;
use crate::error::{CompileError, CompileResult};

pub mod pool;
pub mod tables;

mod emit;

use pool::VarPool;
use tables::{LabelTable, StringTable};

/// Compile every script of a source unit, in declaration order.
///
/// Scripts naming an undeclared environment fall back to the standard one
/// with a warning. Accumulated `error`-severity diagnostics escalate once
/// all scripts have been emitted.
pub fn compile_unit<W: Write>(
    out: &mut W,
    unit: &SourceUnit,
    dialect: &Dialect,
    reporter: &Reporter,
) -> CompileResult<()> {
    let standard = Environment::standard();
    for (name, script) in &unit.scripts {
        let env = match unit.environment(&script.env) {
            Some(env) => env,
            None => {
                if script.env != "std" {
                    reporter.warn(format!(
                        "script {name} uses unknown environment `{}`; falling back to std",
                        script.env
                    ));
                }
                &standard
            }
        };
        compile_script(out, name, script, env, dialect, reporter)?;
    }
    reporter.checkpoint()
}

/// Compile a single script against `env` into `out`.
pub fn compile_script<W: Write>(
    out: &mut W,
    name: &str,
    script: &Script,
    env: &Environment,
    dialect: &Dialect,
    reporter: &Reporter,
) -> CompileResult<()> {
    debug!(script = name, pool = env.pool, "compiling script");
    let mut compiler = Compiler {
        name,
        env,
        dialect,
        reporter,
        out,
        pool: VarPool::new(env.pool),
        labels: LabelTable::new(),
        strings: StringTable::new(),
    };
    compiler.run(&script.statements)
}

/// Per-script lowering state.
pub(crate) struct Compiler<'a, W> {
    name: &'a str,
    env: &'a Environment,
    dialect: &'a Dialect,
    reporter: &'a Reporter,
    out: &'a mut W,
    pool: VarPool,
    labels: LabelTable,
    strings: StringTable,
}

impl<W: Write> Compiler<'_, W> {
    fn run(&mut self, statements: &[Statement]) -> CompileResult<()> {
        if !self.env.section.is_empty() && self.env.section != "none" {
            writeln!(
                self.out,
                "{}",
                expand(&self.dialect.section, &[self.name, &self.env.section])
            )?;
        }
        writeln!(self.out, "{}", expand(&self.dialect.label, &[self.name]))?;

        // Top-level labels are visible throughout the script, so record
        // them before lowering. Labels nested in control-flow bodies are
        // recorded lazily when their lowering runs.
        for statement in statements {
            if let Statement::Label { name } = statement {
                self.labels.record(name);
            }
        }

        self.block(statements)?;

        if self.env.terminator >= 0 {
            self.print_value(Width::Byte, self.env.terminator as u32)?;
        }

        let entries = self.strings.entries().to_vec();
        for (ordinal, text) in entries.iter().enumerate() {
            self.emit_local_label(&StringTable::label(ordinal))?;
            writeln!(self.out, "\t{}", expand(&self.dialect.string, &[text]))?;
        }

        debug_assert!(
            self.pool.live().all(|(_, slot)| !slot.is_internal()),
            "leaked internal temporaries at end of script {}",
            self.name,
        );
        Ok(())
    }

    fn block(&mut self, statements: &[Statement]) -> CompileResult<()> {
        for statement in statements {
            self.statement(statement)?;
        }
        Ok(())
    }

    fn statement(&mut self, statement: &Statement) -> CompileResult<()> {
        trace!(kind = statement.kind_name(), "lowering");
        match statement {
            Statement::Noop => Ok(()),
            Statement::Declare { name, size } => self.declare(name, *size),
            Statement::DeclareAssign { name, size, value } => {
                self.declare(name, *size)?;
                self.assign(name, *value)
            }
            Statement::DeclareCopy { name, size, source } => {
                self.declare(name, *size)?;
                self.copy(name, source)
            }
            Statement::Assign { name, value } => self.assign(name, *value),
            Statement::Copy { dest, source } => self.copy(dest, source),
            Statement::Binary { op, dest, lhs, rhs } => {
                self.binary(*op, dest.as_deref(), lhs, rhs)
            }
            Statement::Drop { name } => self.drop_var(name),
            Statement::Label { name } => {
                self.labels.record(name);
                self.emit_local_label(name)
            }
            Statement::Goto { target } => {
                self.print_standard("goto", &[Arg::Var(target.clone())])
            }
            Statement::Call { callee, args } => {
                let def = self
                    .env
                    .get_define(callee)
                    .ok_or_else(|| CompileError::MissingDefinition(callee.clone()))?;
                self.print_definition(callee, def, args)
            }
            Statement::CallAsm { target } => {
                self.print_standard("callasm", &[Arg::Var(target.clone())])
            }
            Statement::Break => Err(CompileError::Unsupported("break")),
            Statement::Continue => Err(CompileError::Unsupported("continue")),
            Statement::If {
                condition,
                then_body,
                else_body,
            } => self.lower_if(condition, then_body, else_body),
            Statement::While { condition, body } => self.lower_while(condition, body),
            Statement::DoWhile { condition, body } => self.lower_do(condition, body),
            Statement::For {
                init,
                test,
                step,
                body,
            } => self.lower_for(init, test, step, body),
            Statement::Repeat { count, body } => self.lower_repeat(*count, body),
            Statement::Loop { body } => self.lower_loop(body),
        }
    }

    fn declare(&mut self, name: &str, size: Width) -> CompileResult<()> {
        let index = self.pool.alloc(size, name)?;
        self.print_comment(&format!("Allocated {name} at {index}"))
    }

    fn assign(&mut self, name: &str, value: u32) -> CompileResult<()> {
        let width = self.pool.width_of(name)?;
        self.print_standard(
            &format!("copy{}_const", width.suffix()),
            &[Arg::Var(name.to_owned()), Arg::Num(value)],
        )
    }

    /// Pick the copy primitive from the operands' pool membership.
    fn copy(&mut self, dest: &str, source: &str) -> CompileResult<()> {
        let dest_size = self.pool.get(dest).map(|slot| slot.size());
        let source_size = self.pool.get(source).map(|slot| slot.size());
        let (base, size) = match (dest_size, source_size) {
            (Some(dest_size), Some(_)) => ("copy", dest_size),
            (Some(dest_size), None) => ("load", dest_size),
            (None, Some(source_size)) => ("store", source_size),
            (None, None) => return Err(CompileError::OffPoolCopy),
        };
        let width = Width::try_from(size as u32)?;
        let primitive = if base == "copy" {
            format!("copy{}", width.suffix())
        } else {
            format!("{base}{}_const", width.suffix())
        };
        self.print_standard(
            &primitive,
            &[Arg::Var(dest.to_owned()), Arg::Var(source.to_owned())],
        )
    }

    fn drop_var(&mut self, name: &str) -> CompileResult<()> {
        self.print_comment(&format!("Dropped {name}"))?;
        self.pool.free(name)
    }

    /// Widen an operand to the destination width, through an internal
    /// temporary and a cast primitive when the widths differ.
    fn auto_cast(&mut self, dest: Width, source: &str) -> CompileResult<String> {
        let source_width = self.pool.width_of(source)?;
        if source_width == dest {
            return Ok(source.to_owned());
        }
        let temp = self.pool.alloc_internal(dest)?;
        self.print_standard(
            &format!("cast_{}to{}", source_width.bits(), dest.bits()),
            &[Arg::Var(temp.clone()), Arg::Var(source.to_owned())],
        )?;
        Ok(temp)
    }

    fn binary(&mut self, op: Op, dest: Option<&str>, lhs: &str, rhs: &Operand) -> CompileResult<()> {
        let Some(dest) = dest else {
            // The condition adapter materialises a destination before any
            // branch reads one; a bare operation elsewhere has no
            // observable effect.
            return Ok(());
        };
        let width = self.pool.width_of(dest)?;
        let lhs_name = self.auto_cast(width, lhs)?;
        let mut rhs_temp = None;
        let (middle, const_form) = match rhs {
            Operand::Imm(value) => (Arg::Num(*value), true),
            Operand::Var(name) => {
                if self.pool.get(name).is_some() {
                    let cast = self.auto_cast(width, name)?;
                    if cast != *name {
                        rhs_temp = Some(cast.clone());
                    }
                    (Arg::Var(cast), false)
                } else {
                    // Demote to the const form; the name passes through
                    // as an opaque symbol for the assembler to resolve.
                    (Arg::Con(name.clone()), true)
                }
            }
        };
        let primitive = format!(
            "{}{}{}",
            op.name(),
            width.suffix(),
            if const_form { "_const" } else { "" }
        );
        self.print_standard(
            &primitive,
            &[Arg::Var(lhs_name.clone()), middle, Arg::Var(dest.to_owned())],
        )?;
        self.pool.auto_free(&lhs_name)?;
        if let Some(temp) = rhs_temp {
            self.pool.auto_free(&temp)?;
        }
        Ok(())
    }

    /// Give a condition statement a destination a branch can read.
    ///
    /// Arithmetic conditions without one get an internal temporary sized
    /// to their widest operand. Other statement kinds are warned about
    /// and lowered as-is.
    fn materialize_condition(
        &mut self,
        condition: &Statement,
    ) -> CompileResult<(Statement, Option<String>)> {
        match condition {
            Statement::Binary {
                op,
                dest: None,
                lhs,
                rhs,
            } => {
                let lhs_size = self.pool.required_get(lhs)?.size();
                let rhs_size = match rhs {
                    Operand::Var(name) => {
                        self.pool.get(name).map(|slot| slot.size()).unwrap_or(0)
                    }
                    Operand::Imm(_) => 0,
                };
                let width = Width::try_from(lhs_size.max(rhs_size) as u32)?;
                let temp = self.pool.alloc_internal(width)?;
                let adapted = Statement::Binary {
                    op: *op,
                    dest: Some(temp.clone()),
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                };
                Ok((adapted, Some(temp)))
            }
            Statement::Binary {
                dest: Some(dest), ..
            } => Ok((condition.clone(), Some(dest.clone()))),
            other => {
                self.reporter.warn(format!(
                    "{} used as a condition; the branch will read an undefined value",
                    other.kind_name()
                ));
                Ok((other.clone(), other.destination().map(str::to_owned)))
            }
        }
    }

    fn condition_operand(test: &Option<String>) -> Arg {
        match test {
            Some(name) => Arg::Var(name.clone()),
            None => Arg::Num(0),
        }
    }

    fn release_condition(&mut self, test: Option<String>) -> CompileResult<()> {
        if let Some(name) = test {
            if self.pool.get(&name).is_some() {
                self.pool.auto_free(&name)?;
            }
        }
        Ok(())
    }

    fn lower_if(
        &mut self,
        condition: &Statement,
        then_body: &[Statement],
        else_body: &[Statement],
    ) -> CompileResult<()> {
        let end = self.labels.generate("endif");
        let (test_statement, test) = self.materialize_condition(condition)?;
        self.statement(&test_statement)?;
        self.print_standard(
            "goto_conditional_not",
            &[Self::condition_operand(&test), Arg::Var(end.clone())],
        )?;
        self.block(then_body)?;
        if else_body.is_empty() {
            self.emit_local_label(&end)?;
        } else {
            let done = self.labels.generate("endelse");
            self.print_standard("goto", &[Arg::Var(done.clone())])?;
            self.emit_local_label(&end)?;
            self.block(else_body)?;
            self.emit_local_label(&done)?;
        }
        self.release_condition(test)
    }

    fn lower_while(&mut self, condition: &Statement, body: &[Statement]) -> CompileResult<()> {
        let begin = self.labels.generate("beginwhile");
        let end = self.labels.generate("endwhile");
        let test_label = self.labels.generate("whilecondition");
        self.print_standard("goto", &[Arg::Var(test_label.clone())])?;
        self.emit_local_label(&begin)?;
        self.block(body)?;
        self.emit_local_label(&test_label)?;
        let (test_statement, test) = self.materialize_condition(condition)?;
        self.statement(&test_statement)?;
        self.print_standard(
            "goto_conditional",
            &[Self::condition_operand(&test), Arg::Var(begin)],
        )?;
        self.emit_local_label(&end)?;
        self.release_condition(test)
    }

    fn lower_do(&mut self, condition: &Statement, body: &[Statement]) -> CompileResult<()> {
        let begin = self.labels.generate("begindo");
        let end = self.labels.generate("enddo");
        let test_label = self.labels.generate("docondition");
        self.emit_local_label(&begin)?;
        self.block(body)?;
        self.emit_local_label(&test_label)?;
        let (test_statement, test) = self.materialize_condition(condition)?;
        self.statement(&test_statement)?;
        self.print_standard(
            "goto_conditional",
            &[Self::condition_operand(&test), Arg::Var(begin)],
        )?;
        self.emit_local_label(&end)?;
        self.release_condition(test)
    }

    fn lower_for(
        &mut self,
        init: &Statement,
        test_statement: &Statement,
        step: &Statement,
        body: &[Statement],
    ) -> CompileResult<()> {
        let begin = self.labels.generate("beginfor");
        let end = self.labels.generate("endfor");
        self.statement(init)?;
        self.emit_local_label(&begin)?;
        let (adapted, test) = self.materialize_condition(test_statement)?;
        self.statement(&adapted)?;
        self.print_standard(
            "goto_conditional_not",
            &[Self::condition_operand(&test), Arg::Var(end.clone())],
        )?;
        self.block(body)?;
        self.statement(step)?;
        self.print_standard("goto", &[Arg::Var(begin)])?;
        self.emit_local_label(&end)?;
        self.release_condition(test)
    }

    fn lower_repeat(&mut self, count: u32, body: &[Statement]) -> CompileResult<()> {
        if count == 0 {
            return Ok(());
        }
        let width = if count < 256 {
            Width::Byte
        } else if count < 65536 {
            Width::Word
        } else {
            return Err(CompileError::RepeatTooLarge(count));
        };
        let suffix = width.suffix();
        let counter = self.pool.alloc_internal(width)?;
        self.print_standard(
            &format!("copy{suffix}_const"),
            &[Arg::Var(counter.clone()), Arg::Num(count)],
        )?;
        let begin = self.labels.generate("beginrepeat");
        let end = self.labels.generate("endrepeat");
        let test_label = self.labels.generate("repeatcondition");
        self.emit_local_label(&begin)?;
        self.block(body)?;
        self.emit_local_label(&test_label)?;
        self.print_standard(
            &format!("sub{suffix}_const"),
            &[
                Arg::Var(counter.clone()),
                Arg::Num(1),
                Arg::Var(counter.clone()),
            ],
        )?;
        self.print_standard(
            "goto_conditional",
            &[Arg::Var(counter.clone()), Arg::Var(begin)],
        )?;
        self.emit_local_label(&end)?;
        self.pool.free(&counter)
    }

    fn lower_loop(&mut self, body: &[Statement]) -> CompileResult<()> {
        let begin = self.labels.generate("beginloop");
        let end = self.labels.generate("endloop");
        self.emit_local_label(&begin)?;
        self.block(body)?;
        self.print_standard("goto", &[Arg::Var(begin)])?;
        self.emit_local_label(&end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_statements(pool: usize, statements: Vec<Statement>) -> CompileResult<String> {
        let mut env = Environment::standard();
        env.pool = pool;
        let script = Script {
            env: "std".to_owned(),
            statements,
        };
        let reporter = Reporter::with_color(false);
        let mut out = Vec::new();
        compile_script(
            &mut out,
            "main",
            &script,
            &env,
            &Dialect::default(),
            &reporter,
        )?;
        Ok(String::from_utf8(out).expect("output is UTF-8"))
    }

    #[test]
    fn undeclared_destination_is_fatal() {
        let result = compile_statements(
            8,
            vec![Statement::Assign {
                name: "ghost".to_owned(),
                value: 1,
            }],
        );
        assert!(matches!(result, Err(CompileError::UndeclaredVariable(_))));
    }

    #[test]
    fn copy_between_two_globals_is_fatal() {
        let result = compile_statements(
            8,
            vec![Statement::Copy {
                dest: "wram_a".to_owned(),
                source: "wram_b".to_owned(),
            }],
        );
        assert!(matches!(result, Err(CompileError::OffPoolCopy)));
    }

    #[test]
    fn break_has_no_lowering() {
        let result = compile_statements(8, vec![Statement::Break]);
        assert!(matches!(result, Err(CompileError::Unsupported("break"))));
    }

    #[test]
    fn repeat_is_bounded() {
        let result = compile_statements(
            8,
            vec![Statement::Repeat {
                count: 65536,
                body: vec![],
            }],
        );
        assert!(matches!(result, Err(CompileError::RepeatTooLarge(65536))));
        let empty = compile_statements(
            8,
            vec![Statement::Repeat {
                count: 0,
                body: vec![],
            }],
        )
        .expect("repeat 0 compiles");
        assert!(!empty.contains("copy_const"));
    }

    #[test]
    fn mixed_width_operation_casts_and_releases() {
        let output = compile_statements(
            16,
            vec![
                Statement::Declare {
                    name: "small".to_owned(),
                    size: Width::Byte,
                },
                Statement::Declare {
                    name: "big".to_owned(),
                    size: Width::Word,
                },
                Statement::Binary {
                    op: Op::Add,
                    dest: Some("big".to_owned()),
                    lhs: "small".to_owned(),
                    rhs: Operand::Var("big".to_owned()),
                },
            ],
        )
        .expect("compiles");
        assert!(output.contains("; cast_8to16"));
        assert!(output.contains("; add16"));
        // The temporary was released, so the terminator byte follows and
        // the script ends with no leaked allocation comment.
        assert!(output.contains("db (0 >> 0) & 255"));
    }

    #[test]
    fn section_none_suppresses_the_directive() {
        let mut env = Environment::standard();
        env.pool = 4;
        env.section = "none".to_owned();
        let reporter = Reporter::with_color(false);
        let mut out = Vec::new();
        compile_script(
            &mut out,
            "main",
            &Script {
                env: "std".to_owned(),
                statements: vec![],
            },
            &env,
            &Dialect::default(),
            &reporter,
        )
        .expect("compiles");
        let output = String::from_utf8(out).expect("output is UTF-8");
        assert!(!output.contains("SECTION"));
        assert!(output.starts_with("main::"));
    }
}
