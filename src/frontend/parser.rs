//! Recursive-descent parser producing a [`SourceUnit`].

use crate::ast::{Arg, Op, Operand, Script, SourceUnit, Statement, TypeDef};
use crate::ast::Width;
use crate::diagnostics::Reporter;
use crate::env::{Environment, Param};
use crate::error::ParseError;

use super::lexer::{tokenize, Lexeme, Token};

/// Parse one source file into its declared typedefs, environments, and
/// scripts.
pub fn parse(source: &str, reporter: &Reporter) -> Result<SourceUnit, ParseError> {
    let lexemes = tokenize(source)?;
    Parser {
        lexemes: &lexemes,
        position: 0,
        reporter,
        unit: SourceUnit::new(),
    }
    .run()
}

struct Parser<'a> {
    lexemes: &'a [Lexeme],
    position: usize,
    reporter: &'a Reporter,
    unit: SourceUnit,
}

/// Left side of an rvalue before the operator is known.
enum Lhs {
    Num(u32),
    Ident(String),
}

impl Parser<'_> {
    fn run(mut self) -> Result<SourceUnit, ParseError> {
        while self.position < self.lexemes.len() {
            match self.peek() {
                Some(Token::Typedef) => self.typedef()?,
                Some(Token::Env) => self.environment()?,
                Some(Token::Script) => self.script()?,
                _ => return Err(self.unexpected("`typedef`, `env`, or `script`")),
            }
        }
        Ok(self.unit)
    }

    fn peek(&self) -> Option<&Token> {
        self.lexemes.get(self.position).map(|lexeme| &lexeme.token)
    }

    fn peek_ahead(&self, offset: usize) -> Option<&Token> {
        self.lexemes
            .get(self.position + offset)
            .map(|lexeme| &lexeme.token)
    }

    fn line(&self) -> usize {
        self.lexemes
            .get(self.position)
            .or_else(|| self.lexemes.last())
            .map(|lexeme| lexeme.line)
            .unwrap_or(1)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek().cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::UnexpectedToken {
                line: self.line(),
                found: token.to_string(),
                expected,
            },
            None => ParseError::UnexpectedEof { expected },
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), ParseError> {
        if self.peek() == Some(&token) {
            self.position += 1;
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(_)) => match self.bump() {
                Some(Token::Ident(name)) => Ok(name),
                _ => Err(self.unexpected(expected)),
            },
            _ => Err(self.unexpected(expected)),
        }
    }

    fn expect_number(&mut self, expected: &'static str) -> Result<u32, ParseError> {
        match self.peek() {
            Some(Token::Number(value)) => {
                let value = *value;
                self.position += 1;
                Ok(value)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn expect_string(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Str(_)) => match self.bump() {
                Some(Token::Str(text)) => Ok(text),
                _ => Err(self.unexpected(expected)),
            },
            _ => Err(self.unexpected(expected)),
        }
    }

    fn resolve_type(&self, name: &str) -> Result<TypeDef, ParseError> {
        self.unit
            .get_type(name)
            .ok_or_else(|| ParseError::Invalid {
                line: self.line(),
                message: format!("unknown type `{name}`"),
            })
    }

    fn typedef(&mut self) -> Result<(), ParseError> {
        self.expect(Token::Typedef, "`typedef`")?;
        let base = self.expect_ident("a type name")?;
        let base = self.resolve_type(&base)?;
        let name = self.expect_ident("the new type's name")?;
        self.expect(Token::Semicolon, "`;`")?;
        self.unit.typedefs.insert(name, base);
        Ok(())
    }

    fn environment(&mut self) -> Result<(), ParseError> {
        self.expect(Token::Env, "`env`")?;
        let name = self.expect_ident("an environment name")?;
        self.expect(Token::LBrace, "`{`")?;
        let mut env = Environment::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.position += 1;
                    break;
                }
                Some(Token::Use) => {
                    self.position += 1;
                    let import = self.expect_ident("an environment to import")?;
                    if import == "std" {
                        env.import_standard();
                    } else {
                        self.reporter
                            .warn(format!("unknown environment `{import}` in `use`; ignored"));
                    }
                    self.expect(Token::Semicolon, "`;`")?;
                }
                Some(Token::Def) => {
                    self.position += 1;
                    let define_name = self.expect_ident("a definition name")?;
                    self.expect(Token::LParen, "`(`")?;
                    let parameters = self.parameters()?;
                    self.expect(Token::RParen, "`)`")?;
                    self.expect(Token::Semicolon, "`;`")?;
                    env.define(&define_name, parameters);
                }
                Some(Token::Mac) => {
                    self.position += 1;
                    let mac_name = self.expect_ident("a macro name")?;
                    self.expect(Token::Assign, "`=`")?;
                    let alias = self.expect_ident("the aliased definition")?;
                    self.expect(Token::LParen, "`(`")?;
                    let arguments = self.macro_arguments()?;
                    self.expect(Token::RParen, "`)`")?;
                    self.expect(Token::Semicolon, "`;`")?;
                    env.define_mac(&mac_name, &alias, arguments);
                }
                Some(Token::Alias) => {
                    self.position += 1;
                    let alias_name = self.expect_ident("an alias name")?;
                    self.expect(Token::Assign, "`=`")?;
                    let target = self.expect_ident("the assembler macro's name")?;
                    self.expect(Token::LParen, "`(`")?;
                    let parameters = self.parameters()?;
                    self.expect(Token::RParen, "`)`")?;
                    self.expect(Token::Semicolon, "`;`")?;
                    env.define_alias(&alias_name, &target, parameters);
                }
                Some(Token::Ident(_)) => {
                    let key = self.expect_ident("an environment setting")?;
                    self.expect(Token::Assign, "`=`")?;
                    match key.as_str() {
                        "pool" => env.pool = self.expect_number("a pool size")? as usize,
                        "section" => env.section = self.expect_string("a section name")?,
                        "terminator" => {
                            let negative = self.peek() == Some(&Token::Minus);
                            if negative {
                                self.position += 1;
                            }
                            let value = self.expect_number("a terminator byte")? as i32;
                            env.terminator = if negative { -value } else { value };
                        }
                        "bytecode_size" => {
                            let line = self.line();
                            let value = self.expect_number("an opcode width")?;
                            env.bytecode_size =
                                Width::try_from(value).map_err(|_| ParseError::Invalid {
                                    line,
                                    message: format!(
                                        "bytecode_size must be 1 to 4, got {value}"
                                    ),
                                })?;
                        }
                        other => {
                            return Err(ParseError::Invalid {
                                line: self.line(),
                                message: format!("unknown environment setting `{other}`"),
                            });
                        }
                    }
                    self.expect(Token::Semicolon, "`;`")?;
                }
                _ => return Err(self.unexpected("an environment entry or `}`")),
            }
        }
        self.unit.environments.push((name, env));
        Ok(())
    }

    fn parameters(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut parameters = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            return Ok(parameters);
        }
        loop {
            if self.peek() == Some(&Token::Ellipsis) {
                self.position += 1;
                parameters.push(Param::varargs());
                break;
            }
            let constant = self.peek() == Some(&Token::Const);
            if constant {
                self.position += 1;
            }
            let type_name = self.expect_ident("a parameter type")?;
            let ty = self.resolve_type(&type_name)?;
            parameters.push(if constant {
                Param::con(ty.size)
            } else {
                Param::arg(ty.size)
            });
            if self.peek() == Some(&Token::Comma) {
                self.position += 1;
            } else {
                break;
            }
        }
        Ok(parameters)
    }

    fn macro_arguments(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut arguments = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            return Ok(arguments);
        }
        loop {
            let argument = match self.peek() {
                Some(Token::Number(_)) => Arg::Num(self.expect_number("a number")?),
                Some(Token::Str(_)) => Arg::Str(self.expect_string("a string")?),
                Some(Token::Dollar) => {
                    self.position += 1;
                    Arg::Positional(self.expect_number("a positional index")?)
                }
                Some(Token::Ident(_)) => Arg::Con(self.expect_ident("a constant")?),
                _ => return Err(self.unexpected("a macro argument")),
            };
            arguments.push(argument);
            if self.peek() == Some(&Token::Comma) {
                self.position += 1;
            } else {
                break;
            }
        }
        Ok(arguments)
    }

    fn script(&mut self) -> Result<(), ParseError> {
        self.expect(Token::Script, "`script`")?;
        let name = self.expect_ident("a script name")?;
        let env = if self.peek() == Some(&Token::Uses) {
            self.position += 1;
            self.expect_ident("an environment name")?
        } else {
            "std".to_owned()
        };
        let statements = self.block()?;
        self.unit.scripts.push((name, Script { env, statements }));
        Ok(())
    }

    fn block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.expect(Token::LBrace, "`{`")?;
        let mut statements = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            if self.peek().is_none() {
                return Err(self.unexpected("a statement or `}`"));
            }
            statements.push(self.statement()?);
        }
        self.position += 1;
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        match self.peek() {
            Some(Token::If) => {
                self.position += 1;
                self.expect(Token::LParen, "`(`")?;
                let condition = Box::new(self.condition()?);
                self.expect(Token::RParen, "`)`")?;
                let then_body = self.block()?;
                let else_body = if self.peek() == Some(&Token::Else) {
                    self.position += 1;
                    self.block()?
                } else {
                    Vec::new()
                };
                Ok(Statement::If {
                    condition,
                    then_body,
                    else_body,
                })
            }
            Some(Token::While) => {
                self.position += 1;
                self.expect(Token::LParen, "`(`")?;
                let condition = Box::new(self.condition()?);
                self.expect(Token::RParen, "`)`")?;
                let body = self.block()?;
                Ok(Statement::While { condition, body })
            }
            Some(Token::Do) => {
                self.position += 1;
                let body = self.block()?;
                self.expect(Token::While, "`while`")?;
                self.expect(Token::LParen, "`(`")?;
                let condition = Box::new(self.condition()?);
                self.expect(Token::RParen, "`)`")?;
                self.expect(Token::Semicolon, "`;`")?;
                Ok(Statement::DoWhile { condition, body })
            }
            Some(Token::For) => {
                self.position += 1;
                self.expect(Token::LParen, "`(`")?;
                let init = Box::new(self.condition()?);
                self.expect(Token::Semicolon, "`;`")?;
                let test = Box::new(self.condition()?);
                self.expect(Token::Semicolon, "`;`")?;
                let step = Box::new(self.condition()?);
                self.expect(Token::RParen, "`)`")?;
                let body = self.block()?;
                Ok(Statement::For {
                    init,
                    test,
                    step,
                    body,
                })
            }
            Some(Token::Repeat) => {
                self.position += 1;
                self.expect(Token::LParen, "`(`")?;
                let count = self.expect_number("an iteration count")?;
                self.expect(Token::RParen, "`)`")?;
                let body = self.block()?;
                Ok(Statement::Repeat { count, body })
            }
            Some(Token::Loop) => {
                self.position += 1;
                let body = self.block()?;
                Ok(Statement::Loop { body })
            }
            Some(Token::Goto) => {
                self.position += 1;
                let target = self.expect_ident("a label")?;
                self.expect(Token::Semicolon, "`;`")?;
                Ok(Statement::Goto { target })
            }
            Some(Token::Drop) => {
                self.position += 1;
                let name = self.expect_ident("a variable")?;
                self.expect(Token::Semicolon, "`;`")?;
                Ok(Statement::Drop { name })
            }
            Some(Token::Break) => {
                self.position += 1;
                self.expect(Token::Semicolon, "`;`")?;
                Ok(Statement::Break)
            }
            Some(Token::Continue) => {
                self.position += 1;
                self.expect(Token::Semicolon, "`;`")?;
                Ok(Statement::Continue)
            }
            Some(Token::Callasm) => {
                self.position += 1;
                let target = self.expect_ident("a routine symbol")?;
                self.expect(Token::Semicolon, "`;`")?;
                Ok(Statement::CallAsm { target })
            }
            Some(Token::Ident(_)) => {
                if self.peek_ahead(1) == Some(&Token::Colon) {
                    let name = self.expect_ident("a label")?;
                    self.position += 1;
                    return Ok(Statement::Label { name });
                }
                let statement = self.simple(false)?;
                self.expect(Token::Semicolon, "`;`")?;
                Ok(statement)
            }
            _ => Err(self.unexpected("a statement")),
        }
    }

    /// A statement legal in condition position: declaration, assignment,
    /// copy, bare operation, or call. Consumes no trailing `;`.
    fn condition(&mut self) -> Result<Statement, ParseError> {
        self.simple(true)
    }

    fn simple(&mut self, as_condition: bool) -> Result<Statement, ParseError> {
        let first = self.expect_ident(if as_condition {
            "a condition"
        } else {
            "a statement"
        })?;

        // A type name followed by an identifier declares a variable.
        if self.unit.get_type(&first).is_some() && matches!(self.peek(), Some(Token::Ident(_))) {
            let ty = self.resolve_type(&first)?;
            let name = self.expect_ident("a variable name")?;
            if self.peek() != Some(&Token::Assign) {
                return Ok(Statement::Declare {
                    name,
                    size: ty.size,
                });
            }
            self.position += 1;
            return match self.peek() {
                Some(Token::Number(_)) => Ok(Statement::DeclareAssign {
                    name,
                    size: ty.size,
                    value: self.expect_number("an initial value")?,
                }),
                Some(Token::Ident(_)) => Ok(Statement::DeclareCopy {
                    name,
                    size: ty.size,
                    source: self.expect_ident("a source operand")?,
                }),
                _ => Err(self.unexpected("an initialiser")),
            };
        }

        if as_condition {
            if let Some(op) = self.peek_binop() {
                self.position += 1;
                let rhs = self.operand()?;
                return Ok(Statement::Binary {
                    op,
                    dest: None,
                    lhs: first,
                    rhs,
                });
            }
        }

        match self.peek() {
            Some(Token::LParen) => {
                self.position += 1;
                let args = self.call_arguments()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(Statement::Call {
                    callee: first,
                    args,
                })
            }
            Some(Token::Assign) => {
                self.position += 1;
                self.rvalue(first)
            }
            _ => Err(self.unexpected("`(` or `=`")),
        }
    }

    fn rvalue(&mut self, dest: String) -> Result<Statement, ParseError> {
        let line = self.line();
        let left = match self.peek() {
            Some(Token::Number(_)) => Lhs::Num(self.expect_number("a value")?),
            Some(Token::Ident(_)) => Lhs::Ident(self.expect_ident("an operand")?),
            _ => return Err(self.unexpected("an operand")),
        };
        let Some(op) = self.peek_binop() else {
            return Ok(match left {
                Lhs::Num(value) => Statement::Assign { name: dest, value },
                Lhs::Ident(source) => Statement::Copy { dest, source },
            });
        };
        self.position += 1;
        let Lhs::Ident(lhs) = left else {
            return Err(ParseError::Invalid {
                line,
                message: "the left operand of a binary operation must be a variable".to_owned(),
            });
        };
        let rhs = self.operand()?;
        Ok(Statement::Binary {
            op,
            dest: Some(dest),
            lhs,
            rhs,
        })
    }

    fn operand(&mut self) -> Result<Operand, ParseError> {
        match self.peek() {
            Some(Token::Number(_)) => Ok(Operand::Imm(self.expect_number("an operand")?)),
            Some(Token::Ident(_)) => Ok(Operand::Var(self.expect_ident("an operand")?)),
            _ => Err(self.unexpected("an operand")),
        }
    }

    fn peek_binop(&self) -> Option<Op> {
        Some(match self.peek()? {
            Token::EqEq => Op::Equ,
            Token::NotEq => Op::Not,
            Token::Lt => Op::Lt,
            Token::Lte => Op::Lte,
            Token::Gt => Op::Gt,
            Token::Gte => Op::Gte,
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            Token::Amp => Op::Band,
            Token::Pipe => Op::Bor,
            Token::AmpAmp => Op::And,
            Token::PipePipe => Op::Or,
            _ => return None,
        })
    }

    fn call_arguments(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            return Ok(args);
        }
        loop {
            let argument = match self.peek() {
                Some(Token::Number(_)) => Arg::Num(self.expect_number("an argument")?),
                Some(Token::Str(_)) => Arg::Str(self.expect_string("an argument")?),
                Some(Token::Ident(_)) => Arg::Var(self.expect_ident("an argument")?),
                Some(Token::Dollar) => {
                    self.position += 1;
                    Arg::Positional(self.expect_number("a positional index")?)
                }
                _ => return Err(self.unexpected("an argument")),
            };
            args.push(argument);
            if self.peek() == Some(&Token::Comma) {
                self.position += 1;
            } else {
                break;
            }
        }
        Ok(args)
    }
}
