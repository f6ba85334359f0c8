//! Tokenizer for the scripting language.
//!
//! Line comments (`//`), block comments (`/* */`), decimal and `0x`
//! integer literals, and double-quoted strings. Escape sequences inside
//! strings are kept verbatim; the downstream assembler understands the
//! same `\"`-style escapes, so the compiler passes them through.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::ParseError;

/// One token of the surface syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    Number(u32),
    Str(String),

    Typedef,
    Env,
    Script,
    Uses,
    Use,
    Def,
    Mac,
    Alias,
    Const,
    If,
    Else,
    While,
    Do,
    For,
    Repeat,
    Loop,
    Goto,
    Drop,
    Break,
    Continue,
    Callasm,

    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Colon,
    Assign,
    Dollar,
    Ellipsis,

    EqEq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Pipe,
    AmpAmp,
    PipePipe,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "identifier `{name}`"),
            Token::Number(value) => write!(f, "number {value}"),
            Token::Str(_) => write!(f, "string literal"),
            Token::Typedef => write!(f, "`typedef`"),
            Token::Env => write!(f, "`env`"),
            Token::Script => write!(f, "`script`"),
            Token::Uses => write!(f, "`uses`"),
            Token::Use => write!(f, "`use`"),
            Token::Def => write!(f, "`def`"),
            Token::Mac => write!(f, "`mac`"),
            Token::Alias => write!(f, "`alias`"),
            Token::Const => write!(f, "`const`"),
            Token::If => write!(f, "`if`"),
            Token::Else => write!(f, "`else`"),
            Token::While => write!(f, "`while`"),
            Token::Do => write!(f, "`do`"),
            Token::For => write!(f, "`for`"),
            Token::Repeat => write!(f, "`repeat`"),
            Token::Loop => write!(f, "`loop`"),
            Token::Goto => write!(f, "`goto`"),
            Token::Drop => write!(f, "`drop`"),
            Token::Break => write!(f, "`break`"),
            Token::Continue => write!(f, "`continue`"),
            Token::Callasm => write!(f, "`callasm`"),
            Token::LBrace => write!(f, "`{{`"),
            Token::RBrace => write!(f, "`}}`"),
            Token::LParen => write!(f, "`(`"),
            Token::RParen => write!(f, "`)`"),
            Token::Comma => write!(f, "`,`"),
            Token::Semicolon => write!(f, "`;`"),
            Token::Colon => write!(f, "`:`"),
            Token::Assign => write!(f, "`=`"),
            Token::Dollar => write!(f, "`$`"),
            Token::Ellipsis => write!(f, "`...`"),
            Token::EqEq => write!(f, "`==`"),
            Token::NotEq => write!(f, "`!=`"),
            Token::Lt => write!(f, "`<`"),
            Token::Lte => write!(f, "`<=`"),
            Token::Gt => write!(f, "`>`"),
            Token::Gte => write!(f, "`>=`"),
            Token::Plus => write!(f, "`+`"),
            Token::Minus => write!(f, "`-`"),
            Token::Star => write!(f, "`*`"),
            Token::Slash => write!(f, "`/`"),
            Token::Amp => write!(f, "`&`"),
            Token::Pipe => write!(f, "`|`"),
            Token::AmpAmp => write!(f, "`&&`"),
            Token::PipePipe => write!(f, "`||`"),
        }
    }
}

/// A token with the source line it started on.
#[derive(Debug, Clone)]
pub struct Lexeme {
    pub token: Token,
    pub line: usize,
}

/// Tokenize a whole source file.
pub fn tokenize(source: &str) -> Result<Vec<Lexeme>, ParseError> {
    Lexer {
        chars: source.chars().peekable(),
        line: 1,
    }
    .run()
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl Lexer<'_> {
    fn bump(&mut self) -> Option<char> {
        let next = self.chars.next();
        if next == Some('\n') {
            self.line += 1;
        }
        next
    }

    fn push(&self, lexemes: &mut Vec<Lexeme>, token: Token) {
        lexemes.push(Lexeme {
            token,
            line: self.line,
        });
    }

    fn run(mut self) -> Result<Vec<Lexeme>, ParseError> {
        let mut lexemes = Vec::new();
        while let Some(&next) = self.chars.peek() {
            match next {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '/' => {
                    self.bump();
                    match self.chars.peek() {
                        Some('/') => {
                            while let Some(skipped) = self.bump() {
                                if skipped == '\n' {
                                    break;
                                }
                            }
                        }
                        Some('*') => {
                            self.bump();
                            self.block_comment()?;
                        }
                        _ => self.push(&mut lexemes, Token::Slash),
                    }
                }
                '0'..='9' => {
                    let token = self.number()?;
                    self.push(&mut lexemes, token);
                }
                'a'..='z' | 'A'..='Z' | '_' => {
                    let token = self.word();
                    self.push(&mut lexemes, token);
                }
                '"' => {
                    let token = self.string()?;
                    self.push(&mut lexemes, token);
                }
                '{' => self.single(&mut lexemes, Token::LBrace),
                '}' => self.single(&mut lexemes, Token::RBrace),
                '(' => self.single(&mut lexemes, Token::LParen),
                ')' => self.single(&mut lexemes, Token::RParen),
                ',' => self.single(&mut lexemes, Token::Comma),
                ';' => self.single(&mut lexemes, Token::Semicolon),
                ':' => self.single(&mut lexemes, Token::Colon),
                '$' => self.single(&mut lexemes, Token::Dollar),
                '+' => self.single(&mut lexemes, Token::Plus),
                '-' => self.single(&mut lexemes, Token::Minus),
                '*' => self.single(&mut lexemes, Token::Star),
                '=' => self.paired(&mut lexemes, '=', Token::EqEq, Token::Assign),
                '<' => self.paired(&mut lexemes, '=', Token::Lte, Token::Lt),
                '>' => self.paired(&mut lexemes, '=', Token::Gte, Token::Gt),
                '&' => self.paired(&mut lexemes, '&', Token::AmpAmp, Token::Amp),
                '|' => self.paired(&mut lexemes, '|', Token::PipePipe, Token::Pipe),
                '!' => {
                    self.bump();
                    if self.chars.peek() == Some(&'=') {
                        self.bump();
                        self.push(&mut lexemes, Token::NotEq);
                    } else {
                        return Err(ParseError::UnexpectedCharacter {
                            line: self.line,
                            found: '!',
                        });
                    }
                }
                '.' => {
                    self.bump();
                    if self.chars.peek() == Some(&'.') {
                        self.bump();
                        if self.bump() != Some('.') {
                            return Err(ParseError::UnexpectedCharacter {
                                line: self.line,
                                found: '.',
                            });
                        }
                        self.push(&mut lexemes, Token::Ellipsis);
                    } else {
                        return Err(ParseError::UnexpectedCharacter {
                            line: self.line,
                            found: '.',
                        });
                    }
                }
                other => {
                    return Err(ParseError::UnexpectedCharacter {
                        line: self.line,
                        found: other,
                    });
                }
            }
        }
        Ok(lexemes)
    }

    fn single(&mut self, lexemes: &mut Vec<Lexeme>, token: Token) {
        self.bump();
        self.push(lexemes, token);
    }

    /// `first` then `second` makes `long`; `first` alone makes `short`.
    fn paired(&mut self, lexemes: &mut Vec<Lexeme>, second: char, long: Token, short: Token) {
        self.bump();
        if self.chars.peek() == Some(&second) {
            self.bump();
            self.push(lexemes, long);
        } else {
            self.push(lexemes, short);
        }
    }

    fn block_comment(&mut self) -> Result<(), ParseError> {
        let opened_at = self.line;
        loop {
            match self.bump() {
                Some('*') if self.chars.peek() == Some(&'/') => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(ParseError::UnterminatedComment { line: opened_at }),
            }
        }
    }

    fn number(&mut self) -> Result<Token, ParseError> {
        let line = self.line;
        let mut text = String::new();
        while let Some(&next) = self.chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                text.push(next);
                self.bump();
            } else {
                break;
            }
        }
        let digits = text.replace('_', "");
        let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16)
        } else {
            digits.parse()
        };
        match parsed {
            Ok(value) => Ok(Token::Number(value)),
            Err(_) => Err(ParseError::InvalidNumber { line, text }),
        }
    }

    fn word(&mut self) -> Token {
        let mut text = String::new();
        while let Some(&next) = self.chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                text.push(next);
                self.bump();
            } else {
                break;
            }
        }
        match text.as_str() {
            "typedef" => Token::Typedef,
            "env" => Token::Env,
            "script" => Token::Script,
            "uses" => Token::Uses,
            "use" => Token::Use,
            "def" => Token::Def,
            "mac" => Token::Mac,
            "alias" => Token::Alias,
            "const" => Token::Const,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "do" => Token::Do,
            "for" => Token::For,
            "repeat" => Token::Repeat,
            "loop" => Token::Loop,
            "goto" => Token::Goto,
            "drop" => Token::Drop,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "callasm" => Token::Callasm,
            _ => Token::Ident(text),
        }
    }

    fn string(&mut self) -> Result<Token, ParseError> {
        let line = self.line;
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(Token::Str(text)),
                Some('\\') => {
                    // Keep the escape verbatim for the assembler.
                    text.push('\\');
                    match self.bump() {
                        Some(escaped) => text.push(escaped),
                        None => return Err(ParseError::UnterminatedString { line }),
                    }
                }
                Some(next) => text.push(next),
                None => return Err(ParseError::UnterminatedString { line }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        tokenize(source)
            .expect("tokenizes")
            .into_iter()
            .map(|lexeme| lexeme.token)
            .collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            tokens("if ifx u8"),
            [
                Token::If,
                Token::Ident("ifx".to_owned()),
                Token::Ident("u8".to_owned())
            ]
        );
    }

    #[test]
    fn numbers_decimal_and_hex() {
        assert_eq!(
            tokens("0 1000 0xFF 1_000"),
            [
                Token::Number(0),
                Token::Number(1000),
                Token::Number(255),
                Token::Number(1000)
            ]
        );
        assert!(matches!(
            tokenize("12ab"),
            Err(ParseError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn operators_longest_match() {
        assert_eq!(
            tokens("= == < <= & && | || !="),
            [
                Token::Assign,
                Token::EqEq,
                Token::Lt,
                Token::Lte,
                Token::Amp,
                Token::AmpAmp,
                Token::Pipe,
                Token::PipePipe,
                Token::NotEq
            ]
        );
    }

    #[test]
    fn comments_are_skipped_and_lines_tracked() {
        let lexemes = tokenize("// one\n/* two\nthree */ x").expect("tokenizes");
        assert_eq!(lexemes.len(), 1);
        assert_eq!(lexemes[0].token, Token::Ident("x".to_owned()));
        assert_eq!(lexemes[0].line, 3);
    }

    #[test]
    fn strings_keep_escapes_verbatim() {
        assert_eq!(
            tokens(r#""say \"hi\"\n""#),
            [Token::Str(r#"say \"hi\"\n"#.to_owned())]
        );
        assert!(matches!(
            tokenize("\"open"),
            Err(ParseError::UnterminatedString { line: 1 })
        ));
    }
}
