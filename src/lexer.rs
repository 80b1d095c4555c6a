use crate::diagnostics::Diagnostic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Say,
    Set,
    Const,
    Check,
    Else,
    Loop,
    For,
    In,
    Fn,
    Return,
    Break,
    Continue,
    Try,
    Catch,
    Finally,
    Switch,
    Case,
    Default,
    Import,
    Export,
    Use,
    And,
    Or,
    Not,
    True,
    False,
    Null,
    Await,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    EqEq,
    NotEq,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    LParen,
    RParen,
    Comma,
    Colon,
    Question,
    QuestionDot,
    QuestionQuestion,
    DotDot,
    Ellipsis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    Str,
    Ident,
    Keyword(Keyword),
    Op(Op),
    BlockStart,
    BlockEnd,
    ArrayStart,
    ArrayEnd,
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
    pub column: u32,
}

/// Scans `source` into a token stream terminated by exactly one `Eof` token.
///
/// Newlines are significant (they terminate statements) and are emitted as
/// tokens; spaces and tabs are skipped, `#` comments run to end of line.
pub fn tokenize(source: &str, file_path: Option<&str>) -> Result<Vec<Token>, Diagnostic> {
    Lexer::new(source, file_path).tokenize()
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    file_path: Option<&'a str>,
}

impl<'a> Lexer<'a> {
    fn new(source: &str, file_path: Option<&'a str>) -> Lexer<'a> {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            file_path,
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        while let Some(ch) = self.peek() {
            match ch {
                '\n' => {
                    tokens.push(self.simple(TokenKind::Newline, "\n"));
                    self.pos += 1;
                    self.line += 1;
                    self.column = 1;
                }
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '#' => {
                    while matches!(self.peek(), Some(c) if c != '\n') {
                        self.bump();
                    }
                }
                '"' => tokens.push(self.string_literal()?),
                '0'..='9' => tokens.push(self.number_literal()),
                'a'..='z' | 'A'..='Z' | '_' => tokens.push(self.identifier_or_keyword()),
                '{' => tokens.push(self.single(TokenKind::BlockStart)),
                '}' => tokens.push(self.single(TokenKind::BlockEnd)),
                '[' => tokens.push(self.single(TokenKind::ArrayStart)),
                ']' => tokens.push(self.single(TokenKind::ArrayEnd)),
                _ => tokens.push(self.operator()?),
            }
        }
        tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            line: self.line,
            column: self.column,
        });
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        self.column += 1;
        Some(ch)
    }

    fn simple(&self, kind: TokenKind, lexeme: &str) -> Token {
        Token {
            kind,
            lexeme: lexeme.to_string(),
            line: self.line,
            column: self.column,
        }
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let line = self.line;
        let column = self.column;
        let ch = self.bump().unwrap_or_default();
        Token {
            kind,
            lexeme: ch.to_string(),
            line,
            column,
        }
    }

    fn string_literal(&mut self) -> Result<Token, Diagnostic> {
        let line = self.line;
        let column = self.column;
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.bump();
                    return Ok(Token {
                        kind: TokenKind::Str,
                        lexeme: value,
                        line,
                        column,
                    });
                }
                // Strings may not span lines; an unterminated literal is
                // reported at its opening quote.
                Some('\n') | None => {
                    let mut diagnostic = Diagnostic::syntax("Unterminated string")
                        .with_position(line, column);
                    if let Some(file) = self.file_path {
                        diagnostic = diagnostic.with_file(file);
                    }
                    return Err(diagnostic);
                }
                Some(ch) => {
                    value.push(ch);
                    self.bump();
                }
            }
        }
    }

    fn number_literal(&mut self) -> Token {
        let line = self.line;
        let column = self.column;
        let mut value = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            value.push(self.bump().unwrap_or_default());
        }
        Token {
            kind: TokenKind::Number,
            lexeme: value,
            line,
            column,
        }
    }

    fn identifier_or_keyword(&mut self) -> Token {
        let line = self.line;
        let column = self.column;
        let mut value = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            value.push(self.bump().unwrap_or_default());
        }
        // `from` stays a plain identifier; the parser treats it contextually
        // inside `import { ... } from "module"`.
        let kind = match keyword_for(&value) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident,
        };
        Token {
            kind,
            lexeme: value,
            line,
            column,
        }
    }

    fn operator(&mut self) -> Result<Token, Diagnostic> {
        let line = self.line;
        let column = self.column;
        let ch = self.peek().unwrap_or_default();
        let next = self.peek_at(1);
        // Multi-character operators match greedily before single-character
        // ones.
        let (op, len) = match (ch, next) {
            ('=', Some('=')) => (Op::EqEq, 2),
            ('!', Some('=')) => (Op::NotEq, 2),
            ('>', Some('=')) => (Op::GreaterEq, 2),
            ('<', Some('=')) => (Op::LessEq, 2),
            ('?', Some('?')) => (Op::QuestionQuestion, 2),
            ('?', Some('.')) => (Op::QuestionDot, 2),
            ('.', Some('.')) if self.peek_at(2) == Some('.') => (Op::Ellipsis, 3),
            ('.', Some('.')) => (Op::DotDot, 2),
            ('+', _) => (Op::Plus, 1),
            ('-', _) => (Op::Minus, 1),
            ('*', _) => (Op::Star, 1),
            ('/', _) => (Op::Slash, 1),
            ('%', _) => (Op::Percent, 1),
            ('=', _) => (Op::Assign, 1),
            ('>', _) => (Op::Greater, 1),
            ('<', _) => (Op::Less, 1),
            ('(', _) => (Op::LParen, 1),
            (')', _) => (Op::RParen, 1),
            (',', _) => (Op::Comma, 1),
            (':', _) => (Op::Colon, 1),
            ('?', _) => (Op::Question, 1),
            _ => {
                let mut diagnostic =
                    Diagnostic::syntax(format!("Unexpected character '{ch}'"))
                        .with_position(line, column);
                if let Some(file) = self.file_path {
                    diagnostic = diagnostic.with_file(file);
                }
                return Err(diagnostic);
            }
        };
        let mut lexeme = String::new();
        for _ in 0..len {
            lexeme.push(self.bump().unwrap_or_default());
        }
        Ok(Token {
            kind: TokenKind::Op(op),
            lexeme,
            line,
            column,
        })
    }
}

fn keyword_for(ident: &str) -> Option<Keyword> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "say" => Kw::Say,
        "set" => Kw::Set,
        "const" => Kw::Const,
        "check" => Kw::Check,
        "else" => Kw::Else,
        "loop" => Kw::Loop,
        "for" => Kw::For,
        "in" => Kw::In,
        "fn" => Kw::Fn,
        "return" => Kw::Return,
        "break" => Kw::Break,
        "continue" => Kw::Continue,
        "try" => Kw::Try,
        "catch" => Kw::Catch,
        "finally" => Kw::Finally,
        "switch" => Kw::Switch,
        "case" => Kw::Case,
        "default" => Kw::Default,
        "import" => Kw::Import,
        "export" => Kw::Export,
        "use" => Kw::Use,
        "and" => Kw::And,
        "or" => Kw::Or,
        "not" => Kw::Not,
        "true" => Kw::True,
        "false" => Kw::False,
        "null" => Kw::Null,
        "await" => Kw::Await,
        _ => return None,
    };
    Some(keyword)
}
