//! Significant-indentation tokenizer.
//!
//! Produces a flat token stream with explicit `Indent`/`Dedent`/`Newline`
//! events so the parser grammar is free of whitespace. Inside brackets the
//! stream suppresses those events (implicit line joining); a backslash before
//! a newline joins physical lines explicitly.

use num_bigint::BigInt;
use num_traits::Num;

use crate::error::Error;

/// Maximum indentation depth. Bounds the indent stack so pathological inputs
/// fail with a structured error instead of growing without limit.
const MAX_INDENT_DEPTH: usize = 100;

/// Fixed keyword set. `match` and `case` are deliberately absent: they lex as
/// names and the parser decides contextually.
pub(crate) const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "break", "class", "continue", "def", "del", "elif", "else",
    "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda", "nonlocal", "not", "or",
    "pass", "raise", "return", "while", "with", "yield",
];

/// Punctuation and operator symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Arrow,
    Assign,
    Walrus,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    At,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    DoubleSlashAssign,
    PercentAssign,
    DoubleStarAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    AtAssign,
}

impl Op {
    /// The source spelling, used in error messages.
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::Semicolon => ";",
            Self::Dot => ".",
            Self::Arrow => "->",
            Self::Assign => "=",
            Self::Walrus => ":=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::DoubleSlash => "//",
            Self::Percent => "%",
            Self::DoubleStar => "**",
            Self::At => "@",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::Caret => "^",
            Self::Tilde => "~",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::PlusAssign => "+=",
            Self::MinusAssign => "-=",
            Self::StarAssign => "*=",
            Self::SlashAssign => "/=",
            Self::DoubleSlashAssign => "//=",
            Self::PercentAssign => "%=",
            Self::DoubleStarAssign => "**=",
            Self::AmpAssign => "&=",
            Self::PipeAssign => "|=",
            Self::CaretAssign => "^=",
            Self::ShlAssign => "<<=",
            Self::ShrAssign => ">>=",
            Self::AtAssign => "@=",
        }
    }
}

/// One lexical token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(BigInt),
    Float(f64),
    /// A decoded string literal (escape processing already applied).
    Str(String),
    /// An f-string: the raw template text, re-parsed per interpolation site
    /// when the expression is evaluated.
    FString {
        template: String,
        raw: bool,
    },
    Name(String),
    Keyword(&'static str),
    Op(Op),
    Newline,
    Indent,
    Dedent,
}

impl TokenKind {
    /// Short description for error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Int(v) => format!("number '{v}'"),
            Self::Float(v) => format!("number '{v}'"),
            Self::Str(_) | Self::FString { .. } => "string literal".to_string(),
            Self::Name(n) => format!("'{n}'"),
            Self::Keyword(k) => format!("'{k}'"),
            Self::Op(op) => format!("'{}'", op.symbol()),
            Self::Newline => "end of line".to_string(),
            Self::Indent => "indent".to_string(),
            Self::Dedent => "dedent".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

/// Tokenizes a complete source text.
///
/// Returns the flat token sequence or a syntax [`Error`] carrying the line of
/// the offending character. Never panics on malformed input.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    paren_depth: usize,
    /// Set once a non-blank token has been produced for the current logical line.
    line_has_content: bool,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.replace("\r\n", "\n").chars().collect(),
            pos: 0,
            line: 1,
            tokens: Vec::new(),
            indents: vec![0],
            paren_depth: 0,
            line_has_content: false,
        }
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::syntax(format!("SyntaxError: {}", message.into()), self.line)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token { kind, line: self.line });
    }

    fn run(mut self) -> Result<Vec<Token>, Error> {
        self.handle_line_start()?;
        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    self.bump();
                    if self.paren_depth == 0 && self.line_has_content {
                        // Newline token carries the line it terminates.
                        self.tokens.push(Token {
                            kind: TokenKind::Newline,
                            line: self.line - 1,
                        });
                        self.line_has_content = false;
                    }
                    if self.paren_depth == 0 {
                        self.handle_line_start()?;
                    }
                }
                ' ' | '\t' => {
                    self.bump();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '\\' => {
                    if self.peek_at(1) == Some('\n') {
                        self.bump();
                        self.bump();
                    } else {
                        return Err(self.err("unexpected character after line continuation character"));
                    }
                }
                '\'' | '"' => self.lex_string(String::new())?,
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number()?,
                c if c.is_alphabetic() || c == '_' => self.lex_name()?,
                _ => self.lex_op()?,
            }
        }
        if self.line_has_content {
            self.push(TokenKind::Newline);
        }
        // Dedents at end-of-file flush all open blocks.
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent);
        }
        Ok(self.tokens)
    }

    /// Measures leading whitespace at a physical line start and emits
    /// indent/dedent events. Blank and comment-only lines are skipped whole.
    fn handle_line_start(&mut self) -> Result<(), Error> {
        loop {
            let mut width = 0usize;
            let mut saw_tab = false;
            let mut saw_space = false;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => {
                        saw_space = true;
                        width += 1;
                        self.bump();
                    }
                    '\t' => {
                        saw_tab = true;
                        width += 1;
                        self.bump();
                    }
                    _ => break,
                }
            }
            match self.peek() {
                // Blank line or comment-only line: no tokens, no indent changes.
                Some('\n') => {
                    self.bump();
                    continue;
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                    continue;
                }
                None => return Ok(()),
                Some(_) => {}
            }
            if saw_tab && saw_space {
                return Err(self.err("inconsistent use of tabs and spaces in indentation"));
            }
            let current = *self.indents.last().unwrap_or(&0);
            if width > current {
                if self.indents.len() >= MAX_INDENT_DEPTH {
                    return Err(Error::syntax(
                        "IndentationError: too many levels of indentation".to_string(),
                        self.line,
                    ));
                }
                self.indents.push(width);
                self.push(TokenKind::Indent);
            } else if width < current {
                while *self.indents.last().unwrap_or(&0) > width {
                    self.indents.pop();
                    self.push(TokenKind::Dedent);
                }
                if *self.indents.last().unwrap_or(&0) != width {
                    return Err(Error::syntax(
                        "IndentationError: unindent does not match any outer indentation level".to_string(),
                        self.line,
                    ));
                }
            }
            self.line_has_content = true;
            return Ok(());
        }
    }

    /// Lexes a string literal, including any prefix letters already consumed
    /// into `prefix`.
    fn lex_string(&mut self, prefix: String) -> Result<(), Error> {
        let lower = prefix.to_lowercase();
        if lower.contains('b') {
            return Err(self.err("bytes literals are not supported"));
        }
        let raw = lower.contains('r');
        let fstring = lower.contains('f');

        let quote = self.bump().ok_or_else(|| self.err("unterminated string literal"))?;
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }
        let start_line = self.line;
        let mut body = String::new();
        loop {
            let Some(c) = self.peek() else {
                self.line = start_line;
                return Err(self.err("unterminated string literal"));
            };
            if c == quote {
                if triple {
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.bump();
                        self.bump();
                        self.bump();
                        break;
                    }
                    body.push(c);
                    self.bump();
                } else {
                    self.bump();
                    break;
                }
            } else if c == '\n' && !triple {
                self.line = start_line;
                return Err(self.err("unterminated string literal"));
            } else if c == '\\' {
                // Keep the escape sequence intact; decoding happens below for
                // plain strings and at interpolation time for f-strings.
                self.bump();
                body.push('\\');
                if let Some(next) = self.bump() {
                    body.push(next);
                } else {
                    self.line = start_line;
                    return Err(self.err("unterminated string literal"));
                }
            } else {
                body.push(c);
                self.bump();
            }
        }
        let kind = if fstring {
            TokenKind::FString { template: body, raw }
        } else if raw {
            TokenKind::Str(body)
        } else {
            TokenKind::Str(decode_escapes(&body).map_err(|m| {
                self.line = start_line;
                self.err(m)
            })?)
        };
        self.tokens.push(Token { kind, line: start_line });
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), Error> {
        let start = self.pos;
        let mut text = String::new();
        if self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'))
        {
            self.bump();
            let radix_char = self.bump().unwrap_or('x');
            let radix = match radix_char.to_ascii_lowercase() {
                'x' => 16,
                'o' => 8,
                _ => 2,
            };
            while let Some(c) = self.peek() {
                if c == '_' {
                    self.bump();
                } else if c.is_ascii_alphanumeric() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            let value = BigInt::from_str_radix(&text, radix)
                .map_err(|_| self.err(format!("invalid digit in base-{radix} literal")))?;
            self.push(TokenKind::Int(value));
            let _ = start;
            return Ok(());
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {
                    text.push(c);
                    self.bump();
                }
                '_' => {
                    self.bump();
                }
                '.' => {
                    // A second dot terminates the number (e.g. slice `1..`,
                    // attribute access on a literal is not supported anyway).
                    if is_float || text.contains(['e', 'E']) {
                        break;
                    }
                    is_float = true;
                    text.push('.');
                    self.bump();
                }
                'e' | 'E' => {
                    if text.contains(['e', 'E']) {
                        break;
                    }
                    // Only an exponent if followed by digits or a signed digit.
                    let next = self.peek_at(1);
                    let next2 = self.peek_at(2);
                    let exp = match next {
                        Some(d) if d.is_ascii_digit() => true,
                        Some('+' | '-') => next2.is_some_and(|d| d.is_ascii_digit()),
                        _ => false,
                    };
                    if !exp {
                        break;
                    }
                    is_float = true;
                    text.push('e');
                    self.bump();
                    if matches!(self.peek(), Some('+' | '-')) {
                        text.push(self.bump().unwrap_or('+'));
                    }
                }
                'j' | 'J' => {
                    return Err(self.err("complex literals are not supported"));
                }
                _ => break,
            }
        }
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.err(format!("invalid float literal '{text}'")))?;
            self.push(TokenKind::Float(value));
        } else {
            let value = BigInt::from_str_radix(&text, 10)
                .map_err(|_| self.err(format!("invalid integer literal '{text}'")))?;
            self.push(TokenKind::Int(value));
        }
        Ok(())
    }

    fn lex_name(&mut self) -> Result<(), Error> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // String prefixes: r"...", f"...", rf"...", b"..." (rejected later).
        if name.len() <= 2
            && name.chars().all(|c| matches!(c, 'r' | 'R' | 'f' | 'F' | 'b' | 'B'))
            && matches!(self.peek(), Some('\'' | '"'))
        {
            return self.lex_string(name);
        }
        if let Some(kw) = KEYWORDS.iter().find(|k| **k == name) {
            self.push(TokenKind::Keyword(kw));
        } else {
            self.push(TokenKind::Name(name));
        }
        Ok(())
    }

    fn lex_op(&mut self) -> Result<(), Error> {
        let c = self.bump().ok_or_else(|| self.err("unexpected end of input"))?;
        let next = self.peek();
        let next2 = self.peek_at(1);
        let op = match c {
            '(' => {
                self.paren_depth += 1;
                Op::LParen
            }
            ')' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                Op::RParen
            }
            '[' => {
                self.paren_depth += 1;
                Op::LBracket
            }
            ']' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                Op::RBracket
            }
            '{' => {
                self.paren_depth += 1;
                Op::LBrace
            }
            '}' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                Op::RBrace
            }
            ',' => Op::Comma,
            ';' => Op::Semicolon,
            '.' => Op::Dot,
            '~' => Op::Tilde,
            ':' => {
                if next == Some('=') {
                    self.bump();
                    Op::Walrus
                } else {
                    Op::Colon
                }
            }
            '=' => {
                if next == Some('=') {
                    self.bump();
                    Op::Eq
                } else {
                    Op::Assign
                }
            }
            '!' => {
                if next == Some('=') {
                    self.bump();
                    Op::Ne
                } else {
                    return Err(self.err("invalid character '!'"));
                }
            }
            '+' => {
                if next == Some('=') {
                    self.bump();
                    Op::PlusAssign
                } else {
                    Op::Plus
                }
            }
            '-' => match next {
                Some('=') => {
                    self.bump();
                    Op::MinusAssign
                }
                Some('>') => {
                    self.bump();
                    Op::Arrow
                }
                _ => Op::Minus,
            },
            '*' => match next {
                Some('*') => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        Op::DoubleStarAssign
                    } else {
                        Op::DoubleStar
                    }
                }
                Some('=') => {
                    self.bump();
                    Op::StarAssign
                }
                _ => Op::Star,
            },
            '/' => match next {
                Some('/') => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        Op::DoubleSlashAssign
                    } else {
                        Op::DoubleSlash
                    }
                }
                Some('=') => {
                    self.bump();
                    Op::SlashAssign
                }
                _ => Op::Slash,
            },
            '%' => {
                if next == Some('=') {
                    self.bump();
                    Op::PercentAssign
                } else {
                    Op::Percent
                }
            }
            '@' => {
                if next == Some('=') {
                    self.bump();
                    Op::AtAssign
                } else {
                    Op::At
                }
            }
            '&' => {
                if next == Some('=') {
                    self.bump();
                    Op::AmpAssign
                } else {
                    Op::Amp
                }
            }
            '|' => {
                if next == Some('=') {
                    self.bump();
                    Op::PipeAssign
                } else {
                    Op::Pipe
                }
            }
            '^' => {
                if next == Some('=') {
                    self.bump();
                    Op::CaretAssign
                } else {
                    Op::Caret
                }
            }
            '<' => match (next, next2) {
                (Some('<'), Some('=')) => {
                    self.bump();
                    self.bump();
                    Op::ShlAssign
                }
                (Some('<'), _) => {
                    self.bump();
                    Op::Shl
                }
                (Some('='), _) => {
                    self.bump();
                    Op::Le
                }
                _ => Op::Lt,
            },
            '>' => match (next, next2) {
                (Some('>'), Some('=')) => {
                    self.bump();
                    self.bump();
                    Op::ShrAssign
                }
                (Some('>'), _) => {
                    self.bump();
                    Op::Shr
                }
                (Some('='), _) => {
                    self.bump();
                    Op::Ge
                }
                _ => Op::Gt,
            },
            other => {
                return Err(self.err(format!("invalid character {other:?}")));
            }
        };
        self.push(TokenKind::Op(op));
        Ok(())
    }
}

/// Decodes the recognised escape sequences of a non-raw string body.
///
/// Recognised: `\n \t \r \0 \a \b \f \v \\ \' \" \xHH \uHHHH \UHHHHHHHH` plus
/// escaped physical newline (line splice). Unrecognised escapes keep the
/// backslash, matching CPython's lenient behavior.
pub(crate) fn decode_escapes(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            out.push('\\');
            break;
        };
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '\n' => {}
            'x' => out.push(take_hex(&mut chars, 2)?),
            'u' => out.push(take_hex(&mut chars, 4)?),
            'U' => out.push(take_hex(&mut chars, 8)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

fn take_hex(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, count: usize) -> Result<char, String> {
    let mut value: u32 = 0;
    for _ in 0..count {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| format!("truncated \\xXX escape (expected {count} hex digits)"))?;
        value = value * 16 + digit;
    }
    char::from_u32(value).ok_or_else(|| format!("invalid character code in escape: {value:#x}"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_expression() {
        assert_eq!(
            kinds("2 + 3"),
            vec![
                TokenKind::Int(BigInt::from(2)),
                TokenKind::Op(Op::Plus),
                TokenKind::Int(BigInt::from(3)),
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn indent_dedent_events() {
        let toks = kinds("if x:\n    y = 1\nz = 2\n");
        assert!(toks.contains(&TokenKind::Indent));
        assert!(toks.contains(&TokenKind::Dedent));
        let indent_pos = toks.iter().position(|t| *t == TokenKind::Indent).unwrap();
        let dedent_pos = toks.iter().position(|t| *t == TokenKind::Dedent).unwrap();
        assert!(indent_pos < dedent_pos);
    }

    #[test]
    fn eof_flushes_all_dedents() {
        let toks = kinds("if a:\n  if b:\n    c");
        let dedents = toks.iter().filter(|t| **t == TokenKind::Dedent).count();
        assert_eq!(dedents, 2);
    }

    #[test]
    fn blank_and_comment_lines_are_invisible() {
        let toks = kinds("a = 1\n\n# comment\n   \nb = 2\n");
        let newlines = toks.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
        assert!(!toks.contains(&TokenKind::Indent));
    }

    #[test]
    fn line_continuation_joins() {
        let toks = kinds("a = 1 + \\\n    2\n");
        let newlines = toks.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
        assert!(!toks.contains(&TokenKind::Indent));
    }

    #[test]
    fn implicit_joining_inside_brackets() {
        let toks = kinds("a = [1,\n     2]\n");
        let newlines = toks.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#"'a\nb'"#)[0], TokenKind::Str("a\nb".to_string()));
        assert_eq!(kinds(r#""\x41\u0042""#)[0], TokenKind::Str("AB".to_string()));
        assert_eq!(kinds(r#"r'a\nb'"#)[0], TokenKind::Str("a\\nb".to_string()));
    }

    #[test]
    fn triple_quoted_spans_lines() {
        let toks = tokenize("x = '''a\nb'''\n").unwrap();
        assert_eq!(toks[2].kind, TokenKind::Str("a\nb".to_string()));
        assert_eq!(toks[2].line, 1);
    }

    #[test]
    fn fstring_keeps_template() {
        assert_eq!(
            kinds(r#"f"x={x}""#)[0],
            TokenKind::FString {
                template: "x={x}".to_string(),
                raw: false
            }
        );
    }

    #[test]
    fn bytes_rejected() {
        let err = tokenize(r#"b'raw'"#).unwrap_err();
        assert!(err.message.contains("bytes"));
    }

    #[test]
    fn numeric_forms() {
        assert_eq!(kinds("0xff")[0], TokenKind::Int(BigInt::from(255)));
        assert_eq!(kinds("0o17")[0], TokenKind::Int(BigInt::from(15)));
        assert_eq!(kinds("0b101")[0], TokenKind::Int(BigInt::from(5)));
        assert_eq!(kinds("1_000_000")[0], TokenKind::Int(BigInt::from(1_000_000)));
        assert_eq!(kinds("1.5e3")[0], TokenKind::Float(1500.0));
        assert_eq!(kinds(".5")[0], TokenKind::Float(0.5));
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = tokenize("x = 1\ny = 'open\n").unwrap_err();
        assert_eq!(err.line, Some(2));
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn mixed_tabs_and_spaces_rejected() {
        let err = tokenize("if a:\n\t x = 1\n").unwrap_err();
        assert!(err.message.contains("tabs"));
    }

    #[test]
    fn inconsistent_dedent_rejected() {
        let err = tokenize("if a:\n    x = 1\n  y = 2\n").unwrap_err();
        assert!(err.message.contains("IndentationError"));
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn indentation_depth_is_bounded() {
        let mut source = String::new();
        for depth in 0..150 {
            source.push_str(&" ".repeat(depth));
            source.push_str("if a:\n");
        }
        let err = tokenize(&source).unwrap_err();
        assert!(err.message.contains("too many levels of indentation"));
    }

    #[test]
    fn walrus_and_arrow() {
        let toks = kinds("(n := 1)");
        assert!(toks.contains(&TokenKind::Op(Op::Walrus)));
        let toks = kinds("def f() -> int: pass\n");
        assert!(toks.contains(&TokenKind::Op(Op::Arrow)));
    }

    #[test]
    fn match_is_a_name() {
        assert_eq!(kinds("match")[0], TokenKind::Name("match".to_string()));
    }

    #[test]
    fn crlf_normalised() {
        let toks = kinds("a = 1\r\nb = 2\r\n");
        let newlines = toks.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
    }
}
