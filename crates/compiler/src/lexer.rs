//! Tokenizer for the supported C subset
//!
//! Produces a flat token stream with longest-match disambiguation:
//! keywords win over identifiers, and multi-character punctuation wins
//! over its prefixes (`<<=` before `<<` before `<`).

use std::fmt;

/// Every token kind the lexer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Keywords
    Int,
    Void,
    Return,
    If,
    Else,
    While,
    Do,
    For,
    Break,
    Continue,
    Switch,
    Case,
    Default,
    Goto,

    // Literals and names
    Identifier,
    Constant,

    // Punctuation
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Semicolon,
    Comma,
    Colon,
    QuestionMark,

    // Operators
    Tilde,
    Minus,
    Decrement,
    Increment,
    Plus,
    Star,
    Slash,
    Percent,
    Ampersand,
    Pipe,
    Caret,
    LeftShift,
    RightShift,
    Bang,
    LogicalAnd,
    LogicalOr,
    EqualEqual,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    LeftShiftAssign,
    RightShiftAssign,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A token with the lexeme it was cut from.
///
/// The lexeme is only meaningful for `Identifier` and `Constant`; for
/// fixed tokens it simply repeats the punctuation or keyword text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
}

impl Token {
    fn new(kind: TokenKind, lexeme: &str) -> Self {
        Token {
            kind,
            lexeme: lexeme.to_string(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Identifier | TokenKind::Constant => {
                write!(f, "{}({})", self.kind, self.lexeme)
            }
            _ => write!(f, "{}", self.kind),
        }
    }
}

/// No token rule matched the remaining input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    /// The head of the input the lexer was stuck on.
    pub remainder: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid token at '{}'", self.remainder)
    }
}

impl std::error::Error for LexError {}

/// Punctuation rules ordered longest-first so a simple first-match scan
/// implements longest-match.
const PUNCTUATION: &[(&str, TokenKind)] = &[
    ("<<=", TokenKind::LeftShiftAssign),
    (">>=", TokenKind::RightShiftAssign),
    ("--", TokenKind::Decrement),
    ("++", TokenKind::Increment),
    ("<<", TokenKind::LeftShift),
    (">>", TokenKind::RightShift),
    ("&&", TokenKind::LogicalAnd),
    ("||", TokenKind::LogicalOr),
    ("==", TokenKind::EqualEqual),
    ("!=", TokenKind::NotEqual),
    ("<=", TokenKind::LessEqual),
    (">=", TokenKind::GreaterEqual),
    ("+=", TokenKind::PlusAssign),
    ("-=", TokenKind::MinusAssign),
    ("*=", TokenKind::StarAssign),
    ("/=", TokenKind::SlashAssign),
    ("%=", TokenKind::PercentAssign),
    ("&=", TokenKind::AndAssign),
    ("|=", TokenKind::OrAssign),
    ("^=", TokenKind::XorAssign),
    ("(", TokenKind::OpenParen),
    (")", TokenKind::CloseParen),
    ("{", TokenKind::OpenBrace),
    ("}", TokenKind::CloseBrace),
    (";", TokenKind::Semicolon),
    (",", TokenKind::Comma),
    (":", TokenKind::Colon),
    ("?", TokenKind::QuestionMark),
    ("~", TokenKind::Tilde),
    ("-", TokenKind::Minus),
    ("+", TokenKind::Plus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("&", TokenKind::Ampersand),
    ("|", TokenKind::Pipe),
    ("^", TokenKind::Caret),
    ("<", TokenKind::Less),
    (">", TokenKind::Greater),
    ("!", TokenKind::Bang),
    ("=", TokenKind::Assign),
];

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "int" => TokenKind::Int,
        "void" => TokenKind::Void,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "for" => TokenKind::For,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "goto" => TokenKind::Goto,
        _ => return None,
    };
    Some(kind)
}

pub struct Lexer {
    source: String,
    pos: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        // Tabs are normalized away up front so column-free scanning only
        // ever deals with plain spaces.
        Lexer {
            source: source.replace('\t', "  "),
            pos: 0,
        }
    }

    /// Tokenize the whole input, failing on the first unmatched character.
    pub fn lex(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while !self.rest().is_empty() {
            if self.skip_trivia() {
                continue;
            }
            let token = self.next_token()?;
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn rest(&self) -> &str {
        &self.source[self.pos..]
    }

    /// Skip whitespace, comments, and preprocessor lines. Returns true if
    /// anything was consumed.
    fn skip_trivia(&mut self) -> bool {
        let rest = self.rest();
        let mut chars = rest.chars();

        match chars.next() {
            Some(c) if c.is_ascii_whitespace() => {
                self.pos += c.len_utf8();
                true
            }
            // Preprocessor output is tolerated: the whole line is dropped.
            Some('#') => {
                self.skip_line();
                true
            }
            Some('/') if rest.starts_with("//") => {
                self.skip_line();
                true
            }
            Some('/') if rest.starts_with("/*") => {
                match rest.find("*/") {
                    Some(end) => self.pos += end + 2,
                    // An unterminated block comment swallows the rest of
                    // the file, matching the behavior of a line comment at
                    // end of input.
                    None => self.pos = self.source.len(),
                }
                true
            }
            _ => false,
        }
    }

    fn skip_line(&mut self) {
        match self.rest().find('\n') {
            Some(end) => self.pos += end + 1,
            None => self.pos = self.source.len(),
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let rest = self.rest();
        let first = rest.chars().next().expect("next_token on empty input");

        if first.is_ascii_alphabetic() || first == '_' {
            return Ok(self.lex_word());
        }
        if first.is_ascii_digit() {
            return self.lex_constant();
        }

        for (text, kind) in PUNCTUATION {
            if rest.starts_with(text) {
                self.pos += text.len();
                return Ok(Token::new(*kind, text));
            }
        }

        Err(self.stuck())
    }

    fn lex_word(&mut self) -> Token {
        let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        match keyword(&word) {
            Some(kind) => Token::new(kind, &word),
            None => Token::new(TokenKind::Identifier, &word),
        }
    }

    fn lex_constant(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        let digits = self.take_while(|c| c.is_ascii_digit());

        // A constant must end at a word boundary: `123abc` is not a
        // constant followed by an identifier, it is garbage.
        if let Some(c) = self.rest().chars().next()
            && (c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos = start;
            return Err(self.stuck());
        }

        Ok(Token::new(TokenKind::Constant, &digits))
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| !pred(*c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let word = rest[..end].to_string();
        self.pos += end;
        word
    }

    fn stuck(&self) -> LexError {
        let head: String = self.rest().chars().take(16).collect();
        LexError { remainder: head }
    }
}
