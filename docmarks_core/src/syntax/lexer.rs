//! Resumable lexer interface.
//!
//! The document stores a [`LexState`] in every syntax checkpoint. Loading that
//! state lets a lexer restart in the middle of the text instead of at the
//! beginning, and comparing freshly computed states against stored ones tells
//! the rescanner when an edit stopped having any effect.

/// Lexical context the lexer is in between two tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LexMode {
    #[default]
    Normal,
    /// Inside a block comment; `depth` counts open delimiters.
    BlockComment { depth: u16 },
    /// Inside a string literal opened with `quote`.
    Str { quote: char },
    /// Inside a string literal opened with three `quote` characters.
    TripleStr { quote: char },
}

/// Saved lexer state of one checkpoint.
///
/// The lexer is resumed at `checkpoint - pre_scan`, the start of the token
/// covering the checkpoint, in `mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LexState {
    pub mode: LexMode,
    /// Distance from the restart point to the checkpoint.
    pub pre_scan: usize,
}

impl LexState {
    pub fn new(mode: LexMode, pre_scan: usize) -> Self {
        Self { mode, pre_scan }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Whitespace,
    Newline,
    Identifier,
    Keyword,
    Number,
    Str,
    Comment,
    Punct,
}

/// A token covering `start..end` in document offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Result of one lexer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lexeme {
    Token(Token),
    /// The window ends before the next token does; refill and call again.
    NeedInput,
    /// The lexer sits at the end of the document.
    EndOfText,
}

/// A window of document text handed to the lexer.
#[derive(Debug, Clone, Copy)]
pub struct LexInput<'a> {
    pub chars: &'a [char],
    /// Document offset of `chars[0]`.
    pub offset: usize,
    /// True if the window reaches the end of the document.
    pub last: bool,
}

/// A lexer that can be suspended and resumed at token boundaries.
pub trait Lexer {
    /// Restarts lexing at `offset` in the context described by `state`.
    fn load_state(&mut self, state: &LexState, offset: usize);

    /// Produces the token starting at the current position.
    ///
    /// Must not consume anything when it returns [`Lexeme::NeedInput`], and
    /// must never return a token spanning a line feed.
    fn next_token(&mut self, input: &LexInput<'_>) -> Lexeme;

    /// State at the current position, with `pre_scan` zero.
    fn current_state(&self) -> LexState;

    /// Decides whether two saved states resume identically.
    fn state_equals(&self, a: &LexState, b: &LexState) -> bool {
        a == b
    }
}
