//! Hand-written resumable lexer driven by [`LanguageRules`].
//!
//! Comments and strings that span lines are emitted one line at a time, so
//! every token ends at or before a line feed and the lexer can be resumed at
//! any token start from `(offset, mode)` alone.

use super::language::{Language, LanguageRules};
use super::lexer::{LexInput, LexMode, LexState, Lexeme, Lexer, Token, TokenKind};

/// The window ran out before the token did.
struct NeedMore;

/// Characters starting at the lexer position.
struct Window<'a> {
    chars: &'a [char],
    start: usize,
    last: bool,
}

impl Window<'_> {
    fn get(&self, i: usize) -> Result<Option<char>, NeedMore> {
        match self.chars.get(self.start + i) {
            Some(&c) => Ok(Some(c)),
            None if self.last => Ok(None),
            None => Err(NeedMore),
        }
    }

    fn starts_with(&self, at: usize, pattern: impl IntoIterator<Item = char>) -> Result<bool, NeedMore> {
        for (k, expected) in pattern.into_iter().enumerate() {
            if self.get(at + k)? != Some(expected) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Index of the first character at or after `from` failing `pred`.
    fn run(&self, from: usize, pred: impl Fn(char) -> bool) -> Result<usize, NeedMore> {
        let mut i = from;
        while let Some(c) = self.get(i)? {
            if !pred(c) {
                break;
            }
            i += 1;
        }
        Ok(i)
    }

    fn slice(&self, len: usize) -> &[char] {
        &self.chars[self.start..self.start + len]
    }
}

type Scanned = Result<(TokenKind, usize, LexMode), NeedMore>;

/// Default lexer for the built-in languages.
#[derive(Debug, Clone)]
pub struct StandardLexer {
    language: Language,
    rules: LanguageRules,
    pos: usize,
    mode: LexMode,
}

impl Default for StandardLexer {
    fn default() -> Self {
        Self::new(Language::default())
    }
}

impl StandardLexer {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            rules: language.rules(),
            pos: 0,
            mode: LexMode::Normal,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Switches the rule set. Saved states from the old language are
    /// meaningless afterwards.
    pub fn set_language(&mut self, language: Language) {
        self.language = language;
        self.rules = language.rules();
    }

    /// Document offset of the next token.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn scan(&self, w: &Window<'_>, c: char) -> Scanned {
        if c == '\n' {
            let mode = match self.mode {
                LexMode::Str { .. } if !self.rules.multiline_strings => LexMode::Normal,
                mode => mode,
            };
            return Ok((TokenKind::Newline, 1, mode));
        }
        match self.mode {
            LexMode::Normal => self.scan_normal(w, c),
            LexMode::BlockComment { depth } => self.scan_block_comment(w, 0, depth),
            LexMode::Str { quote } => scan_string(w, 0, quote),
            LexMode::TripleStr { quote } => scan_triple_string(w, 0, quote),
        }
    }

    fn scan_normal(&self, w: &Window<'_>, c: char) -> Scanned {
        let rules = &self.rules;
        if c.is_whitespace() {
            let len = w.run(0, |c| c.is_whitespace() && c != '\n')?;
            return Ok((TokenKind::Whitespace, len, LexMode::Normal));
        }
        if let Some(prefix) = rules.line_comment {
            if w.starts_with(0, prefix.chars())? {
                let len = w.run(0, |c| c != '\n')?;
                return Ok((TokenKind::Comment, len, LexMode::Normal));
            }
        }
        if let Some((open, _)) = rules.block_comment {
            if w.starts_with(0, open.chars())? {
                return self.scan_block_comment(w, open.chars().count(), 1);
            }
        }
        if rules.quotes.contains(&c) {
            if rules.triple_quotes && w.starts_with(0, [c; 3])? {
                return scan_triple_string(w, 3, c);
            }
            return scan_string(w, 1, c);
        }
        if c.is_alphabetic() || c == '_' {
            let len = w.run(0, |c| c.is_alphanumeric() || c == '_')?;
            let word = w.slice(len);
            let keyword = rules
                .keywords
                .iter()
                .any(|k| k.chars().eq(word.iter().copied()));
            let kind = if keyword {
                TokenKind::Keyword
            } else {
                TokenKind::Identifier
            };
            return Ok((kind, len, LexMode::Normal));
        }
        if c.is_ascii_digit() {
            let len = w.run(0, |c| c.is_alphanumeric() || c == '_' || c == '.')?;
            return Ok((TokenKind::Number, len, LexMode::Normal));
        }
        Ok((TokenKind::Punct, 1, LexMode::Normal))
    }

    fn scan_block_comment(&self, w: &Window<'_>, from: usize, depth: u16) -> Scanned {
        let (open, close) = self.rules.block_comment.unwrap_or(("/*", "*/"));
        let mut depth = depth;
        let mut i = from;
        loop {
            match w.get(i)? {
                None | Some('\n') => return Ok((TokenKind::Comment, i, LexMode::BlockComment { depth })),
                Some(_) if w.starts_with(i, close.chars())? => {
                    i += close.chars().count();
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok((TokenKind::Comment, i, LexMode::Normal));
                    }
                }
                Some(_) if self.rules.nested_comments && w.starts_with(i, open.chars())? => {
                    i += open.chars().count();
                    depth = depth.saturating_add(1);
                }
                Some(_) => i += 1,
            }
        }
    }
}

/// Skips an escape at `i`, leaving a following line feed in place.
fn skip_escape(w: &Window<'_>, i: usize) -> Result<usize, NeedMore> {
    Ok(match w.get(i + 1)? {
        Some('\n') | None => i + 1,
        Some(_) => i + 2,
    })
}

fn scan_string(w: &Window<'_>, from: usize, quote: char) -> Scanned {
    let mut i = from;
    loop {
        match w.get(i)? {
            None | Some('\n') => return Ok((TokenKind::Str, i, LexMode::Str { quote })),
            Some(c) if c == quote => return Ok((TokenKind::Str, i + 1, LexMode::Normal)),
            Some('\\') => i = skip_escape(w, i)?,
            Some(_) => i += 1,
        }
    }
}

fn scan_triple_string(w: &Window<'_>, from: usize, quote: char) -> Scanned {
    let mut i = from;
    loop {
        match w.get(i)? {
            None | Some('\n') => return Ok((TokenKind::Str, i, LexMode::TripleStr { quote })),
            Some(c) if c == quote && w.starts_with(i, [quote; 3])? => {
                return Ok((TokenKind::Str, i + 3, LexMode::Normal))
            }
            Some('\\') => i = skip_escape(w, i)?,
            Some(_) => i += 1,
        }
    }
}

impl Lexer for StandardLexer {
    fn load_state(&mut self, state: &LexState, offset: usize) {
        self.mode = state.mode;
        self.pos = offset;
    }

    fn next_token(&mut self, input: &LexInput<'_>) -> Lexeme {
        if self.pos < input.offset {
            return Lexeme::NeedInput;
        }
        let window = Window {
            chars: input.chars,
            start: self.pos - input.offset,
            last: input.last,
        };
        let first = match window.get(0) {
            Ok(Some(c)) => c,
            Ok(None) => return Lexeme::EndOfText,
            Err(NeedMore) => return Lexeme::NeedInput,
        };
        match self.scan(&window, first) {
            Ok((kind, len, mode)) => {
                debug_assert!(len > 0, "empty token at {}", self.pos);
                let token = Token {
                    kind,
                    start: self.pos,
                    end: self.pos + len,
                };
                self.pos = token.end;
                self.mode = mode;
                Lexeme::Token(token)
            }
            Err(NeedMore) => Lexeme::NeedInput,
        }
    }

    fn current_state(&self) -> LexState {
        LexState::new(self.mode, 0)
    }
}
