//! Comment scanner for Rust source text.
//!
//! `syn` drops ordinary comments, so annotations are read from the raw text.
//! Positions use the same convention as `proc-macro2` span locations: 1-based
//! lines, 0-based character columns.

use crate::domain::annotation::Comment;
use crate::domain::span::SourceRange;

/// Every `//`, `///`, `//!`, `/* */`, `/** */` and `/*! */` comment in order.
/// String, raw string, byte string and char literals are skipped.
pub fn scan_comments(source: &str) -> Vec<Comment> {
    Scanner::new(source).run()
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    comments: Vec<Comment>,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 0,
            comments: Vec::new(),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn prev_is_ident(&self) -> bool {
        self.pos > 0 && {
            let p = self.chars[self.pos - 1];
            p.is_alphanumeric() || p == '_'
        }
    }

    fn run(mut self) -> Vec<Comment> {
        while let Some(c) = self.peek(0) {
            match c {
                '/' if self.peek(1) == Some('/') => self.line_comment(),
                '/' if self.peek(1) == Some('*') => self.block_comment(),
                '"' => self.string(),
                'r' | 'b' if !self.prev_is_ident() && self.raw_string_ahead() => self.raw_string(),
                '\'' => self.quote(),
                _ => {
                    self.bump();
                }
            }
        }
        self.comments
    }

    fn line_comment(&mut self) {
        let start = (self.line, self.col);
        self.bump();
        self.bump();
        // doc markers: `///` and `//!`
        if matches!(self.peek(0), Some('/') | Some('!')) {
            self.bump();
        }
        let mut text = String::new();
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.bump();
        }
        let text = text.strip_suffix('\r').map(str::to_string).unwrap_or(text);
        self.push(text, start);
    }

    fn block_comment(&mut self) {
        let start = (self.line, self.col);
        self.bump();
        self.bump();
        if matches!(self.peek(0), Some('*') | Some('!')) && self.peek(1) != Some('/') {
            self.bump();
        }
        let mut depth = 1usize;
        let mut text = String::new();
        while let Some(c) = self.peek(0) {
            if c == '/' && self.peek(1) == Some('*') {
                depth += 1;
                text.push_str("/*");
                self.bump();
                self.bump();
            } else if c == '*' && self.peek(1) == Some('/') {
                self.bump();
                self.bump();
                depth -= 1;
                if depth == 0 {
                    break;
                }
                text.push_str("*/");
            } else {
                text.push(c);
                self.bump();
            }
        }
        self.push(text, start);
    }

    fn push(&mut self, text: String, start: (usize, usize)) {
        self.comments.push(Comment {
            text,
            range: SourceRange::new(start, (self.line, self.col)),
        });
    }

    fn string(&mut self) {
        self.bump();
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '"' => break,
                _ => {}
            }
        }
    }

    /// `r"`, `r#"`, `br"`, `br#"` at the cursor (plain `b"` is handled as a string).
    fn raw_string_ahead(&self) -> bool {
        let mut i = 0;
        if self.peek(i) == Some('b') {
            i += 1;
        }
        if self.peek(i) != Some('r') {
            return false;
        }
        i += 1;
        while self.peek(i) == Some('#') {
            i += 1;
        }
        self.peek(i) == Some('"')
    }

    fn raw_string(&mut self) {
        if self.peek(0) == Some('b') {
            self.bump();
        }
        self.bump(); // r
        let mut hashes = 0;
        while self.peek(0) == Some('#') {
            hashes += 1;
            self.bump();
        }
        self.bump(); // opening quote
        while let Some(c) = self.bump() {
            if c == '"' && (0..hashes).all(|i| self.peek(i) == Some('#')) {
                for _ in 0..hashes {
                    self.bump();
                }
                break;
            }
        }
    }

    /// Char literal (`'a'`, `'\n'`, `'\u{1F600}'`) or lifetime (`'a`).
    fn quote(&mut self) {
        self.bump();
        match (self.peek(0), self.peek(1)) {
            (Some('\\'), _) => {
                self.bump();
                self.bump();
                while let Some(c) = self.bump() {
                    if c == '\'' || c == '\n' {
                        break;
                    }
                }
            }
            (Some(_), Some('\'')) => {
                self.bump();
                self.bump();
            }
            _ => {} // lifetime or label
        }
    }
}
