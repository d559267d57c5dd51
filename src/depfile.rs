//! Parsing of Makefile-style dependency files ("depfiles") as written by
//! compilers, e.g. `out.o: src/a.c include/b.h`.
//!
//! The escaping rules follow what Clang and GCC generate, which are not quite
//! the rules of either BSD or GNU make: `\ `, `\#` and `\\` are escapes, every
//! other backslash is kept literally, and `$$` is a `$`.

use crate::scanner::{ParseError, Scanner};

/// Receives the rules found by the parser.
///
/// `raw` arguments are the exact bytes of the input that made up a word;
/// `unescaped` is the word with escapes resolved.
pub trait ParseActions {
    fn on_rule_start(&mut self, raw: &[u8], unescaped: &[u8]);
    fn on_rule_dependency(&mut self, raw: &[u8], unescaped: &[u8]);
    fn on_rule_end(&mut self);
    fn on_error(&mut self, message: &str, offset: usize);
}

fn is_word_char(c: u8) -> bool {
    !matches!(c, b'\0' | b'\t' | b'\r' | b'\n' | b' ' | b'$' | b':')
}

struct Parser<'a, 'b, A: ParseActions> {
    scanner: Scanner<'a>,
    actions: &'b mut A,
    /// Only report the first rule, the remaining rules of compiler-generated
    /// depfiles repeat the same dependencies.
    first_rule_only: bool,
    /// Storage for the word currently being lexed, unescaped.
    word: Vec<u8>,
}

impl<'a, 'b, A: ParseActions> Parser<'a, 'b, A> {
    /// Skip blank space, newlines, and comments between rules.
    fn skip_whitespace_and_comments(&mut self) {
        while !self.scanner.at_end() {
            match self.scanner.peek() {
                b'#' => self.scanner.skip_to_end_of_line(),
                b' ' | b'\t' | b'\r' | b'\n' => self.scanner.next(),
                _ => break,
            }
        }
    }

    /// Skip blank space and backslashed newlines within a rule.
    fn skip_separators(&mut self) {
        while !self.scanner.at_end() {
            match (
                self.scanner.peek(),
                self.scanner.peek_at(1),
                self.scanner.peek_at(2),
            ) {
                (b' ' | b'\t' | b'\r', _, _) => self.scanner.next(),
                (b'\\', b'\n', _) => self.scanner.advance(2),
                (b'\\', b'\r', b'\n') => self.scanner.advance(3),
                _ => break,
            }
        }
    }

    fn is_line_continuation(&self) -> bool {
        self.scanner.peek() == b'\\'
            && (self.scanner.peek_at(1) == b'\n'
                || (self.scanner.peek_at(1) == b'\r' && self.scanner.peek_at(2) == b'\n'))
    }

    /// On Windows, a colon followed by a path separator is a drive letter.
    fn is_drive_separator(&self) -> bool {
        cfg!(windows)
            && self.scanner.peek() == b':'
            && matches!(self.scanner.peek_at(1), b'/' | b'\\')
    }

    /// Lex as much of a word as possible into self.word, leaving the scanner
    /// on the first byte that isn't part of it.
    fn lex_word(&mut self) {
        while !self.scanner.at_end() {
            let c = self.scanner.peek();

            if c == b'\\' {
                if self.is_line_continuation() {
                    break;
                }
                self.scanner.next();
                if self.scanner.at_end() {
                    self.word.push(b'\\');
                    break;
                }
                match self.scanner.read() {
                    c @ (b' ' | b'#' | b'\\') => self.word.push(c),
                    c => {
                        self.word.push(b'\\');
                        self.word.push(c);
                    }
                }
                continue;
            }

            if c == b'$' && self.scanner.peek_at(1) == b'$' {
                self.word.push(b'$');
                self.scanner.advance(2);
                continue;
            }

            if !is_word_char(c) && !self.is_drive_separator() {
                break;
            }

            self.word.push(c);
            self.scanner.next();
        }
    }

    /// Lex a word starting at the current position, returning its raw span
    /// or None if no word starts here.
    fn read_word(&mut self) -> Option<usize> {
        let start = self.scanner.ofs;
        self.word.clear();
        self.lex_word();
        if self.scanner.ofs == start {
            None
        } else {
            Some(start)
        }
    }

    fn error(&mut self, message: &str) {
        self.actions.on_error(message, self.scanner.ofs);
    }

    fn parse_prerequisites(&mut self) {
        while !self.scanner.at_end() {
            self.skip_separators();
            if self.scanner.at_end() || self.scanner.peek() == b'\n' {
                break;
            }

            let start = match self.read_word() {
                None => {
                    self.error("unexpected character in prerequisites");
                    self.scanner.skip_to_end_of_line();
                    break;
                }
                Some(start) => start,
            };
            // Paths with colons in them aren't escaped by compilers, so a
            // colon here is part of the path.
            while self.scanner.skip(b':') {
                self.word.push(b':');
                self.lex_word();
            }
            let raw = self.scanner.slice(start, self.scanner.ofs);
            self.actions.on_rule_dependency(raw, &self.word);
        }
    }

    fn parse(&mut self) {
        while !self.scanner.at_end() {
            self.skip_whitespace_and_comments();
            if self.scanner.at_end() {
                break;
            }

            let start = match self.read_word() {
                None => {
                    self.error("unexpected character in file");
                    self.scanner.skip_to_end_of_line();
                    continue;
                }
                Some(start) => start,
            };
            let raw = self.scanner.slice(start, self.scanner.ofs);
            self.actions.on_rule_start(raw, &self.word);

            self.skip_separators();
            if !self.scanner.skip(b':') {
                self.error("missing ':' following rule");
                self.actions.on_rule_end();
                self.scanner.skip_to_end_of_line();
                continue;
            }

            self.parse_prerequisites();
            self.actions.on_rule_end();

            if self.first_rule_only {
                break;
            }
        }
    }
}

/// Parse depfile text, reporting what's found to `actions`.
/// Errors are reported and parsing resumes on the following line.
pub fn parse<A: ParseActions>(data: &[u8], actions: &mut A, first_rule_only: bool) {
    let mut parser = Parser {
        scanner: Scanner::new(data),
        actions,
        first_rule_only,
        word: Vec::new(),
    };
    parser.parse()
}

/// One rule of a depfile, with escapes resolved.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Deps {
    pub target: String,
    pub deps: Vec<String>,
}

/// ParseActions that gathers rules and errors into owned values.
#[derive(Debug, Default)]
pub struct DepsCollector {
    pub rules: Vec<Deps>,
    pub errors: Vec<ParseError>,
}

impl ParseActions for DepsCollector {
    fn on_rule_start(&mut self, _raw: &[u8], unescaped: &[u8]) {
        self.rules.push(Deps {
            target: String::from_utf8_lossy(unescaped).into_owned(),
            deps: Vec::new(),
        });
    }

    fn on_rule_dependency(&mut self, _raw: &[u8], unescaped: &[u8]) {
        // Dependencies are only reported after a rule start.
        if let Some(rule) = self.rules.last_mut() {
            rule.deps
                .push(String::from_utf8_lossy(unescaped).into_owned());
        }
    }

    fn on_rule_end(&mut self) {}

    fn on_error(&mut self, message: &str, offset: usize) {
        self.errors.push(ParseError {
            msg: message.to_string(),
            ofs: offset,
        });
    }
}

/// Parse depfile text into owned rules plus any errors.
pub fn collect(data: &[u8], first_rule_only: bool) -> DepsCollector {
    let mut collector = DepsCollector::default();
    parse(data, &mut collector, first_rule_only);
    collector
}
