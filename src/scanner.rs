//! Scans an input buffer byte by byte.

use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub msg: String,
    pub ofs: usize,
}

pub struct Scanner<'a> {
    buf: &'a [u8],
    pub ofs: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Scanner { buf, ofs: 0 }
    }

    pub fn at_end(&self) -> bool {
        self.ofs >= self.buf.len()
    }

    pub fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        &self.buf[start..end]
    }

    /// The current byte, or NUL once past the end.
    pub fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    /// The byte `n` past the current one, or NUL once past the end.
    pub fn peek_at(&self, n: usize) -> u8 {
        self.buf.get(self.ofs + n).copied().unwrap_or(0)
    }

    pub fn next(&mut self) {
        if self.at_end() {
            panic!("scanned past end")
        }
        self.ofs += 1;
    }

    pub fn advance(&mut self, n: usize) {
        for _ in 0..n {
            self.next();
        }
    }

    pub fn read(&mut self) -> u8 {
        let c = self.peek();
        self.next();
        c
    }

    pub fn skip(&mut self, ch: u8) -> bool {
        if !self.at_end() && self.peek() == ch {
            self.next();
            return true;
        }
        false
    }

    /// Moves past the next newline, or to the end of the input.
    pub fn skip_to_end_of_line(&mut self) {
        while !self.at_end() {
            if self.read() == b'\n' {
                break;
            }
        }
    }

    pub fn format_parse_error(&self, filename: &Path, err: &ParseError) -> String {
        let mut ofs = 0;
        let lines = self.buf.split(|&c| c == b'\n');
        for (line_number, line) in lines.enumerate() {
            if ofs + line.len() >= err.ofs {
                let mut msg = "parse error: ".to_string();
                msg.push_str(&err.msg);
                msg.push('\n');

                let prefix = format!("{}:{}: ", filename.display(), line_number + 1);
                msg.push_str(&prefix);

                let mut context = String::from_utf8_lossy(line).into_owned();
                let mut col = err.ofs - ofs;
                if col > 40 {
                    // Trim beginning of line to fit it on screen.
                    msg.push_str("...");
                    context = context.chars().skip(col - 20).collect();
                    col = 3 + 20;
                }
                if context.chars().count() > 40 {
                    msg.extend(context.chars().take(40));
                    msg.push_str("...");
                } else {
                    msg.push_str(&context);
                }
                msg.push('\n');

                msg.push_str(&" ".repeat(prefix.len() + col));
                msg.push_str("^\n");
                return msg;
            }
            ofs += line.len() + 1;
        }
        panic!("invalid offset when formatting error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_past_end_is_nul() {
        let mut s = Scanner::new(b"ab");
        assert_eq!(s.read(), b'a');
        assert_eq!(s.peek_at(1), 0);
        s.next();
        assert!(s.at_end());
        assert_eq!(s.peek(), 0);
    }

    #[test]
    fn skip_to_end_of_line() {
        let mut s = Scanner::new(b"abc\ndef");
        s.skip_to_end_of_line();
        assert_eq!(s.ofs, 4);
        s.skip_to_end_of_line();
        assert!(s.at_end());
    }

    #[test]
    fn format_error_points_at_offset() {
        let s = Scanner::new(b"a: b\nc d\n");
        let err = ParseError {
            msg: "missing ':' following rule".to_string(),
            ofs: 7,
        };
        let msg = s.format_parse_error(Path::new("x.d"), &err);
        assert_eq!(
            msg,
            "parse error: missing ':' following rule\nx.d:2: c d\n         ^\n"
        );
    }
}
