//! A total tokenizer for HCL2 source.
//!
//! The lexer never fails: any byte sequence produces a token stream ending
//! in [`TokenType::Eof`]. Characters outside the recognized grammar are
//! skipped; it is the block parser's job to report structural errors.

use std::ops::Range;

use iac_diagnostics::Deadline;

/// The kinds of tokens the lexer emits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenType {
    Identifier,
    String,
    Number,
    Bool,
    Null,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Equals,
    Comma,
    Dot,
    Newline,
    Heredoc,
    Comment,
    Eof,
}

/// A single token: its type, raw text, and 1-based position.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub line: u32,
    pub column: u32,
    /// Byte range of the token within the source. Used by the block parser
    /// to slice expression text out of the original input.
    pub span: Range<usize>,
}

/// Tokenizes `source`, checking `deadline` at token boundaries.
///
/// Returns the token stream and whether the deadline expired mid-scan. An
/// expired scan still yields a valid (truncated) stream ending in EOF.
pub fn tokenize(source: &str, deadline: &Deadline) -> (Vec<Token>, bool) {
    let mut lexer = Lexer::new(source);
    let mut timed_out = false;

    loop {
        if deadline.expired() {
            timed_out = true;
            break;
        }

        match lexer.next_token() {
            Some(token) => lexer.tokens.push(token),
            None => break,
        }
    }

    let (line, column) = (lexer.line, lexer.column);
    let end = lexer.source.len();
    lexer.tokens.push(Token {
        token_type: TokenType::Eof,
        value: String::new(),
        line,
        column,
        span: end..end,
    });

    (lexer.tokens, timed_out)
}

struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Advances one byte, maintaining the line/column counters.
    fn bump(&mut self) {
        if self.bytes.get(self.pos) == Some(&b'\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.pos += 1;
    }

    fn token(
        &self,
        token_type: TokenType,
        start: usize,
        line: u32,
        column: u32,
    ) -> Token {
        Token {
            token_type,
            value: self.source[start..self.pos].to_string(),
            line,
            column,
            span: start..self.pos,
        }
    }

    /// Scans the next token, or returns `None` at end of input.
    fn next_token(&mut self) -> Option<Token> {
        loop {
            let byte = self.peek()?;
            let (start, line, column) = (self.pos, self.line, self.column);

            match byte {
                b' ' | b'\t' | b'\r' => {
                    self.bump();
                    continue;
                }
                b'\n' => {
                    self.bump();
                    return Some(Token {
                        token_type: TokenType::Newline,
                        value: "\n".into(),
                        line,
                        column,
                        span: start..self.pos,
                    });
                }
                b'#' => return Some(self.line_comment(start, line, column)),
                b'/' if self.peek_at(1) == Some(b'/') => {
                    return Some(self.line_comment(start, line, column));
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    return Some(self.block_comment(start, line, column));
                }
                b'"' => return Some(self.string(start, line, column)),
                b'<' if self.peek_at(1) == Some(b'<') => {
                    if let Some(token) = self.heredoc(start, line, column) {
                        return Some(token);
                    }
                    // `<<` not followed by a delimiter; skip the `<`.
                    self.bump();
                    continue;
                }
                b'{' => return Some(self.single(TokenType::LBrace)),
                b'}' => return Some(self.single(TokenType::RBrace)),
                b'[' => return Some(self.single(TokenType::LBracket)),
                b']' => return Some(self.single(TokenType::RBracket)),
                b'(' => return Some(self.single(TokenType::LParen)),
                b')' => return Some(self.single(TokenType::RParen)),
                b'=' => return Some(self.single(TokenType::Equals)),
                b',' => return Some(self.single(TokenType::Comma)),
                b'.' => return Some(self.single(TokenType::Dot)),
                b'-' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                    return Some(self.number(start, line, column));
                }
                b'0'..=b'9' => return Some(self.number(start, line, column)),
                b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                    return Some(self.identifier(start, line, column));
                }
                _ => {
                    // Unknown byte; the lexer is total, so skip it.
                    self.bump();
                    continue;
                }
            }
        }
    }

    fn single(&mut self, token_type: TokenType) -> Token {
        let (start, line, column) = (self.pos, self.line, self.column);
        self.bump();
        self.token(token_type, start, line, column)
    }

    fn line_comment(&mut self, start: usize, line: u32, column: u32) -> Token {
        while let Some(byte) = self.peek() {
            if byte == b'\n' {
                break;
            }
            self.bump();
        }
        self.token(TokenType::Comment, start, line, column)
    }

    fn block_comment(&mut self, start: usize, line: u32, column: u32) -> Token {
        self.bump();
        self.bump();
        while let Some(byte) = self.peek() {
            if byte == b'*' && self.peek_at(1) == Some(b'/') {
                self.bump();
                self.bump();
                break;
            }
            self.bump();
        }
        self.token(TokenType::Comment, start, line, column)
    }

    /// A double-quoted string. A `\x` escape is consumed as two characters
    /// so an escaped quote never closes the string. Newlines inside the
    /// string advance the line counter via `bump`.
    fn string(&mut self, start: usize, line: u32, column: u32) -> Token {
        self.bump();
        while let Some(byte) = self.peek() {
            match byte {
                b'\\' => {
                    self.bump();
                    if self.peek().is_some() {
                        self.bump();
                    }
                }
                b'"' => {
                    self.bump();
                    break;
                }
                _ => self.bump(),
            }
        }
        self.token(TokenType::String, start, line, column)
    }

    /// A heredoc: `<<IDENT` or `<<-IDENT`, body, then the delimiter alone
    /// on its own line (leading whitespace allowed for the indented form).
    ///
    /// Returns `None` when `<<` is not followed by a valid delimiter.
    fn heredoc(&mut self, start: usize, line: u32, column: u32) -> Option<Token> {
        let mut cursor = self.pos + 2;
        let indented = self.bytes.get(cursor) == Some(&b'-');
        if indented {
            cursor += 1;
        }

        let ident_start = cursor;
        while self
            .bytes
            .get(cursor)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            cursor += 1;
        }
        if cursor == ident_start {
            return None;
        }
        let delimiter = &self.source[ident_start..cursor];

        // Consume through the end of the opening line.
        while self.pos < cursor {
            self.bump();
        }
        while let Some(byte) = self.peek() {
            self.bump();
            if byte == b'\n' {
                break;
            }
        }

        // Consume body lines until the closing delimiter.
        loop {
            let line_start = self.pos;
            let mut line_end = line_start;
            while self.bytes.get(line_end).is_some_and(|b| *b != b'\n') {
                line_end += 1;
            }

            let text = &self.source[line_start..line_end];
            let candidate = if indented { text.trim_start() } else { text };
            if candidate.trim_end() == delimiter {
                while self.pos < line_end {
                    self.bump();
                }
                break;
            }

            if self.bytes.get(line_end).is_none() {
                // Unterminated heredoc: consume to EOF.
                while self.pos < line_end {
                    self.bump();
                }
                break;
            }

            while self.pos <= line_end {
                self.bump();
            }
        }

        Some(self.token(TokenType::Heredoc, start, line, column))
    }

    fn number(&mut self, start: usize, line: u32, column: u32) -> Token {
        if self.peek() == Some(b'-') {
            self.bump();
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mut cursor = self.pos + 1;
            if matches!(self.bytes.get(cursor), Some(b'+' | b'-')) {
                cursor += 1;
            }
            if self.bytes.get(cursor).is_some_and(|b| b.is_ascii_digit()) {
                while self.pos < cursor {
                    self.bump();
                }
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        self.token(TokenType::Number, start, line, column)
    }

    fn identifier(&mut self, start: usize, line: u32, column: u32) -> Token {
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            self.bump();
        }

        let token_type = match &self.source[start..self.pos] {
            "true" | "false" => TokenType::Bool,
            "null" => TokenType::Null,
            _ => TokenType::Identifier,
        };
        self.token(token_type, start, line, column)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        let deadline = Deadline::after(Duration::from_secs(5));
        let (tokens, timed_out) = tokenize(source, &deadline);
        assert!(!timed_out);
        tokens
    }

    fn types(source: &str) -> Vec<TokenType> {
        lex(source).iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn test_basic_attribute() {
        assert_eq!(
            types("region = \"us-east-1\"\n"),
            vec![
                TokenType::Identifier,
                TokenType::Equals,
                TokenType::String,
                TokenType::Newline,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_block_header() {
        let tokens = lex("resource \"aws_instance\" \"web\" {\n}\n");
        assert_eq!(tokens[0].value, "resource");
        assert_eq!(tokens[1].value, "\"aws_instance\"");
        assert_eq!(tokens[2].value, "\"web\"");
        assert_eq!(tokens[3].token_type, TokenType::LBrace);
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            types("true false null"),
            vec![TokenType::Bool, TokenType::Bool, TokenType::Null, TokenType::Eof]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("1 -2 3.5 1e9 2.5e-3");
        let values: Vec<&str> = tokens[..5].iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["1", "-2", "3.5", "1e9", "2.5e-3"]);
        assert!(tokens[..5].iter().all(|t| t.token_type == TokenType::Number));
    }

    #[test]
    fn test_comments() {
        let tokens = lex("# hash\n// slashes\n/* block\nspanning */ x");
        let comments: Vec<&Token> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::Comment)
            .collect();
        assert_eq!(comments.len(), 3);
        assert_eq!(comments[2].value, "/* block\nspanning */");
        // The block comment spans a line, so `x` lands on line 4.
        let x = tokens
            .iter()
            .find(|t| t.value == "x")
            .expect("identifier after comments");
        assert_eq!(x.line, 4);
    }

    #[test]
    fn test_escaped_quote_does_not_close_string() {
        let tokens = lex(r#"a = "he said \"hi\"" "#);
        assert_eq!(tokens[2].token_type, TokenType::String);
        assert_eq!(tokens[2].value, r#""he said \"hi\"""#);
    }

    #[test]
    fn test_heredoc() {
        let source = "config = <<EOF\nline one\nline two\nEOF\n";
        let tokens = lex(source);
        assert_eq!(tokens[2].token_type, TokenType::Heredoc);
        assert!(tokens[2].value.contains("line one"));
        assert!(tokens[2].value.ends_with("EOF"));
        assert_eq!(tokens[3].token_type, TokenType::Newline);
    }

    #[test]
    fn test_indented_heredoc() {
        let source = "config = <<-EOT\n  indented\n  EOT\n";
        let tokens = lex(source);
        assert_eq!(tokens[2].token_type, TokenType::Heredoc);
    }

    #[test]
    fn test_unknown_bytes_skipped() {
        // The lexer is total: unknown punctuation disappears.
        assert_eq!(
            types("a ? b : c"),
            vec![
                TokenType::Identifier,
                TokenType::Identifier,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_always_ends_in_eof() {
        for source in ["", "\u{fffd}\u{fffd}", "resource {", "\"unterminated"] {
            let tokens = lex(source);
            assert_eq!(
                tokens.last().map(|t| t.token_type),
                Some(TokenType::Eof),
                "failed for {source:?}"
            );
        }
    }

    #[test]
    fn test_line_and_column_tracking() {
        let tokens = lex("a = 1\nbb = 2\n");
        let bb = tokens.iter().find(|t| t.value == "bb").expect("bb token");
        assert_eq!((bb.line, bb.column), (2, 1));
        let two = tokens.iter().find(|t| t.value == "2").expect("2 token");
        assert_eq!((two.line, two.column), (2, 6));
    }

    #[test]
    fn test_token_values_reproduce_input() {
        // Re-concatenating token values reproduces the input, modulo
        // whitespace (comments are their own tokens and survive).
        let source = "resource \"aws_s3_bucket\" \"b\" {\n  # stores assets\n  bucket = \"assets\"\n  tags = { a = 1 }\n}\n";
        let rebuilt: String = lex(source)
            .iter()
            .map(|t| t.value.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let normalize = |text: &str| {
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        };
        assert_eq!(normalize(&rebuilt), normalize(source));
    }

    #[test]
    fn test_identifier_with_dashes() {
        let tokens = lex("helm-release");
        assert_eq!(tokens[0].token_type, TokenType::Identifier);
        assert_eq!(tokens[0].value, "helm-release");
    }
}
