//! Recursive-descent parser from token streams to typed HCL blocks.

use indexmap::IndexMap;
use iac_diagnostics::{
    Diagnostic, DiagnosticCode, ParseOptions, ParseResult, SourceSpan,
};
use serde::Serialize;

use crate::expr::{ExpressionParser, HclExpression};
use crate::lexer::{self, Token, TokenType};

/// The closed set of top-level Terraform block kinds.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HclBlockType {
    Resource,
    Data,
    Module,
    Variable,
    Output,
    Locals,
    Provider,
    Terraform,
    Moved,
    Import,
}

impl HclBlockType {
    /// Maps a block identifier onto a known kind.
    pub fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "resource" => Some(Self::Resource),
            "data" => Some(Self::Data),
            "module" => Some(Self::Module),
            "variable" => Some(Self::Variable),
            "output" => Some(Self::Output),
            "locals" => Some(Self::Locals),
            "provider" => Some(Self::Provider),
            "terraform" => Some(Self::Terraform),
            "moved" => Some(Self::Moved),
            "import" => Some(Self::Import),
            _ => None,
        }
    }

    /// The stable string form of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Data => "data",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::Output => "output",
            Self::Locals => "locals",
            Self::Provider => "provider",
            Self::Terraform => "terraform",
            Self::Moved => "moved",
            Self::Import => "import",
        }
    }

    /// How many labels a top-level block of this kind must carry.
    pub fn expected_labels(&self) -> usize {
        match self {
            Self::Resource | Self::Data => 2,
            Self::Module | Self::Variable | Self::Output | Self::Provider => 1,
            Self::Locals | Self::Terraform | Self::Moved | Self::Import => 0,
        }
    }
}

/// A parsed HCL block.
///
/// `block_type` is the raw identifier; top-level blocks always map onto
/// [`HclBlockType`] (unknown identifiers are skipped during parsing), while
/// nested blocks (`ingress`, `backend`, `lifecycle`, …) are free-form.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct HclBlock {
    pub block_type: String,
    pub labels: Vec<String>,
    pub attributes: IndexMap<String, HclExpression>,
    pub nested_blocks: Vec<HclBlock>,
    pub span: SourceSpan,
}

impl HclBlock {
    /// The known kind of this block, when it has one.
    pub fn kind(&self) -> Option<HclBlockType> {
        HclBlockType::from_ident(&self.block_type)
    }

    /// Looks up a direct attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&HclExpression> {
        self.attributes.get(name)
    }

    /// Iterates nested blocks with the given type.
    pub fn nested(&self, block_type: &str) -> impl Iterator<Item = &HclBlock> {
        self.nested_blocks
            .iter()
            .filter(move |block| block.block_type == block_type)
    }
}

/// Parses HCL source into top-level blocks.
///
/// The expression cache lives inside the parser, so reusing one parser
/// across many files shares parsed expressions.
pub struct HclParser {
    options: ParseOptions,
    expressions: ExpressionParser,
}

impl HclParser {
    pub fn new(options: ParseOptions) -> Self {
        let expressions = ExpressionParser::new(&options);
        Self {
            options,
            expressions,
        }
    }

    /// The expression parser (and cache) backing this block parser.
    pub fn expressions(&self) -> &ExpressionParser {
        &self.expressions
    }

    /// Parses `source` into blocks, recovering from syntax errors when
    /// `error_recovery` is enabled.
    pub fn parse(&self, source: &str, file: Option<&str>) -> ParseResult<Vec<HclBlock>> {
        if source.len() > self.options.terraform_size_limit() {
            return ParseResult::with_diagnostics(
                Vec::new(),
                vec![Diagnostic::error(
                    DiagnosticCode::FileTooLarge,
                    format!(
                        "input is {} bytes, over the {}-byte limit",
                        source.len(),
                        self.options.terraform_size_limit()
                    ),
                )],
            );
        }

        let deadline = self.options.deadline();
        let (tokens, timed_out) = lexer::tokenize(source, &deadline);
        let tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|token| token.token_type != TokenType::Comment)
            .collect();

        let mut state = ParserState {
            source,
            tokens: &tokens,
            pos: 0,
            file,
            expressions: &self.expressions,
            options: &self.options,
            diagnostics: Vec::new(),
            fatal: false,
        };

        let mut blocks = Vec::new();

        if timed_out {
            state.diagnostics.push(Diagnostic::error(
                DiagnosticCode::ParseTimeout,
                "lexing exceeded the configured parse timeout",
            ));
        } else {
            loop {
                if deadline.expired() {
                    state.diagnostics.push(Diagnostic::error(
                        DiagnosticCode::ParseTimeout,
                        "parsing exceeded the configured parse timeout",
                    ));
                    break;
                }
                state.skip_newlines();
                if state.at_eof() || state.fatal {
                    break;
                }
                if let Some(block) = state.top_level() {
                    blocks.push(block);
                }
                if state.fatal {
                    break;
                }
            }
        }

        if state.fatal {
            let diagnostic = state
                .diagnostics
                .pop()
                .unwrap_or_else(|| Diagnostic::error(DiagnosticCode::ParseError, "parse failed"));
            return ParseResult::fatal(Diagnostic {
                severity: iac_diagnostics::Severity::Fatal,
                recoverable: false,
                ..diagnostic
            });
        }

        ParseResult::with_diagnostics(blocks, state.diagnostics)
    }
}

struct ParserState<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
    file: Option<&'a str>,
    expressions: &'a ExpressionParser,
    options: &'a ParseOptions,
    diagnostics: Vec<Diagnostic>,
    fatal: bool,
}

impl<'a> ParserState<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> &Token {
        let token = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn skip_newlines(&mut self) {
        while self.peek().token_type == TokenType::Newline {
            self.advance();
        }
    }

    fn span_for(&self, token: &Token) -> SourceSpan {
        let mut span = SourceSpan::point(token.line, token.column);
        if let Some(file) = self.file {
            span.file = Some(file.to_string());
        }
        span
    }

    /// Records a syntax error. Without error recovery this marks the parse
    /// fatal; with it, the caller is expected to resynchronize.
    fn error(&mut self, message: String, token: &Token) {
        let diagnostic =
            Diagnostic::error(DiagnosticCode::ParseError, message).at(self.span_for(token));
        self.diagnostics.push(diagnostic);
        if !self.options.error_recovery {
            self.fatal = true;
        }
    }

    /// Skips forward past the next `}` to resynchronize after an error.
    fn recover(&mut self) {
        while !self.at_eof() {
            if self.advance().token_type == TokenType::RBrace {
                return;
            }
        }
    }

    /// Parses one top-level construct. Known block types produce a block;
    /// unknown identifiers are tolerated and skipped.
    fn top_level(&mut self) -> Option<HclBlock> {
        let token = self.peek().clone();

        if token.token_type != TokenType::Identifier {
            self.error(
                format!("expected block identifier, found {:?}", token.token_type),
                &token,
            );
            if self.options.error_recovery {
                self.recover();
            }
            return None;
        }

        if HclBlockType::from_ident(&token.value).is_none() {
            tracing::debug!(identifier = %token.value, "skipping unknown top-level identifier");
            self.skip_unknown_construct();
            return None;
        }

        self.block(true)
    }

    /// Skips an unknown top-level identifier together with its `= expr`
    /// payload or its brace-delimited body.
    fn skip_unknown_construct(&mut self) {
        self.advance();

        // Skip any labels.
        while matches!(
            self.peek().token_type,
            TokenType::String | TokenType::Identifier
        ) {
            self.advance();
        }

        match self.peek().token_type {
            TokenType::Equals => {
                self.advance();
                let _ = self.expression_text();
            }
            TokenType::LBrace => {
                let mut depth = 0usize;
                while !self.at_eof() {
                    match self.advance().token_type {
                        TokenType::LBrace => depth += 1,
                        TokenType::RBrace => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    /// Parses a block: `IDENT (STRING | IDENT)* { body }`.
    fn block(&mut self, top_level: bool) -> Option<HclBlock> {
        let header = self.advance().clone();
        let block_type = header.value.clone();

        let mut labels = Vec::new();
        while matches!(
            self.peek().token_type,
            TokenType::String | TokenType::Identifier
        ) {
            let label = self.advance();
            labels.push(label.value.trim_matches('"').to_string());
        }

        if top_level
            && let Some(kind) = HclBlockType::from_ident(&block_type)
            && labels.len() != kind.expected_labels()
        {
            self.error(
                format!(
                    "`{block_type}` block expects {} label(s), found {}",
                    kind.expected_labels(),
                    labels.len()
                ),
                &header,
            );
            if self.fatal {
                return None;
            }
        }

        if self.peek().token_type != TokenType::LBrace {
            let found = self.peek().clone();
            self.error(
                format!("expected `{{` to open `{block_type}` block"),
                &found,
            );
            if self.options.error_recovery {
                self.recover();
            }
            return None;
        }
        self.advance();

        let mut attributes = IndexMap::new();
        let mut nested_blocks = Vec::new();
        let mut end_token = header.clone();

        loop {
            self.skip_newlines();
            let token = self.peek().clone();

            match token.token_type {
                TokenType::RBrace => {
                    end_token = self.advance().clone();
                    break;
                }
                TokenType::Eof => {
                    self.error(format!("unterminated `{block_type}` block"), &token);
                    end_token = token;
                    break;
                }
                TokenType::Identifier => {
                    self.advance();
                    match self.peek().token_type {
                        TokenType::Equals => {
                            self.advance();
                            let text = self.expression_text();
                            let expression = (*self.expressions.parse(&text)).clone();
                            attributes.insert(token.value.clone(), expression);
                        }
                        TokenType::String | TokenType::Identifier | TokenType::LBrace => {
                            self.pos -= 1;
                            if self.options.parse_nested_blocks {
                                if let Some(nested) = self.block(false) {
                                    nested_blocks.push(nested);
                                }
                            } else {
                                self.skip_unknown_construct();
                            }
                            if self.fatal {
                                return None;
                            }
                        }
                        _ => {
                            let found = self.peek().clone();
                            self.error(
                                format!(
                                    "expected `=` or nested block after `{}`",
                                    token.value
                                ),
                                &found,
                            );
                            if self.options.error_recovery {
                                self.recover();
                                return None;
                            }
                            return None;
                        }
                    }
                }
                _ => {
                    self.error(
                        format!(
                            "unexpected {:?} in `{block_type}` block body",
                            token.token_type
                        ),
                        &token,
                    );
                    if self.options.error_recovery {
                        self.recover();
                        return None;
                    }
                    return None;
                }
            }
        }

        let mut span = SourceSpan::region(
            header.line,
            header.column,
            end_token.line,
            end_token.column,
        );
        if let Some(file) = self.file {
            span.file = Some(file.to_string());
        }

        Some(HclBlock {
            block_type,
            labels,
            attributes,
            nested_blocks,
            span,
        })
    }

    /// Captures raw expression text by slicing the source between token
    /// spans, tracking bracket depth. Terminates on NEWLINE, `}` (at depth
    /// zero, left unconsumed), or `,` (at depth zero, consumed).
    fn expression_text(&mut self) -> String {
        let start = self.peek().span.start;
        let mut end = start;
        let mut depth = 0usize;

        loop {
            let token = self.peek();
            match token.token_type {
                TokenType::Eof => break,
                TokenType::Newline if depth == 0 => {
                    self.advance();
                    break;
                }
                TokenType::RBrace if depth == 0 => break,
                TokenType::Comma if depth == 0 => {
                    self.advance();
                    break;
                }
                TokenType::LBrace | TokenType::LBracket | TokenType::LParen => {
                    depth += 1;
                    end = token.span.end;
                    self.advance();
                }
                TokenType::RBrace | TokenType::RBracket | TokenType::RParen => {
                    depth = depth.saturating_sub(1);
                    end = token.span.end;
                    self.advance();
                }
                _ => {
                    end = token.span.end;
                    self.advance();
                }
            }
        }

        self.source[start..end].trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::expr::{HclExpression, LiteralValue};

    use super::*;

    fn parse(source: &str) -> ParseResult<Vec<HclBlock>> {
        HclParser::new(ParseOptions::default()).parse(source, Some("main.tf"))
    }

    fn parse_ok(source: &str) -> Vec<HclBlock> {
        let result = parse(source);
        assert!(result.success, "diagnostics: {:?}", result.errors);
        result.value.unwrap_or_default()
    }

    #[test]
    fn test_resource_block() {
        let blocks = parse_ok(
            r#"
resource "aws_instance" "web" {
  ami           = "ami-123456"
  instance_type = var.instance_type
}
"#,
        );

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.kind(), Some(HclBlockType::Resource));
        assert_eq!(block.labels, vec!["aws_instance", "web"]);
        assert_eq!(
            block.attribute("ami"),
            Some(&HclExpression::Literal {
                value: LiteralValue::String("ami-123456".into()),
                raw: Some(r#""ami-123456""#.into()),
            })
        );
        assert!(matches!(
            block.attribute("instance_type"),
            Some(HclExpression::Reference { .. })
        ));
        assert_eq!(block.span.file.as_deref(), Some("main.tf"));
        assert_eq!(block.span.line_start, 2);
    }

    #[test]
    fn test_nested_blocks() {
        let blocks = parse_ok(
            r#"
resource "aws_security_group" "sg" {
  name = "allow-http"

  ingress {
    from_port = 80
    to_port   = 80
  }

  ingress {
    from_port = 443
    to_port   = 443
  }
}
"#,
        );

        let block = &blocks[0];
        assert_eq!(block.nested("ingress").count(), 2);
        let first = block.nested("ingress").next().expect("ingress block");
        assert_eq!(
            first.attribute("from_port"),
            Some(&HclExpression::Literal {
                value: LiteralValue::Number(80.0),
                raw: Some("80".into()),
            })
        );
    }

    #[test]
    fn test_terraform_backend() -> anyhow::Result<()> {
        let blocks = parse_ok(
            r#"
terraform {
  required_version = ">= 1.5"

  backend "s3" {
    bucket = "state-bucket"
    key    = "prod/terraform.tfstate"
  }
}
"#,
        );

        let block = &blocks[0];
        assert_eq!(block.kind(), Some(HclBlockType::Terraform));
        assert_eq!(block.labels.len(), 0);
        let backend = block
            .nested("backend")
            .next()
            .ok_or_else(|| anyhow::anyhow!("missing backend block"))?;
        assert_eq!(backend.labels, vec!["s3"]);
        Ok(())
    }

    #[test]
    fn test_multiline_expression() {
        let blocks = parse_ok(
            r#"
locals {
  tags = {
    Name = "web"
    Env  = var.env
  }
}
"#,
        );

        let HclExpression::Object { attributes, .. } =
            blocks[0].attribute("tags").expect("tags attribute")
        else {
            panic!("expected object expression");
        };
        assert_eq!(attributes.keys().collect::<Vec<_>>(), vec!["Name", "Env"]);
    }

    #[test]
    fn test_unknown_top_level_skipped() {
        let blocks = parse_ok(
            r#"
wibble = "ignored"
frobnicate "what" {
  inner = 1
}
output "id" {
  value = aws_instance.web.id
}
"#,
        );

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind(), Some(HclBlockType::Output));
    }

    #[test]
    fn test_label_arity_validated() {
        let result = parse("resource \"only_one\" {\n}\n");
        assert!(!result.success);
        assert_eq!(result.errors[0].code, DiagnosticCode::ParseError);
        // Recovery keeps the malformed block.
        assert_eq!(result.value.map(|b| b.len()), Some(1));
    }

    #[test]
    fn test_error_recovery_resumes() {
        let result = parse(
            r#"
resource "aws_instance" "bad" {
  , = broken
}

variable "ok" {
  default = 1
}
"#,
        );

        assert!(!result.success);
        let blocks = result.value.expect("partial value");
        assert!(blocks.iter().any(|b| b.kind() == Some(HclBlockType::Variable)));
    }

    #[test]
    fn test_no_recovery_is_fatal() {
        let options = ParseOptions {
            error_recovery: false,
            ..Default::default()
        };
        let result = HclParser::new(options).parse("resource \"a\" \"b\" [\n", None);
        assert!(!result.success);
        assert!(result.value.is_none());
        assert_eq!(result.errors[0].severity, iac_diagnostics::Severity::Fatal);
    }

    #[test]
    fn test_file_too_large() {
        let options = ParseOptions {
            max_file_size: Some(8),
            ..Default::default()
        };
        let result = HclParser::new(options).parse("locals { a = 1 }\n", None);
        assert!(!result.success);
        assert_eq!(result.errors[0].code, DiagnosticCode::FileTooLarge);
    }

    #[test]
    fn test_moved_and_import_blocks() {
        let blocks = parse_ok(
            r#"
moved {
  from = aws_instance.old
  to   = aws_instance.new
}

import {
  to = aws_instance.web
  id = "i-12345"
}
"#,
        );
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind(), Some(HclBlockType::Moved));
        assert_eq!(blocks[1].kind(), Some(HclBlockType::Import));
    }

    #[test]
    fn test_heredoc_attribute() {
        let blocks = parse_ok(
            "resource \"aws_iam_policy\" \"p\" {\n  policy = <<EOF\n{\"Version\": \"2012-10-17\"}\nEOF\n}\n",
        );
        let HclExpression::Literal {
            value: LiteralValue::String(s),
            ..
        } = blocks[0].attribute("policy").expect("policy attribute")
        else {
            panic!("expected heredoc literal");
        };
        assert!(s.contains("2012-10-17"));
    }
}
