//! HCL2 parsing for the iacgraph core.
//!
//! This crate covers the Terraform side of the pipeline: a total lexer, a
//! recovering block parser, a classification-based expression parser with a
//! shared LRU cache, a reference walker, and a module-source classifier.
//!
//! ```
//! use iac_diagnostics::ParseOptions;
//! use hcl_syntax::{HclParser, collect_references};
//!
//! let parser = HclParser::new(ParseOptions::default());
//! let result = parser.parse("output \"ip\" { value = aws_instance.web.public_ip }\n", None);
//! let blocks = result.value.unwrap();
//! let refs = collect_references(blocks[0].attribute("value").unwrap());
//! assert_eq!(refs[0].attribute.as_deref(), Some("public_ip"));
//! ```

#![forbid(unsafe_code)]

pub mod block;
pub mod expr;
pub mod lexer;
pub mod module_source;
pub mod reference;

pub use block::{HclBlock, HclBlockType, HclParser};
pub use expr::{ExpressionParser, HclExpression, LiteralValue, TemplatePart};
pub use lexer::{Token, TokenType, tokenize};
pub use module_source::{ModuleSource, classify as classify_module_source};
pub use reference::{ParsedReference, ReferenceKind, collect_references};
