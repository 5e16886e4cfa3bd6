//! Directive tokenizer, variable interpolation, and document tree for
//! tag-annotated text.
//!
//! Documents mix plain text with `{% tag attr=value %} ... {% /tag %}`
//! directives and `{{ $path }}` placeholders. This crate turns the text
//! into a token stream and a node tree, and resolves placeholders
//! against variable bindings. Rendering and schema validation are left
//! to a caller-supplied [`Transformer`].
//!
//! # Quick start
//!
//! ```
//! use doctags::{Config, parse_str};
//!
//! let ast = parse_str("{% note title=\"Hi {{ $name }}\" %}\nBody\n{% /note %}\n").unwrap();
//! let config = Config::new().variable("name", "World");
//! let resolved = ast.resolve(&config).unwrap();
//!
//! let note = resolved.root().children().next().unwrap();
//! assert_eq!(note.attributes["title"], doctags::Value::from("Hi World"));
//! ```
//!
//! ## Interpolate a string
//!
//! ```
//! use doctags::{Bindings, Value, interpolate_string};
//!
//! let vars = Bindings::from([("bar".to_string(), Value::from("test"))]);
//! let out = interpolate_string("foo {{ $bar }} {{ $baz }}", Some(&vars));
//! assert_eq!(out.result, "foo test {{ $baz }}");
//! assert_eq!(out.unresolved, ["baz"]);
//! ```

#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod ast;
pub mod builder;
pub mod config;
pub mod grammar;
pub mod interpolate;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod transform;
pub mod value;

pub use ast::{
    Ast, Attributes, Level, Node, NodeId, NodeRef, NodeType, Traverse, Tree, TreeError,
    ValidationError,
};
pub use config::{Config, ConfigError};
pub use grammar::{
    DefaultGrammar, GrammarContext, GrammarError, SyntaxError, SyntaxErrorKind, TagDescriptor,
    TagGrammar,
};
pub use interpolate::{Interpolation, interpolate_string, interpolate_value};
pub use lexer::{LexError, find_tag_end, tokenize, tokenize_with};
pub use parser::parse;
pub use token::{
    Attribute, AttributeKind, DirectiveError, DirectiveInfo, Location, Position, SourceLocation,
    Token, TokenKind,
};
pub use transform::{MaybeDeferred, RenderableNode, Tag, Transformer};
pub use value::{Bindings, Displayable, Function, PathSegment, Value, Variable};

/// Unified error type for the fallible entry points.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The tag grammar failed with a non-syntax error.
    #[error("{0}")]
    Lex(#[from] LexError),
    /// A tree operation broke an ownership invariant.
    #[error("{0}")]
    Tree(#[from] TreeError),
    /// A config could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

/// Tokenize and build the tree for a document in one step.
pub fn parse_str(input: &str) -> Result<Ast, Error> {
    let tokens = tokenize(input)?;
    Ok(parse(&tokens)?)
}
