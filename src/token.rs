use std::fmt;

use serde::Serialize;

use crate::value::Value;

/// Line/character position. Lines are 1-based, characters are 0-based
/// byte offsets within the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceLocation {
    pub line: usize,
    pub character: usize,
}

/// Start/end pair of source locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

/// Line-relative column span of a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub start: usize,
    pub end: usize,
}

/// Positional data shared by every directive token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectiveInfo {
    /// Raw directive text, delimiters included.
    pub info: String,
    /// Start/end line pair of the directive.
    #[serde(rename = "map")]
    pub lines: [usize; 2],
    pub position: Position,
    /// False when the directive stands alone on its line.
    pub inline: bool,
}

/// Shorthand form an attribute was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// `key=value`
    Plain,
    /// `#name`
    Id,
    /// `.name`
    Class,
}

/// Attribute parsed from a directive body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttributeKind,
    pub value: Value,
}

/// Syntax error inside a directive, rebased to document coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectiveError {
    pub message: String,
    pub location: Location,
}

impl fmt::Display for DirectiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {}, character {}",
            self.message, self.location.start.line, self.location.start.character
        )
    }
}

/// Token kinds produced by the tokenizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenKind {
    /// Plain document text between directives.
    Text { content: String },
    /// `{% name ... %}`
    TagOpen {
        #[serde(flatten)]
        directive: DirectiveInfo,
        tag: String,
        attributes: Vec<Attribute>,
    },
    /// `{% /name %}`
    TagClose {
        #[serde(flatten)]
        directive: DirectiveInfo,
        tag: String,
    },
    /// `{% name ... /%}`
    Tag {
        #[serde(flatten)]
        directive: DirectiveInfo,
        tag: String,
        attributes: Vec<Attribute>,
    },
    /// `{% #id .class key=value %}` with no tag name.
    Annotation {
        #[serde(flatten)]
        directive: DirectiveInfo,
        attributes: Vec<Attribute>,
    },
    /// Directive whose body failed to parse.
    Error {
        #[serde(flatten)]
        directive: DirectiveInfo,
        error: DirectiveError,
    },
}

impl TokenKind {
    /// Block-structure effect: +1 opens, -1 closes, 0 is self-contained.
    #[must_use]
    pub const fn nesting(&self) -> i8 {
        match self {
            Self::TagOpen { .. } => 1,
            Self::TagClose { .. } => -1,
            Self::Text { .. }
            | Self::Tag { .. }
            | Self::Annotation { .. }
            | Self::Error { .. } => 0,
        }
    }

    /// Directive metadata, `None` for text.
    #[must_use]
    pub const fn directive(&self) -> Option<&DirectiveInfo> {
        match self {
            Self::Text { .. } => None,
            Self::TagOpen { directive, .. }
            | Self::TagClose { directive, .. }
            | Self::Tag { directive, .. }
            | Self::Annotation { directive, .. }
            | Self::Error { directive, .. } => Some(directive),
        }
    }
}

/// A token with its kind and byte span in the source (`end` exclusive).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    #[serde(flatten)]
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub nesting: i8,
}

impl Token {
    pub(crate) const fn new(kind: TokenKind, start: usize, end: usize) -> Self {
        let nesting = kind.nesting();
        Self {
            kind,
            start,
            end,
            nesting,
        }
    }

    /// The slice of `source` this token spans.
    #[must_use]
    pub fn span<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}
