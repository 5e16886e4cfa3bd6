use std::fmt;

use indexmap::IndexMap;

use crate::token::Attribute;
use crate::value::{Function, PathSegment, Value, Variable};

/// Parsed shape of one directive body.
#[derive(Debug, Clone, PartialEq)]
pub enum TagDescriptor {
    /// `name attrs...`
    Open {
        name: String,
        attributes: Vec<Attribute>,
    },
    /// `/name`
    Close { name: String },
    /// `name attrs... /`
    SelfClosing {
        name: String,
        attributes: Vec<Attribute>,
    },
    /// Attributes with no tag name.
    Annotation { attributes: Vec<Attribute> },
}

impl TagDescriptor {
    #[must_use]
    pub const fn nesting(&self) -> i8 {
        match self {
            Self::Open { .. } => 1,
            Self::Close { .. } => -1,
            Self::SelfClosing { .. } | Self::Annotation { .. } => 0,
        }
    }
}

/// Classifies a directive syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// Nothing between the delimiters.
    EmptyTag,
    /// `/` not followed by a tag name.
    ExpectedTagName,
    /// An attribute value was expected.
    ExpectedValue { found: Option<char> },
    /// A specific character was expected.
    Expected { expected: char, found: Option<char> },
    /// Identifier after `#`, `.`, `$`, or as an object key.
    ExpectedIdentifier { found: Option<char> },
    /// Unterminated double-quoted string.
    UnterminatedString,
    /// Bare identifier that is not a literal or function call.
    UnknownIdentifier(String),
    /// Input left over after a complete tag.
    TrailingInput(char),
    /// Malformed numeric literal.
    InvalidNumber(String),
}

fn describe(ch: Option<char>) -> String {
    ch.map_or_else(|| "end of tag".to_string(), |c| format!("'{c}'"))
}

impl fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTag => write!(f, "empty tag"),
            Self::ExpectedTagName => write!(f, "expected tag name"),
            Self::ExpectedValue { found: ch } => {
                write!(f, "expected attribute value, got {}", describe(*ch))
            }
            Self::Expected {
                expected,
                found: ch,
            } => write!(f, "expected '{expected}', got {}", describe(*ch)),
            Self::ExpectedIdentifier { found: ch } => {
                write!(f, "expected identifier, got {}", describe(*ch))
            }
            Self::UnterminatedString => write!(f, "unterminated quoted string"),
            Self::UnknownIdentifier(name) => write!(f, "unexpected identifier: {name}"),
            Self::TrailingInput(ch) => write!(f, "unexpected character: {ch}"),
            Self::InvalidNumber(text) => write!(f, "invalid number: {text}"),
        }
    }
}

/// Error produced while parsing a directive body. Offsets are byte
/// offsets into the trimmed body handed to the grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at offset {start}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub start: usize,
    pub end: usize,
}

/// Failure of a [`TagGrammar`].
///
/// Only `Syntax` is recovered by the tokenizer; anything else aborts it.
#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Value constructors available to attribute expressions.
#[derive(Debug, Clone, Copy)]
pub struct GrammarContext {
    pub variable: fn(Vec<PathSegment>) -> Value,
    pub function: fn(String, IndexMap<String, Value>) -> Value,
}

impl Default for GrammarContext {
    fn default() -> Self {
        Self {
            variable: |path| Value::Variable(Variable { path }),
            function: |name, parameters| Value::Function(Function { name, parameters }),
        }
    }
}

/// Parses the trimmed text between `{%` and `%}`.
pub trait TagGrammar {
    fn parse(&self, input: &str, context: &GrammarContext) -> Result<TagDescriptor, GrammarError>;
}

/// Built-in directive grammar.
///
/// ```text
/// {% name primary? attr* /? %}   open or self-closing tag
/// {% /name %}                    close tag
/// {% attr* %}                    annotation
/// attr  := key=value | #id | .class
/// value := "string" | number | true | false | null
///        | [value, ...] | {key: value, ...} | $path | name(args)
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultGrammar;

impl TagGrammar for DefaultGrammar {
    fn parse(&self, input: &str, context: &GrammarContext) -> Result<TagDescriptor, GrammarError> {
        Ok(Parser::new(input, context).parse()?)
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    context: &'a GrammarContext,
}

impl<'a> Parser<'a> {
    const fn new(input: &'a str, context: &'a GrammarContext) -> Self {
        Self {
            input,
            pos: 0,
            context,
        }
    }

    fn parse(mut self) -> Result<TagDescriptor, SyntaxError> {
        self.skip_whitespace();
        let Some(first) = self.peek() else {
            return Err(self.error(SyntaxErrorKind::EmptyTag));
        };

        if first == '/' {
            self.advance();
            self.skip_whitespace();
            let name = self
                .identifier()
                .ok_or_else(|| self.error(SyntaxErrorKind::ExpectedTagName))?;
            self.expect_end()?;
            return Ok(TagDescriptor::Close { name });
        }

        // A leading identifier followed by `=` is an attribute, so the
        // whole body is an annotation.
        if is_ident_start(first) && !self.at_attribute() {
            let name = self.identifier().unwrap_or_default();
            let mut attributes = Vec::new();
            self.skip_whitespace();
            if self.at_primary() {
                let value = self.value()?;
                attributes.push(Attribute::plain("primary", value));
            }
            attributes.extend(self.attributes()?);
            if self.peek() == Some('/') {
                self.advance();
                self.expect_end()?;
                return Ok(TagDescriptor::SelfClosing { name, attributes });
            }
            self.expect_end()?;
            return Ok(TagDescriptor::Open { name, attributes });
        }

        let attributes = self.attributes()?;
        self.expect_end()?;
        Ok(TagDescriptor::Annotation { attributes })
    }

    fn attributes(&mut self) -> Result<Vec<Attribute>, SyntaxError> {
        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None | Some('/') => break,
                Some('#') => {
                    self.advance();
                    attributes.push(Attribute::id(self.shorthand_name()?));
                }
                Some('.') => {
                    self.advance();
                    attributes.push(Attribute::class(self.shorthand_name()?));
                }
                Some(c) if is_ident_start(c) => {
                    let name = self.identifier().unwrap_or_default();
                    self.skip_whitespace();
                    self.expect('=')?;
                    self.skip_whitespace();
                    attributes.push(Attribute::plain(name, self.value()?));
                }
                Some(c) => return Err(self.error(SyntaxErrorKind::TrailingInput(c))),
            }
        }
        Ok(attributes)
    }

    fn value(&mut self) -> Result<Value, SyntaxError> {
        match self.peek() {
            Some('"') => self.string().map(Value::String),
            Some('[') => self.array(),
            Some('{') => self.object(),
            Some('$') => {
                self.advance();
                let path = self.variable_path()?;
                Ok((self.context.variable)(path))
            }
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if is_ident_start(c) => {
                let start = self.pos;
                let name = self.identifier().unwrap_or_default();
                match name.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    _ if self.peek() == Some('(') => self.function_call(name),
                    _ => Err(SyntaxError {
                        kind: SyntaxErrorKind::UnknownIdentifier(name),
                        start,
                        end: self.pos,
                    }),
                }
            }
            found => Err(self.error(SyntaxErrorKind::ExpectedValue { found })),
        }
    }

    fn string(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(SyntaxError {
                        kind: SyntaxErrorKind::UnterminatedString,
                        start,
                        end: self.pos,
                    });
                }
                Some('"') => {
                    self.advance();
                    return Ok(value);
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some(c) => value.push(c),
                        None => continue,
                    }
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    fn number(&mut self) -> Result<Value, SyntaxError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        self.eat_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            self.advance();
            self.eat_while(|c| c.is_ascii_digit());
        }
        let text = &self.input[start..self.pos];
        text.parse::<f64>().map(Value::Number).map_err(|_| SyntaxError {
            kind: SyntaxErrorKind::InvalidNumber(text.to_string()),
            start,
            end: self.pos,
        })
    }

    fn array(&mut self) -> Result<Value, SyntaxError> {
        self.advance(); // [
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(']') {
                self.advance();
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.advance(),
                Some(']') => {}
                found => {
                    return Err(self.error(SyntaxErrorKind::Expected {
                        expected: ']',
                        found,
                    }));
                }
            }
        }
    }

    fn object(&mut self) -> Result<Value, SyntaxError> {
        self.advance(); // {
        let mut entries = IndexMap::new();
        loop {
            self.skip_whitespace();
            let key = match self.peek() {
                Some('}') => {
                    self.advance();
                    return Ok(Value::Map(entries));
                }
                Some('"') => self.string()?,
                found => self
                    .identifier()
                    .ok_or_else(|| self.error(SyntaxErrorKind::ExpectedIdentifier { found }))?,
            };
            self.skip_whitespace();
            self.expect(':')?;
            self.skip_whitespace();
            let value = self.value()?;
            entries.insert(key, value);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.advance(),
                Some('}') => {}
                found => {
                    return Err(self.error(SyntaxErrorKind::Expected {
                        expected: '}',
                        found,
                    }));
                }
            }
        }
    }

    fn function_call(&mut self, name: String) -> Result<Value, SyntaxError> {
        self.advance(); // (
        let mut parameters = IndexMap::new();
        let mut positional = 0usize;
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                return Ok((self.context.function)(name, parameters));
            }
            if self.at_attribute() {
                let key = self.identifier().unwrap_or_default();
                self.skip_whitespace();
                self.expect('=')?;
                self.skip_whitespace();
                parameters.insert(key, self.value()?);
            } else {
                parameters.insert(positional.to_string(), self.value()?);
                positional += 1;
            }
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.advance(),
                Some(')') => {}
                found => {
                    return Err(self.error(SyntaxErrorKind::Expected {
                        expected: ')',
                        found,
                    }));
                }
            }
        }
    }

    fn variable_path(&mut self) -> Result<Vec<PathSegment>, SyntaxError> {
        let found = self.peek();
        let first = self
            .identifier()
            .ok_or_else(|| self.error(SyntaxErrorKind::ExpectedIdentifier { found }))?;
        let mut path = vec![PathSegment::Key(first)];
        loop {
            match self.peek() {
                Some('.') => {
                    self.advance();
                    let found = self.peek();
                    let key = self
                        .identifier()
                        .ok_or_else(|| self.error(SyntaxErrorKind::ExpectedIdentifier { found }))?;
                    path.push(PathSegment::Key(key));
                }
                Some('[') => {
                    self.advance();
                    self.skip_whitespace();
                    let segment = if self.peek() == Some('"') {
                        PathSegment::Key(self.string()?)
                    } else {
                        let start = self.pos;
                        self.eat_while(|c| c.is_ascii_digit());
                        let digits = &self.input[start..self.pos];
                        let index = digits.parse().map_err(|_| SyntaxError {
                            kind: SyntaxErrorKind::InvalidNumber(digits.to_string()),
                            start,
                            end: self.pos,
                        })?;
                        PathSegment::Index(index)
                    };
                    self.skip_whitespace();
                    self.expect(']')?;
                    path.push(segment);
                }
                _ => return Ok(path),
            }
        }
    }

    fn shorthand_name(&mut self) -> Result<String, SyntaxError> {
        let found = self.peek();
        self.identifier()
            .ok_or_else(|| self.error(SyntaxErrorKind::ExpectedIdentifier { found }))
    }

    /// `[A-Za-z_][A-Za-z0-9_-]*`
    fn identifier(&mut self) -> Option<String> {
        let start = self.pos;
        if !self.peek().is_some_and(is_ident_start) {
            return None;
        }
        self.eat_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        Some(self.input[start..self.pos].to_string())
    }

    /// Identifier followed by optional whitespace and `=`.
    fn at_attribute(&self) -> bool {
        let rest = &self.input[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        len > 0
            && rest.starts_with(is_ident_start)
            && rest[len..].trim_start().starts_with('=')
    }

    fn at_primary(&self) -> bool {
        match self.peek() {
            None | Some('/' | '#' | '.') => false,
            Some(c) if is_ident_start(c) => !self.at_attribute(),
            Some(_) => true,
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), SyntaxError> {
        let found = self.peek();
        if found == Some(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(SyntaxErrorKind::Expected { expected, found }))
        }
    }

    fn expect_end(&mut self) -> Result<(), SyntaxError> {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(()),
            Some(c) => Err(self.error(SyntaxErrorKind::TrailingInput(c))),
        }
    }

    fn error(&self, kind: SyntaxErrorKind) -> SyntaxError {
        let end = self
            .peek()
            .map_or(self.pos, |c| self.pos + c.len_utf8());
        SyntaxError {
            kind,
            start: self.pos,
            end,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        self.eat_while(char::is_whitespace);
    }
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::AttributeKind;

    fn parse(input: &str) -> Result<TagDescriptor, GrammarError> {
        DefaultGrammar.parse(input, &GrammarContext::default())
    }

    fn attrs(descriptor: TagDescriptor) -> Vec<Attribute> {
        match descriptor {
            TagDescriptor::Open { attributes, .. }
            | TagDescriptor::SelfClosing { attributes, .. }
            | TagDescriptor::Annotation { attributes } => attributes,
            TagDescriptor::Close { .. } => Vec::new(),
        }
    }

    #[test]
    fn open_tag_with_string_attribute() {
        let tag = parse(r#"foo blah="asdf""#).expect("should parse");
        assert_eq!(tag.nesting(), 1);
        assert_eq!(
            tag,
            TagDescriptor::Open {
                name: "foo".into(),
                attributes: vec![Attribute {
                    name: "blah".into(),
                    kind: AttributeKind::Plain,
                    value: Value::from("asdf"),
                }],
            }
        );
    }

    #[test]
    fn close_tag() {
        let tag = parse("/foo").expect("should parse");
        assert_eq!(tag, TagDescriptor::Close { name: "foo".into() });
        assert_eq!(tag.nesting(), -1);
    }

    #[test]
    fn self_closing_tag() {
        let tag = parse("partial file=\"header.md\" /").expect("should parse");
        assert!(matches!(tag, TagDescriptor::SelfClosing { ref name, .. } if name == "partial"));
        assert_eq!(tag.nesting(), 0);
    }

    #[test]
    fn annotation_with_shorthands() {
        let attributes = attrs(parse("#foo.bar baz=1").expect("should parse"));
        let kinds: Vec<_> = attributes.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            [AttributeKind::Id, AttributeKind::Class, AttributeKind::Plain]
        );
        assert_eq!(attributes[2].value, Value::from(1));
    }

    #[test]
    fn primary_variable() {
        let attributes = attrs(parse("if $flags.beta").expect("should parse"));
        assert_eq!(attributes[0].name, "primary");
        assert_eq!(
            attributes[0].value,
            Value::Variable(Variable {
                path: vec![
                    PathSegment::Key("flags".into()),
                    PathSegment::Key("beta".into())
                ],
            })
        );
    }

    #[test]
    fn object_and_array_values() {
        let attributes = attrs(
            parse(r#"test foo={testing: "this } is", bar: {baz: [1, 2]}}"#).expect("should parse"),
        );
        let foo = attributes[0].value.as_map().expect("object");
        assert_eq!(foo["testing"], Value::from("this } is"));
        assert_eq!(
            foo["bar"].as_map().expect("object")["baz"],
            Value::array([1, 2])
        );
    }

    #[test]
    fn function_call_parameters() {
        let attributes = attrs(parse(r#"if equals($a, "b", strict=true)"#).expect("should parse"));
        let Value::Function(func) = &attributes[0].value else {
            panic!("expected function, got {:?}", attributes[0].value);
        };
        assert_eq!(func.name, "equals");
        let keys: Vec<_> = func.parameters.keys().cloned().collect();
        assert_eq!(keys, ["0", "1", "strict"]);
    }

    #[test]
    fn escaped_quote_in_string() {
        let attributes = attrs(parse(r#"x y="a \"b\" c""#).expect("should parse"));
        assert_eq!(attributes[0].value, Value::from(r#"a "b" c"#));
    }

    #[test]
    fn syntax_error_offsets() {
        let Err(GrammarError::Syntax(err)) = parse("foo bar=") else {
            panic!("expected syntax error");
        };
        assert_eq!(err.kind, SyntaxErrorKind::ExpectedValue { found: None });
        assert_eq!(err.start, 8);
    }

    #[test]
    fn empty_body_is_an_error() {
        let Err(GrammarError::Syntax(err)) = parse("") else {
            panic!("expected syntax error");
        };
        assert_eq!(err.kind, SyntaxErrorKind::EmptyTag);
    }
}
