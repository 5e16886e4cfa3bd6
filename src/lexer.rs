use tracing::{debug, trace};

use crate::grammar::{
    DefaultGrammar, GrammarContext, GrammarError, SyntaxError, TagDescriptor, TagGrammar,
};
use crate::token::{
    DirectiveError, DirectiveInfo, Location, Position, SourceLocation, Token, TokenKind,
};

/// Opening directive delimiter.
pub const OPEN: &str = "{%";
/// Closing directive delimiter.
pub const CLOSE: &str = "%}";

/// Fatal tokenizer failure: the tag grammar failed with something
/// other than a syntax error.
#[derive(Debug, thiserror::Error)]
#[error("tag grammar failed at line {line}, offset {offset}: {source}")]
pub struct LexError {
    pub line: usize,
    pub offset: usize,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    InString,
    Escape,
}

/// Find the offset of the `%}` that closes a directive, scanning from
/// `start`. A `%}` inside a double-quoted string does not count.
///
/// Returns `None` when the input ends first, including inside an
/// unterminated string.
#[must_use]
pub fn find_tag_end(content: &str, start: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut state = State::Normal;

    for (pos, &byte) in bytes.iter().enumerate().skip(start) {
        state = match state {
            State::Normal => {
                if byte == b'"' {
                    State::InString
                } else if bytes[pos..].starts_with(CLOSE.as_bytes()) {
                    return Some(pos);
                } else {
                    State::Normal
                }
            }
            State::InString => match byte {
                b'"' => State::Normal,
                b'\\' => State::Escape,
                _ => State::InString,
            },
            State::Escape => State::InString,
        };
    }

    None
}

/// Tokenize a document with the built-in tag grammar.
///
/// # Errors
///
/// The built-in grammar only reports syntax errors, which become
/// [`TokenKind::Error`] tokens, so this does not fail in practice.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    tokenize_with(input, 0, &DefaultGrammar)
}

/// Tokenize a document, delegating directive bodies to `grammar`.
///
/// `first_line` offsets line numbers for documents embedded in a larger
/// source. The returned tokens cover `input` without gaps.
///
/// # Errors
///
/// Returns `LexError` when `grammar` fails with [`GrammarError::Other`].
#[tracing::instrument(level = "debug", skip(input, grammar), fields(len = input.len()))]
pub fn tokenize_with<G: TagGrammar + ?Sized>(
    input: &str,
    first_line: usize,
    grammar: &G,
) -> Result<Vec<Token>, LexError> {
    Lexer::new(input, first_line, grammar).tokenize()
}

struct Lexer<'a, G: ?Sized> {
    input: &'a str,
    grammar: &'a G,
    context: GrammarContext,
    line: usize,
    /// Start of the pending text run.
    start: usize,
    /// Start of the current source line.
    line_begin: usize,
    /// First newline at or after some earlier offset, or the input length.
    next_newline: Option<usize>,
    tokens: Vec<Token>,
}

impl<'a, G: TagGrammar + ?Sized> Lexer<'a, G> {
    fn new(input: &'a str, first_line: usize, grammar: &'a G) -> Self {
        Self {
            input,
            grammar,
            context: GrammarContext::default(),
            line: first_line + 1,
            start: 0,
            line_begin: 0,
            next_newline: None,
            tokens: Vec::new(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let input = self.input;
        let bytes = input.as_bytes();
        let mut pos = 0;

        while pos < bytes.len() {
            if bytes[pos] == b'\n' {
                self.line += 1;
                pos += 1;
                self.line_begin = pos;
                continue;
            }

            if !bytes[pos..].starts_with(OPEN.as_bytes()) {
                pos += 1;
                continue;
            }

            let Some(end) = find_tag_end(input, pos + OPEN.len()) else {
                // Leave the delimiter in the text run and keep scanning
                // right after it.
                debug!(offset = pos, line = self.line, "unterminated directive");
                pos += OPEN.len();
                continue;
            };

            pos = self.directive(pos, end)?;
        }

        self.tokens.push(Token::new(
            TokenKind::Text {
                content: input[self.start..].to_string(),
            },
            self.start,
            input.len(),
        ));

        Ok(self.tokens)
    }

    /// Emit the text run before the directive at `pos..end + CLOSE.len()`
    /// and the directive itself. Returns the offset after the directive.
    fn directive(&mut self, pos: usize, end: usize) -> Result<usize, LexError> {
        let input = self.input;
        let after = end + CLOSE.len();
        let text = &input[pos..after];
        let inner = &input[pos + OPEN.len()..end];
        let body = inner.trim();
        let body_offset = pos + OPEN.len() + (inner.len() - inner.trim_start().len());

        let line_begin = self.line_begin;
        let line_end = self.line_end(after);
        let block = input[line_begin..pos].chars().all(char::is_whitespace)
            && input[after..line_end].chars().all(char::is_whitespace);

        // Block directives swallow their own line so they don't leave a
        // blank line behind in the surrounding text.
        let text_end = if block {
            line_begin.saturating_sub(1).max(self.start)
        } else {
            pos
        };

        let column = pos - line_begin;
        let directive = DirectiveInfo {
            info: text.to_string(),
            lines: [self.line, self.line + 1],
            position: Position {
                start: column,
                end: column + text.len(),
            },
            inline: !block,
        };

        let kind = match self.grammar.parse(body, &self.context) {
            Ok(descriptor) => {
                trace!(line = self.line, nesting = descriptor.nesting(), "directive");
                from_descriptor(descriptor, directive)
            }
            Err(GrammarError::Syntax(err)) => {
                debug!(line = self.line, error = %err, "invalid directive");
                let error = self.locate(&err, pos, body_offset, end);
                TokenKind::Error { directive, error }
            }
            Err(GrammarError::Other(source)) => {
                return Err(LexError {
                    line: self.line,
                    offset: pos,
                    source,
                });
            }
        };

        self.tokens.push(Token::new(
            TokenKind::Text {
                content: input[self.start..text_end].to_string(),
            },
            self.start,
            pos,
        ));
        self.tokens.push(Token::new(kind, pos, after));
        self.start = after;
        if let Some(i) = text.rfind('\n') {
            self.line_begin = pos + i + 1;
        }

        Ok(after)
    }

    /// End of the line containing `from`, reusing the last lookup while
    /// the cursor has not passed it.
    fn line_end(&mut self, from: usize) -> usize {
        match self.next_newline {
            Some(end) if end >= from => end,
            _ => {
                let end = self.input[from..]
                    .find('\n')
                    .map_or(self.input.len(), |i| from + i);
                self.next_newline = Some(end);
                end
            }
        }
    }

    /// Rebase a body-relative syntax error onto document coordinates.
    fn locate(
        &self,
        err: &SyntaxError,
        pos: usize,
        body_offset: usize,
        end: usize,
    ) -> DirectiveError {
        let at = |offset: usize| {
            let abs = (body_offset + offset).min(end);
            let inside = &self.input.as_bytes()[pos..abs];
            let newlines = inside.iter().filter(|&&b| b == b'\n').count();
            let line_begin = inside
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(self.line_begin, |i| pos + i + 1);
            SourceLocation {
                line: self.line + newlines,
                character: abs - line_begin,
            }
        };

        DirectiveError {
            message: err.kind.to_string(),
            location: Location {
                start: at(err.start),
                end: at(err.end),
            },
        }
    }
}

fn from_descriptor(descriptor: TagDescriptor, directive: DirectiveInfo) -> TokenKind {
    match descriptor {
        TagDescriptor::Open { name, attributes } => TokenKind::TagOpen {
            directive,
            tag: name,
            attributes,
        },
        TagDescriptor::Close { name } => TokenKind::TagClose {
            directive,
            tag: name,
        },
        TagDescriptor::SelfClosing { name, attributes } => TokenKind::Tag {
            directive,
            tag: name,
            attributes,
        },
        TagDescriptor::Annotation { attributes } => TokenKind::Annotation {
            directive,
            attributes,
        },
    }
}
