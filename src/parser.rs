use tracing::debug;

use crate::ast::{Ast, Attributes, Level, NodeId, NodeType, Tree, TreeError, ValidationError};
use crate::token::{
    Attribute, AttributeKind, DirectiveInfo, Location, SourceLocation, Token, TokenKind,
};
use crate::value::Value;

/// Build a document tree from a token stream.
///
/// Open/close pairs become nested `Tag` nodes, text runs become `Text`
/// nodes, and annotations attach to the node they follow. Unbalanced
/// tags are reported as validation errors, not failures.
///
/// # Errors
///
/// Returns `TreeError` only on an internal structural violation.
#[tracing::instrument(level = "debug", skip_all, fields(tokens = tokens.len()))]
pub fn parse(tokens: &[Token]) -> Result<Ast, TreeError> {
    Parser::new()?.parse(tokens)
}

struct Parser {
    tree: Tree,
    root: NodeId,
    /// Open tags, innermost last. Never includes the root.
    stack: Vec<NodeId>,
}

impl Parser {
    fn new() -> Result<Self, TreeError> {
        let mut tree = Tree::new();
        let root = tree.construct(NodeType::Document, Attributes::new(), Vec::new(), None)?;
        Ok(Self {
            tree,
            root,
            stack: Vec::new(),
        })
    }

    fn parse(mut self, tokens: &[Token]) -> Result<Ast, TreeError> {
        for token in tokens {
            match &token.kind {
                TokenKind::Text { content } => {
                    if !content.is_empty() {
                        self.text(content)?;
                    }
                }
                TokenKind::TagOpen {
                    directive,
                    tag,
                    attributes,
                } => {
                    let node = self.tag(directive, tag, attributes)?;
                    self.stack.push(node);
                }
                TokenKind::Tag {
                    directive,
                    tag,
                    attributes,
                } => {
                    self.tag(directive, tag, attributes)?;
                }
                TokenKind::TagClose { directive, tag } => self.close(directive, tag)?,
                TokenKind::Annotation { attributes, .. } => self.annotate(attributes),
                TokenKind::Error { directive, error } => {
                    self.error_node(
                        directive,
                        ValidationError {
                            id: "syntax-error".to_string(),
                            level: Level::Critical,
                            message: error.message.clone(),
                            location: Some(error.location),
                        },
                    )?;
                }
            }
        }

        for id in std::mem::take(&mut self.stack) {
            let Some(node) = self.tree.node_mut(id) else {
                continue;
            };
            let name = node.tag.clone().unwrap_or_default();
            debug!(tag = %name, "unclosed tag");
            node.errors.push(ValidationError {
                id: "missing-closing".to_string(),
                level: Level::Critical,
                message: format!("Node '{name}' is missing closing"),
                location: node.location,
            });
        }

        Ast::new(self.tree, self.root)
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(self.root)
    }

    fn text(&mut self, content: &str) -> Result<(), TreeError> {
        let attributes = Attributes::from([("content".to_string(), Value::from(content))]);
        let id = self
            .tree
            .construct(NodeType::Text, attributes, Vec::new(), None)?;
        if let Some(node) = self.tree.node_mut(id) {
            node.inline = true;
        }
        self.tree.push(self.current(), id)
    }

    fn tag(
        &mut self,
        directive: &DirectiveInfo,
        tag: &str,
        attributes: &[Attribute],
    ) -> Result<NodeId, TreeError> {
        let id = self.tree.construct(
            NodeType::Tag,
            attribute_map(attributes),
            Vec::new(),
            Some(tag.to_string()),
        )?;
        if let Some(node) = self.tree.node_mut(id) {
            node.lines = directive.lines.to_vec();
            node.inline = directive.inline;
            node.location = Some(location(directive));
        }
        self.tree.push(self.current(), id)?;
        Ok(id)
    }

    fn close(&mut self, directive: &DirectiveInfo, tag: &str) -> Result<(), TreeError> {
        let open = self.stack.last().copied();
        let matches = open
            .and_then(|id| self.tree.node(id))
            .is_some_and(|node| node.tag.as_deref() == Some(tag));

        match open {
            Some(id) if matches => {
                self.stack.pop();
                if let Some(node) = self.tree.node_mut(id) {
                    node.lines.extend(directive.lines);
                    if let Some(location) = node.location.as_mut() {
                        location.end = location_end(directive);
                    }
                }
                Ok(())
            }
            _ => {
                debug!(tag, "unexpected closing tag");
                self.error_node(
                    directive,
                    ValidationError {
                        id: "unexpected-closing".to_string(),
                        level: Level::Critical,
                        message: format!("Unexpected closing tag '{tag}'"),
                        location: Some(location(directive)),
                    },
                )
            }
        }
    }

    /// Attach annotation attributes to the last node in the current
    /// container, or to the container itself when it is empty.
    fn annotate(&mut self, attributes: &[Attribute]) {
        let container = self.current();
        let target = self
            .tree
            .node(container)
            .and_then(|node| node.children().last().copied())
            .unwrap_or(container);
        if let Some(node) = self.tree.node_mut(target) {
            node.annotations.extend_from_slice(attributes);
        }
    }

    fn error_node(
        &mut self,
        directive: &DirectiveInfo,
        error: ValidationError,
    ) -> Result<(), TreeError> {
        let id = self
            .tree
            .construct(NodeType::Error, Attributes::new(), Vec::new(), None)?;
        if let Some(node) = self.tree.node_mut(id) {
            node.lines = directive.lines.to_vec();
            node.inline = directive.inline;
            node.location = Some(location(directive));
            node.errors.push(error);
        }
        self.tree.push(self.current(), id)
    }
}

/// Fold parsed attributes into a node's attribute map. `#id` sets `id`;
/// every `.class` adds a `name: true` entry to the `class` map.
fn attribute_map(attributes: &[Attribute]) -> Attributes {
    let mut map = Attributes::new();
    for attribute in attributes {
        match attribute.kind {
            AttributeKind::Plain | AttributeKind::Id => {
                map.insert(attribute.name.clone(), attribute.value.clone());
            }
            AttributeKind::Class => {
                let entry = map
                    .entry("class".to_string())
                    .or_insert_with(|| Value::Map(Attributes::new()));
                if let (Value::Map(classes), Value::String(name)) = (entry, &attribute.value) {
                    classes.insert(name.clone(), Value::Bool(true));
                }
            }
        }
    }
    map
}

const fn location(directive: &DirectiveInfo) -> Location {
    Location {
        start: SourceLocation {
            line: directive.lines[0],
            character: directive.position.start,
        },
        end: location_end(directive),
    }
}

const fn location_end(directive: &DirectiveInfo) -> SourceLocation {
    SourceLocation {
        line: directive.lines[1],
        character: directive.position.end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_str(input: &str) -> Ast {
        let tokens = tokenize(input).expect("tokenize");
        parse(&tokens).expect("parse")
    }

    #[test]
    fn nested_tags() {
        let ast = parse_str("{% outer %}\n{% inner %}x{% /inner %}\n{% /outer %}\n");
        let outer = ast.root().children().next().expect("outer");
        assert_eq!(outer.tag.as_deref(), Some("outer"));
        let inner: Vec<_> = outer
            .children()
            .filter(|n| n.node_type == NodeType::Tag)
            .collect();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].tag.as_deref(), Some("inner"));
        assert!(outer.errors.is_empty());
    }

    #[test]
    fn class_shorthands_merge() {
        let ast = parse_str("{% box .a .b #main %}{% /box %}");
        let node = ast.root().children().next().expect("box");
        let classes = node.attributes["class"].as_map().expect("class map");
        assert_eq!(classes.len(), 2);
        assert_eq!(node.attributes["id"], Value::from("main"));
    }

    #[test]
    fn unclosed_tag_gets_error() {
        let ast = parse_str("{% note %}\nnever closed\n");
        let node = ast.root().children().next().expect("note");
        assert_eq!(node.errors.len(), 1);
        assert_eq!(node.errors[0].id, "missing-closing");
    }

    #[test]
    fn stray_close_becomes_error_node() {
        let ast = parse_str("text {% /nope %}");
        let types: Vec<_> = ast
            .root()
            .children()
            .map(|n| n.node_type.clone())
            .collect();
        assert_eq!(types, [NodeType::Text, NodeType::Error]);
    }

    #[test]
    fn annotation_attaches_to_previous_node() {
        let ast = parse_str("Heading {% #title %}");
        let text = ast.root().children().next().expect("text");
        assert_eq!(text.annotations.len(), 1);
        assert_eq!(text.annotations[0].kind, AttributeKind::Id);
    }
}
