use crate::config::Config;
use crate::token::{Attribute, AttributeKind};
use crate::value::Value;

impl Config {
    /// Create an empty config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables
            .get_or_insert_with(Default::default)
            .insert(name.into(), value.into());
        self
    }

    /// Set an option passed through to the transformer.
    #[must_use]
    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }
}

impl Attribute {
    /// `name=value`
    #[must_use]
    pub fn plain(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Plain,
            value: value.into(),
        }
    }

    /// `#id`
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            name: "id".to_string(),
            kind: AttributeKind::Id,
            value: Value::String(id.into()),
        }
    }

    /// `.class`
    #[must_use]
    pub fn class(class: impl Into<String>) -> Self {
        Self {
            name: "class".to_string(),
            kind: AttributeKind::Class,
            value: Value::String(class.into()),
        }
    }
}
