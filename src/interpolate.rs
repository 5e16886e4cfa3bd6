//! `{{ $path }}` substitution against variable bindings.
//!
//! A placeholder is `{{`, optional whitespace, `$`, a path, optional
//! whitespace, `}}`. The path starts with an identifier and continues with
//! `.identifier` or `[index]` segments. A backslash right before `{{`
//! keeps that occurrence literal.

use std::borrow::Cow;

use crate::value::{Bindings, PathSegment, Value};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Result of interpolating one string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Interpolation {
    pub result: String,
    /// Paths that could not be resolved, in scan order, duplicates kept.
    pub unresolved: Vec<String>,
}

/// Substitute every `{{ $path }}` in `text` that resolves in `bindings`.
///
/// Unresolved placeholders are left verbatim and their paths recorded.
/// Placeholders without `$` are never touched.
#[must_use]
pub fn interpolate_string(text: &str, bindings: Option<&Bindings>) -> Interpolation {
    let Some(bindings) = bindings.filter(|b| !b.is_empty()) else {
        return Interpolation {
            result: text.to_string(),
            unresolved: Vec::new(),
        };
    };

    let mut result = String::with_capacity(text.len());
    let mut unresolved = Vec::new();
    let mut copied = 0;
    let mut pos = 0;

    while let Some(found) = text[pos..].find(OPEN) {
        let open = pos + found;

        if text[..open].ends_with('\\') {
            pos = open + OPEN.len();
            continue;
        }

        let Some(placeholder) = Placeholder::scan(text, open) else {
            pos = open + 1;
            continue;
        };

        result.push_str(&text[copied..open]);
        match lookup(bindings, &placeholder.segments) {
            Some(value) => result.push_str(&value.to_string()),
            None => {
                result.push_str(&text[open..placeholder.end]);
                unresolved.push(placeholder.path.to_string());
            }
        }
        copied = placeholder.end;
        pos = placeholder.end;
    }

    result.push_str(&text[copied..]);
    Interpolation { result, unresolved }
}

/// Interpolate every string inside `value`.
///
/// Arrays and maps are walked recursively; everything else is returned
/// as is. Untouched branches are borrowed, not copied.
#[must_use]
pub fn interpolate_value<'a>(value: &'a Value, bindings: Option<&Bindings>) -> Cow<'a, Value> {
    let mut unresolved = Vec::new();
    interpolate_value_into(value, bindings, &mut unresolved)
}

/// Like [`interpolate_value`], appending unresolved paths to `unresolved`.
pub fn interpolate_value_into<'a>(
    value: &'a Value,
    bindings: Option<&Bindings>,
    unresolved: &mut Vec<String>,
) -> Cow<'a, Value> {
    match value {
        Value::String(s) => {
            let interpolation = interpolate_string(s, bindings);
            unresolved.extend(interpolation.unresolved);
            if interpolation.result == *s {
                Cow::Borrowed(value)
            } else {
                Cow::Owned(Value::String(interpolation.result))
            }
        }
        Value::Array(items) => {
            let mapped: Vec<_> = items
                .iter()
                .map(|item| interpolate_value_into(item, bindings, unresolved))
                .collect();
            if mapped.iter().all(|v| matches!(v, Cow::Borrowed(_))) {
                Cow::Borrowed(value)
            } else {
                Cow::Owned(Value::Array(
                    mapped.into_iter().map(Cow::into_owned).collect(),
                ))
            }
        }
        Value::Map(entries) => {
            let mapped: Vec<_> = entries
                .iter()
                .map(|(key, item)| (key, interpolate_value_into(item, bindings, unresolved)))
                .collect();
            if mapped.iter().all(|(_, v)| matches!(v, Cow::Borrowed(_))) {
                Cow::Borrowed(value)
            } else {
                Cow::Owned(Value::Map(
                    mapped
                        .into_iter()
                        .map(|(key, v)| (key.clone(), v.into_owned()))
                        .collect(),
                ))
            }
        }
        _ => Cow::Borrowed(value),
    }
}

struct Placeholder<'a> {
    /// Path text as written, without `$`.
    path: &'a str,
    segments: Vec<PathSegment>,
    /// Offset just past the closing `}}`.
    end: usize,
}

impl<'a> Placeholder<'a> {
    /// Match a placeholder starting at the `{{` at `open`.
    fn scan(text: &'a str, open: usize) -> Option<Self> {
        let rest = text[open + OPEN.len()..].trim_start();
        let source = rest.strip_prefix('$')?;
        let (segments, len) = parse_path(source)?;
        let tail = source[len..].trim_start().strip_prefix(CLOSE)?;
        Some(Self {
            path: &source[..len],
            segments,
            end: text.len() - tail.len(),
        })
    }
}

/// Parse the longest path prefix of `source`. Returns the segments and
/// the byte length consumed.
fn parse_path(source: &str) -> Option<(Vec<PathSegment>, usize)> {
    let first = identifier_len(source)?;
    let mut segments = vec![PathSegment::Key(source[..first].to_string())];
    let mut pos = first;

    loop {
        let rest = &source[pos..];
        if let Some(after) = rest.strip_prefix('.') {
            let Some(len) = identifier_len(after) else {
                break;
            };
            segments.push(PathSegment::Key(after[..len].to_string()));
            pos += 1 + len;
        } else if let Some(after) = rest.strip_prefix('[') {
            let digits = after.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 || after.as_bytes().get(digits) != Some(&b']') {
                break;
            }
            // An index too large for usize can never be in bounds.
            let index = after[..digits].parse().unwrap_or(usize::MAX);
            segments.push(PathSegment::Index(index));
            pos += digits + 2;
        } else {
            break;
        }
    }

    Some((segments, pos))
}

/// Length of the identifier at the start of `s`: a letter or `_`, then
/// letters, digits, `_` or `-`.
fn identifier_len(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    let (_, first) = chars.next()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    let len = chars
        .find(|&(_, c)| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .map_or(s.len(), |(i, _)| i);
    Some(len)
}

fn lookup<'v>(bindings: &'v Bindings, segments: &[PathSegment]) -> Option<&'v Value> {
    let (PathSegment::Key(first), rest) = segments.split_first()? else {
        return None;
    };
    let mut current = bindings.get(first)?;
    for segment in rest {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Map(entries)) => entries.get(key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}
