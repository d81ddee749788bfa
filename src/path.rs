//! Path queries over JSON documents.
//!
//! Conditions, variable bindings, and template mutation all address nodes
//! inside a JSON tree with the same small path language:
//!
//! ```text
//! Expression      | Meaning
//! ----------------|----------------------------------
//! $               | the document root
//! $.user.id       | nested object member
//! $.items[0]      | array element by index
//! $.items[*]      | every array element
//! $.context.*     | every member of an object
//! ```
//!
//! Two operations are exposed: [`PathExpr::query`] reads matched nodes, and
//! [`PathExpr::locate`] returns a JSON Pointer for every match so callers can
//! assign into a mutable document. Template rendering relies on `locate`
//! rather than query-library side effects, which makes the multi-match
//! assignment policy explicit: every matched node receives the value.

use serde_json::Value;
use thiserror::Error;

/// Errors produced while parsing a path expression.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("empty path expression")]
    Empty,

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unclosed '[' at offset {offset}")]
    UnclosedBracket { offset: usize },

    #[error("invalid array index '{index}'")]
    BadIndex { index: String },
}

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Object member by name.
    Name(String),
    /// Array element by index.
    Index(usize),
    /// Every member of an object or every element of an array.
    Wildcard,
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    segments: Vec<Segment>,
}

impl PathExpr {
    /// Parse a path expression.
    ///
    /// A leading `$` is optional: `user.id` is treated as `$.user.id`.
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(PathError::Empty);
        }

        let rest = expr.strip_prefix('$').unwrap_or(expr);
        let mut segments = Vec::new();
        let chars: Vec<char> = rest.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    if i >= chars.len() {
                        return Err(PathError::UnexpectedChar { ch: '.', offset: i - 1 });
                    }
                    if chars[i] == '*' {
                        segments.push(Segment::Wildcard);
                        i += 1;
                        continue;
                    }
                    let start = i;
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                        i += 1;
                    }
                    if i == start {
                        return Err(PathError::UnexpectedChar { ch: chars[i], offset: i });
                    }
                    segments.push(Segment::Name(chars[start..i].iter().collect()));
                }
                '[' => {
                    let open = i;
                    i += 1;
                    let start = i;
                    while i < chars.len() && chars[i] != ']' {
                        i += 1;
                    }
                    if i >= chars.len() {
                        return Err(PathError::UnclosedBracket { offset: open });
                    }
                    let inner: String = chars[start..i].iter().collect();
                    i += 1; // consume ']'
                    if inner == "*" {
                        segments.push(Segment::Wildcard);
                    } else {
                        let index = inner
                            .parse::<usize>()
                            .map_err(|_| PathError::BadIndex { index: inner })?;
                        segments.push(Segment::Index(index));
                    }
                }
                ch => {
                    // Bare name without a leading dot, e.g. "event" or "user.id".
                    if !segments.is_empty() {
                        return Err(PathError::UnexpectedChar { ch, offset: i });
                    }
                    let start = i;
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                        i += 1;
                    }
                    segments.push(Segment::Name(chars[start..i].iter().collect()));
                }
            }
        }

        Ok(Self { segments })
    }

    /// Whether this expression can match more than one node.
    pub fn is_multi(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Wildcard))
    }

    /// Return every node matched by this expression.
    pub fn query<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for node in current {
                match segment {
                    Segment::Name(name) => {
                        if let Some(v) = node.get(name) {
                            next.push(v);
                        }
                    }
                    Segment::Index(idx) => {
                        if let Some(v) = node.get(idx) {
                            next.push(v);
                        }
                    }
                    Segment::Wildcard => match node {
                        Value::Object(map) => next.extend(map.values()),
                        Value::Array(items) => next.extend(items.iter()),
                        _ => {}
                    },
                }
            }
            current = next;
        }
        current
    }

    /// Return a JSON Pointer string for every node matched by this expression.
    ///
    /// The root expression `$` yields a single empty pointer, which
    /// `Value::pointer_mut` resolves to the whole document.
    pub fn locate(&self, root: &Value) -> Vec<String> {
        let mut current = vec![(String::new(), root)];
        for segment in &self.segments {
            let mut next = Vec::new();
            for (pointer, node) in current {
                match segment {
                    Segment::Name(name) => {
                        if let Some(v) = node.get(name) {
                            next.push((format!("{pointer}/{}", escape_pointer(name)), v));
                        }
                    }
                    Segment::Index(idx) => {
                        if let Some(v) = node.get(idx) {
                            next.push((format!("{pointer}/{idx}"), v));
                        }
                    }
                    Segment::Wildcard => match node {
                        Value::Object(map) => {
                            for (k, v) in map {
                                next.push((format!("{pointer}/{}", escape_pointer(k)), v));
                            }
                        }
                        Value::Array(items) => {
                            for (idx, v) in items.iter().enumerate() {
                                next.push((format!("{pointer}/{idx}"), v));
                            }
                        }
                        _ => {}
                    },
                }
            }
            current = next;
        }
        current.into_iter().map(|(pointer, _)| pointer).collect()
    }
}

/// Escape a member name per RFC 6901.
fn escape_pointer(name: &str) -> String {
    name.replace('~', "~0").replace('/', "~1")
}

/// Walk a bare dot path (`"user.id"`, no `$` syntax) into a document.
///
/// Returns `None` as soon as any segment is missing, mirroring how the
/// `contextField` variable degrades instead of erroring.
pub fn dot_get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = root;
    for key in path.split('.') {
        current = current.get(key)?;
    }
    Some(current)
}
