//! Location-path expressions and their evaluation.
//!
//! The supported grammar is the subset the record mapping needs: absolute
//! element steps (`/root/kiddie/value`), an optional trailing attribute
//! selector (`/root/kiddie/char/@comment`), and the bare self path (`.`)
//! used when a collection element decodes its own match. Expressions are
//! otherwise opaque to callers; anything outside this subset is rejected
//! at construction.

use crate::element::Element;
use crate::error::Error;

/// A parsed location path.
#[derive(Clone, Debug, PartialEq)]
pub struct PathExpr {
    raw: String,
    segments: Vec<String>,
    attribute: Option<String>,
    is_self: bool,
}

impl PathExpr {
    /// Parse an expression. Empty expressions and empty steps fail.
    pub fn parse(expression: &str) -> Result<Self, Error> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidPath {
                expression: expression.to_string(),
                message: "empty path expression".to_string(),
            });
        }

        if trimmed == "." {
            return Ok(PathExpr {
                raw: trimmed.to_string(),
                segments: Vec::new(),
                attribute: None,
                is_self: true,
            });
        }

        let mut segments = Vec::new();
        let mut attribute = None;
        let steps: Vec<&str> = trimmed
            .trim_start_matches('/')
            .split('/')
            .collect();
        let last = steps.len() - 1;
        for (i, step) in steps.iter().enumerate() {
            if step.is_empty() {
                return Err(Error::InvalidPath {
                    expression: expression.to_string(),
                    message: "empty step".to_string(),
                });
            }
            if let Some(name) = step.strip_prefix('@') {
                if i != last || name.is_empty() {
                    return Err(Error::InvalidPath {
                        expression: expression.to_string(),
                        message: "attribute selector must be the final step".to_string(),
                    });
                }
                attribute = Some(name.to_string());
            } else {
                segments.push(step.to_string());
            }
        }

        Ok(PathExpr {
            raw: trimmed.to_string(),
            segments,
            attribute,
            is_self: false,
        })
    }

    /// The expression as written.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Element steps, outermost first. Empty for `.` and bare `@attr`.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The trailing attribute selector, if any.
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// True for the self path `.`.
    pub fn is_self(&self) -> bool {
        self.is_self
    }
}

impl std::fmt::Display for PathExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One match produced by path evaluation: an attribute's string value or
/// a handle to a matched element.
#[derive(Clone, Debug, PartialEq)]
pub enum PathMatch<'a> {
    Text(String),
    Node(&'a Element),
}

impl PathMatch<'_> {
    /// The textual content of the match: the attribute value, or the
    /// element's direct text.
    pub fn text(&self) -> String {
        match self {
            PathMatch::Text(t) => t.clone(),
            PathMatch::Node(e) => e.text(),
        }
    }
}

/// Evaluate `path` against a tree rooted at `root`.
///
/// Matching is by local name; a namespace configured on the owning schema
/// is passed through untouched rather than rewritten into the steps. The
/// first step of an absolute path names the root element itself, so a path
/// whose head does not match the root yields no matches.
pub fn evaluate<'a>(root: &'a Element, path: &PathExpr) -> Vec<PathMatch<'a>> {
    if path.is_self() {
        return vec![PathMatch::Node(root)];
    }

    let segments = path.segments();
    let mut current: Vec<&'a Element> = Vec::new();
    if segments.is_empty() {
        current.push(root);
    } else if root.local_name() == segments[0] {
        current.push(root);
    }
    for segment in segments.iter().skip(1) {
        current = current
            .iter()
            .flat_map(|e| e.elements_named(segment))
            .collect();
    }

    match path.attribute() {
        Some(attr) => current
            .iter()
            .filter_map(|e| e.attr(attr).map(|v| PathMatch::Text(v.to_string())))
            .collect(),
        None => current.into_iter().map(PathMatch::Node).collect(),
    }
}
