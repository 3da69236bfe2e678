//! Diagnostics - path-addressed issues shared by validation and resolution.
//!
//! Paths use dot-separated field access and bracketed array indices, rooted at
//! the template name: `design.scenes[0].background[1]`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single problem found in a template or while resolving its bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Location inside a JSON document, rendered in diagnostic path notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuePath(String);

impl IssuePath {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Extend with an object field (`.key`).
    pub fn field(&self, key: &str) -> Self {
        Self(format!("{}.{}", self.0, key))
    }

    /// Extend with an array index (`[i]`).
    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn issue(&self, message: impl Into<String>) -> ValidationIssue {
        ValidationIssue::new(self.0.clone(), message)
    }
}

impl fmt::Display for IssuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-empty, ordered list of issues returned when a stage fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<ValidationIssue>);

impl Diagnostics {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self(issues)
    }

    /// `Ok(())` when nothing was collected, otherwise the collected issues.
    pub fn check(issues: Vec<ValidationIssue>) -> Result<(), Self> {
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Self(issues))
        }
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationIssue> {
        self.0.iter()
    }

    /// True if any message contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.0.iter().any(|issue| issue.message.contains(needle))
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, issue) in self.0.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{}. {}", index + 1, issue)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

impl IntoIterator for Diagnostics {
    type Item = ValidationIssue;
    type IntoIter = std::vec::IntoIter<ValidationIssue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a ValidationIssue;
    type IntoIter = std::slice::Iter<'a, ValidationIssue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
