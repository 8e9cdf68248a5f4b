use std::fmt;

use regex::Regex;

use crate::error::LensError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// `->member`: dereference a pointer, then take the member
    Arrow(String),
    /// `.member`: member of an inline object
    Dot(String),
}

impl PathSegment {
    pub fn member(&self) -> &str {
        match self {
            PathSegment::Arrow(name) | PathSegment::Dot(name) => name,
        }
    }
}

/// A variable followed by member accesses, e.g. `myObserver->_source->_derivedValue`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePath {
    pub root: String,
    pub segments: Vec<PathSegment>,
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            match segment {
                PathSegment::Arrow(name) => write!(f, "->{}", name)?,
                PathSegment::Dot(name) => write!(f, ".{}", name)?,
            }
        }
        Ok(())
    }
}

pub struct PathParser {
    root: Regex,
    segment: Regex,
}

impl PathParser {
    pub fn new() -> Result<Self, LensError> {
        let root = Regex::new(r"^\s*([A-Za-z_$][A-Za-z0-9_$]*)")
            .map_err(|e| LensError::ExpressionError(e.to_string()))?;
        let segment = Regex::new(r"^\s*(->|\.)\s*([A-Za-z_$][A-Za-z0-9_$]*)")
            .map_err(|e| LensError::ExpressionError(e.to_string()))?;

        Ok(Self { root, segment })
    }

    pub fn parse(&self, expression: &str) -> Result<ValuePath, LensError> {
        let caps = self.root.captures(expression).ok_or_else(|| {
            LensError::ExpressionError(format!("'{}' does not start with a variable name", expression))
        })?;
        let root = caps[1].to_string();
        let mut rest = &expression[caps[0].len()..];

        let mut segments = Vec::new();
        while !rest.trim().is_empty() {
            let caps = self.segment.captures(rest).ok_or_else(|| {
                LensError::ExpressionError(format!(
                    "unexpected '{}' at offset {} in '{}'",
                    rest.trim(),
                    expression.len() - rest.len(),
                    expression
                ))
            })?;

            let member = caps[2].to_string();
            segments.push(match &caps[1] {
                "->" => PathSegment::Arrow(member),
                _ => PathSegment::Dot(member),
            });
            rest = &rest[caps[0].len()..];
        }

        Ok(ValuePath { root, segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_variable() {
        let parser = PathParser::new().unwrap();
        let path = parser.parse("object").unwrap();
        assert_eq!(path.root, "object");
        assert!(path.segments.is_empty());
    }

    #[test]
    fn test_member_chain() {
        let parser = PathParser::new().unwrap();
        let path = parser.parse(" myObserver -> _source->_derivedValue ").unwrap();
        assert_eq!(
            path.segments,
            vec![
                PathSegment::Arrow("_source".to_string()),
                PathSegment::Arrow("_derivedValue".to_string()),
            ]
        );
        assert_eq!(path.to_string(), "myObserver->_source->_derivedValue");

        let path = parser.parse("frame.origin").unwrap();
        assert_eq!(path.segments[0], PathSegment::Dot("origin".to_string()));
    }

    #[test]
    fn test_rejects_other_expressions() {
        let parser = PathParser::new().unwrap();
        assert!(matches!(parser.parse("1 + 2"), Err(LensError::ExpressionError(_))));
        assert!(parser.parse("object->").is_err());
        assert!(parser.parse("[object doSomething]").is_err());
        assert!(parser.parse("object + 1").is_err());
    }
}
