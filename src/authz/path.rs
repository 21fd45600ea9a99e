use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::authz::errors::AuthzError;

/// Key value that matches any concrete value in a rule pattern.
pub const WILDCARD: &str = "*";

/// One step of a path: a name plus optional key qualifiers.
/// Keys are held in a `BTreeMap` so they always iterate in key-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub name: String,
    pub keys: BTreeMap<String, String>,
}

impl PathSegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: BTreeMap::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name)?;
        for (key, value) in &self.keys {
            write!(f, "[{key}={value}]")?;
        }
        Ok(())
    }
}

/// Ordered sequence of segments; the empty path is the root `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Concatenate `self` (a request prefix) ahead of `path`.
    pub fn join(&self, path: &Path) -> Path {
        let mut segments = Vec::with_capacity(self.len() + path.len());
        segments.extend_from_slice(&self.segments);
        segments.extend_from_slice(&path.segments);
        Path { segments }
    }
}

/// Render segments as `/name[k1=v1][k2=v2]...`, or `/` for the root.
pub fn canonicalize(segments: &[PathSegment]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    segments.iter().map(|s| s.to_string()).collect()
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&canonicalize(&self.segments))
    }
}

impl FromStr for Path {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        let mut chars = s.chars().peekable();

        loop {
            // Skip separators; repeated or trailing slashes are tolerated.
            while chars.peek() == Some(&'/') {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }

            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '/' || c == '[' {
                    break;
                }
                if c == ']' || c == '=' {
                    return Err(AuthzError::invalid_path(
                        s,
                        format!("unexpected `{c}` in segment name"),
                    ));
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(AuthzError::invalid_path(s, "segment name is empty"));
            }

            let mut segment = PathSegment::new(name);
            while chars.peek() == Some(&'[') {
                chars.next();
                let (key, value) = parse_key(s, &mut chars)?;
                if segment.keys.contains_key(&key) {
                    return Err(AuthzError::invalid_path(
                        s,
                        format!("duplicate key `{key}` in segment `{}`", segment.name),
                    ));
                }
                segment.keys.insert(key, value);
            }

            match chars.peek() {
                None | Some('/') => segments.push(segment),
                Some(c) => {
                    return Err(AuthzError::invalid_path(
                        s,
                        format!("unexpected `{c}` after segment `{}`", segment.name),
                    ))
                }
            }
        }

        Ok(Path { segments })
    }
}

/// Parse `key=value]` (the opening bracket is already consumed). A `/` inside
/// the brackets is part of the value, e.g. `[name=Ethernet0/1]`.
fn parse_key(
    source: &str,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<(String, String), AuthzError> {
    let mut key = String::new();
    loop {
        match chars.next() {
            Some('=') => break,
            Some(']') | None => {
                return Err(AuthzError::invalid_path(
                    source,
                    format!("key `{key}` has no `=value`"),
                ))
            }
            Some(c) => key.push(c),
        }
    }
    if key.is_empty() {
        return Err(AuthzError::invalid_path(source, "key name is empty"));
    }

    let mut value = String::new();
    loop {
        match chars.next() {
            Some(']') => break,
            Some('[') => {
                return Err(AuthzError::invalid_path(
                    source,
                    format!("unexpected `[` in value of key `{key}`"),
                ))
            }
            Some(c) => value.push(c),
            None => {
                return Err(AuthzError::invalid_path(
                    source,
                    format!("unterminated key `{key}`"),
                ))
            }
        }
    }
    Ok((key, value))
}

impl TryFrom<String> for Path {
    type Error = AuthzError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}
