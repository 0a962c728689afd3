//! Placeholder expansion for configured paths and commands
//!
//! Templates use `{name}` placeholders drawn from a fixed set of keys.
//! `{{` and `}}` produce literal braces. Unknown keys and keys without a
//! value in the context are errors rather than silently left in place.

use crate::error::{AutodepsError, AutodepsResult};
use std::collections::HashMap;
use std::fmt;

/// Recognized template keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Login name of the current user
    User,
    /// Identity token of the dependency set
    DepsHash,
    /// Project root (directory holding the configuration)
    Root,
    /// Legacy alias for `Root`
    AutodepsDir,
    /// Home directory of the current user
    Home,
    /// Selected environment directory (only known after selection)
    VenvDir,
}

impl Placeholder {
    /// All placeholders in display order
    pub fn all() -> &'static [Self] {
        &[
            Self::User,
            Self::DepsHash,
            Self::Root,
            Self::AutodepsDir,
            Self::Home,
            Self::VenvDir,
        ]
    }

    /// Key as written inside braces
    pub fn key(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::DepsHash => "deps_hash",
            Self::Root => "root",
            Self::AutodepsDir => "autodeps_dir",
            Self::Home => "home",
            Self::VenvDir => "venv_dir",
        }
    }

    /// Parse a key
    pub fn parse(key: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.key() == key)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.key())
    }
}

/// Values available for expansion
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: HashMap<Placeholder, String>,
}

impl TemplateContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, key: Placeholder, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a value
    pub fn set(&mut self, key: Placeholder, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    /// Look up a value
    pub fn get(&self, key: Placeholder) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// Expand every placeholder in `template`
    pub fn expand(&self, template: &str) -> AutodepsResult<String> {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    out.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    out.push('}');
                }
                '{' => {
                    let mut key = String::new();
                    let mut closed = false;
                    for k in chars.by_ref() {
                        if k == '}' {
                            closed = true;
                            break;
                        }
                        key.push(k);
                    }
                    if !closed {
                        return Err(AutodepsError::template(template, "unclosed '{'"));
                    }
                    let placeholder = Placeholder::parse(&key).ok_or_else(|| {
                        AutodepsError::template(template, format!("unknown placeholder {{{}}}", key))
                    })?;
                    let value = self.get(placeholder).ok_or_else(|| {
                        AutodepsError::template(template, format!("{} is not known yet", placeholder))
                    })?;
                    out.push_str(value);
                }
                '}' => {
                    return Err(AutodepsError::template(template, "unmatched '}'"));
                }
                _ => out.push(c),
            }
        }

        Ok(out)
    }

    /// Expand each template in order
    pub fn expand_all(&self, templates: &[String]) -> AutodepsResult<Vec<String>> {
        templates.iter().map(|t| self.expand(t)).collect()
    }
}
