//! Destination address templates.
//!
//! Addresses such as `queue://Consumer.{creator}.{task_id}.Topic.sign` are
//! parsed once into literal and placeholder segments. Rendering substitutes
//! requester and operation fields by name and cannot fail.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fields a template may interpolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Creator,
    Environment,
    Service,
    TaskId,
    SigningKey,
}

impl Placeholder {
    pub const ALL: [Placeholder; 5] = [
        Self::Creator,
        Self::Environment,
        Self::Service,
        Self::TaskId,
        Self::SigningKey,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Environment => "environment",
            Self::Service => "service",
            Self::TaskId => "task_id",
            Self::SigningKey => "signing_key",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Template parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),
    #[error("unclosed placeholder starting at offset {0}")]
    Unclosed(usize),
    #[error("unmatched '}}' at offset {0}")]
    UnmatchedClose(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Placeholder),
}

/// Values substituted into a template.
#[derive(Debug, Clone, Copy)]
pub struct AddressFields<'a> {
    pub creator: &'a str,
    pub environment: &'a str,
    pub service: &'a str,
    pub task_id: &'a str,
    pub signing_key: &'a str,
}

impl AddressFields<'_> {
    fn get(&self, placeholder: Placeholder) -> &str {
        match placeholder {
            Placeholder::Creator => self.creator,
            Placeholder::Environment => self.environment,
            Placeholder::Service => self.service,
            Placeholder::TaskId => self.task_id,
            Placeholder::SigningKey => self.signing_key,
        }
    }
}

/// A parsed address template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl AddressTemplate {
    /// Parse a template. `{{` and `}}` stand for literal braces.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, n) in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(TemplateError::Unclosed(offset));
                    }
                    let field = Placeholder::from_name(name.trim())
                        .ok_or(TemplateError::UnknownPlaceholder(name))?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => return Err(TemplateError::UnmatchedClose(offset)),
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The template text as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholders used by the template, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(p) => Some(*p),
            Segment::Literal(_) => None,
        })
    }

    #[must_use]
    pub fn render(&self, fields: &AddressFields<'_>) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(p) => out.push_str(fields.get(*p)),
            }
        }
        out
    }
}

impl FromStr for AddressTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AddressTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
