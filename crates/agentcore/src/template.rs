//! Prompt templates with `{field}` placeholders.
//!
//! `{{` and `}}` produce literal braces. Templates are parsed once; rendering
//! only reads state.

use crate::{RuntimeState, TemplateError};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed prompt template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(TemplateError::MalformedTemplate {
                        offset,
                        reason: "single '}' must be escaped as '}}'".to_string(),
                    });
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::MalformedTemplate {
                            offset,
                            reason: "unclosed '{'".to_string(),
                        });
                    }
                    let name = name.trim();
                    if !is_identifier(name) {
                        return Err(TemplateError::MalformedTemplate {
                            offset,
                            reason: format!("invalid placeholder '{{{}}}'", name),
                        });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name.to_string()));
                }
                other => literal.push(other),
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

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of first appearance, without duplicates.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn render(&self, state: &RuntimeState) -> Result<String, TemplateError> {
        self.render_mapped(state, &BTreeMap::new())
    }

    /// Render with placeholders renamed through `source` (placeholder to
    /// state field) before lookup.
    pub fn render_mapped(
        &self,
        state: &RuntimeState,
        source: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let field = source.get(name).unwrap_or(name);
                    let value = state.get(field).ok_or_else(|| {
                        TemplateError::UnknownPlaceholder {
                            placeholder: name.clone(),
                        }
                    })?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Parse and render in one step.
pub fn render(template: &str, state: &RuntimeState) -> Result<String, TemplateError> {
    Template::parse(template)?.render(state)
}
