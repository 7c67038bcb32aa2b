//! Path templates with named slots: `/items/{id}` or `/items/{id:int}`.

use std::collections::BTreeSet;

use crate::converter::PathConverter;
use crate::error::SchemaError;

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Slot {
        name: String,
        converter: PathConverter,
    },
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, SchemaError> {
        let mut segments = Vec::new();
        let mut seen = BTreeSet::new();
        let mut rest = raw;

        while let Some(open) = rest.find(['{', '}']) {
            if rest.as_bytes()[open] == b'}' {
                return Err(SchemaError::malformed(raw, "unbalanced `}`"));
            }
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| SchemaError::malformed(raw, "unterminated slot"))?;
            let inner = &after[..close];
            if inner.contains('{') {
                return Err(SchemaError::malformed(raw, "nested `{`"));
            }

            let (name, converter) = match inner.split_once(':') {
                Some((name, conv)) => (name, conv.parse::<PathConverter>()?),
                None => (inner, PathConverter::default()),
            };
            if !is_identifier(name) {
                return Err(SchemaError::malformed(
                    raw,
                    format!("invalid slot name `{name}`"),
                ));
            }
            if !seen.insert(name.to_string()) {
                return Err(SchemaError::malformed(
                    raw,
                    format!("slot `{name}` appears twice"),
                ));
            }

            segments.push(Segment::Slot {
                name: name.to_string(),
                converter,
            });
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Slots in template order.
    pub fn slots(&self) -> impl Iterator<Item = (&str, PathConverter)> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Slot { name, converter } => Some((name.as_str(), *converter)),
            Segment::Literal(_) => None,
        })
    }

    pub fn converter_for(&self, name: &str) -> Option<PathConverter> {
        self.slots().find(|(n, _)| *n == name).map(|(_, c)| c)
    }
}

impl core::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slots_with_and_without_converters() {
        let t = PathTemplate::parse("/orgs/{org}/items/{id:int}").unwrap();
        let slots: Vec<_> = t.slots().collect();
        assert_eq!(
            slots,
            vec![("org", PathConverter::Str), ("id", PathConverter::Int)]
        );
        assert_eq!(t.segments().len(), 4);
    }

    #[test]
    fn rejects_malformed_templates() {
        for bad in ["/a/{id", "/a/id}", "/a/{}", "/a/{1x}", "/a/{id}/{id}", "/a/{id:bogus}"] {
            assert!(
                matches!(PathTemplate::parse(bad), Err(SchemaError::MalformedTemplate { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn template_without_slots_is_one_literal() {
        let t = PathTemplate::parse("/health").unwrap();
        assert_eq!(t.slots().count(), 0);
        assert_eq!(t.segments(), &[Segment::Literal("/health".into())]);
    }
}
