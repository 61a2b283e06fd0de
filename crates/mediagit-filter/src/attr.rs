// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Attribute requirements declared by filters and their matching against
//! resolved path attributes
//!
//! A filter declares a whitespace-separated list of requirement tokens:
//!
//! | Token        | Meaning                                                   |
//! |--------------|-----------------------------------------------------------|
//! | `name`       | load the attribute and pass it to `check`; never filters  |
//! | `name=value` | attribute must be set to exactly `value`                  |
//! | `name=*`     | attribute must be set to some string value                |
//! | `+name`      | attribute must be set (true)                              |
//! | `-name`      | attribute must be unset (false)                           |
//! | `!name`      | attribute must be unspecified                             |

use crate::error::{FilterError, FilterResult};
use crate::oid::Oid;
use std::fmt;

/// Resolved value of one attribute for one path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttrValue {
    /// Not mentioned by any attribute rule
    #[default]
    Unspecified,
    /// Set (`name` or `+name` in an attributes file)
    True,
    /// Unset (`-name` in an attributes file)
    False,
    /// Set to a string (`name=value`)
    Value(String),
}

impl AttrValue {
    /// Convenience constructor for a string value
    pub fn value(s: impl Into<String>) -> Self {
        AttrValue::Value(s.into())
    }

    /// Kind of the value, ignoring the string payload
    pub fn kind(&self) -> AttrKind {
        match self {
            AttrValue::Unspecified => AttrKind::Unspecified,
            AttrValue::True => AttrKind::True,
            AttrValue::False => AttrKind::False,
            AttrValue::Value(_) => AttrKind::String,
        }
    }

    /// The string payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Value(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the attribute is set to the true state
    pub fn is_true(&self) -> bool {
        matches!(self, AttrValue::True)
    }

    /// Whether the attribute is explicitly unset
    pub fn is_false(&self) -> bool {
        matches!(self, AttrValue::False)
    }

    /// Whether the attribute was not mentioned at all
    pub fn is_unspecified(&self) -> bool {
        matches!(self, AttrValue::Unspecified)
    }
}

/// Kind of an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// Not mentioned
    Unspecified,
    /// Set
    True,
    /// Unset
    False,
    /// String value
    String,
}

/// Options forwarded to the attribute resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttrCheckOptions {
    /// Skip the system-wide attributes file
    pub no_system: bool,
    /// Also consult `.gitattributes` at the root of HEAD
    pub include_head: bool,
    /// Also consult `.gitattributes` in this commit
    pub include_commit: Option<Oid>,
}

/// What a single requirement token expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Bare name: load only
    Load,
    /// `+name`
    Set,
    /// `-name`
    Unset,
    /// `!name`
    Unspecified,
    /// `name=value`
    Value(String),
    /// `name=*`
    AnyValue,
}

/// One parsed requirement token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrRequirement {
    /// Attribute name
    pub name: String,
    /// Expected value
    pub expect: Expectation,
}

impl AttrRequirement {
    fn parse(token: &str) -> FilterResult<Self> {
        let (prefix, rest) = match token.as_bytes().first() {
            Some(b'+') => (Some(Expectation::Set), &token[1..]),
            Some(b'-') => (Some(Expectation::Unset), &token[1..]),
            Some(b'!') => (Some(Expectation::Unspecified), &token[1..]),
            _ => (None, token),
        };

        let (name, expect) = match (prefix, rest.split_once('=')) {
            (Some(_), Some(_)) => {
                return Err(FilterError::invalid_attributes(
                    token,
                    "a prefixed requirement cannot also carry a value",
                ))
            }
            (Some(expect), None) => (rest, expect),
            (None, Some((_, ""))) => {
                return Err(FilterError::invalid_attributes(token, "missing value after '='"))
            }
            (None, Some((name, "*"))) => (name, Expectation::AnyValue),
            (None, Some((name, value))) => (name, Expectation::Value(value.to_string())),
            (None, None) => (rest, Expectation::Load),
        };

        if name.is_empty() {
            return Err(FilterError::invalid_attributes(token, "missing attribute name"));
        }
        if name.starts_with(['+', '-', '!']) {
            return Err(FilterError::invalid_attributes(token, "repeated prefix"));
        }

        Ok(Self {
            name: name.to_string(),
            expect,
        })
    }

    /// Whether this requirement can cause a filter to be skipped
    pub fn is_match(&self) -> bool {
        !matches!(self.expect, Expectation::Load)
    }

    /// Compare a resolved value against this requirement
    ///
    /// A kind mismatch (e.g. expecting unset but finding a string) is simply
    /// a non-match.
    pub fn matches(&self, found: &AttrValue) -> bool {
        match (&self.expect, found) {
            (Expectation::Load, _) => true,
            (Expectation::Set, AttrValue::True) => true,
            (Expectation::Unset, AttrValue::False) => true,
            (Expectation::Unspecified, AttrValue::Unspecified) => true,
            (Expectation::AnyValue, AttrValue::Value(_)) => true,
            (Expectation::Value(want), AttrValue::Value(got)) => want == got,
            _ => false,
        }
    }
}

impl fmt::Display for AttrRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expect {
            Expectation::Load => write!(f, "{}", self.name),
            Expectation::Set => write!(f, "+{}", self.name),
            Expectation::Unset => write!(f, "-{}", self.name),
            Expectation::Unspecified => write!(f, "!{}", self.name),
            Expectation::Value(v) => write!(f, "{}={}", self.name, v),
            Expectation::AnyValue => write!(f, "{}=*", self.name),
        }
    }
}

/// Requirement table derived once from a filter's attribute string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttrRequirements {
    reqs: Vec<AttrRequirement>,
    nmatches: usize,
}

impl AttrRequirements {
    /// Parse a whitespace-separated requirement string
    ///
    /// # Examples
    ///
    /// ```
    /// use mediagit_filter::AttrRequirements;
    ///
    /// let reqs = AttrRequirements::parse("crlf eol text").unwrap();
    /// assert_eq!(reqs.names(), vec!["crlf", "eol", "text"]);
    /// assert!(!reqs.has_matches());
    ///
    /// let reqs = AttrRequirements::parse("filter=lfs -binary").unwrap();
    /// assert!(reqs.has_matches());
    /// ```
    pub fn parse(attributes: &str) -> FilterResult<Self> {
        let reqs = attributes
            .split_whitespace()
            .map(AttrRequirement::parse)
            .collect::<FilterResult<Vec<_>>>()?;
        let nmatches = reqs.iter().filter(|r| r.is_match()).count();
        Ok(Self { reqs, nmatches })
    }

    /// Whether no attributes are requested at all
    pub fn is_empty(&self) -> bool {
        self.reqs.is_empty()
    }

    /// Number of requested attributes
    pub fn len(&self) -> usize {
        self.reqs.len()
    }

    /// Whether any requirement constrains the value
    pub fn has_matches(&self) -> bool {
        self.nmatches > 0
    }

    /// Requested attribute names, in declaration order
    pub fn names(&self) -> Vec<&str> {
        self.reqs.iter().map(|r| r.name.as_str()).collect()
    }

    /// Parsed requirements
    pub fn iter(&self) -> impl Iterator<Item = &AttrRequirement> {
        self.reqs.iter()
    }

    /// Check resolved values (positionally aligned with [`Self::names`])
    pub fn matches(&self, values: &[AttrValue]) -> bool {
        values.len() == self.reqs.len()
            && self.reqs.iter().zip(values).all(|(req, found)| req.matches(found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_token_forms() {
        let reqs = AttrRequirements::parse("  text  eol=lf diff=* +ident -binary !merge ").unwrap();
        let parsed: Vec<_> = reqs.iter().cloned().collect();
        assert_eq!(parsed.len(), 6);
        assert_eq!(parsed[0].expect, Expectation::Load);
        assert_eq!(parsed[1].expect, Expectation::Value("lf".into()));
        assert_eq!(parsed[2].expect, Expectation::AnyValue);
        assert_eq!(parsed[3], AttrRequirement { name: "ident".into(), expect: Expectation::Set });
        assert_eq!(parsed[4].expect, Expectation::Unset);
        assert_eq!(parsed[5].expect, Expectation::Unspecified);
        assert_eq!(reqs.names(), vec!["text", "eol", "diff", "ident", "binary", "merge"]);
        assert!(reqs.has_matches());
    }

    #[test]
    fn test_value_may_contain_equals() {
        let reqs = AttrRequirements::parse("filter=a=b").unwrap();
        let req = reqs.iter().next().unwrap();
        assert_eq!(req.name, "filter");
        assert_eq!(req.expect, Expectation::Value("a=b".into()));
    }

    #[test]
    fn test_empty_requirements() {
        let reqs = AttrRequirements::parse("   ").unwrap();
        assert!(reqs.is_empty());
        assert!(!reqs.has_matches());
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        for bad in ["=x", "+", "-a=b", "name=", "!-x"] {
            assert!(
                matches!(AttrRequirements::parse(bad), Err(FilterError::InvalidAttributes { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_kind_mismatch_is_non_match() {
        let req = AttrRequirement::parse("-text").unwrap();
        assert!(req.matches(&AttrValue::False));
        assert!(!req.matches(&AttrValue::value("auto")));
        assert!(!req.matches(&AttrValue::True));
    }

    #[test]
    fn test_wildcard_requires_string() {
        let req = AttrRequirement::parse("filter=*").unwrap();
        assert!(req.matches(&AttrValue::value("lfs")));
        assert!(!req.matches(&AttrValue::True));
        assert!(!req.matches(&AttrValue::Unspecified));
    }

    #[test]
    fn test_value_requirement() {
        let reqs = AttrRequirements::parse("filter=lfs text").unwrap();
        assert!(reqs.matches(&[AttrValue::value("lfs"), AttrValue::Unspecified]));
        assert!(!reqs.matches(&[AttrValue::value("crypt"), AttrValue::True]));
        assert!(!reqs.matches(&[AttrValue::value("lfs")]));
    }

    #[test]
    fn test_display_roundtrips_tokens() {
        let line = "text eol=lf diff=* +ident -binary !merge";
        let reqs = AttrRequirements::parse(line).unwrap();
        let rendered: Vec<String> = reqs.iter().map(|r| r.to_string()).collect();
        assert_eq!(rendered.join(" "), line);
    }
}
