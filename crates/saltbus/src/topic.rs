// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic names and subscription patterns.
//!
//! Topics are dot-delimited (`orders.created.eu`).  Patterns add two
//! whole-segment wildcards:
//!
//! - `*` matches exactly one segment
//! - `#` matches zero or more trailing segments (last segment only)
//!
//! Matching is case-sensitive.

use std::fmt;

use thiserror::Error;

/// Topic or pattern syntax errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic is empty")]
    Empty,

    #[error("'{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("'{0}': '#' is only allowed as the last segment")]
    MisplacedRest(String),

    #[error("'{pattern}': wildcard must fill a whole segment (got '{segment}')")]
    PartialWildcard { pattern: String, segment: String },

    #[error("'{0}' is a pattern, not a concrete topic")]
    WildcardInTopic(String),
}

/// Check that `topic` is a concrete topic: non-empty segments, no wildcards.
pub fn validate_topic(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    for segment in topic.split('.') {
        if segment.is_empty() {
            return Err(TopicError::EmptySegment(topic.to_string()));
        }
        if segment.contains(['*', '#']) {
            return Err(TopicError::WildcardInTopic(topic.to_string()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TopicPattern
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`
    One,
    /// `#`
    Rest,
}

/// A parsed subscription pattern (exact topic or wildcard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Parse and validate a pattern.
    pub fn parse(pattern: &str) -> Result<Self, TopicError> {
        if pattern.is_empty() {
            return Err(TopicError::Empty);
        }

        let parts: Vec<&str> = pattern.split('.').collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());

        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "" => return Err(TopicError::EmptySegment(pattern.to_string())),
                "*" => Segment::One,
                "#" if i == last => Segment::Rest,
                "#" => return Err(TopicError::MisplacedRest(pattern.to_string())),
                other if other.contains(['*', '#']) => {
                    return Err(TopicError::PartialWildcard {
                        pattern: pattern.to_string(),
                        segment: other.to_string(),
                    })
                }
                other => Segment::Literal(other.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern has no wildcard segments.
    pub fn is_exact(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Test a concrete topic against this pattern, segment by segment.
    pub fn matches(&self, topic: &str) -> bool {
        let parts: Vec<&str> = topic.split('.').collect();
        Self::match_from(&self.segments, &parts)
    }

    fn match_from(pattern: &[Segment], topic: &[&str]) -> bool {
        match pattern.split_first() {
            None => topic.is_empty(),
            Some((Segment::Rest, _)) => true,
            Some((Segment::One, rest)) => {
                !topic.is_empty() && Self::match_from(rest, &topic[1..])
            }
            Some((Segment::Literal(lit), rest)) => {
                topic.first().is_some_and(|t| *t == lit.as_str())
                    && Self::match_from(rest, &topic[1..])
            }
        }
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for TopicPattern {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
