// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::shape::{Field, Shape};

// ---------------------------------------------------------------------------
// Compatibility level
// ---------------------------------------------------------------------------

/// Describes how two schema versions relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Both forward and backward compatible (e.g. identical shapes).
    Full,
    /// New shape can read data written against the old one.
    Backward,
    /// Old shape can read data written against the new one.
    Forward,
    /// The shapes are incompatible.
    Breaking,
}

// ---------------------------------------------------------------------------
// CompatibilityResult
// ---------------------------------------------------------------------------

/// Detailed result of a compatibility check between two shapes.
#[derive(Debug, Clone)]
pub struct CompatibilityResult {
    /// Overall compatibility level.
    pub compatibility: Compatibility,
    /// Human-readable details about what changed.
    pub details: Vec<String>,
}

impl CompatibilityResult {
    pub fn is_breaking(&self) -> bool {
        self.compatibility == Compatibility::Breaking
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Check compatibility between an old and a new shape of the same topic.
///
/// Only top-level fields are diffed; a nested object whose structure
/// changed counts as a type change.
pub fn check_compatibility(old: &Shape, new: &Shape) -> CompatibilityResult {
    if old == new {
        return CompatibilityResult {
            compatibility: Compatibility::Full,
            details: vec!["shapes are identical".to_string()],
        };
    }

    let mut details = Vec::new();
    let mut has_added = false;
    let mut has_removed = false;
    let mut breaking = false;

    for (name, field) in &new.fields {
        match old.fields.get(name) {
            None if field.required => {
                details.push(format!("added required field: {}", name));
                breaking = true;
            }
            None => {
                details.push(format!("added optional field: {}", name));
                has_added = true;
            }
            Some(old_field) => {
                if old_field.ty != field.ty {
                    details.push(format!("changed type of {}", name));
                    breaking = true;
                } else if !old_field.required && field.required {
                    details.push(format!("field became required: {}", name));
                    breaking = true;
                } else if constraints_differ(old_field, field) {
                    details.push(format!("changed constraints of {}", name));
                    has_added = true;
                }
            }
        }
    }

    for name in old.fields.keys() {
        if !new.fields.contains_key(name) {
            details.push(format!("removed field: {}", name));
            has_removed = true;
        }
    }

    let compatibility = if breaking || (has_added && has_removed) {
        Compatibility::Breaking
    } else if has_added {
        Compatibility::Backward
    } else if has_removed {
        Compatibility::Forward
    } else {
        Compatibility::Full
    };

    CompatibilityResult {
        compatibility,
        details,
    }
}

fn constraints_differ(a: &Field, b: &Field) -> bool {
    a.format != b.format
        || a.min_length != b.min_length
        || a.max_length != b.max_length
        || a.minimum != b.minimum
        || a.maximum != b.maximum
        || a.default != b.default
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::FieldType;

    fn base() -> Shape {
        Shape::new().field("id", FieldType::Integer)
    }

    #[test]
    fn identical_shapes_are_full() {
        let result = check_compatibility(&base(), &base());
        assert_eq!(result.compatibility, Compatibility::Full);
    }

    #[test]
    fn adding_optional_field_is_backward() {
        let new = base().optional("name", FieldType::String);
        let result = check_compatibility(&base(), &new);
        assert_eq!(result.compatibility, Compatibility::Backward);
        assert!(result.details.iter().any(|d| d.contains("added optional field")));
    }

    #[test]
    fn adding_required_field_is_breaking() {
        let new = base().field("name", FieldType::String);
        let result = check_compatibility(&base(), &new);
        assert!(result.is_breaking());
    }

    #[test]
    fn removing_field_is_forward() {
        let old = base().optional("name", FieldType::String);
        let result = check_compatibility(&old, &base());
        assert_eq!(result.compatibility, Compatibility::Forward);
        assert!(result.details.iter().any(|d| d.contains("removed field")));
    }

    #[test]
    fn changing_type_is_breaking() {
        let new = Shape::new().field("id", FieldType::String);
        let result = check_compatibility(&base(), &new);
        assert_eq!(result.compatibility, Compatibility::Breaking);
        assert!(result.details.iter().any(|d| d.contains("changed type")));
    }

    #[test]
    fn add_and_remove_is_breaking() {
        let old = Shape::new().optional("x", FieldType::Integer);
        let new = Shape::new().optional("y", FieldType::Integer);
        let result = check_compatibility(&old, &new);
        assert_eq!(result.compatibility, Compatibility::Breaking);
    }
}
