// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber/message version compatibility.

use std::cmp::Ordering;

use saltbus_schema_registry::version::compare_versions;
use saltbus_schema_registry::SubscribedVersion;

/// Whether a handler may receive a message of a given version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Eligible, but the handler trails the publisher; fields newer than its
    /// schema are dropped during validation.
    Stale { subscribed: String, message: String },
    Ineligible { reason: String },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        !matches!(self, Self::Ineligible { .. })
    }
}

/// Decide eligibility of a `subscribed` handler for a message tagged
/// `message` (or untagged).
///
/// - `latest` subscribers take everything
/// - untagged messages only reach `latest` subscribers
/// - equal versions are eligible
/// - older subscribers are eligible but stale
/// - newer subscribers, and versions that cannot be ordered, are not
pub fn check(subscribed: &SubscribedVersion, message: Option<&str>) -> Eligibility {
    let wanted = match subscribed {
        SubscribedVersion::Latest => return Eligibility::Eligible,
        SubscribedVersion::Exact(v) => v.as_str(),
    };

    let Some(message) = message else {
        return Eligibility::Ineligible {
            reason: format!("message has no version; handler subscribes to {}", wanted),
        };
    };

    if wanted == message {
        return Eligibility::Eligible;
    }

    match compare_versions(wanted, message) {
        Some(Ordering::Equal) => Eligibility::Eligible,
        Some(Ordering::Less) => Eligibility::Stale {
            subscribed: wanted.to_string(),
            message: message.to_string(),
        },
        Some(Ordering::Greater) => Eligibility::Ineligible {
            reason: format!("handler subscribes to {}, newer than message {}", wanted, message),
        },
        None => Eligibility::Ineligible {
            reason: format!("versions {} and {} cannot be ordered", wanted, message),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(v: &str) -> SubscribedVersion {
        SubscribedVersion::from(v)
    }

    #[test]
    fn latest_always_eligible() {
        assert_eq!(check(&SubscribedVersion::Latest, Some("v1")), Eligibility::Eligible);
        assert_eq!(check(&SubscribedVersion::Latest, Some("beta")), Eligibility::Eligible);
        assert_eq!(check(&SubscribedVersion::Latest, None), Eligibility::Eligible);
    }

    #[test]
    fn older_subscriber_is_stale() {
        assert_eq!(
            check(&exact("v1"), Some("v2")),
            Eligibility::Stale {
                subscribed: "v1".into(),
                message: "v2".into()
            }
        );
        assert!(check(&exact("v2"), Some("v10")).is_eligible());
    }

    #[test]
    fn newer_subscriber_is_ineligible() {
        assert!(!check(&exact("v2"), Some("v1")).is_eligible());
    }

    #[test]
    fn exact_and_equivalent_versions() {
        assert_eq!(check(&exact("v1"), Some("v1")), Eligibility::Eligible);
        assert_eq!(check(&exact("v1"), Some("v1.0")), Eligibility::Eligible);
        assert_eq!(check(&exact("beta"), Some("beta")), Eligibility::Eligible);
    }

    #[test]
    fn unversioned_or_unordered_messages() {
        assert!(!check(&exact("v1"), None).is_eligible());
        assert!(!check(&exact("v1"), Some("beta")).is_eligible());
    }
}
