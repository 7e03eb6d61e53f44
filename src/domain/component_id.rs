use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
    str::FromStr,
};

use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};

/// Separator between the segments of a qualified identity.
pub const SEPARATOR: &str = "::";

/// The fully-qualified identity of a component.
///
/// Format: one or more `::`-separated segments, where each segment starts
/// with a lowercase ASCII letter and contains only lowercase ASCII letters,
/// digits and underscores.
///
/// Examples: `ntp`, `profile::base`, `profile::kubernetes::resources::datadog`
///
/// A single leading `::` (the top-scope form) is accepted and dropped while
/// parsing. After that, two identities are the same component if and only if
/// their strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentId(NonEmptyString);

impl ComponentId {
    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the final segment of the identity.
    ///
    /// ```
    /// use rolecheck::ComponentId;
    ///
    /// let id: ComponentId = "profile::kubernetes::resources::fluentd".parse().unwrap();
    /// assert_eq!(id.name(), "fluentd");
    /// ```
    #[must_use]
    pub fn name(&self) -> &str {
        self.as_str()
            .rsplit_once(SEPARATOR)
            .map_or(self.as_str(), |(_, name)| name)
    }

    /// Returns the namespace segments, excluding the final name.
    ///
    /// Unqualified identities have an empty namespace.
    #[must_use]
    pub fn namespace(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.as_str().split(SEPARATOR).collect();
        segments.pop();
        segments
    }

    /// Checks whether this identity lives under the given namespace prefix.
    ///
    /// Matching is segment-wise, so `profile::kube` is not within
    /// `profile::kubernetes`. An identity is within itself.
    #[must_use]
    pub fn is_within(&self, prefix: &Self) -> bool {
        let this = self.as_str();
        let prefix = prefix.as_str();
        this == prefix
            || this
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(SEPARATOR))
    }
}

fn valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Errors that can occur when parsing a [`ComponentId`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The identity was empty.
    #[error("Invalid component identity: must not be empty")]
    Empty,

    /// One of the `::`-separated segments was malformed.
    #[error(
        "Invalid segment '{segment}' in component identity '{id}': segments must start with a \
         lowercase letter and contain only lowercase letters, digits and underscores"
    )]
    Segment {
        /// The full identity as given.
        id: String,
        /// The offending segment (may be empty).
        segment: String,
    },
}

impl FromStr for ComponentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix(SEPARATOR).unwrap_or(s);
        if trimmed.is_empty() {
            return Err(Error::Empty);
        }

        if let Some(segment) = trimmed.split(SEPARATOR).find(|seg| !valid_segment(seg)) {
            return Err(Error::Segment {
                id: s.to_string(),
                segment: segment.to_string(),
            });
        }

        NonEmptyString::new(trimmed.to_string())
            .map(Self)
            .map_err(|_| Error::Empty)
    }
}

impl TryFrom<&str> for ComponentId {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for ComponentId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComponentId> for String {
    fn from(id: ComponentId) -> Self {
        id.0.into_inner()
    }
}

impl Hash for ComponentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl AsRef<str> for ComponentId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for ComponentId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ComponentId {
        s.parse().unwrap()
    }

    #[test]
    fn parses_qualified_identity() {
        let id = id("profile::kubernetes::resources::datadog");
        assert_eq!(id.as_str(), "profile::kubernetes::resources::datadog");
        assert_eq!(id.name(), "datadog");
        assert_eq!(id.namespace(), vec!["profile", "kubernetes", "resources"]);
    }

    #[test]
    fn parses_unqualified_identity() {
        let id = id("ntp");
        assert_eq!(id.name(), "ntp");
        assert!(id.namespace().is_empty());
    }

    #[test]
    fn strips_top_scope_prefix() {
        assert_eq!(id("::profile::base"), id("profile::base"));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!("".parse::<ComponentId>(), Err(Error::Empty));
        assert_eq!("::".parse::<ComponentId>(), Err(Error::Empty));
    }

    #[test]
    fn rejects_malformed_segments() {
        for bad in [
            "profile::",
            "profile::::base",
            "Profile::base",
            "profile::9base",
            "profile::base-thing",
            "profile:base",
            "::::profile",
        ] {
            assert!(
                matches!(bad.parse::<ComponentId>(), Err(Error::Segment { .. })),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn accepts_digits_and_underscores() {
        let id = id("profile::kube_state_metrics2");
        assert_eq!(id.name(), "kube_state_metrics2");
    }

    #[test]
    fn namespace_containment_is_segment_wise() {
        let datadog = id("profile::kubernetes::resources::datadog");
        assert!(datadog.is_within(&id("profile::kubernetes")));
        assert!(datadog.is_within(&datadog));
        assert!(!datadog.is_within(&id("profile::kube")));
        assert!(!id("profile::kube").is_within(&datadog));
    }

    #[test]
    fn serde_uses_plain_string() {
        let id = id("profile::base");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"profile::base\"");

        let back: ComponentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        let err = serde_json::from_str::<ComponentId>("\"Profile\"");
        assert!(err.is_err());
    }
}
