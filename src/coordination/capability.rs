//! Capability tags for workers
//!
//! Workers declare an open set of capability tags at registration; the
//! routing table references the same tags to describe what a task type needs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single capability tag (e.g. `"search"`, `"math"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Capability tag cannot be empty".to_string());
        }
        if s.chars().any(char::is_whitespace) {
            return Err(format!("Capability tag cannot contain whitespace: {:?}", s));
        }
        Ok(Capability(s.to_string()))
    }
}

impl From<&str> for Capability {
    fn from(s: &str) -> Self {
        Capability(s.trim().to_string())
    }
}

/// A set of capability tags with helper methods
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    capabilities: HashSet<Capability>,
}

impl CapabilitySet {
    /// Create a new empty capability set
    pub fn new() -> Self {
        Self {
            capabilities: HashSet::new(),
        }
    }

    /// Check if this set contains a capability
    pub fn has(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Check if this set covers every capability in `required`
    pub fn covers(&self, required: &[Capability]) -> bool {
        required.iter().all(|cap| self.has(cap))
    }

    /// Add a capability
    pub fn add(&mut self, cap: Capability) {
        self.capabilities.insert(cap);
    }

    /// Remove a capability
    pub fn remove(&mut self, cap: &Capability) {
        self.capabilities.remove(cap);
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Get the underlying set
    pub fn inner(&self) -> &HashSet<Capability> {
        &self.capabilities
    }

    /// Convert to a vec for serialization
    pub fn to_vec(&self) -> Vec<Capability> {
        self.capabilities.iter().cloned().collect()
    }
}

impl From<HashSet<Capability>> for CapabilitySet {
    fn from(capabilities: HashSet<Capability>) -> Self {
        Self { capabilities }
    }
}

impl From<Vec<Capability>> for CapabilitySet {
    fn from(capabilities: Vec<Capability>) -> Self {
        Self {
            capabilities: capabilities.into_iter().collect(),
        }
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_from_str() {
        let cap: Capability = "search".parse().unwrap();
        assert_eq!(cap.as_str(), "search");
    }

    #[test]
    fn test_capability_from_str_trims() {
        let cap: Capability = " math ".parse().unwrap();
        assert_eq!(cap.as_str(), "math");
    }

    #[test]
    fn test_capability_from_str_empty() {
        let result = "".parse::<Capability>();
        assert!(result.is_err());

        let result = "   ".parse::<Capability>();
        assert!(result.is_err());
    }

    #[test]
    fn test_capability_from_str_whitespace() {
        let result = "job search".parse::<Capability>();
        assert!(result.is_err());
    }

    #[test]
    fn test_capability_set_basic_operations() {
        let mut caps = CapabilitySet::new();
        assert!(caps.is_empty());

        caps.add("search".into());
        assert!(!caps.is_empty());
        assert!(caps.has(&"search".into()));
        assert!(!caps.has(&"math".into()));

        caps.remove(&"search".into());
        assert!(!caps.has(&"search".into()));
    }

    #[test]
    fn test_capability_set_covers() {
        let caps: CapabilitySet = vec!["search".into(), "math".into()].into();

        assert!(caps.covers(&["search".into()]));
        assert!(caps.covers(&["search".into(), "math".into()]));
        assert!(!caps.covers(&["search".into(), "write".into()]));
        assert!(caps.covers(&[]));
    }

    #[test]
    fn test_capability_set_from_vec() {
        let caps: CapabilitySet = vec!["search".into(), "search".into()].into();
        assert_eq!(caps.to_vec().len(), 1);
    }

    #[test]
    fn test_capability_serialization() {
        let cap = Capability::from("search");
        let json = serde_json::to_string(&cap).unwrap();
        assert_eq!(json, "\"search\"");

        let deserialized: Capability = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, cap);
    }

    #[test]
    fn test_capability_set_serialization() {
        let caps: CapabilitySet = vec!["a".into(), "b".into()].into();
        let json = serde_json::to_string(&caps).unwrap();
        let back: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert!(back.has(&"a".into()));
        assert!(back.has(&"b".into()));
    }
}
