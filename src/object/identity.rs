use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique id assigned by the store when an object is created
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compound key of a stored object. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectIdentity {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub uid: Uid,
}

impl ObjectIdentity {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        uid: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: None,
            name: name.into(),
            uid: Uid::new(uid),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Snapshots missing any part of the key cannot be tracked
    pub fn is_well_formed(&self) -> bool {
        !self.api_version.is_empty()
            && !self.kind.is_empty()
            && !self.name.is_empty()
            && !self.uid.is_empty()
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(
                f,
                "[{}/{}, namespace: {}, name: {}, uid: {}]",
                self.api_version, self.kind, ns, self.name, self.uid
            ),
            None => write!(
                f,
                "[{}/{}, name: {}, uid: {}]",
                self.api_version, self.kind, self.name, self.uid
            ),
        }
    }
}

/// Reference from a dependent to one of its owners
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub owner: ObjectIdentity,
    /// `BlockSynchronousGC`: the owner may not finish a synchronous
    /// deletion while this dependent still exists.
    #[serde(default, rename = "blockSynchronousGC")]
    pub blocking: bool,
}

impl OwnerReference {
    pub fn blocking(owner: ObjectIdentity) -> Self {
        Self { owner, blocking: true }
    }

    pub fn non_blocking(owner: ObjectIdentity) -> Self {
        Self { owner, blocking: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_namespace() {
        let id = ObjectIdentity::new("v1", "Pod", "web-0", "u-1").with_namespace("default");
        assert_eq!(id.to_string(), "[v1/Pod, namespace: default, name: web-0, uid: u-1]");
    }

    #[test]
    fn test_well_formed() {
        assert!(ObjectIdentity::new("v1", "Pod", "a", "u").is_well_formed());
        assert!(!ObjectIdentity::new("v1", "Pod", "", "u").is_well_formed());
        assert!(!ObjectIdentity::new("v1", "Pod", "a", "").is_well_formed());
        assert!(!ObjectIdentity::new("v1", "", "a", "u").is_well_formed());
    }

    #[test]
    fn test_uid_distinguishes_identities() {
        let a = ObjectIdentity::new("v1", "Pod", "a", "u-1");
        let b = ObjectIdentity::new("v1", "Pod", "a", "u-2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_owner_reference_wire_name() {
        let owner = ObjectIdentity::new("apps/v1", "ReplicaSet", "rs", "u-9");
        let json = serde_json::to_value(OwnerReference::blocking(owner)).unwrap();
        assert_eq!(json["blockSynchronousGC"], serde_json::Value::Bool(true));
        assert_eq!(json["owner"]["apiVersion"], "apps/v1");
    }
}
