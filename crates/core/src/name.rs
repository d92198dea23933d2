//! Structured identifiers: API triples, model triples, resource names.
//!
//! An [`Api`] identifies a method surface (`chassis:component:arm`), a
//! [`Model`] identifies a concrete implementation of one
//! (`acme:arm:ur5e`), and a [`Name`] addresses a single resource
//! instance, optionally qualified by the remote machine it lives on
//! (`chassis:component:arm/foo:pieceArm`).
//!
//! All three serialize as their canonical colon-separated strings, which
//! is how they appear in configuration documents.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::NameError;

/// Namespace owned by the runtime itself. Single-token model shorthands
/// expand into this namespace.
pub const DEFAULT_NAMESPACE: &str = "chassis";

/// Family used by the single-token model shorthand.
pub const BUILTIN_FAMILY: &str = "builtin";

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9_-]*[a-zA-Z0-9])?$").expect("static pattern")
    })
}

fn check_identifier(value: &str, whole: &str, what: &str) -> Result<(), NameError> {
    if identifier_re().is_match(value) {
        Ok(())
    } else {
        Err(NameError::InvalidName {
            value: whole.to_owned(),
            reason: format!("{what} {value:?} is not a valid identifier"),
        })
    }
}

/// Whether an API describes a physical component or a software service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiKind {
    /// Hardware-facing resources: arms, bases, sensors, cameras.
    Component,
    /// Software resources layered on top of components.
    Service,
}

impl ApiKind {
    /// Canonical lowercase token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiKind {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "component" => Ok(Self::Component),
            "service" => Ok(Self::Service),
            other => Err(NameError::InvalidApi {
                value: other.to_owned(),
                reason: "kind must be \"component\" or \"service\"".into(),
            }),
        }
    }
}

/// A namespaced API triple: `namespace:kind:subtype`.
///
/// Every resource exposing the same method surface shares an API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Api {
    /// Organization namespace, e.g. `chassis`.
    pub namespace: String,
    /// Component or service.
    pub kind: ApiKind,
    /// The surface itself, e.g. `arm` or `sensor`.
    pub subtype: String,
}

impl Api {
    /// Build an API triple, validating each field.
    pub fn new(
        namespace: impl Into<String>,
        kind: ApiKind,
        subtype: impl Into<String>,
    ) -> Result<Self, NameError> {
        let namespace = namespace.into();
        let subtype = subtype.into();
        let whole = format!("{namespace}:{kind}:{subtype}");
        check_identifier(&namespace, &whole, "namespace")?;
        check_identifier(&subtype, &whole, "subtype")?;
        Ok(Self {
            namespace,
            kind,
            subtype,
        })
    }

    /// A component API in the default namespace.
    pub fn component(subtype: impl Into<String>) -> Result<Self, NameError> {
        Self::new(DEFAULT_NAMESPACE, ApiKind::Component, subtype)
    }

    /// A service API in the default namespace.
    pub fn service(subtype: impl Into<String>) -> Result<Self, NameError> {
        Self::new(DEFAULT_NAMESPACE, ApiKind::Service, subtype)
    }

    /// Whether this API describes a component.
    #[must_use]
    pub fn is_component(&self) -> bool {
        self.kind == ApiKind::Component
    }

    /// Whether this API describes a service.
    #[must_use]
    pub fn is_service(&self) -> bool {
        self.kind == ApiKind::Service
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.kind, self.subtype)
    }
}

impl FromStr for Api {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [namespace, kind, subtype] = parts.as_slice() else {
            return Err(NameError::InvalidApi {
                value: s.to_owned(),
                reason: "expected three colon-separated fields".into(),
            });
        };
        let kind = kind.parse::<ApiKind>()?;
        Self::new(*namespace, kind, *subtype)
    }
}

impl Serialize for Api {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Api {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A model triple identifying a concrete implementation of an API:
/// `namespace:family:name`.
///
/// A bare single token is accepted as shorthand for
/// `chassis:builtin:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Model {
    /// Organization namespace.
    pub namespace: String,
    /// Model family, e.g. a driver line.
    pub family: String,
    /// The model itself.
    pub name: String,
}

impl Model {
    /// Build a model triple, validating each field.
    pub fn new(
        namespace: impl Into<String>,
        family: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, NameError> {
        let namespace = namespace.into();
        let family = family.into();
        let name = name.into();
        let whole = format!("{namespace}:{family}:{name}");
        check_identifier(&namespace, &whole, "namespace")?;
        check_identifier(&family, &whole, "family")?;
        check_identifier(&name, &whole, "name")?;
        Ok(Self {
            namespace,
            family,
            name,
        })
    }

    /// The `chassis:builtin:<name>` shorthand.
    pub fn builtin(name: impl Into<String>) -> Result<Self, NameError> {
        Self::new(DEFAULT_NAMESPACE, BUILTIN_FAMILY, name)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.family, self.name)
    }
}

impl FromStr for Model {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [name] => Self::builtin(*name),
            [namespace, family, name] => Self::new(*namespace, *family, *name),
            _ => Err(NameError::InvalidModel {
                value: s.to_owned(),
                reason: "expected one or three colon-separated fields".into(),
            }),
        }
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Model {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A fully-qualified resource name: an [`Api`], an optional remote
/// prefix, and a short name.
///
/// Canonical form is `namespace:kind:subtype/remote:name`, with the
/// remote segment absent for local resources. Remote prefixes may nest
/// (`a:b:name` means the resource `name` on remote `b` reached through
/// remote `a`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    /// The method surface this resource exposes.
    pub api: Api,
    /// The remote machine chain this resource was imported from, if any.
    pub remote: Option<String>,
    /// The short, user-chosen name.
    pub name: String,
}

impl Name {
    /// Build a local name, validating the short name.
    pub fn new(api: Api, name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        check_identifier(&name, &name, "name")?;
        Ok(Self {
            api,
            remote: None,
            name,
        })
    }

    /// Whether this name was imported from a remote.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// The same name with the remote qualification stripped.
    #[must_use]
    pub fn without_remote(&self) -> Self {
        Self {
            api: self.api.clone(),
            remote: None,
            name: self.name.clone(),
        }
    }

    /// The same name qualified by (or further nested under) a remote.
    #[must_use]
    pub fn with_remote(&self, remote: &str) -> Self {
        let remote = match &self.remote {
            Some(existing) => format!("{remote}:{existing}"),
            None => remote.to_owned(),
        };
        Self {
            api: self.api.clone(),
            remote: Some(remote),
            name: self.name.clone(),
        }
    }

    /// The remote-qualified short name, e.g. `foo:pieceArm`, without the
    /// API part.
    #[must_use]
    pub fn short_name(&self) -> String {
        match &self.remote {
            Some(remote) => format!("{remote}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api, self.short_name())
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((api_str, rest)) = s.split_once('/') else {
            return Err(NameError::InvalidName {
                value: s.to_owned(),
                reason: "expected api and name separated by '/'".into(),
            });
        };
        let api: Api = api_str.parse()?;

        // Everything before the last ':' is the remote chain.
        let (remote, short) = match rest.rsplit_once(':') {
            Some((remote, short)) => (Some(remote), short),
            None => (None, rest),
        };
        check_identifier(short, s, "name")?;
        if let Some(remote) = remote {
            for segment in remote.split(':') {
                check_identifier(segment, s, "remote segment")?;
            }
        }
        Ok(Self {
            api,
            remote: remote.map(str::to_owned),
            name: short.to_owned(),
        })
    }
}

// Topological ties are broken on the rendered string, so ordering must
// agree with Display.
impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn arm_api() -> Api {
        Api::component("arm").unwrap()
    }

    #[test]
    fn api_roundtrips_through_display() {
        let api = arm_api();
        assert_eq!(api.to_string(), "chassis:component:arm");
        assert_eq!("chassis:component:arm".parse::<Api>().unwrap(), api);
    }

    #[test]
    fn api_rejects_unknown_kind() {
        let err = "chassis:gadget:arm".parse::<Api>().unwrap_err();
        assert!(matches!(err, NameError::InvalidApi { .. }));
    }

    #[test]
    fn api_rejects_wrong_arity() {
        assert!("chassis:component".parse::<Api>().is_err());
        assert!("a:b:c:d".parse::<Api>().is_err());
    }

    #[test]
    fn model_full_triple_roundtrips() {
        let model: Model = "acme:arm:ur5e".parse().unwrap();
        assert_eq!(model.namespace, "acme");
        assert_eq!(model.family, "arm");
        assert_eq!(model.name, "ur5e");
        assert_eq!(model.to_string(), "acme:arm:ur5e");
    }

    #[test]
    fn model_single_token_expands_to_builtin() {
        let model: Model = "fake".parse().unwrap();
        assert_eq!(model.to_string(), "chassis:builtin:fake");
    }

    #[test]
    fn model_two_tokens_rejected() {
        assert!("acme:ur5e".parse::<Model>().is_err());
    }

    #[test]
    fn name_local_roundtrip() {
        let name = Name::new(arm_api(), "arm1").unwrap();
        assert_eq!(name.to_string(), "chassis:component:arm/arm1");
        assert_eq!(
            "chassis:component:arm/arm1".parse::<Name>().unwrap(),
            name
        );
        assert!(!name.is_remote());
    }

    #[test]
    fn name_remote_roundtrip() {
        let name: Name = "chassis:component:arm/foo:pieceArm".parse().unwrap();
        assert!(name.is_remote());
        assert_eq!(name.remote.as_deref(), Some("foo"));
        assert_eq!(name.name, "pieceArm");
        assert_eq!(name.short_name(), "foo:pieceArm");
        assert_eq!(name.to_string(), "chassis:component:arm/foo:pieceArm");
    }

    #[test]
    fn name_nested_remote_chain() {
        let name: Name = "chassis:component:arm/a:b:pieceArm".parse().unwrap();
        assert_eq!(name.remote.as_deref(), Some("a:b"));
        assert_eq!(name.name, "pieceArm");
    }

    #[test]
    fn with_remote_nests_prefixes() {
        let name = Name::new(arm_api(), "arm1").unwrap();
        let once = name.with_remote("foo");
        assert_eq!(once.short_name(), "foo:arm1");
        let twice = once.with_remote("bar");
        assert_eq!(twice.short_name(), "bar:foo:arm1");
    }

    #[test]
    fn without_remote_strips_prefix() {
        let name: Name = "chassis:component:arm/foo:arm1".parse().unwrap();
        let local = name.without_remote();
        assert!(!local.is_remote());
        assert_eq!(local.to_string(), "chassis:component:arm/arm1");
    }

    #[test]
    fn name_rejects_bad_identifiers() {
        assert!("chassis:component:arm/-bad".parse::<Name>().is_err());
        assert!("chassis:component:arm/".parse::<Name>().is_err());
        assert!(Name::new(arm_api(), "has space").is_err());
    }

    #[test]
    fn name_ordering_matches_rendered_string() {
        let a: Name = "chassis:component:arm/arm1".parse().unwrap();
        let b: Name = "chassis:component:base/base1".parse().unwrap();
        assert_eq!(a.cmp(&b), a.to_string().cmp(&b.to_string()));
        assert!(a < b);
    }

    #[test]
    fn name_serde_as_string() {
        let name: Name = "chassis:component:arm/foo:arm1".parse().unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"chassis:component:arm/foo:arm1\"");
        let back: Name = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn underscores_and_dashes_are_valid_interior() {
        assert!(Name::new(arm_api(), "left_arm-2").is_ok());
        assert!(Name::new(arm_api(), "_leading").is_err());
    }
}
