//! # Interface Description
//!
//! The schema of a set of members and properties, identified by a
//! reverse-DNS name (spec §3 "Interface description"). Once *activated*
//! (installed on a bus attachment, or validated against an existing
//! installation) the description is immutable — mirrored here by
//! `activate()` moving the description behind a flag that every mutator
//! checks.

use crate::error::{BusError, Result};
use std::collections::BTreeMap;

/// Per-interface/per-member security requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityPolicy {
    Required,
    Inherit,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    Signal,
}

/// `org.freedesktop.DBus.Property.EmitsChangedSignal` values (spec §6
/// Introspection XML), extended with the source's legacy `const` case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitsChanged {
    True,
    Invalidates,
    False,
    Const,
}

impl EmitsChanged {
    pub fn from_annotation(v: &str) -> Result<EmitsChanged> {
        match v {
            "true" => Ok(EmitsChanged::True),
            "invalidates" => Ok(EmitsChanged::Invalidates),
            "false" => Ok(EmitsChanged::False),
            "const" => Ok(EmitsChanged::Const),
            other => Err(BusError::BadValue(other.chars().next().unwrap_or('?'))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyAccess {
    Read,
    Write,
    ReadWrite,
}

#[derive(Debug, Clone, Default)]
pub struct Annotations(BTreeMap<String, String>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub kind: MemberKind,
    pub input_sig: String,
    pub output_sig: String,
    pub arg_names: Vec<String>,
    pub annotations: Annotations,
    pub per_arg_annotations: Vec<Annotations>,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub signature: String,
    pub access: PropertyAccess,
    pub emits_changed: Option<EmitsChanged>,
    pub annotations: Annotations,
}

/// Name, security policy, and an ordered mapping of members and
/// properties. `BTreeMap` preserves a deterministic iteration order for
/// introspection XML generation without needing a separate insertion-
/// order side table.
#[derive(Debug, Clone)]
pub struct InterfaceDescription {
    pub name: String,
    pub security: SecurityPolicy,
    pub annotations: Annotations,
    members: BTreeMap<String, Member>,
    properties: BTreeMap<String, Property>,
    activated: bool,
}

impl InterfaceDescription {
    pub fn new(name: impl Into<String>, security: SecurityPolicy) -> Result<Self> {
        let name = name.into();
        if name.len() > 255 || !is_well_formed_interface_name(&name) {
            return Err(BusError::NameTooLong(name));
        }
        Ok(InterfaceDescription {
            name,
            security,
            annotations: Annotations::new(),
            members: BTreeMap::new(),
            properties: BTreeMap::new(),
            activated: false,
        })
    }

    pub fn add_member(&mut self, member: Member) -> Result<()> {
        if self.activated {
            return Err(BusError::InterfaceMismatch(self.name.clone()));
        }
        if self.members.contains_key(&member.name) {
            return Err(BusError::MemberAlreadyExists(member.name));
        }
        self.members.insert(member.name.clone(), member);
        Ok(())
    }

    pub fn add_property(&mut self, property: Property) -> Result<()> {
        if self.activated {
            return Err(BusError::InterfaceMismatch(self.name.clone()));
        }
        if self.properties.contains_key(&property.name) {
            return Err(BusError::MemberAlreadyExists(property.name));
        }
        self.properties.insert(property.name.clone(), property);
        Ok(())
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Freezes the description. Installing it a second time on the same
    /// attachment must instead call [`InterfaceDescription::matches`]
    /// against the already-activated copy (`InterfaceMismatch` on
    /// disagreement).
    pub fn activate(&mut self) {
        self.activated = true;
    }

    /// Adds an annotation to an existing member or property by name,
    /// used to merge legacy per-language `<description>` documents onto
    /// an already-parsed interface before it is activated.
    pub fn annotate_member_or_property(&mut self, name: &str, key: String, value: String) -> Result<()> {
        if self.activated {
            return Err(BusError::InterfaceMismatch(self.name.clone()));
        }
        if let Some(member) = self.members.get_mut(name) {
            member.annotations.insert(key, value);
            return Ok(());
        }
        if let Some(property) = self.properties.get_mut(name) {
            property.annotations.insert(key, value);
            return Ok(());
        }
        Err(BusError::NoSuchMember(name.to_string()))
    }

    /// Structural equality used to validate re-registration: same
    /// members/properties with the same signatures.
    pub fn matches(&self, other: &InterfaceDescription) -> bool {
        if self.name != other.name || self.members.len() != other.members.len() || self.properties.len() != other.properties.len() {
            return false;
        }
        for (name, member) in &self.members {
            match other.members.get(name) {
                Some(m) if m.input_sig == member.input_sig && m.output_sig == member.output_sig && m.kind == member.kind => {}
                _ => return false,
            }
        }
        for (name, prop) in &self.properties {
            match other.properties.get(name) {
                Some(p) if p.signature == prop.signature && p.access == prop.access => {}
                _ => return false,
            }
        }
        true
    }
}

/// Legal interface names are dot-separated, each element starts with a
/// letter/underscore, at least two elements, ASCII only.
pub fn is_well_formed_interface_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 2 {
        return false;
    }
    parts.iter().all(|p| {
        !p.is_empty()
            && p.chars().next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
            && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_member() -> Member {
        Member {
            name: "Echo".into(),
            kind: MemberKind::Method,
            input_sig: "s".into(),
            output_sig: "s".into(),
            arg_names: vec!["in".into(), "out".into()],
            annotations: Annotations::new(),
            per_arg_annotations: vec![],
        }
    }

    #[test]
    fn rejects_malformed_interface_name() {
        assert!(InterfaceDescription::new("noprefix", SecurityPolicy::Off).is_err());
        assert!(InterfaceDescription::new("org.example.I", SecurityPolicy::Off).is_ok());
    }

    #[test]
    fn activation_freezes_members() {
        let mut iface = InterfaceDescription::new("org.example.I", SecurityPolicy::Off).unwrap();
        iface.add_member(sample_member()).unwrap();
        iface.activate();
        assert!(iface.add_member(sample_member()).is_err());
    }

    #[test]
    fn duplicate_member_name_rejected() {
        let mut iface = InterfaceDescription::new("org.example.I", SecurityPolicy::Off).unwrap();
        iface.add_member(sample_member()).unwrap();
        assert!(iface.add_member(sample_member()).is_err());
    }

    #[test]
    fn matches_checks_structural_equality() {
        let mut a = InterfaceDescription::new("org.example.I", SecurityPolicy::Off).unwrap();
        a.add_member(sample_member()).unwrap();
        let mut b = InterfaceDescription::new("org.example.I", SecurityPolicy::Off).unwrap();
        b.add_member(sample_member()).unwrap();
        assert!(a.matches(&b));

        let mut c = InterfaceDescription::new("org.example.I", SecurityPolicy::Off).unwrap();
        let mut mismatched = sample_member();
        mismatched.output_sig = "i".into();
        c.add_member(mismatched).unwrap();
        assert!(!a.matches(&c));
    }
}
