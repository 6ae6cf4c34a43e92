//! # Bus Object
//!
//! A locally implemented object at a fixed object path (spec §3 "Bus
//! object"). The parent/child tree itself is *not* stored as in-object
//! pointers: per spec §9's design note ("in an arena-based
//! implementation, replace pointers with indices"), the tree is modeled
//! as object-path string prefixes maintained by the registry that owns
//! every `BusObject` ([`crate::endpoint::LocalEndpoint`]), avoiding any
//! parent/child reference cycle entirely.

use crate::error::{BusError, Result};
use crate::iface::description::InterfaceDescription;
use crate::wire::arg::Arg;
use crate::wire::message::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Capability interface for a registered method handler (spec §9's
/// `MessageSink`/`MessageReceiver` role). One object may register many
/// of these, one per `(interface, member)` method-context row.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle_method_call(&self, msg: &Message) -> Result<Message>;
}

/// One row of a bus object's method table: which member, on which
/// interface (if any — methods may be registered with no interface for
/// bare-name dispatch), handled by whom.
#[derive(Clone)]
pub struct MethodContextRow {
    pub interface: Option<String>,
    pub member: String,
    pub handler: Arc<dyn MethodHandler>,
}

/// The parent of an object path, derived from the string itself (see
/// module docs on why the tree isn't stored as pointers). `None` for the
/// bus root `/`.
pub fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// Legal object paths are `/`-separated, non-empty segments of
/// `[A-Za-z0-9_]`, and never end in `/` unless the path is exactly `/`.
pub fn is_legal_object_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    if !path.starts_with('/') || path.ends_with('/') {
        return false;
    }
    path[1..].split('/').all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// A locally implemented object at a fixed path, exposing interfaces,
/// methods, signals, and properties.
pub struct BusObject {
    path: String,
    interfaces: Vec<(InterfaceDescription, bool)>, // (description, announced)
    method_contexts: Vec<MethodContextRow>,
    properties: HashMap<(String, String), Arg>,
    is_secure: bool,
    description_language: Option<String>,
    registered: bool,
}

impl BusObject {
    pub fn new(path: impl Into<String>, is_secure: bool) -> Result<Self> {
        let path = path.into();
        if !is_legal_object_path(&path) {
            return Err(BusError::IllegalObjectPath(path));
        }
        Ok(BusObject {
            path,
            interfaces: Vec::new(),
            method_contexts: Vec::new(),
            properties: HashMap::new(),
            is_secure,
            description_language: None,
            registered: false,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    pub fn description_language(&self) -> Option<&str> {
        self.description_language.as_deref()
    }

    pub fn set_description_language(&mut self, language: impl Into<String>) {
        self.description_language = Some(language.into());
    }

    pub fn add_interface(&mut self, description: InterfaceDescription, announce: bool) {
        self.interfaces.push((description, announce));
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceDescription> {
        self.interfaces.iter().map(|(d, _)| d)
    }

    pub fn announced_interfaces(&self) -> impl Iterator<Item = &InterfaceDescription> {
        self.interfaces.iter().filter(|(_, a)| *a).map(|(d, _)| d)
    }

    pub fn has_interface(&self, name: &str) -> bool {
        self.interfaces.iter().any(|(d, _)| d.name == name)
    }

    /// Adds a method handler. Invariant (spec §3): "a method handler may
    /// be added only while the object is not yet registered."
    pub fn add_method_handler(
        &mut self,
        interface: Option<String>,
        member: impl Into<String>,
        handler: Arc<dyn MethodHandler>,
    ) -> Result<()> {
        if self.registered {
            return Err(BusError::MemberAlreadyExists(self.path.clone()));
        }
        self.method_contexts.push(MethodContextRow { interface, member: member.into(), handler });
        Ok(())
    }

    pub fn method_contexts(&self) -> &[MethodContextRow] {
        &self.method_contexts
    }

    /// Reads a property's live value (spec §6 "Standard interfaces",
    /// `org.freedesktop.DBus.Properties`). `None` if no value has been
    /// set yet, even if the interface declares the property.
    pub fn property_value(&self, interface: &str, property: &str) -> Option<&Arg> {
        self.properties.get(&(interface.to_string(), property.to_string()))
    }

    /// Sets a property's live value. Unlike method handlers, properties
    /// may be set at any point in the object's lifetime, registered or
    /// not.
    pub fn set_property_value(&mut self, interface: impl Into<String>, property: impl Into<String>, value: Arg) {
        self.properties.insert((interface.into(), property.into()), value);
    }

    /// Every `(name, value)` pair currently set for `interface`, in no
    /// particular order.
    pub fn properties_for_interface(&self, interface: &str) -> Vec<(&str, &Arg)> {
        self.properties.iter().filter(|((i, _), _)| i == interface).map(|((_, p), v)| (p.as_str(), v)).collect()
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub(crate) fn mark_registered(&mut self) {
        self.registered = true;
    }

    /// The path of this object's parent in the tree, derived from the
    /// path string itself rather than a stored pointer (see module docs).
    pub fn parent_path(&self) -> Option<String> {
        parent_of(&self.path)
    }
}
