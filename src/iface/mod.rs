//! Interface descriptions and their introspection-XML binding (spec §3
//! "Interface description", §4.3 "Introspection binding").

pub mod description;
pub mod xml;

pub use description::{Annotations, EmitsChanged, InterfaceDescription, Member, MemberKind, Property, PropertyAccess, SecurityPolicy};
pub use xml::{generate_introspection_xml, merge_language_descriptions, parse_xml};
