//! # Introspection XML
//!
//! `ParseXml` consumes D-Bus-style introspection XML (spec §4.3,
//! §6 "Introspection XML") and synthesizes [`InterfaceDescription`]
//! values. Unlike the teacher's `bincode`-based wire format, this
//! document is a heterogeneous `<interface>/<method>/<signal>/
//! <property>/<annotation>` tree, so it's walked with `quick-xml`'s
//! streaming event reader rather than mapped onto one serde struct
//! (see DESIGN.md for why `quick-xml` was chosen over `serde-xml-rs`).

use crate::error::{BusError, Result};
use crate::iface::description::{
    Annotations, EmitsChanged, InterfaceDescription, Member, MemberKind, Property, PropertyAccess, SecurityPolicy,
};
use crate::wire::signature::parse_complete_type;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;

const SECURE_ANNOTATION: &str = "org.alljoyn.Bus.Secure";
const EMITS_CHANGED_ANNOTATION: &str = "org.freedesktop.DBus.Property.EmitsChangedSignal";
const DOC_STRING_PREFIX: &str = "org.alljoyn.Bus.DocString.";

/// Parses a `<node>` document into one `InterfaceDescription` per
/// `<interface>` element.
pub fn parse_xml(xml: &str) -> Result<Vec<InterfaceDescription>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut interfaces = Vec::new();
    let mut buf = Vec::new();

    let mut current: Option<InterfaceDescription> = None;
    let mut current_member: Option<(Member, bool)> = None; // bool = is complete (has closing tag pending)
    let mut current_property: Option<Property> = None;
    let mut text_stack: Vec<String> = Vec::new();
    let mut description_language: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| BusError::Xml(e.to_string()))? {
            Event::Start(e) | Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let attrs = read_attrs(&e)?;

                match name.as_str() {
                    "interface" => {
                        let iface_name = attrs.get("name").cloned().unwrap_or_default();
                        let secure = match attrs.get(SECURE_ANNOTATION).map(|s| s.as_str()) {
                            Some("true") => SecurityPolicy::Required,
                            Some("off") => SecurityPolicy::Off,
                            _ => SecurityPolicy::Inherit,
                        };
                        current = Some(InterfaceDescription::new(iface_name, secure)?);
                    }
                    "method" | "signal" => {
                        let member_name = attrs.get("name").cloned().unwrap_or_default();
                        let kind = if name == "method" { MemberKind::Method } else { MemberKind::Signal };
                        current_member = Some((
                            Member {
                                name: member_name,
                                kind,
                                input_sig: String::new(),
                                output_sig: String::new(),
                                arg_names: Vec::new(),
                                annotations: Annotations::new(),
                                per_arg_annotations: Vec::new(),
                            },
                            false,
                        ));
                    }
                    "arg" => {
                        if let Some((member, _)) = current_member.as_mut() {
                            let arg_name = attrs.get("name").cloned().unwrap_or_default();
                            let arg_type = attrs.get("type").cloned().unwrap_or_default();
                            let direction = attrs.get("direction").map(|s| s.as_str()).unwrap_or("in");
                            if !arg_name.is_empty() {
                                member.arg_names.push(arg_name);
                            }
                            if direction == "out" {
                                member.output_sig.push_str(&arg_type);
                            } else {
                                member.input_sig.push_str(&arg_type);
                            }
                            member.per_arg_annotations.push(Annotations::new());
                        }
                    }
                    "property" => {
                        let prop_name = attrs.get("name").cloned().unwrap_or_default();
                        let sig = attrs.get("type").cloned().unwrap_or_default();
                        let access = match attrs.get("access").map(|s| s.as_str()) {
                            Some("read") => PropertyAccess::Read,
                            Some("write") => PropertyAccess::Write,
                            _ => PropertyAccess::ReadWrite,
                        };
                        current_property = Some(Property {
                            name: prop_name,
                            signature: sig,
                            access,
                            emits_changed: None,
                            annotations: Annotations::new(),
                        });
                    }
                    "annotation" => {
                        let ann_name = attrs.get("name").cloned().unwrap_or_default();
                        let ann_value = attrs.get("value").cloned().unwrap_or_default();
                        if ann_name == EMITS_CHANGED_ANNOTATION {
                            if let Some(prop) = current_property.as_mut() {
                                prop.emits_changed = EmitsChanged::from_annotation(&ann_value).ok();
                            }
                        }
                        if let Some(prop) = current_property.as_mut() {
                            prop.annotations.insert(ann_name, ann_value);
                        } else if let Some((member, _)) = current_member.as_mut() {
                            member.annotations.insert(ann_name, ann_value);
                        }
                    }
                    "description" => {
                        description_language = attrs.get("language").cloned();
                        text_stack.push(String::new());
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(last) = text_stack.last_mut() {
                    last.push_str(&t.unescape().map_err(|e| BusError::Xml(e.to_string()))?);
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "method" | "signal" => {
                        if let (Some((member, _)), Some(iface)) = (current_member.take(), current.as_mut()) {
                            iface.add_member(member)?;
                        }
                    }
                    "property" => {
                        if let (Some(prop), Some(iface)) = (current_property.take(), current.as_mut()) {
                            iface.add_property(prop)?;
                        }
                    }
                    "interface" => {
                        if let Some(iface) = current.take() {
                            interfaces.push(iface);
                        }
                    }
                    "description" => {
                        let text = text_stack.pop().unwrap_or_default();
                        let lang = description_language.take().unwrap_or_default();
                        let annotation_name = format!("{DOC_STRING_PREFIX}{lang}");
                        if let Some(prop) = current_property.as_mut() {
                            prop.annotations.insert(annotation_name, text);
                        } else if let Some((member, _)) = current_member.as_mut() {
                            member.annotations.insert(annotation_name, text);
                        } else if let Some(iface) = current.as_mut() {
                            iface.annotations.insert(annotation_name, text);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(interfaces)
}

fn read_attrs(e: &quick_xml::events::BytesStart) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| BusError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value().map_err(|e| BusError::Xml(e.to_string()))?.to_string();
        map.insert(key, value);
    }
    Ok(map)
}

/// Serializes a `<node>` introspection document for one object: one
/// `<interface>` per entry in `interfaces`, followed by one empty
/// `<node name="..."/>` per immediate child in `child_names` (spec §6
/// "Introspection XML", §4.2 "Standard interfaces").
///
/// Per-arg names aren't round-tripped: [`parse_xml`] already collapses
/// `<arg name="...">` onto a single flat `arg_names` list shared across
/// both directions, so there's no reliable way back to "this name
/// belongs to this `in` or `out` slot" from an [`InterfaceDescription`]
/// alone. Generated `<arg>` elements carry `type`/`direction` only.
pub fn generate_introspection_xml(interfaces: &[&InterfaceDescription], child_names: &[String]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Start(BytesStart::new("node"))).map_err(xml_write_err)?;

    for iface in interfaces {
        let mut iface_tag = BytesStart::new("interface");
        iface_tag.push_attribute(("name", iface.name.as_str()));
        writer.write_event(Event::Start(iface_tag)).map_err(xml_write_err)?;

        for member in iface.members() {
            let tag_name = match member.kind {
                MemberKind::Method => "method",
                MemberKind::Signal => "signal",
            };
            let mut member_tag = BytesStart::new(tag_name);
            member_tag.push_attribute(("name", member.name.as_str()));
            writer.write_event(Event::Start(member_tag)).map_err(xml_write_err)?;
            for ty in split_complete_types(&member.input_sig)? {
                write_arg_element(&mut writer, &ty, "in")?;
            }
            for ty in split_complete_types(&member.output_sig)? {
                write_arg_element(&mut writer, &ty, "out")?;
            }
            writer.write_event(Event::End(BytesEnd::new(tag_name))).map_err(xml_write_err)?;
        }

        for prop in iface.properties() {
            let mut prop_tag = BytesStart::new("property");
            prop_tag.push_attribute(("name", prop.name.as_str()));
            prop_tag.push_attribute(("type", prop.signature.as_str()));
            prop_tag.push_attribute((
                "access",
                match prop.access {
                    PropertyAccess::Read => "read",
                    PropertyAccess::Write => "write",
                    PropertyAccess::ReadWrite => "readwrite",
                },
            ));
            writer.write_event(Event::Empty(prop_tag)).map_err(xml_write_err)?;
        }

        writer.write_event(Event::End(BytesEnd::new("interface"))).map_err(xml_write_err)?;
    }

    for child in child_names {
        let mut node_tag = BytesStart::new("node");
        node_tag.push_attribute(("name", child.as_str()));
        writer.write_event(Event::Empty(node_tag)).map_err(xml_write_err)?;
    }

    writer.write_event(Event::End(BytesEnd::new("node"))).map_err(xml_write_err)?;
    String::from_utf8(writer.into_inner()).map_err(|e| BusError::Xml(e.to_string()))
}

fn write_arg_element(writer: &mut Writer<Vec<u8>>, type_sig: &str, direction: &str) -> Result<()> {
    let mut tag = BytesStart::new("arg");
    tag.push_attribute(("type", type_sig));
    tag.push_attribute(("direction", direction));
    writer.write_event(Event::Empty(tag)).map_err(xml_write_err)
}

fn split_complete_types(sig: &str) -> Result<Vec<String>> {
    let bytes = sig.as_bytes();
    let mut pos = 0usize;
    let mut types = Vec::new();
    while pos < bytes.len() {
        let start = pos;
        parse_complete_type(bytes, &mut pos)?;
        types.push(sig[start..pos].to_string());
    }
    Ok(types)
}

fn xml_write_err(e: quick_xml::Error) -> BusError {
    BusError::Xml(e.to_string())
}

/// Legacy (pre-16.04) per-language description documents, each a
/// standalone `<node>` containing only `<description language="...">`
/// elements keyed by member/property name, merged onto an
/// already-parsed-but-not-yet-activated interface (spec §4.3
/// "Introspection binding": "merging descriptions from a per-language
/// XML map onto the already-parsed interface").
pub fn merge_language_descriptions(
    interface: &mut InterfaceDescription,
    language: &str,
    member_or_property: &str,
    text: &str,
) -> Result<()> {
    let annotation_name = format!("{DOC_STRING_PREFIX}{language}");
    interface.annotate_member_or_property(member_or_property, annotation_name, text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <node>
          <interface name="org.example.Calculator">
            <method name="Add">
              <arg name="a" type="i" direction="in"/>
              <arg name="b" type="i" direction="in"/>
              <arg name="result" type="i" direction="out"/>
            </method>
            <signal name="Overflowed">
              <arg name="value" type="x" direction="out"/>
            </signal>
            <property name="Precision" type="u" access="readwrite">
              <annotation name="org.freedesktop.DBus.Property.EmitsChangedSignal" value="true"/>
            </property>
            <description language="en">A simple calculator.</description>
          </interface>
        </node>
    "#;

    #[test]
    fn parses_methods_signals_and_properties() {
        let interfaces = parse_xml(SAMPLE).unwrap();
        assert_eq!(interfaces.len(), 1);
        let iface = &interfaces[0];
        assert_eq!(iface.name, "org.example.Calculator");

        let add = iface.member("Add").unwrap();
        assert_eq!(add.input_sig, "ii");
        assert_eq!(add.output_sig, "i");
        assert_eq!(add.kind, MemberKind::Method);

        let overflowed = iface.member("Overflowed").unwrap();
        assert_eq!(overflowed.kind, MemberKind::Signal);
        assert_eq!(overflowed.output_sig, "x");

        let precision = iface.property("Precision").unwrap();
        assert_eq!(precision.signature, "u");
        assert_eq!(precision.access, PropertyAccess::ReadWrite);
        assert_eq!(precision.emits_changed, Some(EmitsChanged::True));
    }

    #[test]
    fn description_becomes_docstring_annotation() {
        let interfaces = parse_xml(SAMPLE).unwrap();
        let iface = &interfaces[0];
        assert_eq!(iface.annotations.get("org.alljoyn.Bus.DocString.en"), Some("A simple calculator."));
    }

    #[test]
    fn merge_language_descriptions_annotates_existing_member() {
        let xml = r#"
            <node>
              <interface name="org.example.Calculator">
                <method name="Add">
                  <arg name="a" type="i" direction="in"/>
                  <arg name="result" type="i" direction="out"/>
                </method>
              </interface>
            </node>
        "#;
        let mut interfaces = parse_xml(xml).unwrap();
        let iface = &mut interfaces[0];
        merge_language_descriptions(iface, "en", "Add", "Adds two numbers.").unwrap();
        let add = iface.member("Add").unwrap();
        assert_eq!(add.annotations.get("org.alljoyn.Bus.DocString.en"), Some("Adds two numbers."));
    }

    #[test]
    fn generated_xml_parses_back_into_an_equivalent_interface() {
        let mut iface = InterfaceDescription::new("org.example.Calculator", SecurityPolicy::Off).unwrap();
        iface
            .add_member(Member {
                name: "Add".into(),
                kind: MemberKind::Method,
                input_sig: "ii".into(),
                output_sig: "i".into(),
                arg_names: vec![],
                annotations: Annotations::new(),
                per_arg_annotations: vec![],
            })
            .unwrap();
        iface
            .add_property(Property {
                name: "Precision".into(),
                signature: "u".into(),
                access: PropertyAccess::ReadWrite,
                emits_changed: None,
                annotations: Annotations::new(),
            })
            .unwrap();

        let xml = generate_introspection_xml(&[&iface], &["child1".to_string()]).unwrap();
        assert!(xml.contains(r#"<node name="child1"/>"#));

        let reparsed = parse_xml(&xml).unwrap();
        assert_eq!(reparsed.len(), 1);
        let add = reparsed[0].member("Add").unwrap();
        assert_eq!(add.input_sig, "ii");
        assert_eq!(add.output_sig, "i");
        let precision = reparsed[0].property("Precision").unwrap();
        assert_eq!(precision.signature, "u");
        assert_eq!(precision.access, PropertyAccess::ReadWrite);
    }

    #[test]
    fn generated_xml_splits_compound_arg_types_into_separate_elements() {
        let mut iface = InterfaceDescription::new("org.example.I", SecurityPolicy::Off).unwrap();
        iface
            .add_member(Member {
                name: "Batch".into(),
                kind: MemberKind::Method,
                input_sig: "(ii)ai".into(),
                output_sig: "".into(),
                arg_names: vec![],
                annotations: Annotations::new(),
                per_arg_annotations: vec![],
            })
            .unwrap();

        let xml = generate_introspection_xml(&[&iface], &[]).unwrap();
        assert!(xml.contains(r#"type="(ii)""#));
        assert!(xml.contains(r#"type="ai""#));
    }

    #[test]
    fn parses_introspection_xml_loaded_from_a_file_on_disk() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let xml = std::fs::read_to_string(file.path()).unwrap();

        let interfaces = parse_xml(&xml).unwrap();
        assert_eq!(interfaces[0].name, "org.example.Calculator");
    }
}
