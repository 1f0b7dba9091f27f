//! XML metadata attached to MDF4 blocks through MD links.
//!
//! MDF4 stores descriptive text as small XML documents whose root element is
//! named after the owning block (`HDcomment`, `FHcomment`, `CGcomment`, ...).
//! [`MetaData`] keeps the parts this crate uses: the `<TX>` description, the
//! `<e>` properties under `<common_properties>` and simple root level
//! elements such as `<tool_id>`.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::{Error, Result};

/// One `<e>` property with its ASAM attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ETag {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub unit_ref: String,
    /// `type` attribute, e.g. `string`, `decimal`, `integer`, `boolean`.
    pub data_type: String,
    pub language: String,
    pub read_only: bool,
    pub value: String,
}

impl ETag {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            ..Default::default()
        }
    }

    pub fn value_as_f64(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }

    pub fn value_as_bool(&self) -> Option<bool> {
        match self.value.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetaData {
    root: String,
    text: String,
    properties: Vec<ETag>,
    elements: Vec<(String, String)>,
}

impl MetaData {
    /// Empty document with root element `root` (e.g. `HDcomment`).
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            ..Default::default()
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
    }

    pub fn properties(&self) -> &[ETag] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&ETag> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_value(&self, name: &str) -> Option<&str> {
        self.property(name).map(|p| p.value.as_str())
    }

    /// Adds `tag`, replacing a property of the same name in place.
    pub fn set_property(&mut self, tag: ETag) {
        match self.properties.iter_mut().find(|p| p.name == tag.name) {
            Some(existing) => *existing = tag,
            None => self.properties.push(tag),
        }
    }

    pub fn set_property_value(&mut self, name: &str, value: &str) {
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value.to_string(),
            None => self.properties.push(ETag::new(name, value)),
        }
    }

    pub fn elements(&self) -> &[(String, String)] {
        &self.elements
    }

    pub fn element(&self, name: &str) -> Option<&str> {
        self.elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_element(&mut self, name: &str, value: &str) {
        match self.elements.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.elements.push((name.to_string(), value.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.properties.is_empty() && self.elements.is_empty()
    }

    /// Serializes the document. The `<TX>` element is always written since
    /// the ASAM schemas require it.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        let xml_err = |e: std::io::Error| Error::Metadata(e.to_string());

        let mut root = BytesStart::new(self.root.as_str());
        root.push_attribute(("xmlns", "http://www.asam.net/mdf/v4"));
        writer.write_event(Event::Start(root)).map_err(xml_err)?;

        write_text_element(&mut writer, "TX", &self.text)?;
        for (name, value) in &self.elements {
            write_text_element(&mut writer, name, value)?;
        }

        if !self.properties.is_empty() {
            writer
                .write_event(Event::Start(BytesStart::new("common_properties")))
                .map_err(xml_err)?;
            for tag in &self.properties {
                let mut e = BytesStart::new("e");
                e.push_attribute(("name", tag.name.as_str()));
                for (key, value) in [
                    ("desc", tag.description.as_str()),
                    ("unit", tag.unit.as_str()),
                    ("unit_ref", tag.unit_ref.as_str()),
                    ("type", tag.data_type.as_str()),
                    ("xml:lang", tag.language.as_str()),
                ] {
                    if !value.is_empty() {
                        e.push_attribute((key, value));
                    }
                }
                if tag.read_only {
                    e.push_attribute(("ro", "true"));
                }
                writer.write_event(Event::Start(e)).map_err(xml_err)?;
                writer
                    .write_event(Event::Text(BytesText::new(&tag.value)))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("e")))
                    .map_err(xml_err)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("common_properties")))
                .map_err(xml_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new(self.root.as_str())))
            .map_err(xml_err)?;
        String::from_utf8(writer.into_inner()).map_err(|e| Error::Metadata(e.to_string()))
    }

    /// Parses an MD block's XML.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut meta = MetaData::default();

        let mut path: Vec<String> = Vec::new();
        let mut current_tag: Option<ETag> = None;

        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| Error::Metadata(e.to_string()))?
            {
                Event::Start(element) => {
                    let name = local_name(&element)?;
                    if path.is_empty() {
                        meta.root = name.clone();
                    } else if name == "e" {
                        current_tag = Some(parse_e_tag(&element)?);
                    }
                    path.push(name);
                }
                Event::Empty(element) => {
                    let name = local_name(&element)?;
                    if path.is_empty() {
                        meta.root = name;
                    } else if name == "e" {
                        meta.set_property(parse_e_tag(&element)?);
                    } else if path.len() == 1 && name != "TX" {
                        meta.set_element(&name, "");
                    }
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|e| Error::Metadata(e.to_string()))?
                        .into_owned();
                    if let Some(tag) = current_tag.as_mut() {
                        tag.value.push_str(&value);
                    } else if path.len() == 2 && path[1] == "TX" {
                        meta.text.push_str(&value);
                    } else if path.len() == 2 && path[1] != "common_properties" {
                        meta.set_element(&path[1], &value);
                    }
                }
                Event::CData(data) => {
                    if path.len() == 2 && path[1] == "TX" {
                        meta.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::End(_) => {
                    if path.pop().as_deref() == Some("e") {
                        if let Some(tag) = current_tag.take() {
                            meta.set_property(tag);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if meta.root.is_empty() {
            return Err(Error::Metadata("XML document has no root element".into()));
        }
        Ok(meta)
    }

    /// Interprets a comment link's content: XML when it looks like XML,
    /// otherwise plain description text.
    pub fn from_comment(root: &str, comment: &str) -> Result<Self> {
        if comment.trim_start().starts_with('<') {
            Self::from_xml(comment)
        } else {
            let mut meta = Self::new(root);
            meta.set_text(comment);
            Ok(meta)
        }
    }
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> Result<()> {
    let xml_err = |e: std::io::Error| Error::Metadata(e.to_string());
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

fn local_name(element: &BytesStart<'_>) -> Result<String> {
    let name = element.local_name();
    std::str::from_utf8(name.as_ref())
        .map(str::to_string)
        .map_err(|e| Error::Metadata(e.to_string()))
}

fn parse_e_tag(element: &BytesStart<'_>) -> Result<ETag> {
    let mut tag = ETag::default();
    for attr in element.attributes().with_checks(false) {
        let attr = attr.map_err(|e| Error::Metadata(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Metadata(e.to_string()))?
            .into_owned();
        match attr.key.as_ref() {
            b"name" => tag.name = value,
            b"desc" => tag.description = value,
            b"unit" => tag.unit = value,
            b"unit_ref" => tag.unit_ref = value,
            b"type" => tag.data_type = value,
            b"xml:lang" | b"lang" => tag.language = value,
            b"ro" => tag.read_only = value == "true" || value == "1",
            _ => {}
        }
    }
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_comment_round_trip() {
        let mut meta = MetaData::new("HDcomment");
        meta.set_text("Road test <A&B>");
        meta.set_property_value("author", "Ingrid");
        meta.set_property(ETag {
            name: "vehicle_speed_max".into(),
            unit: "km/h".into(),
            data_type: "decimal".into(),
            read_only: true,
            value: "250.5".into(),
            ..Default::default()
        });

        let xml = meta.to_xml().unwrap();
        assert!(xml.starts_with("<HDcomment"));
        assert!(xml.contains("&lt;A&amp;B&gt;"));

        let parsed = MetaData::from_xml(&xml).unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(
            parsed.property("vehicle_speed_max").and_then(ETag::value_as_f64),
            Some(250.5)
        );
    }

    #[test]
    fn file_history_elements() {
        let xml = "<FHcomment xmlns=\"http://www.asam.net/mdf/v4\">\
                   <TX>created</TX><tool_id>mdfeng</tool_id>\
                   <tool_vendor>ACME</tool_vendor><tool_version>1.0</tool_version>\
                   </FHcomment>";
        let meta = MetaData::from_xml(xml).unwrap();
        assert_eq!(meta.root(), "FHcomment");
        assert_eq!(meta.text(), "created");
        assert_eq!(meta.element("tool_vendor"), Some("ACME"));
        assert_eq!(meta.element("user_name"), None);
    }

    #[test]
    fn plain_comment_is_text() {
        let meta = MetaData::from_comment("CGcomment", "just text").unwrap();
        assert_eq!(meta.text(), "just text");
        assert_eq!(meta.root(), "CGcomment");
    }

    #[test]
    fn broken_xml_is_an_error() {
        assert!(matches!(
            MetaData::from_xml("<HDcomment><TX>open</HDcomment>"),
            Err(Error::Metadata(_))
        ));
    }
}
