//! Keyed-XML parser: the reference [`SourceParser`] implementation.
//!
//! It understands flat "keyed" documents: a root element whose direct
//! children each hold one translatable string:
//!
//! ```xml
//! <strings>
//!   <greeting hint="Shown on start">Hello</greeting>
//!   <cats plural="cats">cat</cats>
//! </strings>
//! ```
//!
//! The element name becomes the source key; `context`, `hint`, `flags` and
//! `plural` attributes map onto the extraction fields. Leaves are expected
//! to hold a single text node. In rendering mode the document is re-emitted
//! with each leaf's text (and `plural` attribute, when present) replaced by
//! the callback's translation.

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use locsync_core::{join_plurals, split_plurals, Error, Extracted, ParseMode, Result, SourceParser};

pub struct KeyedXmlParser;

impl SourceParser for KeyedXmlParser {
    fn name(&self) -> &'static str {
        "keyed-xml"
    }

    fn parse(
        &self,
        buffer: &str,
        mode: ParseMode<'_>,
        callback: &mut dyn FnMut(Extracted) -> Option<String>,
    ) -> Result<Option<String>> {
        match mode {
            ParseMode::Extract => {
                extract(buffer, callback)?;
                Ok(None)
            }
            ParseMode::Render { .. } => render(buffer, callback).map(Some),
        }
    }
}

struct Leaf {
    start: BytesStart<'static>,
    name: String,
    context: String,
    hint: String,
    flags: Vec<String>,
    plural: Option<String>,
    text: String,
}

fn leaf_from(e: &BytesStart<'_>) -> Result<Leaf> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut leaf = Leaf {
        start: e.to_owned().into_owned(),
        name,
        context: String::new(),
        hint: String::new(),
        flags: Vec::new(),
        plural: None,
        text: String::new(),
    };
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        match key.as_str() {
            "context" => leaf.context = value,
            "hint" => leaf.hint = value,
            "flags" => {
                leaf.flags = value.split_whitespace().map(str::to_string).collect();
            }
            "plural" => leaf.plural = Some(value),
            _ => {}
        }
    }
    Ok(leaf)
}

impl Leaf {
    fn extracted(&self) -> Extracted {
        let text = self.text.trim().to_string();
        let string = match &self.plural {
            Some(plural) => join_plurals(&[text.as_str(), plural.as_str()]),
            None => text,
        };
        Extracted {
            string,
            context: self.context.clone(),
            hint: self.hint.clone(),
            flags: self.flags.clone(),
            source_key: self.name.clone(),
        }
    }
}

fn xml_err(e: impl std::fmt::Display) -> Error {
    Error::Parse(format!("keyed-xml: {e}"))
}

fn extract(buffer: &str, callback: &mut dyn FnMut(Extracted) -> Option<String>) -> Result<()> {
    let mut reader = Reader::from_str(buffer);
    let mut depth = 0usize;
    let mut leaf: Option<Leaf> = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => {
                depth += 1;
                if depth == 2 {
                    leaf = Some(leaf_from(&e)?);
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    if let Some(leaf) = leaf.take() {
                        callback(leaf.extracted());
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(t) => {
                if let Some(leaf) = leaf.as_mut() {
                    leaf.text.push_str(&t.unescape().map_err(xml_err)?);
                }
            }
            Event::CData(t) => {
                if let Some(leaf) = leaf.as_mut() {
                    leaf.text.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

fn render(buffer: &str, callback: &mut dyn FnMut(Extracted) -> Option<String>) -> Result<String> {
    let mut reader = Reader::from_str(buffer);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut leaf: Option<Leaf> = None;
    loop {
        let event = reader.read_event().map_err(xml_err)?;
        match event {
            Event::Start(e) => {
                depth += 1;
                if depth == 2 {
                    leaf = Some(leaf_from(&e)?);
                } else {
                    writer.write_event(Event::Start(e)).map_err(xml_err)?;
                }
            }
            Event::End(e) => {
                if depth == 2 {
                    if let Some(leaf) = leaf.take() {
                        write_leaf(&mut writer, leaf, callback)?;
                    }
                } else {
                    writer.write_event(Event::End(e)).map_err(xml_err)?;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(t) => {
                if let Some(leaf) = leaf.as_mut() {
                    leaf.text.push_str(&t.unescape().map_err(xml_err)?);
                } else {
                    writer.write_event(Event::Text(t)).map_err(xml_err)?;
                }
            }
            Event::CData(t) => {
                if let Some(leaf) = leaf.as_mut() {
                    leaf.text.push_str(&String::from_utf8_lossy(t.as_ref()));
                } else {
                    writer.write_event(Event::CData(t)).map_err(xml_err)?;
                }
            }
            Event::Eof => break,
            other => {
                writer.write_event(other).map_err(xml_err)?;
            }
        }
    }
    let bytes = writer.into_inner();
    String::from_utf8(bytes).map_err(|e| xml_err(e))
}

fn write_leaf(
    writer: &mut Writer<Vec<u8>>,
    leaf: Leaf,
    callback: &mut dyn FnMut(Extracted) -> Option<String>,
) -> Result<()> {
    let extracted = leaf.extracted();
    let name = leaf.name.clone();
    let original = extracted.string.clone();
    let translated = if original.is_empty() {
        original.clone()
    } else {
        callback(extracted).unwrap_or_else(|| original.clone())
    };

    let forms = split_plurals(&translated);
    let text = forms[0].to_string();
    let plural_value = forms.get(1).map(|s| s.to_string()).or(leaf.plural.clone());

    let mut start = BytesStart::new(name.as_str());
    for attr in leaf.start.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "plural" {
            if let Some(plural) = &plural_value {
                start.push_attribute((key.as_str(), plural.as_str()));
            }
        } else {
            let value = attr.unescape_value().map_err(xml_err)?;
            start.push_attribute((key.as_str(), value.as_ref()));
        }
    }
    writer
        .write_event(Event::Start(start.clone()))
        .map_err(xml_err)?;
    if !text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&text)))
            .map_err(xml_err)?;
    }
    writer
        .write_event(Event::End(start.to_end()))
        .map_err(xml_err)?;
    Ok(())
}
