//! Metadata reader registry: pluggable decoders, one per metadata schema.
//!
//! Each reader is a pure function from a schema-specific record body to a
//! [`ContentMap`]. Readers are looked up by the metadata prefix negotiated
//! with the source; unknown prefixes fail fast with a typed error instead of
//! silently falling back to a default schema.

pub mod dc;
pub mod ddi;

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::model::ContentMap;

pub use dc::DublinCoreReader;
pub use ddi::DdiReader;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("no metadata reader registered for prefix '{0}'")]
    UnsupportedPrefix(String),
    #[error("malformed record body: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed {prefix} record: {message}")]
    Malformed { prefix: String, message: String },
}

/// Decoder for one metadata schema, selected by its prefix string.
pub trait MetadataReader: Send + Sync {
    /// Returns the metadata prefix this reader handles (e.g. "oai_dc").
    fn prefix(&self) -> &str;

    /// Decodes a raw record body into a field → values mapping.
    fn read(&self, body: &str) -> Result<ContentMap, ReadError>;
}

/// Lookup table of [`MetadataReader`]s, built at startup.
pub struct MetadataRegistry {
    readers: HashMap<String, Box<dyn MetadataReader>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    /// Registry with the stock readers: `oai_dc` and `oai_ddi`.
    pub fn with_default_readers() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DublinCoreReader));
        registry.register(Box::new(DdiReader));
        registry
    }

    pub fn register(&mut self, reader: Box<dyn MetadataReader>) {
        self.readers.insert(reader.prefix().to_string(), reader);
    }

    /// Decodes `body` with the reader registered for `prefix`.
    pub fn read(&self, prefix: &str, body: &str) -> Result<ContentMap, ReadError> {
        let reader = self
            .readers
            .get(prefix)
            .ok_or_else(|| ReadError::UnsupportedPrefix(prefix.to_string()))?;
        reader.read(body)
    }

    pub fn supports(&self, prefix: &str) -> bool {
        self.readers.contains_key(prefix)
    }
}

impl Default for MetadataRegistry {
    fn default() -> Self {
        Self::with_default_readers()
    }
}

/// Walks an XML body and collects the text of every element whose local
/// name appears in `table`, appending values under the mapped content key in
/// document order. Text accrues to the innermost open element, so container
/// elements contribute nothing.
pub(crate) fn collect_fields(
    body: &str,
    table: &[(&str, &str)],
) -> Result<ContentMap, ReadError> {
    let mut reader = Reader::from_str(body);
    let mut map = ContentMap::new();
    // One (element local name, accumulated text) frame per open element.
    let mut stack: Vec<(String, String)> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push((name, String::new()));
            }
            Event::Text(e) => {
                if let Some((_, text)) = stack.last_mut() {
                    text.push_str(&e.unescape().map_err(quick_xml::Error::from)?);
                }
            }
            Event::CData(e) => {
                if let Some((_, text)) = stack.last_mut() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some((name, text)) = stack.pop() {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Some((_, key)) =
                        table.iter().find(|(element, _)| *element == name)
                    {
                        map.push(key, trimmed.to_string());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_prefix_fails_fast() {
        let registry = MetadataRegistry::with_default_readers();
        let err = registry.read("marc21", "<record/>").unwrap_err();
        assert!(matches!(err, ReadError::UnsupportedPrefix(p) if p == "marc21"));
    }

    #[test]
    fn stock_readers_are_registered() {
        let registry = MetadataRegistry::default();
        assert!(registry.supports("oai_dc"));
        assert!(registry.supports("oai_ddi"));
        assert!(!registry.supports("oai_marc"));
    }

    #[test]
    fn collect_ignores_unmapped_and_empty_elements() {
        let map = collect_fields(
            "<root><keep>a</keep><skip>b</skip><keep>  </keep><keep>c</keep></root>",
            &[("keep", "kept")],
        )
        .unwrap();
        assert_eq!(map.values("kept"), &["a".to_string(), "c".to_string()]);
        assert!(map.get("skip").is_none());
    }
}
