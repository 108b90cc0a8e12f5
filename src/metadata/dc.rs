//! Dublin Core (`oai_dc`) reader.

use crate::model::ContentMap;

use super::{collect_fields, MetadataReader, ReadError};

/// The Dublin Core Metadata Element Set, Version 1.1. Every element maps to
/// a content key of the same name; multi-valued elements keep source order.
const DC_ELEMENTS: &[(&str, &str)] = &[
    ("title", "title"),
    ("creator", "creator"),
    ("subject", "subject"),
    ("description", "description"),
    ("publisher", "publisher"),
    ("contributor", "contributor"),
    ("date", "date"),
    ("type", "type"),
    ("format", "format"),
    ("identifier", "identifier"),
    ("source", "source"),
    ("language", "language"),
    ("relation", "relation"),
    ("coverage", "coverage"),
    ("rights", "rights"),
];

/// Reader for `<oai_dc:dc>` record bodies. Only elements present in the
/// document appear in the resulting map.
pub struct DublinCoreReader;

impl MetadataReader for DublinCoreReader {
    fn prefix(&self) -> &str {
        "oai_dc"
    }

    fn read(&self, body: &str) -> Result<ContentMap, ReadError> {
        collect_fields(body, DC_ELEMENTS)
    }
}
