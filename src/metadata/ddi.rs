//! DDI codebook (`oai_ddi`) reader.
//!
//! Maps the study-description elements of a DDI codebook onto the same
//! content keys the Dublin Core reader produces, so the import stage sees a
//! uniform shape regardless of the negotiated schema.

use crate::model::ContentMap;

use super::{collect_fields, MetadataReader, ReadError};

/// DDI element local name → content key. The codebook nests these under
/// `stdyDscr`/`citation`/... but the names are unambiguous, so they are
/// collected wherever they occur.
const DDI_ELEMENTS: &[(&str, &str)] = &[
    ("titl", "title"),
    ("AuthEnty", "creator"),
    ("keyword", "subject"),
    ("topcClas", "subject"),
    ("abstract", "description"),
    ("producer", "publisher"),
    ("copyright", "rights"),
    ("prodDate", "date"),
    ("distDate", "date"),
    ("IDNo", "identifier"),
    ("holdings", "relation"),
    ("dataKind", "type"),
    ("geogCover", "coverage"),
    ("nation", "coverage"),
];

/// Reader for `<codeBook>` record bodies.
pub struct DdiReader;

impl MetadataReader for DdiReader {
    fn prefix(&self) -> &str {
        "oai_ddi"
    }

    fn read(&self, body: &str) -> Result<ContentMap, ReadError> {
        collect_fields(body, DDI_ELEMENTS)
    }
}
