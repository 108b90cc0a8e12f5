//! Field mapping from a decoded [`ContentMap`] to a [`PackageDict`].
//!
//! The whole transformation is a pure pipeline: given the same content map
//! the produced package is identical across invocations. Mapped fields take
//! the first value and are skipped when absent; the derived fields (author,
//! license, issued, identifier, references) index directly into the map and
//! a missing key there is a typed error fatal for the record.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::model::{ContentMap, Extra, FieldValue, PackageDict, Resource, Tag};
use crate::munge::{munge_tag, MAX_NAME_LENGTH};

#[derive(Error, Debug)]
pub enum MapError {
    #[error("required field '{0}' missing from record content")]
    MissingField(&'static str),
}

/// Static default mapping table: target package field ← content key.
pub const DEFAULT_MAPPING: &[(&str, &str)] = &[
    ("title", "title"),
    ("notes", "description"),
    ("maintainer", "publisher"),
    ("maintainer_email", "maintainer_email"),
    ("url", "relation"),
];

/// Builds the package representation for one record. `name` is the
/// guid-derived catalog name, used as both `id` and `name`.
///
/// The caller fills in `owner_org` and `groups` afterwards; everything else
/// derives from the content map alone.
pub fn build_package(name: &str, content: &ContentMap) -> Result<PackageDict, MapError> {
    let mut package = PackageDict {
        id: name.to_string(),
        name: name.to_string(),
        ..Default::default()
    };

    for (target, key) in DEFAULT_MAPPING {
        let Some(value) = content.get(key).and_then(FieldValue::first) else {
            continue;
        };
        let value = Some(value.to_string());
        match *target {
            "title" => package.title = value,
            "notes" => package.notes = value,
            "maintainer" => package.maintainer = value,
            "maintainer_email" => package.maintainer_email = value,
            "url" => package.url = value,
            _ => {}
        }
    }

    package.author = Some(join_required(content, "creator")?);
    let license = join_required(content, "rights")?;
    package.license_id = Some(license.clone());
    package.license = Some(license);
    package.issued = Some(join_required(content, "date")?);
    package.source_identifier = Some(join_required(content, "identifier")?);

    let relation = join_required(content, "relation")?;
    package.identifier = Some(relation.clone());
    package.references = Some(relation.clone());
    package.resources = vec![Resource {
        name: "record".to_string(),
        url: relation,
    }];

    // Injected during fetch when the header datestamp parsed; absence is
    // the documented degraded case, not an error.
    package.modified = content
        .get("metadata_modified")
        .and_then(FieldValue::first)
        .map(str::to_string);

    let (tags, extras) = extract_tags_and_extras(content);
    package.tags = tags;
    package.extras = extras;

    Ok(package)
}

fn join_required(content: &ContentMap, key: &'static str) -> Result<String, MapError> {
    content
        .get(key)
        .map(|value| value.as_slice().join(", "))
        .ok_or(MapError::MissingField(key))
}

/// Splits the content map into tags and extras.
///
/// Keys consumed by the mapping table are skipped. `type` and `subject`
/// become tags: list values are flattened, scalar values split on `;`.
/// Every other key becomes one extra holding the first value (or null when
/// empty); keys ending in `date` get time-zone-stripped to a naive ISO-8601
/// string and are dropped entirely when unparsable.
pub fn extract_tags_and_extras(content: &ContentMap) -> (Vec<Tag>, Vec<Extra>) {
    let mut raw_tags: Vec<String> = Vec::new();
    let mut extras = Vec::new();

    for (key, value) in content.iter() {
        if DEFAULT_MAPPING.iter().any(|(_, mapped)| *mapped == key.as_str()) {
            continue;
        }
        if key == "type" || key == "subject" {
            match value {
                FieldValue::List(values) => raw_tags.extend(values.iter().cloned()),
                FieldValue::Scalar(s) => {
                    raw_tags.extend(s.split(';').map(str::to_string))
                }
            }
            continue;
        }

        let mut extra_value = match value {
            FieldValue::List(values) => values.first().cloned(),
            FieldValue::Scalar(s) if s.is_empty() => None,
            FieldValue::Scalar(s) => Some(s.clone()),
        };
        if key.ends_with("date") {
            extra_value = match extra_value {
                Some(raw) => match normalize_datetime(&raw) {
                    Some(normalized) => Some(normalized),
                    None => continue,
                },
                None => None,
            };
        }
        extras.push(Extra {
            key: key.clone(),
            value: extra_value,
        });
    }

    let tags = raw_tags
        .iter()
        .map(|tag| Tag {
            name: munge_tag(truncate_chars(tag, MAX_NAME_LENGTH)),
        })
        .collect();
    (tags, extras)
}

/// Strips time-zone information, keeping the wall-clock time as given.
/// Returns `None` for anything unparsable.
pub fn normalize_datetime(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let naive = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.naive_local()
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        dt
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)?
    } else {
        return None;
    };
    Some(naive.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_content() -> ContentMap {
        let mut content = ContentMap::new();
        content.push("title", "T".to_string());
        content.push("description", "D".to_string());
        content.push("creator", "A".to_string());
        content.push("creator", "B".to_string());
        content.push("rights", "CC-BY".to_string());
        content.push("date", "2021-05-01".to_string());
        content.push("relation", "http://x/1".to_string());
        content.push("identifier", "http://x/1".to_string());
        content
    }

    #[test]
    fn end_to_end_mapping() {
        let package = build_package("oai-x-1", &record_content()).unwrap();
        assert_eq!(package.id, "oai-x-1");
        assert_eq!(package.name, "oai-x-1");
        assert_eq!(package.title.as_deref(), Some("T"));
        assert_eq!(package.notes.as_deref(), Some("D"));
        assert_eq!(package.author.as_deref(), Some("A, B"));
        assert_eq!(package.license_id.as_deref(), Some("CC-BY"));
        assert_eq!(package.issued.as_deref(), Some("2021-05-01"));
        assert_eq!(package.url.as_deref(), Some("http://x/1"));
        assert_eq!(package.identifier.as_deref(), Some("http://x/1"));
        assert_eq!(package.references.as_deref(), Some("http://x/1"));
        assert_eq!(package.resources.len(), 1);
        assert_eq!(package.resources[0].url, "http://x/1");
    }

    #[test]
    fn mapping_is_deterministic() {
        let content = record_content();
        let a = build_package("oai-x-1", &content).unwrap();
        let b = build_package("oai-x-1", &content).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn absent_mapped_field_is_skipped() {
        let mut content = record_content();
        content.0.remove("description");
        let package = build_package("n", &content).unwrap();
        assert!(package.notes.is_none());
    }

    #[test]
    fn missing_creator_is_fatal() {
        let mut content = record_content();
        content.0.remove("creator");
        let err = build_package("n", &content).unwrap_err();
        assert!(matches!(err, MapError::MissingField("creator")));
    }

    #[test]
    fn missing_modified_is_tolerated() {
        let package = build_package("n", &record_content()).unwrap();
        assert!(package.modified.is_none());
    }

    #[test]
    fn tags_from_type_and_subject() {
        let mut content = ContentMap::new();
        content.push("type", "Dataset".to_string());
        content.insert("subject", FieldValue::Scalar("Climate;Ocean".to_string()));
        let (tags, extras) = extract_tags_and_extras(&content);
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["climate", "ocean", "dataset"]);
        assert!(extras.iter().all(|e| e.key != "type" && e.key != "subject"));
    }

    #[test]
    fn tags_are_bounded_and_munged() {
        let mut content = ContentMap::new();
        content.push("subject", format!("Deep {}", "x".repeat(200)));
        let (tags, _) = extract_tags_and_extras(&content);
        assert_eq!(tags.len(), 1);
        assert!(tags[0].name.len() <= MAX_NAME_LENGTH);
        assert!(tags[0].name.starts_with("deep-x"));
    }

    #[test]
    fn extras_take_first_value_or_null() {
        let mut content = ContentMap::new();
        content.push("language", "en".to_string());
        content.push("language", "de".to_string());
        content.insert("format", FieldValue::List(vec![]));
        let (_, extras) = extract_tags_and_extras(&content);
        let language = extras.iter().find(|e| e.key == "language").unwrap();
        assert_eq!(language.value.as_deref(), Some("en"));
        let format = extras.iter().find(|e| e.key == "format").unwrap();
        assert!(format.value.is_none());
    }

    #[test]
    fn date_suffixed_extras_are_normalized() {
        let mut content = ContentMap::new();
        content.push("coverage_date", "2020-01-01T00:00:00+02:00".to_string());
        let (_, extras) = extract_tags_and_extras(&content);
        let extra = extras.iter().find(|e| e.key == "coverage_date").unwrap();
        assert_eq!(extra.value.as_deref(), Some("2020-01-01T00:00:00"));
    }

    #[test]
    fn unparsable_date_extras_are_dropped() {
        let mut content = ContentMap::new();
        content.push("coverage_date", "sometime in spring".to_string());
        content.push("language", "en".to_string());
        let (_, extras) = extract_tags_and_extras(&content);
        assert!(extras.iter().all(|e| e.key != "coverage_date"));
        assert!(extras.iter().any(|e| e.key == "language"));
    }

    #[test]
    fn normalize_datetime_variants() {
        assert_eq!(
            normalize_datetime("2020-01-01T00:00:00+02:00").as_deref(),
            Some("2020-01-01T00:00:00")
        );
        assert_eq!(
            normalize_datetime("2021-05-01T10:30:00Z").as_deref(),
            Some("2021-05-01T10:30:00")
        );
        assert_eq!(
            normalize_datetime("2021-05-01").as_deref(),
            Some("2021-05-01T00:00:00")
        );
        assert!(normalize_datetime("not a date").is_none());
    }
}
