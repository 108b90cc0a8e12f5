//! OAI-PMH envelope parsing.
//!
//! Event-based parsing of the three response shapes the client issues.
//! Element matching goes through local names so namespace prefixes on the
//! envelope do not matter, and the `<metadata>` subtree of a record is
//! captured verbatim (markup included) for the schema-specific reader.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::ProtocolError;

/// Repository self-description from the Identify verb.
#[derive(Debug, Clone)]
pub struct Identity {
    pub repository_name: String,
    pub base_url: String,
    pub protocol_version: String,
    pub earliest_datestamp: Option<String>,
    pub admin_emails: Vec<String>,
}

/// One record header from a listing or GetRecord response.
#[derive(Debug, Clone)]
pub struct Header {
    pub identifier: String,
    /// Raw datestamp as sent by the source; parsed lazily by the fetch stage.
    pub datestamp: Option<String>,
    pub set_spec: Vec<String>,
    pub deleted: bool,
}

/// One page of a ListIdentifiers response.
#[derive(Debug)]
pub struct IdentifierPage {
    pub headers: Vec<Header>,
    /// Cursor for the next page; `None` when the listing is complete.
    pub resumption_token: Option<String>,
}

/// A GetRecord response: header plus the raw metadata body.
#[derive(Debug)]
pub struct RawRecord {
    pub header: Header,
    pub metadata: String,
}

fn attr_value(e: &BytesStart, key: &[u8]) -> String {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
        .unwrap_or_default()
}

fn oai_error(reader: &mut Reader<&[u8]>, e: &BytesStart) -> ProtocolError {
    let code = attr_value(e, b"code");
    let message = reader
        .read_text(e.name())
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    ProtocolError::Oai { code, message }
}

pub(crate) fn parse_identify(xml: &str) -> Result<Identity, ProtocolError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<(Vec<u8>, String)> = Vec::new();
    let mut seen_identify = false;
    let mut identity = Identity {
        repository_name: String::new(),
        base_url: String::new(),
        protocol_version: String::new(),
        earliest_datestamp: None,
        admin_emails: Vec::new(),
    };

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                match e.local_name().as_ref() {
                    b"error" => return Err(oai_error(&mut reader, &e)),
                    b"Identify" => seen_identify = true,
                    _ => {}
                }
                stack.push((e.local_name().as_ref().to_vec(), String::new()));
            }
            Event::Empty(e) if e.local_name().as_ref() == b"error" => {
                return Err(ProtocolError::Oai {
                    code: attr_value(&e, b"code"),
                    message: String::new(),
                });
            }
            Event::Text(t) => {
                if let Some((_, text)) = stack.last_mut() {
                    text.push_str(&t.unescape().map_err(quick_xml::Error::from)?);
                }
            }
            Event::End(_) => {
                if let Some((name, text)) = stack.pop() {
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    match name.as_slice() {
                        b"repositoryName" => identity.repository_name = text.to_string(),
                        b"baseURL" => identity.base_url = text.to_string(),
                        b"protocolVersion" => identity.protocol_version = text.to_string(),
                        b"earliestDatestamp" => {
                            identity.earliest_datestamp = Some(text.to_string())
                        }
                        b"adminEmail" => identity.admin_emails.push(text.to_string()),
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_identify {
        return Err(ProtocolError::MissingElement("Identify"));
    }
    Ok(identity)
}

pub(crate) fn parse_identifier_page(xml: &str) -> Result<IdentifierPage, ProtocolError> {
    let mut reader = Reader::from_str(xml);
    let mut headers = Vec::new();
    let mut resumption_token = None;
    let mut seen_list = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"error" => return Err(oai_error(&mut reader, &e)),
                b"ListIdentifiers" => seen_list = true,
                b"header" => headers.push(read_header(&mut reader, &e)?),
                b"resumptionToken" => {
                    let text = reader.read_text(e.name())?.trim().to_string();
                    resumption_token = if text.is_empty() { None } else { Some(text) };
                }
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"error" => {
                return Err(ProtocolError::Oai {
                    code: attr_value(&e, b"code"),
                    message: String::new(),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_list {
        return Err(ProtocolError::MissingElement("ListIdentifiers"));
    }
    Ok(IdentifierPage {
        headers,
        resumption_token,
    })
}

pub(crate) fn parse_record(xml: &str) -> Result<RawRecord, ProtocolError> {
    let mut reader = Reader::from_str(xml);
    let mut header = None;
    let mut metadata: Option<String> = None;
    let mut seen_get_record = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"error" => return Err(oai_error(&mut reader, &e)),
                b"GetRecord" => seen_get_record = true,
                b"header" => header = Some(read_header(&mut reader, &e)?),
                b"metadata" => {
                    let raw = reader.read_text(e.name())?.trim().to_string();
                    if !raw.is_empty() {
                        metadata = Some(raw);
                    }
                }
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"error" => {
                return Err(ProtocolError::Oai {
                    code: attr_value(&e, b"code"),
                    message: String::new(),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_get_record {
        return Err(ProtocolError::MissingElement("GetRecord"));
    }
    let header = header.ok_or(ProtocolError::MissingElement("header"))?;
    // A deleted record carries no metadata body; surface that as a missing
    // element so fetch records a descriptive object error.
    let metadata = metadata.ok_or(ProtocolError::MissingElement("metadata"))?;
    Ok(RawRecord { header, metadata })
}

/// Reads one `<header>` subtree; the start event has already been consumed.
fn read_header(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart,
) -> Result<Header, ProtocolError> {
    let deleted = attr_value(start, b"status") == "deleted";
    let mut identifier = String::new();
    let mut datestamp = None;
    let mut set_spec = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(_) => text.clear(),
            Event::Text(t) => text.push_str(&t.unescape().map_err(quick_xml::Error::from)?),
            Event::End(e) => match e.local_name().as_ref() {
                b"header" => break,
                b"identifier" => identifier = text.trim().to_string(),
                b"datestamp" => {
                    let t = text.trim();
                    if !t.is_empty() {
                        datestamp = Some(t.to_string());
                    }
                }
                b"setSpec" => {
                    let t = text.trim();
                    if !t.is_empty() {
                        set_spec.push(t.to_string());
                    }
                }
                _ => {}
            },
            Event::Eof => return Err(ProtocolError::MissingElement("header")),
            _ => {}
        }
    }

    if identifier.is_empty() {
        return Err(ProtocolError::MissingElement("identifier"));
    }
    Ok(Header {
        identifier,
        datestamp,
        set_spec,
        deleted,
    })
}
