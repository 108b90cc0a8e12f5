//! OAI-PMH protocol client.
//!
//! Wraps the protocol verbs the pipeline needs (Identify, ListIdentifiers,
//! GetRecord) over HTTP, with transparent resumption-token pagination and
//! optional basic credentials. Wire-level envelope parsing lives in
//! [`wire`]; the verb client in [`client`].

pub mod client;
pub mod wire;

use thiserror::Error;

use crate::metadata::ReadError;

pub use client::{IdentifierPages, OaiClient};
pub use wire::{Header, Identity, IdentifierPage, RawRecord};

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint returned HTTP status {status}")]
    Http { status: u16 },
    #[error("malformed protocol response: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed protocol response: missing <{0}> element")]
    MissingElement(&'static str),
    #[error("record '{identifier}' not found on the source")]
    RecordNotFound { identifier: String },
    #[error("protocol error '{code}': {message}")]
    Oai { code: String, message: String },
    #[error("unable to decode record metadata: {0}")]
    Decode(#[from] ReadError),
}
