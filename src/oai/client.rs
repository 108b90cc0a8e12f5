//! Verb client over HTTP.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::config::Credentials;
use crate::metadata::MetadataRegistry;
use crate::model::ContentMap;

use super::wire::{self, Header, Identity, IdentifierPage};
use super::ProtocolError;

/// OAI-PMH client bound to one endpoint.
///
/// Constructed with the metadata reader registry so that `get_record` can
/// hand back a decoded [`ContentMap`] next to the header and the raw
/// response. Requests are POST form-encoded by default; `force_http_get`
/// switches to GET with query parameters for sources that require it.
/// Timeouts are the caller's concern: they are configured on the supplied
/// `reqwest::Client`.
pub struct OaiClient {
    http: reqwest::Client,
    base_url: String,
    registry: Arc<MetadataRegistry>,
    credentials: Option<Credentials>,
    force_http_get: bool,
}

impl OaiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        registry: Arc<MetadataRegistry>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            registry,
            credentials: None,
            force_http_get: false,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_force_http_get(mut self, force: bool) -> Self {
        self.force_http_get = force;
        self
    }

    async fn request(&self, params: &[(&str, &str)]) -> Result<String, ProtocolError> {
        debug!(url = %self.base_url, ?params, "protocol request");
        let mut request = if self.force_http_get {
            self.http.get(&self.base_url).query(params)
        } else {
            self.http.post(&self.base_url).form(params)
        };
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProtocolError::Http {
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// Liveness check: fetches the repository's self-description.
    pub async fn identify(&self) -> Result<Identity, ProtocolError> {
        let body = self.request(&[("verb", "Identify")]).await?;
        wire::parse_identify(&body)
    }

    /// Lazy identifier listing across all resumption pages. The cursor
    /// holds at most one page in memory and is restartable only from the
    /// beginning (resumption tokens are an opaque forward-only sequence).
    pub fn list_identifiers(
        &self,
        metadata_prefix: &str,
        set_spec: Option<&str>,
    ) -> IdentifierPages<'_> {
        IdentifierPages {
            client: self,
            metadata_prefix: metadata_prefix.to_string(),
            set_spec: set_spec.map(str::to_string),
            buffered: VecDeque::new(),
            token: None,
            started: false,
            finished: false,
        }
    }

    /// Retrieves and decodes one record. The OAI error code
    /// `idDoesNotExist` maps to [`ProtocolError::RecordNotFound`].
    pub async fn get_record(
        &self,
        identifier: &str,
        metadata_prefix: &str,
    ) -> Result<(Header, ContentMap, String), ProtocolError> {
        let body = self
            .request(&[
                ("verb", "GetRecord"),
                ("identifier", identifier),
                ("metadataPrefix", metadata_prefix),
            ])
            .await?;
        let record = match wire::parse_record(&body) {
            Ok(record) => record,
            Err(ProtocolError::Oai { code, .. }) if code == "idDoesNotExist" => {
                return Err(ProtocolError::RecordNotFound {
                    identifier: identifier.to_string(),
                });
            }
            Err(e) => return Err(e),
        };
        let content = self.registry.read(metadata_prefix, &record.metadata)?;
        Ok((record.header, content, body))
    }

    async fn first_page(
        &self,
        metadata_prefix: &str,
        set_spec: Option<&str>,
    ) -> Result<IdentifierPage, ProtocolError> {
        let mut params = vec![
            ("verb", "ListIdentifiers"),
            ("metadataPrefix", metadata_prefix),
        ];
        if let Some(set) = set_spec {
            params.push(("set", set));
        }
        let body = self.request(&params).await?;
        wire::parse_identifier_page(&body)
    }

    async fn resume_page(&self, token: &str) -> Result<IdentifierPage, ProtocolError> {
        // A resumed request must carry only the verb and the token.
        let body = self
            .request(&[("verb", "ListIdentifiers"), ("resumptionToken", token)])
            .await?;
        wire::parse_identifier_page(&body)
    }
}

/// Forward-only cursor over a paginated identifier listing.
pub struct IdentifierPages<'a> {
    client: &'a OaiClient,
    metadata_prefix: String,
    set_spec: Option<String>,
    buffered: VecDeque<Header>,
    token: Option<String>,
    started: bool,
    finished: bool,
}

impl IdentifierPages<'_> {
    /// Next header, fetching the next page when the buffer drains. After
    /// the first error the cursor is exhausted.
    pub async fn next(&mut self) -> Option<Result<Header, ProtocolError>> {
        loop {
            if let Some(header) = self.buffered.pop_front() {
                return Some(Ok(header));
            }
            if self.finished {
                return None;
            }
            let result = if !self.started {
                self.started = true;
                self.client
                    .first_page(&self.metadata_prefix, self.set_spec.as_deref())
                    .await
            } else {
                match self.token.take() {
                    Some(token) => self.client.resume_page(&token).await,
                    None => {
                        self.finished = true;
                        continue;
                    }
                }
            };
            match result {
                Ok(page) => {
                    self.token = page.resumption_token;
                    self.finished = self.token.is_none();
                    self.buffered = page.headers.into();
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
