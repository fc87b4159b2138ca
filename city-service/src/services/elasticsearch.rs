//! Elasticsearch-backed document store over the REST API.

use crate::config::ElasticsearchConfig;
use crate::models::{CityRecord, Revision, StoredCity};
use crate::services::store::{DocumentStore, StoreError, WritePrecondition};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

#[derive(Clone)]
pub struct ElasticsearchStore {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<Secret<String>>,
}

/// Body of `GET /{index}/_doc/{id}`.
#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source")]
    source: Option<CityRecord>,
    #[serde(rename = "_seq_no")]
    seq_no: Option<u64>,
    #[serde(rename = "_primary_term")]
    primary_term: Option<u64>,
}

impl GetResponse {
    fn into_stored(self, id: &str) -> Result<Option<StoredCity>, StoreError> {
        if !self.found {
            return Ok(None);
        }

        let record = self.source.ok_or_else(|| {
            StoreError::Other(format!("Document [{}] returned without _source", id))
        })?;
        let revision = match (self.seq_no, self.primary_term) {
            (Some(seq_no), Some(primary_term)) => Some(Revision {
                seq_no,
                primary_term,
            }),
            _ => None,
        };

        Ok(Some(StoredCity { record, revision }))
    }
}

impl ElasticsearchStore {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(&config.url).map_err(|e| {
            StoreError::Other(format!("Invalid Elasticsearch URL '{}': {}", config.url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Other(format!(
                "Invalid Elasticsearch URL '{}': not a base URL",
                config.url
            )));
        }

        tracing::info!(url = %base_url, "Configured Elasticsearch store");

        Ok(Self {
            client: Client::new(),
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Builds `{base}/{segments...}` with each segment percent-encoded, so ids
    /// such as `New York` or `a/b` stay a single path segment.
    ///
    /// `.` and `..` are rejected: URL normalisation would drop them (encoded
    /// or not) and address a different resource.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        if let Some(segment) = segments.iter().find(|s| matches!(**s, "." | "..")) {
            return Err(StoreError::MalformedRequest(format!(
                "Path segment '{}' cannot be addressed",
                segment
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                StoreError::Other(format!("Invalid Elasticsearch URL: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(
                username,
                self.password.as_ref().map(|p| p.expose_secret().as_str()),
            ),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        self.authorize(request).send().await.map_err(|e| {
            tracing::error!(error = %e, "Elasticsearch request failed");
            StoreError::Other(format!("Elasticsearch transport error: {}", e))
        })
    }
}

/// Maps a non-success Elasticsearch status onto the store error taxonomy.
fn error_for_status(status: StatusCode, body: String) -> StoreError {
    match status {
        StatusCode::BAD_REQUEST => StoreError::MalformedRequest(body),
        StatusCode::CONFLICT => StoreError::Conflict(body),
        _ => StoreError::Other(format!("Elasticsearch returned {}: {}", status, body)),
    }
}

async fn failure(response: Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_for_status(status, body)
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        let url = self.endpoint(&[collection])?;
        let response = self.send(self.client.head(url)).await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(failure(response).await),
        }
    }

    async fn create_collection(&self, collection: &str) -> Result<(), StoreError> {
        let url = self.endpoint(&[collection])?;
        let response = self.send(self.client.put(url)).await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(failure(response).await)
        }
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredCity>, StoreError> {
        let url = self.endpoint(&[collection, "_doc", id])?;
        let response = self.send(self.client.get(url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: GetResponse = response.json().await.map_err(|e| {
                    StoreError::Other(format!("Invalid Elasticsearch get response: {}", e))
                })?;
                body.into_stored(id)
            }
            _ => Err(failure(response).await),
        }
    }

    async fn put_by_id(
        &self,
        collection: &str,
        id: &str,
        record: &CityRecord,
        precondition: WritePrecondition,
    ) -> Result<(), StoreError> {
        let url = self.endpoint(&[collection, "_doc", id])?;
        let mut request = self.client.put(url).json(record);

        request = match precondition {
            WritePrecondition::None => request,
            WritePrecondition::Absent => request.query(&[("op_type", "create")]),
            WritePrecondition::Matches(revision) => request.query(&[
                ("if_seq_no", revision.seq_no.to_string()),
                ("if_primary_term", revision.primary_term.to_string()),
            ]),
        };

        let response = self.send(request).await?;
        if response.status().is_success() {
            tracing::debug!(collection, id, "Indexed document");
            Ok(())
        } else {
            Err(failure(response).await)
        }
    }
}
