//! Catalog API client implementation.
//!
//! This module provides the [`RemoteClient`] seam the reconciler talks to and
//! an HTTP implementation of it for the catalog's JSON API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use crate::error::{CatalogSyncError, RemoteError, Result};
use crate::query::Transaction;

use super::types::{ObjectKind, ObservedObject, OutcomeRecord, Page};

/// Capability to read and mutate a remote catalog.
///
/// Implementations never retry; a failed call is surfaced as-is.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Lists one page of objects of `kind`, starting after `cursor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    async fn list_page(&self, kind: ObjectKind, cursor: Option<String>) -> Result<Page>;

    /// Submits a transaction, which the catalog applies all-or-nothing.
    ///
    /// Returns one outcome record per statement, in statement order.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog rejects the transaction or the
    /// request fails.
    async fn query(&self, transaction: &Transaction) -> Result<Vec<OutcomeRecord>>;
}

/// HTTP client for the catalog API.
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    /// HTTP client.
    client: Client,
    /// Base URL, without trailing slash.
    endpoint: String,
    /// Access secret.
    secret: String,
    /// Objects requested per listing page.
    page_size: usize,
}

/// Listing response body.
#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Vec<Map<String, Value>>,
    #[serde(default)]
    after: Option<String>,
}

/// Query response body.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    outcomes: Vec<OutcomeRecord>,
}

/// Error response body.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    index: Option<usize>,
}

impl HttpCatalogClient {
    /// Creates a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(connection: &ConnectionConfig, secret: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(connection.timeout_secs))
            .build()
            .map_err(|e| RemoteError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: connection.endpoint.trim_end_matches('/').to_string(),
            secret: secret.to_string(),
            page_size: connection.page_size.max(1),
        })
    }

    /// Returns the base URL this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Maps a non-success response to an error.
    async fn error_for(response: reqwest::Response) -> CatalogSyncError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return RemoteError::AuthenticationFailed {
                message: format!("Catalog refused the secret ({status})"),
            }
            .into();
        }

        if status == StatusCode::CONFLICT || status == StatusCode::BAD_REQUEST {
            if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(&body) {
                return RemoteError::Conflict {
                    index: parsed.error.index,
                    message: parsed.error.message,
                }
                .into();
            }
        }

        RemoteError::api_error(status.as_u16(), body).into()
    }
}

#[async_trait]
impl RemoteClient for HttpCatalogClient {
    async fn list_page(&self, kind: ObjectKind, cursor: Option<String>) -> Result<Page> {
        let url = format!("{}/catalog/{}", self.endpoint, kind.section());
        let size = self.page_size.to_string();
        let mut params = vec![("size", size.as_str())];
        if let Some(after) = cursor.as_deref() {
            params.push(("after", after));
        }
        trace!("GET {url} {params:?}");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret)
            .query(&params)
            .send()
            .await
            .map_err(|e| RemoteError::network(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::invalid_response(format!("Failed to parse listing: {e}")))?;

        let mut items = Vec::with_capacity(body.data.len());
        for mut attributes in body.data {
            let Some(Value::String(name)) = attributes.remove("name") else {
                return Err(RemoteError::invalid_response(format!(
                    "{kind} listing contains an entry without a name"
                ))
                .into());
            };
            items.push(ObservedObject::new(kind, name, attributes));
        }

        debug!("Listed {} {} (more: {})", items.len(), kind.section(), body.after.is_some());
        Ok(Page {
            items,
            after: body.after,
        })
    }

    async fn query(&self, transaction: &Transaction) -> Result<Vec<OutcomeRecord>> {
        let url = format!("{}/query", self.endpoint);
        trace!("POST {url} with {} statements", transaction.statements.len());

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(&self.secret)
            .json(transaction)
            .send()
            .await
            .map_err(|e| RemoteError::network(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::invalid_response(format!("Failed to parse outcomes: {e}")))?;

        Ok(body.outcomes)
    }
}
