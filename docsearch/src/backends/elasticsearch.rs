//! Elasticsearch REST backend
//!
//! Searches are sent with `typed_keys=true` so that aggregation results carry
//! their kind (`sterms#name`, `stats#name`, ...). Response bodies are read
//! incrementally and rejected once they exceed the configured ceiling.

use super::{bulk_body, BulkAction, SearchBackend};
use crate::config::ElasticsearchConfig;
use crate::query::types::{EsQuery, EsSearchRequest};
use crate::response::{
    EsBulkResponse, EsCountResponse, EsDeleteByQueryResponse, EsErrorResponse, EsSearchResponse,
};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

const INDEX_NOT_FOUND: &str = "index_not_found_exception";

pub struct ElasticsearchBackend {
    client: Client,
    base_url: Url,
    max_response_bytes: usize,
}

impl ElasticsearchBackend {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;

        let base_url = Url::parse(&config.url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Elasticsearch URL '{}' cannot be used as a base URL",
                config.url
            )));
        }

        Ok(Self {
            client,
            base_url,
            max_response_bytes: config.max_response_bytes,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended, each percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.endpoint(segments);
        debug!("Request {} {}", method, url);
        self.client.request(method, url)
    }

    async fn send(&self, index: &str, request: RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|source| Error::Transport {
            index: index.to_string(),
            source,
        })
    }

    /// Read the body, failing once it grows past the ceiling
    async fn read_body(&self, index: &str, mut response: Response) -> Result<Vec<u8>> {
        let too_large = || Error::ResponseTooLarge {
            index: index.to_string(),
            limit: self.max_response_bytes,
        };

        if let Some(len) = response.content_length() {
            if len > self.max_response_bytes as u64 {
                return Err(too_large());
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|source| Error::Transport {
            index: index.to_string(),
            source,
        })? {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn backend_error(index: &str, status: StatusCode, body: &[u8]) -> Error {
        match serde_json::from_slice::<EsErrorResponse>(body) {
            Ok(err) if err.error_type() == Some(INDEX_NOT_FOUND) => {
                Error::IndexNotFound(index.to_string())
            }
            Ok(err) => Error::Backend {
                index: index.to_string(),
                status: status.as_u16(),
                reason: err.reason(),
            },
            Err(_) => Error::Backend {
                index: index.to_string(),
                status: status.as_u16(),
                reason: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }

    async fn execute<T: DeserializeOwned>(&self, index: &str, request: RequestBuilder) -> Result<T> {
        let response = self.send(index, request).await?;
        let status = response.status();
        let body = self.read_body(index, response).await?;
        if !status.is_success() {
            return Err(Self::backend_error(index, status, &body));
        }
        trace!("Response /{} ({} bytes)", index, body.len());
        Ok(serde_json::from_slice(&body)?)
    }

    async fn execute_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        index: &str,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(
                "Request body /{}: {}",
                index,
                serde_json::to_string(body).unwrap_or_default()
            );
        }
        let request = self.request(method, segments).json(body);
        self.execute(index, request).await
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .send(index, self.request(Method::HEAD, &[index]))
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(Error::Backend {
                index: index.to_string(),
                status: s.as_u16(),
                reason: "index existence check failed".to_string(),
            }),
        }
    }

    async fn create_index(&self, index: &str, settings: &Value) -> Result<()> {
        let _: Value = self
            .execute_json(index, Method::PUT, &[index], settings)
            .await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let _: Value = self
            .execute(index, self.request(Method::DELETE, &[index]))
            .await?;
        Ok(())
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()> {
        let _: Value = self
            .execute_json(index, Method::PUT, &[index, "_mapping"], mapping)
            .await?;
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<Value> {
        let body: Value = self
            .execute(index, self.request(Method::GET, &[index, "_mapping"]))
            .await?;
        // Keyed by concrete index name, which differs from `index` for aliases
        let mapping = body
            .get(index)
            .or_else(|| body.as_object().and_then(|o| o.values().next()))
            .and_then(|v| v.get("mappings"))
            .cloned()
            .unwrap_or_else(|| json!({}));
        Ok(mapping)
    }

    async fn search(&self, index: &str, request: &EsSearchRequest) -> Result<EsSearchResponse> {
        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(
                "Request body /{}/_search: {}",
                index,
                serde_json::to_string(request).unwrap_or_default()
            );
        }
        let builder = self
            .request(Method::POST, &[index, "_search"])
            .query(&[("typed_keys", "true")])
            .json(request);
        self.execute(index, builder).await
    }

    async fn count(&self, index: &str, query: &EsQuery) -> Result<u64> {
        let response: EsCountResponse = self
            .execute_json(
                index,
                Method::POST,
                &[index, "_count"],
                &json!({ "query": query }),
            )
            .await?;
        Ok(response.count)
    }

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
        routing: Option<&str>,
    ) -> Result<()> {
        let mut builder = self.request(Method::PUT, &[index, "_doc", id]).json(document);
        if let Some(routing) = routing {
            builder = builder.query(&[("routing", routing)]);
        }
        let _: Value = self.execute(index, builder).await?;
        Ok(())
    }

    async fn bulk(&self, index: &str, actions: &[BulkAction]) -> Result<EsBulkResponse> {
        if actions.is_empty() {
            return Ok(EsBulkResponse::default());
        }
        let body = bulk_body(index, actions)?;
        trace!("Bulk /{}: {} action(s)", index, actions.len());
        let builder = self
            .request(Method::POST, &[index, "_bulk"])
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        self.execute(index, builder).await
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<()> {
        let response = self
            .send(index, self.request(Method::DELETE, &[index, "_doc", id]))
            .await?;
        let status = response.status();
        let body = self.read_body(index, response).await?;
        if status.is_success() {
            return Ok(());
        }
        match Self::backend_error(index, status, &body) {
            // Document already absent
            Error::Backend { status: 404, .. } => Ok(()),
            err => Err(err),
        }
    }

    async fn delete_by_query(&self, index: &str, query: &EsQuery) -> Result<u64> {
        let response: EsDeleteByQueryResponse = self
            .execute_json(
                index,
                Method::POST,
                &[index, "_delete_by_query"],
                &json!({ "query": query }),
            )
            .await?;
        Ok(response.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(url: &str) -> ElasticsearchBackend {
        let config = ElasticsearchConfig {
            url: url.to_string(),
            ..Default::default()
        };
        ElasticsearchBackend::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let b = backend("http://localhost:9200");
        assert_eq!(
            b.endpoint(&["studies", "_search"]).as_str(),
            "http://localhost:9200/studies/_search"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let b = backend("http://proxy.local/es/");
        assert_eq!(
            b.endpoint(&["studies", "_doc", "a/b"]).as_str(),
            "http://proxy.local/es/studies/_doc/a%2Fb"
        );
    }

    #[test]
    fn test_invalid_url() {
        let config = ElasticsearchConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ElasticsearchBackend::new(&config),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_backend_error_mapping() {
        let body = br#"{"error":{"type":"index_not_found_exception","reason":"no such index [x]"},"status":404}"#;
        assert!(matches!(
            ElasticsearchBackend::backend_error("x", StatusCode::NOT_FOUND, body),
            Error::IndexNotFound(ref i) if i == "x"
        ));

        let body = br#"{"error":{"type":"parsing_exception","reason":"unknown query"},"status":400}"#;
        match ElasticsearchBackend::backend_error("x", StatusCode::BAD_REQUEST, body) {
            Error::Backend { status, reason, .. } => {
                assert_eq!(status, 400);
                assert_eq!(reason, "unknown query");
            }
            other => panic!("Expected Backend, got {other:?}"),
        }

        match ElasticsearchBackend::backend_error("x", StatusCode::BAD_GATEWAY, b"upstream down") {
            Error::Backend { reason, .. } => assert_eq!(reason, "upstream down"),
            other => panic!("Expected Backend, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_bulk_sends_nothing() {
        // Unroutable port: any request would fail
        let b = backend("http://127.0.0.1:1");
        let response = b.bulk("studies", &[]).await.unwrap();
        assert!(response.items.is_empty());
    }
}
