//! [`SearchBackend`] over the OpenSearch/Elasticsearch REST API.
//!
//! Requests rotate across the configured addresses. Transport failures map
//! to `Unavailable`/`Timeout`; error bodies are classified by their
//! `error.type`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cdp_core::config::{RefreshPolicy, SearchConfig};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{BackendError, Hit, SearchBackend, SearchRequest, SearchResponse};

pub struct OpenSearchBackend {
    client: Client,
    base_urls: Vec<Url>,
    next: AtomicUsize,
    username: Option<String>,
    password: Option<String>,
    timeout_ms: u64,
}

impl OpenSearchBackend {
    pub fn new(config: &SearchConfig) -> Result<Self, BackendError> {
        let base_urls = config
            .base_urls()
            .iter()
            .map(|u| Url::parse(u).map_err(|e| BackendError::Protocol(format!("invalid address '{}': {}", u, e))))
            .collect::<Result<Vec<_>, _>>()?;
        if base_urls.is_empty() {
            return Err(BackendError::Unavailable("no search addresses configured".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| BackendError::Protocol(format!("failed to build HTTP client: {}", e)))?;
        debug!(cluster = %config.cluster_name, addresses = ?config.addresses, "search backend configured");
        Ok(Self {
            client,
            base_urls,
            next: AtomicUsize::new(0),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout_ms: config.request_timeout_ms,
        })
    }

    /// URL for the next address in rotation, with escaped path segments.
    fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.base_urls.len();
        let mut url = self.base_urls[i].clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Protocol(format!("address cannot be a base: {}", url_text(&self.base_urls[i]))))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, BackendError> {
        let mut builder = self.client.request(method, self.url(segments)?);
        if let Some(user) = &self.username {
            builder = builder.basic_auth(user, self.password.as_ref());
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        builder.send().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout_ms)
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }

    async fn json_body(&self, response: Response) -> Result<Value, BackendError> {
        response
            .json()
            .await
            .map_err(|e| BackendError::Protocol(format!("invalid JSON response: {}", e)))
    }

    /// Turn a non-success response into a backend error.
    async fn error_for(&self, index: &str, response: Response) -> BackendError {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        classify(index, status, &body)
    }
}

fn url_text(url: &Url) -> &str {
    url.as_str()
}

fn error_type(body: &Value) -> &str {
    body.pointer("/error/type").and_then(Value::as_str).unwrap_or("")
}

fn classify(index: &str, status: StatusCode, body: &Value) -> BackendError {
    let kind = error_type(body);
    let reason = body
        .pointer("/error/reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    match (status, kind) {
        (_, "index_not_found_exception") => BackendError::IndexNotFound(index.to_string()),
        (StatusCode::BAD_REQUEST, "illegal_argument_exception") | (StatusCode::BAD_REQUEST, "mapper_parsing_exception") => {
            BackendError::MappingConflict {
                index: index.to_string(),
                reason,
            }
        }
        (StatusCode::REQUEST_TIMEOUT, _) | (StatusCode::GATEWAY_TIMEOUT, _) => {
            BackendError::Unavailable(format!("{}: {}", status, reason))
        }
        (s, _) if s.is_server_error() => BackendError::Unavailable(format!("{}: {}", s, reason)),
        (s, _) => BackendError::Protocol(format!("{}: {}", s, reason)),
    }
}

fn routing_query(routing: Option<&str>) -> Vec<(&'static str, String)> {
    routing.map(|r| vec![("routing", r.to_string())]).unwrap_or_default()
}

#[async_trait]
impl SearchBackend for OpenSearchBackend {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        let response = self.send(self.request(Method::HEAD, &[index])?).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(self.error_for(index, response).await),
        }
    }

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<bool, BackendError> {
        let builder = self.request(Method::PUT, &[index])?.json(&json!({"mappings": mapping}));
        let response = self.send(builder).await?;
        if response.status().is_success() {
            return Ok(true);
        }
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if error_type(&body) == "resource_already_exists_exception" {
            debug!(index, "index already exists");
            return Ok(false);
        }
        Err(classify(index, status, &body))
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<(), BackendError> {
        let response = self
            .send(self.request(Method::PUT, &[index, "_mapping"])?.json(mapping))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.error_for(index, response).await)
        }
    }

    async fn get_mapping(&self, index: &str) -> Result<Option<Value>, BackendError> {
        let response = self.send(self.request(Method::GET, &[index, "_mapping"])?).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body = self.json_body(response).await?;
                Ok(body.get(index).and_then(|i| i.get("mappings")).cloned())
            }
            _ => Err(self.error_for(index, response).await),
        }
    }

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        routing: Option<&str>,
        document: &Value,
        refresh: RefreshPolicy,
    ) -> Result<(), BackendError> {
        let mut params = routing_query(routing);
        params.push(("refresh", refresh.as_param().to_string()));
        let builder = self
            .request(Method::PUT, &[index, "_doc", id])?
            .query(&params)
            .json(document);
        let response = self.send(builder).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.error_for(index, response).await)
        }
    }

    async fn get_document(&self, index: &str, id: &str, routing: Option<&str>) -> Result<Option<Value>, BackendError> {
        let builder = self
            .request(Method::GET, &[index, "_doc", id])?
            .query(&routing_query(routing));
        let response = self.send(builder).await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status == StatusCode::NOT_FOUND {
            if error_type(&body) == "index_not_found_exception" {
                return Err(BackendError::IndexNotFound(index.to_string()));
            }
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify(index, status, &body));
        }
        if body.get("found").and_then(Value::as_bool) == Some(true) {
            Ok(body.get("_source").cloned())
        } else {
            Ok(None)
        }
    }

    async fn delete_document(
        &self,
        index: &str,
        id: &str,
        routing: Option<&str>,
        refresh: RefreshPolicy,
    ) -> Result<bool, BackendError> {
        let mut params = routing_query(routing);
        params.push(("refresh", refresh.as_param().to_string()));
        let builder = self.request(Method::DELETE, &[index, "_doc", id])?.query(&params);
        let response = self.send(builder).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(self.error_for(index, response).await),
        }
    }

    async fn delete_by_query(&self, indices: &str, query: &Value) -> Result<u64, BackendError> {
        let builder = self
            .request(Method::POST, &[indices, "_delete_by_query"])?
            .query(&[
                ("conflicts", "proceed"),
                ("ignore_unavailable", "true"),
                ("allow_no_indices", "true"),
            ])
            .json(&json!({"query": query}));
        let response = self.send(builder).await?;
        if !response.status().is_success() {
            return Err(self.error_for(indices, response).await);
        }
        let body = self.json_body(response).await?;
        Ok(body.get("deleted").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError> {
        let mut body = json!({
            "query": request.query,
            "from": request.from,
            "size": request.size,
            "track_total_hits": true,
        });
        if !request.sort.is_empty() {
            body["sort"] = Value::Array(request.sort.iter().map(|s| s.to_json()).collect());
        }
        if let Some(aggs) = &request.aggregations {
            body["aggs"] = aggs.clone();
        }

        let builder = self
            .request(Method::POST, &[request.indices.as_str(), "_search"])?
            .query(&[("allow_no_indices", "true"), ("ignore_unavailable", "false")])
            .json(&body);
        let response = self.send(builder).await?;
        if !response.status().is_success() {
            return Err(self.error_for(&request.indices, response).await);
        }
        let body = self.json_body(response).await?;
        parse_search_response(&body)
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        let builder = self
            .request(Method::GET, &["_cat", "indices", pattern])?
            .query(&[("format", "json"), ("h", "index")]);
        let response = self.send(builder).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(self.error_for(pattern, response).await);
        }
        let body = self.json_body(response).await?;
        let mut names: Vec<String> = body
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|r| r.get("index").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn delete_index(&self, index: &str) -> Result<bool, BackendError> {
        let response = self.send(self.request(Method::DELETE, &[index])?).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(self.error_for(index, response).await),
        }
    }
}

fn parse_search_response(body: &Value) -> Result<SearchResponse, BackendError> {
    let hits_obj = body
        .get("hits")
        .ok_or_else(|| BackendError::Protocol("search response without hits".to_string()))?;
    let total = match hits_obj.get("total") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(t) => t.get("value").and_then(Value::as_u64).unwrap_or(0),
        None => 0,
    };
    let hits = hits_obj
        .get("hits")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|h| {
                    Some(Hit {
                        index: h.get("_index")?.as_str()?.to_string(),
                        id: h.get("_id")?.as_str()?.to_string(),
                        source: h.get("_source").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let mut skipped: Vec<String> = body
        .pointer("/_shards/failures")
        .and_then(Value::as_array)
        .map(|failures| {
            failures
                .iter()
                .filter_map(|f| f.get("index").and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    skipped.sort();
    skipped.dedup();
    if !skipped.is_empty() {
        warn!(partitions = ?skipped, "search answered from a subset of partitions");
    }

    Ok(SearchResponse {
        total,
        hits,
        aggregations: body.get("aggregations").cloned(),
        skipped_partitions: skipped,
    })
}
