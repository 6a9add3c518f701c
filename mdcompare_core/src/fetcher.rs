//! Record hydration through the composite REST endpoint.
//!
//! Identifiers are turned into one `GET` sub-request each, grouped into
//! composite calls of at most [`MAX_COMPOSITE_SUBREQUESTS`], and all calls
//! run concurrently. A single failed call fails the whole fetch.

use crate::batch::split_in_batches;
use futures::future::try_join_all;
use mdcompare_common::{AppConfig, FetchError, Record, RecordKind};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Sub-request ceiling of one composite call
pub const MAX_COMPOSITE_SUBREQUESTS: usize = 25;

/// Authenticated handle to one org
#[derive(Clone)]
pub struct OrgConnection {
    instance_url: Url,
    access_token: String,
    api_version: String,
}

impl OrgConnection {
    pub fn new(
        instance_url: &str,
        access_token: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let instance_url = Url::parse(instance_url)
            .map_err(|e| FetchError::Client(format!("Invalid instance URL {instance_url}: {e}")))?;

        Ok(Self {
            instance_url,
            access_token: access_token.into(),
            api_version: api_version.into(),
        })
    }

    pub fn instance_url(&self) -> &Url {
        &self.instance_url
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Resolve an absolute API path under the instance URL, keeping any path
    /// prefix the instance URL carries.
    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        let base = self.instance_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|e| FetchError::Client(format!("Failed to construct URL for {path}: {e}")))
    }

    fn composite_url(&self) -> Result<Url, FetchError> {
        self.endpoint(&format!("/services/data/{}/composite", self.api_version))
    }

    fn query_url(&self) -> Result<Url, FetchError> {
        self.endpoint(&format!("/services/data/{}/tooling/query", self.api_version))
    }

    fn record_path(&self, kind: &RecordKind, id: &str) -> String {
        format!(
            "/services/data/{}/tooling/sobjects/{}/{}",
            self.api_version,
            kind.as_str(),
            id
        )
    }
}

impl fmt::Debug for OrgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrgConnection")
            .field("instance_url", &self.instance_url.as_str())
            .field("access_token", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// HTTP settings for a [`DetailFetcher`]
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Sub-requests per composite call, clamped to `1..=25`
    pub batch_size: usize,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl FetcherConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct SubRequest {
    method: &'static str,
    url: String,
    #[serde(rename = "referenceId")]
    reference_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompositeRequest<'a> {
    composite_request: &'a [SubRequest],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompositeResponse {
    composite_response: Vec<SubResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubResponse {
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    http_status_code: Option<u16>,
    #[serde(default)]
    reference_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    records: Vec<QueryRecord>,
    #[serde(default)]
    next_records_url: Option<String>,
}

#[derive(Deserialize)]
struct QueryRecord {
    #[serde(rename = "Id")]
    id: String,
}

/// Hydrates record identifiers into full records
pub struct DetailFetcher {
    client: Client,
    batch_size: NonZeroUsize,
}

impl DetailFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| FetchError::Client(format!("Failed to create HTTP client: {e}")))?;

        let batch_size = config.batch_size.clamp(1, MAX_COMPOSITE_SUBREQUESTS);
        let batch_size = NonZeroUsize::new(batch_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self { client, batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// Fetch the full record for every identifier.
    ///
    /// Records come back in batch order, then sub-request order within each
    /// batch. Any failed batch discards every other batch's result.
    pub async fn fetch_details(
        &self,
        connection: &OrgConnection,
        ids: &[String],
        kind: &RecordKind,
    ) -> Result<Vec<Record>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<String> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        if unique.len() < ids.len() {
            debug!("Dropped {} repeated {} ids", ids.len() - unique.len(), kind);
        }

        let sub_requests = build_sub_requests(connection, &unique, kind);
        let batches = split_in_batches(&sub_requests, self.batch_size);
        let endpoint = connection.composite_url()?;

        info!(
            "Fetching {} {} records from {} in {} batches",
            unique.len(),
            kind,
            connection.instance_url(),
            batches.len()
        );

        let calls = batches
            .iter()
            .enumerate()
            .map(|(index, batch)| self.send_batch(connection, &endpoint, index, batch));
        let results = try_join_all(calls).await?;

        let records: Vec<Record> = results.into_iter().flatten().collect();
        debug!("Hydrated {} {} records", records.len(), kind);
        Ok(records)
    }

    async fn send_batch(
        &self,
        connection: &OrgConnection,
        endpoint: &Url,
        batch: usize,
        sub_requests: &[SubRequest],
    ) -> Result<Vec<Record>, FetchError> {
        debug!("Sending batch {} with {} sub-requests", batch, sub_requests.len());

        let response = self
            .client
            .post(endpoint.clone())
            .bearer_auth(&connection.access_token)
            .json(&CompositeRequest {
                composite_request: sub_requests,
            })
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                batch,
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| FetchError::Transport {
            batch,
            message: e.to_string(),
        })?;

        if !status.is_success() {
            warn!("Batch {} failed with HTTP {}", batch, status.as_u16());
            return Err(FetchError::Status {
                batch,
                status: status.as_u16(),
                body: text,
            });
        }

        parse_composite_response(batch, sub_requests, &text)
    }

    /// List every record identifier of `kind` through the tooling query API,
    /// following pagination.
    pub async fn list_record_ids(
        &self,
        connection: &OrgConnection,
        kind: &RecordKind,
    ) -> Result<Vec<String>, FetchError> {
        let soql = format!("SELECT Id FROM {}", kind.as_str());
        let mut request = self
            .client
            .get(connection.query_url()?)
            .query(&[("q", soql.as_str())]);
        let mut ids = Vec::new();

        loop {
            let response = request
                .bearer_auth(&connection.access_token)
                .send()
                .await
                .map_err(|e| FetchError::QueryTransport(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| FetchError::QueryTransport(e.to_string()))?;

            if !status.is_success() {
                warn!("Listing {} records failed with HTTP {}", kind, status.as_u16());
                return Err(FetchError::Query {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let page: QueryResponse = serde_json::from_str(&text)
                .map_err(|e| FetchError::QueryMalformed(e.to_string()))?;
            ids.extend(page.records.into_iter().map(|record| record.id));

            match page.next_records_url {
                Some(next) => request = self.client.get(connection.endpoint(&next)?),
                None => break,
            }
        }

        info!("Listed {} {} records on {}", ids.len(), kind, connection.instance_url());
        Ok(ids)
    }
}

fn build_sub_requests(
    connection: &OrgConnection,
    ids: &[String],
    kind: &RecordKind,
) -> Vec<SubRequest> {
    ids.iter()
        .map(|id| SubRequest {
            method: "GET",
            url: connection.record_path(kind, id),
            reference_id: id.clone(),
        })
        .collect()
}

/// Match every sub-response to its sub-request by reference id.
///
/// Records come back in sub-request order. A response that leaves out a
/// sub-request, repeats one, or answers one that was never sent is malformed.
fn parse_composite_response(
    batch: usize,
    sub_requests: &[SubRequest],
    text: &str,
) -> Result<Vec<Record>, FetchError> {
    let malformed = |message: String| FetchError::Malformed { batch, message };

    let response: CompositeResponse =
        serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;

    if response.composite_response.len() != sub_requests.len() {
        return Err(malformed(format!(
            "expected {} sub-responses, got {}",
            sub_requests.len(),
            response.composite_response.len()
        )));
    }

    let positions: HashMap<&str, usize> = sub_requests
        .iter()
        .enumerate()
        .map(|(position, sub)| (sub.reference_id.as_str(), position))
        .collect();
    let mut records: Vec<Option<Record>> = vec![None; sub_requests.len()];

    for sub in response.composite_response {
        let reference_id = sub
            .reference_id
            .ok_or_else(|| malformed("sub-response without referenceId".to_string()))?;

        if let Some(status) = sub.http_status_code {
            if !(200..300).contains(&status) {
                return Err(FetchError::SubRequest {
                    batch,
                    reference_id,
                    status,
                    body: sub.body.map(|body| body.to_string()).unwrap_or_default(),
                });
            }
        }

        let position = *positions
            .get(reference_id.as_str())
            .ok_or_else(|| malformed(format!("unexpected sub-response {reference_id}")))?;
        let record = sub
            .body
            .map(Record::new)
            .ok_or_else(|| malformed(format!("sub-response {reference_id} has no body")))?;

        if records[position].replace(record).is_some() {
            return Err(malformed(format!("duplicate sub-response {reference_id}")));
        }
    }

    // Equal counts with no duplicates leave no slot empty.
    records
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| malformed("sub-response missing".to_string()))
}
