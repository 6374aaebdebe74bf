//! HTTP client for the BiomarkerKB list API.
//!
//! The API works in two steps: a search request creates a temporary
//! server-side list and returns an opaque `list_id`, and a download request
//! materialises that list as tabular data. Downloads ask for CSV first and
//! fall back to JSON when the CSV body cannot be parsed.
//!
//! The size-escalation retry loop on top of these two calls lives in
//! [`escalation`].

mod escalation;

use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use biokb_shared::{BioKbError, FetchConfig, ListRequest, Result};
use biokb_tabular::ResultTable;

pub use escalation::EscalationState;

/// Path of the list-creation endpoint.
pub const SEARCH_PATH: &str = "/biomarker/search";

/// Path of the list-download endpoint.
pub const DOWNLOAD_PATH: &str = "/data/list_download";

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("BioKbEnrich/", env!("CARGO_PKG_VERSION"));

/// Maximum number of body characters quoted in protocol errors.
const SNIPPET_LEN: usize = 500;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// The subset of the search response we rely on. Other fields are ignored.
#[derive(Debug, Deserialize)]
struct CreateListResponse {
    #[serde(default)]
    list_id: Option<String>,
}

/// Body of a list-download request.
#[derive(Debug, Serialize)]
struct DownloadRequest<'a> {
    id: &'a str,
    download_type: &'static str,
    format: &'static str,
    compressed: bool,
}

/// Formats the download endpoint can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadFormat {
    Csv,
    Json,
}

impl DownloadFormat {
    fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    fn accept(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
        }
    }
}

// ---------------------------------------------------------------------------
// BkbClient
// ---------------------------------------------------------------------------

/// Thin client for the BiomarkerKB HTTP API.
///
/// All calls are sequential and blocking on their own timeout; there is no
/// retry on transport failure. The only retries in the system are the size
/// escalation loop and the single CSV→JSON format fallback.
pub struct BkbClient {
    http: reqwest::Client,
    config: FetchConfig,
}

impl BkbClient {
    /// Create a new client against the configured API base URL.
    pub fn new(config: FetchConfig) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            BioKbError::config(format!("invalid API base URL '{}': {e}", config.base_url))
        })?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BioKbError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// The API base URL this client targets.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Create a server-side list and return its identifier.
    ///
    /// The identifier is only valid for an immediately following download;
    /// a response without a `list_id` field is a protocol violation.
    pub async fn create_list(&self, request: &ListRequest) -> Result<String> {
        let url = self.endpoint(SEARCH_PATH);
        debug!(%url, description = %request.description, "creating list");

        let response = self
            .http
            .post(&url)
            .timeout(self.config.create_timeout)
            .header(ACCEPT, "application/json")
            .json(&request.payload)
            .send()
            .await
            .map_err(|e| {
                BioKbError::Transport(format!(
                    "search request failed for {}: {e}",
                    request.description
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BioKbError::Transport(format!(
                "search request failed for {}: HTTP {status}",
                request.description
            )));
        }

        let body = response.text().await.map_err(|e| {
            BioKbError::Transport(format!(
                "search response body read failed for {}: {e}",
                request.description
            ))
        })?;

        let parsed: CreateListResponse = serde_json::from_str(&body).map_err(|_| {
            BioKbError::protocol(format!(
                "non-JSON payload from search endpoint (status {status}): {:?}",
                snippet(&body)
            ))
        })?;

        match parsed.list_id {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(BioKbError::protocol(format!(
                "search response for {} did not contain a 'list_id'",
                request.description
            ))),
        }
    }

    /// Download a previously created list and materialise it as a table.
    ///
    /// Requests CSV first. An HTTP-successful body that is empty or carries
    /// no data rows beyond a header is an explicitly empty table. A CSV
    /// parse failure triggers one JSON download of the same list id; any
    /// failure in that fallback is terminal.
    pub async fn download_list(&self, list_id: &str, expect_label: &str) -> Result<ResultTable> {
        let text = self.download_body(list_id, DownloadFormat::Csv).await?;

        if text.is_empty() || text.lines().count() <= 1 {
            return Ok(ResultTable::empty());
        }

        match ResultTable::from_csv(&text) {
            Ok(table) => Ok(table),
            Err(BioKbError::Parse { message }) => {
                warn!(
                    %list_id,
                    expect_label,
                    error = %message,
                    "CSV parsing failed, falling back to JSON download"
                );
                let json_text = self.download_body(list_id, DownloadFormat::Json).await?;
                ResultTable::from_json_records(&json_text)
            }
            Err(other) => Err(other),
        }
    }

    /// POST the download request and return the raw body text.
    async fn download_body(&self, list_id: &str, format: DownloadFormat) -> Result<String> {
        let url = self.endpoint(DOWNLOAD_PATH);
        let request = DownloadRequest {
            id: list_id,
            download_type: "biomarker_list",
            format: format.as_str(),
            compressed: false,
        };

        let response = self
            .http
            .post(&url)
            .timeout(self.config.download_timeout)
            .header(ACCEPT, format.accept())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                BioKbError::Transport(format!("data download failed for list {list_id}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BioKbError::Transport(format!(
                "data download failed for list {list_id}: HTTP {status}"
            )));
        }

        response.text().await.map_err(|e| {
            BioKbError::Transport(format!("download body read failed for list {list_id}: {e}"))
        })
    }
}

/// Truncate a response body for inclusion in an error message.
fn snippet(body: &str) -> &str {
    if body.len() <= SNIPPET_LEN {
        return body;
    }
    let mut end = SNIPPET_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
