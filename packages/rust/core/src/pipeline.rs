//! End-to-end enrichment: input terms → escalating fetches → combined CSV.
//!
//! Queries run strictly one at a time; a failed or empty query becomes a
//! placeholder row and the batch continues with the next term.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use biokb_client::BkbClient;
use biokb_shared::{BioKbError, Result, SearchFilter};
use biokb_tabular::{ResultTable, read_column, write_csv};

/// Column added to every output row naming the query that produced it.
pub const QUERY_COLUMN: &str = "query_biomarker";

/// Column carrying the placeholder text for queries without data rows.
pub const PLACEHOLDER_COLUMN: &str = "biomarker_canonical_id";

/// Placeholder for queries whose download succeeded but yielded nothing.
pub const NO_DATA_PLACEHOLDER: &str = "No data found";

/// Placeholder for queries whose list creation or download failed upstream.
pub const FETCH_FAILED_PLACEHOLDER: &str = "Fetch failed";

// ---------------------------------------------------------------------------
// Configs and summaries
// ---------------------------------------------------------------------------

/// Configuration for the per-entity enrichment run.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Input CSV holding the query terms.
    pub input: PathBuf,
    /// Name of the input column to read terms from.
    pub column: String,
    /// Output CSV for the combined results.
    pub output: PathBuf,
    /// Starting page-size hint per query.
    pub initial_size: Option<u64>,
    /// Escalation attempt budget per query.
    pub max_attempts: u32,
}

/// Outcome counts for a completed enrichment run.
#[derive(Debug)]
pub struct EnrichSummary {
    /// Number of query terms processed.
    pub total: usize,
    /// Queries that produced at least one data row.
    pub with_data: usize,
    /// Queries that downloaded successfully but yielded nothing.
    pub empty: usize,
    /// Queries whose creation or download failed.
    pub failed: usize,
    /// Rows in the combined output table (including placeholders).
    pub output_rows: usize,
    /// Columns in the combined output table.
    pub output_columns: usize,
    /// Where the output was written.
    pub output_path: PathBuf,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Configuration for a single broad scan (record type or specimen).
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// The filter to scan for.
    pub filter: SearchFilter,
    /// Output CSV path.
    pub output: PathBuf,
    /// Starting page-size hint.
    pub initial_size: Option<u64>,
    /// Escalation attempt budget.
    pub max_attempts: u32,
}

/// Outcome of a completed scan.
#[derive(Debug)]
pub struct ScanSummary {
    /// Rows retrieved.
    pub rows: usize,
    /// Columns retrieved.
    pub columns: usize,
    /// Where the output was written (untouched when no data was found).
    pub output_path: PathBuf,
    /// Whether an output file was written.
    pub wrote_output: bool,
    /// Total elapsed time.
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// How a single query ended.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// Data rows were appended to the output.
    Rows(usize),
    /// The download succeeded but the list was empty.
    Empty,
    /// List creation or download failed; the batch continues.
    Failed(String),
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a query term starts processing.
    fn query_started(&self, term: &str, current: usize, total: usize);
    /// Called when a query term finishes.
    fn query_finished(&self, term: &str, outcome: &QueryOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn query_started(&self, _term: &str, _current: usize, _total: usize) {}
    fn query_finished(&self, _term: &str, _outcome: &QueryOutcome) {}
}

// ---------------------------------------------------------------------------
// Enrichment run
// ---------------------------------------------------------------------------

/// Run the per-entity enrichment loop.
///
/// Reads the query column, fetches each biomarker name one at a time, tags
/// result rows with the source query, substitutes placeholder rows for empty
/// or failed queries, and writes the combined table.
#[instrument(skip_all, fields(input = %config.input.display()))]
pub async fn run_enrichment(
    client: &BkbClient,
    config: &EnrichConfig,
    progress: &dyn ProgressReporter,
) -> Result<EnrichSummary> {
    let start = Instant::now();

    progress.phase("Reading input terms");
    let terms = read_column(&config.input, &config.column)?;
    if terms.is_empty() {
        return Err(BioKbError::validation(format!(
            "input file {} has no query terms in column '{}'",
            config.input.display(),
            config.column
        )));
    }

    info!(terms = terms.len(), "starting enrichment");

    let total = terms.len();
    let mut parts: Vec<ResultTable> = Vec::with_capacity(total);
    let mut with_data = 0usize;
    let mut empty = 0usize;
    let mut failed = 0usize;

    for (i, term) in terms.iter().enumerate() {
        progress.query_started(term, i + 1, total);
        let filter = SearchFilter::Entity(term.clone());

        match client
            .fetch(&filter, config.initial_size, config.max_attempts)
            .await
        {
            Ok(mut table) if !table.is_empty() => {
                with_data += 1;
                table.push_constant_column(QUERY_COLUMN, term);
                progress.query_finished(term, &QueryOutcome::Rows(table.row_count()));
                parts.push(table);
            }
            Ok(_) => {
                empty += 1;
                progress.query_finished(term, &QueryOutcome::Empty);
                parts.push(placeholder_row(term, NO_DATA_PLACEHOLDER));
            }
            Err(e) => {
                failed += 1;
                warn!(term, error = %e, "fetch failed, continuing with next query");
                progress.query_finished(term, &QueryOutcome::Failed(e.to_string()));
                parts.push(placeholder_row(term, FETCH_FAILED_PLACEHOLDER));
            }
        }
    }

    progress.phase("Combining results");
    let combined = ResultTable::concat(&parts);

    progress.phase("Writing output");
    write_csv(&config.output, &combined)?;

    let summary = EnrichSummary {
        total,
        with_data,
        empty,
        failed,
        output_rows: combined.row_count(),
        output_columns: combined.headers.len(),
        output_path: config.output.clone(),
        elapsed: start.elapsed(),
    };

    info!(
        total = summary.total,
        with_data = summary.with_data,
        empty = summary.empty,
        failed = summary.failed,
        output_rows = summary.output_rows,
        elapsed_ms = summary.elapsed.as_millis(),
        "enrichment complete"
    );

    Ok(summary)
}

/// A one-row table marking a query that produced no data rows.
fn placeholder_row(term: &str, message: &str) -> ResultTable {
    ResultTable {
        headers: vec![QUERY_COLUMN.to_string(), PLACEHOLDER_COLUMN.to_string()],
        rows: vec![vec![term.to_string(), message.to_string()]],
    }
}

// ---------------------------------------------------------------------------
// Scan run
// ---------------------------------------------------------------------------

/// Run a single broad scan for a record type or specimen.
///
/// Unlike the enrichment loop there is only one logical query, so a fetch
/// failure is terminal. No output file is written when the scan comes back
/// empty.
#[instrument(skip_all, fields(filter = %config.filter.description()))]
pub async fn run_scan(
    client: &BkbClient,
    config: &ScanConfig,
    progress: &dyn ProgressReporter,
) -> Result<ScanSummary> {
    let start = Instant::now();

    progress.phase(&format!("Fetching {}", config.filter.description()));
    let table = client
        .fetch(&config.filter, config.initial_size, config.max_attempts)
        .await?;

    if table.is_empty() {
        info!(filter = %config.filter.description(), "no data found for scan");
        return Ok(ScanSummary {
            rows: 0,
            columns: 0,
            output_path: config.output.clone(),
            wrote_output: false,
            elapsed: start.elapsed(),
        });
    }

    progress.phase("Writing output");
    write_csv(&config.output, &table)?;

    let summary = ScanSummary {
        rows: table.row_count(),
        columns: table.headers.len(),
        output_path: config.output.clone(),
        wrote_output: true,
        elapsed: start.elapsed(),
    };

    info!(
        rows = summary.rows,
        columns = summary.columns,
        elapsed_ms = summary.elapsed.as_millis(),
        "scan complete"
    );

    Ok(summary)
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use biokb_shared::FetchConfig;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SEARCH_PATH: &str = "/biomarker/search";
    const DOWNLOAD_PATH: &str = "/data/list_download";

    fn test_client(base_url: &str) -> BkbClient {
        BkbClient::new(FetchConfig {
            base_url: base_url.to_string(),
            create_timeout: std::time::Duration::from_secs(5),
            download_timeout: std::time::Duration::from_secs(5),
        })
        .unwrap()
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("biokb-pipeline-{}-{name}", std::process::id()))
    }

    async fn mount_entity(server: &MockServer, term: &str, list_id: &str, body: &str) {
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .and(body_partial_json(json!({"biomarker_entity_name": term})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"list_id": list_id})))
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .and(body_partial_json(json!({"id": list_id})))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn enrichment_combines_data_and_placeholders() {
        let server = MockServer::start().await;

        mount_entity(
            &server,
            "Albumin",
            "albumin-list",
            "biomarker_canonical_id,name\nA0001,Albumin serum\nA0002,Albumin CSF\n",
        )
        .await;
        mount_entity(&server, "NothingMarker", "empty-list", "").await;

        // The third term's list creation fails outright.
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .and(body_partial_json(json!({"biomarker_entity_name": "BrokenMarker"})))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let input = temp_path("enrich-input.csv");
        let output = temp_path("enrich-output.csv");
        std::fs::write(&input, "BioMarker\nAlbumin\nNothingMarker\nBrokenMarker\n").unwrap();

        let client = test_client(&server.uri());
        let config = EnrichConfig {
            input: input.clone(),
            column: "BioMarker".into(),
            output: output.clone(),
            initial_size: Some(10_000),
            max_attempts: 4,
        };

        let summary = run_enrichment(&client, &config, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.with_data, 1);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.failed, 1);
        // Two data rows plus one placeholder per non-data query.
        assert_eq!(summary.output_rows, 4);

        let written = ResultTable::from_csv(&std::fs::read_to_string(&output).unwrap()).unwrap();
        let query_idx = written
            .headers
            .iter()
            .position(|h| h == QUERY_COLUMN)
            .unwrap();
        let id_idx = written
            .headers
            .iter()
            .position(|h| h == PLACEHOLDER_COLUMN)
            .unwrap();

        assert!(
            written
                .rows
                .iter()
                .any(|r| r[query_idx] == "Albumin" && r[id_idx] == "A0001")
        );
        assert!(
            written
                .rows
                .iter()
                .any(|r| r[query_idx] == "NothingMarker" && r[id_idx] == NO_DATA_PLACEHOLDER)
        );
        assert!(
            written
                .rows
                .iter()
                .any(|r| r[query_idx] == "BrokenMarker" && r[id_idx] == FETCH_FAILED_PLACEHOLDER)
        );

        let _ = std::fs::remove_file(&input);
        let _ = std::fs::remove_file(&output);
    }

    #[tokio::test]
    async fn enrichment_rejects_empty_term_list() {
        let server = MockServer::start().await;
        let input = temp_path("empty-input.csv");
        let output = temp_path("unused-output.csv");
        std::fs::write(&input, "BioMarker\n\n").unwrap();

        let client = test_client(&server.uri());
        let config = EnrichConfig {
            input: input.clone(),
            column: "BioMarker".into(),
            output,
            initial_size: Some(10_000),
            max_attempts: 4,
        };

        let err = run_enrichment(&client, &config, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BioKbError::Validation { .. }));

        let _ = std::fs::remove_file(&input);
    }

    #[tokio::test]
    async fn scan_writes_results_to_output() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .and(body_partial_json(json!({"record_type": "biomarker"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"list_id": "rt-list"})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("id,record_type\nA1,biomarker\n"),
            )
            .mount(&server)
            .await;

        let output = temp_path("scan-output.csv");
        let client = test_client(&server.uri());
        let config = ScanConfig {
            filter: SearchFilter::RecordType("biomarker".into()),
            output: output.clone(),
            initial_size: Some(50_000),
            max_attempts: 4,
        };

        let summary = run_scan(&client, &config, &SilentProgress).await.unwrap();
        assert_eq!(summary.rows, 1);
        assert!(summary.wrote_output);
        assert!(output.exists());

        let _ = std::fs::remove_file(&output);
    }

    #[tokio::test]
    async fn scan_with_no_data_writes_nothing() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"list_id": "empty"})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let output = temp_path("scan-empty-output.csv");
        let client = test_client(&server.uri());
        let config = ScanConfig {
            filter: SearchFilter::Specimen("cerebrospinal fluid".into()),
            output: output.clone(),
            initial_size: Some(50_000),
            max_attempts: 4,
        };

        let summary = run_scan(&client, &config, &SilentProgress).await.unwrap();
        assert_eq!(summary.rows, 0);
        assert!(!summary.wrote_output);
        assert!(!output.exists());
    }
}
