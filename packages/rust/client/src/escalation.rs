//! Size-escalation retry loop on top of the create/download protocol.
//!
//! The server silently truncates result lists to the requested page size.
//! When a download comes back with at least as many rows as were requested,
//! the loop doubles the size hint and recreates the list, until the result
//! stops growing or the attempt budget runs out. A query with no explicit
//! size hint never escalates: one round, whatever the server returns.

use serde_json::Value;
use tracing::{info, warn};

use biokb_shared::{ListRequest, Result, SearchFilter};
use biokb_tabular::ResultTable;

use crate::BkbClient;

// ---------------------------------------------------------------------------
// EscalationState
// ---------------------------------------------------------------------------

/// Loop-local retry state, threaded through one fetch and then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationState {
    /// Page-size hint for the current round; `None` means server default.
    pub size: Option<u64>,
    /// Escalation rounds consumed so far.
    pub attempts: u32,
    /// Row count of the previous round, for the anti-thrash guard.
    pub previous_row_count: Option<usize>,
}

impl EscalationState {
    fn new(initial_size: Option<u64>) -> Self {
        Self {
            size: initial_size,
            attempts: 0,
            previous_row_count: None,
        }
    }

    fn size_label(&self) -> String {
        self.size
            .map_or_else(|| "auto".to_string(), |s| s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Escalating fetch
// ---------------------------------------------------------------------------

impl BkbClient {
    /// Create a list and download it, retrying with larger page sizes when
    /// the row count suggests truncation.
    ///
    /// `payload_factory` builds the search body for a given size hint and
    /// must omit the size field when the hint is `None`. Transport, protocol,
    /// and parse failures are terminal for the whole operation; an empty
    /// table is a successful result.
    pub async fn fetch_with_escalation<F>(
        &self,
        payload_factory: F,
        description: &str,
        expect_label: &str,
        initial_size: Option<u64>,
        max_attempts: u32,
    ) -> Result<ResultTable>
    where
        F: Fn(Option<u64>) -> Value,
    {
        let mut state = EscalationState::new(initial_size);

        loop {
            info!(description, size = %state.size_label(), "creating search list");
            let request = ListRequest::new(payload_factory(state.size), description);
            let list_id = self.create_list(&request).await?;

            info!(%list_id, "downloading list data");
            let table = self.download_list(&list_id, expect_label).await?;

            warn_if_truncated(&table, state.size);
            let rows = table.row_count();
            info!(rows, description, "retrieved rows");

            // No explicit size: the server chose the page, nothing to escalate.
            let Some(size) = state.size else {
                return Ok(table);
            };

            if rows == 0 || (rows as u64) < size {
                return Ok(table);
            }

            if state.previous_row_count == Some(rows) {
                warn!(
                    rows,
                    "received the same row count on consecutive attempts; assuming the dataset is complete"
                );
                return Ok(table);
            }

            state.attempts += 1;
            if state.attempts >= max_attempts {
                warn!(
                    attempts = state.attempts,
                    "reached the maximum number of size escalation attempts; proceeding with the most recent download"
                );
                return Ok(table);
            }

            state.previous_row_count = Some(rows);
            state.size = Some(size * 2);
            warn!(
                rows,
                next_size = size * 2,
                "row count matches the requested page size; retrying with a larger size"
            );
        }
    }

    /// Escalating fetch for one [`SearchFilter`], the common entry point for
    /// the drivers.
    pub async fn fetch(
        &self,
        filter: &SearchFilter,
        initial_size: Option<u64>,
        max_attempts: u32,
    ) -> Result<ResultTable> {
        let description = filter.description();
        self.fetch_with_escalation(
            |size| filter.payload(size),
            &description,
            filter.term(),
            initial_size,
            max_attempts,
        )
        .await
    }
}

/// Log a warning when the row count suggests the server truncated the list.
fn warn_if_truncated(table: &ResultTable, page_hint: Option<u64>) {
    let Some(hint) = page_hint else {
        return;
    };
    if table.is_empty() {
        return;
    }
    if table.row_count() as u64 >= hint {
        warn!(
            rows = table.row_count(),
            page_hint = hint,
            "retrieved rows match or exceed the requested page size; results may be truncated"
        );
    }
}

#[cfg(test)]
mod escalation_tests {
    use super::*;
    use biokb_shared::{BioKbError, FetchConfig};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::{DOWNLOAD_PATH, SEARCH_PATH};

    fn test_config(base_url: &str) -> FetchConfig {
        FetchConfig {
            base_url: base_url.to_string(),
            create_timeout: Duration::from_secs(5),
            download_timeout: Duration::from_secs(5),
        }
    }

    fn csv_with_rows(n: usize) -> String {
        let mut body = String::from("biomarker_id,name\n");
        for i in 0..n {
            body.push_str(&format!("A{i},marker-{i}\n"));
        }
        body
    }

    async fn mount_create(server: &MockServer, list_id: &str) {
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"list_id": list_id})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn no_size_hint_means_exactly_one_round() {
        let server = MockServer::start().await;
        mount_create(&server, "one-round").await;

        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(csv_with_rows(7)))
            .expect(1)
            .mount(&server)
            .await;

        let client = BkbClient::new(test_config(&server.uri())).unwrap();
        let filter = SearchFilter::Entity("Albumin".into());
        let table = client.fetch(&filter, None, 4).await.unwrap();
        assert_eq!(table.row_count(), 7);

        // The expect(1) on the download mock verifies no second round ran.
        server.verify().await;
    }

    #[tokio::test]
    async fn partial_page_completes_in_one_round() {
        let server = MockServer::start().await;
        mount_create(&server, "albumin-list").await;

        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(csv_with_rows(3_200)))
            .expect(1)
            .mount(&server)
            .await;

        let client = BkbClient::new(test_config(&server.uri())).unwrap();
        let filter = SearchFilter::Entity("Albumin".into());
        let table = client.fetch(&filter, Some(10_000), 4).await.unwrap();
        assert_eq!(table.row_count(), 3_200);

        server.verify().await;
    }

    #[tokio::test]
    async fn full_pages_escalate_until_max_attempts() {
        let server = MockServer::start().await;

        // Each round requests a doubled size and the server fills the page
        // exactly, so the loop must stop at max_attempts with the last table.
        for size in [2u64, 4, 8] {
            Mock::given(method("POST"))
                .and(path(SEARCH_PATH))
                .and(body_partial_json(json!({"size": size})))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({"list_id": format!("list-{size}")})),
                )
                .expect(1)
                .mount(&server)
                .await;

            Mock::given(method("POST"))
                .and(path(DOWNLOAD_PATH))
                .and(body_partial_json(json!({"id": format!("list-{size}")})))
                .respond_with(
                    ResponseTemplate::new(200).set_body_string(csv_with_rows(size as usize)),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = BkbClient::new(test_config(&server.uri())).unwrap();
        let filter = SearchFilter::RecordType("biomarker".into());
        let table = client.fetch(&filter, Some(2), 3).await.unwrap();

        // Round 3 hits the attempt budget and returns its table as the best
        // available approximation.
        assert_eq!(table.row_count(), 8);
        server.verify().await;
    }

    #[tokio::test]
    async fn stops_when_growth_stalls_below_doubled_size() {
        let server = MockServer::start().await;
        mount_create(&server, "muc16-list").await;

        // Round 1: request 4, get 4 (full page). Round 2: request 8, get 4
        // again — strictly fewer than requested, so the loop completes.
        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(csv_with_rows(4)))
            .expect(2)
            .mount(&server)
            .await;

        let client = BkbClient::new(test_config(&server.uri())).unwrap();
        let filter = SearchFilter::Entity("MUC16".into());
        let table = client.fetch(&filter, Some(4), 4).await.unwrap();
        assert_eq!(table.row_count(), 4);

        server.verify().await;
    }

    #[tokio::test]
    async fn anti_thrash_guard_stops_unresponsive_size_parameter() {
        let server = MockServer::start().await;
        mount_create(&server, "capped-list").await;

        // The server ignores the size parameter and always returns 5 rows.
        // Round 1: requested 2, got 5 (≥ 2) → escalate. Round 2: requested 4,
        // got 5 again → identical consecutive counts, stop early even though
        // the attempt budget is far from exhausted.
        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(csv_with_rows(5)))
            .expect(2)
            .mount(&server)
            .await;

        let client = BkbClient::new(test_config(&server.uri())).unwrap();
        let filter = SearchFilter::Specimen("serum".into());
        let table = client.fetch(&filter, Some(2), 10).await.unwrap();
        assert_eq!(table.row_count(), 5);

        server.verify().await;
    }

    #[tokio::test]
    async fn creation_failure_mid_escalation_is_terminal() {
        let server = MockServer::start().await;

        // First round succeeds with a full page; the second creation 500s.
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"list_id": "l1"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(csv_with_rows(2)))
            .mount(&server)
            .await;

        let client = BkbClient::new(test_config(&server.uri())).unwrap();
        let filter = SearchFilter::Entity("Albumin".into());
        let err = client.fetch(&filter, Some(2), 4).await.unwrap_err();
        assert!(matches!(err, BioKbError::Transport(_)));
    }

    #[tokio::test]
    async fn empty_download_is_success_not_failure() {
        let server = MockServer::start().await;
        mount_create(&server, "empty-list").await;

        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;

        let client = BkbClient::new(test_config(&server.uri())).unwrap();
        let filter = SearchFilter::Entity("Unknown marker".into());
        let table = client.fetch(&filter, Some(10_000), 4).await.unwrap();
        assert!(table.is_empty());

        server.verify().await;
    }
}
