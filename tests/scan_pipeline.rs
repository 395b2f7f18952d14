use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use unsub::config::AppDefaults;
use unsub::errors::{AppError, AppResult};
use unsub::gmail::{MailApi, MessageHeader, MessageList, MessageMetadata, MessagePayload, MessageRef};
use unsub::scan::Scanner;
use unsub::types::ScanProgress;

/// Serves scripted list pages in order and detail responses by id; panics on
/// requests the script did not anticipate.
struct FakeApi {
    pages: Mutex<VecDeque<AppResult<MessageList>>>,
    details: Mutex<HashMap<String, AppResult<MessageMetadata>>>,
}

impl FakeApi {
    fn new(pages: Vec<AppResult<MessageList>>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().collect()),
            details: Mutex::new(HashMap::new()),
        }
    }

    fn with_detail(self, id: &str, detail: AppResult<MessageMetadata>) -> Self {
        self.details.lock().unwrap().insert(id.to_string(), detail);
        self
    }
}

#[async_trait]
impl MailApi for FakeApi {
    async fn list_page(
        &self,
        _token: &str,
        _query: &str,
        _page_size: u32,
        _page_token: Option<&str>,
    ) -> AppResult<MessageList> {
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .expect("list_page called more often than scripted")
    }

    async fn message_metadata(&self, _token: &str, id: &str) -> AppResult<MessageMetadata> {
        self.details
            .lock()
            .unwrap()
            .remove(id)
            .unwrap_or_else(|| panic!("unscripted detail fetch for {id}"))
    }
}

fn page(ids: &[&str], next: Option<&str>) -> AppResult<MessageList> {
    Ok(MessageList {
        messages: ids
            .iter()
            .map(|id| MessageRef { id: id.to_string() })
            .collect(),
        next_page_token: next.map(|s| s.to_string()),
    })
}

fn metadata(headers: &[(&str, &str)]) -> AppResult<MessageMetadata> {
    Ok(MessageMetadata {
        payload: Some(MessagePayload {
            headers: headers
                .iter()
                .map(|(name, value)| MessageHeader {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }),
        internal_date: Some("1700000000000".to_string()),
    })
}

fn candidate_metadata(from: &str) -> AppResult<MessageMetadata> {
    metadata(&[
        ("From", from),
        ("Subject", "weekly digest"),
        ("List-Unsubscribe", "<https://example.com/unsub>"),
    ])
}

fn defaults(result_cap: usize, batch_size: usize) -> AppDefaults {
    AppDefaults {
        result_cap,
        page_size: 100,
        batch_size,
        search_query: "unsubscribe".to_string(),
        request_timeout: Duration::from_secs(5),
        settle_delay: Duration::from_millis(1),
        pacing_delay: Duration::from_millis(1),
        cleanup_delay: Duration::from_millis(1),
    }
}

async fn run_scan(
    api: &FakeApi,
    defaults: &AppDefaults,
) -> (AppResult<Vec<unsub::types::ParsedMessage>>, Vec<ScanProgress>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let result = Scanner::new(api, defaults)
        .fetch_candidates("token", &tx, &cancel)
        .await;
    drop(tx);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (result, events)
}

#[tokio::test]
async fn discovery_follows_continuation_tokens_and_reports_running_totals() {
    let api = FakeApi::new(vec![
        page(&["m1", "m2"], Some("t1")),
        page(&["m3"], None),
    ])
    .with_detail("m1", candidate_metadata("a@one.com"))
    .with_detail("m2", candidate_metadata("a@one.com"))
    .with_detail("m3", candidate_metadata("b@two.com"));

    let (result, events) = run_scan(&api, &defaults(500, 20)).await;
    let messages = result.expect("scan should succeed");
    assert_eq!(messages.len(), 3);

    let listing: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ScanProgress::Listing { count } => Some(*count),
            _ => None,
        })
        .collect();
    assert_eq!(listing, vec![2, 3]);
}

#[tokio::test]
async fn batches_report_attempted_counts_not_retained_ones() {
    let ids = ["m1", "m2", "m3", "m4", "m5"];
    let mut api = FakeApi::new(vec![page(&ids, None)]);
    for id in ids {
        // m3 carries no unsubscribe header and is dropped, yet still counts
        // toward the progress totals.
        let detail = if id == "m3" {
            metadata(&[("From", "c@three.com"), ("Subject", "hi")])
        } else {
            candidate_metadata("a@one.com")
        };
        api = api.with_detail(id, detail);
    }

    let (result, events) = run_scan(&api, &defaults(500, 2)).await;
    let messages = result.expect("scan should succeed");
    assert_eq!(messages.len(), 4);

    let fetching: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            ScanProgress::Fetching { current, total } => Some((*current, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(fetching, vec![(2, 5), (4, 5), (5, 5)]);
}

#[tokio::test]
async fn result_cap_is_a_soft_stop_for_discovery() {
    // The cap is reached mid-pagination; the final page may overshoot it and
    // no further page is requested (the fake would panic if one were).
    let api = FakeApi::new(vec![
        page(&["m1", "m2"], Some("t1")),
        page(&["m3", "m4"], Some("t2")),
    ])
    .with_detail("m1", candidate_metadata("a@one.com"))
    .with_detail("m2", candidate_metadata("a@one.com"))
    .with_detail("m3", candidate_metadata("a@one.com"))
    .with_detail("m4", candidate_metadata("a@one.com"));

    let (result, _) = run_scan(&api, &defaults(3, 20)).await;
    assert_eq!(result.expect("scan should succeed").len(), 4);
}

#[tokio::test]
async fn discovery_failure_aborts_the_scan_with_no_partial_result() {
    let api = FakeApi::new(vec![
        page(&["m1"], Some("t1")),
        Err(AppError::Discovery("status 500".to_string())),
    ]);

    let (result, _) = run_scan(&api, &defaults(500, 20)).await;
    assert!(matches!(result, Err(AppError::Discovery(_))));
}

#[tokio::test]
async fn failed_detail_fetches_are_dropped_without_failing_the_scan() {
    let api = FakeApi::new(vec![page(&["m1", "m2", "m3"], None)])
        .with_detail("m1", candidate_metadata("a@one.com"))
        .with_detail("m2", Err(AppError::Network("status 404".to_string())))
        .with_detail("m3", candidate_metadata("b@two.com"));

    let (result, _) = run_scan(&api, &defaults(500, 20)).await;
    let messages = result.expect("scan should succeed");
    let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"m1"));
    assert!(ids.contains(&"m3"));
}

#[tokio::test]
async fn retained_messages_carry_parsed_sender_and_flags() {
    let api = FakeApi::new(vec![page(&["m1"], None)]).with_detail(
        "m1",
        metadata(&[
            ("From", "\"Acme News\" <News@Acme.COM>"),
            ("Subject", "sale"),
            ("List-Unsubscribe", "<https://acme.com/u>, <mailto:u@acme.com>"),
            ("List-Unsubscribe-Post", "List-Unsubscribe=One-Click"),
        ]),
    );

    let (result, _) = run_scan(&api, &defaults(500, 20)).await;
    let messages = result.expect("scan should succeed");
    assert_eq!(messages.len(), 1);
    let m = &messages[0];
    assert_eq!(m.from.display_name, "Acme News");
    assert_eq!(m.from.email, "news@acme.com");
    assert_eq!(m.subject, "sale");
    assert!(m.one_click);
    assert_eq!(m.received_at.timestamp_millis(), 1_700_000_000_000);
}

#[tokio::test]
async fn cancelled_scan_stops_before_the_first_page() {
    let api = FakeApi::new(vec![page(&["m1"], None)]);
    let (tx, _rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = Scanner::new(&api, &defaults(500, 20))
        .fetch_candidates("token", &tx, &cancel)
        .await;
    assert!(matches!(result, Err(AppError::Cancelled)));
}
