use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::AppDefaults;
use crate::errors::{AppError, AppResult};
use crate::gmail::{MailApi, MessageHeader, MessageMetadata, MessageRef};
use crate::parse;
use crate::types::{ParsedMessage, ScanProgress};

/// Discovers messages carrying an unsubscribe directive and fetches their
/// headers. Owns nothing across calls; one `fetch_candidates` call is one
/// scan session.
pub struct Scanner<'a, A: MailApi> {
    api: &'a A,
    defaults: &'a AppDefaults,
}

impl<'a, A: MailApi> Scanner<'a, A> {
    pub fn new(api: &'a A, defaults: &'a AppDefaults) -> Self {
        Self { api, defaults }
    }

    /// Run a full scan: paginated id discovery, then batched header fetch.
    /// Discovery failure aborts the whole scan; a single message failing its
    /// header fetch (or lacking the unsubscribe header) is dropped silently.
    pub async fn fetch_candidates(
        &self,
        token: &str,
        progress: &UnboundedSender<ScanProgress>,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<ParsedMessage>> {
        let _ = progress.send(ScanProgress::Starting);
        let refs = self.discover(token, progress, cancel).await?;
        self.fetch_details(token, &refs, progress, cancel).await
    }

    /// Page through the list endpoint until the server stops returning a
    /// continuation token or the running total reaches the result cap. The
    /// cap is soft: the final page may overshoot it.
    async fn discover(
        &self,
        token: &str,
        progress: &UnboundedSender<ScanProgress>,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<MessageRef>> {
        let mut refs: Vec<MessageRef> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let page = self
                .api
                .list_page(
                    token,
                    &self.defaults.search_query,
                    self.defaults.page_size,
                    page_token.as_deref(),
                )
                .await?;

            if !page.messages.is_empty() {
                refs.extend(page.messages);
                let _ = progress.send(ScanProgress::Listing { count: refs.len() });
            }

            page_token = page.next_page_token;
            if page_token.is_none() || refs.len() >= self.defaults.result_cap {
                break;
            }
        }

        info!(discovered = refs.len(), "Message discovery completed");
        Ok(refs)
    }

    /// Fetch headers in fixed-size batches: concurrent within a batch,
    /// strictly sequential across batches, so peak in-flight requests stay
    /// bounded by the batch size. `current` in progress events counts refs
    /// attempted, not records retained.
    async fn fetch_details(
        &self,
        token: &str,
        refs: &[MessageRef],
        progress: &UnboundedSender<ScanProgress>,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<ParsedMessage>> {
        let total = refs.len();
        let mut retained: Vec<ParsedMessage> = Vec::new();
        let mut attempted = 0usize;

        for chunk in refs.chunks(self.defaults.batch_size.max(1)) {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let results = join_all(chunk.iter().map(|r| self.fetch_one(token, &r.id))).await;
            attempted += chunk.len();
            retained.extend(results.into_iter().flatten());

            let _ = progress.send(ScanProgress::Fetching {
                current: attempted,
                total,
            });
        }

        info!(retained = retained.len(), total, "Header fetch completed");
        Ok(retained)
    }

    async fn fetch_one(&self, token: &str, id: &str) -> Option<ParsedMessage> {
        match self.api.message_metadata(token, id).await {
            Ok(meta) => {
                let parsed = parse_message(id, &meta);
                if parsed.is_none() {
                    debug!(message = %id, "Dropping message without List-Unsubscribe header");
                }
                parsed
            }
            Err(e) => {
                debug!(message = %id, error = %e, "Dropping message; header fetch failed");
                None
            }
        }
    }
}

/// Turn a metadata response into a `ParsedMessage`. Returns `None` when the
/// message has no List-Unsubscribe header, which is the filter condition,
/// not an error.
fn parse_message(id: &str, meta: &MessageMetadata) -> Option<ParsedMessage> {
    let headers: &[MessageHeader] = meta
        .payload
        .as_ref()
        .map(|p| p.headers.as_slice())
        .unwrap_or(&[]);

    let unsubscribe_header = header_value(headers, "List-Unsubscribe")?.to_string();
    let from = parse::sender_identity(header_value(headers, "From").unwrap_or(""));
    let subject = header_value(headers, "Subject").unwrap_or("").to_string();
    let one_click = header_value(headers, "List-Unsubscribe-Post").is_some();
    let received_at = meta
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(DateTime::UNIX_EPOCH);

    Some(ParsedMessage {
        id: id.to_string(),
        from,
        subject,
        unsubscribe_header,
        one_click,
        received_at,
    })
}

fn header_value<'a>(headers: &'a [MessageHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}
