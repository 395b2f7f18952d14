use chrono::{DateTime, Utc};

/// Identity extracted from a raw From header. `email` is the canonical
/// aggregation key: lower-cased and never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderIdentity {
    pub display_name: String,
    pub email: String,
}

/// Unsubscribe mechanisms advertised by a List-Unsubscribe header. Either or
/// both may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnsubscribeLinks {
    pub http_url: Option<String>,
    pub mailto: Option<String>,
}

/// One matched message. Only materialized for messages that actually carried
/// a List-Unsubscribe header; `unsubscribe_header` is never empty.
#[derive(Clone, Debug)]
pub struct ParsedMessage {
    pub id: String,
    pub from: SenderIdentity,
    pub subject: String,
    pub unsubscribe_header: String,
    pub one_click: bool,
    pub received_at: DateTime<Utc>,
}

/// All matched messages from one sender within a scan session. `links` and
/// `one_click` come from the first message seen for this sender.
#[derive(Clone, Debug)]
pub struct SenderGroup {
    pub email: String,
    pub display_name: String,
    pub messages: Vec<ParsedMessage>,
    pub links: UnsubscribeLinks,
    pub one_click: bool,
}

/// Per-sender lifecycle within one dispatch run. `Done` and `Error` are
/// terminal for that run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchStatus {
    Pending,
    Processing,
    Done,
    Error,
}

/// Scan-phase progress. Each emission supersedes the previous one; renderers
/// only need the most recent value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanProgress {
    Starting,
    Listing { count: usize },
    Fetching { current: usize, total: usize },
}

/// Immutable snapshot of one dispatch status transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub email: String,
    pub status: DispatchStatus,
}
