use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{SenderIdentity, UnsubscribeLinks};

static NAME_ADDR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"?([^"<]*)"?\s*<([^>]+@[^>]+)>$"#).expect("valid regex"));

static BARE_ADDR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<?([^<>\s]+@[^<>\s]+)>?$").expect("valid regex"));

static BRACKETED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]+)>").expect("valid regex"));

/// Best-effort parse of a free-text From header. Handles
/// `"Display Name" <addr>`, `Display Name <addr>` and bare addresses; on
/// anything else the raw text is echoed back as both fields so grouping
/// keys stay stable for malformed input. Never fails.
pub fn sender_identity(raw: &str) -> SenderIdentity {
    let raw = raw.trim();
    if raw.is_empty() {
        return SenderIdentity {
            display_name: "Unknown".to_string(),
            email: "unknown@unknown.com".to_string(),
        };
    }

    if let Some(caps) = NAME_ADDR_RE.captures(raw) {
        let email = caps[2].to_lowercase();
        let name = caps[1].trim();
        let display_name = if name.is_empty() {
            email.clone()
        } else {
            name.to_string()
        };
        return SenderIdentity {
            display_name,
            email,
        };
    }

    if let Some(caps) = BARE_ADDR_RE.captures(raw) {
        let email = caps[1].to_lowercase();
        return SenderIdentity {
            display_name: email.clone(),
            email,
        };
    }

    SenderIdentity {
        display_name: raw.to_string(),
        email: raw.to_string(),
    }
}

/// Extract unsubscribe mechanisms from a List-Unsubscribe header value. The
/// header carries one or more `<uri>` tokens; the last token of each
/// recognized scheme wins. Unrecognized schemes are skipped.
pub fn unsubscribe_links(raw: &str) -> UnsubscribeLinks {
    let mut links = UnsubscribeLinks::default();

    for caps in BRACKETED_RE.captures_iter(raw) {
        let uri = &caps[1];
        if uri.starts_with("http://") || uri.starts_with("https://") {
            links.http_url = Some(uri.to_string());
        } else if uri.starts_with("mailto:") {
            links.mailto = Some(uri.to_string());
        }
    }

    links
}
