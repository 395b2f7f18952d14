use unsub::parse::{sender_identity, unsubscribe_links};

#[test]
fn from_header_with_quoted_name_yields_trimmed_name_and_lowercased_email() {
    let id = sender_identity("\"Acme News\" <News@Acme.COM>");
    assert_eq!(id.display_name, "Acme News");
    assert_eq!(id.email, "news@acme.com");
}

#[test]
fn from_header_with_unquoted_name_trims_trailing_space() {
    let id = sender_identity("Acme News <news@acme.com>");
    assert_eq!(id.display_name, "Acme News");
    assert_eq!(id.email, "news@acme.com");
}

#[test]
fn bare_email_uses_email_as_display_name() {
    let id = sender_identity("news@acme.com");
    assert_eq!(id.display_name, "news@acme.com");
    assert_eq!(id.email, "news@acme.com");
}

#[test]
fn bracketed_address_without_name_falls_back_to_email() {
    let id = sender_identity("<News@Acme.COM>");
    assert_eq!(id.display_name, "news@acme.com");
    assert_eq!(id.email, "news@acme.com");
}

#[test]
fn unparseable_header_echoes_raw_text_as_both_fields() {
    let id = sender_identity("not an address");
    assert_eq!(id.display_name, "not an address");
    assert_eq!(id.email, "not an address");
}

#[test]
fn empty_from_header_maps_to_unknown_sender() {
    let id = sender_identity("");
    assert_eq!(id.display_name, "Unknown");
    assert_eq!(id.email, "unknown@unknown.com");
}

#[test]
fn links_extracts_both_schemes_in_any_order() {
    let links =
        unsubscribe_links("<mailto:unsub@acme.com?subject=stop>, <https://acme.com/unsub>");
    assert_eq!(links.http_url.as_deref(), Some("https://acme.com/unsub"));
    assert_eq!(
        links.mailto.as_deref(),
        Some("mailto:unsub@acme.com?subject=stop")
    );

    let reversed =
        unsubscribe_links("<https://acme.com/unsub>, <mailto:unsub@acme.com?subject=stop>");
    assert_eq!(reversed.http_url.as_deref(), Some("https://acme.com/unsub"));
    assert_eq!(
        reversed.mailto.as_deref(),
        Some("mailto:unsub@acme.com?subject=stop")
    );
}

#[test]
fn last_token_of_each_scheme_wins() {
    let links = unsubscribe_links(
        "<https://first.example/u>, <mailto:a@example.com>, <https://second.example/u>, <mailto:b@example.com>",
    );
    assert_eq!(links.http_url.as_deref(), Some("https://second.example/u"));
    assert_eq!(links.mailto.as_deref(), Some("mailto:b@example.com"));
}

#[test]
fn unrecognized_schemes_are_ignored() {
    let links = unsubscribe_links("<ftp://acme.com/unsub>, <tel:+15551234567>");
    assert_eq!(links.http_url, None);
    assert_eq!(links.mailto, None);
}

#[test]
fn header_without_bracketed_tokens_yields_no_links() {
    let links = unsubscribe_links("https://bare.example/unsub with no brackets");
    assert_eq!(links.http_url, None);
    assert_eq!(links.mailto, None);
}

#[test]
fn parsing_is_pure_and_deterministic() {
    let raw_from = "\"Acme News\" <News@Acme.COM>";
    let raw_links = "<https://acme.com/unsub>, <mailto:unsub@acme.com>";
    assert_eq!(sender_identity(raw_from), sender_identity(raw_from));
    assert_eq!(unsubscribe_links(raw_links), unsubscribe_links(raw_links));
}
