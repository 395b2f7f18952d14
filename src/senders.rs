use std::collections::HashMap;

use crate::parse;
use crate::types::{ParsedMessage, SenderGroup};

/// Fold messages into per-sender groups, ranked descending by message
/// volume. Grouping key is the normalized sender email. Unsubscribe
/// metadata comes from the first message seen for each sender; later
/// messages from the same sender never overwrite it. The sort is stable, so
/// senders with equal counts keep first-encounter order.
pub fn group_by_sender(messages: Vec<ParsedMessage>) -> Vec<SenderGroup> {
    let mut groups: Vec<SenderGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for msg in messages {
        let slot = match index.get(&msg.from.email) {
            Some(&slot) => slot,
            None => {
                groups.push(SenderGroup {
                    email: msg.from.email.clone(),
                    display_name: msg.from.display_name.clone(),
                    messages: Vec::new(),
                    links: parse::unsubscribe_links(&msg.unsubscribe_header),
                    one_click: msg.one_click,
                });
                index.insert(msg.from.email.clone(), groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[slot].messages.push(msg);
    }

    groups.sort_by(|a, b| b.messages.len().cmp(&a.messages.len()));
    groups
}
