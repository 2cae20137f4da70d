//! Ordering helpers for transcripts.

use super::model::ChatMessage;

/// Merge two transcripts that are each sorted by `created_at` ascending.
///
/// On equal timestamps the left side wins, so dialog messages precede
/// pipeline responses written in the same instant.
pub fn merge_by_timestamp(left: Vec<ChatMessage>, right: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.created_at <= r.created_at,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        merged.extend(next);
    }

    merged
}

/// Sort an unordered fetch client-side. Stable, so ties keep fetch order.
pub fn sort_by_timestamp(messages: &mut [ChatMessage]) {
    messages.sort_by_key(|m| m.created_at);
}
