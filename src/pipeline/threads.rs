//! Thread reordering: replies move up to sit right after their parent.

use std::collections::HashMap;

use crate::models::Message;

/// Reorder a chronological sequence so every reply directly follows its
/// parent (after any earlier replies to the same parent).
///
/// A message counts as a reply only if its parent appears earlier in the
/// same sequence; otherwise it keeps its chronological slot. Replies to
/// replies nest under their own parent. Runs in O(n) and is idempotent.
pub fn reorder(messages: Vec<Message>) -> Vec<Message> {
    let index_by_id: HashMap<&str, usize> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id.as_str(), i))
        .collect();

    // parent[i] = index of the message i replies to, if it is a reply
    let parent: Vec<Option<usize>> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            m.thread_parent_id
                .as_deref()
                .and_then(|pid| index_by_id.get(pid).copied())
                .filter(|&p| p < i)
        })
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); messages.len()];
    for (i, p) in parent.iter().enumerate() {
        if let Some(p) = *p {
            children[p].push(i);
        }
    }

    let moved = parent.iter().filter(|p| p.is_some()).count();
    if moved == 0 {
        return messages;
    }
    tracing::debug!("Reordering {} thread replies", moved);

    // Depth-first walk from each root, children in chronological order.
    let mut order = Vec::with_capacity(messages.len());
    let mut stack = Vec::new();
    for root in (0..messages.len()).filter(|&i| parent[i].is_none()) {
        stack.push(root);
        while let Some(i) = stack.pop() {
            order.push(i);
            stack.extend(children[i].iter().rev());
        }
    }

    let mut slots: Vec<Option<Message>> = messages.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}
