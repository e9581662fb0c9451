//! Selects the bounded, round aligned slice of history that is sent to
//! the model as context.
use super::models::{ChatMessage, ChatRole};

/// Collapses every run of same-role messages down to its last message.
pub fn dedup_consecutive_roles(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .enumerate()
        .filter(|(i, msg)| {
            messages
                .get(i + 1)
                .is_none_or(|next| next.role != msg.role)
        })
        .map(|(_, msg)| msg.clone())
        .collect()
}

/// Builds the context window from the full history.
///
/// After deduplication, walks newest to oldest expecting the roles to
/// alternate. A user message closes a round. The walk stops at the
/// first message that breaks the alternation; it does not skip over
/// it. Returns at most `max_rounds` rounds in chronological order.
pub fn build_window(history: &[ChatMessage], max_rounds: usize) -> Vec<ChatMessage> {
    if max_rounds == 0 {
        return Vec::new();
    }

    let deduped = dedup_consecutive_roles(history);
    let mut window = Vec::new();
    let mut rounds = 0;
    let mut expecting: Option<ChatRole> = None;

    for msg in deduped.into_iter().rev() {
        if rounds >= max_rounds {
            break;
        }
        if expecting.is_some_and(|role| role != msg.role) {
            break;
        }
        expecting = match msg.role {
            ChatRole::Assistant => Some(ChatRole::User),
            ChatRole::User => {
                rounds += 1;
                Some(ChatRole::Assistant)
            }
        };
        window.push(msg);
    }

    window.reverse();
    window
}
