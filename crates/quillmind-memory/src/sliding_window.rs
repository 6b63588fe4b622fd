//! Sliding window (§4.5 tier 2): bounds the message list handed to the LLM.
//! Three selectable strategies, grounded in `SlidingWindowManager`/
//! `TokenAwareSlidingWindow`/`SmartSlidingWindow`.

use quillmind_common::{Message, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStrategy {
    /// Count-bounded: keep system messages, the first user message, and the
    /// most recent `window_size` turns.
    Simple,
    /// Token-budget-bounded, prioritizing recent tool results.
    Token,
    /// Simple pre-filter, then a token-budget refine. Default for
    /// `PrepareContext`.
    Hybrid,
}

#[derive(Debug, Clone, Default)]
pub struct WindowStats {
    pub original_count: usize,
    pub final_count: usize,
    pub tokens_used: usize,
    pub messages_dropped: usize,
}

/// No real tokenizer dependency: approximate by dividing UTF-8 byte length by
/// 3, plus a small fixed per-message overhead for role/format tokens,
/// matching the source's fallback estimator.
pub fn approximate_token_count(text: &str) -> usize {
    text.len() / 3
}

fn message_tokens(message: &Message) -> usize {
    const PER_MESSAGE_OVERHEAD: usize = 4;
    approximate_token_count(&message.content) + PER_MESSAGE_OVERHEAD
}

pub struct SlidingWindow {
    pub window_size: usize,
}

impl SlidingWindow {
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }

    /// Count-bounded window: §4.1's `SlidingWindowManager.apply`.
    pub fn apply_simple(&self, messages: &[Message]) -> (Vec<Message>, WindowStats) {
        let original_count = messages.len();
        if original_count == 0 {
            return (Vec::new(), WindowStats::default());
        }
        if original_count <= self.window_size * 2 {
            return (
                messages.to_vec(),
                WindowStats { original_count, final_count: original_count, tokens_used: 0, messages_dropped: 0 },
            );
        }

        let mut result: Vec<Message> = Vec::new();
        result.extend(messages.iter().filter(|m| m.role == Role::System).cloned());

        // index, not just content, so the first user message is never
        // double-counted against a later message with identical text.
        let first_user_idx = messages.iter().position(|m| m.role == Role::User);
        if let Some(idx) = first_user_idx {
            result.push(messages[idx].clone());
        }

        let non_system_idx: Vec<usize> = (0..messages.len()).filter(|&i| messages[i].role != Role::System).collect();
        let recent_count = (self.window_size * 2).saturating_sub(result.len());
        let recent_idx = non_system_idx.iter().rev().take(recent_count).rev().copied();

        for idx in recent_idx {
            if Some(idx) == first_user_idx {
                continue;
            }
            result.push(messages[idx].clone());
        }

        let final_count = result.len();
        (
            result,
            WindowStats { original_count, final_count, tokens_used: 0, messages_dropped: original_count - final_count },
        )
    }

    /// Token-budget-bounded window: §4.1's `TokenAwareSlidingWindow.apply`.
    /// Recent tool results (up to 5) are preferred before normal messages,
    /// most-recent-first.
    pub fn apply_token(&self, messages: &[Message], max_tokens: usize, reserve_tokens: usize) -> (Vec<Message>, WindowStats) {
        let original_count = messages.len();
        if original_count == 0 {
            return (Vec::new(), WindowStats::default());
        }

        let available = max_tokens.saturating_sub(reserve_tokens);
        let system_msgs: Vec<&Message> = messages.iter().filter(|m| m.role == Role::System).collect();
        let other_msgs: Vec<&Message> = messages.iter().filter(|m| m.role != Role::System).collect();

        let system_tokens: usize = system_msgs.iter().map(|m| message_tokens(m)).sum();
        if system_tokens >= available {
            let result: Vec<Message> = system_msgs.into_iter().cloned().collect();
            let final_count = result.len();
            return (
                result,
                WindowStats { original_count, final_count, tokens_used: system_tokens, messages_dropped: original_count - final_count },
            );
        }
        let remaining = available - system_tokens;

        let (priority, normal): (Vec<&Message>, Vec<&Message>) = other_msgs.iter().rev().partition(|m| m.role == Role::Tool);
        let mut result_other: Vec<Message> = Vec::new();
        let mut total_tokens = 0usize;

        for msg in priority.into_iter().take(5) {
            let t = message_tokens(msg);
            if total_tokens + t <= remaining {
                result_other.insert(0, msg.clone());
                total_tokens += t;
            }
        }
        for msg in normal {
            let t = message_tokens(msg);
            if total_tokens + t <= remaining {
                result_other.insert(0, msg.clone());
                total_tokens += t;
            } else {
                break;
            }
        }

        let mut result: Vec<Message> = system_msgs.into_iter().cloned().collect();
        result.extend(result_other);
        let final_tokens = system_tokens + total_tokens;
        let final_count = result.len();

        (
            result,
            WindowStats { original_count, final_count, tokens_used: final_tokens, messages_dropped: original_count - final_count },
        )
    }

    pub fn apply(&self, messages: &[Message], strategy: WindowStrategy, max_tokens: usize, reserve_tokens: usize) -> (Vec<Message>, WindowStats) {
        match strategy {
            WindowStrategy::Simple => self.apply_simple(messages),
            WindowStrategy::Token => self.apply_token(messages, max_tokens, reserve_tokens),
            WindowStrategy::Hybrid => {
                let (pre_filtered, _) = self.apply_simple(messages);
                self.apply_token(&pre_filtered, max_tokens, reserve_tokens)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::new(Role::User, format!("message {i}"))).collect()
    }

    #[test]
    fn exactly_window_times_two_triggers_no_trim() {
        let window = SlidingWindow::new(5);
        let messages = msgs(10);
        let (result, stats) = window.apply_simple(&messages);
        assert_eq!(result.len(), 10);
        assert_eq!(stats.messages_dropped, 0);
    }

    #[test]
    fn one_more_than_window_times_two_trims() {
        let window = SlidingWindow::new(5);
        let messages = msgs(11);
        let (result, stats) = window.apply_simple(&messages);
        assert!(result.len() < 11);
        assert!(stats.messages_dropped > 0);
    }

    #[test]
    fn keeps_system_and_first_user_message() {
        let window = SlidingWindow::new(2);
        let mut messages = vec![Message::new(Role::System, "you are a helpful assistant")];
        messages.push(Message::new(Role::User, "original intent"));
        messages.extend(msgs(20));
        let (result, _) = window.apply_simple(&messages);
        assert!(result.iter().any(|m| m.role == Role::System));
        assert!(result.iter().any(|m| m.content == "original intent"));
    }

    #[test]
    fn token_window_respects_budget() {
        let window = SlidingWindow::new(5);
        let messages = msgs(50);
        let (result, stats) = window.apply_token(&messages, 200, 0);
        assert!(stats.tokens_used <= 200);
        assert!(result.len() < 50);
    }

    #[test]
    fn token_window_prioritizes_tool_messages() {
        let window = SlidingWindow::new(5);
        let mut messages = msgs(30);
        messages.push(Message::tool_result("call-1", "a".repeat(50)));
        let (result, _) = window.apply_token(&messages, 300, 0);
        assert!(result.iter().any(|m| m.role == Role::Tool));
    }
}
