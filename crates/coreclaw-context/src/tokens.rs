// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Approximate token accounting and budget trimming.
//!
//! Costs are per code point: 1 token for Han/Hiragana/Katakana/Hangul
//! scripts, 0.25 otherwise, plus 4 tokens of overhead per message. The
//! numbers only need to be stable and conservative, not vendor-exact.

use coreclaw_core::ChatMessage;

/// Suffix appended when the system prompt (or last message) is truncated.
pub const TRUNCATION_SUFFIX: &str = "\n...[truncated by token budget]";

/// Minimum tokens the system prompt keeps when truncated.
const MIN_SYSTEM_TOKENS: u32 = 64;

/// Minimum tokens the last message keeps when truncated.
const MIN_LAST_MESSAGE_TOKENS: u32 = 32;

/// Per-message token overhead.
const MESSAGE_OVERHEAD: u32 = 4;

fn is_cjk(c: char) -> bool {
    matches!(u32::from(c),
        // Han
        0x4E00..=0x9FFF
        | 0x3400..=0x4DBF
        | 0xF900..=0xFAFF
        | 0x20000..=0x2A6DF
        | 0x2A700..=0x2EBEF
        // Hiragana
        | 0x3040..=0x309F
        // Katakana
        | 0x30A0..=0x30FF
        | 0x31F0..=0x31FF
        // Hangul
        | 0x1100..=0x11FF
        | 0x3130..=0x318F
        | 0xAC00..=0xD7AF
    )
}

/// Approximate token count of a text in quarter-token units.
fn text_quarter_tokens(text: &str) -> u64 {
    text.chars().map(|c| if is_cjk(c) { 4u64 } else { 1u64 }).sum()
}

/// Approximate token count of a text, rounded up.
pub fn text_tokens(text: &str) -> u32 {
    text_quarter_tokens(text).div_ceil(4) as u32
}

/// Token count of one message: content plus tool-call names and arguments,
/// plus the per-message overhead.
pub fn message_tokens(message: &ChatMessage) -> u32 {
    let mut quarters = text_quarter_tokens(message.content());
    if let ChatMessage::Assistant { tool_calls, .. } = message {
        for call in tool_calls {
            quarters += text_quarter_tokens(&call.name);
            quarters += text_quarter_tokens(&call.arguments.to_string());
        }
    }
    MESSAGE_OVERHEAD + quarters.div_ceil(4) as u32
}

/// Token count of a whole conversation.
pub fn conversation_tokens(messages: &[ChatMessage]) -> u32 {
    messages.iter().map(message_tokens).sum()
}

/// The input budget: `max(256, max_input_tokens - reserve_output_tokens)`.
pub fn input_budget(max_input_tokens: u32, reserve_output_tokens: u32) -> u32 {
    max_input_tokens.saturating_sub(reserve_output_tokens).max(256)
}

/// Truncate text so its token count does not exceed `max_tokens`.
fn truncate_to_tokens(text: &str, max_tokens: u32) -> String {
    let limit = u64::from(max_tokens) * 4;
    let mut quarters = 0u64;
    let mut out = String::new();
    for c in text.chars() {
        quarters += if is_cjk(c) { 4 } else { 1 };
        if quarters > limit {
            break;
        }
        out.push(c);
    }
    out
}

fn truncate_with_suffix(text: &str, max_tokens: u32) -> String {
    let suffix_tokens = text_tokens(TRUNCATION_SUFFIX);
    let keep = max_tokens.saturating_sub(suffix_tokens);
    let mut truncated = truncate_to_tokens(text, keep);
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

/// Trim a conversation to the budget.
///
/// 1. Drop oldest non-system messages while more than one tail message
///    remains.
/// 2. Truncate the system prompt down to what is left, keeping at least 64
///    tokens plus the truncation suffix.
/// 3. Truncate the last message, keeping at least 32 tokens.
pub fn fit_to_budget(mut messages: Vec<ChatMessage>, budget: u32) -> Vec<ChatMessage> {
    if conversation_tokens(&messages) <= budget {
        return messages;
    }

    // Stage 1: shed history.
    loop {
        let non_system = messages.iter().filter(|m| !m.is_system()).count();
        if non_system <= 1 || conversation_tokens(&messages) <= budget {
            break;
        }
        if let Some(pos) = messages.iter().position(|m| !m.is_system()) {
            messages.remove(pos);
        } else {
            break;
        }
    }
    if conversation_tokens(&messages) <= budget {
        return messages;
    }

    // Stage 2: truncate the system prompt.
    if let Some(pos) = messages.iter().position(|m| m.is_system()) {
        let others: u32 = messages
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pos)
            .map(|(_, m)| message_tokens(m))
            .sum();
        let available = budget
            .saturating_sub(others)
            .saturating_sub(MESSAGE_OVERHEAD)
            .max(MIN_SYSTEM_TOKENS);
        let system = messages[pos].content().to_string();
        messages[pos] = messages[pos].with_content(truncate_with_suffix(&system, available));
    }
    if conversation_tokens(&messages) <= budget {
        return messages;
    }

    // Stage 3: truncate the last message.
    if let Some(last) = messages.last() {
        let head: u32 = messages[..messages.len() - 1]
            .iter()
            .map(message_tokens)
            .sum();
        let available = budget
            .saturating_sub(head)
            .saturating_sub(MESSAGE_OVERHEAD)
            .max(MIN_LAST_MESSAGE_TOKENS);
        let content = last.content().to_string();
        let truncated = last.with_content(truncate_with_suffix(&content, available));
        *messages.last_mut().expect("non-empty") = truncated;
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_counts_quarter_token_per_char() {
        // 8 ASCII chars => 2 tokens.
        assert_eq!(text_tokens("abcdefgh"), 2);
        // Rounding up: 1 char => 1 token.
        assert_eq!(text_tokens("a"), 1);
    }

    #[test]
    fn cjk_counts_one_token_per_char() {
        assert_eq!(text_tokens("日本語のテスト"), 7);
        assert_eq!(text_tokens("한국어"), 3);
        assert_eq!(text_tokens("汉字"), 2);
    }

    #[test]
    fn mixed_text_sums_costs() {
        // "ab" = 0.5, "字" = 1 => 1.5, rounds up to 2.
        assert_eq!(text_tokens("ab字"), 2);
    }

    #[test]
    fn message_overhead_applies() {
        let message = ChatMessage::User {
            content: "abcd".to_string(),
        };
        assert_eq!(message_tokens(&message), 4 + 1);
    }

    #[test]
    fn tool_calls_are_counted() {
        let plain = ChatMessage::Assistant {
            content: String::new(),
            tool_calls: vec![],
        };
        let with_call = ChatMessage::Assistant {
            content: String::new(),
            tool_calls: vec![coreclaw_core::ToolCall {
                id: "c1".to_string(),
                name: "fs.read".to_string(),
                arguments: serde_json::json!({"path": "some/file.txt"}),
            }],
        };
        assert!(message_tokens(&with_call) > message_tokens(&plain));
    }

    #[test]
    fn budget_floor_is_256() {
        assert_eq!(input_budget(1_000, 900), 256);
        assert_eq!(input_budget(8_192, 1_024), 7_168);
    }

    fn user(content: &str) -> ChatMessage {
        ChatMessage::User {
            content: content.to_string(),
        }
    }

    #[test]
    fn under_budget_is_untouched() {
        let messages = vec![
            ChatMessage::System {
                content: "sys".to_string(),
            },
            user("hello"),
        ];
        let fitted = fit_to_budget(messages.clone(), 1_000);
        assert_eq!(fitted.len(), 2);
        assert_eq!(fitted[1].content(), "hello");
    }

    #[test]
    fn oldest_non_system_dropped_first() {
        let messages = vec![
            ChatMessage::System {
                content: "s".to_string(),
            },
            user(&"old ".repeat(300)),
            user(&"mid ".repeat(300)),
            user("latest"),
        ];
        let fitted = fit_to_budget(messages, 320);
        // System survives, oldest history is shed, latest survives.
        assert!(fitted[0].is_system());
        assert_eq!(fitted.last().unwrap().content(), "latest");
        assert!(fitted.len() < 4);
    }

    #[test]
    fn tiny_budget_truncates_system_with_suffix() {
        let messages = vec![
            ChatMessage::System {
                content: "word ".repeat(2_000),
            },
            user("question"),
        ];
        let fitted = fit_to_budget(messages, 256);
        assert!(fitted[0].content().ends_with("[truncated by token budget]"));
        assert!(message_tokens(&fitted[0]) < 2_000);
        assert_eq!(fitted[1].content(), "question");
    }

    #[test]
    fn oversized_last_message_is_truncated_with_floor() {
        let messages = vec![
            ChatMessage::System {
                content: "s".to_string(),
            },
            user(&"x".repeat(100_000)),
        ];
        let fitted = fit_to_budget(messages, 256);
        let last = fitted.last().unwrap();
        assert!(last.content().ends_with("[truncated by token budget]"));
        // At least 32 tokens of the original content survive.
        assert!(text_tokens(last.content()) >= 32);
    }

    #[test]
    fn cjk_heavy_prompt_hits_budget_sooner() {
        let ascii = vec![user(&"a".repeat(400))];
        let cjk = vec![user(&"字".repeat(400))];
        assert_eq!(conversation_tokens(&ascii), 104);
        assert_eq!(conversation_tokens(&cjk), 404);
    }
}
