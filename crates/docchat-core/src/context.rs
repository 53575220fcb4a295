//! Prompt assembly under a token budget.
//!
//! Merges the session's system directive, retrieved chunks, prior turns and
//! the current user message into one ordered list of role-tagged
//! [`PromptSegment`]s. The completion provider decides how to render them.
//!
//! # Budget
//!
//! Token cost is estimated at [`CHARS_PER_TOKEN`] characters per token.
//! The directive and the current user message are always included, even if
//! they alone exceed the budget. What is left is spent in priority order:
//!
//! 1. retrieved chunks, best match first, stopping at the first that does
//!    not fit;
//! 2. prior turns, walking back from the newest, stopping at the first that
//!    does not fit, so the oldest turns are dropped first.
//!
//! Segments are emitted as: directive, notice (optional), chunks, history
//! (chronological), user message.

use serde::Serialize;

use crate::models::Role;
use crate::session::Session;
use crate::store::RetrievalResult;

/// Approximate characters-per-token ratio used for budgeting.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated token cost of `text` (rounded up).
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    (chars + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Directive,
    /// Tells the model retrieval ran and found nothing.
    Notice,
    Context,
    History,
    UserMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSegment {
    pub role: Role,
    pub kind: SegmentKind,
    pub content: String,
    /// Source filename for `Context` segments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl PromptSegment {
    fn new(role: Role, kind: SegmentKind, content: String) -> Self {
        Self {
            role,
            kind,
            content,
            source: None,
        }
    }
}

/// Assembled prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Prompt {
    pub segments: Vec<PromptSegment>,
    /// Prior turns left out for budget reasons.
    pub dropped_history: usize,
    /// Retrieved chunks left out for budget reasons.
    pub dropped_context: usize,
    pub estimated_tokens: usize,
}

impl Prompt {
    /// Segments of one kind, in prompt order.
    pub fn of_kind(&self, kind: SegmentKind) -> impl Iterator<Item = &PromptSegment> {
        self.segments.iter().filter(move |s| s.kind == kind)
    }

    /// Directive, notice and context joined into one system text. Empty
    /// parts are skipped.
    pub fn system_text(&self) -> String {
        self.segments
            .iter()
            .filter(|s| s.role == Role::System && !s.content.is_empty())
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// History plus the current user message, chronological.
    pub fn turns(&self) -> Vec<(Role, &str)> {
        self.segments
            .iter()
            .filter(|s| s.role != Role::System)
            .map(|s| (s.role, s.content.as_str()))
            .collect()
    }
}

/// Builds [`Prompt`]s. Holds only formatting options; all state comes in
/// through [`assemble`](ContextAssembler::assemble).
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    chunk_char_limit: Option<usize>,
    empty_context_notice: Option<String>,
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut each retrieved chunk to this many characters (plus `...`).
    pub fn with_chunk_char_limit(mut self, limit: usize) -> Self {
        self.chunk_char_limit = Some(limit);
        self
    }

    /// Text added when retrieval ran but returned nothing.
    pub fn with_empty_context_notice(mut self, notice: impl Into<String>) -> Self {
        self.empty_context_notice = Some(notice.into());
        self
    }

    /// Assemble a prompt.
    ///
    /// `session` is the conversation as it was before `user_message`
    /// arrived; `budget` is in estimated tokens. System-role messages in
    /// the history are not replayed.
    pub fn assemble(
        &self,
        session: &Session,
        user_message: &str,
        retrieval: &RetrievalResult,
        budget: usize,
    ) -> Prompt {
        let directive = session
            .settings
            .system_directive
            .clone()
            .unwrap_or_default();

        let fixed = estimate_tokens(&directive) + estimate_tokens(user_message);
        let mut remaining = budget.saturating_sub(fixed);
        let mut prompt = Prompt::default();

        prompt
            .segments
            .push(PromptSegment::new(Role::System, SegmentKind::Directive, directive));

        if retrieval.is_empty() && !retrieval.skipped {
            if let Some(notice) = &self.empty_context_notice {
                let cost = estimate_tokens(notice);
                if cost <= remaining {
                    remaining -= cost;
                    prompt.segments.push(PromptSegment::new(
                        Role::System,
                        SegmentKind::Notice,
                        notice.clone(),
                    ));
                }
            }
        }

        for (i, hit) in retrieval.hits.iter().enumerate() {
            let source = &hit.chunk.metadata.source_file;
            let content = format!(
                "[Source {}: {}]\n{}",
                i + 1,
                source,
                self.clip(&hit.chunk.text)
            );
            let cost = estimate_tokens(&content);
            if cost > remaining {
                prompt.dropped_context = retrieval.hits.len() - i;
                break;
            }
            remaining -= cost;
            let mut seg = PromptSegment::new(Role::System, SegmentKind::Context, content);
            seg.source = Some(source.clone());
            prompt.segments.push(seg);
        }

        let eligible: Vec<_> = session
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();
        let mut kept = Vec::new();
        for msg in eligible.iter().rev() {
            let cost = estimate_tokens(&msg.content);
            if cost > remaining {
                break;
            }
            remaining -= cost;
            kept.push(PromptSegment::new(
                msg.role,
                SegmentKind::History,
                msg.content.clone(),
            ));
        }
        prompt.dropped_history = eligible.len() - kept.len();
        prompt.segments.extend(kept.into_iter().rev());

        prompt.segments.push(PromptSegment::new(
            Role::User,
            SegmentKind::UserMessage,
            user_message.to_string(),
        ));

        prompt.estimated_tokens = prompt
            .segments
            .iter()
            .map(|s| estimate_tokens(&s.content))
            .sum();

        if prompt.dropped_history > 0 || prompt.dropped_context > 0 {
            tracing::debug!(
                dropped_history = prompt.dropped_history,
                dropped_context = prompt.dropped_context,
                budget,
                "prompt trimmed to budget"
            );
        }

        prompt
    }

    fn clip(&self, text: &str) -> String {
        match self.chunk_char_limit {
            Some(limit) if text.chars().count() > limit => {
                let mut s: String = text.chars().take(limit).collect();
                s.push_str("...");
                s
            }
            _ => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunker;
    use crate::models::SourceInfo;
    use crate::session::{Message, SessionSettings};
    use crate::store::RetrievedChunk;

    fn session_with(directive: Option<&str>, turns: &[(Role, &str)]) -> Session {
        let mut session = Session::new(SessionSettings {
            system_directive: directive.map(str::to_string),
            ..Default::default()
        });
        for (role, text) in turns {
            session.messages.push(Message::new(*role, *text));
        }
        session
    }

    fn retrieval(items: &[(&str, &str)]) -> RetrievalResult {
        let chunker = Chunker::new(10_000, 0).unwrap();
        RetrievalResult {
            hits: items
                .iter()
                .enumerate()
                .map(|(i, (source, text))| RetrievedChunk {
                    chunk: chunker.chunk(&SourceInfo::new(*source, "txt"), text).remove(0),
                    distance: i as f32 * 0.1,
                })
                .collect(),
            skipped: false,
        }
    }

    fn kinds(prompt: &Prompt) -> Vec<SegmentKind> {
        prompt.segments.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_order_with_ample_budget() {
        let session = session_with(
            Some("Be concise."),
            &[(Role::User, "first q"), (Role::Assistant, "first a")],
        );
        let r = retrieval(&[("a.txt", "alpha facts"), ("b.txt", "beta facts")]);
        let prompt = ContextAssembler::new().assemble(&session, "second q", &r, 10_000);

        assert_eq!(
            kinds(&prompt),
            vec![
                SegmentKind::Directive,
                SegmentKind::Context,
                SegmentKind::Context,
                SegmentKind::History,
                SegmentKind::History,
                SegmentKind::UserMessage,
            ]
        );
        let ctx: Vec<_> = prompt.of_kind(SegmentKind::Context).collect();
        assert!(ctx[0].content.starts_with("[Source 1: a.txt]"));
        assert_eq!(ctx[1].source.as_deref(), Some("b.txt"));
        assert_eq!(prompt.dropped_history, 0);
        assert_eq!(
            prompt.turns(),
            vec![
                (Role::User, "first q"),
                (Role::Assistant, "first a"),
                (Role::User, "second q"),
            ]
        );
    }

    #[test]
    fn test_history_dropped_oldest_first() {
        let turns: Vec<(Role, String)> = (0..10)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                (role, format!("turn {:02} {}", i, "x".repeat(32)))
            })
            .collect();
        let turn_refs: Vec<(Role, &str)> = turns.iter().map(|(r, s)| (*r, s.as_str())).collect();
        let session = session_with(Some("You answer from documents."), &turn_refs);
        let user = "What does the handbook say about leave?";

        // Each turn costs 10 tokens; directive 7, user message 10.
        let budget = 7 + 10 + 10 * 3;
        let prompt =
            ContextAssembler::new().assemble(&session, user, &RetrievalResult::skipped(), budget);

        let history: Vec<&str> = prompt
            .of_kind(SegmentKind::History)
            .map(|s| s.content.as_str())
            .collect();
        assert_eq!(history.len(), 3);
        assert!(history[0].starts_with("turn 07"));
        assert!(history[2].starts_with("turn 09"));
        assert_eq!(prompt.dropped_history, 7);
        assert_eq!(prompt.segments.first().unwrap().content, "You answer from documents.");
        assert_eq!(prompt.segments.last().unwrap().content, user);
        assert!(prompt.estimated_tokens <= budget);
    }

    #[test]
    fn test_directive_and_user_survive_zero_budget() {
        let session = session_with(Some("Directive."), &[(Role::User, "old")]);
        let r = retrieval(&[("a.txt", "ctx")]);
        let prompt = ContextAssembler::new().assemble(&session, "now", &r, 0);
        assert_eq!(kinds(&prompt), vec![SegmentKind::Directive, SegmentKind::UserMessage]);
        assert_eq!(prompt.dropped_context, 1);
        assert_eq!(prompt.dropped_history, 1);
    }

    #[test]
    fn test_context_prioritized_over_history() {
        let history = "h".repeat(40);
        let text = "c".repeat(40);
        let session = session_with(None, &[(Role::User, history.as_str())]);
        let r = retrieval(&[("a.txt", text.as_str())]);
        // Context segment: "[Source 1: a.txt]\n" (18) + 40 chars = 58 chars = 15 tokens.
        let prompt = ContextAssembler::new().assemble(&session, "q", &r, 1 + 15);
        assert_eq!(prompt.of_kind(SegmentKind::Context).count(), 1);
        assert_eq!(prompt.of_kind(SegmentKind::History).count(), 0);
        assert_eq!(prompt.dropped_history, 1);
    }

    #[test]
    fn test_unset_directive_is_empty_string() {
        let session = session_with(None, &[]);
        let prompt = ContextAssembler::new().assemble(&session, "hi", &RetrievalResult::empty(), 100);
        assert_eq!(prompt.segments[0].kind, SegmentKind::Directive);
        assert_eq!(prompt.segments[0].content, "");
        assert_eq!(prompt.system_text(), "");
    }

    #[test]
    fn test_notice_only_when_retrieval_ran() {
        let session = session_with(None, &[]);
        let assembler = ContextAssembler::new().with_empty_context_notice("No documents matched.");

        let ran = assembler.assemble(&session, "hi", &RetrievalResult::empty(), 100);
        assert_eq!(ran.of_kind(SegmentKind::Notice).count(), 1);
        assert_eq!(ran.system_text(), "No documents matched.");

        let skipped = assembler.assemble(&session, "hi", &RetrievalResult::skipped(), 100);
        assert_eq!(skipped.of_kind(SegmentKind::Notice).count(), 0);
    }

    #[test]
    fn test_chunk_char_limit() {
        let session = session_with(None, &[]);
        let text = "z".repeat(600);
        let r = retrieval(&[("a.txt", text.as_str())]);
        let prompt = ContextAssembler::new()
            .with_chunk_char_limit(500)
            .assemble(&session, "q", &r, 10_000);
        let ctx = prompt.of_kind(SegmentKind::Context).next().unwrap();
        assert!(ctx.content.ends_with("..."));
        assert_eq!(ctx.content.matches('z').count(), 500);
    }

    #[test]
    fn test_system_history_not_replayed() {
        let session = session_with(
            None,
            &[(Role::System, "System prompt updated"), (Role::User, "hello")],
        );
        let prompt = ContextAssembler::new().assemble(&session, "again", &RetrievalResult::skipped(), 1000);
        assert_eq!(prompt.of_kind(SegmentKind::History).count(), 1);
        assert_eq!(prompt.dropped_history, 0);
    }
}
