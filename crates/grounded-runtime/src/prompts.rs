//! Prompts for the completion backend and the LLM judge.
//!
//! The system prompts are static so providers with prompt caching can reuse
//! them; only the context block, question and corrective note change per call.

use grounded_core::{DraftAnswer, EvidenceSet, Query, Verdict, VerdictKind};

use crate::providers::ChatMessage;

/// Generator system prompt.
pub const GENERATOR_SYSTEM_PROMPT: &str = r#"You are a helpful assistant that answers questions based on the provided context.
Use ONLY the information from the context to answer the question.
If the context doesn't contain enough information to answer, say so clearly.
Be concise but thorough in your answer."#;

/// Judge system prompt. The reply must start with VALID or INVALID.
pub const JUDGE_SYSTEM_PROMPT: &str = r#"You are a validator that checks if an answer is relevant and accurate.
Evaluate the answer against the original question and context.

Check for:
1. Relevance: Does the answer address the question?
2. Groundedness: Is the answer supported by the context?
3. Completeness: Does the answer fully address the question?

Respond with either:
- "VALID" if the answer is good
- "INVALID: [reason]" if there are issues"#;

/// Used when the backend returns nothing.
pub const DECLINE_TEXT: &str =
    "The provided context doesn't contain enough information to answer this question.";

/// Shown in place of a context block when retrieval found nothing.
pub const EMPTY_CONTEXT: &str = "(no relevant passages were found)";

/// Render evidence as `[Source: s, Page p]` blocks.
pub fn format_context(evidence: &EvidenceSet) -> String {
    if evidence.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }
    evidence
        .iter()
        .map(|chunk| {
            format!(
                "[Source: {}, Page {}]\n{}",
                chunk.source_id,
                chunk.location.as_deref().unwrap_or("?"),
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Feedback for a retry, built from the verdict that rejected the last draft.
pub fn corrective_note(verdict: &Verdict) -> String {
    let mut note = String::from("Your previous answer was rejected");

    match verdict.kind {
        VerdictKind::Indeterminate => {
            note.push_str(
                " because there was not enough evidence to check it. \
                 Only state what the context below supports. If it does not \
                 answer the question, say so.",
            );
        }
        _ => {
            if let Some(explanation) = &verdict.explanation {
                note.push_str(": ");
                note.push_str(explanation);
            } else {
                note.push('.');
            }
            if !verdict.unsupported_claims.is_empty() {
                note.push_str("\nThese statements are not supported by the context:");
                for claim in &verdict.unsupported_claims {
                    note.push_str("\n- ");
                    note.push_str(claim);
                }
            }
            note.push_str(
                "\nRewrite the answer using only facts stated in the context. \
                 Leave out anything it does not support.",
            );
        }
    }
    note
}

/// Messages for a generation call; `prior` turns it into a corrective retry.
pub fn generation_messages(
    query: &Query,
    evidence: &EvidenceSet,
    prior: Option<(&DraftAnswer, &Verdict)>,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(GENERATOR_SYSTEM_PROMPT)];

    let user = format!(
        "Context:\n{}\n\nQuestion: {}\n\nAnswer:",
        format_context(evidence),
        query.text()
    );

    match prior {
        Some((answer, verdict)) => {
            messages.push(ChatMessage::user(user));
            messages.push(ChatMessage::assistant(answer.text()));
            messages.push(ChatMessage::user(corrective_note(verdict)));
        }
        None => messages.push(ChatMessage::user(user)),
    }
    messages
}

/// Messages for the judge.
pub fn judge_messages(
    query: &Query,
    evidence: &EvidenceSet,
    answer: &DraftAnswer,
) -> Vec<ChatMessage> {
    let context = evidence
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    vec![
        ChatMessage::system(JUDGE_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Question: {}\n\nContext:\n{}\n\nAnswer: {}\n\nEvaluation:",
            query.text(),
            context,
            answer.text()
        )),
    ]
}
