//! Grounded prompt assembly.
//!
//! [`build_messages`] is pure: the same question and context always render the same
//! messages. Citation numbers in the rendered block are the items' `citation_index`
//! values, so `[n]` in an answer points at the n-th source returned to the caller.

use serde::{Deserialize, Serialize};

use crate::retrieval::ContextItem;

/// Fixed reply used whenever the answer is not grounded in the retrieved passages.
pub const OOS_REPLY: &str = "I'm sorry, I don't have information about that.";

const EMPTY_CONTEXT: &str = "No context.";

/// System instructions shared by every grounded request.
pub const SYSTEM_PROMPT: &str = "\
You are a careful, friendly research assistant who answers with citations.
Keep a warm and precise tone.
Your first rule: answer ONLY from the numbered CONTEXT passages. Never use outside knowledge and never guess.
If the CONTEXT does not contain the answer, reply exactly:
\"I'm sorry, I don't have information about that.\"

Style and constraints:
- Be concise and concrete. Prefer plain language.
- Use short bullet points when they help.
- Every factual sentence MUST cite the CONTEXT with bracket numbers such as [1] or [2].
- Put citations directly after the sentence they support.
- When several passages support one sentence, chain them like [1][3].
- Only cite indices that appear in the CONTEXT. Never invent or change a citation.
- If passages conflict or look incomplete, say so briefly and ask one focused follow-up question.
- Do not refer to \"the context\" or \"the prompt\" in the answer.

Output sections, in this order (skip a section only when it would be empty):
- Answer: the direct answer first, in one to four sentences or short bullets.
- Reasoning: one to four short bullets on how the passages support the answer, referencing indices like [2].
- Sources: the citations you used, for example [1], [3]. Nothing else.

Before replying, silently check that every claim carries a correct citation, that nothing comes from outside the CONTEXT, and that an unanswerable question gets the exact refusal above.";

/// Speaker of a completion message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions.
    System,
    /// The asking user.
    User,
    /// A model reply.
    Assistant,
}

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    /// Speaker.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl CompletionMessage {
    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Knobs for the user-turn instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptOptions {
    /// Most citation indices allowed in a single sentence.
    pub max_citations_per_sentence: usize,
    /// Ask for the Reasoning section.
    pub include_reasoning: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_citations_per_sentence: 2,
            include_reasoning: true,
        }
    }
}

/// Render the grounded message pair for `query` with default options.
pub fn build_messages(query: &str, items: &[ContextItem]) -> Vec<CompletionMessage> {
    build_messages_with(query, items, PromptOptions::default())
}

/// Render the grounded message pair for `query`.
pub fn build_messages_with(
    query: &str,
    items: &[ContextItem],
    options: PromptOptions,
) -> Vec<CompletionMessage> {
    let reasoning = if options.include_reasoning {
        "- Include a brief Reasoning section with one to four bullets.\n"
    } else {
        ""
    };

    let user = format!(
        "QUESTION:\n{question}\n\n\
         CONTEXT:\n{context}\n\n\
         Instructions:\n\
         - Use ONLY the CONTEXT above to answer.\n\
         - If the answer is not in the CONTEXT, reply exactly: \"{OOS_REPLY}\".\n\
         - Cite with [n] where n is the CONTEXT number.\n\
         {reasoning}\
         - Use at most {max} citation indices per sentence.\n\
         - Output sections in the order: Answer, Reasoning, Sources.",
        question = query.trim(),
        context = numbered_context(items),
        max = options.max_citations_per_sentence,
    );

    vec![CompletionMessage::system(SYSTEM_PROMPT), CompletionMessage::user(user)]
}

/// `[i] text` per item joined by blank lines, or `No context.` when empty.
pub fn numbered_context(items: &[ContextItem]) -> String {
    if items.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }
    items
        .iter()
        .map(|item| format!("[{}] {}", item.citation_index, item.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
