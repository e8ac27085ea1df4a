//! Prompt assembly and context-window budgeting.
//!
//! Token counts are estimated at four characters per token.

pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 4000;

/// Appended to context that was cut to fit the budget.
pub const TRUNCATION_MARKER: &str = "...";

const CHARS_PER_TOKEN: usize = 4;

/// Estimated token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

/// Cut `text` to at most `max_tokens` estimated tokens.
///
/// When cutting, the text ends at the last whitespace inside the final 20%
/// of the allowed length if there is one (otherwise at the hard limit) and
/// [`TRUNCATION_MARKER`] is appended. Returns the text and whether it was
/// cut.
pub fn truncate_to_budget(text: &str, max_tokens: usize) -> (String, bool) {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }

    let head: Vec<char> = text.chars().take(max_chars).collect();
    let min_cut = max_chars * 4 / 5;
    let cut = head
        .iter()
        .rposition(|c| c.is_whitespace())
        .filter(|&pos| pos > min_cut)
        .unwrap_or(max_chars);

    let mut out: String = head[..cut].iter().collect();
    out.push_str(TRUNCATION_MARKER);
    (out, true)
}

/// Question-answering prompt over retrieved context.
pub fn build_rag_prompt(question: &str, context: &str) -> String {
    format!(
        "Use only the following context to answer the question at the end. \
         If the context does not contain the answer, say clearly that the \
         document does not provide this information; do not make one up.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        context, question
    )
}

/// Template for caller-supplied context on the pass-through endpoint.
pub fn build_context_prompt(question: &str, context: &str) -> String {
    format!(
        "Context: {}\n\n\
         Question: {}\n\n\
         Answer based on the context provided. If the information is not in \
         the context, say so clearly.",
        context, question
    )
}
