/// Returned verbatim by the model when the context does not hold the answer.
pub const FALLBACK_ANSWER: &str = "I'm not sure based on the provided information.";

pub fn grounded_answer_prompt(context: &str, question: &str) -> String {
    format!(
        r#"You are a helpful and factual AI assistant.
Use the following retrieved context to answer the user's question.
If the answer is not found in the context, reply with:
"{FALLBACK_ANSWER}"

<context>
{context}
</context>

Question: {question}
"#
    )
}
