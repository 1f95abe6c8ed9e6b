use crate::core::document::Document;
use crate::core::llm::ChatMessage;
use crate::core::orchestrator::types::SectionSpec;

const DOCUMENT_CHARS: usize = 12_000;

pub(crate) fn query_messages(spec: &SectionSpec, document: &Document, count: usize) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You plan research for one section of a product requirements review. Write {} short search \
             queries for an internal knowledge base of user research and product analytics that would \
             help evaluate the section below.",
            count
        )),
        ChatMessage::user(format!(
            "Section: {}\nGoal: {}\n\nDocument title: {}\n\n{}",
            spec.name,
            spec.goal,
            document.title,
            document.excerpt(DOCUMENT_CHARS)
        )),
    ]
}

pub(crate) fn section_messages(
    spec: &SectionSpec,
    document: &Document,
    context: &str,
) -> Vec<ChatMessage> {
    let grounding = if context.is_empty() {
        "No internal research was found for this section. Say so where it limits the assessment."
            .to_string()
    } else {
        format!("Internal research:\n\n{}", context)
    };
    vec![
        ChatMessage::system(format!(
            "You review the '{}' section of a product requirements document.\n\
             Goal: {}\n\
             Ground claims in the internal research when possible and name the source you rely on. \
             Score the section from 0 (missing) to 5 (excellent).",
            spec.name, spec.goal
        )),
        ChatMessage::user(format!(
            "Document: {}\n\n{}\n\n---\n\n{}",
            document.title,
            document.excerpt(DOCUMENT_CHARS),
            grounding
        )),
    ]
}
