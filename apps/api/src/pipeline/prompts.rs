// Prompt templates and response schemas for the three workflow steps.
// Placeholders are `{name}` and are filled with `str::replace`.

use serde_json::{json, Value};

use super::job::ItemRequest;
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;

/// Step 1: structure a raw job posting.
pub const ANALYZE_PROMPT_TEMPLATE: &str = r#"Analyze the following job posting and extract its key facts.

Return a JSON object with exactly these fields:
- "company_name": the hiring company
- "position_title": the role being hired for
- "experience": required years or level of experience
- "position_detail": what the person will do day to day
- "required_qualifications": must-have qualifications
- "preferred_qualifications": nice-to-have qualifications

If a field is not stated in the posting, use an empty string.

<job_posting>
{job_posting}
</job_posting>"#;

/// Step 2: one vector-store search query per cover-letter question.
pub const SEARCH_QUERY_PROMPT_TEMPLATE: &str = r#"You design search queries for a library of the applicant's past experiences.

For each cover-letter question below, write one search query that would surface the
applicant's strongest matching experience. A good query fuses the intent of the question
(collaboration, ownership, technical depth, ...) with the core competencies the posting asks
for, phrased as a concrete scenario rather than a bag of keywords.

Bad query: "project experience"
Good query: "improved recommendation accuracy by 10% with Python and TensorFlow, owning the work from preprocessing to evaluation"

<job_analysis>
{analysis_json}
</job_analysis>

<questions>
{questions}
</questions>

Return a JSON list with exactly one entry per question:
[{"id": "question id", "query": "generated query"}]"#;

/// Step 3: answer a single cover-letter question.
pub const ITEM_PROMPT_TEMPLATE: &str = r#"You are an expert career consultant writing one answer of a cover letter.

<job_analysis>
{analysis_json}
</job_analysis>

<cover_letter_question>
Question: {question}
Character limit: {char_limit}
</cover_letter_question>

<retrieved_experiences>
{references}
</retrieved_experiences>

Guidelines:
- Follow the Situation, Task, Action, Result flow, but never print those labels.
- Use an active, confident voice: what problem was solved, how, and what changed.
- Weave in the key terms from the posting's details and requirements naturally.
- Quantify results where the experiences allow; otherwise describe concrete qualitative impact.
- Stay close to {char_limit} characters.
- {grounding_instruction}

Return a JSON object: {"question": "...", "char_limit": {char_limit}, "content": "..."}"#;

pub fn build_analyze_prompt(job_posting: &str) -> String {
    ANALYZE_PROMPT_TEMPLATE.replace("{job_posting}", job_posting)
}

pub fn build_search_query_prompt(analysis: &Value, items: &[ItemRequest]) -> String {
    let questions = items
        .iter()
        .map(|item| format!("- id: {}\n  question: {}", item.id, item.question))
        .collect::<Vec<_>>()
        .join("\n");

    SEARCH_QUERY_PROMPT_TEMPLATE
        .replace("{analysis_json}", &analysis.to_string())
        .replace("{questions}", &questions)
}

pub fn build_item_prompt(analysis: &Value, item: &ItemRequest, references: &[String]) -> String {
    let references = if references.is_empty() {
        "(no stored experiences matched)".to_string()
    } else {
        references.join("\n")
    };

    ITEM_PROMPT_TEMPLATE
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{analysis_json}", &analysis.to_string())
        .replace("{question}", &item.question)
        .replace("{char_limit}", &item.char_limit.to_string())
        .replace("{references}", &references)
}

pub fn analysis_schema() -> Value {
    let field = json!({"type": "STRING"});
    json!({
        "type": "OBJECT",
        "properties": {
            "company_name": field,
            "position_title": field,
            "experience": field,
            "position_detail": field,
            "required_qualifications": field,
            "preferred_qualifications": field
        },
        "required": [
            "company_name",
            "position_title",
            "position_detail",
            "required_qualifications"
        ]
    })
}

pub fn search_query_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": {"type": "STRING"},
                "query": {"type": "STRING"}
            },
            "required": ["id", "query"]
        }
    })
}

pub fn item_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "question": {"type": "STRING"},
            "char_limit": {"type": "INTEGER"},
            "content": {"type": "STRING"}
        },
        "required": ["question", "char_limit", "content"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ItemRequest {
        ItemRequest {
            id: "q1".into(),
            question: "Why this company?".into(),
            char_limit: 500,
        }
    }

    #[test]
    fn test_analyze_prompt_embeds_posting() {
        let prompt = build_analyze_prompt("Senior Rust Engineer at Acme");
        assert!(prompt.contains("Senior Rust Engineer at Acme"));
        assert!(!prompt.contains("{job_posting}"));
    }

    #[test]
    fn test_search_query_prompt_lists_every_question() {
        let items = vec![
            item(),
            ItemRequest {
                id: "q2".into(),
                question: "Describe a conflict.".into(),
                char_limit: 300,
            },
        ];
        let prompt = build_search_query_prompt(&json!({"company_name": "Acme"}), &items);
        assert!(prompt.contains("id: q1"));
        assert!(prompt.contains("Describe a conflict."));
        assert!(prompt.contains("\"company_name\":\"Acme\""));
    }

    #[test]
    fn test_item_prompt_fills_all_placeholders() {
        let prompt = build_item_prompt(&json!({}), &item(), &["Led a migration".to_string()]);
        assert!(prompt.contains("Why this company?"));
        assert!(prompt.contains("Led a migration"));
        assert!(prompt.contains("\"char_limit\": 500"));
        assert!(prompt.contains("CRITICAL"));
        assert!(!prompt.contains("{char_limit}"));
        assert!(!prompt.contains("{grounding_instruction}"));
    }

    #[test]
    fn test_item_prompt_without_references() {
        let prompt = build_item_prompt(&json!({}), &item(), &[]);
        assert!(prompt.contains("no stored experiences matched"));
    }

    #[test]
    fn test_schemas_use_provider_type_names() {
        assert_eq!(analysis_schema()["type"], "OBJECT");
        assert_eq!(search_query_schema()["items"]["type"], "OBJECT");
        assert_eq!(item_schema()["properties"]["char_limit"]["type"], "INTEGER");
    }
}
