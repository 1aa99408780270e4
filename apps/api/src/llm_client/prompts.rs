// Shared prompt fragments. Workflow-specific prompts live in pipeline/prompts.rs.

/// System instruction sent with every call. Responses are parsed as JSON.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON value. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every cover-letter item prompt.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Write only from the experiences listed in <retrieved_experiences>. \
    Do NOT infer, interpolate, or invent details that are not stated there. \
    If the experiences do not support a claim, leave it out.";
