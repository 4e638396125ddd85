// Prompt constants for the Advisory Oracle.
// Every template embeds a JSON brief via `{brief}` replacement and demands
// JSON-only output; the caller validates structure before trusting anything.

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Squad proposal request. Asks for exactly 3 ranked proposals; the matcher
/// discards any proposal that breaks role coverage or duplicates a candidate.
pub const SQUAD_PROPOSAL_TEMPLATE: &str = r#"You are assembling teams for a collaborative project.

Project brief and candidate pool:
{brief}

Produce EXACTLY 3 ranked team proposals. Rules:
- Each proposal must assign every listed role to exactly one candidate from the pool, by candidate_id.
- A candidate may appear at most once within a single proposal.
- Rank proposals best-first and give each a harmony_score between 0 and 100 estimating how well the members complement each other.
- For each member give a one-sentence match_reason grounded in their skills or summary.

Respond with JSON of this exact shape:
{"proposals": [{"harmony_score": 0, "members": [{"role_name": "", "candidate_id": "", "match_reason": ""}]}]}"#;

/// Anonymize-and-summarize request for a completed job. The brief carries no
/// candidate identifiers; the instruction additionally bans names and employers
/// in the output so the record stays portable.
pub const WORK_SUMMARY_TEMPLATE: &str = r#"Summarize the following completed, fully verified project work for a portable portfolio record.

Work brief:
{brief}

Rules:
- The output must be fully anonymized: no person names, company names, product names, or other identifiers.
- "abstract": 2-3 sentences describing what was delivered and why it mattered.
- "breakdown": a short technical narrative of the modules and the work done in each.
- "tags": 3-8 lowercase skill tags evidenced by the task list.

Respond with JSON of this exact shape:
{"abstract": "", "breakdown": "", "tags": [""]}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_carry_brief_placeholder() {
        assert!(SQUAD_PROPOSAL_TEMPLATE.contains("{brief}"));
        assert!(WORK_SUMMARY_TEMPLATE.contains("{brief}"));
    }
}
