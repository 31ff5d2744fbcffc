//! Structured extraction over the language-model capability. Each call
//! sends a single-purpose system prompt and parses the JSON reply with a
//! tolerant fallback chain; callers degrade to deterministic behavior when
//! the provider is unreachable or returns garbage.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::services::ai::{LlmProvider, Message};
use crate::services::extract;

const NAME_SYSTEM_PROMPT: &str = r#"You extract patient names from chat messages.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{"first_name": "", "last_name": ""}

Use empty strings when a name is not clearly present.

Examples:
"I am John Smith" -> {"first_name": "John", "last_name": "Smith"}
"my name is Sarah" -> {"first_name": "Sarah", "last_name": ""}
"hello there" -> {"first_name": "", "last_name": ""}
"#;

const INSURANCE_SYSTEM_PROMPT: &str = r#"You extract insurance details from chat messages.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{"carrier": "", "member_id": "", "group_number": ""}

Use empty strings for anything missing.

Examples:
"Blue Cross Blue Shield, member ID 123456789, group 987654" -> {"carrier": "Blue Cross Blue Shield", "member_id": "123456789", "group_number": "987654"}
"Aetna insurance" -> {"carrier": "Aetna", "member_id": "", "group_number": ""}
"#;

#[derive(Debug, Deserialize)]
struct NameResponse {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct InsuranceFields {
    #[serde(default)]
    pub carrier: String,
    #[serde(default)]
    pub member_id: String,
    #[serde(default)]
    pub group_number: String,
}

/// Model-backed name extraction. `Ok(None)` is the explicit not-found
/// signal; errors mean the capability itself was unreachable.
pub async fn extract_names(
    llm: &dyn LlmProvider,
    text: &str,
) -> anyhow::Result<Option<(String, Option<String>)>> {
    let response = llm
        .chat(
            NAME_SYSTEM_PROMPT,
            &[Message {
                role: "user".to_string(),
                content: text.to_string(),
            }],
        )
        .await?;

    let parsed: NameResponse = parse_json_response(&response)?;
    let first = parsed.first_name.trim().to_string();
    if first.len() < 2 || extract::is_stop_word(&first) {
        return Ok(None);
    }

    let last = Some(parsed.last_name.trim().to_string()).filter(|l| !l.is_empty());
    Ok(Some((first, last)))
}

pub async fn extract_insurance(
    llm: &dyn LlmProvider,
    text: &str,
) -> anyhow::Result<InsuranceFields> {
    let response = llm
        .chat(
            INSURANCE_SYSTEM_PROMPT,
            &[Message {
                role: "user".to_string(),
                content: text.to_string(),
            }],
        )
        .await?;

    parse_json_response(&response)
}

/// Parse a model reply that should be a JSON object: direct parse first,
/// then with markdown fences stripped, then the outermost brace span.
fn parse_json_response<T: DeserializeOwned>(response: &str) -> anyhow::Result<T> {
    if let Ok(value) = serde_json::from_str::<T>(response) {
        return Ok(value);
    }

    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(value) = serde_json::from_str::<T>(cleaned) {
        return Ok(value);
    }

    if let Some(start) = cleaned.find('{') {
        if let Some(end) = cleaned.rfind('}') {
            if let Ok(value) = serde_json::from_str::<T>(&cleaned[start..=end]) {
                return Ok(value);
            }
        }
    }

    anyhow::bail!("response is not the expected JSON object: {response}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct_json() {
        let parsed: InsuranceFields =
            parse_json_response(r#"{"carrier":"Aetna","member_id":"123","group_number":""}"#)
                .unwrap();
        assert_eq!(parsed.carrier, "Aetna");
        assert_eq!(parsed.member_id, "123");
        assert_eq!(parsed.group_number, "");
    }

    #[test]
    fn test_parse_fenced_json() {
        let response = "```json\n{\"first_name\":\"John\",\"last_name\":\"Doe\"}\n```";
        let parsed: NameResponse = parse_json_response(response).unwrap();
        assert_eq!(parsed.first_name, "John");
        assert_eq!(parsed.last_name, "Doe");
    }

    #[test]
    fn test_parse_embedded_json() {
        let response = "Sure, here you go: {\"first_name\":\"Sarah\",\"last_name\":\"\"} hope that helps";
        let parsed: NameResponse = parse_json_response(response).unwrap();
        assert_eq!(parsed.first_name, "Sarah");
        assert_eq!(parsed.last_name, "");
    }

    #[test]
    fn test_parse_garbage_fails() {
        let result: anyhow::Result<NameResponse> =
            parse_json_response("I don't understand the format you want");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_fields_default_empty() {
        let parsed: InsuranceFields = parse_json_response(r#"{"carrier":"Cigna"}"#).unwrap();
        assert_eq!(parsed.carrier, "Cigna");
        assert!(parsed.member_id.is_empty());
    }
}
