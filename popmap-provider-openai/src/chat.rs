//! Chat-completions payloads and the estimation prompt.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use popmap_core::ports::{EstimateRequest, PortError, RawEstimate};

const SYSTEM_PROMPT: &str = "You locate company sites from their names. For every site in the \
user message, guess the city the name refers to, within the given ISO country. Respond with a \
JSON object {\"results\": [{\"id\": string, \"city\": string|null, \"latitude\": number|null, \
\"longitude\": number|null}]} containing exactly one entry per input id. Use null for the city \
when the name gives no hint. Give coordinates only for the city you named.";

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'model> {
    pub(crate) model: &'model str,
    pub(crate) messages: Vec<Message>,
    pub(crate) response_format: ResponseFormat,
    pub(crate) temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Message {
    pub(crate) role: String,
    #[serde(default)]
    pub(crate) content: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResponseFormat {
    #[serde(rename = "type")]
    pub(crate) kind: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub(crate) choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub(crate) message: Message,
}

#[derive(Debug, Deserialize)]
struct Results {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Serialize)]
struct PromptSite<'site> {
    id: &'site str,
    name: &'site str,
    country: &'site str,
}

/// Chat request asking for one estimate per site of `batch`.
pub(crate) fn build_request<'model>(
    model: &'model str,
    batch: &[EstimateRequest],
) -> Result<ChatRequest<'model>, PortError> {
    let sites: Vec<PromptSite<'_>> = batch
        .iter()
        .map(|request| PromptSite {
            id: &request.site_id.0,
            name: &request.name,
            country: request.country.as_str(),
        })
        .collect();
    Ok(ChatRequest {
        model,
        messages: vec![
            Message {
                role: String::from("system"),
                content: Some(SYSTEM_PROMPT.to_owned()),
            },
            Message {
                role: String::from("user"),
                content: Some(serde_json::to_string(&sites)?),
            },
        ],
        response_format: ResponseFormat {
            kind: "json_object",
        },
        temperature: 0.0,
    })
}

/// Entries of the first choice; entries that do not decode are dropped one by one.
pub(crate) fn parse_response(response: ChatResponse) -> Result<Vec<RawEstimate>, PortError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| PortError::Malformed("completion has no content".into()))?;
    let Results { results } = serde_json::from_str(&content)?;

    let total = results.len();
    let entries: Vec<RawEstimate> = results
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(estimate) => Some(estimate),
            Err(error) => {
                debug!(%error, "dropping undecodable estimate entry");
                None
            }
        })
        .collect();
    debug!(total, decoded = entries.len(), "estimation response parsed");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use popmap_core::model::{CountryCode, SiteId};

    use super::*;

    fn response(content: &str) -> ChatResponse {
        ChatResponse {
            choices: vec![Choice {
                message: Message {
                    role: String::from("assistant"),
                    content: Some(content.to_owned()),
                },
            }],
        }
    }

    #[test]
    fn request_lists_every_site_in_json_mode() {
        let batch = [EstimateRequest {
            site_id: SiteId("7".into()),
            name: "Boise Warehouse".into(),
            country: CountryCode::parse("us").expect("valid"),
        }];
        let request = build_request("gpt-4o-mini", &batch).expect("serializable");
        let body = serde_json::to_value(&request).expect("serializable");
        assert_eq!(body["response_format"]["type"], "json_object", "JSON mode");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(2), "system and user");
        let user = body["messages"][1]["content"].as_str().expect("user content");
        let sites: Value = serde_json::from_str(user).expect("user content is JSON");
        assert_eq!(sites[0]["id"], "7", "site id");
        assert_eq!(sites[0]["country"], "US", "normalized country");
    }

    #[test]
    fn undecodable_entries_are_dropped_individually() {
        let parsed = parse_response(response(
            r#"{"results": [
                {"id": "1", "city": "Boise", "latitude": 43.6, "longitude": -116.2},
                {"id": "2", "city": 17},
                "not an object",
                {"site_id": "3", "city": "Nampa", "lat": 43.5, "lng": -116.5}
            ]}"#,
        ))
        .expect("content is JSON");
        let ids: Vec<Option<&str>> = parsed.iter().map(|entry| entry.site_id.as_deref()).collect();
        assert_eq!(ids, [Some("1"), Some("3")], "bad entries dropped, aliases accepted");
    }

    #[test]
    fn empty_completion_is_malformed() {
        let result = parse_response(ChatResponse { choices: Vec::new() });
        assert!(matches!(result, Err(PortError::Malformed(_))), "no choices");
    }

    #[test]
    fn non_json_content_fails_the_batch() {
        let result = parse_response(response("Sorry, I cannot help with that."));
        assert!(matches!(result, Err(PortError::Decode(_))), "whole batch fails");
    }
}
