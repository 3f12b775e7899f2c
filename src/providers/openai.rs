//! Hosted OpenAI adapter: Responses shape by default, chat-completions on request.

use reqwest::Client;
use serde_json::{Map, Value, json};

use super::{DispatchError, ProviderKind, ResolvedCall, chat, endpoint, post_json};
use crate::config::LlmSettings;
use crate::prompt::Role;

const PROVIDER: ProviderKind = ProviderKind::OpenAi;

pub(crate) async fn complete(
    client: &Client,
    settings: &LlmSettings,
    call: ResolvedCall<'_>,
) -> Result<String, DispatchError> {
    let api_key = call
        .api_key
        .as_deref()
        .ok_or(DispatchError::MissingCredential)?;
    let use_responses = call
        .request
        .sampling
        .use_responses_api
        .unwrap_or(settings.use_responses_api);

    if use_responses {
        let url = endpoint(&settings.openai_base_url, "responses");
        let body = post_json(client, PROVIDER, &url, Some(api_key), &build_responses_payload(&call)).await?;
        parse_responses_output(&body)
    } else {
        let url = endpoint(&settings.openai_base_url, "chat/completions");
        let body = post_json(client, PROVIDER, &url, Some(api_key), &chat::build_payload(&call)).await?;
        chat::parse_response(PROVIDER, &body)
    }
}

/// System messages become `instructions`; other turns become typed `input` segments.
pub(crate) fn build_responses_payload(call: &ResolvedCall<'_>) -> Value {
    let request = call.request;
    let instructions = request
        .messages
        .iter()
        .filter(|message| message.role == Role::System)
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let mut input: Vec<Value> = request
        .messages
        .iter()
        .filter(|message| message.role != Role::System)
        .map(|message| {
            json!({
                "role": message.role,
                "content": [ { "type": "input_text", "text": message.content } ],
            })
        })
        .collect();
    if input.is_empty() {
        input.push(json!({
            "role": "user",
            "content": [ { "type": "input_text", "text": "" } ],
        }));
    }

    let mut payload = Map::new();
    payload.insert("model".into(), json!(call.model));
    payload.insert("input".into(), Value::Array(input));
    payload.insert("temperature".into(), json!(request.temperature));
    if !instructions.is_empty() {
        payload.insert("instructions".into(), json!(instructions));
    }
    if let Some(max) = request.sampling.max_output_tokens {
        payload.insert("max_output_tokens".into(), json!(max));
    }
    if let Some(top_p) = request.sampling.top_p {
        payload.insert("top_p".into(), json!(top_p));
    }
    if let Some(stop) = &request.sampling.stop {
        payload.insert("stop".into(), json!(stop));
    }
    Value::Object(payload)
}

/// `output_text` when present, else the concatenated `output_text` segments of `output`.
pub(crate) fn parse_responses_output(body: &Value) -> Result<String, DispatchError> {
    if let Some(text) = body.get("output_text").and_then(Value::as_str) {
        return Ok(text.to_string());
    }

    let segments: Vec<&str> = body
        .get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if segments.is_empty() {
        return Err(DispatchError::upstream(PROVIDER, "No output text in response"));
    }
    Ok(segments.concat())
}
