//! Chat-completions wire shape shared by the hosted and compatible adapters.

use serde_json::{Map, Value, json};

use super::{DispatchError, ProviderKind, ResolvedCall};

/// `{model, messages, temperature, top_p?, stop?, max_tokens?}`.
pub(crate) fn build_payload(call: &ResolvedCall<'_>) -> Value {
    let request = call.request;
    let mut payload = Map::new();
    payload.insert("model".into(), json!(call.model));
    payload.insert("messages".into(), json!(request.messages));
    payload.insert("temperature".into(), json!(request.temperature));
    if let Some(top_p) = request.sampling.top_p {
        payload.insert("top_p".into(), json!(top_p));
    }
    if let Some(stop) = &request.sampling.stop {
        payload.insert("stop".into(), json!(stop));
    }
    if let Some(max_tokens) = request.sampling.max_output_tokens {
        payload.insert("max_tokens".into(), json!(max_tokens));
    }
    Value::Object(payload)
}

/// Read `choices[0].message.content`.
pub(crate) fn parse_response(provider: ProviderKind, body: &Value) -> Result<String, DispatchError> {
    let choice = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .ok_or_else(|| DispatchError::upstream(provider, "No choices in response"))?;

    choice
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DispatchError::upstream(provider, "No message content in choice"))
}
