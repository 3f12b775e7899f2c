//! Local Ollama adapter over `/api/chat`.

use reqwest::Client;
use serde_json::{Map, Value, json};

use super::{DispatchError, ProviderKind, ResolvedCall, endpoint, post_json};
use crate::config::LlmSettings;

const PROVIDER: ProviderKind = ProviderKind::Ollama;

pub(crate) async fn complete(
    client: &Client,
    settings: &LlmSettings,
    call: ResolvedCall<'_>,
) -> Result<String, DispatchError> {
    let url = endpoint(&settings.ollama_url, "api/chat");
    let body = post_json(client, PROVIDER, &url, None, &build_payload(&call)).await?;
    parse_response(&body)
}

/// `{model, messages, options{temperature, top_p?, stop?, num_predict?}, stream: false}`.
pub(crate) fn build_payload(call: &ResolvedCall<'_>) -> Value {
    let request = call.request;
    let mut options = Map::new();
    options.insert("temperature".into(), json!(request.temperature));
    if let Some(top_p) = request.sampling.top_p {
        options.insert("top_p".into(), json!(top_p));
    }
    if let Some(stop) = &request.sampling.stop {
        options.insert("stop".into(), json!(stop.to_list()));
    }
    if let Some(max) = request.sampling.max_output_tokens {
        options.insert("num_predict".into(), json!(max));
    }

    json!({
        "model": call.model,
        "messages": request.messages,
        "options": Value::Object(options),
        "stream": false,
    })
}

/// `message.content`, falling back to a trimmed `response`.
pub(crate) fn parse_response(body: &Value) -> Result<String, DispatchError> {
    if let Some(content) = body
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
    {
        return Ok(content.to_string());
    }
    body.get("response")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| DispatchError::upstream(PROVIDER, "No message content in response"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        Dispatch, ProviderDispatcher, StopSequences,
        tests::{request, settings},
    };
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn ollama_receives_options_and_non_streaming_flag() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat").json_body_partial(
                    json!({
                        "model": "m1",
                        "stream": false,
                        "options": { "temperature": 0.2, "top_p": 0.9, "stop": ["END"], "num_predict": 32 }
                    })
                    .to_string(),
                );
                then.status(200).json_body(json!({
                    "model": "m1",
                    "message": { "role": "assistant", "content": "local reply" },
                    "done": true
                }));
            })
            .await;

        let dispatcher = ProviderDispatcher::new(settings(&server.base_url())).expect("dispatcher");
        let mut req = request("ollama");
        req.sampling.top_p = Some(0.9);
        req.sampling.stop = Some(StopSequences::One("END".into()));
        req.sampling.max_output_tokens = Some(32);
        let answer = dispatcher.dispatch(req).await.expect("answer");

        mock.assert();
        assert_eq!(answer, "local reply");
    }

    #[tokio::test]
    async fn default_provider_comes_from_settings() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/chat")
                    .json_body_partial(json!({ "model": "llama3:latest" }).to_string());
                then.status(200).json_body(json!({ "response": "  legacy reply \n" }));
            })
            .await;

        let dispatcher = ProviderDispatcher::new(settings(&server.base_url())).expect("dispatcher");
        let mut req = request("ollama");
        req.provider = None;
        req.model = None;
        let answer = dispatcher.dispatch(req).await.expect("answer");

        mock.assert();
        assert_eq!(answer, "legacy reply");
    }

    #[tokio::test]
    async fn ollama_error_status_is_upstream() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(404).json_body(json!({ "error": "model 'm1' not found" }));
            })
            .await;

        let dispatcher = ProviderDispatcher::new(settings(&server.base_url())).expect("dispatcher");
        let err = dispatcher.dispatch(request("ollama")).await.expect_err("upstream");
        assert!(err.to_string().contains("model 'm1' not found"));
    }

    #[tokio::test]
    async fn configured_token_cap_applies_when_request_sets_none() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/chat")
                    .json_body_partial(json!({ "options": { "num_predict": 1024 } }).to_string());
                then.status(200).json_body(json!({ "message": { "content": "capped reply" } }));
            })
            .await;

        let mut config = settings(&server.base_url());
        config.max_output_tokens = Some(1024);
        let dispatcher = ProviderDispatcher::new(config).expect("dispatcher");
        let answer = dispatcher.dispatch(request("ollama")).await.expect("answer");

        mock.assert();
        assert_eq!(answer, "capped reply");
    }
}
