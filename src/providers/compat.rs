//! Remote OpenAI-compatible servers (vLLM, LM Studio, llama.cpp and friends).

use reqwest::Client;

use super::{DispatchError, ProviderKind, ResolvedCall, chat, endpoint, post_json};
use crate::config::LlmSettings;

const PROVIDER: ProviderKind = ProviderKind::OpenAiCompat;

/// Chat-completions call against `LLM_BASE_URL`. The bearer is the caller's key or
/// `LLM_API_KEY`, and is omitted when neither exists.
pub(crate) async fn complete(
    client: &Client,
    settings: &LlmSettings,
    call: ResolvedCall<'_>,
) -> Result<String, DispatchError> {
    let url = endpoint(&settings.compat_base_url, "chat/completions");
    let body = post_json(
        client,
        PROVIDER,
        &url,
        call.api_key.as_deref(),
        &chat::build_payload(&call),
    )
    .await?;
    chat::parse_response(PROVIDER, &body)
}

#[cfg(test)]
mod tests {
    use crate::providers::{
        Dispatch, DispatchError, ProviderDispatcher,
        tests::{request, settings},
    };
    use httpmock::{Method::POST, MockServer, prelude::HttpMockRequest};
    use serde_json::json;

    fn without_authorization(req: &HttpMockRequest) -> bool {
        req.headers.as_ref().is_none_or(|headers| {
            !headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("authorization"))
        })
    }

    #[tokio::test]
    async fn compat_works_without_key_and_reads_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .json_body_partial(
                        json!({ "model": "m1", "messages": [ { "role": "system", "content": "rules" } ] })
                            .to_string(),
                    );
                then.status(200).json_body(json!({
                    "choices": [ { "message": { "role": "assistant", "content": "compat reply" } } ]
                }));
            })
            .await;

        let dispatcher = ProviderDispatcher::new(settings(&server.base_url())).expect("dispatcher");
        let answer = dispatcher
            .dispatch(request("openai_compat"))
            .await
            .expect("answer");

        mock.assert();
        assert_eq!(answer, "compat reply");
    }

    #[tokio::test]
    async fn malformed_bodies_are_upstream_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).body("not json");
            })
            .await;

        let dispatcher = ProviderDispatcher::new(settings(&server.base_url())).expect("dispatcher");
        let err = dispatcher
            .dispatch(request("openai_compat"))
            .await
            .expect_err("malformed");
        assert!(matches!(err, DispatchError::Upstream { .. }));
    }

    #[tokio::test]
    async fn hosted_key_is_never_sent_to_compat_server() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .matches(without_authorization);
                then.status(200).json_body(json!({
                    "choices": [ { "message": { "content": "anonymous reply" } } ]
                }));
            })
            .await;

        let mut config = settings(&server.base_url());
        config.openai_api_key = Some("sk-hosted-secret".into());
        let dispatcher = ProviderDispatcher::new(config).expect("dispatcher");
        let answer = dispatcher
            .dispatch(request("openai_compat"))
            .await
            .expect("answer");

        mock.assert();
        assert_eq!(answer, "anonymous reply");
    }

    #[tokio::test]
    async fn compat_key_is_sent_as_bearer() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-compat");
                then.status(200).json_body(json!({
                    "choices": [ { "message": { "content": "keyed reply" } } ]
                }));
            })
            .await;

        let mut config = settings(&server.base_url());
        config.openai_api_key = Some("sk-hosted-secret".into());
        config.compat_api_key = Some("sk-compat".into());
        let dispatcher = ProviderDispatcher::new(config).expect("dispatcher");
        let answer = dispatcher
            .dispatch(request("openai_compat"))
            .await
            .expect("answer");

        mock.assert();
        assert_eq!(answer, "keyed reply");
    }
}
