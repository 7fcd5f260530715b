// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn chat_request_body_shape() {
    let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hello")];
    let body = WireChatRequest {
        model: "gpt-4o-mini",
        messages: &messages,
        temperature: Some(0.2),
        max_tokens: None,
    };
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(value["model"], "gpt-4o-mini");
    assert_eq!(value["messages"][0]["role"], "system");
    assert_eq!(value["messages"][1]["content"], "hello");
    assert_eq!(value["temperature"], 0.2);
    assert!(value.get("max_tokens").is_none());
}

#[test]
fn chat_response_parses_content_and_usage() {
    let text = json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"ok\": true}"}}],
        "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
    })
    .to_string();

    let parsed: WireChatResponse = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.choices[0].message.content, "{\"ok\": true}");
    assert_eq!(parsed.usage.total_tokens, 16);
}

#[test]
fn chat_response_tolerates_missing_usage() {
    let text = json!({
        "choices": [{"message": {"content": "hi"}}]
    })
    .to_string();
    let parsed: WireChatResponse = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.usage, TokenCounts::default());
}

#[test]
fn embedding_response_parses_vectors() {
    let text = json!({
        "data": [{"embedding": [0.1, 0.2]}, {"embedding": [0.3, 0.4]}],
        "usage": {"prompt_tokens": 8, "total_tokens": 8}
    })
    .to_string();
    let parsed: WireEmbeddingResponse = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.data.len(), 2);
    assert_eq!(parsed.data[1].embedding, vec![0.3, 0.4]);
}

#[test]
fn base_url_trailing_slash_is_normalized() {
    let model = OpenAiChatModel::new("c1", "m1", "key", UsageLedger::new())
        .with_base_url("https://example.test/v1/");
    assert_eq!(model.base_url, "https://example.test/v1");
}
