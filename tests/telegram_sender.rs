// tests/telegram_sender.rs
//
// TelegramSender wire format and error mapping against wiremock.

use saylor_watch::notify::{MessageSender, TelegramSender};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn posts_html_message_to_bot_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTEST-TOKEN/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": "42",
            "text": "<b>hi</b>",
            "parse_mode": "HTML",
            "disable_web_page_preview": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let s = TelegramSender::new("TEST-TOKEN".into()).with_api_base(server.uri());
    s.send("42", "<b>hi</b>").await.unwrap();
}

#[tokio::test]
async fn api_error_is_reported_without_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"ok": false, "description": "Bad Request: chat not found"})),
        )
        .mount(&server)
        .await;

    let s = TelegramSender::new("SECRET".into()).with_api_base(format!("{}/", server.uri()));
    let err = s.send("1", "x").await.unwrap_err().to_string();
    assert!(err.contains("chat not found"), "{err}");
    assert!(!err.contains("SECRET"));
    assert!(!format!("{s:?}").contains("SECRET"));
}

#[tokio::test]
async fn transport_error_hides_token() {
    let s = TelegramSender::new("SECRET".into())
        .with_api_base("http://127.0.0.1:9")
        .with_timeout(2);
    let err = format!("{:#}", s.send("1", "x").await.unwrap_err());
    assert!(!err.contains("SECRET"), "{err}");
}
