//! Drives the client against an in-memory API that rate limits the first few calls.

use async_trait::async_trait;
use sendgrid_retry::prelude::*;
use sendgrid_retry::{LogSink, RetryConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Answers 429 for the first `limited` requests, then 202.
#[derive(Debug)]
struct ThrottledApi {
    limited: usize,
    seen: AtomicUsize,
}

#[async_trait]
impl Transport for ThrottledApi {
    async fn issue_request(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let n = self.seen.fetch_add(1, Ordering::SeqCst);
        println!("{} {} (request #{})", request.method, request.url, n + 1);
        if n < self.limited {
            Ok(ApiResponse {
                status: 429,
                body: r#"{"errors":[{"message":"too many requests"}]}"#.into(),
            })
        } else {
            Ok(ApiResponse { status: 202, body: String::new() })
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let config = ClientConfig::from_env();
    let client = Client::new(config, Arc::new(ThrottledApi { limited: 3, seen: AtomicUsize::new(0) }));

    let policy = RateLimitRetry::builder()
        .backoff(RetryConfig { backoff_base_ms: 200, ..RetryConfig::default() }.to_backoff()?)
        .with_sink(LogSink)
        .build()?;

    let scope = ResourceScope::new(
        "mail-send-demo",
        sendgrid_retry::CrudOperation::Create,
        ResourceTimeouts::uniform(Duration::from_secs(5)),
    );
    let message = serde_json::json!({
        "personalizations": [{ "to": [{ "email": "someone@example.com" }] }],
        "from": { "email": "noreply@example.com" },
        "subject": "hello",
        "content": [{ "type": "text/plain", "value": "hi" }]
    });

    let ctx = CallContext::with_timeout(Duration::from_secs(10));
    let response = policy
        .execute(&ctx, &scope, || async {
            RequestError::check_response(client.post("mail/send", Some(&message)).await?)
        })
        .await?;

    println!("accepted with HTTP {}", response.status);
    Ok(())
}
