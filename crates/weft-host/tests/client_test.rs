use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde_json::{Value, json};
use weft_host::{
  CompletionParams, HostError, HttpClient, HttpRequest, LanguageModel, OpenAiCompatibleModel,
  Prompt, ReqwestHttpClient,
};

async fn serve(app: Router) -> SocketAddr {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  addr
}

async fn chat(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
  let auth = headers
    .get("authorization")
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default()
    .to_string();
  let last = body["messages"]
    .as_array()
    .and_then(|m| m.last())
    .map(|m| m["content"].clone())
    .unwrap_or(Value::Null);
  let model = body["model"].as_str().unwrap_or("");
  let content = format!("model={model} auth={auth} said={}", last.as_str().unwrap_or(""));

  Json(json!({
    "choices": [{
      "message": {
        "role": "assistant",
        "content": content
      }
    }],
    "usage": { "prompt_tokens": 7, "completion_tokens": 5, "total_tokens": 12 }
  }))
}

fn request(method: &str, url: String) -> HttpRequest {
  HttpRequest {
    method: method.to_string(),
    url,
    headers: BTreeMap::new(),
    body: None,
    timeout: Duration::from_secs(5),
  }
}

#[tokio::test]
async fn test_http_client_parses_json_and_text() {
  let app = Router::new()
    .route("/weather", get(|| async { Json(json!({ "temp": 31 })) }))
    .route("/plain", get(|| async { "hello" }))
    .route(
      "/echo",
      post(|Json(body): Json<Value>| async move { Json(body) }),
    );
  let addr = serve(app).await;
  let client = ReqwestHttpClient::new();

  let response = client
    .request(request("GET", format!("http://{addr}/weather")))
    .await
    .unwrap();
  assert_eq!(response.status, 200);
  assert_eq!(response.body, json!({ "temp": 31 }));
  assert!(response.headers.contains_key("content-type"));

  let response = client
    .request(request("GET", format!("http://{addr}/plain")))
    .await
    .unwrap();
  assert_eq!(response.body, json!("hello"));

  let mut echo = request("post", format!("http://{addr}/echo"));
  echo.body = Some(json!({ "city": "Bangkok" }));
  let response = client.request(echo).await.unwrap();
  assert_eq!(response.body["city"], "Bangkok");
}

#[tokio::test]
async fn test_http_client_returns_error_statuses() {
  let app = Router::new().route(
    "/down",
    get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
  );
  let addr = serve(app).await;

  let response = ReqwestHttpClient::new()
    .request(request("GET", format!("http://{addr}/down")))
    .await
    .unwrap();
  assert_eq!(response.status, 503);
  assert!(!response.is_success());
}

#[tokio::test]
async fn test_http_client_transport_and_timeout() {
  let client = ReqwestHttpClient::new();

  // Nothing listens on port 9 locally.
  let err = client
    .request(request("GET", "http://127.0.0.1:9/".to_string()))
    .await
    .unwrap_err();
  assert!(err.is_transient(), "{err}");

  let app = Router::new().route(
    "/slow",
    get(|| async {
      tokio::time::sleep(Duration::from_secs(2)).await;
      "late"
    }),
  );
  let addr = serve(app).await;
  let mut slow = request("GET", format!("http://{addr}/slow"));
  slow.timeout = Duration::from_millis(100);
  let err = client.request(slow).await.unwrap_err();
  assert_eq!(err, HostError::Timeout(Duration::from_millis(100)));
}

#[tokio::test]
async fn test_openai_compatible_completion() {
  let app = Router::new().route("/v1/chat/completions", post(chat));
  let addr = serve(app).await;

  let model = OpenAiCompatibleModel::new(format!("http://{addr}/v1/"), "gpt-4o-mini")
    .with_api_key("secret");
  let completion = model
    .complete(
      &Prompt {
        system: Some("Be brief.".to_string()),
        user: "Weather in Bangkok?".to_string(),
      },
      &CompletionParams::default(),
    )
    .await
    .unwrap();

  assert_eq!(completion.tokens_used, 12);
  assert_eq!(
    completion.text,
    "model=gpt-4o-mini auth=Bearer secret said=Weather in Bangkok?"
  );

  let completion = model
    .complete(
      &Prompt {
        system: None,
        user: "hi".to_string(),
      },
      &CompletionParams {
        model: Some("llama3".to_string()),
        ..Default::default()
      },
    )
    .await
    .unwrap();
  assert!(completion.text.starts_with("model=llama3"));
}

#[tokio::test]
async fn test_openai_compatible_status_error() {
  let app = Router::new().route(
    "/chat/completions",
    post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
  );
  let addr = serve(app).await;

  let err = OpenAiCompatibleModel::new(format!("http://{addr}"), "gpt-4o-mini")
    .complete(&Prompt::default(), &CompletionParams::default())
    .await
    .unwrap_err();

  assert_eq!(
    err,
    HostError::Status {
      status: 429,
      body: "slow down".to_string()
    }
  );
  assert!(err.is_transient());
}
