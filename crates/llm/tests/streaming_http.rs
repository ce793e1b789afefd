use std::time::Duration;

use ngmentor_llm::{
    ChatMessage, ClientConfig, CompletionClient, CompletionProvider, ModelCatalogSource,
    RequestOverrides, StreamEvent, fetch_model_catalog,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

struct CannedResponse {
    status_line: &'static str,
    content_type: &'static str,
    chunks: Vec<String>,
    hold_open: bool,
}

impl CannedResponse {
    fn event_stream(chunks: Vec<String>) -> Self {
        Self {
            status_line: "HTTP/1.1 200 OK",
            content_type: "text/event-stream",
            chunks,
            hold_open: false,
        }
    }

    fn status(status_line: &'static str, body: &str) -> Self {
        Self {
            status_line,
            content_type: "application/json",
            chunks: vec![body.to_string()],
            hold_open: false,
        }
    }
}

#[derive(Debug)]
struct CapturedRequest {
    head: String,
    body: String,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

async fn read_request(socket: &mut TcpStream) -> CapturedRequest {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];

    let head_end = loop {
        let read = socket.read(&mut chunk).await.unwrap();
        assert!(read > 0, "client closed before sending headers");
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(position) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().unwrap())
        })
        .unwrap_or(0);

    while buffer.len() < head_end + content_length {
        let read = socket.read(&mut chunk).await.unwrap();
        assert!(read > 0, "client closed before sending body");
        buffer.extend_from_slice(&chunk[..read]);
    }

    CapturedRequest {
        head,
        body: String::from_utf8_lossy(&buffer[head_end..head_end + content_length]).to_string(),
    }
}

/// Serves exactly one request. The body is close-delimited so every chunk is
/// written with a pause, exercising reassembly across reads.
async fn serve_once(response: CannedResponse) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        let head = format!(
            "{}\r\ncontent-type: {}\r\nconnection: close\r\n\r\n",
            response.status_line, response.content_type
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        for chunk in &response.chunks {
            // The client may already have hung up in cancellation tests.
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                return request;
            }
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(15)).await;
        }

        if response.hold_open {
            let mut sink = [0_u8; 64];
            while matches!(socket.read(&mut sink).await, Ok(read) if read > 0) {}
        }
        let _ = socket.shutdown().await;
        request
    });

    (format!("http://{address}/api/v1"), server)
}

fn delta_line(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": content}}]})
    )
}

fn client_for(base_url: &str) -> CompletionClient {
    CompletionClient::new(ClientConfig::new("sk-or-test").with_base_url(base_url)).unwrap()
}

#[derive(Debug, Default)]
struct Outcome {
    chunks: Vec<String>,
    completed: usize,
    errors: Vec<String>,
}

async fn run_callbacks(
    client: &CompletionClient,
    history: &[ChatMessage],
    overrides: Option<&RequestOverrides>,
) -> Outcome {
    let mut chunks = Vec::new();
    let mut completed = 0;
    let mut errors = Vec::new();
    client
        .stream_completion(
            history,
            |chunk| chunks.push(chunk.to_string()),
            || completed += 1,
            |message| errors.push(message),
            overrides,
        )
        .await;
    Outcome {
        chunks,
        completed,
        errors,
    }
}

#[tokio::test]
async fn split_payload_is_reassembled_and_completes_once() {
    let whole = format!("{}{}data: [DONE]\n\n", delta_line("Hel"), delta_line("lo"));
    let (first, rest) = whole.split_at(20);
    let (base_url, server) = serve_once(CannedResponse::event_stream(vec![
        ": OPENROUTER PROCESSING\n\n".to_string(),
        first.to_string(),
        rest.to_string(),
    ]))
    .await;

    let client = client_for(&base_url);
    let outcome = run_callbacks(&client, &[ChatMessage::user("hi")], None).await;

    assert_eq!(outcome.chunks, vec!["Hel", "lo"]);
    assert_eq!(outcome.completed, 1);
    assert!(outcome.errors.is_empty());

    let request = server.await.unwrap();
    assert!(request.head.starts_with("POST /api/v1/chat/completions"));
    assert_eq!(request.header("authorization"), Some("Bearer sk-or-test"));
    assert_eq!(request.header("http-referer"), Some("http://localhost"));
    assert_eq!(request.header("x-title"), Some("ngmentor"));

    let body = request.json();
    assert_eq!(body["stream"], serde_json::json!(true));
    assert_eq!(body["model"], "anthropic/claude-sonnet-4.5");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "hi");
}

#[tokio::test]
async fn unauthorized_reports_provider_message_only() {
    let (base_url, server) = serve_once(CannedResponse::status(
        "HTTP/1.1 401 Unauthorized",
        r#"{"error":{"message":"invalid key"}}"#,
    ))
    .await;

    let outcome = run_callbacks(&client_for(&base_url), &[ChatMessage::user("hi")], None).await;

    assert!(outcome.chunks.is_empty());
    assert_eq!(outcome.completed, 0);
    assert_eq!(outcome.errors, vec!["invalid key"]);
    server.await.unwrap();
}

#[tokio::test]
async fn error_without_json_body_uses_status_line() {
    let (base_url, server) =
        serve_once(CannedResponse::status("HTTP/1.1 503 Service Unavailable", "upstream down")).await;

    let outcome = run_callbacks(&client_for(&base_url), &[ChatMessage::user("hi")], None).await;

    assert_eq!(outcome.errors, vec!["HTTP 503: Service Unavailable"]);
    assert_eq!(outcome.completed, 0);
    server.await.unwrap();
}

#[tokio::test]
async fn body_end_without_sentinel_still_completes() {
    let (base_url, server) =
        serve_once(CannedResponse::event_stream(vec![delta_line("partial answer")])).await;

    let outcome = run_callbacks(&client_for(&base_url), &[ChatMessage::user("hi")], None).await;

    assert_eq!(outcome.chunks, vec!["partial answer"]);
    assert_eq!(outcome.completed, 1);
    assert!(outcome.errors.is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn overrides_reach_the_request_body() {
    let (base_url, server) =
        serve_once(CannedResponse::event_stream(vec!["data: [DONE]\n\n".to_string()])).await;
    let overrides = RequestOverrides::default()
        .with_model("openai/gpt-4o-mini")
        .with_temperature(0.2)
        .with_max_tokens(256);

    let outcome = run_callbacks(
        &client_for(&base_url),
        &[ChatMessage::user("q"), ChatMessage::assistant("a"), ChatMessage::user("q2")],
        Some(&overrides),
    )
    .await;
    assert_eq!(outcome.completed, 1);

    let body = server.await.unwrap().json();
    assert_eq!(body["model"], "openai/gpt-4o-mini");
    assert_eq!(body["temperature"], serde_json::json!(0.2));
    assert_eq!(body["max_tokens"], serde_json::json!(256));
    assert_eq!(body["messages"].as_array().unwrap().len(), 4);
    assert_eq!(body["messages"][2]["role"], "assistant");
}

#[tokio::test]
async fn unreachable_endpoint_reports_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let outcome = run_callbacks(
        &client_for(&format!("http://{address}")),
        &[ChatMessage::user("hi")],
        None,
    )
    .await;

    assert_eq!(outcome.completed, 0);
    assert_eq!(outcome.errors.len(), 1);
    assert!(!outcome.errors[0].is_empty());
}

#[tokio::test]
async fn handle_stream_yields_deltas_then_done() {
    let (base_url, server) = serve_once(CannedResponse::event_stream(vec![
        delta_line("a"),
        delta_line("b"),
        "data: [DONE]\n\n".to_string(),
    ]))
    .await;

    let client = client_for(&base_url);
    let handle = client
        .stream_chat(vec![ChatMessage::user("hi")], RequestOverrides::default())
        .unwrap();
    let worker = tokio::spawn(handle.worker);
    let mut stream = handle.stream;

    let mut events = Vec::new();
    while let Some(event) = stream.recv().await {
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }

    assert_eq!(
        events,
        vec![
            StreamEvent::Delta("a".to_string()),
            StreamEvent::Delta("b".to_string()),
            StreamEvent::Done,
        ]
    );
    worker.await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn cancelling_handle_stream_aborts_connection() {
    let mut response = CannedResponse::event_stream(vec![delta_line("first")]);
    response.hold_open = true;
    let (base_url, server) = serve_once(response).await;

    let client = client_for(&base_url);
    let handle = client
        .stream_chat(vec![ChatMessage::user("hi")], RequestOverrides::default())
        .unwrap();
    let worker = tokio::spawn(handle.worker);
    let mut stream = handle.stream;

    assert_eq!(stream.recv().await, Some(StreamEvent::Delta("first".to_string())));
    assert!(stream.cancel());
    assert_eq!(
        stream.recv().await,
        Some(StreamEvent::Error("request cancelled".to_string()))
    );

    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .unwrap()
        .unwrap();
    // The server sees the connection close once the worker drops it.
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn cancel_future_ends_callback_stream_with_error() {
    let mut response = CannedResponse::event_stream(vec![delta_line("first")]);
    response.hold_open = true;
    let (base_url, server) = serve_once(response).await;

    let client = client_for(&base_url);
    let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();
    let mut cancel_tx = Some(cancel_tx);
    let mut chunks = Vec::new();
    let mut completed = false;
    let mut errors = Vec::new();

    client
        .stream_completion_until(
            &[ChatMessage::user("hi")],
            |chunk| {
                chunks.push(chunk.to_string());
                if let Some(tx) = cancel_tx.take() {
                    let _ = tx.send(());
                }
            },
            || completed = true,
            |message| errors.push(message),
            None,
            async {
                let _ = cancel_rx.await;
            },
        )
        .await;

    assert_eq!(chunks, vec!["first"]);
    assert!(!completed);
    assert_eq!(errors, vec!["request cancelled"]);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn model_catalog_comes_from_provider() {
    let (base_url, server) = serve_once(CannedResponse::status(
        "HTTP/1.1 200 OK",
        r#"{"data":[{"id":"openai/gpt-4o-mini","name":"OpenAI: GPT-4o-mini","context_length":128000}]}"#,
    ))
    .await;

    let client = client_for(&base_url);
    let catalog = fetch_model_catalog(&client).await;

    assert_eq!(catalog.source, ModelCatalogSource::ProviderApi);
    assert_eq!(catalog.models.len(), 1);
    assert_eq!(catalog.models[0].display_name(), "OpenAI: GPT-4o-mini");

    let request = server.await.unwrap();
    assert!(request.head.starts_with("GET /api/v1/models"));
}

#[tokio::test]
async fn model_catalog_falls_back_on_failure() {
    let (base_url, server) = serve_once(CannedResponse::status(
        "HTTP/1.1 500 Internal Server Error",
        r#"{"error":{"message":"boom"}}"#,
    ))
    .await;

    let catalog = fetch_model_catalog(&client_for(&base_url)).await;

    assert_eq!(catalog.source, ModelCatalogSource::StaticFallback);
    assert_eq!(catalog.warning.as_deref(), Some("boom"));
    assert_eq!(catalog.models[0].id, ngmentor_llm::DEFAULT_MODEL);
    server.await.unwrap();
}
