use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::auth::{ApiReply, AuthTransport, LoginRequest, LoginResponse, SignupRequest, SignupResponse};
use crate::config::Config;
use crate::dispatch::{decode_text_stream, ChatReply, ChatRequest, ChatResponseBody, ChatTransport};
use crate::error::{ChatError, Result};
use crate::token::TokenStore;
use crate::upload::{UploadFile, UploadResponse, UploadTransport};

const CHAT_PATH: &str = "/api/chat";
const UPLOAD_PATH: &str = "/api/upload";
const LOGIN_PATH: &str = "/api/auth/login";
const SIGNUP_PATH: &str = "/api/auth/signup";
const PROFILE_PATH: &str = "/api/auth/profile";

/// HTTP client for the Enerzal backend
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    tokens: Option<TokenStore>,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens: None,
        })
    }

    /// Attach the stored token as a bearer header on chat and upload requests
    pub fn with_token_store(mut self, tokens: TokenStore) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.as_ref().and_then(|t| t.load()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_reply<T: DeserializeOwned>(response: Response) -> Result<ApiReply<T>> {
        let ok = response.status().is_success();
        let body = response.json::<T>().await?;
        Ok(ApiReply { ok, body })
    }
}

#[async_trait]
impl ChatTransport for BackendClient {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        let response = self
            .authorize(self.client.post(self.url(CHAT_PATH)))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::Transport(format!(
                "chat request failed with status: {}",
                response.status()
            )));
        }

        if request.stream {
            Ok(ChatReply::Stream(decode_text_stream(response.bytes_stream())))
        } else {
            let body: ChatResponseBody = response.json().await?;
            Ok(ChatReply::Whole(body))
        }
    }
}

#[async_trait]
impl UploadTransport for BackendClient {
    async fn upload(&self, file: &UploadFile) -> Result<UploadResponse> {
        let part = reqwest::multipart::Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .authorize(self.client.post(self.url(UPLOAD_PATH)))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body: UploadResponse = response.json().await?;
        if !status.is_success() {
            return Err(ChatError::Server(
                body.error.unwrap_or_else(|| format!("upload failed with status: {}", status)),
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl AuthTransport for BackendClient {
    async fn post_login(&self, request: &LoginRequest) -> Result<ApiReply<LoginResponse>> {
        let response = self.client.post(self.url(LOGIN_PATH)).json(request).send().await?;
        Self::read_reply(response).await
    }

    async fn post_signup(&self, request: &SignupRequest) -> Result<ApiReply<SignupResponse>> {
        let response = self.client.post(self.url(SIGNUP_PATH)).json(request).send().await?;
        Self::read_reply(response).await
    }

    async fn get_profile(&self, token: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(self.url(PROFILE_PATH))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Server(format!("Profile request failed {}: {}", status, text)));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ResponseMode;
    use crate::state::{ChatRole, Turn};
    use futures_util::StreamExt;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    /// Read one HTTP request, headers and body
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);

            let Some(end) = find(&raw, b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&raw[..end]).to_lowercase();
            if head.contains("transfer-encoding: chunked") {
                if raw.ends_with(b"0\r\n\r\n") {
                    break;
                }
                continue;
            }
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if raw.len() >= end + 4 + length {
                break;
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    /// Accept one connection, answer with `writes` in order, return the request
    async fn serve_once(writes: Vec<Vec<u8>>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            for chunk in writes {
                socket.write_all(&chunk).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{}", addr), handle)
    }

    fn json_response(status: &str, body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
        .into_bytes()
    }

    fn chunk(bytes: &[u8]) -> Vec<u8> {
        let mut out = format!("{:x}\r\n", bytes.len()).into_bytes();
        out.extend_from_slice(bytes);
        out.extend_from_slice(b"\r\n");
        out
    }

    fn hello() -> ChatRequest {
        ChatRequest::new(vec![Turn::new(ChatRole::User, "hi")], ResponseMode::Whole)
    }

    #[test]
    fn test_urls_strip_trailing_slash() {
        let client = BackendClient::new("http://localhost:5000/");
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.url(CHAT_PATH), "http://localhost:5000/api/chat");
    }

    #[test]
    fn test_from_config_uses_base_url() {
        let mut config = Config::new();
        config.base_url = "https://enerzal.example/".to_string();
        config.request_timeout_secs = Some(5);
        let client = BackendClient::from_config(&config).unwrap();
        assert_eq!(client.url(UPLOAD_PATH), "https://enerzal.example/api/upload");
    }

    #[tokio::test]
    async fn test_whole_reply_is_parsed() {
        let (url, server) = serve_once(vec![json_response("200 OK", r#"{"content":"Hello"}"#)]).await;
        let client = BackendClient::new(&url);

        match client.send_chat(&hello()).await.unwrap() {
            ChatReply::Whole(body) => assert_eq!(body.into_message(), "Hello"),
            other => panic!("unexpected: {:?}", other),
        }

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/chat "));
        assert!(request.contains(r#""messages":[{"role":"user","content":"hi"}]"#));
        assert!(!request.to_lowercase().contains("authorization:"));
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let (url, server) = serve_once(vec![json_response(
            "500 Internal Server Error",
            r#"{"error":"model offline"}"#,
        )])
        .await;
        let client = BackendClient::new(&url);

        let result = client.send_chat(&hello()).await;
        assert!(matches!(result, Err(ChatError::Transport(_))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_reply_joins_split_characters() {
        let head = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
        // "é" is 0xC3 0xA9, split across two chunks
        let writes = vec![head, chunk(b"caf\xC3"), chunk(b"\xA9 ok"), b"0\r\n\r\n".to_vec()];
        let (url, server) = serve_once(writes).await;
        let client = BackendClient::new(&url);

        let request = ChatRequest::new(vec![Turn::new(ChatRole::User, "hi")], ResponseMode::Stream);
        let reply = client.send_chat(&request).await.unwrap();
        let ChatReply::Stream(stream) = reply else {
            panic!("expected a streamed reply");
        };
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), "café ok");

        let sent = server.await.unwrap();
        assert!(sent.contains(r#""stream":true"#));
    }

    #[tokio::test]
    async fn test_upload_sends_file_field_with_bearer_token() {
        let dir = tempfile::tempdir().unwrap();
        let tokens = TokenStore::at(dir.path().join("token"));
        tokens.save("jwt-1").unwrap();

        let (url, server) = serve_once(vec![json_response("200 OK", r#"{"content":"20 days"}"#)]).await;
        let client = BackendClient::new(&url).with_token_store(tokens);

        let file = UploadFile::new("leave.txt", b"Annual leave".to_vec());
        let response = client.upload(&file).await.unwrap();
        assert_eq!(response.into_content().unwrap(), "20 days");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/upload "));
        assert!(request.to_lowercase().contains("authorization: bearer jwt-1"));
        assert!(request.contains(r#"name="file""#));
        assert!(request.contains(r#"filename="leave.txt""#));
        assert!(request.contains("Annual leave"));
    }

    #[tokio::test]
    async fn test_upload_error_status_is_server_error() {
        let (url, server) = serve_once(vec![json_response(
            "400 Bad Request",
            r#"{"error":"File type not allowed"}"#,
        )])
        .await;
        let client = BackendClient::new(&url);

        match client.upload(&UploadFile::new("a.txt", vec![])).await {
            Err(ChatError::Server(msg)) => assert_eq!(msg, "File type not allowed"),
            other => panic!("unexpected: {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let client = BackendClient::new("http://127.0.0.1:9");
        let request = ChatRequest::new(Vec::new(), ResponseMode::Whole);
        let result = client.send_chat(&request).await;
        assert!(matches!(result, Err(ChatError::Transport(_))));
    }
}
