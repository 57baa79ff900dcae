//! A backend for the document question-answering HTTP API.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;
mod rest;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use omnidocs_protocol::{
    Backend, BackendError, Document, DocumentListQuery, DocumentListResponse,
    DocumentUpload, ErrorKind, QueryRequest, Session, UploadResponse,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url, header};
use serde::de::DeserializeOwned;

pub use config::{ApiConfig, ApiConfigBuilder};
use io::{Chunks, FrameReader};
pub use response::HttpFrameStream;

/// Error type for [`HttpBackend`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
    status: Option<u16>,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            status: None,
        }
    }

    fn transport(err: reqwest::Error) -> Self {
        Self::new(format!("{err}"), ErrorKind::Transport)
    }

    /// Builds a `RequestFailed` error from a non-success response, using
    /// the server-supplied message when there is one.
    async fn from_response(resp: Response, fallback: &str) -> Self {
        let status = resp.status().as_u16();
        let body = resp.bytes().await.unwrap_or_default();
        let message = proto::error_message(&body)
            .unwrap_or_else(|| format!("{fallback}: {status}"));
        Self {
            message,
            kind: ErrorKind::RequestFailed,
            status: Some(status),
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    fn status(&self) -> Option<u16> {
        self.status
    }
}

/// Backend talking to the remote HTTP API.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    config: Arc<ApiConfig>,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` with the given configuration.
    #[inline]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.config.endpoint(path))
            .bearer_auth(&self.config.token)
    }

    fn request_with_query(
        &self,
        method: Method,
        path: &str,
        pairs: &[(&str, String)],
    ) -> Result<RequestBuilder, Error> {
        let mut url = Url::parse(&self.config.endpoint(path)).map_err(|err| {
            Error::new(format!("invalid API URL: {err}"), ErrorKind::RequestFailed)
        })?;
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(&self.config.token))
    }
}

/// Sends a request, turning non-success statuses into errors.
async fn send(req: RequestBuilder, fallback: &str) -> Result<Response, Error> {
    let resp = req.send().await.map_err(Error::transport)?;
    if !resp.status().is_success() {
        return Err(Error::from_response(resp, fallback).await);
    }
    Ok(resp)
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, Error> {
    let resp = send(req, "Request failed").await?;
    resp.json().await.map_err(|err| {
        Error::new(format!("{err}"), ErrorKind::InvalidResponse)
    })
}

async fn send_empty(req: RequestBuilder) -> Result<(), Error> {
    let resp = send(req, "Request failed").await?;
    if resp.status() != StatusCode::NO_CONTENT {
        trace!("ignoring response body of {}", resp.status());
    }
    Ok(())
}

fn upload_form(upload: DocumentUpload) -> Result<Form, Error> {
    let DocumentUpload {
        filename,
        bytes,
        content_type,
        title,
        description,
    } = upload;
    let content_type = content_type
        .parse::<Mime>()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM);
    let part = Part::bytes(bytes.to_vec())
        .file_name(filename)
        .mime_str(content_type.as_ref())
        .map_err(|err| Error::new(format!("{err}"), ErrorKind::RequestFailed))?;

    let mut form = Form::new().part("file", part);
    if let Some(title) = title.filter(|s| !s.is_empty()) {
        form = form.text("title", title);
    }
    if let Some(description) = description.filter(|s| !s.is_empty()) {
        form = form.text("description", description);
    }
    Ok(form)
}

impl Backend for HttpBackend {
    type Error = Error;
    type Stream = HttpFrameStream;

    fn create_session(
        &self,
        title: Option<&str>,
    ) -> impl Future<Output = Result<Session, Self::Error>> + Send + 'static
    {
        let req = self
            .request(Method::POST, "/sessions")
            .json(&proto::CreateSessionBody { title });
        send_json(req)
    }

    fn stream_query(
        &self,
        req: &QueryRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let resp_fut = self
            .request(Method::POST, "/query/stream")
            .header(header::ACCEPT, "text/event-stream")
            .json(req)
            .send();

        async move {
            let resp = resp_fut.await.map_err(Error::transport)?;
            if !resp.status().is_success() {
                return Err(Error::from_response(resp, "Query failed").await);
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<Mime>().ok());
            if let Some(content_type) = content_type {
                if content_type.essence_str() != mime::TEXT_EVENT_STREAM.essence_str() {
                    warn!("unexpected content type for a stream: {content_type}");
                }
            }

            // Here we got a successful response.
            let reader = FrameReader::new(Chunks::from_response(resp));
            Ok(HttpFrameStream::from_reader(reader))
        }
    }

    fn get_document(
        &self,
        document_id: &str,
    ) -> impl Future<Output = Result<Document, Self::Error>> + Send + 'static
    {
        send_json(self.request(Method::GET, &format!("/documents/{document_id}")))
    }

    fn list_documents(
        &self,
        query: &DocumentListQuery,
    ) -> impl Future<Output = Result<DocumentListResponse, Self::Error>>
    + Send
    + 'static {
        let mut pairs = vec![
            ("page", query.page.to_string()),
            ("page_size", query.page_size.to_string()),
        ];
        if let Some(status) = query.status {
            pairs.push(("status", status.to_string()));
        }
        let req = self.request_with_query(Method::GET, "/documents", &pairs);
        async move { send_json(req?).await }
    }

    fn upload_document(
        &self,
        upload: DocumentUpload,
    ) -> impl Future<Output = Result<UploadResponse, Self::Error>> + Send + 'static
    {
        let req = upload_form(upload).map(|form| {
            self.request(Method::POST, "/documents/upload").multipart(form)
        });
        async move { send_json(req?).await }
    }

    fn reprocess_document(
        &self,
        document_id: &str,
    ) -> impl Future<Output = Result<UploadResponse, Self::Error>> + Send + 'static
    {
        send_json(self.request(
            Method::POST,
            &format!("/documents/{document_id}/reprocess"),
        ))
    }

    fn delete_document(
        &self,
        document_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        send_empty(
            self.request(Method::DELETE, &format!("/documents/{document_id}")),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;
    use std::time::Duration;

    use omnidocs_protocol::{Frame, FrameStream};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    use super::*;

    fn backend() -> HttpBackend {
        HttpBackend::new(
            ApiConfigBuilder::with_token("token-1")
                .with_base_url("https://docs.example.com")
                .build(),
        )
    }

    #[test]
    fn test_request_with_query() {
        let req = backend()
            .request_with_query(
                Method::GET,
                "/sessions",
                &[("limit", "20".to_owned()), ("title", "Q3 plan".to_owned())],
            )
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            req.url().as_str(),
            "https://docs.example.com/api/v1/sessions?limit=20&title=Q3+plan"
        );
        assert_eq!(
            req.headers().get(header::AUTHORIZATION).unwrap(),
            "Bearer token-1"
        );
    }

    #[test]
    fn test_error_accessors() {
        let err = Error::new("boom", ErrorKind::Transport);
        assert_eq!(err.message(), "boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.status(), None);
    }

    /// Reads one request, head and body.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut block = [0u8; 1024];
        loop {
            let n = socket.read(&mut block).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&block[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if !name.eq_ignore_ascii_case("content-length") {
                            return None;
                        }
                        value.trim().parse::<usize>().ok()
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serves one connection with a canned response, written in parts with
    /// a pause in between. Resolves to the received request.
    async fn serve(parts: Vec<Vec<u8>>) -> (HttpBackend, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            for part in parts {
                socket.write_all(&part).await.unwrap();
                socket.flush().await.unwrap();
                sleep(Duration::from_millis(10)).await;
            }
            socket.shutdown().await.ok();
            request
        });

        let backend = HttpBackend {
            client: Client::builder().no_proxy().build().unwrap(),
            config: Arc::new(
                ApiConfigBuilder::with_token("token-1")
                    .with_base_url(format!("http://{addr}"))
                    .build(),
            ),
        };
        (backend, server)
    }

    fn response(status_line: &str, body: &str) -> Vec<Vec<u8>> {
        vec![
            format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            )
            .into_bytes(),
        ]
    }

    fn chunk(data: &str) -> Vec<u8> {
        format!("{:x}\r\n{data}\r\n", data.len()).into_bytes()
    }

    #[tokio::test]
    async fn test_stream_query() {
        let (backend, server) = serve(vec![
            b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
              transfer-encoding: chunked\r\nconnection: close\r\n\r\n"
                .to_vec(),
            chunk("data: {\"type\":\"text\",\"content\":\"Hel\"}\ndata: {\"type\":\"te"),
            chunk("xt\",\"content\":\"lo\"}\n\ndata: {\"type\":\"done\",\"session_id\":\"session-7\"}\n"),
            b"0\r\n\r\n".to_vec(),
        ])
        .await;

        let req = QueryRequest::new("What is covered?").with_session_id("session-1");
        let stream = backend.stream_query(&req).await.unwrap();
        let mut stream = pin!(stream);
        let mut frames = vec![];
        while let Some(frame) = poll_fn(|cx| stream.as_mut().poll_next_frame(cx))
            .await
            .unwrap()
        {
            frames.push(frame);
        }
        assert_eq!(
            frames,
            vec![
                Frame::text("Hel"),
                Frame::text("lo"),
                Frame::done(Some("session-7".to_owned())),
            ]
        );

        let request = server.await.unwrap();
        let (head, body) = request.split_once("\r\n\r\n").unwrap();
        let head = head.to_ascii_lowercase();
        assert!(head.starts_with("post /api/v1/query/stream http/1.1"));
        assert!(head.contains("accept: text/event-stream"));
        assert!(head.contains("authorization: bearer token-1"));
        assert!(head.contains("content-type: application/json"));
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["query"], "What is covered?");
        assert_eq!(body["session_id"], "session-1");
        assert!(body.get("document_ids").is_none());
    }

    #[tokio::test]
    async fn test_stream_query_failure_with_detail() {
        let (backend, server) =
            serve(response("500 Internal Server Error", r#"{"detail":"x"}"#)).await;

        let err = backend
            .stream_query(&QueryRequest::new("Anything"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::RequestFailed);
        assert_eq!(err.message(), "x");
        assert_eq!(err.status(), Some(500));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_query_failure_without_body() {
        let (backend, server) = serve(response("502 Bad Gateway", "")).await;

        let err = backend
            .stream_query(&QueryRequest::new("Anything"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::RequestFailed);
        assert_eq!(err.message(), "Query failed: 502");
        assert_eq!(err.status(), Some(502));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_failure_prefers_error_field() {
        let (backend, server) = serve(response(
            "404 Not Found",
            r#"{"error":"Document not found","detail":"ignored"}"#,
        ))
        .await;

        let err = backend.get_document("doc-404").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestFailed);
        assert_eq!(err.message(), "Document not found");

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /api/v1/documents/doc-404 http/1.1"));
    }

    #[tokio::test]
    async fn test_delete_no_content() {
        let (backend, server) = serve(vec![
            b"HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n".to_vec(),
        ])
        .await;

        backend.delete_document("doc-1").await.unwrap();

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("delete /api/v1/documents/doc-1 http/1.1"));
        assert!(request.contains("authorization: bearer token-1"));
    }

    #[tokio::test]
    async fn test_undecodable_success_body() {
        let (backend, server) = serve(response("200 OK", "not json")).await;

        let err = backend.create_session(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
        server.await.unwrap();
    }
}
