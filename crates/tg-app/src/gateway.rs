mod routes;
mod schemas;

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::StatusCode;
use tracing::debug;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::job::{GenerationParams, JobInput, JobRequest};

use routes::GatewayRoute;
use schemas::{TaskCreateResponse, TextTaskRequest};

pub use schemas::{RemoteStatus, TaskStatusResponse};

const API_KEY_HEADER: &str = "x-api-key";
const CLIENT_ORIGIN_HEADER: &str = "x-client-origin";
const CLIENT_ORIGIN: &str = "threegen";

/// The remote task API the job manager drives
pub trait Gateway {
    /// Starts a remote task and returns its id
    fn submit(&self, request: &JobRequest) -> Result<String, GatewayError>;

    fn poll(&self, task_id: &str) -> Result<TaskStatusResponse, GatewayError>;

    /// Raw result payload of a successful task
    fn fetch(&self, task_id: &str) -> Result<Vec<u8>, GatewayError>;

    /// Age after which a task counts as abandoned
    fn timeout(&self) -> Duration;
}

pub struct GatewayClient {
    http: Client,
    url: String,
    api_key: String,
    task_timeout: Duration,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            task_timeout: config.task_timeout,
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(API_KEY_HEADER, &self.api_key)
    }
}

impl Gateway for GatewayClient {
    fn submit(&self, request: &JobRequest) -> Result<String, GatewayError> {
        let url = GatewayRoute::AddTask.url(&self.url, &[])?;
        let builder = self
            .authorized(self.http.post(url))
            .header(CLIENT_ORIGIN_HEADER, CLIENT_ORIGIN);

        let builder = match &request.input {
            JobInput::Text(prompt) => builder.json(&TextTaskRequest {
                prompt: prompt.clone(),
                seed: request.params.seed,
                object_type: request.params.kind.id().to_string(),
            }),
            JobInput::Image(path) => builder.multipart(image_form(path, &request.params)?),
        };

        let response = builder.send().map_err(|e| GatewayError::Submit(e.to_string()))?;
        let response = check_status(response, GatewayError::Submit)?;

        let task: TaskCreateResponse = response
            .json()
            .map_err(|e| GatewayError::Submit(format!("malformed response: {e}")))?;

        debug!("Gateway accepted task {}", task.id);
        Ok(task.id)
    }

    fn poll(&self, task_id: &str) -> Result<TaskStatusResponse, GatewayError> {
        let url = GatewayRoute::GetStatus.url(&self.url, &[("id", task_id)])?;
        let response = self
            .authorized(self.http.get(url))
            .send()
            .map_err(|e| GatewayError::Poll(e.to_string()))?;
        let response = check_status(response, GatewayError::Poll)?;

        response
            .json()
            .map_err(|e| GatewayError::Poll(format!("malformed response: {e}")))
    }

    fn fetch(&self, task_id: &str) -> Result<Vec<u8>, GatewayError> {
        let url = GatewayRoute::GetResult.url(&self.url, &[("id", task_id)])?;
        let response = self
            .authorized(self.http.get(url))
            .send()
            .map_err(|e| GatewayError::Fetch(e.to_string()))?;
        let response = check_status(response, GatewayError::Fetch)?;

        let is_attachment = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("attachment"));
        if !is_attachment {
            return Err(GatewayError::NoAttachment);
        }

        let bytes = response.bytes().map_err(|e| GatewayError::Fetch(e.to_string()))?;
        debug!("Fetched {} bytes for task {}", bytes.len(), task_id);
        Ok(bytes.to_vec())
    }

    fn timeout(&self) -> Duration {
        self.task_timeout
    }
}

/// Turns non-success responses into errors, keeping rate limiting apart
fn check_status(response: Response, wrap: fn(String) -> GatewayError) -> Result<Response, GatewayError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(GatewayError::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(wrap(format!("HTTP {}: {}", status, body.trim())));
    }
    Ok(response)
}

/// Multipart body carrying the image as PNG plus the generation parameters
fn image_form(path: &Path, params: &GenerationParams) -> Result<Form, GatewayError> {
    let image = image::open(path)
        .map_err(|e| GatewayError::Submit(format!("cannot read image {}: {e}", path.display())))?;

    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, image::ImageFormat::Png)
        .map_err(|e| GatewayError::Submit(format!("cannot encode image as PNG: {e}")))?;

    let file_name = path
        .file_stem()
        .map(|s| format!("{}.png", s.to_string_lossy()))
        .unwrap_or_else(|| "image.png".to_string());

    let part = Part::bytes(png.into_inner())
        .file_name(file_name)
        .mime_str("image/png")
        .map_err(|e| GatewayError::Submit(e.to_string()))?;

    Ok(Form::new()
        .part("image", part)
        .text("seed", params.seed.to_string())
        .text("object_type", params.kind.id().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use tg_core::ObjectKind;

    /// Answers one HTTP request with `response` and hands back the raw request
    fn serve_once(response: Vec<u8>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream.write_all(&response).unwrap();
            stream.flush().unwrap();
            request
        });

        (format!("http://{addr}"), handle)
    }

    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];

        let header_end = loop {
            let n = stream.read(&mut buf).unwrap();
            data.extend_from_slice(&buf[..n]);
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if n == 0 {
                break data.len();
            }
        };

        let head = String::from_utf8_lossy(&data[..header_end]).to_lowercase();
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        while data.len() < header_end + length {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }

        String::from_utf8_lossy(&data).into_owned()
    }

    fn http_response(status: &str, headers: &[&str], body: &[u8]) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n", body.len());
        for header in headers {
            out.push_str(header);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");

        let mut out = out.into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn client(url: String) -> GatewayClient {
        GatewayClient::new(&GatewayConfig {
            url,
            api_key: "secret".into(),
            task_timeout: Duration::from_secs(600),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn chair() -> JobRequest {
        JobRequest::text(
            "a red chair",
            GenerationParams { kind: ObjectKind::Mesh, seed: 3, ..GenerationParams::default() },
        )
    }

    #[test]
    fn test_submit_text() {
        let body = br#"{"id": "abc123", "prompt": "a red chair"}"#;
        let (url, server) = serve_once(http_response("200 OK", &["Content-Type: application/json"], body));

        let id = client(url).submit(&chair()).unwrap();
        let request = server.join().unwrap();

        assert_eq!(id, "abc123");
        assert!(request.starts_with("POST /add_task"));
        let lower = request.to_lowercase();
        assert!(lower.contains("x-api-key: secret"));
        assert!(lower.contains("x-client-origin: threegen"));
        assert!(request.contains(r#""prompt":"a red chair""#));
        assert!(request.contains(r#""seed":3"#));
        assert!(request.contains(r#""object_type":"mesh""#));
    }

    #[test]
    fn test_submit_rate_limited() {
        let (url, server) = serve_once(http_response("429 Too Many Requests", &[], b"slow down"));

        let err = client(url).submit(&chair()).unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, GatewayError::RateLimited));
    }

    #[test]
    fn test_submit_missing_image() {
        let request = JobRequest::image("/nonexistent/chair.png", GenerationParams::default());
        let err = client("http://127.0.0.1:9".into()).submit(&request).unwrap_err();

        assert!(matches!(err, GatewayError::Submit(msg) if msg.contains("cannot read image")));
    }

    #[test]
    fn test_poll_status() {
        let body = br#"{"status": "Failure", "reason": "prompt rejected"}"#;
        let (url, server) = serve_once(http_response("200 OK", &[], body));

        let status = client(url).poll("abc123").unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("GET /get_status?id=abc123"));
        assert_eq!(status.status, RemoteStatus::Failure);
        assert_eq!(status.reason.as_deref(), Some("prompt rejected"));
    }

    #[test]
    fn test_poll_server_error() {
        let (url, server) = serve_once(http_response("500 Internal Server Error", &[], b"boom"));

        let err = client(url).poll("abc123").unwrap_err();
        server.join().unwrap();

        assert!(matches!(&err, GatewayError::Poll(msg) if msg.contains("500") && msg.contains("boom")));
    }

    #[test]
    fn test_fetch_attachment() {
        let (url, server) = serve_once(http_response(
            "200 OK",
            &["Content-Disposition: attachment; filename=\"abc123.spz\""],
            b"payload",
        ));

        let bytes = client(url).fetch("abc123").unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("GET /get_result?id=abc123"));
        assert_eq!(bytes, b"payload");
    }

    #[test]
    fn test_fetch_without_attachment() {
        let (url, server) = serve_once(http_response("200 OK", &["Content-Type: text/plain"], b"not ready"));

        let err = client(url).fetch("abc123").unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, GatewayError::NoAttachment));
    }
}
