use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ExternalServiceError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns a free-text description into a settings record. The result is
/// unvalidated; callers run it through the settings validator.
pub trait SettingsGenerator {
    fn generate(&self, prompt: &str) -> Result<Value, ExternalServiceError>;
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Opens a payment checkout for the premium tier.
pub trait CheckoutService {
    fn create_checkout_session(&self) -> Result<CheckoutSession, ExternalServiceError>;
}

/// Both collaborators over the companion HTTP backend.
#[derive(Clone)]
pub struct HttpServices {
    base_url: String,
    client: Client,
}

impl HttpServices {
    pub fn new(base_url: &str) -> Result<Self, ExternalServiceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExternalServiceError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// `error` field of a JSON error body, if there is one.
fn error_field(resp: Response) -> Option<String> {
    resp.json::<Value>()
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
}

impl SettingsGenerator for HttpServices {
    fn generate(&self, prompt: &str) -> Result<Value, ExternalServiceError> {
        log::debug!("requesting settings for prompt {prompt:?}");
        let resp = self
            .client
            .post(self.url("/api/generate-settings"))
            .json(&json!({ "prompt": prompt }))
            .send()
            .map_err(|e| ExternalServiceError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let msg = error_field(resp).unwrap_or_else(|| {
                format!("Request failed with status {}. Is the backend server running?", status.as_u16())
            });
            return Err(ExternalServiceError::Service(msg));
        }
        resp.json::<Value>().map_err(|_| ExternalServiceError::InvalidResponse)
    }
}

impl CheckoutService for HttpServices {
    fn create_checkout_session(&self) -> Result<CheckoutSession, ExternalServiceError> {
        let resp = self
            .client
            .post(self.url("/api/create-payment-intent"))
            .send()
            .map_err(|e| ExternalServiceError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            let error = error_field(resp).unwrap_or_else(|| "Unknown error".to_string());
            return Err(ExternalServiceError::Service(format!(
                "Failed to create payment session: {error}"
            )));
        }
        resp.json::<CheckoutSession>()
            .map_err(|_| ExternalServiceError::InvalidResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned HTTP response and hand back the request line.
    fn serve_once(status: u16, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let join = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
            }
            let mut body_in = vec![0u8; content_length];
            reader.read_exact(&mut body_in).unwrap();
            let reply = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(reply.as_bytes()).unwrap();
            format!("{}{}", request_line.trim_end(), String::from_utf8_lossy(&body_in))
        });
        (base, join)
    }

    #[test]
    fn test_generate_posts_prompt() {
        let (base, join) = serve_once(200, r#"{"bassGain": 3}"#);
        let svc = HttpServices::new(&base).unwrap();
        let value = svc.generate("Radio DJ").unwrap();
        assert_eq!(value["bassGain"], 3);
        let seen = join.join().unwrap();
        assert!(seen.starts_with("POST /api/generate-settings"), "{seen}");
        assert!(seen.contains(r#""prompt":"Radio DJ""#), "{seen}");
    }

    #[test]
    fn test_generate_surfaces_service_error() {
        let (base, join) = serve_once(500, r#"{"error": "API key not configured"}"#);
        let err = HttpServices::new(&base).unwrap().generate("x").unwrap_err();
        assert_eq!(err.to_string(), "API key not configured");
        join.join().unwrap();

        let (base, join) = serve_once(502, "");
        let err = HttpServices::new(&base).unwrap().generate("x").unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status 502. Is the backend server running?");
        join.join().unwrap();
    }

    #[test]
    fn test_checkout_session() {
        let (base, join) = serve_once(200, r#"{"sessionId": "cs_test_1"}"#);
        let session = HttpServices::new(&base).unwrap().create_checkout_session().unwrap();
        assert_eq!(session.session_id.as_deref(), Some("cs_test_1"));
        join.join().unwrap();

        let (base, join) = serve_once(400, r#"{"error": "no price"}"#);
        let err = HttpServices::new(&base).unwrap().create_checkout_session().unwrap_err();
        assert_eq!(err.to_string(), "Failed to create payment session: no price");
        join.join().unwrap();
    }
}
