// pixelhorizon/src/processors/background.rs
use super::{write_output, Loader, Operation};
use crate::core::{ImageToolError, OperationKind, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const REMOVE_BG_ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";

/// A remote capability that cuts the subject out of an image and returns a PNG
/// with a transparent background.
pub trait BackgroundService: Send + Sync {
    fn remove_background(&self, image: &[u8], api_key: &str) -> Result<Vec<u8>>;
}

/// Client for the remove.bg HTTP API.
pub struct RemoveBgClient {
    endpoint: String,
    timeout: Duration,
}

impl RemoveBgClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            endpoint: REMOVE_BG_ENDPOINT.to_string(),
            timeout,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl BackgroundService for RemoveBgClient {
    fn remove_background(&self, image: &[u8], api_key: &str) -> Result<Vec<u8>> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ImageToolError::Network(e.to_string()))?;

        let form = Form::new()
            .text("size", "auto")
            .part("image_file", Part::bytes(image.to_vec()).file_name("image"));

        log::debug!("POST {} ({} bytes)", self.endpoint, image.len());

        let response = client
            .post(&self.endpoint)
            .header("X-Api-Key", api_key)
            .multipart(form)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ImageToolError::Network(format!(
                        "request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    ImageToolError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .bytes()
                .map_err(|e| ImageToolError::Network(e.to_string()))?;
            return Ok(body.to_vec());
        }

        let message = response.text().unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ImageToolError::Auth(message)),
            _ => Err(ImageToolError::Service {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

/// Sends the image to a [`BackgroundService`] and stores the returned PNG.
pub struct BackgroundRemover {
    service: Arc<dyn BackgroundService>,
    api_key: Option<String>,
    loader: Loader,
}

impl BackgroundRemover {
    pub fn new(service: Arc<dyn BackgroundService>, api_key: Option<String>) -> Self {
        Self {
            service,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            loader: Loader::new(),
        }
    }

    fn credential(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or(ImageToolError::MissingCredential)
    }
}

impl Operation for BackgroundRemover {
    fn kind(&self) -> OperationKind {
        OperationKind::RemoveBackground
    }

    fn output_extension(&self, _input_ext: &str) -> String {
        "png".to_string()
    }

    fn preflight(&self) -> Result<()> {
        self.credential().map(|_| ())
    }

    fn apply(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        let api_key = self.credential()?;
        let bytes = self.loader.read_bytes(input)?;
        let cutout = self.service.remove_background(&bytes, api_key)?;
        write_output(output, &cutout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingService {
        calls: AtomicUsize,
    }

    impl BackgroundService for CountingService {
        fn remove_background(&self, image: &[u8], api_key: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(api_key, "secret");
            Ok(image.to_vec())
        }
    }

    fn service() -> Arc<CountingService> {
        Arc::new(CountingService {
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn missing_key_fails_before_calling_service() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        std::fs::write(&input, b"png").unwrap();
        let output = dir.path().join("out.png");

        let svc = service();
        for key in [None, Some(String::new()), Some("   ".to_string())] {
            let remover = BackgroundRemover::new(svc.clone(), key);
            assert!(matches!(remover.preflight(), Err(ImageToolError::MissingCredential)));
            assert!(matches!(
                remover.apply(&input, &output),
                Err(ImageToolError::MissingCredential)
            ));
        }
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
        assert!(!output.exists());
    }

    #[test]
    fn output_is_always_png() {
        let remover = BackgroundRemover::new(service(), Some("secret".to_string()));
        assert_eq!(remover.output_extension("jpg"), "png");
    }

    #[test]
    fn service_bytes_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jpg");
        std::fs::write(&input, b"raw-bytes").unwrap();
        let output = dir.path().join("nested/out.png");

        let svc = service();
        let remover = BackgroundRemover::new(svc.clone(), Some("secret".to_string()));
        remover.apply(&input, &output).unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"raw-bytes");
        assert_eq!(svc.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unreachable_endpoint_is_network_error() {
        let client = RemoveBgClient::new(Duration::from_secs(2)).with_endpoint("http://127.0.0.1:1/removebg");
        let err = client.remove_background(b"data", "key").unwrap_err();
        assert!(matches!(err, ImageToolError::Network(_)));
    }

    /// Serves one request with a canned status line and body, returning the endpoint URL.
    fn serve_once(status: &'static str, body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/removebg", listener.local_addr().unwrap());

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(Duration::from_millis(500))).unwrap();

            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let head_end = request.windows(4).position(|w| w == b"\r\n\r\n");
                if let Some(end) = head_end {
                    let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                    let length = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok());
                    if let Some(length) = length {
                        if request.len() >= end + 4 + length {
                            break;
                        }
                    }
                }
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&chunk[..n]),
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (url, handle)
    }

    #[test]
    fn rejected_key_is_auth_error() {
        for status in ["401 Unauthorized", "403 Forbidden"] {
            let (url, server) = serve_once(status, "API key invalid");
            let client = RemoveBgClient::new(Duration::from_secs(5)).with_endpoint(url);

            let err = client.remove_background(b"data", "bad-key").unwrap_err();
            assert!(
                matches!(&err, ImageToolError::Auth(message) if message == "API key invalid"),
                "{status}: {err}"
            );

            let request = server.join().unwrap().to_ascii_lowercase();
            assert!(request.contains("x-api-key: bad-key"));
            assert!(request.contains("name=\"image_file\""));
        }
    }

    #[test]
    fn other_failure_status_is_service_error() {
        let (url, server) = serve_once("500 Internal Server Error", "boom");
        let client = RemoveBgClient::new(Duration::from_secs(5)).with_endpoint(url);

        let err = client.remove_background(b"data", "key").unwrap_err();
        match err {
            ImageToolError::Service { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn success_returns_body() {
        let (url, server) = serve_once("200 OK", "PNGDATA");
        let client = RemoveBgClient::new(Duration::from_secs(5)).with_endpoint(url);

        assert_eq!(client.remove_background(b"data", "key").unwrap(), b"PNGDATA");
        server.join().unwrap();
    }
}
