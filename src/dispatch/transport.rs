use std::io::Read;

use anyhow::{anyhow, Context, Result};
use url::Url;

use super::payload::NotificationRequest;
use super::DispatchError;

/// Cap on how much of an error response body is kept for logging.
const MAX_ERROR_BODY_BYTES: u64 = 4096;

/// Delivers one stock decrease notification to the backend.
///
/// Called from dispatcher worker threads, never from the frame loop.
pub trait StockTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver the request. Only HTTP 200 counts as success.
    fn send(&self, request: &NotificationRequest) -> Result<(), DispatchError>;
}

/// Blocking HTTPS transport built on `ureq`.
///
/// No retries and no timeout override: the agent's defaults apply.
pub struct HttpTransport {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Result<Self> {
        validate_endpoint(endpoint)?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            agent: ureq::AgentBuilder::new().build(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl StockTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn send(&self, request: &NotificationRequest) -> Result<(), DispatchError> {
        let result = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &request.bearer())
            .send_json(request);
        match result {
            Ok(response) if response.status() == 200 => Ok(()),
            Ok(response) => {
                let code = response.status();
                Err(DispatchError::Status {
                    code,
                    body: read_body(response),
                })
            }
            Err(ureq::Error::Status(code, response)) => Err(DispatchError::Status {
                code,
                body: read_body(response),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(DispatchError::Transport(transport.to_string()))
            }
        }
    }
}

/// Dry-run transport: logs what would have been sent.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTransport;

impl StockTransport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, request: &NotificationRequest) -> Result<(), DispatchError> {
        log::info!(
            "dry run: would decrease stock of '{}' for cashier {}",
            request.item_name,
            request.cashier_id
        );
        Ok(())
    }
}

/// Backend endpoints must be absolute http(s) URLs.
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    let url = Url::parse(endpoint).with_context(|| format!("parse backend endpoint '{}'", endpoint))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!(
            "unsupported backend scheme '{}'; expected http(s)",
            other
        )),
    }
}

fn read_body(response: ureq::Response) -> String {
    let mut body = String::new();
    if let Err(e) = response
        .into_reader()
        .take(MAX_ERROR_BODY_BYTES)
        .read_to_string(&mut body)
    {
        log::debug!("failed to read backend error body: {}", e);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Serves exactly one request with `status` and `body`, returning the
    /// raw request head and its body.
    fn one_shot_backend(status: &str, body: &str) -> (String, JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let endpoint = format!(
            "http://{}/item/decrease",
            listener.local_addr().expect("addr")
        );
        let reply = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            let head_end = loop {
                let n = stream.read(&mut buf).expect("read head");
                assert!(n > 0, "connection closed before headers");
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .expect("content-length header");
            while raw.len() < head_end + content_length {
                let n = stream.read(&mut buf).expect("read body");
                assert!(n > 0, "connection closed before body");
                raw.extend_from_slice(&buf[..n]);
            }
            let body = &raw[head_end..head_end + content_length];
            let body = String::from_utf8_lossy(body).to_string();
            stream.write_all(reply.as_bytes()).expect("write reply");
            (head, body)
        });
        (endpoint, handle)
    }

    #[test]
    fn posts_bearer_and_json_body_and_accepts_200() {
        let (endpoint, backend) = one_shot_backend("200 OK", "");
        let transport = HttpTransport::new(&endpoint).unwrap();
        let req = NotificationRequest::new(5, "Rexona Roll On", "tk");
        assert_eq!(transport.send(&req), Ok(()));

        let (head, body) = backend.join().unwrap();
        assert!(head.starts_with("POST /item/decrease "));
        assert!(head
            .lines()
            .any(|line| line.eq_ignore_ascii_case("authorization: bearer tk")));
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"cashierId": 5, "itemName": "Rexona Roll On"})
        );
    }

    #[test]
    fn non_200_success_code_is_a_failure() {
        let (endpoint, backend) = one_shot_backend("201 Created", "nope");
        let transport = HttpTransport::new(&endpoint).unwrap();
        let req = NotificationRequest::new(5, "Rexona Roll On", "tk");
        assert_eq!(
            transport.send(&req),
            Err(DispatchError::Status {
                code: 201,
                body: "nope".to_string(),
            })
        );
        backend.join().unwrap();
    }

    #[test]
    fn error_status_keeps_code_and_body() {
        let (endpoint, backend) = one_shot_backend("401 Unauthorized", "bad token");
        let transport = HttpTransport::new(&endpoint).unwrap();
        let req = NotificationRequest::new(5, "Rexona Roll On", "expired");
        assert_eq!(
            transport.send(&req),
            Err(DispatchError::Status {
                code: 401,
                body: "bad token".to_string(),
            })
        );
        backend.join().unwrap();
    }

    #[test]
    fn unreachable_backend_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/item/decrease", listener.local_addr().unwrap());
        drop(listener);
        let transport = HttpTransport::new(&endpoint).unwrap();
        let req = NotificationRequest::new(5, "Rexona Roll On", "tk");
        assert!(matches!(
            transport.send(&req),
            Err(DispatchError::Transport(_))
        ));
    }

    #[test]
    fn accepts_http_and_https_endpoints() {
        assert!(validate_endpoint("https://backend.example/item/decrease").is_ok());
        assert!(validate_endpoint("http://127.0.0.1:8080/item/decrease").is_ok());
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(validate_endpoint("ftp://backend.example/item").is_err());
        assert!(validate_endpoint("not a url").is_err());
        assert!(HttpTransport::new("mqtt://broker").is_err());
    }

    #[test]
    fn log_transport_always_succeeds() {
        let req = NotificationRequest::new(7, "Rexona Roll On", "t");
        assert!(LogTransport.send(&req).is_ok());
    }
}
