//! Blocking HTTP JSON-RPC client for getwork-style work sources.

use std::time::Duration;

use log::{info, trace};
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::api::WorkApi;
use crate::model::{RpcError, RpcRequest, RpcResponse, WorkTemplate, DATA_LEN};

/// Default per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Work source reached over HTTP with basic-auth credentials.
#[derive(Clone, Debug)]
pub struct HttpWorkClient {
    client: reqwest::blocking::Client,
    url: Url,
    user: String,
    password: Option<String>,
    protocol_dump: bool,
}

impl HttpWorkClient {
    /// Creates a client for `url` authenticating with `userpass`
    /// (`user:password`).
    pub fn new(url: &str, userpass: &str, timeout: Duration) -> Result<Self, RpcError> {
        let url = Url::parse(url).map_err(|e| RpcError::Endpoint(format!("{}: {}", url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RpcError::Endpoint(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let (user, password) = match userpass.split_once(':') {
            Some((user, password)) => (user.to_string(), Some(password.to_string())),
            None => (userpass.to_string(), None),
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Network(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            url,
            user,
            password,
            protocol_dump: false,
        })
    }

    /// Logs every request and response body at info level when enabled.
    pub fn with_protocol_dump(mut self, enabled: bool) -> Self {
        self.protocol_dump = enabled;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn dump(&self, direction: &str, body: &str) {
        if self.protocol_dump {
            info!("JSON protocol {}: {}", direction, body);
        } else {
            trace!("JSON protocol {}: {}", direction, body);
        }
    }

    /// Issues one JSON-RPC call and returns its `result` member.
    pub fn call(&self, request: &RpcRequest) -> Result<serde_json::Value, RpcError> {
        let body = serde_json::to_string(request)?;
        self.dump("request", &body);

        let response = self
            .client
            .post(self.url.clone())
            .basic_auth(&self.user, self.password.as_deref())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| RpcError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| RpcError::Network(format!("body read error: {}", e)))?;
        self.dump("response", &text);

        // a non-2xx reply may still carry a JSON error object
        let envelope: RpcResponse = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(RpcError::Http(status.as_u16())),
            Err(e) => return Err(e.into()),
        };
        envelope.into_result()
    }
}

impl WorkApi for HttpWorkClient {
    fn get_work(&self) -> Result<WorkTemplate, RpcError> {
        let result = self.call(&RpcRequest::get_work())?;
        Ok(WorkTemplate::decode(&result)?)
    }

    fn submit_work(&self, data: &[u8; DATA_LEN]) -> Result<bool, RpcError> {
        let result = self.call(&RpcRequest::submit_work(data))?;
        Ok(result.as_bool() == Some(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serves one HTTP request with `status` and `body`, reporting the
    /// request head and body back through the returned channel.
    fn serve_once(status: &'static str, body: String) -> (String, mpsc::Receiver<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
                head.push_str(&line);
            }

            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
            stream.flush().unwrap();

            let _ = tx.send((head, String::from_utf8(request_body).unwrap_or_default()));
        });

        (url, rx)
    }

    fn work_json() -> serde_json::Value {
        serde_json::json!({
            "midstate": "aa".repeat(32),
            "data": "bb".repeat(128),
            "hash1": "cc".repeat(64),
            "target": "dd".repeat(32),
        })
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = HttpWorkClient::new("ftp://127.0.0.1/", "u:p", REQUEST_TIMEOUT).unwrap_err();
        assert!(matches!(err, RpcError::Endpoint(_)));
        assert!(HttpWorkClient::new("not a url", "u:p", REQUEST_TIMEOUT).is_err());
    }

    #[test]
    fn test_url_is_normalized() {
        let client = HttpWorkClient::new("http://127.0.0.1:8332", "u:p", REQUEST_TIMEOUT).unwrap();
        assert_eq!(client.url().as_str(), "http://127.0.0.1:8332/");
    }

    #[test]
    fn test_get_work_over_http() {
        let body = serde_json::json!({ "result": work_json(), "error": null, "id": 0 }).to_string();
        let (url, rx) = serve_once("200 OK", body);

        let client = HttpWorkClient::new(&url, "rpcuser:rpcpass", REQUEST_TIMEOUT).unwrap();
        let work = client.get_work().unwrap();
        assert_eq!(work.midstate, [0xaa; 32]);
        assert_eq!(work.target, [0xdd; 32]);

        let (head, request_body) = rx.recv().unwrap();
        assert!(head.starts_with("POST / HTTP/1.1"));
        assert!(head.contains("cnBjdXNlcjpycGNwYXNz"));
        let request: RpcRequest = serde_json::from_str(&request_body).unwrap();
        assert_eq!(request, RpcRequest::get_work());
    }

    #[test]
    fn test_submit_work_reports_acceptance() {
        let (url, rx) = serve_once("200 OK", r#"{"result": true, "error": null, "id": 1}"#.to_string());
        let client = HttpWorkClient::new(&url, "u:p", REQUEST_TIMEOUT)
            .unwrap()
            .with_protocol_dump(true);

        let data = [0x5a; DATA_LEN];
        assert!(client.submit_work(&data).unwrap());

        let (_, request_body) = rx.recv().unwrap();
        let request: RpcRequest = serde_json::from_str(&request_body).unwrap();
        assert_eq!(request.params[0], serde_json::json!(hex::encode(data)));
    }

    #[test]
    fn test_rpc_error_body_on_server_error_status() {
        let body = r#"{"result": null, "error": {"code": -9, "message": "not connected"}, "id": 0}"#;
        let (url, _rx) = serve_once("500 Internal Server Error", body.to_string());
        let client = HttpWorkClient::new(&url, "u:p", REQUEST_TIMEOUT).unwrap();
        assert_eq!(
            client.get_work(),
            Err(RpcError::Rpc {
                code: -9,
                message: "not connected".to_string()
            })
        );
    }

    #[test]
    fn test_http_status_without_json_body() {
        let (url, _rx) = serve_once("401 Unauthorized", "denied".to_string());
        let client = HttpWorkClient::new(&url, "u:p", REQUEST_TIMEOUT).unwrap();
        assert_eq!(client.get_work(), Err(RpcError::Http(401)));
    }

    #[test]
    fn test_undecodable_work_is_decode_error() {
        let body = serde_json::json!({ "result": { "data": "00" }, "id": 0 }).to_string();
        let (url, _rx) = serve_once("200 OK", body);
        let client = HttpWorkClient::new(&url, "u:p", REQUEST_TIMEOUT).unwrap();
        assert!(matches!(client.get_work(), Err(RpcError::Decode(_))));
    }
}
