//! Throwaway servers standing in for the external endpoints in tests.

use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// One message accepted by [`SmtpServer`]
#[derive(Debug, Clone, Default)]
pub struct ReceivedMail {
    pub from: String,
    pub recipients: Vec<String>,
    /// Message content after dot-unstuffing, without the terminating dot
    pub data: String,
}

/// SMTP relay accepting every session on `127.0.0.1`.
pub struct SmtpServer {
    pub addr: SocketAddr,
    pub mails: Arc<Mutex<Vec<ReceivedMail>>>,
}

impl SmtpServer {
    pub async fn start() -> Self {
        Self::spawn(false).await
    }

    /// Relay that rejects every recipient with `550`
    pub async fn start_rejecting() -> Self {
        Self::spawn(true).await
    }

    async fn spawn(reject_rcpt: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mails = Arc::new(Mutex::new(Vec::new()));
        let mails_clone = mails.clone();
        tokio::spawn(async move {
            loop {
                let Ok((sock, _)) = listener.accept().await else {
                    break;
                };
                let mails = mails_clone.clone();
                tokio::spawn(async move {
                    let _ = smtp_session(sock, mails, reject_rcpt).await;
                });
            }
        });
        Self { addr, mails }
    }

    pub fn received(&self) -> Vec<ReceivedMail> {
        self.mails.lock().unwrap().clone()
    }
}

fn address_arg(line: &str) -> String {
    line.split_once(':')
        .map(|(_, rest)| rest.trim().trim_start_matches('<').trim_end_matches('>'))
        .unwrap_or_default()
        .to_string()
}

async fn smtp_session(
    sock: TcpStream,
    mails: Arc<Mutex<Vec<ReceivedMail>>>,
    reject_rcpt: bool,
) -> std::io::Result<()> {
    let (r, mut w) = sock.into_split();
    let mut reader = BufReader::new(r);
    w.write_all(b"220 fake ESMTP ready\r\n").await?;

    let mut current = ReceivedMail::default();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let command = line.trim_end().to_ascii_uppercase();
        if command.starts_with("EHLO") {
            w.write_all(b"250-fake\r\n250 SIZE 10485760\r\n").await?;
        } else if command.starts_with("HELO") {
            w.write_all(b"250 fake\r\n").await?;
        } else if command.starts_with("MAIL FROM") {
            current = ReceivedMail {
                from: address_arg(line.trim_end()),
                ..ReceivedMail::default()
            };
            w.write_all(b"250 OK\r\n").await?;
        } else if command.starts_with("RCPT TO") {
            if reject_rcpt {
                w.write_all(b"550 No such user\r\n").await?;
            } else {
                current.recipients.push(address_arg(line.trim_end()));
                w.write_all(b"250 OK\r\n").await?;
            }
        } else if command == "DATA" {
            w.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n").await?;
            let mut data = String::new();
            loop {
                let mut body_line = String::new();
                if reader.read_line(&mut body_line).await? == 0 {
                    return Ok(());
                }
                if body_line == ".\r\n" {
                    break;
                }
                let unstuffed = body_line.strip_prefix('.').unwrap_or(&body_line);
                data.push_str(unstuffed);
            }
            current.data = data;
            mails.lock().unwrap().push(std::mem::take(&mut current));
            w.write_all(b"250 Queued\r\n").await?;
        } else if command == "QUIT" {
            w.write_all(b"221 Bye\r\n").await?;
            return Ok(());
        } else {
            w.write_all(b"500 Unknown command\r\n").await?;
        }
    }
}

/// Request seen by [`HttpServer`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Header names lowercased
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    /// Decoded `application/x-www-form-urlencoded` body
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(self.body.as_bytes())
            .into_owned()
            .collect()
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

type Responder = dyn Fn(&RecordedRequest) -> (u16, Value) + Send + Sync;

/// HTTP endpoint recording every request and answering via a closure.
pub struct HttpServer {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl HttpServer {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, Value) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let respond: Arc<Responder> = Arc::new(respond);

        let recorded = requests.clone();
        let app = Router::new().fallback(move |request: Request| {
            let recorded = recorded.clone();
            let respond = respond.clone();
            async move {
                let (parts, body) = request.into_parts();
                let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
                let headers = parts
                    .headers
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.as_str().to_string(),
                            v.to_str().unwrap_or_default().to_string(),
                        )
                    })
                    .collect();
                let req = RecordedRequest {
                    method: parts.method.to_string(),
                    path: parts.uri.path().to_string(),
                    query: parts.uri.query().map(str::to_string),
                    headers,
                    body: String::from_utf8_lossy(&body).into_owned(),
                };
                let (status, reply) = respond(&req);
                recorded.lock().unwrap().push(req);
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, axum::Json(reply)).into_response()
            }
        });

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, requests }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn received(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}
