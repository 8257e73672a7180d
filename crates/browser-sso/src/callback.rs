//! Single-shot loopback listener for the identity provider redirect.
//!
//! Browsers open speculative connections that may never carry a request, so
//! the listener keeps accepting and reads each connection on its own task
//! under a size and time bound. The first connection that delivers a request
//! line is the callback: it is validated, answered and reported through a
//! oneshot channel. The waiting side races that channel against the
//! configured timeout and aborts the listener task whichever way the race ends.

use crate::{AuthError, AuthResult};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Query prefix the identity provider uses to hand back the token.
pub const TOKEN_QUERY_PREFIX: &str = "?token=";

/// Upper bound on header lines drained from the callback request.
const MAX_HEADER_LINES: usize = 100;

/// Longest request or header line accepted, terminator included.
const MAX_LINE_BYTES: u64 = 8 * 1024;

/// How long one connection may take to deliver its request head.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Loopback listener bound to an ephemeral port on 127.0.0.1, plus `[::1]`
/// on the same port when the host allows it.
pub struct CallbackListener {
    v4: TcpListener,
    v6: Option<TcpListener>,
    port: u16,
}

impl CallbackListener {
    /// Bind a fresh ephemeral port for one attempt.
    pub async fn bind() -> AuthResult<Self> {
        let v4 = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(|e| AuthError::CallbackListener(format!("Failed to bind 127.0.0.1: {}", e)))?;
        let port = v4.local_addr()?.port();

        // `localhost` may resolve to ::1 first.
        let v6 = match TcpListener::bind((Ipv6Addr::LOCALHOST, port)).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                debug!(port, error = %e, "IPv6 loopback unavailable for SSO callback");
                None
            }
        };

        info!(port, dual_stack = v6.is_some(), "SSO callback listener bound");
        Ok(Self { v4, v6, port })
    }

    /// Port the browser must redirect to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start serving the single callback on a background task.
    pub fn spawn(self) -> PendingCallback {
        let port = self.port;
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let result = self.serve_once().await;
            // The waiter may already have given up.
            let _ = tx.send(result);
        });

        PendingCallback { port, rx, handle }
    }

    async fn accept(&self) -> std::io::Result<TcpStream> {
        match &self.v6 {
            Some(v6) => {
                tokio::select! {
                    accepted = self.v4.accept() => accepted.map(|(stream, _)| stream),
                    accepted = v6.accept() => accepted.map(|(stream, _)| stream),
                }
            }
            None => self.v4.accept().await.map(|(stream, _)| stream),
        }
    }

    async fn serve_once(self) -> AuthResult<String> {
        // Dropping the set on return aborts any readers still waiting.
        let mut readers = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.accept() => {
                    let stream = accepted
                        .map_err(|e| AuthError::CallbackListener(format!("Accept failed: {}", e)))?;
                    debug!(port = self.port, "SSO callback connection accepted");
                    readers.spawn(read_request(stream));
                }
                Some(joined) = readers.join_next(), if !readers.is_empty() => match joined {
                    Ok(Some(request)) => return handle_callback(request).await,
                    Ok(None) => continue,
                    Err(e) => debug!(error = %e, "SSO callback reader task failed"),
                },
            }
        }
    }
}

/// A connection that delivered a request line, with its headers drained.
struct CallbackRequest {
    stream: TcpStream,
    request_line: String,
}

/// Read one request head, or `None` if the connection never sends one in time.
async fn read_request(stream: TcpStream) -> Option<CallbackRequest> {
    match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_head(stream)).await {
        Ok(Ok(Some(request))) => Some(request),
        Ok(Ok(None)) => {
            debug!("SSO callback connection closed without a request");
            None
        }
        Ok(Err(e)) => {
            debug!(error = %e, "Discarding unreadable SSO callback connection");
            None
        }
        Err(_) => {
            debug!("SSO callback connection sent no request in time");
            None
        }
    }
}

async fn read_head(stream: TcpStream) -> std::io::Result<Option<CallbackRequest>> {
    let mut reader = BufReader::new(stream);

    // Tolerate stray blank lines ahead of the request line.
    let mut request_line = String::new();
    for _ in 0..MAX_HEADER_LINES {
        request_line.clear();
        if read_bounded_line(&mut reader, &mut request_line).await? == 0 {
            return Ok(None);
        }
        if !request_line.trim().is_empty() {
            break;
        }
    }
    if request_line.trim().is_empty() {
        return Ok(None);
    }

    // Drain headers so the close does not reset the connection under the reply.
    let mut header = String::new();
    for _ in 0..MAX_HEADER_LINES {
        header.clear();
        if read_bounded_line(&mut reader, &mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }

    Ok(Some(CallbackRequest {
        stream: reader.into_inner(),
        request_line,
    }))
}

async fn read_bounded_line(
    reader: &mut BufReader<TcpStream>,
    line: &mut String,
) -> std::io::Result<usize> {
    let read = (&mut *reader).take(MAX_LINE_BYTES).read_line(line).await?;
    if read as u64 == MAX_LINE_BYTES && !line.ends_with('\n') {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "SSO callback request line too long",
        ));
    }
    Ok(read)
}

/// A running listener awaiting its one callback.
pub struct PendingCallback {
    port: u16,
    rx: oneshot::Receiver<AuthResult<String>>,
    handle: JoinHandle<()>,
}

impl PendingCallback {
    /// Port the listener is serving.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait up to `timeout` for the callback and return the decoded token.
    ///
    /// The listener is stopped before this returns, regardless of outcome.
    pub async fn wait(mut self, timeout: Duration) -> AuthResult<String> {
        let outcome = tokio::time::timeout(timeout, &mut self.rx).await;
        self.handle.abort();

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AuthError::CallbackListener(
                "Listener stopped without reporting a result".to_string(),
            )),
            Err(_) => {
                warn!(timeout = ?timeout, "No SSO callback received");
                Err(AuthError::Timeout(timeout))
            }
        }
    }
}

impl Drop for PendingCallback {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Validate one callback request and answer the browser.
async fn handle_callback(request: CallbackRequest) -> AuthResult<String> {
    let CallbackRequest {
        mut stream,
        request_line,
    } = request;

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    // The target carries the token, so only the method is logged.
    debug!(method, "Received SSO callback request");

    if method != "GET" {
        send_best_effort(&mut stream, 405, "Method Not Allowed", "Method Not Allowed").await;
        return Err(AuthError::InvalidHttpMethod(method.to_string()));
    }

    let query = target.find('?').map(|idx| &target[idx..]).unwrap_or_default();
    let token = match parse_token(query) {
        Ok(token) => token,
        Err(e) => {
            send_best_effort(&mut stream, 400, "Bad Request", "Bad Request").await;
            return Err(e);
        }
    };

    send_best_effort(&mut stream, 200, "OK", &success_page()).await;
    Ok(token)
}

/// Extract and URL-decode the token from a query string starting with `?`.
pub(crate) fn parse_token(query: &str) -> AuthResult<String> {
    let raw = query
        .strip_prefix(TOKEN_QUERY_PREFIX)
        .ok_or(AuthError::InvalidQueryPrefix)?;
    let raw = raw.split('&').next().unwrap_or_default();
    if raw.is_empty() {
        return Err(AuthError::MissingToken);
    }

    let token = urlencoding::decode(raw)
        .map_err(|e| AuthError::CallbackListener(format!("Token is not valid UTF-8: {}", e)))?;
    Ok(token.into_owned())
}

async fn send_best_effort(
    writer: &mut TcpStream,
    status_code: u16,
    status_text: &str,
    body: &str,
) {
    if let Err(e) = send_response(writer, status_code, status_text, body).await {
        warn!(status_code, error = %e, "Failed to write SSO callback response");
    }
}

async fn send_response(
    writer: &mut TcpStream,
    status_code: u16,
    status_text: &str,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_code,
        status_text,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>snowlink - SSO complete</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Your identity was confirmed</h1>
<p>Authentication is complete. You can close this window.</p>
</body>
</html>"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_parse_token_decodes() {
        assert_eq!(parse_token("?token=abc%2Fdef%3D%3D").unwrap(), "abc/def==");
        assert_eq!(parse_token("?token=abc&confirm=true").unwrap(), "abc");
    }

    #[test]
    fn test_parse_token_rejects_other_queries() {
        assert!(matches!(parse_token("?code=abc"), Err(AuthError::InvalidQueryPrefix)));
        assert!(matches!(parse_token(""), Err(AuthError::InvalidQueryPrefix)));
        assert!(matches!(parse_token("?confirm=1&token=abc"), Err(AuthError::InvalidQueryPrefix)));
        assert!(matches!(parse_token("?token="), Err(AuthError::MissingToken)));
    }

    async fn send_raw(port: u16, request: &str) -> String {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response).await;
        response
    }

    #[tokio::test]
    async fn test_listener_returns_token_and_success_page() {
        let listener = CallbackListener::bind().await.unwrap();
        let port = listener.port();
        assert_ne!(port, 0);
        let pending = listener.spawn();

        let response = send_raw(port, "GET /?token=t%2B1 HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        let token = pending.wait(Duration::from_secs(5)).await.unwrap();

        assert_eq!(token, "t+1");
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
    }

    #[tokio::test]
    async fn test_listener_rejects_post_promptly() {
        let listener = CallbackListener::bind().await.unwrap();
        let port = listener.port();
        let pending = listener.spawn();

        let response = send_raw(port, "POST /?token=abc HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        let result = pending.wait(Duration::from_secs(30)).await;

        assert!(matches!(result, Err(AuthError::InvalidHttpMethod(ref m)) if m == "POST"));
        assert!(response.starts_with("HTTP/1.1 405"), "{}", response);
    }

    #[tokio::test]
    async fn test_listener_serves_a_single_callback() {
        let listener = CallbackListener::bind().await.unwrap();
        let port = listener.port();
        let pending = listener.spawn();

        send_raw(port, "GET /?token=first HTTP/1.1\r\n\r\n").await;
        assert_eq!(pending.wait(Duration::from_secs(5)).await.unwrap(), "first");

        // Give the aborted task a moment to drop its sockets.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.is_err());
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_callback() {
        let listener = CallbackListener::bind().await.unwrap();
        let port = listener.port();
        let pending = listener.spawn();

        // Browsers preconnect and may never send anything on the socket.
        let _idle = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let response = send_raw(port, "GET /?token=real HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        let token = pending.wait(Duration::from_secs(5)).await.unwrap();

        assert_eq!(token, "real");
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
    }

    #[tokio::test]
    async fn test_empty_connection_is_skipped() {
        let listener = CallbackListener::bind().await.unwrap();
        let port = listener.port();
        let pending = listener.spawn();

        drop(TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;

        send_raw(port, "GET /?token=after-empty HTTP/1.1\r\n\r\n").await;
        assert_eq!(pending.wait(Duration::from_secs(5)).await.unwrap(), "after-empty");
    }

    #[tokio::test]
    async fn test_oversized_request_line_is_discarded() {
        let listener = CallbackListener::bind().await.unwrap();
        let port = listener.port();
        let pending = listener.spawn();

        // An unterminated line past the limit, on a connection left open.
        let mut flood = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();
        flood.write_all(&vec![b'A'; 16 * 1024]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        send_raw(port, "GET /?token=bounded HTTP/1.1\r\n\r\n").await;
        assert_eq!(pending.wait(Duration::from_secs(5)).await.unwrap(), "bounded");
        drop(flood);
    }
}
