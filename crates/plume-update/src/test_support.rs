//! Minimal canned-response HTTP listener for exercising the network paths
//! against a real socket without external mocking dependencies.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Build a gzip tarball from `(path, body)` entries.
pub(crate) fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, body) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *body)
            .expect("tar entry should be written");
    }
    builder
        .into_inner()
        .expect("tar archive should be finalized")
        .finish()
        .expect("gzip stream should be finalized")
}

/// A renderer bundle archive whose entry point holds `entry_body`.
pub(crate) fn renderer_tar_gz(entry_body: &[u8]) -> Vec<u8> {
    tar_gz(&[("renderer/index.html", entry_body)])
}

pub(crate) struct CannedResponse {
    status: u16,
    reason: &'static str,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CannedResponse {
    pub(crate) fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            reason: "OK",
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub(crate) fn json(body: &str) -> Self {
        let mut response = Self::ok(body.as_bytes().to_vec());
        response
            .headers
            .push(("content-type".to_string(), "application/json".to_string()));
        response
    }

    pub(crate) fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            reason: "Found",
            headers: vec![("location".to_string(), location.to_string())],
            body: Vec::new(),
        }
    }

    pub(crate) fn status(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str(&format!(
            "content-length: {}\r\nconnection: close\r\n\r\n",
            self.body.len()
        ));

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Serve the queued responses, one per accepted connection and in order, then
/// stop listening. Returns the server's base URL.
pub(crate) async fn serve_responses(responses: Vec<CannedResponse>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test listener should bind to an ephemeral port");
    let addr = listener
        .local_addr()
        .expect("test listener should report its local address");

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };

            // Requests in these tests carry no body, so reading up to the
            // header terminator is enough.
            let mut request = Vec::new();
            let mut buf = [0_u8; 4096];
            loop {
                let Ok(read) = socket.read(&mut buf).await else {
                    return;
                };
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
                if request.windows(4).any(|window| window == b"\r\n\r\n") {
                    break;
                }
            }

            let _ = socket.write_all(&response.into_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{addr}")
}
