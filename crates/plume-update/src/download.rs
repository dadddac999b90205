use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

const MAX_REDIRECT_HOPS: usize = 5;
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: u64,
    pub percent: f64,
}

#[derive(Debug, Error)]
enum DownloadError {
    #[error("download request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("download failed with HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("redirect chain exceeded {MAX_REDIRECT_HOPS} hops")]
    TooManyRedirects,
    #[error("redirect location is not a valid url: {0}")]
    BadRedirect(String),
    #[error("download stream error: {0}")]
    Stream(#[source] reqwest::Error),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

impl DownloadError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Build the HTTP client used for archive downloads.
///
/// Automatic redirect following is disabled so the fetcher's bounded hop loop
/// is the only redirect mechanism in play.
///
/// # Errors
/// Returns an error when the underlying client cannot be constructed.
pub fn archive_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(format!("plume/{}/hot-update", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Download an archive to `dest`, streaming it to disk.
///
/// Follows up to [`MAX_REDIRECT_HOPS`] redirects, reports progress at most
/// once per 500ms (plus a final message), and verifies an incremental SHA-256
/// when `expected_sha256` is given. Every failure resolves to `false`;
/// details are only logged.
pub async fn download_archive(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    expected_sha256: Option<&str>,
    progress: Option<mpsc::Sender<DownloadProgress>>,
) -> bool {
    match download_inner(client, url, dest, expected_sha256, progress).await {
        Ok(()) => true,
        Err(error) => {
            warn!("Archive download from {url} failed: {error}");
            false
        }
    }
}

async fn download_inner(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    expected_sha256: Option<&str>,
    progress: Option<mpsc::Sender<DownloadProgress>>,
) -> Result<(), DownloadError> {
    let mut url = url.to_string();
    let mut hops = 0_usize;

    let response = loop {
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(DownloadError::Request)?;
        let status = response.status();

        if status.is_redirection()
            && let Some(location) = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
        {
            if hops == MAX_REDIRECT_HOPS {
                return Err(DownloadError::TooManyRedirects);
            }
            hops += 1;
            let resolved = response
                .url()
                .join(location)
                .map_err(|_| DownloadError::BadRedirect(location.to_string()))?;
            debug!("Following redirect {hops} to {resolved}");
            url = resolved.to_string();
            continue;
        }

        if !(status.is_success() || status.is_redirection()) {
            return Err(DownloadError::Status(status));
        }

        break response;
    };

    stream_to_file(response, dest, expected_sha256, progress).await
}

async fn stream_to_file(
    response: reqwest::Response,
    dest: &Path,
    expected_sha256: Option<&str>,
    progress: Option<mpsc::Sender<DownloadProgress>>,
) -> Result<(), DownloadError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| DownloadError::io("failed to create download directory", error))?;
    }

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut hasher = expected_sha256.map(|_| Sha256::new());

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|error| DownloadError::io("failed to create download file", error))?;

    let mut last_report = Instant::now();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(DownloadError::Stream)?;
        file.write_all(&chunk)
            .await
            .map_err(|error| DownloadError::io("failed to write download data", error))?;
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&chunk);
        }
        downloaded += chunk.len() as u64;

        if let Some(sender) = progress.as_ref()
            && last_report.elapsed() >= PROGRESS_INTERVAL
        {
            let _ = sender.send(progress_message(downloaded, total)).await;
            last_report = Instant::now();
        }
    }

    file.flush()
        .await
        .map_err(|error| DownloadError::io("failed to flush download file", error))?;

    if let Some(sender) = progress.as_ref() {
        let _ = sender.send(progress_message(downloaded, total)).await;
    }

    if let (Some(hasher), Some(expected)) = (hasher, expected_sha256) {
        let actual = format!("{:x}", hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(DownloadError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
    }

    info!("Download complete: {downloaded} bytes to {}", dest.display());
    Ok(())
}

fn progress_message(downloaded: u64, total: u64) -> DownloadProgress {
    #[allow(clippy::cast_precision_loss)]
    let percent = if total == 0 {
        0.0
    } else {
        downloaded as f64 / total as f64 * 100.0
    };
    DownloadProgress {
        downloaded,
        total,
        percent,
    }
}

#[cfg(test)]
mod tests {
    use sha2::{Digest, Sha256};

    use super::{archive_client, download_archive};
    use crate::test_support::{CannedResponse, serve_responses};

    fn sha256_hex(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    #[tokio::test]
    async fn download_writes_file_and_verifies_checksum() {
        let body = b"renderer bundle bytes".to_vec();
        let expected = sha256_hex(&body);
        let url = serve_responses(vec![CannedResponse::ok(body.clone())]).await;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let dest = temp.path().join("staging").join("bundle.tar.gz");
        let client = archive_client().expect("archive client should build");

        let ok = download_archive(
            &client,
            &format!("{url}/bundle.tar.gz"),
            &dest,
            Some(&expected),
            None,
        )
        .await;

        assert!(ok, "download with matching checksum should succeed");
        let written = std::fs::read(&dest).expect("downloaded file should exist");
        assert_eq!(written, body);
    }

    #[tokio::test]
    async fn checksum_mismatch_fails_even_on_http_success() {
        let url = serve_responses(vec![CannedResponse::ok(b"corrupted body".to_vec())]).await;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let dest = temp.path().join("bundle.tar.gz");
        let client = archive_client().expect("archive client should build");

        let ok = download_archive(
            &client,
            &format!("{url}/bundle.tar.gz"),
            &dest,
            Some(&sha256_hex(b"the real body")),
            None,
        )
        .await;

        assert!(!ok, "checksum mismatch should fail the download");
    }

    #[tokio::test]
    async fn redirect_is_followed_to_the_new_location() {
        let body = b"bytes behind the redirect".to_vec();
        let target_url = serve_responses(vec![CannedResponse::ok(body.clone())]).await;
        let origin_url = serve_responses(vec![CannedResponse::redirect(&format!(
            "{target_url}/moved.tar.gz"
        ))])
        .await;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let dest = temp.path().join("bundle.tar.gz");
        let client = archive_client().expect("archive client should build");

        let ok = download_archive(
            &client,
            &format!("{origin_url}/bundle.tar.gz"),
            &dest,
            Some(&sha256_hex(&body)),
            None,
        )
        .await;

        assert!(ok, "redirected download should succeed");
        let written = std::fs::read(&dest).expect("downloaded file should exist");
        assert_eq!(written, body);
    }

    #[tokio::test]
    async fn redirect_chain_is_bounded() {
        // One more redirect than the hop limit, all pointing back at the
        // same listener.
        let responses = (0..7)
            .map(|_| CannedResponse::redirect("/again.tar.gz"))
            .collect();
        let url = serve_responses(responses).await;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let dest = temp.path().join("bundle.tar.gz");
        let client = archive_client().expect("archive client should build");

        let ok = download_archive(&client, &format!("{url}/start.tar.gz"), &dest, None, None).await;

        assert!(!ok, "unbounded redirect chains should fail");
    }

    #[tokio::test]
    async fn non_success_status_fails() {
        let url = serve_responses(vec![CannedResponse::status(404, "Not Found")]).await;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let dest = temp.path().join("bundle.tar.gz");
        let client = archive_client().expect("archive client should build");

        let ok = download_archive(&client, &format!("{url}/missing.tar.gz"), &dest, None, None).await;

        assert!(!ok, "4xx responses should fail the download");
    }

    #[tokio::test]
    async fn progress_reports_final_message() {
        let body = vec![0_u8; 2048];
        let url = serve_responses(vec![CannedResponse::ok(body.clone())]).await;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let dest = temp.path().join("bundle.tar.gz");
        let client = archive_client().expect("archive client should build");
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);

        let ok = download_archive(&client, &format!("{url}/bundle.tar.gz"), &dest, None, Some(tx))
            .await;
        assert!(ok);

        let mut last = None;
        while let Some(message) = rx.recv().await {
            last = Some(message);
        }
        let last = last.expect("at least the final progress message should be sent");
        assert_eq!(last.downloaded, 2048);
        assert_eq!(last.total, 2048);
        assert!((last.percent - 100.0).abs() < f64::EPSILON);
    }
}
