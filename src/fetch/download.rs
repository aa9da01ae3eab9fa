// src/fetch/download.rs
use crate::error::{FetchError, IngestError, Result};
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Size of the write buffer between the response stream and the file.
const WRITE_BUFFER_BYTES: usize = 64 * 1024;

/// Path the body is streamed into before it is renamed to `dest`.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Download `url` into `dest`, streaming the body to disk.
///
/// The body lands in `dest.part` and is renamed to `dest` only once fully
/// written, so `dest` never holds a partial download. On failure the `.part`
/// file is removed. Returns the number of bytes written.
#[tracing::instrument(level = "info", skip(client, dest), fields(dest = %dest.display()))]
pub async fn download_to(client: &Client, url: &str, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| IngestError::io(parent, e))?;
    }

    let part = part_path(dest);
    match stream_to_file(client, url, &part).await {
        Ok(bytes) => {
            fs::rename(&part, dest)
                .await
                .map_err(|e| IngestError::io(dest, e))?;
            info!(bytes, "downloaded");
            Ok(bytes)
        }
        Err(err) => {
            if let Err(e) = fs::remove_file(&part).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(part = %part.display(), "could not remove partial download: {}", e);
                }
            }
            Err(err)
        }
    }
}

async fn stream_to_file(client: &Client, url: &str, part: &Path) -> Result<u64> {
    let transport = |source: reqwest::Error| FetchError::Transport {
        url: url.to_string(),
        source,
    };
    let write_err = |source: std::io::Error| FetchError::Write {
        path: part.to_path_buf(),
        source,
    };

    let resp = client.get(url).send().await.map_err(transport)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        }
        .into());
    }

    let file = fs::File::create(part).await.map_err(write_err)?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
    let mut stream = resp.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(transport)?;
        writer.write_all(&chunk).await.map_err(write_err)?;
        written += chunk.len() as u64;
    }
    writer.flush().await.map_err(write_err)?;
    debug!(written, "body complete");

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_body_and_leaves_no_part_file() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/fhv/fhv_tripdata_2019-01.csv.gz");
                then.status(200).body(body.clone());
            })
            .await;

        let dir = tempdir()?;
        let dest = dir.path().join("nested/fhv_tripdata_2019-01.csv.gz");
        let n = download_to(
            &Client::new(),
            &server.url("/fhv/fhv_tripdata_2019-01.csv.gz"),
            &dest,
        )
        .await?;

        mock.assert_async().await;
        assert_eq!(n, body.len() as u64);
        assert_eq!(std::fs::read(&dest)?, body);
        assert!(!part_path(&dest).exists());
        Ok(())
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error_without_file() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.csv.gz");
                then.status(404).body("not found");
            })
            .await;

        let dir = tempdir()?;
        let dest = dir.path().join("missing.csv.gz");
        let err = download_to(&Client::new(), &server.url("/missing.csv.gz"), &dest)
            .await
            .unwrap_err();

        assert!(
            matches!(err, IngestError::Fetch(FetchError::Status { status, .. }) if status.as_u16() == 404),
            "{err}"
        );
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("x.csv.gz");
        // Port 9 (discard) on loopback is not expected to be listening.
        let err = download_to(&Client::new(), "http://127.0.0.1:9/x.csv.gz", &dest)
            .await
            .unwrap_err();

        assert!(
            matches!(err, IngestError::Fetch(FetchError::Transport { .. })),
            "{err}"
        );
        assert!(!dest.exists());
        Ok(())
    }

    #[tokio::test]
    async fn connection_dropped_mid_body_is_transport_error() -> anyhow::Result<()> {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        // promises 100000 bytes, sends 10, then hangs up
        let server = std::thread::spawn(move || -> std::io::Result<()> {
            let (mut stream, _) = listener.accept()?;
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request)?;
            stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\n0123456789")?;
            stream.flush()?;
            Ok(())
        });

        let dir = tempdir()?;
        let dest = dir.path().join("short.csv.gz");
        let err = download_to(&Client::new(), &format!("http://{addr}/short.csv.gz"), &dest)
            .await
            .unwrap_err();
        server.join().expect("server thread panicked")?;

        assert!(
            matches!(err, IngestError::Fetch(FetchError::Transport { .. })),
            "{err}"
        );
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        Ok(())
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("data/fhv/a.csv.gz")),
            PathBuf::from("data/fhv/a.csv.gz.part")
        );
    }
}
