//! Writes a response body to its destination and stamps the timestamp.
//!
//! The body is streamed into a hidden `.part` sibling, synced, and renamed
//! over the destination only once complete, so an interrupted transfer never
//! leaves a truncated file where a complete one is expected.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use super::error::DownloadError;
use super::freshness::FreshnessStore;
use super::redirect::ResolvedResponse;

/// Outcome of a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedFile {
    /// Destination path.
    pub path: PathBuf,
    /// Body bytes written.
    pub bytes_written: u64,
    /// Timestamp recorded for the destination, if one was set explicitly.
    pub stamped: Option<SystemTime>,
}

/// Streams the response body to `dest` and records its freshness timestamp.
///
/// The timestamp is the response's `Last-Modified`. Without one, a
/// pre-existing destination keeps its previous timestamp and a brand-new file
/// keeps the time it was written.
///
/// # Errors
///
/// - [`DownloadError::Network`] / [`DownloadError::Timeout`] if the body stream fails
/// - [`DownloadError::Io`] if the temporary file, rename or timestamp write fails
///
/// On error the partial file is removed and any previous `dest` is untouched.
pub async fn materialize(
    resolved: ResolvedResponse,
    dest: &Path,
    store: &dyn FreshnessStore,
) -> Result<MaterializedFile, DownloadError> {
    let previous = store.read(dest).await;
    let last_modified = resolved.last_modified();
    let url = resolved.final_url().to_string();
    let partial = partial_path(dest)?;

    let (response, _permit) = resolved.into_parts();

    let file = File::create(&partial)
        .await
        .map_err(|e| DownloadError::io(partial.clone(), e))?;

    let written = match stream_to_file(file, response, &url, &partial).await {
        Ok(written) => written,
        Err(error) => {
            debug!(path = %partial.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(error);
        }
    };

    if let Err(e) = tokio::fs::rename(&partial, dest).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(DownloadError::io(dest, e));
    }

    let stamped = match (last_modified, previous) {
        (Some(server_time), _) => Some(server_time),
        (None, Some(previous)) => {
            warn!(path = %dest.display(), "no Last-Modified, keeping previous timestamp");
            Some(previous)
        }
        (None, None) => {
            warn!(path = %dest.display(), "no Last-Modified, new file keeps write time");
            None
        }
    };
    if let Some(at) = stamped {
        store.write(dest, at).await?;
    }

    info!(path = %dest.display(), bytes = written, "download complete");

    Ok(MaterializedFile {
        path: dest.to_path_buf(),
        bytes_written: written,
        stamped,
    })
}

/// Hidden sibling used while the body is in flight.
fn partial_path(dest: &Path) -> Result<PathBuf, DownloadError> {
    let name = dest.file_name().ok_or_else(|| {
        DownloadError::io(
            dest,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "destination has no file name",
            ),
        )
    })?;
    let name = name.to_string_lossy();
    Ok(dest.with_file_name(format!(".{name}.{}.part", std::process::id())))
}

/// Streams the body to `file`, returning bytes written.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::transport(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use reqwest::Method;
    use tempfile::TempDir;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::download::{FileMtimeStore, HttpClient, MemoryFreshnessStore, RedirectResolver};
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    const LAST_MODIFIED: &str = "Fri, 27 Oct 2023 07:24:45 GMT";

    async fn resolve(mock_server: &MockServer, route: &str) -> ResolvedResponse {
        let resolver = RedirectResolver::new(HttpClient::single_threaded(5_000).unwrap());
        let url = Url::parse(&format!("{}{route}", mock_server.uri())).unwrap();
        resolver.execute(Method::GET, &url, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_materialize_writes_body_and_stamps_last_modified() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/dwca.zip"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Last-Modified", LAST_MODIFIED)
                    .set_body_bytes(b"PK archive bytes"),
            )
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("dwca.zip");
        let resolved = resolve(&mock_server, "/dwca.zip").await;

        let result = materialize(resolved, &dest, &FileMtimeStore).await.unwrap();

        let expected = UNIX_EPOCH + Duration::from_secs(1_698_391_485);
        assert_eq!(result.bytes_written, 16);
        assert_eq!(result.stamped, Some(expected));
        assert_eq!(std::fs::read(&dest).unwrap(), b"PK archive bytes");
        assert_eq!(std::fs::metadata(&dest).unwrap().modified().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_materialize_without_header_keeps_previous_timestamp() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/rank.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<new/>"))
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("rank.xml");
        std::fs::write(&dest, b"<old/>").unwrap();
        let previous = UNIX_EPOCH + Duration::from_secs(1_249_339_051);
        FileMtimeStore.write(&dest, previous).await.unwrap();

        let resolved = resolve(&mock_server, "/rank.xml").await;
        let result = materialize(resolved, &dest, &FileMtimeStore).await.unwrap();

        assert_eq!(result.stamped, Some(previous));
        assert_eq!(std::fs::read(&dest).unwrap(), b"<new/>");
        assert_eq!(std::fs::metadata(&dest).unwrap().modified().unwrap(), previous);
    }

    #[tokio::test]
    async fn test_materialize_without_header_new_file_uses_write_time() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/fresh.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh"))
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("fresh.txt");
        let before = SystemTime::now() - Duration::from_secs(5);

        let resolved = resolve(&mock_server, "/fresh.txt").await;
        let result = materialize(resolved, &dest, &FileMtimeStore).await.unwrap();

        assert_eq!(result.stamped, None);
        let modified = std::fs::metadata(&dest).unwrap().modified().unwrap();
        assert!(modified >= before, "new file should not be backdated");
    }

    #[tokio::test]
    async fn test_materialize_leaves_no_partial_file_behind() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/data.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64 * 1024]))
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("data.bin");
        let resolved = resolve(&mock_server, "/data.bin").await;
        materialize(resolved, &dest, &FileMtimeStore).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("data.bin")]);
    }

    #[tokio::test]
    async fn test_materialize_into_missing_directory_is_io_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x"))
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("missing").join("x");
        let resolved = resolve(&mock_server, "/x").await;

        let result = materialize(resolved, &dest, &FileMtimeStore).await;
        assert!(matches!(result, Err(DownloadError::Io { .. })));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_materialize_records_into_memory_store() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/rank.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Last-Modified", LAST_MODIFIED)
                    .set_body_bytes(b"<rank/>"),
            )
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("rank.xml");
        let store = MemoryFreshnessStore::new();
        let resolved = resolve(&mock_server, "/rank.xml").await;

        materialize(resolved, &dest, &store).await.unwrap();
        assert_eq!(
            store.read(&dest).await,
            Some(UNIX_EPOCH + Duration::from_secs(1_698_391_485))
        );
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let partial = partial_path(Path::new("/data/archives/dwca.zip")).unwrap();
        assert_eq!(partial.parent(), Some(Path::new("/data/archives")));
        let name = partial.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".dwca.zip."), "got: {name}");
        assert!(name.ends_with(".part"), "got: {name}");
    }

    #[test]
    fn test_partial_path_requires_file_name() {
        assert!(matches!(
            partial_path(Path::new("/")),
            Err(DownloadError::Io { .. })
        ));
    }
}
