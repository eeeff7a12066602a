//! Raw upload/download of byte content, and format-aware read.

use crate::codec::{format_of, FormatRegistry};
use crate::engine::Engine;
use crate::error::BlobResult;
use crate::DataObject;

/// Write raw bytes to path. Not retried.
///
/// # Errors
///
/// Whatever the engine reports for the write.
pub async fn upload<E: Engine>(engine: &E, content: &[u8], path: &str) -> BlobResult<()> {
    engine.write_all(path, content).await?;
    Ok(())
}

/// Read raw bytes from path.
///
/// # Errors
///
/// `NotFound` if the path does not exist.
pub async fn download<E: Engine>(engine: &E, path: &str) -> BlobResult<Vec<u8>> {
    Ok(engine.read_all(path).await?)
}

/// Download and deserialize using the format of the path's extension.
///
/// # Errors
///
/// `MissingExtension`, `NotFound`, `UnknownFormat` or `Deserialization`.
pub async fn read<E: Engine>(
    engine: &E,
    formats: &FormatRegistry,
    path: &str,
) -> BlobResult<DataObject> {
    let format = format_of(path)?;
    let content = download(engine, path).await?;
    formats.deserialize(&content, &format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemFs;
    use crate::error::BlobError;
    use serde_json::json;

    #[tokio::test]
    async fn test_upload_then_read() {
        let fs = MemFs::new();
        let formats = FormatRegistry::with_defaults();

        upload(&fs, br#"{"x":1}"#, "a.json").await.unwrap();

        assert_eq!(read(&fs, &formats, "a.json").await.unwrap(), json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_download_missing() {
        let fs = MemFs::new();

        assert!(matches!(
            download(&fs, "nope.json").await,
            Err(BlobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_read_unregistered_extension() {
        let fs = MemFs::new();
        let formats = FormatRegistry::with_defaults();
        upload(&fs, b"a,b", "table.csv").await.unwrap();

        assert!(matches!(
            read(&fs, &formats, "table.csv").await,
            Err(BlobError::UnknownFormat(tag)) if tag == "csv"
        ));
    }
}
