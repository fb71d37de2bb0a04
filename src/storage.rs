//! Thin helpers over an OpenDAL operator.
//!
//! Paths are relative to the operator root. Directory paths end with `/`.

use crate::error::{DatasetError, Result};
use crate::partition::dir_path;
use bytes::Bytes;
use opendal::{EntryMode, ErrorKind, Operator};

/// A directory child returned by [`list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Full path relative to the operator root
    pub path: String,
    /// Last path component, without a trailing `/`
    pub name: String,
    pub is_dir: bool,
}

/// List the direct children of `dir`, sorted by name.
///
/// A missing directory lists as empty.
pub async fn list_dir(op: &Operator, dir: &str) -> Result<Vec<DirEntry>> {
    let dir = dir_path(dir);
    let entries = match op.list(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(DatasetError::storage(format!(
                "Failed to list '{}': {}",
                dir, e
            )))
        }
    };

    let mut children: Vec<DirEntry> = entries
        .into_iter()
        // Some services include the listed directory itself.
        .filter(|entry| entry.path() != dir)
        .map(|entry| DirEntry {
            path: entry.path().to_string(),
            name: entry.name().trim_end_matches('/').to_string(),
            is_dir: entry.metadata().mode() == EntryMode::DIR,
        })
        .collect();
    children.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(children)
}

/// Every file below `dir` at any depth, sorted by path.
pub async fn list_files(op: &Operator, dir: &str) -> Result<Vec<String>> {
    let dir = dir_path(dir);
    let entries = match op.list_with(&dir).recursive(true).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(DatasetError::storage(format!(
                "Failed to list '{}': {}",
                dir, e
            )))
        }
    };

    let mut files: Vec<String> = entries
        .into_iter()
        .filter(|entry| entry.metadata().mode() == EntryMode::FILE)
        .map(|entry| entry.path().to_string())
        .collect();
    files.sort();
    Ok(files)
}

pub async fn read_bytes(op: &Operator, path: &str) -> Result<Bytes> {
    let buffer = op
        .read(path)
        .await
        .map_err(|e| DatasetError::storage(format!("Failed to read '{}': {}", path, e)))?;
    Ok(buffer.to_bytes())
}

pub async fn write_bytes(op: &Operator, path: &str, bytes: Vec<u8>) -> Result<()> {
    op.write(path, bytes)
        .await
        .map_err(|e| DatasetError::storage(format!("Failed to write '{}': {}", path, e)))?;
    Ok(())
}

/// Delete every file below `dir`, returning how many were removed.
pub async fn delete_files(op: &Operator, dir: &str) -> Result<usize> {
    let files = list_files(op, dir).await?;
    for path in &files {
        op.delete(path)
            .await
            .map_err(|e| DatasetError::storage(format!("Failed to delete '{}': {}", path, e)))?;
    }
    if !files.is_empty() {
        tracing::debug!("Deleted {} files under '{}'", files.len(), dir);
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_operator() -> Operator {
        Operator::new(opendal::services::Memory::default())
            .expect("Failed to create memory operator")
            .finish()
    }

    #[tokio::test]
    async fn test_write_read_and_delete() {
        let op = memory_operator();
        write_bytes(&op, "agg/part_0.parquet", b"abc".to_vec())
            .await
            .unwrap();
        write_bytes(&op, "agg/part_1.parquet", b"def".to_vec())
            .await
            .unwrap();

        let read = read_bytes(&op, "agg/part_1.parquet").await.unwrap();
        assert_eq!(&read[..], b"def");

        let files = list_files(&op, "agg").await.unwrap();
        assert_eq!(files, vec!["agg/part_0.parquet", "agg/part_1.parquet"]);

        assert_eq!(delete_files(&op, "agg").await.unwrap(), 2);
        assert!(list_files(&op, "agg").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_lists_empty() {
        let op = memory_operator();
        assert!(list_dir(&op, "nowhere").await.unwrap().is_empty());
        assert!(list_files(&op, "nowhere").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_file_fails() {
        let op = memory_operator();
        let err = read_bytes(&op, "nope.parquet").await.unwrap_err();
        assert_eq!(err.code(), "E006");
    }
}
