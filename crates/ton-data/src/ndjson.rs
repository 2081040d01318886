//! Line-delimited JSON import/export.
//!
//! Malformed lines are skipped with a warning; only an unreadable file is an
//! error.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use eyre::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Reads every parsable line of `path` as `T`.
///
/// # Errors
/// Returns error if the file cannot be opened or read.
pub fn read_ndjson<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file =
        File::open(path).wrap_err_with(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    let mut skipped = 0_usize;
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<T>(trimmed) {
            Ok(row) => rows.push(row),
            Err(err) => {
                skipped += 1;
                tracing::warn!(
                    file = %path.display(),
                    line_number = line_number + 1,
                    error = %err,
                    "skipping malformed ndjson line"
                );
            }
        }
    }

    tracing::debug!(file = %path.display(), rows = rows.len(), skipped, "ndjson loaded");
    Ok(rows)
}

/// Writes `rows` to `path`, one JSON document per line.
///
/// Parent directories are created as needed.
///
/// # Errors
/// Returns error if the file cannot be created or a row fails to serialize.
pub fn write_ndjson<T: Serialize>(path: &Path, rows: &[T]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }

    let file =
        File::create(path).wrap_err_with(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut writer, row).wrap_err("failed to serialize ndjson row")?;
        writer.write_all(b"\n")?;
    }
    writer
        .flush()
        .wrap_err_with(|| format!("failed to flush {}", path.display()))?;

    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawTransaction;

    #[test]
    fn skips_malformed_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("raw.ndjson");
        std::fs::write(
            &path,
            "{\"hash\":\"a\",\"lt\":1}\n\nnot json\n{\"hash\":\"b\",\"lt\":\"2\"}\n",
        )
        .expect("write fixture");

        let txs: Vec<RawTransaction> = read_ndjson(&path).expect("read should succeed");
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[1].lt, 2);
    }

    #[test]
    fn writes_into_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/out.ndjson");
        let rows = vec![RawTransaction {
            hash: "x".to_string(),
            lt: 5,
            ..Default::default()
        }];

        let written = write_ndjson(&path, &rows).expect("write should succeed");
        assert_eq!(written, 1);

        let back: Vec<RawTransaction> = read_ndjson(&path).expect("read back");
        assert_eq!(back, rows);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = read_ndjson::<RawTransaction>(Path::new("/definitely/not/here.ndjson"));
        assert!(err.is_err());
    }
}
