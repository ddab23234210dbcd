//! Persistence helpers shared by the pipeline stages.
//!
//! Supports CSV append (header written once), whole-file CSV and JSON
//! writes, and typed CSV reads.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::debug;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}

/// Appends `record` as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    ensure_parent(path)?;
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Writes `records` to a comma-separated file with a header row, replacing
/// any previous contents.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = records.len(), "CSV written");
    Ok(())
}

/// Writes one value per line to a headerless file.
pub fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for line in lines {
        writer.write_record([line.as_ref()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads the first field of every row of a headerless file.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        lines.push(record.get(0).unwrap_or_default().to_string());
    }
    Ok(lines)
}

/// Reads a comma-separated file with a header row into `T`s.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut records = Vec::new();
    for (i, result) in reader.deserialize().enumerate() {
        records.push(result.with_context(|| format!("{} row {}", path.display(), i + 2))?);
    }
    Ok(records)
}

/// Writes `value` as pretty-printed JSON.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
