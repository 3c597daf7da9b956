use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::info;

/// Longest path, in bytes, that output folders are allowed to reach.
pub const MAX_PATH_LENGTH: usize = 255;

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}

/// Shortens the final component of `path` so the whole path fits in
/// `max_length` bytes, keeping the tail of the name behind `prefix`.
pub fn truncate_file_name(path: &Path, max_length: usize, prefix: &str) -> PathBuf {
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        return path.to_path_buf();
    };
    let directory = path.parent().unwrap_or_else(|| Path::new(""));
    let directory_len = directory.as_os_str().len();

    let required = directory_len + 1 + prefix.len();
    let max_name_len = max_length.saturating_sub(required);
    if file_name.len() <= max_name_len {
        return path.to_path_buf();
    }

    let mut cut = file_name.len() - max_name_len;
    while !file_name.is_char_boundary(cut) {
        cut += 1;
    }
    let shortened = format!("{prefix}{}", &file_name[cut..]);
    info!(from = %file_name, to = %shortened, "renamed to fit legal file length");
    directory.join(shortened)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::truncate_file_name;

    #[test]
    fn short_names_are_kept() {
        let path = Path::new("datasets/energy/recall_top5");
        assert_eq!(truncate_file_name(path, 255, "short_"), path);
    }

    #[test]
    fn long_names_keep_their_tail_behind_prefix() {
        let name = format!("head_{}_tail", "x".repeat(40));
        let path = Path::new("out").join(&name);
        let shortened = truncate_file_name(&path, 30, "short_");

        assert_eq!(shortened.as_os_str().len(), 30);
        let file_name = shortened.file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("short_"));
        assert!(file_name.ends_with("_tail"));
        assert!(name.ends_with(&file_name["short_".len()..]));
    }

    #[test]
    fn multibyte_names_are_cut_on_char_boundaries() {
        let path = Path::new("out").join("评估结果评估结果评估结果");
        let shortened = truncate_file_name(&path, 20, "s_");
        let file_name = shortened.file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("s_"));
        assert!(shortened.as_os_str().len() <= 20);
    }
}
