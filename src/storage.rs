// File-system plumbing: data directory resolution, the backup document
// holding checkpoint records, and the execution log of completed runs.

use chrono::Local;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::error::PixError;

pub fn get_pix_data_dir() -> PathBuf {
    let xdg_data_home = env::var("XDG_DATA_HOME")
        .ok()
        .and_then(|path| {
            if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            }
        })
        .or_else(|| {
            env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".local/share"))
        })
        .expect("Could not determine data directory");

    xdg_data_home.join("pix")
}

/// Default location of the backup document
pub fn backup_path() -> PathBuf {
    get_pix_data_dir().join("backup.json")
}

/// Read the whole backup document; a missing file is an empty document.
pub fn read_backup(path: &PathBuf) -> Result<serde_json::Value, PixError> {
    if !path.exists() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    let content = fs::read_to_string(path)?;
    let value = serde_json::from_str(&content)?;
    Ok(value)
}

/// Write the backup document back out, pretty-printed so records stay
/// human-diffable across runs.
pub fn write_backup(path: &PathBuf, document: &serde_json::Value) -> Result<(), PixError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let content = serde_json::to_string_pretty(document)?;
    fs::write(path, content)?;
    Ok(())
}

/// Append one line per completed computation to execution_log.txt
pub fn log_execution(
    formula: &str,
    args: &str,
    result: &str,
    seconds: f64,
) -> Result<(), PixError> {
    let data_dir = get_pix_data_dir();
    fs::create_dir_all(&data_dir)?;

    let log_path = data_dir.join("execution_log.txt");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let mut itoa_buf = itoa::Buffer::new();
    let millis = itoa_buf.format((seconds * 1000.0) as u64);

    writeln!(
        file,
        "{} | {} | {} | {} | {}ms",
        timestamp, formula, args, result, millis
    )?;

    Ok(())
}
