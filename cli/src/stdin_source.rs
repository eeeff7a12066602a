//! Records to store, one JSON object per line
//!
//! ```text
//! {"context": "daily", "path": "daily/report.json", "data": {"total": 42}}
//! ```

use std::io::BufRead;

use blobbuf::DataObject;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Record {
    /// Buffer context; defaults to the first path segment
    #[serde(default)]
    pub context: Option<String>,
    pub path: String,
    pub data: DataObject,
}

impl Record {
    #[must_use]
    pub fn context(&self) -> &str {
        match &self.context {
            Some(context) => context,
            None => self
                .path
                .split_once('/')
                .map_or(self.path.as_str(), |(head, _)| head),
        }
    }
}

/// Parse records from `input`, skipping blank lines.
///
/// # Errors
///
/// Returns the line number and the parse message for the first bad line.
pub fn read_records<R: BufRead>(input: R) -> Result<Vec<Record>, String> {
    let mut records = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let line = line.map_err(|e| format!("line {}: {e}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| format!("line {}: {e}", idx + 1))?;
        records.push(record);
    }
    Ok(records)
}
