use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::models::ProductRecord;

/// `results_YYYYmmdd_HHMMSS.json` in the working directory.
pub fn default_output_path(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("results_{}.json", now.format("%Y%m%d_%H%M%S")))
}

/// Writes the records as pretty-printed UTF-8 JSON.
pub fn write_json<P: AsRef<Path>>(path: P, records: &[ProductRecord]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records).context("Failed to serialize products")?;
    writer.write_all(b"\n")?;
    writer.flush().context("Failed to flush output file")?;

    log::info!("Results saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_output_path_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(default_output_path(now), PathBuf::from("results_20240309_140507.json"));
    }

    #[test]
    fn test_write_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let mut record = ProductRecord::new("Café Mug", "349");
        record.is_prime = true;
        write_json(&path, &[record.clone()]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Café Mug"));
        let parsed: Vec<ProductRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, vec![record]);
    }

    #[test]
    fn test_write_json_bad_directory() {
        let result = write_json("/no/such/dir/out.json", &[]);
        assert!(result.is_err());
    }
}
