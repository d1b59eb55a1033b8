use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::prelude::*;

/// Appends the raw plant documents to daily JSONL files, one document per line.
pub struct Capture {
    directory: PathBuf,
}

impl Capture {
    pub fn new(directory: PathBuf) -> Result<Self> {
        ensure!(directory.is_dir(), "`{}` is not a directory", directory.display());
        Ok(Self { directory })
    }

    /// Daily file name, `2024-03-14.jsonl`.
    pub fn path(&self, date: NaiveDate) -> PathBuf {
        self.directory.join(format!("{date}.jsonl"))
    }

    pub fn append(&self, document: &Value) -> Result<PathBuf> {
        self.append_at(Utc::now(), document)
    }

    #[instrument(skip_all, fields(now = %now))]
    fn append_at(&self, now: DateTime<Utc>, document: &Value) -> Result<PathBuf> {
        let path = self.path(now.date_naive());
        let mut line = serde_json::to_string(document)?;
        line.push('\n');
        append_line(&path, &line).with_context(|| format!("failed to append to `{}`", path.display()))?;
        debug!(path = %path.display(), "captured");
        Ok(path)
    }
}

/// Write the whole line at once, so that concurrent appends do not interleave.
fn append_line(path: &Path, line: &str) -> Result {
    OpenOptions::new().create(true).append(true).open(path)?.write_all(line.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn new_requires_directory() -> Result {
        let directory = tempfile::tempdir()?;
        assert!(Capture::new(directory.path().join("missing")).is_err());
        assert!(Capture::new(directory.path().to_path_buf()).is_ok());
        Ok(())
    }

    #[test]
    fn append_ok() -> Result {
        let directory = tempfile::tempdir()?;
        let capture = Capture::new(directory.path().to_path_buf())?;
        let morning = Utc.with_ymd_and_hms(2024, 3, 14, 8, 5, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 3, 14, 23, 59, 59).unwrap();
        let next_day = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();

        let path = capture.append_at(morning, &json!({ "info": { "time": "03/14/2024 08:05:00" } }))?;
        assert_eq!(path, directory.path().join("2024-03-14.jsonl"));
        capture.append_at(evening, &json!({ "n": 2 }))?;
        let next_path = capture.append_at(next_day, &json!({ "n": 3 }))?;
        assert_eq!(next_path, directory.path().join("2024-03-15.jsonl"));

        assert_eq!(
            fs::read_to_string(&path)?,
            "{\"info\":{\"time\":\"03/14/2024 08:05:00\"}}\n{\"n\":2}\n",
        );
        assert_eq!(fs::read_to_string(&next_path)?, "{\"n\":3}\n");
        Ok(())
    }
}
