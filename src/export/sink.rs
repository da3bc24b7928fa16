use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// Destination for one table.
///
/// `close` must be called on every path, including after a failed write.
pub trait TabularSink {
    fn write_header(&mut self, columns: &[&str]) -> Result<()>;
    fn write_row(&mut self, fields: &[String]) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// RFC 4180 CSV file.
pub struct CsvSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl CsvSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .with_context(|| format!("{} is already closed", self.path.display()))?;
        let line = fields
            .iter()
            .map(|field| escape_field(field.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        write!(writer, "{line}\r\n")
            .with_context(|| format!("failed to write to {}", self.path.display()))
    }
}

impl TabularSink for CsvSink {
    fn write_header(&mut self, columns: &[&str]) -> Result<()> {
        self.write_record(columns)
    }

    fn write_row(&mut self, fields: &[String]) -> Result<()> {
        self.write_record(fields)
    }

    fn close(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer
                .flush()
                .with_context(|| format!("failed to flush {}", self.path.display())),
            None => Ok(()),
        }
    }
}

/// Quotes a field when it contains a delimiter, a quote or a line break.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn escapes_only_when_needed() {
        assert_eq!(escape_field("walking"), "walking");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
        assert_eq!(escape_field(""), "");
    }

    #[test]
    fn writes_crlf_records_and_closes_twice() {
        let dir = std::env::temp_dir().join(format!("hermes-sink-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("table.csv");

        let mut sink = CsvSink::create(&path).unwrap();
        sink.write_header(&["date", "note"]).unwrap();
        sink.write_row(&["2018-10-23T12:00:00Z".into(), "home, sweet".into()])
            .unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(sink.write_row(&["late".into()]).is_err());

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "date,note\r\n2018-10-23T12:00:00Z,\"home, sweet\"\r\n"
        );
        fs::remove_dir_all(dir).ok();
    }
}
