//! `Sink` — the durable NDJSON output pipeline.
//!
//! Buffers writes at 64 KiB, flushes at page boundaries so a checkpoint
//! is never saved ahead of the data it describes, and only fsyncs at
//! FINALIZING — never for `-` (standard output has nothing to sync).

use crate::engine::model::PullRecord;
use crate::errors::{RelayError, Result};
use std::fs::File;
use std::io::{BufWriter, Stdout, Write};
use std::path::{Path, PathBuf};

const BUFFER_CAPACITY: usize = 64 * 1024;

enum Destination {
    Stdout(BufWriter<Stdout>),
    File { writer: BufWriter<File>, path: PathBuf },
}

/// Writes one JSON object per line, buffered, with explicit flush/fsync
/// control so the caller can align durability with checkpoint commits.
pub struct Sink {
    destination: Destination,
}

impl Sink {
    /// `"-"` selects standard output; anything else is treated as a file
    /// path. Fails fatally, before any request is issued, on permission
    /// denied, the path naming a directory, or a missing parent directory.
    pub fn open(output: &str) -> Result<Self> {
        if output == "-" {
            return Ok(Self {
                destination: Destination::Stdout(BufWriter::with_capacity(
                    BUFFER_CAPACITY,
                    std::io::stdout(),
                )),
            });
        }

        let path = PathBuf::from(output);
        preflight_check(&path)?;

        let file = File::create(&path).map_err(|e| RelayError::filesystem(e, path.clone()))?;
        Ok(Self {
            destination: Destination::File {
                writer: BufWriter::with_capacity(BUFFER_CAPACITY, file),
                path,
            },
        })
    }

    /// Append one record as a single NDJSON line. Consumes the record,
    /// mirroring `PullRecord::into_value`.
    pub fn write_record(&mut self, record: PullRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&record.into_value())?;
        line.push(b'\n');
        self.write_raw(&line)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.destination {
            Destination::Stdout(w) => w
                .write_all(bytes)
                .map_err(|e| RelayError::filesystem(e, PathBuf::from("-"))),
            Destination::File { writer, path } => writer
                .write_all(bytes)
                .map_err(|e| RelayError::filesystem(e, path.clone())),
        }
    }

    /// Flush the buffer to the OS. Called at every page boundary so a
    /// checkpoint save never claims data the sink hasn't handed off.
    pub fn flush(&mut self) -> Result<()> {
        match &mut self.destination {
            Destination::Stdout(w) => {
                w.flush().map_err(|e| RelayError::filesystem(e, PathBuf::from("-")))
            }
            Destination::File { writer, path } => writer
                .flush()
                .map_err(|e| RelayError::filesystem(e, path.clone())),
        }
    }

    /// Flush and fsync. A no-op fsync for standard output.
    pub fn finalize(&mut self) -> Result<()> {
        self.flush()?;
        if let Destination::File { writer, path } = &mut self.destination {
            writer
                .get_ref()
                .sync_all()
                .map_err(|e| RelayError::filesystem(e, path.clone()))?;
        }
        Ok(())
    }
}

fn preflight_check(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Err(RelayError::filesystem(
            std::io::Error::new(std::io::ErrorKind::Other, "output path is a directory"),
            path.to_path_buf(),
        ));
    }
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        if !parent.exists() {
            return Err(RelayError::filesystem(
                std::io::Error::new(std::io::ErrorKind::NotFound, "parent directory missing"),
                path.to_path_buf(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> PullRecord {
        PullRecord::from_node(json!({
            "number": 1,
            "title": "t",
            "state": "OPEN",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z",
            "url": "https://example.com/1",
        }))
        .unwrap()
    }

    #[test]
    fn writes_ndjson_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let mut sink = Sink::open(path.to_str().unwrap()).unwrap();
        sink.write_record(sample_record()).unwrap();
        sink.write_record(sample_record()).unwrap();
        sink.finalize().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let _: serde_json::Value = serde_json::from_str(line).unwrap();
        }
    }

    #[test]
    fn rejects_missing_parent_directory() {
        let path = "/no/such/parent/dir/out.ndjson";
        assert!(Sink::open(path).is_err());
    }

    #[test]
    fn rejects_directory_as_output() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Sink::open(dir.path().to_str().unwrap()).is_err());
    }
}
