use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use tm_kernel::TileStrategy;

use crate::error::Result;

pub const HEADER: &str = "method,tile,repetition,duration_ms";

/// One timed invocation of the kernel binary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    pub method: TileStrategy,
    pub tile: usize,
    /// 1-based repetition index within the (method, tile) cell.
    pub repetition: usize,
    pub duration: Duration,
}

impl Record {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1e3
    }
}

/// Appends records to a CSV file as they arrive, so an interrupted sweep
/// keeps what it measured.
pub struct RecordWriter<W: Write> {
    out: W,
}

impl RecordWriter<BufWriter<File>> {
    /// Create (or truncate) `path` and write the header.
    pub fn create(path: &Path) -> Result<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> RecordWriter<W> {
    pub fn new(mut out: W) -> Result<Self> {
        writeln!(out, "{HEADER}")?;
        Ok(Self { out })
    }

    pub fn write(&mut self, record: &Record) -> Result<()> {
        writeln!(
            self.out,
            "{},{},{},{:.3}",
            record.method,
            record.tile,
            record.repetition,
            record.duration_ms()
        )?;
        self.out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}
