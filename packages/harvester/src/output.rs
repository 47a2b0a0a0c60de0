//! Per-partition output destinations.
//!
//! Each partition gets one `;`-delimited CSV file: header first, then rows in
//! arrival order. Files are recreated, never appended to, when a partition
//! starts.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{NormalizedRow, Partition, OUTPUT_COLUMNS};

/// Append-only sink for normalized rows.
pub trait RowSink {
    /// Append one page of rows as a unit and push it to the destination.
    ///
    /// On error none of the page's rows have been accepted by the sink.
    fn append_page(&mut self, rows: &[NormalizedRow]) -> Result<()>;
}

/// Opens one fresh destination per partition.
pub trait Destinations {
    fn open(&self, partition: &Partition) -> Result<Box<dyn RowSink>>;
}

/// Serialize `rows` (and optionally the header) into one `;`-delimited buffer.
fn encode(header: bool, rows: &[NormalizedRow]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_writer(Vec::new());
    if header {
        writer.write_record(OUTPUT_COLUMNS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

/// CSV writer over any byte sink.
///
/// Every page is encoded in memory first and handed to the inner writer in
/// a single `write_all`, so a row that fails to encode never leaves the
/// rest of its page behind.
pub struct CsvSink<W: Write> {
    inner: W,
}

impl<W: Write> CsvSink<W> {
    /// Wrap `inner` and write the header row.
    pub fn new(mut inner: W) -> Result<Self> {
        inner.write_all(&encode(true, &[])?)?;
        inner.flush()?;
        Ok(Self { inner })
    }

    /// Return the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> RowSink for CsvSink<W> {
    fn append_page(&mut self, rows: &[NormalizedRow]) -> Result<()> {
        let page = encode(false, rows)?;
        self.inner.write_all(&page)?;
        self.inner.flush()?;
        Ok(())
    }
}

/// CSV files in one output directory.
#[derive(Debug, Clone)]
pub struct CsvDestinations {
    dir: PathBuf,
}

impl CsvDestinations {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, partition: &Partition) -> PathBuf {
        self.dir.join(partition.file_name())
    }
}

impl Destinations for CsvDestinations {
    fn open(&self, partition: &Partition) -> Result<Box<dyn RowSink>> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(partition);
        let file = File::create(&path)?;
        tracing::debug!(path = %path.display(), "opened partition output");
        Ok(Box::new(CsvSink::new(file)?))
    }
}
