//! Partition writer with optional streaming LZ4 compression.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lz4_flex::frame::FrameEncoder;

use crate::common::{trace, ErrorKind, Result};
use crate::core::entry::DumpEntry;
use crate::core::lock::StripedLock;
use crate::core::record;
use crate::error::IoContext;

const WRITE_BUFFER_BYTES: usize = 64 * 1024;

enum WriterInner {
    Compressed {
        encoder: FrameEncoder<BufWriter<File>>,
    },
    Uncompressed {
        writer: BufWriter<File>,
    },
}

impl WriterInner {
    fn as_write(&mut self) -> &mut dyn Write {
        match self {
            WriterInner::Compressed { encoder } => encoder,
            WriterInner::Uncompressed { writer } => writer,
        }
    }

    fn finish(self) -> io::Result<()> {
        let mut writer = match self {
            WriterInner::Compressed { encoder } => encoder.finish().map_err(io::Error::from)?,
            WriterInner::Uncompressed { writer } => writer,
        };
        writer.flush()?;
        writer.get_ref().sync_all()
    }
}

/// Counters of a closed partition artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub entries: u64,
    // Encoded bytes before compression.
    pub record_bytes: u64,
}

/// Single owner of one partition artifact.
///
/// The file is created on the first append, a partition without rows leaves no artifact.
pub struct PartitionWriter {
    path: PathBuf,
    compress: bool,
    locks: Arc<StripedLock>,
    inner: Option<WriterInner>,
    // Reused encode buffer.
    buf: Vec<u8>,
    stats: WriterStats,
    closed: bool,
}

impl PartitionWriter {
    pub fn open(path: impl Into<PathBuf>, compress: bool, locks: Arc<StripedLock>) -> Self {
        Self {
            path: path.into(),
            compress,
            locks,
            inner: None,
            buf: Vec::new(),
            stats: WriterStats::default(),
            closed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    pub fn append(&mut self, entry: &DumpEntry) -> Result<()> {
        if self.closed {
            return Err(ErrorKind::Internal(format!(
                "append to closed writer {}",
                self.path.display()
            ))
            .into());
        }

        self.buf.clear();
        let n = record::encode_to(entry, &mut self.buf)?;

        if self.inner.is_none() {
            self.inner = Some(self.create()?);
        }
        let path = &self.path;
        if let Some(inner) = self.inner.as_mut() {
            inner.as_write().write_all(&self.buf).with_path(path)?;
        }

        self.stats.entries += 1;
        self.stats.record_bytes += n as u64;

        Ok(())
    }

    /// Flush and close the artifact. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<WriterStats> {
        if self.closed {
            return Ok(self.stats);
        }
        self.closed = true;

        if let Some(inner) = self.inner.take() {
            inner.finish().with_path(&self.path)?;
            trace!(
                "Closed {} entries={} bytes={}",
                self.path.display(),
                self.stats.entries,
                self.stats.record_bytes
            );
        }

        Ok(self.stats)
    }

    /// Drop whatever was written so far.
    pub fn discard(&mut self) -> Result<()> {
        self.closed = true;
        let created = self.inner.take().is_some();

        if created {
            let _guard = self.locks.lock(&self.path);
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(crate::Error::io_path(&self.path, err)),
            }
        }
        Ok(())
    }

    fn create(&self) -> Result<WriterInner> {
        let _guard = self.locks.lock(&self.path);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .with_path(&self.path)?;
        let writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);

        Ok(if self.compress {
            WriterInner::Compressed {
                encoder: FrameEncoder::new(writer),
            }
        } else {
            WriterInner::Uncompressed { writer }
        })
    }
}
