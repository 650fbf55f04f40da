// vharness - HDL Simulation Test Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// Default cap on one unit's captured runner output (16 MiB).
pub const DEFAULT_MAX_LOG_BYTES: u64 = 16 * 1024 * 1024;

/// Runner output sink that stops recording once `max_bytes` is reached.
///
/// Writes past the cap are accepted and discarded so the child's pipes keep
/// draining. [`CappedLog::finish`] appends a truncation marker.
pub struct CappedLog<W: Write> {
    inner: W,
    bytes_written: u64,
    bytes_dropped: u64,
    max_bytes: u64,
}

impl<W: Write> CappedLog<W> {
    pub fn new(inner: W, max_bytes: u64) -> Self {
        Self {
            inner,
            bytes_written: 0,
            bytes_dropped: 0,
            max_bytes,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn truncated(&self) -> bool {
        self.bytes_dropped > 0
    }

    /// Flush and note how much output was discarded.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.truncated() {
            writeln!(
                self.inner,
                "\n[vharness] log truncated at {} bytes, {} bytes dropped",
                self.max_bytes, self.bytes_dropped
            )?;
        }
        self.inner.flush()
    }
}

impl<W: Write> Write for CappedLog<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let remaining = self.max_bytes.saturating_sub(self.bytes_written);
        let to_write = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if to_write > 0 {
            self.inner.write_all(&buf[..to_write])?;
            self.bytes_written += to_write as u64;
        }
        self.bytes_dropped += (buf.len() - to_write) as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Copy `reader` into the shared log until EOF.
///
/// stdout and stderr pumps share one log, so chunks interleave in arrival order.
pub fn pump<R: Read, W: Write>(mut reader: R, log: &Arc<Mutex<CappedLog<W>>>) -> io::Result<u64> {
    let mut buf = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        total += n as u64;
        let mut guard = log
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log capture poisoned"))?;
        guard.write_all(&buf[..n])?;
    }
}
