use std::io::{self, Read};

/// Bytes between two progress callbacks.
const REPORT_EVERY: u64 = 64 * 1024;

/// Counts bytes as they are read and reports every [`REPORT_EVERY`] bytes
/// and once more at end of stream.
pub struct ProgressReader<R, F> {
    inner: R,
    read: u64,
    last_reported: u64,
    on_progress: F,
}

impl<R: Read, F: FnMut(u64)> ProgressReader<R, F> {
    pub fn new(inner: R, on_progress: F) -> Self {
        Self {
            inner,
            read: 0,
            last_reported: 0,
            on_progress,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }
}

impl<R: Read, F: FnMut(u64)> Read for ProgressReader<R, F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if (n == 0 && self.read != self.last_reported)
            || self.read - self.last_reported >= REPORT_EVERY
        {
            self.last_reported = self.read;
            (self.on_progress)(self.read);
        }
        Ok(n)
    }
}
