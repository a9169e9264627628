//! MJPEG (`multipart/x-mixed-replace`) streaming of a source's latest frame.

use anyhow::Result;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::frame::placeholder_jpeg;
use crate::registry::SourceEntry;

pub const BOUNDARY: &str = "frame";
pub const DEFAULT_STREAM_INTERVAL: Duration = Duration::from_millis(33);

/// Pull loop for one connected viewer.
///
/// Reads the source's publisher slot at its own cadence, independent of the
/// producer. Viewers are never synchronized with each other: one may see a
/// frame repeated, another may miss a short-lived one.
pub struct StreamGenerator {
    entry: Arc<SourceEntry>,
    placeholder: Arc<[u8]>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl StreamGenerator {
    pub fn new(entry: Arc<SourceEntry>, interval: Duration, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let placeholder = placeholder_jpeg(entry.id())?.into();
        Ok(Self {
            entry,
            placeholder,
            interval,
            shutdown,
        })
    }

    /// Latest published frame, or the "loading" placeholder.
    pub fn current_frame(&self) -> Arc<[u8]> {
        self.entry
            .frames()
            .read()
            .unwrap_or_else(|| self.placeholder.clone())
    }

    /// Emit chunks until a write fails or the server shuts down. Returns the
    /// number of complete chunks written.
    pub fn run<W: Write>(&self, out: &mut W) -> u64 {
        let mut sent = 0u64;
        while !self.shutdown.load(Ordering::SeqCst) {
            let frame = self.current_frame();
            if let Err(err) = write_chunk(out, &frame) {
                log::debug!(
                    "stream for source {} closed after {} chunks: {}",
                    self.entry.id(),
                    sent,
                    err
                );
                break;
            }
            sent += 1;
            if !self.interval.is_zero() {
                std::thread::sleep(self.interval);
            }
        }
        sent
    }
}

/// One multipart part: boundary, headers, JPEG bytes.
pub fn write_chunk<W: Write>(out: &mut W, jpeg: &[u8]) -> std::io::Result<()> {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    out.write_all(header.as_bytes())?;
    out.write_all(jpeg)?;
    out.write_all(b"\r\n")?;
    out.flush()
}
