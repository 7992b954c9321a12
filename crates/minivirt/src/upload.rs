//! Streaming ISO uploads into the ISO pool.
//!
//! The byte source is spooled to a temp file in bounded chunks (so sources
//! larger than available memory are fine), verified against the declared
//! size, and then handed to the endpoint's volume transfer stream
//! (`virsh vol-upload`), which finalizes exactly once. A failed transfer
//! surfaces [`Error::Transfer`] and leaves the partially written volume for
//! the caller to clean up.

use std::ffi::OsStr;
use std::io::{Read, Write};
use std::time::Duration;

use tracing::{debug, info};

use crate::connection::{stderr_text, Connection};
use crate::error::{Error, Result};
use crate::pool::{self, Volume};

/// Spool copy buffer size.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Wall-clock bound on the vol-upload round-trip.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Create a volume of exactly `size_bytes` in the ISO pool and stream
/// `source` into it.
///
/// `filename` is used verbatim as the volume name. The stream must deliver
/// exactly the declared number of bytes; short or long sources fail with
/// [`Error::Transfer`] before any upload round-trip happens.
pub fn upload(
    conn: &Connection,
    filename: &str,
    size_bytes: u64,
    source: impl Read,
) -> Result<Volume> {
    let volume = pool::create_volume_raw(conn, pool::ISO_POOL, filename, size_bytes)?;

    let transfer_err = |message: String| Error::Transfer {
        name: filename.to_string(),
        message,
    };

    let mut spool = tempfile::NamedTempFile::new()?;
    let copied =
        spool_exact(source, spool.as_file_mut(), size_bytes).map_err(|m| transfer_err(m))?;
    debug!(filename, bytes = copied, "spooled upload source");

    let output = conn.output_with_timeout(
        [
            OsStr::new("vol-upload"),
            OsStr::new(&volume.name),
            spool.path().as_os_str(),
            OsStr::new("--pool"),
            OsStr::new(pool::ISO_POOL),
        ],
        UPLOAD_TIMEOUT,
    )?;
    if !output.status.success() {
        return Err(transfer_err(stderr_text(&output)));
    }

    info!(filename, bytes = size_bytes, path = %volume.path, "uploaded iso");
    Ok(volume)
}

/// Copy `source` into `dest` in bounded chunks, requiring exactly
/// `expected` bytes. Returns the byte count on success, an error message
/// on size mismatch or I/O failure.
fn spool_exact(
    mut source: impl Read,
    dest: &mut impl Write,
    expected: u64,
) -> std::result::Result<u64, String> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied: u64 = 0;
    loop {
        let n = source.read(&mut buf).map_err(|e| e.to_string())?;
        if n == 0 {
            break;
        }
        copied += n as u64;
        if copied > expected {
            return Err(format!(
                "stream longer than the declared {} bytes",
                expected
            ));
        }
        dest.write_all(&buf[..n]).map_err(|e| e.to_string())?;
    }
    dest.flush().map_err(|e| e.to_string())?;
    if copied != expected {
        return Err(format!(
            "stream ended after {} of {} declared bytes",
            copied, expected
        ));
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn spool_copies_exactly_the_declared_size() {
        let data = vec![7u8; 3 * CHUNK_SIZE + 17];
        let mut dest = Vec::new();
        let copied = spool_exact(Cursor::new(&data), &mut dest, data.len() as u64).unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(dest, data);
    }

    #[test]
    fn short_stream_is_rejected() {
        let data = vec![0u8; 100];
        let mut dest = Vec::new();
        let err = spool_exact(Cursor::new(&data), &mut dest, 200).unwrap_err();
        assert!(err.contains("ended after 100 of 200"));
    }

    #[test]
    fn long_stream_is_rejected() {
        let data = vec![0u8; 300];
        let mut dest = Vec::new();
        let err = spool_exact(Cursor::new(&data), &mut dest, 200).unwrap_err();
        assert!(err.contains("longer than the declared"));
    }

    #[test]
    fn empty_stream_with_zero_size_is_fine() {
        let mut dest = Vec::new();
        assert_eq!(spool_exact(Cursor::new(&[]), &mut dest, 0).unwrap(), 0);
    }
}
