//! Reading the trailing window of a (possibly huge) log file.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::extract::{SESSION_MARKER, find_last_marker_offset};

/// How far back from the end of the log a session marker is searched for.
pub const TAIL_WINDOW_BYTES: u64 = 2 * 1024 * 1024;

/// Reads at most `max_bytes` from the end of `path`.
///
/// Returns the absolute offset the window starts at and its bytes.
pub fn read_tail(path: &Path, max_bytes: u64) -> std::io::Result<(u64, Vec<u8>)> {
    let mut file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    let start = size.saturating_sub(max_bytes);

    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::with_capacity((size - start) as usize);
    file.take(size - start).read_to_end(&mut buf)?;
    Ok((start, buf))
}

/// Absolute offset of the last session marker within the trailing window,
/// or the file size when no marker is found there.
pub fn session_start_offset(path: &Path) -> std::io::Result<u64> {
    let (start, bytes) = read_tail(path, TAIL_WINDOW_BYTES)?;
    Ok(start + find_last_marker_offset(&bytes, SESSION_MARKER) as u64)
}
