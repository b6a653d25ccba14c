//! Segment discovery and sequential reading
//!
//! Discovery reads every `.mdf` header in the data directory and requires
//! true containment of the requested timestamp; filename order only breaks
//! ties. Reading tolerates a torn trailing frame: the first decode failure
//! at the tail ends the stream instead of erroring.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use spine_protocol::{
    decode_frame, decode_header, Frame, IndexEntry, SegmentHeader, FRAME_HEADER_LEN,
    INDEX_ENTRY_LEN, SEGMENT_HEADER_LEN,
};

use crate::ReplayError;

/// Find the segment whose `[start_ts, end_ts]` contains `ts_ns`
pub fn find_segment_containing(dir: &Path, ts_ns: u64) -> Result<PathBuf, ReplayError> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|source| ReplayError::DataDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "mdf"))
        .collect();
    candidates.sort();

    for path in candidates {
        let header = match read_segment_header(&path) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable segment");
                continue;
            }
        };
        if header.contains(ts_ns) && path.with_extension("idx").exists() {
            return Ok(path);
        }
    }

    Err(ReplayError::NoSegment { ts_ns })
}

fn read_segment_header(path: &Path) -> Result<SegmentHeader, ReplayError> {
    let mut file = File::open(path).map_err(|source| ReplayError::open(path, source))?;
    let mut buf = [0u8; SEGMENT_HEADER_LEN];
    file.read_exact(&mut buf)
        .map_err(|source| ReplayError::open(path, source))?;
    SegmentHeader::from_bytes(&buf).map_err(|source| ReplayError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Sequential reader over one open segment
pub struct SegmentReader {
    data: BufReader<File>,
    header: SegmentHeader,
    index: Vec<IndexEntry>,
    path: PathBuf,
}

impl SegmentReader {
    /// Open the data file and load the sibling index into memory
    pub fn open(mdf_path: &Path) -> Result<Self, ReplayError> {
        let header = read_segment_header(mdf_path)?;

        let file = File::open(mdf_path).map_err(|source| ReplayError::open(mdf_path, source))?;
        let mut data = BufReader::with_capacity(64 * 1024, file);
        data.seek(SeekFrom::Start(SEGMENT_HEADER_LEN as u64))
            .map_err(|source| ReplayError::open(mdf_path, source))?;

        let idx_path = mdf_path.with_extension("idx");
        let idx_bytes =
            std::fs::read(&idx_path).map_err(|source| ReplayError::open(&idx_path, source))?;
        let mut index = Vec::with_capacity(idx_bytes.len() / INDEX_ENTRY_LEN);
        for chunk in idx_bytes.chunks_exact(INDEX_ENTRY_LEN) {
            let entry = IndexEntry::from_bytes(chunk).map_err(|source| ReplayError::Corrupt {
                path: idx_path.clone(),
                source,
            })?;
            index.push(entry);
        }

        Ok(Self {
            data,
            header,
            index,
            path: mdf_path.to_path_buf(),
        })
    }

    #[inline]
    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    #[inline]
    pub fn index_entries(&self) -> usize {
        self.index.len()
    }

    /// Position the cursor at the last index entry with `ts <= target`,
    /// or just past the segment header when no entry qualifies
    pub fn seek_to(&mut self, target_ts_ns: u64) -> Result<u64, ReplayError> {
        // partition_point returns the count of entries with ts <= target;
        // the entry before that boundary is the seek point. Runs of equal
        // timestamps are fine: we land on the last of the run, whose
        // offset still precedes every frame with ts > target.
        let boundary = self
            .index
            .partition_point(|entry| entry.first_ts_ns <= target_ts_ns);

        let offset = if boundary == 0 {
            SEGMENT_HEADER_LEN as u64
        } else {
            self.index[boundary - 1].file_offset
        };

        self.data
            .seek(SeekFrom::Start(offset))
            .map_err(|source| ReplayError::open(&self.path, source))?;
        Ok(offset)
    }

    /// Read the next frame, or `None` at end of data
    ///
    /// A short or corrupt tail ends the stream: crash-truncated segments
    /// replay up to their last complete frame.
    pub fn read_next(&mut self) -> Option<Frame> {
        let mut header_buf = [0u8; FRAME_HEADER_LEN];
        if let Err(e) = self.data.read_exact(&mut header_buf) {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                tracing::warn!(path = %self.path.display(), error = %e, "read failed");
            }
            return None;
        }

        let frame_header = match decode_header(&header_buf) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "malformed frame header, ending replay");
                return None;
            }
        };

        let total = FRAME_HEADER_LEN + frame_header.body_len as usize;
        let mut full = [0u8; FRAME_HEADER_LEN + 64];
        full[..FRAME_HEADER_LEN].copy_from_slice(&header_buf);
        if self
            .data
            .read_exact(&mut full[FRAME_HEADER_LEN..total])
            .is_err()
        {
            return None; // torn tail
        }

        match decode_frame(&full[..total]) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt frame, ending replay");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "reader_test.rs"]
mod tests;
