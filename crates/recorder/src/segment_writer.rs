//! Segment file mechanics
//!
//! Owns the open `.mdf`/`.idx` pair for one segment: appends encoded
//! frames, emits sparse index entries, rewrites the data header in place,
//! and flushes both files through to the OS.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use spine_protocol::{
    encode_frame, encoded_len, Frame, IndexEntry, SegmentHeader, SEGMENT_HEADER_LEN,
};

use crate::RecorderError;

/// One open segment (data + index)
pub struct SegmentWriter {
    data: BufWriter<File>,
    index: BufWriter<File>,
    data_path: PathBuf,
    index_path: PathBuf,
    header: SegmentHeader,
    /// Total data-file bytes including the 32-byte header
    bytes_written: u64,
    frames_since_index: u32,
    index_entries: u64,
    encode_buf: BytesMut,
}

impl SegmentWriter {
    /// Create the `md_YYYYMMDD_HHMMSS.mdf`/`.idx` pair for a segment whose
    /// first frame is stamped `start_ts_ns`
    ///
    /// The caller must supply monotonically advancing time: an existing
    /// file with the same name is an error, never silently reused.
    pub fn create(dir: &Path, start_ts_ns: u64) -> Result<Self, RecorderError> {
        let stamp = format_stamp(start_ts_ns)?;
        let data_path = dir.join(format!("md_{stamp}.mdf"));
        let index_path = dir.join(format!("md_{stamp}.idx"));

        if data_path.exists() || index_path.exists() {
            return Err(RecorderError::SegmentExists { path: data_path });
        }

        let data_file = open_new(&data_path)?;
        let index_file = open_new(&index_path)?;

        let header = SegmentHeader::new(start_ts_ns);
        let mut data = BufWriter::with_capacity(64 * 1024, data_file);
        data.write_all(&header.to_bytes())
            .map_err(|source| RecorderError::write(&data_path, source))?;

        tracing::info!(path = %data_path.display(), "opened segment");

        Ok(Self {
            data,
            index: BufWriter::with_capacity(16 * 1024, index_file),
            data_path,
            index_path,
            header,
            bytes_written: SEGMENT_HEADER_LEN as u64,
            frames_since_index: 0,
            index_entries: 0,
            encode_buf: BytesMut::with_capacity(128),
        })
    }

    /// Append one frame, emitting an index entry at interval boundaries
    ///
    /// The index entry records the to-be-appended frame's timestamp and the
    /// byte offset *before* the append, so the first entry of a segment
    /// points just past the header.
    pub fn append(
        &mut self,
        frame: &Frame,
        ts_ns: u64,
        index_interval: u32,
    ) -> Result<u64, RecorderError> {
        if self.frames_since_index == 0 {
            let entry = IndexEntry {
                first_ts_ns: ts_ns,
                file_offset: self.bytes_written,
            };
            self.index
                .write_all(&entry.to_bytes())
                .map_err(|source| RecorderError::write(&self.index_path, source))?;
            self.index_entries += 1;
        }

        self.encode_buf.clear();
        encode_frame(frame, &mut self.encode_buf);
        self.data
            .write_all(&self.encode_buf)
            .map_err(|source| RecorderError::write(&self.data_path, source))?;

        let appended = self.encode_buf.len() as u64;
        self.bytes_written += appended;
        self.header.frame_count += 1;
        self.header.end_ts_ns = ts_ns;

        self.frames_since_index += 1;
        if self.frames_since_index >= index_interval.max(1) {
            self.frames_since_index = 0;
        }

        Ok(appended)
    }

    /// True if appending `additional` bytes would push past `roll_bytes`
    #[inline]
    pub fn would_exceed(&self, additional: u64, roll_bytes: u64) -> bool {
        self.bytes_written + additional > roll_bytes
    }

    /// Encoded size the next append of `frame` would add
    #[inline]
    pub fn appended_len(frame: &Frame) -> u64 {
        encoded_len(frame) as u64
    }

    /// Rewrite the data header in place with current counts
    pub fn update_header(&mut self, symbol_count: u32) -> Result<(), RecorderError> {
        self.header.symbol_count = symbol_count;

        // BufWriter flushes on seek, keeping the rewrite ordered after all
        // appended frames
        self.data
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.data.write_all(&self.header.to_bytes()))
            .and_then(|_| self.data.seek(SeekFrom::Start(self.bytes_written)).map(|_| ()))
            .map_err(|source| RecorderError::write(&self.data_path, source))?;
        Ok(())
    }

    /// Flush buffers and sync both files to disk
    pub fn sync(&mut self) -> Result<(), RecorderError> {
        self.data
            .flush()
            .and_then(|_| self.data.get_ref().sync_data())
            .map_err(|source| RecorderError::write(&self.data_path, source))?;
        self.index
            .flush()
            .and_then(|_| self.index.get_ref().sync_data())
            .map_err(|source| RecorderError::write(&self.index_path, source))?;
        Ok(())
    }

    /// Final header rewrite + sync; consumes the writer
    pub fn finalize(mut self, symbol_count: u32) -> Result<(), RecorderError> {
        self.update_header(symbol_count)?;
        self.sync()?;
        tracing::info!(
            path = %self.data_path.display(),
            frames = self.header.frame_count,
            bytes = self.bytes_written,
            index_entries = self.index_entries,
            "closed segment"
        );
        Ok(())
    }

    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }

    #[inline]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

fn open_new(path: &Path) -> Result<File, RecorderError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| RecorderError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// `YYYYMMDD_HHMMSS` in UTC from epoch nanoseconds
fn format_stamp(ts_ns: u64) -> Result<String, RecorderError> {
    let secs = (ts_ns / 1_000_000_000) as i64;
    let datetime: DateTime<Utc> = DateTime::from_timestamp(secs, 0)
        .ok_or(RecorderError::BadTimestamp { ts_ns })?;
    Ok(datetime.format("%Y%m%d_%H%M%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_formats_utc() {
        // 2021-01-01T00:00:00Z
        let stamp = format_stamp(1_609_459_200_000_000_000).unwrap();
        assert_eq!(stamp, "20210101_000000");
    }

    #[test]
    fn absurd_timestamp_is_an_error() {
        assert!(format_stamp(u64::MAX).is_err());
    }
}
