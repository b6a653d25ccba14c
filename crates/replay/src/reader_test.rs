use spine_protocol::{Frame, TradeBody, SEGMENT_HEADER_LEN};
use spine_recorder::SegmentWriter;
use tempfile::TempDir;

use super::*;

const BASE_TS: u64 = 1_700_000_000_000_000_000;

fn trade(i: u64, gap_ns: u64) -> Frame {
    Frame::from(TradeBody {
        ts_ns: BASE_TS + i * gap_ns,
        symbol_id: 1,
        price: i as i64,
        size: 1,
        aggressor: 0,
        seq: i + 1,
    })
}

/// Write `count` trades `gap_ns` apart with the given index interval
fn write_segment(dir: &std::path::Path, count: u64, gap_ns: u64, index_interval: u32) {
    let mut writer = SegmentWriter::create(dir, BASE_TS).unwrap();
    for i in 0..count {
        let frame = trade(i, gap_ns);
        writer
            .append(&frame, frame.ts_ns().unwrap(), index_interval)
            .unwrap();
    }
    writer.finalize(1).unwrap();
}

fn only_mdf(dir: &std::path::Path) -> std::path::PathBuf {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|ext| ext == "mdf"))
        .unwrap()
}

#[test]
fn open_reads_header_and_index() {
    let dir = TempDir::new().unwrap();
    write_segment(dir.path(), 100, 1_000_000, 10);

    let reader = SegmentReader::open(&only_mdf(dir.path())).unwrap();
    assert_eq!(reader.header().frame_count, 100);
    assert_eq!(reader.header().start_ts_ns, BASE_TS);
    assert_eq!(reader.index_entries(), 10);
}

#[test]
fn read_next_returns_frames_in_file_order() {
    let dir = TempDir::new().unwrap();
    write_segment(dir.path(), 25, 1_000_000, 10);

    let mut reader = SegmentReader::open(&only_mdf(dir.path())).unwrap();
    for i in 0..25 {
        let frame = reader.read_next().expect("frame missing");
        assert_eq!(frame, trade(i, 1_000_000));
    }
    assert!(reader.read_next().is_none());
}

#[test]
fn seek_before_first_entry_lands_after_header() {
    let dir = TempDir::new().unwrap();
    write_segment(dir.path(), 100, 1_000_000, 10);

    let mut reader = SegmentReader::open(&only_mdf(dir.path())).unwrap();
    let offset = reader.seek_to(BASE_TS - 1).unwrap();
    assert_eq!(offset, SEGMENT_HEADER_LEN as u64);

    let first = reader.read_next().unwrap();
    assert_eq!(first, trade(0, 1_000_000));
}

#[test]
fn seek_lands_at_last_entry_not_after_target() {
    let dir = TempDir::new().unwrap();
    // Entries every 10 frames: frames 0, 10, 20, ...
    write_segment(dir.path(), 100, 1_000_000, 10);

    let mut reader = SegmentReader::open(&only_mdf(dir.path())).unwrap();

    // Target between entries 20 and 30: cursor lands on frame 20
    reader.seek_to(BASE_TS + 25 * 1_000_000).unwrap();
    assert_eq!(reader.read_next().unwrap(), trade(20, 1_000_000));

    // Target exactly on an entry
    reader.seek_to(BASE_TS + 30 * 1_000_000).unwrap();
    assert_eq!(reader.read_next().unwrap(), trade(30, 1_000_000));

    // Target past the end lands on the last entry
    reader.seek_to(u64::MAX).unwrap();
    assert_eq!(reader.read_next().unwrap(), trade(90, 1_000_000));
}

#[test]
fn torn_tail_ends_the_stream() {
    let dir = TempDir::new().unwrap();
    write_segment(dir.path(), 5, 1_000_000, 10);

    let path = only_mdf(dir.path());
    let mut data = std::fs::read(&path).unwrap();
    data.truncate(data.len() - 7);
    std::fs::write(&path, &data).unwrap();

    let mut reader = SegmentReader::open(&path).unwrap();
    let mut frames = 0;
    while reader.read_next().is_some() {
        frames += 1;
    }
    assert_eq!(frames, 4);
}

#[test]
fn discovery_requires_true_containment() {
    let dir = TempDir::new().unwrap();
    write_segment(dir.path(), 100, 1_000_000, 10);
    let end_ts = BASE_TS + 99 * 1_000_000;

    // Inside the range
    assert!(find_segment_containing(dir.path(), BASE_TS).is_ok());
    assert!(find_segment_containing(dir.path(), BASE_TS + 50 * 1_000_000).is_ok());
    assert!(find_segment_containing(dir.path(), end_ts).is_ok());

    // Outside: before start and after end
    assert!(matches!(
        find_segment_containing(dir.path(), BASE_TS - 1),
        Err(ReplayError::NoSegment { .. })
    ));
    assert!(matches!(
        find_segment_containing(dir.path(), end_ts + 1),
        Err(ReplayError::NoSegment { .. })
    ));
}

#[test]
fn discovery_skips_segments_without_index() {
    let dir = TempDir::new().unwrap();
    write_segment(dir.path(), 10, 1_000_000, 10);

    let mdf = only_mdf(dir.path());
    std::fs::remove_file(mdf.with_extension("idx")).unwrap();

    assert!(matches!(
        find_segment_containing(dir.path(), BASE_TS),
        Err(ReplayError::NoSegment { .. })
    ));
}

#[test]
fn discovery_on_missing_dir_is_an_error() {
    let result = find_segment_containing(std::path::Path::new("/no/such/dir"), 0);
    assert!(matches!(result, Err(ReplayError::DataDir { .. })));
}
