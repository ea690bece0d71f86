use chrono::{DateTime, Duration, Utc};

/// One half-open sub-range `[start, end)` of a lookback window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateChunk {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Split `[start, end)` into sequential sub-ranges of at most `max_days`
/// days. The chunks tile the window exactly: no gap, no overlap, and the
/// last chunk ends precisely at `end`. Used for APIs whose per-call date
/// range is smaller than the full lookback window.
pub fn chunk_window(start: DateTime<Utc>, end: DateTime<Utc>, max_days: i64) -> Vec<DateChunk> {
    let mut chunks = Vec::new();
    if start >= end || max_days <= 0 {
        return chunks;
    }

    let max_span = Duration::days(max_days);
    let mut cursor = start;
    while cursor < end {
        let chunk_end = std::cmp::min(cursor + max_span, end);
        chunks.push(DateChunk {
            start: cursor,
            end: chunk_end,
        });
        cursor = chunk_end;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn window_180_days_with_90_day_limit_tiles_exactly() {
        let end = day(2026, 7, 1);
        let start = end - Duration::days(180);
        let chunks = chunk_window(start, end, 90);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].start, start);
        assert_eq!(chunks[0].end, start + Duration::days(90));
        assert_eq!(chunks[1].start, chunks[0].end);
        assert_eq!(chunks[1].end, end);
    }

    #[test]
    fn non_divisible_window_has_short_final_chunk() {
        let end = day(2026, 7, 1);
        let start = end - Duration::days(200);
        let chunks = chunk_window(start, end, 90);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].end - chunks[2].start, Duration::days(20));
        assert_eq!(chunks[2].end, end);
    }

    #[test]
    fn chunks_never_gap_or_overlap() {
        let end = day(2026, 3, 14);
        let start = end - Duration::days(365);
        let chunks = chunk_window(start, end, 28);

        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(chunks.first().unwrap().start, start);
        assert_eq!(chunks.last().unwrap().end, end);
    }

    #[test]
    fn window_smaller_than_limit_is_one_chunk() {
        let end = day(2026, 7, 1);
        let start = end - Duration::days(30);
        let chunks = chunk_window(start, end, 90);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], DateChunk { start, end });
    }

    #[test]
    fn empty_window_yields_no_chunks() {
        let end = day(2026, 7, 1);
        assert!(chunk_window(end, end, 90).is_empty());
        assert!(chunk_window(end, end - Duration::days(1), 90).is_empty());
    }
}
