//! Bounded reads of the start and end of a large append-only file.

use std::io;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Bytes read from the start of a transcript.
pub const HEAD_BYTES: u64 = 64 * 1024;
/// Bytes read from the end of a transcript.
pub const TAIL_BYTES: u64 = 128 * 1024;

/// The byte windows read from a file.
#[derive(Debug)]
pub enum Windows {
    /// The file fit in the combined budget and was read once.
    Whole(Vec<u8>),
    /// Disjoint prefix and suffix of a larger file.
    Split { head: Vec<u8>, tail: Vec<u8> },
}

impl Windows {
    /// Complete lines of the prefix, oldest first.
    pub fn head_lines(&self) -> Vec<&str> {
        match self {
            Windows::Whole(buf) => split_lines(buf),
            Windows::Split { head, .. } => split_lines(drop_trailing_partial(head)),
        }
    }

    /// Complete lines of the suffix, oldest first.
    pub fn tail_lines(&self) -> Vec<&str> {
        match self {
            Windows::Whole(buf) => split_lines(buf),
            Windows::Split { tail, .. } => split_lines(drop_leading_partial(tail)),
        }
    }
}

/// Read at most `head_bytes` from the start and `tail_bytes` from the end.
///
/// Files no larger than the combined budget are read once, so a record can
/// never show up in both windows as two different fragments.
pub async fn read_windows(
    path: &Path,
    size: u64,
    head_bytes: u64,
    tail_bytes: u64,
) -> io::Result<Windows> {
    let mut file = tokio::fs::File::open(path).await?;

    if size <= head_bytes + tail_bytes {
        let mut buf = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buf).await?;
        return Ok(Windows::Whole(buf));
    }

    let head = read_exact_at(&mut file, 0, head_bytes).await?;
    let tail = read_exact_at(&mut file, size - tail_bytes, tail_bytes).await?;
    Ok(Windows::Split { head, tail })
}

async fn read_exact_at(file: &mut tokio::fs::File, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    file.seek(io::SeekFrom::Start(offset)).await?;
    let mut buf = Vec::with_capacity(len as usize);
    // `take` tolerates a file truncated between stat and read.
    file.take(len).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Everything up to and including the last newline.
fn drop_trailing_partial(buf: &[u8]) -> &[u8] {
    match buf.iter().rposition(|&b| b == b'\n') {
        Some(idx) => &buf[..=idx],
        None => &[],
    }
}

/// Everything after the first newline.
fn drop_leading_partial(buf: &[u8]) -> &[u8] {
    match buf.iter().position(|&b| b == b'\n') {
        Some(idx) => &buf[idx + 1..],
        None => &[],
    }
}

/// Non-empty lines; lines that are not valid UTF-8 are skipped.
fn split_lines(buf: &[u8]) -> Vec<&str> {
    buf.split(|&b| b == b'\n')
        .filter_map(|line| std::str::from_utf8(line).ok())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    async fn windows_for(content: &[u8], head: u64, tail: u64) -> Windows {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        let size = content.len() as u64;
        read_windows(f.path(), size, head, tail).await.unwrap()
    }

    #[tokio::test]
    async fn small_file_read_whole() {
        let w = windows_for(b"one\ntwo\nthree", 64, 64).await;
        assert!(matches!(w, Windows::Whole(_)));
        assert_eq!(w.head_lines(), vec!["one", "two", "three"]);
        assert_eq!(w.tail_lines(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn split_drops_partial_lines() {
        // 10 lines of 6 bytes each ("line0\n").
        let content: String = (0..10).map(|i| format!("line{}\n", i)).collect();
        let w = windows_for(content.as_bytes(), 15, 15).await;
        assert!(matches!(w, Windows::Split { .. }));
        // Head: "line0\nline1\nlin" -> partial "lin" dropped.
        assert_eq!(w.head_lines(), vec!["line0", "line1"]);
        // Tail: "e7\nline8\nline9\n" -> leading "e7" dropped.
        assert_eq!(w.tail_lines(), vec!["line8", "line9"]);
    }

    #[tokio::test]
    async fn single_huge_line_yields_nothing_in_split_mode() {
        let content = "x".repeat(1000);
        let w = windows_for(content.as_bytes(), 100, 100).await;
        assert!(w.head_lines().is_empty());
        assert!(w.tail_lines().is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_line_skipped() {
        let w = windows_for(b"ok\n\xff\xfe\nfine\n", 64, 64).await;
        assert_eq!(w.head_lines(), vec!["ok", "fine"]);
    }

    #[tokio::test]
    async fn missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_windows(&dir.path().join("nope"), 10, 4, 4).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn large_file_reads_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.jsonl");
        let line = format!("{{\"type\":\"assistant\",\"content\":\"{}\"}}\n", "x".repeat(200));
        let content = line.repeat(50_000);
        tokio::fs::write(&path, &content).await.unwrap();

        let w = read_windows(&path, content.len() as u64, HEAD_BYTES, TAIL_BYTES)
            .await
            .unwrap();
        match &w {
            Windows::Split { head, tail } => {
                assert_eq!(head.len() as u64, HEAD_BYTES);
                assert_eq!(tail.len() as u64, TAIL_BYTES);
            }
            Windows::Whole(_) => panic!("expected split windows"),
        }
        assert!(!w.tail_lines().is_empty());
    }
}
