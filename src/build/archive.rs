//! Gzipped tar of a source tree for remote builds.
//!
//! A producer thread walks and compresses the tree into bounded chunks; the
//! caller's thread writes them out and reports progress, so memory stays
//! bounded regardless of tree size.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ForgeError, Result};

const CHUNK_SIZE: usize = 4 * 1024 * 1024;
const CHANNEL_DEPTH: usize = 4;

/// Write a gzipped tar of `source_dir` to `dest`, excluding a top-level
/// `.git`. `on_progress` receives the running compressed byte count.
pub fn write_source_archive(
    source_dir: &Path,
    dest: &Path,
    on_progress: impl FnMut(u64),
) -> Result<u64> {
    write_archive_chunked(source_dir, dest, CHUNK_SIZE, on_progress)
}

fn write_archive_chunked(
    source_dir: &Path,
    dest: &Path,
    chunk_size: usize,
    mut on_progress: impl FnMut(u64),
) -> Result<u64> {
    let (tx, rx) = bounded::<Vec<u8>>(CHANNEL_DEPTH);
    let mut out = BufWriter::new(File::create(dest)?);

    std::thread::scope(|scope| -> Result<u64> {
        let producer = scope.spawn(move || build_archive(source_dir, ChunkWriter::new(tx, chunk_size)));

        let mut total = 0u64;
        let mut write_result = Ok(());
        for chunk in &rx {
            if let Err(err) = out.write_all(&chunk) {
                write_result = Err(err);
                break;
            }
            total += chunk.len() as u64;
            on_progress(total);
        }
        // Unblocks the producer if we stopped early.
        drop(rx);

        let produced = producer
            .join()
            .map_err(|_| ForgeError::Archive("archive producer panicked".to_string()))?;
        write_result?;
        produced?;
        out.flush()?;
        debug!(bytes = total, "wrote source archive");
        Ok(total)
    })
}

fn build_archive(source_dir: &Path, sink: ChunkWriter) -> Result<()> {
    let encoder = GzEncoder::new(sink, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let walker = WalkDir::new(source_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(entry.depth() == 1 && entry.file_name() == ".git"));

    for entry in walker {
        let entry = entry.map_err(|e| ForgeError::Archive(e.to_string()))?;
        if entry.depth() == 0 {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| ForgeError::Archive(e.to_string()))?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder.append_dir(rel, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), rel)?;
        }
    }

    let encoder = builder.into_inner()?;
    let mut sink = encoder.finish()?;
    sink.flush()?;
    Ok(())
}

/// Buffers compressed output and hands it over in chunks.
struct ChunkWriter {
    tx: Sender<Vec<u8>>,
    buf: Vec<u8>,
    chunk_size: usize,
}

impl ChunkWriter {
    fn new(tx: Sender<Vec<u8>>, chunk_size: usize) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    fn send(&mut self) -> io::Result<()> {
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(self.chunk_size));
        self.tx
            .send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive writer stopped"))
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= self.chunk_size {
            self.send()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            self.send()
        }
    }
}

/// Rate limit for progress redraws.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    started: Instant,
    grace: Duration,
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    #[must_use]
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            grace: Duration::from_secs(1),
            interval: Duration::from_millis(250),
            last: None,
        }
    }

    /// Nothing during the grace period, then at most once per interval.
    pub fn ready(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.started) <= self.grace {
            return false;
        }
        let due = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) > self.interval);
        if due {
            self.last = Some(now);
        }
        due
    }
}

/// Console feedback while the archive is written.
///
/// Interactive output redraws one line with the compressed size so far;
/// otherwise a single line is printed once the grace period passes.
pub struct CompressionStatus<W: Write> {
    out: W,
    interactive: bool,
    label: String,
    throttle: ProgressThrottle,
    shown: bool,
}

impl<W: Write> CompressionStatus<W> {
    pub fn new(out: W, interactive: bool, label: impl Into<String>, started: Instant) -> Self {
        Self {
            out,
            interactive,
            label: label.into(),
            throttle: ProgressThrottle::new(started),
            shown: false,
        }
    }

    pub fn observe(&mut self, total_bytes: u64) {
        self.observe_at(total_bytes, Instant::now());
    }

    pub fn observe_at(&mut self, total_bytes: u64, now: Instant) {
        if !self.interactive && self.shown {
            return;
        }
        if !self.throttle.ready(now) {
            return;
        }
        let _ = if self.interactive {
            write!(
                self.out,
                "\rCompressing target directory {}... ({} kb)",
                self.label,
                group_thousands(total_bytes / 1024)
            )
        } else {
            writeln!(self.out, "Compressing target directory {}...", self.label)
        };
        let _ = self.out.flush();
        self.shown = true;
    }

    /// Terminate an in-place status line.
    pub fn finish(&mut self) {
        if self.interactive && self.shown {
            let _ = writeln!(self.out);
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::tempdir;

    fn entry_names(archive: &Path) -> Vec<String> {
        let file = File::open(archive).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        tar.entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn archive_excludes_top_level_git_only() {
        let src = tempdir().unwrap();
        let root = src.path();
        std::fs::create_dir_all(root.join(".git/objects")).unwrap();
        std::fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        std::fs::create_dir_all(root.join("vendor/lib/.git")).unwrap();
        std::fs::write(root.join("vendor/lib/.git/HEAD"), "x").unwrap();
        std::fs::write(root.join("appspec.json"), "{}").unwrap();

        let out = tempdir().unwrap();
        let dest = out.path().join("app.tar.gz");
        write_source_archive(root, &dest, |_| {}).unwrap();

        let names = entry_names(&dest);
        assert!(names.contains(&"appspec.json".to_string()));
        assert!(names.contains(&"vendor/lib/.git/HEAD".to_string()));
        assert!(!names.iter().any(|n| n == ".git" || n.starts_with(".git/")));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_stored_as_links() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("real.txt"), "data").unwrap();
        std::os::unix::fs::symlink("real.txt", src.path().join("link.txt")).unwrap();

        let out = tempdir().unwrap();
        let dest = out.path().join("app.tar.gz");
        write_source_archive(src.path(), &dest, |_| {}).unwrap();

        let mut tar = tar::Archive::new(GzDecoder::new(File::open(&dest).unwrap()));
        let link = tar
            .entries()
            .unwrap()
            .map(std::result::Result::unwrap)
            .find(|e| e.path().unwrap().ends_with("link.txt"))
            .unwrap();
        assert_eq!(link.header().entry_type(), tar::EntryType::Symlink);
    }

    #[test]
    fn small_chunks_stream_the_same_archive() {
        let src = tempdir().unwrap();
        let mut seed = 12_345u32;
        let payload: String = (0..20_000)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                char::from(b'a' + ((seed >> 16) % 26) as u8)
            })
            .collect();
        std::fs::write(src.path().join("big.txt"), &payload).unwrap();

        let out = tempdir().unwrap();
        let dest = out.path().join("app.tar.gz");
        let mut reports = Vec::new();
        let total = write_archive_chunked(src.path(), &dest, 64, |n| reports.push(n)).unwrap();

        assert!(reports.len() > 1);
        assert_eq!(reports.last().copied(), Some(total));
        assert!(reports.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), total);

        let mut tar = tar::Archive::new(GzDecoder::new(File::open(&dest).unwrap()));
        let extracted = tempdir().unwrap();
        tar.unpack(extracted.path()).unwrap();
        assert_eq!(std::fs::read_to_string(extracted.path().join("big.txt")).unwrap(), payload);
    }

    #[test]
    fn throttle_respects_grace_and_interval() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(start);
        assert!(!throttle.ready(start + Duration::from_millis(500)));
        assert!(throttle.ready(start + Duration::from_millis(1100)));
        assert!(!throttle.ready(start + Duration::from_millis(1200)));
        assert!(throttle.ready(start + Duration::from_millis(1400)));
    }

    #[test]
    fn interactive_status_redraws_in_place() {
        let start = Instant::now();
        let mut status = CompressionStatus::new(Vec::new(), true, "/src/tool", start);
        status.observe_at(10 * 1024, start);
        status.observe_at(2_048_000, start + Duration::from_millis(1500));
        status.finish();
        let text = String::from_utf8(status.into_inner()).unwrap();
        assert_eq!(text, "\rCompressing target directory /src/tool... (2,000 kb)\n");
    }

    #[test]
    fn non_interactive_status_prints_once() {
        let start = Instant::now();
        let mut status = CompressionStatus::new(Vec::new(), false, "/src/tool", start);
        status.observe_at(1, start + Duration::from_secs(2));
        status.observe_at(2, start + Duration::from_secs(3));
        status.finish();
        let text = String::from_utf8(status.into_inner()).unwrap();
        assert_eq!(text, "Compressing target directory /src/tool...\n");
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
