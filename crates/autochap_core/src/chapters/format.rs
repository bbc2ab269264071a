//! Simple (OGM-style) chapter file format.
//!
//! ```text
//! CHAPTER01=00:00:00.000
//! CHAPTER01NAME=Opening
//! CHAPTER02=00:01:32.000
//! CHAPTER02NAME=Episode
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use super::types::{ChapterEntry, ChapterError, ChapterResult};

/// Format seconds as `HH:MM:SS.mmm`.
///
/// Milliseconds come from rounding the whole value, so 59.9996s is
/// `00:01:00.000`. Negative values clamp to zero.
pub fn format_timestamp(secs: f64) -> String {
    let total_ms = if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    };
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let s = total_secs % 60;
    let total_mins = total_secs / 60;
    let m = total_mins % 60;
    let h = total_mins / 60;
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
}

/// Parse `HH:MM:SS.fff` (any number of fraction digits) to seconds.
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let s = s.trim();
    let (hms, frac) = match s.split_once('.') {
        Some((hms, frac)) => (hms, frac),
        None => (s, ""),
    };

    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let h: u64 = parts[0].parse().ok()?;
    let m: u64 = parts[1].parse().ok()?;
    let sec: u64 = parts[2].parse().ok()?;
    if m >= 60 || sec >= 60 {
        return None;
    }

    let fraction = if frac.is_empty() {
        0.0
    } else {
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        format!("0.{}", frac).parse::<f64>().ok()?
    };

    Some((h * 3600 + m * 60 + sec) as f64 + fraction)
}

/// Render entries as a chapter file, numbered from 01 in order.
pub fn render_chapters(entries: &[ChapterEntry]) -> String {
    let mut out = String::new();
    for (idx, entry) in entries.iter().enumerate() {
        let n = idx + 1;
        let _ = writeln!(out, "CHAPTER{:02}={}", n, format_timestamp(entry.start_secs));
        let _ = writeln!(out, "CHAPTER{:02}NAME={}", n, entry.name);
    }
    out
}

/// Write entries to `path`, creating the parent directory if needed.
pub fn write_chapters(path: &Path, entries: &[ChapterEntry]) -> ChapterResult<()> {
    if entries.is_empty() {
        return Err(ChapterError::NoChapters);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_chapters(entries))?;
    tracing::info!("Wrote {} chapters to {}", entries.len(), path.display());
    Ok(())
}

/// Parse a chapter file. The first line must be `CHAPTER01=`.
pub fn parse_chapters(text: &str) -> ChapterResult<Vec<ChapterEntry>> {
    let text = text.trim_start_matches('\u{feff}');
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();

    match lines.peek() {
        None => return Err(ChapterError::NoChapters),
        Some(first) if !first.starts_with("CHAPTER01=") => {
            return Err(ChapterError::ParseError("Invalid chapter format".to_string()));
        }
        Some(_) => {}
    }

    let mut starts: BTreeMap<u32, f64> = BTreeMap::new();
    let mut names: BTreeMap<u32, String> = BTreeMap::new();

    for line in lines {
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ChapterError::ParseError(format!("Missing '=' in line: {}", line)))?;
        let rest = key
            .strip_prefix("CHAPTER")
            .ok_or_else(|| ChapterError::ParseError(format!("Unexpected key: {}", key)))?;

        if let Some(number) = rest.strip_suffix("NAME") {
            let idx = parse_index(number, key)?;
            names.insert(idx, value.to_string());
        } else {
            let idx = parse_index(rest, key)?;
            let start = parse_timestamp(value).ok_or_else(|| {
                ChapterError::ParseError(format!("Invalid timestamp for {}: {}", key, value))
            })?;
            starts.insert(idx, start);
        }
    }

    if let Some(idx) = names.keys().find(|idx| !starts.contains_key(idx)) {
        return Err(ChapterError::ParseError(format!(
            "CHAPTER{:02}NAME has no matching timestamp",
            idx
        )));
    }

    Ok(starts
        .into_iter()
        .map(|(idx, start)| {
            ChapterEntry::new(names.remove(&idx).unwrap_or_default(), start)
        })
        .collect())
}

fn parse_index(number: &str, key: &str) -> ChapterResult<u32> {
    number
        .parse()
        .map_err(|_| ChapterError::ParseError(format!("Invalid chapter number in {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_timestamps() {
        assert_eq!(format_timestamp(0.0), "00:00:00.000");
        assert_eq!(format_timestamp(92.0), "00:01:32.000");
        assert_eq!(format_timestamp(820.0), "00:13:40.000");
        assert_eq!(format_timestamp(3723.456), "01:02:03.456");
    }

    #[test]
    fn milliseconds_are_rounded_not_truncated() {
        assert_eq!(format_timestamp(1.9996), "00:00:02.000");
        assert_eq!(format_timestamp(10.0006), "00:00:10.001");
        assert_eq!(format_timestamp(10.0004), "00:00:10.000");
    }

    #[test]
    fn rounding_carries_into_seconds_and_minutes() {
        assert_eq!(format_timestamp(59.9996), "00:01:00.000");
        assert_eq!(format_timestamp(3599.9999), "01:00:00.000");
    }

    #[test]
    fn negative_clamps_to_zero() {
        assert_eq!(format_timestamp(-1.0), "00:00:00.000");
    }

    #[test]
    fn renders_chapter_file() {
        let entries = vec![
            ChapterEntry::new("Opening", 0.0),
            ChapterEntry::new("Episode", 92.0),
        ];
        assert_eq!(
            render_chapters(&entries),
            "CHAPTER01=00:00:00.000\nCHAPTER01NAME=Opening\nCHAPTER02=00:01:32.000\nCHAPTER02NAME=Episode\n"
        );
    }

    #[test]
    fn parses_rendered_file() {
        let entries = vec![
            ChapterEntry::new("Prologue", 0.0),
            ChapterEntry::new("Opening", 300.0),
            ChapterEntry::new("Episode", 390.5),
        ];
        let parsed = parse_chapters(&render_chapters(&entries)).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn rejects_files_not_starting_with_chapter01() {
        let result = parse_chapters("CHAPTER02=00:00:01.000\nCHAPTER02NAME=x\n");
        assert!(matches!(result, Err(ChapterError::ParseError(_))));
        assert!(matches!(parse_chapters("\n\n"), Err(ChapterError::NoChapters)));
    }

    #[test]
    fn rejects_bad_timestamps() {
        let result = parse_chapters("CHAPTER01=00:00:00.000\nCHAPTER02=soon\n");
        assert!(matches!(result, Err(ChapterError::ParseError(_))));
    }

    #[test]
    fn parses_fraction_digits() {
        assert_eq!(parse_timestamp("00:00:01.5"), Some(1.5));
        assert_eq!(parse_timestamp("00:01:00"), Some(60.0));
        assert_eq!(parse_timestamp("00:61:00.000"), None);
    }

    #[test]
    fn writes_chapter_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("episode.chapters.txt");
        write_chapters(&path, &[ChapterEntry::new("Episode", 0.0)]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("CHAPTER01=00:00:00.000\n"));
        assert!(matches!(write_chapters(&path, &[]), Err(ChapterError::NoChapters)));
    }
}
