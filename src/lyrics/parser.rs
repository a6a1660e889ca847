//! LRC format parser
//!
//! Parses synchronized lyrics in LRC format:
//! [mm:ss.xx] Lyrics line here
//!
//! Example:
//! [00:12.34] Hello world
//! [00:15.00] Another line

use super::document::{LyricUnit, TimedLyricsDocument};

/// How long the final line stays up when the track length is unknown.
pub const DEFAULT_LAST_LINE_MS: u64 = 5_000;

/// A single line of lyrics with timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LrcLine {
    /// Timestamp in milliseconds from start
    pub time_ms: u64,
    /// The lyrics text
    pub text: String,
}

impl LrcLine {
    pub fn new(time_ms: u64, text: String) -> Self {
        Self { time_ms, text }
    }
}

/// Parsed lyrics with metadata
#[derive(Debug, Clone)]
pub struct ParsedLyrics {
    /// Individual lyrics lines
    pub lines: Vec<LrcLine>,
    /// Whether the lyrics are synchronized
    pub synced: bool,
}

impl ParsedLyrics {
    /// Parse LRC formatted lyrics
    pub fn parse(content: &str, synced: bool) -> Self {
        let mut lines = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // Skip metadata tags like [ti:Title]
            if Self::parse_metadata(line).is_some() {
                continue;
            }

            if synced && let Some(parsed) = Self::parse_timed_line(line) {
                lines.extend(parsed);
                continue;
            }

            // Plain text line (no timestamp)
            if !synced && !line.starts_with('[') {
                lines.push(LrcLine::new(0, line.to_string()));
            }
        }

        // Stable, so lines sharing a timestamp keep file order
        lines.sort_by_key(|l| l.time_ms);

        Self { lines, synced }
    }

    /// Build a timed document. Each line runs until the next distinct
    /// timestamp; the last one until `duration_ms` (when it lies past the
    /// line's start) or `last_line_ms` after it.
    ///
    /// Returns `None` for unsynced lyrics or when no timed lines survived.
    pub fn to_document(
        &self,
        duration_ms: Option<u64>,
        last_line_ms: u64,
    ) -> Option<TimedLyricsDocument> {
        if !self.synced || self.lines.is_empty() {
            return None;
        }

        // Collapse lines that share a timestamp into one unit.
        let mut merged: Vec<(u64, String)> = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            match merged.last_mut() {
                Some((time_ms, text)) if *time_ms == line.time_ms => {
                    text.push(' ');
                    text.push_str(&line.text);
                }
                _ => merged.push((line.time_ms, line.text.clone())),
            }
        }

        let mut units = Vec::with_capacity(merged.len());
        for (i, (start_ms, text)) in merged.iter().enumerate() {
            let end_ms = match merged.get(i + 1) {
                Some((next_start, _)) => *next_start,
                None => match duration_ms {
                    Some(d) if d > *start_ms => d,
                    _ => start_ms.saturating_add(last_line_ms.max(1)),
                },
            };
            units.push(LyricUnit::new(*start_ms, end_ms, text.clone()));
        }

        Some(TimedLyricsDocument::new(units))
    }

    /// Render back to LRC text, used by the lyrics cache and `lyrics` command.
    pub fn format_lrc(document: &TimedLyricsDocument) -> String {
        document
            .units()
            .iter()
            .map(|u| {
                let min = u.start_ms / 60000;
                let sec = (u.start_ms % 60000) / 1000;
                let cs = (u.start_ms % 1000) / 10;
                format!("[{:02}:{:02}.{:02}]{}", min, sec, cs, u.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse metadata tag like [ti:Title]
    fn parse_metadata(line: &str) -> Option<(String, String)> {
        if !line.starts_with('[') || !line.contains(':') {
            return None;
        }

        let end = line.find(']')?;
        let tag_content = &line[1..end];

        // Check if it looks like a metadata tag (not a timestamp)
        let colon_pos = tag_content.find(':')?;
        let tag = &tag_content[..colon_pos];

        // Metadata tags are typically 2-6 chars ("offset", "length")
        if !tag.is_empty() && tag.len() <= 6 && tag.chars().all(|c| c.is_ascii_alphabetic()) {
            let value = tag_content[colon_pos + 1..].trim().to_string();
            return Some((tag.to_string(), value));
        }

        None
    }

    /// Parse a timed line like [00:12.34]Lyrics or [00:12.34][00:15.00]Lyrics
    fn parse_timed_line(line: &str) -> Option<Vec<LrcLine>> {
        let mut timestamps = Vec::new();
        let mut pos = 0;

        // Extract all timestamps at the beginning
        while pos < line.len() && line[pos..].starts_with('[') {
            let Some(end) = line[pos..].find(']') else {
                break;
            };
            let timestamp_str = &line[pos + 1..pos + end];
            match Self::parse_timestamp(timestamp_str) {
                Some(ms) => {
                    timestamps.push(ms);
                    pos += end + 1;
                }
                None => break,
            }
        }

        if timestamps.is_empty() {
            return None;
        }

        let text = line[pos..].trim().to_string();

        // Timing-only lines carry nothing to display
        if text.is_empty() {
            return Some(Vec::new());
        }

        let lines = timestamps
            .into_iter()
            .map(|ts| LrcLine::new(ts, text.clone()))
            .collect();

        Some(lines)
    }

    /// Parse timestamp string like "00:12.34" or "00:12:34" to milliseconds
    fn parse_timestamp(s: &str) -> Option<u64> {
        // Format: mm:ss.xx or mm:ss:xx or mm:ss
        let parts: Vec<&str> = s.split([':', '.']).collect();

        let (min, sec, ms) = match parts.len() {
            2 => (parts[0], parts[1], 0),
            3 => {
                let ms_str = parts[2];
                // Handle "3" (tenths), "34" (centiseconds) and "340" (milliseconds)
                let ms: u64 = match ms_str.len() {
                    1 => ms_str.parse::<u64>().ok()? * 100,
                    2 => ms_str.parse::<u64>().ok()? * 10,
                    3 => ms_str.parse().ok()?,
                    _ => return None,
                };
                (parts[0], parts[1], ms)
            }
            _ => return None,
        };
        let min: u64 = min.parse().ok()?;
        let sec: u64 = sec.parse().ok()?;

        // Out-of-range timestamps make the line untimed rather than wrapping
        min.checked_mul(60_000)?
            .checked_add(sec.checked_mul(1000)?)?
            .checked_add(ms)
    }
}
