//! Title and artist cleanup applied before lyrics lookups.
//!
//! Media players and recognition services report titles such as
//! `Song (2011 Remaster) - Live at Wembley`; lyrics providers want `Song`.

use once_cell::sync::Lazy;
use regex::Regex;

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[\(\[\{<][^\(\)\[\]\{\}<>]*[\)\]\}>]").expect("static regex"));
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}\b").expect("static regex"));
static SHORT_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"'\d{2}\b").expect("static regex"));
static VERSION_DASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+-\s+|\s*-\s*(?:remaster|version|edit|mix|single|live|from)\b")
        .expect("static regex")
});
static VERSION_PHRASES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)\b(?:from|on)\s+(?:the\s+)?(?:"[^"]*"|'[^']*'|\S+)?\s*(?:soundtrack|album|movie|film|series|show)\b"#,
        r"(?i)\b(?:original|movie|film|radio|single|album|instrumental|acoustic|live|studio|extended|shortened)\s+(?:version|edit|mix|cut|recording)\b",
        r"(?i)\b(?:remaster(?:ed)?|remix(?:ed)?|feat\.?|ft\.?|featuring)\b",
        r"(?i)\b(?:bonus\s+track|deluxe\s+edition|digital\s+exclusive)\b",
        r"(?i)\b(?:explicit|clean)\s+(?:version|edit)?\b",
        r"(?i)\d+(?:th|st|nd|rd)?\s+(?:anniversary|edition)\b",
        r"(?i)\b(?:anthology|world\s+wildlife\s+fund)\s+(?:version)?\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});
static NON_LATIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\x00-\x7F\x{C0}-\x{FF}\x{2000}-\x{206F}]").expect("static regex")
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static TRAILING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.,;:!?]+$").expect("static regex"));
static ASCII_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z]+\b").expect("static regex"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("static regex"));
static CJK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x{4e00}-\x{9fff}]+").expect("static regex"));

/// Separators that join several performers in one artist string.
const ARTIST_SEPARATORS: &[&str] = &[
    "/", "|", "&", ",", " and ", " with ", " feat ", " feat. ", " ft ", " ft. ", " featuring ",
];

/// Strip version tags, years and bracketed notes from a track title.
pub fn clean_track_name(track: &str) -> String {
    if track.is_empty() {
        return String::new();
    }
    let original = track;
    let mut track = track.to_string();

    // Nested brackets go from the inside out
    while BRACKETED.is_match(&track) {
        track = BRACKETED.replace_all(&track, "").into_owned();
    }

    track = YEAR.replace_all(&track, "").into_owned();
    track = SHORT_YEAR.replace_all(&track, "").into_owned();

    track = VERSION_DASH
        .split(&track)
        .next()
        .unwrap_or_default()
        .to_string();

    for phrase in VERSION_PHRASES.iter() {
        track = phrase.replace_all(&track, "").into_owned();
    }

    track = NON_LATIN.replace_all(&track, "").into_owned();
    track = track
        .replace(['\u{2018}', '\u{2019}', '\u{00B4}', '`'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"");
    track = WHITESPACE.replace_all(&track, " ").into_owned();
    track = TRAILING_PUNCT.replace(track.trim(), "").trim().to_string();

    if track.chars().count() < 2 {
        let words: Vec<&str> = ASCII_WORD.find_iter(original).map(|m| m.as_str()).collect();
        if !words.is_empty() {
            return words.join(" ");
        }
        return NON_WORD.replace_all(original, "").trim().to_string();
    }

    track
}

/// Individual performers of a combined artist string, or empty when the
/// string names a single artist.
pub fn split_artists(artist: &str) -> Vec<String> {
    if !ARTIST_SEPARATORS.iter().any(|sep| artist.contains(sep)) {
        return Vec::new();
    }

    let mut normalized = artist.to_string();
    for sep in ARTIST_SEPARATORS {
        normalized = normalized.replace(sep, "|");
    }

    normalized
        .split('|')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// Drop CJK ideographs that recognition results sometimes carry alongside
/// the romanized title.
pub fn strip_cjk(text: &str) -> String {
    CJK.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_track_name_strips_brackets_and_years() {
        assert_eq!(clean_track_name("Song (2011 Remaster)"), "Song");
        assert_eq!(clean_track_name("Song [Live] {Bonus}"), "Song");
        assert_eq!(clean_track_name("Song (Live (Acoustic))"), "Song");
        assert_eq!(clean_track_name("Summer of 1969"), "Summer of");
    }

    #[test]
    fn test_clean_track_name_cuts_version_suffixes() {
        assert_eq!(clean_track_name("Hello - Remastered 2009"), "Hello");
        assert_eq!(clean_track_name("Hello - Live at Wembley"), "Hello");
        assert_eq!(clean_track_name("Hello Radio Edit"), "Hello");
        assert_eq!(clean_track_name("Spider-Man"), "Spider-Man");
    }

    #[test]
    fn test_clean_track_name_normalizes_text() {
        assert_eq!(clean_track_name("Don\u{2019}t   Stop!!"), "Don't Stop");
        assert_eq!(clean_track_name("  Café  "), "Café");
    }

    #[test]
    fn test_clean_track_name_falls_back_to_original_words() {
        assert_eq!(clean_track_name("(Intro)"), "Intro");
        assert_eq!(clean_track_name(""), "");
    }

    #[test]
    fn test_split_artists() {
        assert!(split_artists("Queen").is_empty());
        assert_eq!(split_artists("Queen & David Bowie"), vec!["Queen", "David Bowie"]);
        assert_eq!(
            split_artists("A feat. B, C"),
            vec!["A", "B", "C"]
        );
        assert_eq!(split_artists("Simon and Garfunkel"), vec!["Simon", "Garfunkel"]);
    }

    #[test]
    fn test_strip_cjk() {
        assert_eq!(strip_cjk("Hello 你好"), "Hello");
        assert_eq!(strip_cjk("Plain"), "Plain");
    }
}
