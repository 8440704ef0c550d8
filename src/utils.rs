//! Utility functions for file naming, path handling and display formatting

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Longest sanitized stem kept, in characters
const MAX_STEM_CHARS: usize = 180;

/// Fallback when sanitization leaves nothing
const EMPTY_NAME_FALLBACK: &str = "media";

/// Get a unique path for a file, adding ` (n)` before the extension on collision
///
/// # Examples
///
/// ```
/// use media_dl::utils::get_unique_path;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/song.mp3");
/// let unique = get_unique_path(path).unwrap();
/// // If /tmp/song.mp3 exists, returns /tmp/song (1).mp3
/// // If that exists too, returns /tmp/song (2).mp3, etc.
/// ```
pub fn get_unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Other(format!("cannot extract file stem from {}", path.display())))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path
        .parent()
        .ok_or_else(|| Error::Other(format!("no parent directory for {}", path.display())))?;

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(Error::Other(format!(
        "could not find unique filename for {} after {} attempts",
        path.display(),
        MAX_RENAME_ATTEMPTS
    )))
}

/// Claim a free path like [`get_unique_path`] by creating it empty
///
/// The file is opened with `create_new`, so two callers racing for the same
/// name always end up with different paths. The caller owns the reserved
/// file and must fill it or remove it.
pub async fn reserve_unique_path(path: &Path) -> Result<PathBuf> {
    loop {
        let candidate = get_unique_path(path)?;
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Turn a media title into a filesystem-safe file stem
///
/// - curly quotes become straight quotes, then double quotes are dropped
/// - `< > : " / \ ? *` and control characters are dropped
/// - pipes, hyphen runs and underscore runs become ` - `
/// - underscores inside `()` or `[]` become spaces
/// - whitespace is collapsed and trimmed, also just inside brackets
///
/// The result is never empty and applying it twice changes nothing.
///
/// ```
/// use media_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("Artist_Song | Live [HD_1080p]"), "Artist - Song - Live [HD 1080p]");
/// ```
pub fn sanitize_filename(title: &str) -> String {
    // pass 1: character mapping with bracket awareness
    let mut mapped = String::with_capacity(title.len());
    let mut depth: u32 = 0;
    for c in title.chars() {
        let c = match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201F}' | '\u{2033}' => '"',
            other => other,
        };
        match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '?' | '*' => {}
            c if c.is_control() && !c.is_whitespace() => {}
            '(' | '[' => {
                depth += 1;
                mapped.push(c);
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                mapped.push(c);
            }
            '_' if depth > 0 => mapped.push(' '),
            '_' | '|' => mapped.push('-'),
            c => mapped.push(c),
        }
    }

    // pass 2: separator runs collapse to " - ", whitespace runs to " "
    let mut collapsed = String::with_capacity(mapped.len());
    let mut run_has_dash = false;
    let mut in_run = false;
    for c in mapped.chars() {
        if c == '-' || c.is_whitespace() {
            in_run = true;
            run_has_dash |= c == '-';
            continue;
        }
        if in_run {
            collapsed.push_str(if run_has_dash { " - " } else { " " });
            in_run = false;
            run_has_dash = false;
        }
        collapsed.push(c);
    }
    if in_run {
        collapsed.push_str(if run_has_dash { " - " } else { " " });
    }

    // pass 3: no padding just inside brackets
    let mut tightened = String::with_capacity(collapsed.len());
    let mut chars = collapsed.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ' ' && matches!(chars.peek(), Some(')') | Some(']')) {
            continue;
        }
        tightened.push(c);
        if c == '(' || c == '[' {
            while chars.peek() == Some(&' ') {
                chars.next();
            }
        }
    }

    let trimmed = trim_separators(&tightened);
    let truncated: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
    let result = trim_separators(&truncated);

    if result.is_empty() {
        EMPTY_NAME_FALLBACK.to_string()
    } else {
        result.to_string()
    }
}

fn trim_separators(s: &str) -> &str {
    s.trim_matches(|c: char| c == '-' || c.is_whitespace())
}

/// ASCII-only form of a file name for the plain `filename=` header parameter
pub fn header_safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `Content-Disposition` value for an attachment
///
/// Carries an ASCII fallback plus the RFC 5987 UTF-8 form so non-ASCII titles
/// survive in browsers that support it.
pub fn content_disposition(name: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        header_safe_filename(name),
        urlencoding::encode(name)
    )
}

/// `3725` -> `1:02:05`, `185` -> `3:05`
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// `1_260_000` -> `1.3M views`, `3_400` -> `3.4K views`, `12` -> `12 views`
pub fn format_view_count(views: u64) -> String {
    if views >= 1_000_000 {
        format!("{:.1}M views", views as f64 / 1_000_000.0)
    } else if views >= 1_000 {
        format!("{:.1}K views", views as f64 / 1_000.0)
    } else {
        format!("{views} views")
    }
}

/// Decides which submitted URLs are accepted as media sources
#[derive(Clone, Debug)]
pub struct SourceUrlPolicy {
    patterns: Vec<Regex>,
}

impl SourceUrlPolicy {
    /// Compile the configured patterns (case-insensitive)
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::Config {
                        message: format!("invalid accepted url pattern {p:?}: {e}"),
                        key: Some("accepted_url_patterns".into()),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Validate a submitted URL
    ///
    /// The URL must be an absolute http(s) URL and match at least one pattern.
    pub fn check(&self, raw: &str) -> Result<url::Url> {
        let trimmed = raw.trim();
        let parsed = url::Url::parse(trimmed)
            .map_err(|_| Error::Validation(format!("not a valid URL: {trimmed:?}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Validation(format!(
                "unsupported URL scheme {:?}",
                parsed.scheme()
            )));
        }
        if !self.patterns.iter().any(|re| re.is_match(trimmed)) {
            return Err(Error::Validation(
                "URL is not from a supported media source".to_string(),
            ));
        }
        Ok(parsed)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_get_unique_path_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("song.mp3");
        assert_eq!(get_unique_path(&path).unwrap(), path);
    }

    #[test]
    fn test_get_unique_path_rename_with_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("song.mp3");
        fs::write(&path, "original").unwrap();

        let unique = get_unique_path(&path).unwrap();
        assert_eq!(unique, temp_dir.path().join("song (1).mp3"));

        fs::write(&unique, "first rename").unwrap();
        let unique2 = get_unique_path(&path).unwrap();
        assert_eq!(unique2, temp_dir.path().join("song (2).mp3"));
    }

    #[test]
    fn test_get_unique_path_rename_without_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("song");
        fs::write(&path, "original").unwrap();

        assert_eq!(
            get_unique_path(&path).unwrap(),
            temp_dir.path().join("song (1)")
        );
    }

    #[tokio::test]
    async fn test_reserve_unique_path_hands_out_distinct_paths() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("song.mp3");

        let (first, second) = tokio::join!(reserve_unique_path(&path), reserve_unique_path(&path));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
        let mut names = vec![first, second];
        names.sort();
        assert_eq!(names, vec![temp_dir.path().join("song (1).mp3"), path.clone()]);
    }

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_filename("Artist_Song"), "Artist - Song");
        assert_eq!(sanitize_filename("Artist|Song"), "Artist - Song");
        assert_eq!(sanitize_filename("Artist   --  Song"), "Artist - Song");
        assert_eq!(sanitize_filename("a__b"), "a - b");
    }

    #[test]
    fn sanitize_strips_reserved_characters() {
        assert_eq!(sanitize_filename("What? <Live>: \"Best\"*"), "What Live Best");
        assert_eq!(sanitize_filename("AC/DC \\ Back"), "ACDC Back");
        assert_eq!(sanitize_filename("tab\there\nnew\u{7}line"), "tab here newline");
    }

    #[test]
    fn sanitize_handles_brackets() {
        assert_eq!(sanitize_filename("Song (Official_Video)"), "Song (Official Video)");
        assert_eq!(sanitize_filename("Song [ 4K_HDR ]"), "Song [4K HDR]");
    }

    #[test]
    fn sanitize_normalizes_curly_quotes() {
        assert_eq!(sanitize_filename("Don\u{2019}t Stop"), "Don't Stop");
        assert_eq!(sanitize_filename("\u{201C}Quoted\u{201D} title"), "Quoted title");
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_filename(""), "media");
        assert_eq!(sanitize_filename("???"), "media");
        assert_eq!(sanitize_filename(" _ | - "), "media");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let titles = [
            "Artist_Song | Live [HD_1080p]",
            "( _ weird _ )",
            "Don\u{2019}t__Stop -- Me",
            "   spaced    out   ",
            "[a-b](c_d)|e",
            "日本語のタイトル | MV",
        ];
        for title in titles {
            let once = sanitize_filename(title);
            assert_eq!(sanitize_filename(&once), once, "not idempotent for {title:?}");
        }
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_filename(&long).chars().count(), MAX_STEM_CHARS);
    }

    #[test]
    fn content_disposition_has_ascii_fallback_and_utf8_form() {
        let header = content_disposition("Café Song.mp3");
        assert_eq!(
            header,
            "attachment; filename=\"Caf_ Song.mp3\"; filename*=UTF-8''Caf%C3%A9%20Song.mp3"
        );
    }

    #[test]
    fn durations_and_views_format_for_display() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(185), "3:05");
        assert_eq!(format_duration(3725), "1:02:05");
        assert_eq!(format_view_count(12), "12 views");
        assert_eq!(format_view_count(3_400), "3.4K views");
        assert_eq!(format_view_count(1_260_000), "1.3M views");
    }

    #[test]
    fn url_policy_accepts_supported_sources() {
        let policy =
            SourceUrlPolicy::new(&crate::config::DownloadConfig::default().accepted_url_patterns)
                .unwrap();
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://youtube.com/embed/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "HTTPS://WWW.YOUTUBE.COM/watch?v=abc",
        ] {
            assert!(policy.check(url).is_ok(), "{url} rejected");
        }
    }

    #[test]
    fn url_policy_rejects_malformed_and_foreign_urls() {
        let policy =
            SourceUrlPolicy::new(&crate::config::DownloadConfig::default().accepted_url_patterns)
                .unwrap();
        for url in [
            "not a url",
            "youtube.com/watch?v=abc",
            "ftp://youtube.com/watch?v=abc",
            "https://example.com/watch?v=abc",
        ] {
            assert!(
                matches!(policy.check(url), Err(Error::Validation(_))),
                "{url} accepted"
            );
        }
    }

    #[test]
    fn url_policy_reports_bad_patterns_as_config_errors() {
        let err = SourceUrlPolicy::new(&["(unclosed".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
