//! Video URL canonicalization and request validation.
//!
//! Canonical identifiers keep the asset cache stable across the many URL
//! shapes that point at the same video: `watch?v=`, `youtu.be/` short links
//! and `/shorts/` paths all collapse to `yt:<id>`. Everything else falls back
//! to the URL with query and fragment stripped.

use sha1::{Digest, Sha1};
use url::Url;

/// Canonicalize a video URL to a stable identifier.
///
/// Unparseable input is returned trimmed, so hashing still yields a stable
/// (if opaque) fingerprint.
pub fn canonical_video_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let Ok(mut parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();
    if host.contains("youtube.com") {
        if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v") {
            if !v.is_empty() {
                return format!("yt:{v}");
            }
        }
        if parsed.path().to_ascii_lowercase().starts_with("/shorts/") {
            if let Some(id) = last_path_segment(&parsed) {
                return format!("yt:{id}");
            }
        }
    }
    if host.contains("youtu.be") {
        if let Some(id) = last_path_segment(&parsed) {
            return format!("yt:{id}");
        }
    }

    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

fn last_path_segment(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(|s| s.to_string())
}

/// Hex-encoded SHA-1 of the UTF-8 bytes of `s`.
pub fn hash_string(s: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check whether the URL's host is one of the allowed domains, either an
/// exact match or a subdomain of one. An empty allowlist permits everything.
pub fn is_allowed_domain(raw: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Ok(parsed) = Url::parse(raw.trim()) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    allowed.iter().any(|domain| {
        let domain = domain.trim().to_ascii_lowercase();
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
    })
}

/// Parse and validate clip bounds.
///
/// Accepts `HH:MM:SS` or `MM:SS`; an empty string means 0. Returns
/// `(start_seconds, end_seconds, ok)`. The clip is rejected when:
/// - either timestamp fails to parse,
/// - `end <= start` while an end is given,
/// - `start >= total_duration` or `end > total_duration` when the total
///   duration is known,
/// - the clip length exceeds `max_seconds` when a cap is configured. The
///   length is `end - start`, or `total_duration - start` when no end is
///   given.
pub fn parse_clip_bounds(
    start: &str,
    end: &str,
    max_seconds: i64,
    total_duration: i64,
) -> (i64, i64, bool) {
    let Some(start_s) = parse_timestamp(start) else {
        return (0, 0, false);
    };
    let Some(end_s) = parse_timestamp(end) else {
        return (0, 0, false);
    };

    if end_s > 0 && end_s <= start_s {
        return (start_s, end_s, false);
    }
    if total_duration > 0 {
        if start_s >= total_duration {
            return (start_s, end_s, false);
        }
        if end_s > total_duration {
            return (start_s, end_s, false);
        }
    }
    if max_seconds > 0 {
        let clip_len = if !end.trim().is_empty() {
            end_s - start_s
        } else if total_duration > 0 {
            total_duration - start_s
        } else {
            0
        };
        if clip_len > max_seconds {
            return (start_s, end_s, false);
        }
    }
    (start_s, end_s, true)
}

/// Parse `HH:MM:SS` or `MM:SS` into seconds. Empty input is 0 seconds.
fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Some(0);
    }
    let parts: Vec<&str> = s.split(':').collect();
    let parsed: Option<Vec<i64>> = parts
        .iter()
        .map(|p| p.parse::<i64>().ok().filter(|n| *n >= 0))
        .collect();
    match parsed?.as_slice() {
        [m, sec] => Some(m * 60 + sec),
        [h, m, sec] => Some(h * 3600 + m * 60 + sec),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_watch_short_and_shorts_agree() {
        let a = canonical_video_id("https://www.youtube.com/watch?v=abc&t=5");
        let b = canonical_video_id("https://youtu.be/abc");
        let c = canonical_video_id("https://www.youtube.com/shorts/abc");
        assert_eq!(a, "yt:abc");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_canonical_strips_query_for_other_hosts() {
        assert_eq!(
            canonical_video_id("https://example.com/video/1?utm=x#t=3"),
            "https://example.com/video/1"
        );
    }

    #[test]
    fn test_canonical_trims_and_passes_through_garbage() {
        assert_eq!(canonical_video_id("  not a url  "), "not a url");
        assert_eq!(canonical_video_id(""), "");
    }

    #[test]
    fn test_canonical_host_is_case_insensitive() {
        assert_eq!(
            canonical_video_id("https://WWW.YOUTUBE.COM/watch?v=xYz"),
            "yt:xYz"
        );
    }

    #[test]
    fn test_hash_string_is_sha1_hex() {
        // sha1("abc")
        assert_eq!(hash_string("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(hash_string("yt:abc"), hash_string("yt:abc"));
        assert_ne!(hash_string("yt:abc"), hash_string("yt:abd"));
    }

    #[test]
    fn test_allowed_domain_exact_and_suffix() {
        let allowed = vec!["youtube.com".to_string(), "youtu.be".to_string()];
        assert!(is_allowed_domain("https://youtube.com/watch?v=a", &allowed));
        assert!(is_allowed_domain("https://www.youtube.com/watch?v=a", &allowed));
        assert!(is_allowed_domain("https://YOUTU.BE/a", &allowed));
        assert!(!is_allowed_domain("https://example.com/x", &allowed));
        // Suffix matching must not accept lookalike registrations.
        assert!(!is_allowed_domain("https://notyoutube.com/x", &allowed));
    }

    #[test]
    fn test_allowed_domain_empty_list_allows_all() {
        assert!(is_allowed_domain("https://example.com/x", &[]));
    }

    #[test]
    fn test_clip_bounds_basic() {
        assert_eq!(
            parse_clip_bounds("00:01:00", "00:02:00", 900, 0),
            (60, 120, true)
        );
        assert_eq!(parse_clip_bounds("", "", 900, 200), (0, 0, true));
        assert_eq!(parse_clip_bounds("01:30", "02:00", 900, 0), (90, 120, true));
    }

    #[test]
    fn test_clip_bounds_end_before_start() {
        let (_, _, ok) = parse_clip_bounds("00:05:00", "00:03:00", 900, 0);
        assert!(!ok);
    }

    #[test]
    fn test_clip_bounds_exceeds_max() {
        let (_, _, ok) = parse_clip_bounds("00:00:00", "00:20:00", 900, 0);
        assert!(!ok);
        // Open-ended clip against a long video also trips the cap.
        let (_, _, ok) = parse_clip_bounds("", "", 900, 1000);
        assert!(!ok);
    }

    #[test]
    fn test_clip_bounds_against_total_duration() {
        let (_, _, ok) = parse_clip_bounds("03:30", "", 900, 200);
        assert!(!ok, "start past the end of the video");
        let (_, _, ok) = parse_clip_bounds("00:10", "05:00", 900, 200);
        assert!(!ok, "end past the end of the video");
        let (_, _, ok) = parse_clip_bounds("00:10", "03:00", 900, 200);
        assert!(ok);
    }

    #[test]
    fn test_clip_bounds_malformed() {
        let (_, _, ok) = parse_clip_bounds("abc", "", 900, 0);
        assert!(!ok);
        let (_, _, ok) = parse_clip_bounds("1:2:3:4", "", 900, 0);
        assert!(!ok);
        let (_, _, ok) = parse_clip_bounds("-1:00", "", 900, 0);
        assert!(!ok);
    }
}
