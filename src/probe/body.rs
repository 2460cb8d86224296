//! Body excerpts, optional compression and header snapshots.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::config::{ContentConfig, HeaderLevel};
use crate::http::FetchedResponse;

/// Excerpts at least this long are compressed when compression is enabled.
pub const COMPRESSION_THRESHOLD: usize = 1000;

/// Cut `text` to at most `max_bytes`, never splitting a character.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// zlib + base64. Falls back to the input if encoding fails.
pub fn compress_body(text: &str) -> String {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let packed = match encoder.write_all(text.as_bytes()) {
        Ok(()) => encoder.finish(),
        Err(e) => Err(e),
    };
    match packed {
        Ok(bytes) => STANDARD.encode(bytes),
        Err(e) => {
            tracing::warn!("body compression failed: {e}");
            text.to_string()
        }
    }
}

/// Reverse of [`compress_body`]; returns the input unchanged if it is not compressed data.
pub fn decompress_body(data: &str) -> String {
    let Ok(raw) = STANDARD.decode(data.trim()) else {
        return data.to_string();
    };
    let mut out = String::new();
    match ZlibDecoder::new(raw.as_slice()).read_to_string(&mut out) {
        Ok(_) => out,
        Err(_) => data.to_string(),
    }
}

/// Stored body text and whether it is compressed.
pub fn body_excerpt(body: &str, cfg: &ContentConfig) -> (String, bool) {
    if cfg.max_body_bytes == 0 {
        return (String::new(), false);
    }
    let excerpt = truncate_utf8(body, cfg.max_body_bytes);
    if cfg.compression && excerpt.len() >= COMPRESSION_THRESHOLD {
        (compress_body(excerpt), true)
    } else {
        (excerpt.to_string(), false)
    }
}

/// Header-derived fields kept for one probe.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HeaderFields {
    pub content_length: Option<String>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub snapshot: Vec<(String, String)>,
}

pub fn header_fields(resp: &FetchedResponse, level: HeaderLevel) -> HeaderFields {
    let owned = |name: &str| resp.header(name).map(str::to_string);
    let snapshot = resp
        .headers
        .iter()
        .filter(|(k, _)| level.keeps_header(k))
        .cloned()
        .collect();
    match level {
        HeaderLevel::All => HeaderFields {
            content_length: owned("content-length"),
            content_type: owned("content-type"),
            cache_control: owned("cache-control"),
            snapshot,
        },
        HeaderLevel::Essential => HeaderFields {
            content_length: owned("content-length"),
            content_type: owned("content-type"),
            cache_control: None,
            snapshot,
        },
        HeaderLevel::None => HeaderFields::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonVerbosity;

    fn content(max: usize, compression: bool) -> ContentConfig {
        ContentConfig {
            max_body_bytes: max,
            header_level: HeaderLevel::Essential,
            compression,
            json_verbosity: JsonVerbosity::Full,
            minify_json: false,
        }
    }

    fn response() -> FetchedResponse {
        FetchedResponse {
            status: 200,
            headers: vec![
                ("content-type".into(), "text/html".into()),
                ("cache-control".into(), "no-cache".into()),
                ("server".into(), "lighttpd".into()),
                ("set-cookie".into(), "a=b".into()),
            ],
            body: String::new(),
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_utf8("héllo", 2), "h");
        assert_eq!(truncate_utf8("abc", 10), "abc");
    }

    #[test]
    fn compression_only_above_threshold() {
        let short = "x".repeat(10);
        assert_eq!(body_excerpt(&short, &content(5000, true)), (short.clone(), false));

        let long = "<html>".repeat(400);
        let (stored, compressed) = body_excerpt(&long, &content(5000, true));
        assert!(compressed);
        assert!(stored.len() < long.len());
        assert_eq!(decompress_body(&stored), long);
    }

    #[test]
    fn zero_max_keeps_nothing() {
        assert_eq!(body_excerpt("abc", &content(0, false)), (String::new(), false));
    }

    #[test]
    fn decompress_passes_through_plain_text() {
        assert_eq!(decompress_body("<html>plain</html>"), "<html>plain</html>");
    }

    #[test]
    fn header_levels() {
        let all = header_fields(&response(), HeaderLevel::All);
        assert_eq!(all.cache_control.as_deref(), Some("no-cache"));
        assert_eq!(all.snapshot.len(), 4);

        let essential = header_fields(&response(), HeaderLevel::Essential);
        assert_eq!(essential.cache_control, None);
        assert_eq!(essential.content_type.as_deref(), Some("text/html"));
        let names: Vec<_> = essential.snapshot.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["content-type", "server"]);

        assert_eq!(header_fields(&response(), HeaderLevel::None), HeaderFields::default());
    }
}
