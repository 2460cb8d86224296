//! Fixed field-to-column mapping shared by the tabular and flat outputs.

use std::path::Path;

use crate::types::{Protocol, ScanRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Host,
    EncryptedWorks,
    PlainWorks,
    ChosenTitle,
    Classification,
    ResponseTime,
    Screenshot,
    Title(Protocol),
    StatusCode(Protocol),
    ContentLength(Protocol),
    ContentType(Protocol),
    CacheControl(Protocol),
    RemoteHeaders(Protocol),
}

pub const COLUMNS: [Column; 19] = [
    Column::Host,
    Column::EncryptedWorks,
    Column::PlainWorks,
    Column::ChosenTitle,
    Column::Classification,
    Column::ResponseTime,
    Column::Screenshot,
    Column::Title(Protocol::Encrypted),
    Column::StatusCode(Protocol::Encrypted),
    Column::ContentLength(Protocol::Encrypted),
    Column::ContentType(Protocol::Encrypted),
    Column::CacheControl(Protocol::Encrypted),
    Column::RemoteHeaders(Protocol::Encrypted),
    Column::Title(Protocol::Plain),
    Column::StatusCode(Protocol::Plain),
    Column::ContentLength(Protocol::Plain),
    Column::ContentType(Protocol::Plain),
    Column::CacheControl(Protocol::Plain),
    Column::RemoteHeaders(Protocol::Plain),
];

/// Zero-based index of the screenshot column.
pub const SCREENSHOT_COLUMN: u16 = 6;

impl Column {
    pub fn header(self) -> &'static str {
        use Protocol::{Encrypted as S, Plain as P};
        match self {
            Column::Host => "IP/Host",
            Column::EncryptedWorks => "HTTPS Works",
            Column::PlainWorks => "HTTP Works",
            Column::ChosenTitle => "Title (Chosen Protocol)",
            Column::Classification => "BMS Type",
            Column::ResponseTime => "Response Time (s)",
            Column::Screenshot => "Screenshot",
            Column::Title(S) => "HTTPS Title",
            Column::StatusCode(S) => "HTTPS Status Code",
            Column::ContentLength(S) => "HTTPS Content-Length",
            Column::ContentType(S) => "HTTPS Content-Type",
            Column::CacheControl(S) => "HTTPS cache-control",
            Column::RemoteHeaders(S) => "HTTPS Remote Headers",
            Column::Title(P) => "HTTP Title",
            Column::StatusCode(P) => "HTTP Status Code",
            Column::ContentLength(P) => "HTTP Content-Length",
            Column::ContentType(P) => "HTTP Content-Type",
            Column::CacheControl(P) => "HTTP cache-control",
            Column::RemoteHeaders(P) => "HTTP Remote Headers",
        }
    }

    /// Cell text for this column. The screenshot column holds the path as given;
    /// the tabular writer substitutes its own cell content.
    pub fn value(self, record: &ScanRecord) -> String {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        match self {
            Column::Host => record.host.clone(),
            Column::EncryptedWorks => works(record.encrypted.loaded),
            Column::PlainWorks => works(record.plain.loaded),
            Column::ChosenTitle => record.chosen_title.clone(),
            Column::Classification => record.chosen_classification.clone(),
            Column::ResponseTime => format_seconds(record.response_time_seconds),
            Column::Screenshot => record
                .chosen_screenshot
                .as_deref()
                .map(path_text)
                .unwrap_or_default(),
            Column::Title(p) => record.outcome(p).title.clone(),
            Column::StatusCode(p) => record
                .outcome(p)
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_default(),
            Column::ContentLength(p) => opt(&record.outcome(p).content_length),
            Column::ContentType(p) => opt(&record.outcome(p).content_type),
            Column::CacheControl(p) => opt(&record.outcome(p).cache_control),
            Column::RemoteHeaders(p) => record.outcome(p).headers_json(),
        }
    }
}

pub fn works(loaded: bool) -> String {
    let text = if loaded { "True" } else { "False" };
    text.to_string()
}

/// Seconds rounded to two decimals.
pub fn format_seconds(secs: f64) -> String {
    format!("{secs:.2}")
}

pub fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn header_row() -> Vec<&'static str> {
    COLUMNS.iter().map(|c| c.header()).collect()
}

pub fn row(record: &ScanRecord) -> Vec<String> {
    COLUMNS.iter().map(|c| c.value(record)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge;
    use crate::types::ProbeOutcome;

    #[test]
    fn screenshot_column_index_matches_table() {
        assert_eq!(COLUMNS[SCREENSHOT_COLUMN as usize], Column::Screenshot);
        assert_eq!(header_row().len(), 19);
    }

    #[test]
    fn row_maps_fields_in_order() {
        let mut enc = ProbeOutcome::unreachable(Protocol::Encrypted);
        enc.loaded = true;
        enc.title = "Desigo CC".into();
        enc.status_code = Some(200);
        enc.classification = "Siemens".into();
        enc.elapsed_seconds = 1.234;
        enc.headers = vec![("server".into(), "Desigo".into())];
        let rec = merge("10.1.1.1", ProbeOutcome::unreachable(Protocol::Plain), enc);

        let r = row(&rec);
        assert_eq!(r[0], "10.1.1.1");
        assert_eq!(r[1], "True");
        assert_eq!(r[2], "False");
        assert_eq!(r[3], "Desigo CC");
        assert_eq!(r[4], "Siemens");
        assert_eq!(r[5], "1.23");
        assert_eq!(r[6], "");
        assert_eq!(r[8], "200");
        assert_eq!(r[12], r#"{"server":"Desigo"}"#);
        assert_eq!(r[14], "");
    }
}
