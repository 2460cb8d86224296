//! Folding the two protocol outcomes of one host into a single record.

use crate::classifier::{is_generic, is_specific};
use crate::types::{ProbeOutcome, ScanRecord, UNKNOWN_LABEL};

/// A side qualifies when it loaded and produced either a screenshot or a
/// specific classification.
fn qualifies(outcome: &ProbeOutcome) -> bool {
    outcome.loaded && (outcome.screenshot.is_some() || is_specific(&outcome.classification))
}

fn specificity(label: &str) -> u8 {
    if is_specific(label) {
        0
    } else if is_generic(label) {
        1
    } else {
        2
    }
}

/// Merge the plain and encrypted outcomes for `host`. The encrypted side is
/// considered first wherever both sides are equally good.
pub fn merge(host: &str, plain: ProbeOutcome, encrypted: ProbeOutcome) -> ScanRecord {
    let sides = [&encrypted, &plain];

    let (chosen_title, chosen_screenshot, chosen_classification) =
        if let Some(winner) = sides.iter().find(|o| qualifies(o)) {
            (
                winner.title.clone(),
                winner.screenshot.clone(),
                winner.classification.clone(),
            )
        } else {
            let title = sides
                .iter()
                .find(|o| o.loaded && !o.title.is_empty())
                .or_else(|| sides.iter().find(|o| !o.title.is_empty()))
                .map(|o| o.title.clone())
                .unwrap_or_default();
            let screenshot = sides
                .iter()
                .find(|o| o.loaded && o.screenshot.is_some())
                .or_else(|| sides.iter().find(|o| o.screenshot.is_some()))
                .and_then(|o| o.screenshot.clone());
            // Stable sort keeps the encrypted side first among equals.
            let mut labels: Vec<&str> = sides.iter().map(|o| o.classification.as_str()).collect();
            labels.sort_by_key(|l| specificity(l));
            let classification = labels
                .first()
                .filter(|l| !l.is_empty())
                .map(|l| l.to_string())
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
            (title, screenshot, classification)
        };

    let loaded_times: Vec<f64> = sides
        .iter()
        .filter(|o| o.loaded)
        .map(|o| o.elapsed_seconds)
        .collect();
    let times: Vec<f64> = if loaded_times.is_empty() {
        sides.iter().map(|o| o.elapsed_seconds).collect()
    } else {
        loaded_times
    };
    let response_time_seconds = times.into_iter().fold(f64::INFINITY, f64::min);
    let response_time_seconds = if response_time_seconds.is_finite() {
        response_time_seconds
    } else {
        0.0
    };

    ScanRecord {
        host: host.to_string(),
        encrypted,
        plain,
        chosen_title,
        chosen_screenshot,
        chosen_classification,
        response_time_seconds,
    }
}
