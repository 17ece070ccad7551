//! Channel labels and the row ordering shared with the segment assembler.
//!
//! Rows are ordered montage by montage; within a montage, detectors are the
//! outer loop and sources the inner loop. A data type adds a whole
//! `detectors x sources` block of rows.

use crate::types::{ChannelInfo, ChannelKind};

/// Detector names as they appear in BOXY column headers.
pub const DETECTOR_LETTERS: [char; 26] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// Row of `(detector, source, data type)` within one montage block.
///
/// `detector_pos` is 0-based, `source` is 1-based, matching the column names.
pub fn channel_row(
    detector_pos: usize,
    source: usize,
    data_type_index: usize,
    source_count: usize,
    detector_count: usize,
) -> usize {
    detector_pos * source_count
        + (source - 1)
        + data_type_index * (source_count * detector_count)
}

// 1-based (montage, detector, source) in row order
fn channel_numbers<'a>(
    detector_counts: &'a [usize],
    source_counts: &'a [usize],
    montage_names: &'a [char],
) -> impl Iterator<Item = (usize, usize, usize)> + 'a {
    (0..montage_names.len()).flat_map(move |mtg_num| {
        let detectors = detector_counts.get(mtg_num).copied().unwrap_or(0);
        let sources = source_counts.get(mtg_num).copied().unwrap_or(0);
        (1..=detectors)
            .flat_map(move |detector| (1..=sources).map(move |source| (mtg_num + 1, detector, source)))
    })
}

/// Builds the ordered label list for all montages.
///
/// `detector_counts[m]` and `source_counts[m]` describe montage `m`.
pub fn channel_labels(
    detector_counts: &[usize],
    source_counts: &[usize],
    montage_names: &[char],
) -> Vec<String> {
    channel_numbers(detector_counts, source_counts, montage_names)
        .map(|(montage, detector, source)| format_label(source, detector, montage))
        .collect()
}

/// Same ordering as [`channel_labels`], with the channel numbers and kind attached.
pub fn channel_infos(
    detector_counts: &[usize],
    source_counts: &[usize],
    montage_names: &[char],
    kind: ChannelKind,
) -> Vec<ChannelInfo> {
    channel_numbers(detector_counts, source_counts, montage_names)
        .map(|(montage, detector, source)| ChannelInfo {
            label: format_label(source, detector, montage),
            kind,
            montage,
            source,
            detector,
        })
        .collect()
}

pub fn format_label(source: usize, detector: usize, montage: usize) -> String {
    format!("S{}_D{}_{}", source, detector, montage)
}

/// Decodes `S{source}_D{detector}_{montage}` into its 1-based numbers.
pub fn parse_label(label: &str) -> Option<(usize, usize, usize)> {
    let rest = label.strip_prefix('S')?;
    let (source, rest) = rest.split_once("_D")?;
    let (detector, montage) = rest.split_once('_')?;
    Some((source.parse().ok()?, detector.parse().ok()?, montage.parse().ok()?))
}
