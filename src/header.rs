use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use crate::channels::DETECTOR_LETTERS;
use crate::types::*;

// Header markers written by the BOXY acquisition software
const DATA_ENDS: &str = "#DATA ENDS";
const DATA_BEGINS: &str = "#DATA BEGINS";
const DETECTOR_CHANNELS: &str = "Detector Channels";
const EXTERNAL_MUX_CHANNELS: &str = "External MUX Channels";
const AUXILIARY_CHANNELS: &str = "Auxiliary Channels";
const CCF_FREQUENCY: &str = "Waveform (CCF) Frequency (Hz)";
const UPDATE_RATE: &str = "Update Rate (Hz)";
// Older BOXY versions misspell the label
const UPDATE_RATE_LEGACY: &str = "Updata Rate (Hz)";
const EXMUX_MARKER: &str = "exmux";

/// Lines between `#DATA BEGINS` and the start line (column names, then a skipped line).
const DATA_START_OFFSET: usize = 2;

const FILE_BUFFER_SIZE: usize = 65536;

/// Scans the header of a BOXY file and returns its descriptor.
///
/// The file is read line by line until `#DATA ENDS`; the handle is closed on
/// return, including on parse failures.
///
/// # Errors
///
/// Returns [`BoxyError::Format`] if the terminator, the data-start marker,
/// the detector or source count, or the sample rate is missing, if a
/// header value does not parse, or if more detectors are declared than
/// there are detector letters.
pub fn scan_header<P: AsRef<Path>>(path: P) -> Result<RecordingDescriptor> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| BoxyError::io(path, e))?;
    let reader = BufReader::with_capacity(FILE_BUFFER_SIZE, file);
    scan_header_from(reader, path)
}

/// Scans a BOXY header from any buffered reader.
///
/// `path` is only recorded in the descriptor and in error messages.
pub fn scan_header_from<R: BufRead>(reader: R, path: &Path) -> Result<RecordingDescriptor> {
    let mut detector_count = None;
    let mut source_count = None;
    let mut aux_count = None;
    let mut modulation_frequency = None;
    let mut sample_rate = None;
    let mut start_line = None;
    let mut end_line = None;
    let mut layout = FileLayout::Parsed;

    for (index, line) in reader.split(b'\n').enumerate() {
        let line_num = index + 1;
        let bytes = line.map_err(|e| BoxyError::io(path, e))?;
        let line = String::from_utf8_lossy(&bytes);
        let line = line.trim_end_matches('\r');

        if line.contains(DATA_ENDS) {
            end_line = Some(line_num - 1);
            break;
        }

        if line.contains(DETECTOR_CHANNELS) {
            detector_count = Some(leading_value::<usize>(line, path, line_num)?);
        } else if line.contains(EXTERNAL_MUX_CHANNELS) {
            source_count = Some(leading_value::<usize>(line, path, line_num)?);
        } else if line.contains(AUXILIARY_CHANNELS) {
            aux_count = Some(leading_value::<usize>(line, path, line_num)?);
        } else if line.contains(CCF_FREQUENCY) {
            modulation_frequency = Some(leading_value::<f64>(line, path, line_num)?);
        } else if line.contains(UPDATE_RATE) || line.contains(UPDATE_RATE_LEGACY) {
            sample_rate = Some(leading_value::<f64>(line, path, line_num)?);
        } else if line.contains(DATA_BEGINS) {
            start_line = Some(line_num + DATA_START_OFFSET);
        } else if line.contains(EXMUX_MARKER) {
            layout = FileLayout::NonParsed;
        }
    }

    let end_line = end_line.ok_or_else(|| {
        BoxyError::format(path, format!("missing '{}' marker", DATA_ENDS))
    })?;
    let start_line = start_line.ok_or_else(|| {
        BoxyError::format(path, format!("missing '{}' marker", DATA_BEGINS))
    })?;
    let detector_count = detector_count.ok_or_else(|| missing_label(path, DETECTOR_CHANNELS))?;
    let source_count = source_count.ok_or_else(|| missing_label(path, EXTERNAL_MUX_CHANNELS))?;
    let sample_rate = sample_rate.ok_or_else(|| missing_label(path, UPDATE_RATE))?;

    // Detectors are named by a single letter in the column headers
    if detector_count > DETECTOR_LETTERS.len() {
        return Err(BoxyError::format(
            path,
            format!(
                "{} detectors declared, at most {} are supported",
                detector_count,
                DETECTOR_LETTERS.len()
            ),
        ));
    }

    if end_line < start_line {
        return Err(BoxyError::format(
            path,
            format!(
                "data region ends on line {} before it starts on line {}",
                end_line, start_line
            ),
        ));
    }

    let descriptor = RecordingDescriptor {
        path: path.to_path_buf(),
        detector_count,
        source_count,
        aux_count: aux_count.unwrap_or(0),
        modulation_frequency,
        sample_rate,
        start_line,
        end_line,
        layout,
    };

    log::debug!(
        "{}: {} detectors, {} sources, {:.2} Hz, lines {}..={}, {:?}",
        path.display(),
        descriptor.detector_count,
        descriptor.source_count,
        descriptor.sample_rate,
        descriptor.start_line,
        descriptor.end_line,
        descriptor.layout
    );

    Ok(descriptor)
}

// Header values are the first whitespace-delimited token on their line
fn leading_value<T: FromStr>(line: &str, path: &Path, line_num: usize) -> Result<T> {
    let token = line.split_whitespace().next().unwrap_or("");
    token.parse::<T>().map_err(|_| {
        BoxyError::format(
            path,
            format!("line {}: cannot parse value '{}' in '{}'", line_num, token, line.trim()),
        )
    })
}

fn missing_label(path: &Path, label: &str) -> BoxyError {
    BoxyError::format(path, format!("header has no '{}' line", label))
}
