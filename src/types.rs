use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

/// Measured quantity to extract from a BOXY recording.
///
/// Every source-detector pair carries all three quantities; one recording
/// handle returns exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Amplitude at the modulation frequency
    #[serde(rename = "AC")]
    Ac,
    /// Mean intensity
    #[serde(rename = "DC")]
    Dc,
    /// Phase shift
    #[serde(rename = "Ph")]
    Ph,
}

impl DataType {
    /// The token used for this quantity in BOXY column names (`A-AC1`, `B-Ph`).
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Ac => "AC",
            DataType::Dc => "DC",
            DataType::Ph => "Ph",
        }
    }

    /// The channel kind every channel of this data type is tagged with.
    pub fn channel_kind(&self) -> ChannelKind {
        match self {
            DataType::Ph => ChannelKind::FnirsFdPhase,
            DataType::Ac | DataType::Dc => ChannelKind::FnirsCwAmplitude,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = BoxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "AC" => Ok(DataType::Ac),
            "DC" => Ok(DataType::Dc),
            "Ph" => Ok(DataType::Ph),
            other => Err(BoxyError::Configuration(format!(
                "Expect AC, DC, or Ph, got {}",
                other
            ))),
        }
    }
}

/// Channel type tag handed to downstream containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Continuous-wave amplitude (AC or DC)
    FnirsCwAmplitude,
    /// Frequency-domain phase
    FnirsFdPhase,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::FnirsCwAmplitude => "fnirs_cw_amplitude",
            ChannelKind::FnirsFdPhase => "fnirs_fd_phase",
        }
    }
}

/// On-disk row layout of the optical samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileLayout {
    /// One row per timepoint, one column per source (`A-DC1`, `A-DC2`, ...)
    Parsed,
    /// Rows interleave sources in a repeating cycle; columns carry no source suffix
    NonParsed,
}

/// Header facts for one physical BOXY file.
///
/// Line numbers are 1-based. Data rows are the lines strictly after
/// `start_line` up to and including `end_line`; the column names sit on
/// `start_line - 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingDescriptor {
    /// File the descriptor was scanned from
    pub path: PathBuf,
    /// Number of detectors (`Detector Channels`)
    pub detector_count: usize,
    /// Number of sources (`External MUX Channels`)
    pub source_count: usize,
    /// Number of auxiliary channels (`Auxiliary Channels`)
    pub aux_count: usize,
    /// Modulation frequency in Hz (`Waveform (CCF) Frequency (Hz)`)
    pub modulation_frequency: Option<f64>,
    /// Sample rate in Hz (`Update Rate (Hz)`)
    pub sample_rate: f64,
    /// Line two below `#DATA BEGINS`
    pub start_line: usize,
    /// Line just before `#DATA ENDS`
    pub end_line: usize,
    /// Row layout of the data region
    pub layout: FileLayout,
}

impl RecordingDescriptor {
    /// Number of data rows in the file.
    pub fn data_rows(&self) -> usize {
        self.end_line.saturating_sub(self.start_line)
    }

    /// Number of timepoints this file contributes.
    ///
    /// Non-parsed files spend `source_count` rows per timepoint.
    pub fn samples(&self) -> usize {
        match self.layout {
            FileLayout::Parsed => self.data_rows(),
            FileLayout::NonParsed => {
                if self.source_count == 0 {
                    0
                } else {
                    self.data_rows() / self.source_count
                }
            }
        }
    }

    /// Number of optical channels (detectors x sources) in the file.
    pub fn channel_count(&self) -> usize {
        self.detector_count * self.source_count
    }
}

/// A block is one file of a montage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Numeric block identifier as written in the file extension (`"001"`)
    pub name: String,
    /// Path to the block's file
    pub path: PathBuf,
}

/// A spatial arrangement of optodes, identified by a letter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Montage {
    /// Montage letter (`'a'`, `'b'`, ...)
    pub name: char,
    /// Blocks in time order
    pub blocks: Vec<Block>,
}

/// Information about a single output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Label of the form `S{source}_D{detector}_{montage}`
    pub label: String,
    /// Channel type tag
    pub kind: ChannelKind,
    /// 1-based montage number
    pub montage: usize,
    /// 1-based source number
    pub source: usize,
    /// 1-based detector number
    pub detector: usize,
}

/// A soft inconsistency found while opening a recording.
///
/// These never stop a load unless [`LoadOptions::strict`] is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Files start their data region on different lines
    StartLinesDiffer(Vec<usize>),
    /// Files end their data region on different lines
    EndLinesDiffer(Vec<usize>),
    /// Files hold different numbers of data rows
    DataLengthsDiffer(Vec<usize>),
    /// Files disagree on sample rate; the first file's rate is used
    SampleRatesDiffer(Vec<f64>),
    /// Montages hold different numbers of timepoints; all are cut to `kept`
    MontageLengthsDiffer { lengths: Vec<usize>, kept: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Diagnostic::StartLinesDiffer(lines) => write!(f, "Start lines different: {:?}", lines),
            Diagnostic::EndLinesDiffer(lines) => write!(f, "End lines different: {:?}", lines),
            Diagnostic::DataLengthsDiffer(lengths) => {
                write!(f, "Data sizes are different: {:?}", lengths)
            }
            Diagnostic::SampleRatesDiffer(rates) => {
                write!(f, "Sample rates are different: {:?} Hz", rates)
            }
            Diagnostic::MontageLengthsDiffer { lengths, kept } => write!(
                f,
                "Montage lengths are different: {:?}, truncating to {} samples",
                lengths, kept
            ),
        }
    }
}

fn default_data_type() -> DataType {
    DataType::Ac
}

/// Options controlling how a recording is opened.
///
/// # Examples
///
/// ```
/// use boxy_importer::{DataType, LoadOptions};
///
/// let options = LoadOptions::new(DataType::Ph).multi_file(true).strict(true);
/// assert!(options.multi_file);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Quantity to return
    #[serde(default = "default_data_type")]
    pub data_type: DataType,
    /// Load a `<prefix><montage>.<block>` file set instead of a single `.txt`
    pub multi_file: bool,
    /// Turn soft inconsistencies into errors
    pub strict: bool,
    /// Keep parsed blocks in memory between segment reads
    pub cache_blocks: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            data_type: default_data_type(),
            multi_file: false,
            strict: false,
            cache_blocks: false,
        }
    }
}

impl LoadOptions {
    pub fn new(data_type: DataType) -> Self {
        LoadOptions {
            data_type,
            ..Default::default()
        }
    }

    pub fn multi_file(mut self, multi_file: bool) -> Self {
        self.multi_file = multi_file;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn cache_blocks(mut self, cache_blocks: bool) -> Self {
        self.cache_blocks = cache_blocks;
        self
    }
}

/// Error types for the BOXY importer.
#[derive(Debug, thiserror::Error)]
pub enum BoxyError {
    /// Bad caller input: unknown data type, wrong number of files
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The file does not look like a well-formed BOXY recording
    #[error("Format error in {}: {message}", .path.display())]
    Format { path: PathBuf, message: String },
    /// A requested sample range falls outside the recording
    #[error("Invalid sample range {start}..={stop} for recording with {n_samples} samples")]
    InvalidRange {
        start: usize,
        stop: usize,
        n_samples: usize,
    },
    /// A soft inconsistency raised because strict loading was requested
    #[error("Inconsistent recording: {0}")]
    Inconsistent(Diagnostic),
    /// An I/O error occurred while reading a file
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Matrix assembly failed
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl BoxyError {
    pub(crate) fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        BoxyError::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BoxyError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BoxyError>;
