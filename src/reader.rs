use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::channels::channel_infos;
use crate::discovery::{discover_files, group_montages, single_montage};
use crate::header::scan_header;
use crate::segment::{self, BlockReader, CachedBlockReader, DiskBlockReader, MetadataColumns};
use crate::types::*;

// Largest sample-rate difference still treated as the same rate (Hz)
const SAMPLE_RATE_TOLERANCE: f64 = 0.01;

/// An opened BOXY recording.
///
/// Opening scans every file header once; sample data stays on disk and is
/// re-read by [`RawBoxy::read_segment`].
pub struct RawBoxy {
    path: PathBuf,
    data_type: DataType,
    montages: Vec<Montage>,
    descriptors: Vec<Vec<RecordingDescriptor>>,
    channels: Vec<ChannelInfo>,
    sample_rate: f64,
    n_samples: usize,
    diagnostics: Vec<Diagnostic>,
    reader: Box<dyn BlockReader>,
}

impl fmt::Debug for RawBoxy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RawBoxy")
            .field("path", &self.path)
            .field("data_type", &self.data_type)
            .field("montages", &self.montages.len())
            .field("channels", &self.channels.len())
            .field("sample_rate", &self.sample_rate)
            .field("n_samples", &self.n_samples)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl RawBoxy {
    /// Opens the recording at `path` (a folder, or the `.txt` file itself).
    ///
    /// # Errors
    ///
    /// [`BoxyError::Configuration`] if the expected files are not found,
    /// [`BoxyError::Format`] if a header is malformed or blocks of one montage
    /// disagree on detector or source counts, and
    /// [`BoxyError::Inconsistent`] for any diagnostic when `options.strict` is set.
    pub fn open<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<Self> {
        let tic = Instant::now();
        let path = path.as_ref();
        log::info!("Loading {}", path.display());

        let files = discover_files(path, options.multi_file)?;
        let montages = if options.multi_file {
            group_montages(&files)
        } else {
            single_montage(&files[0])
        };

        let mut descriptors = Vec::with_capacity(montages.len());
        for montage in &montages {
            let mut blocks = Vec::with_capacity(montage.blocks.len());
            for block in &montage.blocks {
                blocks.push(scan_header(&block.path)?);
            }
            check_montage_counts(montage, &blocks)?;
            descriptors.push(blocks);
        }

        let montage_samples: Vec<usize> = descriptors
            .iter()
            .map(|blocks| blocks.iter().map(RecordingDescriptor::samples).sum())
            .collect();
        let n_samples = montage_samples.iter().copied().min().unwrap_or(0);

        let diagnostics = collect_diagnostics(&descriptors, &montage_samples, n_samples);
        for diagnostic in &diagnostics {
            log::warn!("{}", diagnostic);
        }
        if options.strict {
            if let Some(diagnostic) = diagnostics.first() {
                return Err(BoxyError::Inconsistent(diagnostic.clone()));
            }
        }

        let detector_counts: Vec<usize> = descriptors.iter().map(|b| b[0].detector_count).collect();
        let source_counts: Vec<usize> = descriptors.iter().map(|b| b[0].source_count).collect();
        let montage_names: Vec<char> = montages.iter().map(|m| m.name).collect();
        let channels = channel_infos(
            &detector_counts,
            &source_counts,
            &montage_names,
            options.data_type.channel_kind(),
        );

        let sample_rate = descriptors[0][0].sample_rate;

        let reader: Box<dyn BlockReader> = if options.cache_blocks {
            Box::new(CachedBlockReader::new(DiskBlockReader))
        } else {
            Box::new(DiskBlockReader)
        };

        log::info!(
            "Opened {} file(s), {} montage(s), {} {} channels, {} samples at {:.2} Hz in {:.3} s",
            files.len(),
            montages.len(),
            channels.len(),
            options.data_type,
            n_samples,
            sample_rate,
            tic.elapsed().as_secs_f64()
        );

        Ok(RawBoxy {
            path: path.to_path_buf(),
            data_type: options.data_type,
            montages,
            descriptors,
            channels,
            sample_rate,
            n_samples,
            diagnostics,
            reader,
        })
    }

    /// Reads samples `start..=stop` of every channel.
    ///
    /// Returns an array of shape `[n_channels, stop - start + 1]`. Only the
    /// blocks overlapping the range are read, each at most once.
    pub fn read_segment(&self, start: usize, stop: usize) -> Result<Array2<f64>> {
        if start > stop || stop >= self.n_samples {
            return Err(BoxyError::InvalidRange {
                start,
                stop,
                n_samples: self.n_samples,
            });
        }
        let end = stop + 1;

        let mut montage_data = Vec::with_capacity(self.montages.len());
        for blocks in &self.descriptors {
            // Blocks overlapping the range, with the overlap in block-local samples
            let mut pieces: Vec<(Arc<Array2<f64>>, usize, usize)> = Vec::new();
            let mut offset = 0;
            for descriptor in blocks {
                let width = descriptor.samples();
                let lo = start.max(offset);
                let hi = end.min(offset + width);
                if lo < hi {
                    let block = self.reader.read_block(descriptor, &[self.data_type])?;
                    pieces.push((block, lo - offset, hi - offset));
                }
                offset += width;
                if offset >= end {
                    break;
                }
            }
            let views: Vec<ArrayView2<f64>> = pieces
                .iter()
                .map(|(block, lo, hi)| block.slice(s![.., *lo..*hi]))
                .collect();
            montage_data.push(concatenate(Axis(1), &views)?);
        }

        let views: Vec<ArrayView2<f64>> = montage_data.iter().map(|m| m.view()).collect();
        let data = concatenate(Axis(0), &views)?;
        log::debug!("Read segment {}..={} with shape {:?}", start, stop, data.dim());
        Ok(data)
    }

    /// Reads the whole recording.
    pub fn load_data(&self) -> Result<Array2<f64>> {
        if self.n_samples == 0 {
            return Ok(Array2::zeros((self.channels.len(), 0)));
        }
        self.read_segment(0, self.n_samples - 1)
    }

    /// Reads the metadata columns (`time`, `record`, `bias-A`, ...) of one block.
    pub fn read_metadata(&self, montage: usize, block: usize) -> Result<MetadataColumns> {
        let descriptor = self
            .descriptors
            .get(montage)
            .and_then(|blocks| blocks.get(block))
            .ok_or_else(|| {
                BoxyError::Configuration(format!(
                    "No block {} in montage {} of {}",
                    block,
                    montage,
                    self.path.display()
                ))
            })?;
        segment::read_metadata(descriptor)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn montages(&self) -> &[Montage] {
        &self.montages
    }

    /// Header descriptors, indexed by montage then block.
    pub fn descriptors(&self) -> &[Vec<RecordingDescriptor>] {
        &self.descriptors
    }

    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.label.as_str()).collect()
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Modulation frequency of the first file, when the header declares one.
    pub fn modulation_frequency(&self) -> Option<f64> {
        self.descriptors[0][0].modulation_frequency
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// First sample index, always 0.
    pub fn first_samp(&self) -> usize {
        0
    }

    /// Last valid sample index, `None` for an empty recording.
    pub fn last_samp(&self) -> Option<usize> {
        self.n_samples.checked_sub(1)
    }

    /// Duration of the recording in seconds.
    pub fn duration(&self) -> f64 {
        self.n_samples as f64 / self.sample_rate
    }

    /// Sample times in seconds.
    pub fn times(&self) -> Array1<f64> {
        Array1::from_iter((0..self.n_samples).map(|i| i as f64 / self.sample_rate))
    }

    /// Soft inconsistencies found while opening.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Blocks of one montage must agree on detector and source counts.
fn check_montage_counts(montage: &Montage, blocks: &[RecordingDescriptor]) -> Result<()> {
    let first = &blocks[0];
    for block in &blocks[1..] {
        if block.detector_count != first.detector_count || block.source_count != first.source_count
        {
            return Err(BoxyError::format(
                &block.path,
                format!(
                    "montage {} mixes {} detectors x {} sources with {} x {}",
                    montage.name,
                    first.detector_count,
                    first.source_count,
                    block.detector_count,
                    block.source_count
                ),
            ));
        }
    }
    Ok(())
}

fn collect_diagnostics(
    descriptors: &[Vec<RecordingDescriptor>],
    montage_samples: &[usize],
    n_samples: usize,
) -> Vec<Diagnostic> {
    let all: Vec<&RecordingDescriptor> = descriptors.iter().flatten().collect();
    let mut diagnostics = Vec::new();

    let start_lines: Vec<usize> = all.iter().map(|d| d.start_line).collect();
    if !all_equal(&start_lines) {
        diagnostics.push(Diagnostic::StartLinesDiffer(start_lines));
    }

    let end_lines: Vec<usize> = all.iter().map(|d| d.end_line).collect();
    if !all_equal(&end_lines) {
        diagnostics.push(Diagnostic::EndLinesDiffer(end_lines));
    }

    let lengths: Vec<usize> = all.iter().map(|d| d.data_rows()).collect();
    if !all_equal(&lengths) {
        diagnostics.push(Diagnostic::DataLengthsDiffer(lengths));
    }

    let rates: Vec<f64> = all.iter().map(|d| d.sample_rate).collect();
    if rates
        .iter()
        .any(|r| (r - rates[0]).abs() > SAMPLE_RATE_TOLERANCE)
    {
        diagnostics.push(Diagnostic::SampleRatesDiffer(rates));
    }

    if !all_equal(montage_samples) {
        diagnostics.push(Diagnostic::MontageLengthsDiffer {
            lengths: montage_samples.to_vec(),
            kept: n_samples,
        });
    }

    diagnostics
}

fn all_equal(values: &[usize]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}
