use ndarray::{s, Array1, Array2, ArrayView1};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::channels::{channel_row, DETECTOR_LETTERS};
use crate::types::*;

const FILE_BUFFER_SIZE: usize = 65536;

/// Metadata columns extracted alongside the optical data when present.
pub const METADATA_KEYS: [&str; 9] = [
    "time", "record", "group", "exmux", "step", "mark", "flag", "aux1", "digaux",
];

// Column names: `A-DC1`, `bias-A`, `time`
fn column_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\w+-\w+|\w+").expect("column name pattern is valid"))
}

/// Column names of a data region with a precomputed name lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Parses the column-name line that precedes the data rows.
    pub fn parse(line: &str) -> Self {
        let names = column_name_pattern()
            .find_iter(line)
            .map(|m| m.as_str().to_string())
            .collect();
        Self::from_names(names)
    }

    pub fn from_names(names: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // A repeated name resolves to its first column
            positions.entry(name.clone()).or_insert(i);
        }
        ColumnIndex { names, positions }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

/// Per-sample metadata columns of one file.
///
/// Columns missing from the file read back as empty slices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataColumns {
    columns: BTreeMap<String, Vec<f64>>,
}

impl MetadataColumns {
    pub fn get(&self, key: &str) -> &[f64] {
        self.columns.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names of every metadata column that was looked up, present or not.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn record(&self) -> &[f64] {
        self.get("record")
    }
}

/// The numeric data region of one BOXY file, rows x columns.
///
/// Short rows are padded with NaN to the column count; extra tokens are dropped.
#[derive(Debug, Clone)]
pub struct DataTable {
    pub columns: ColumnIndex,
    pub values: Array2<f64>,
}

impl DataTable {
    /// Reads the data region described by `descriptor` from disk.
    pub fn read(descriptor: &RecordingDescriptor) -> Result<Self> {
        let path = &descriptor.path;
        let file = File::open(path).map_err(|e| BoxyError::io(path, e))?;
        let reader = BufReader::with_capacity(FILE_BUFFER_SIZE, file);
        Self::from_reader(reader, descriptor)
    }

    pub fn from_reader<R: BufRead>(reader: R, descriptor: &RecordingDescriptor) -> Result<Self> {
        let path = descriptor.path.as_path();
        let column_line = descriptor.start_line.saturating_sub(1);
        let mut columns = ColumnIndex::default();
        let mut rows: Vec<String> = Vec::with_capacity(descriptor.data_rows());

        for (index, line) in reader.split(b'\n').enumerate() {
            let line_num = index + 1;
            if line_num > descriptor.end_line {
                break;
            }
            let bytes = line.map_err(|e| BoxyError::io(path, e))?;
            if line_num != column_line && line_num <= descriptor.start_line {
                continue;
            }
            let text = String::from_utf8_lossy(&bytes).trim_end_matches('\r').to_string();
            if line_num == column_line {
                columns = ColumnIndex::parse(&text);
            } else {
                rows.push(text);
            }
        }

        if rows.len() != descriptor.data_rows() {
            return Err(BoxyError::format(
                path,
                format!(
                    "expected {} data rows, found {}; file changed since its header was scanned?",
                    descriptor.data_rows(),
                    rows.len()
                ),
            ));
        }

        let width = columns.len();
        let mut flat = vec![f64::NAN; rows.len() * width];
        for (row, chunk) in rows.iter().zip(flat.chunks_mut(width.max(1))) {
            for (slot, token) in chunk.iter_mut().zip(row.split_whitespace()) {
                *slot = token.parse().unwrap_or(f64::NAN);
            }
        }
        let values = Array2::from_shape_vec((rows.len(), width), flat)?;

        Ok(DataTable { columns, values })
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns.get(name).map(|i| self.values.column(i))
    }

    fn require_column(&self, name: &str, path: &Path) -> Result<ArrayView1<'_, f64>> {
        self.column(name)
            .ok_or_else(|| BoxyError::format(path, format!("no '{}' column in data header", name)))
    }

    /// Extracts the metadata columns, including one `bias-<detector>` per detector.
    pub fn metadata(&self, detector_count: usize) -> MetadataColumns {
        let keys = METADATA_KEYS
            .iter()
            .map(|k| k.to_string())
            .chain(
                DETECTOR_LETTERS
                    .iter()
                    .take(detector_count)
                    .map(|d| format!("bias-{}", d)),
            );
        let columns = keys
            .map(|key| {
                let values = self.column(&key).map(|c| c.to_vec()).unwrap_or_default();
                (key, values)
            })
            .collect();
        MetadataColumns { columns }
    }
}

impl FileLayout {
    /// Extracts the `width` samples of one (detector, data type, source) series.
    ///
    /// `source` is 1-based.
    #[allow(clippy::too_many_arguments)]
    pub fn extract_series(
        &self,
        table: &DataTable,
        path: &Path,
        detector: char,
        data_type: DataType,
        source: usize,
        source_count: usize,
        width: usize,
    ) -> Result<Array1<f64>> {
        match self {
            FileLayout::Parsed => {
                let name = format!("{}-{}{}", detector, data_type.as_str(), source);
                let column = table.require_column(&name, path)?;
                let mut series = Array1::from_elem(width, f64::NAN);
                let n = width.min(column.len());
                series.slice_mut(s![..n]).assign(&column.slice(s![..n]));
                Ok(series)
            }
            FileLayout::NonParsed => {
                let name = format!("{}-{}", detector, data_type.as_str());
                let column = table.require_column(&name, path)?;
                let limit = record_limit(table, path, source_count).min(column.len());
                let mut series = Array1::from_elem(width, f64::NAN);
                let rows = (source - 1..limit).step_by(source_count.max(1)).take(width);
                for (sample, row) in rows.enumerate() {
                    series[sample] = column[row];
                }
                Ok(series)
            }
        }
    }
}

// `record` counts source cycles, so non-parsed rows end at `last record x sources`
fn record_limit(table: &DataTable, path: &Path, source_count: usize) -> usize {
    let n_rows = table.n_rows();
    let Some(record) = table.column("record") else {
        return n_rows;
    };
    match record.iter().last() {
        Some(&last) if last.is_finite() && last >= 0.0 => {
            let limit = (last as usize).saturating_mul(source_count);
            if limit < n_rows {
                log::warn!(
                    "{}: last record {} covers {} of {} rows",
                    path.display(),
                    last,
                    limit,
                    n_rows
                );
            }
            limit.min(n_rows)
        }
        _ => {
            log::warn!(
                "{}: last record value is not a cycle count, reading all {} rows",
                path.display(),
                n_rows
            );
            n_rows
        }
    }
}

/// Reads one block file into `(detectors x sources x data_types) x samples`.
pub fn read_block(descriptor: &RecordingDescriptor, data_types: &[DataType]) -> Result<Array2<f64>> {
    let table = DataTable::read(descriptor)?;
    assemble_block(&table, descriptor, data_types)
}

/// Redistributes a parsed data table into channel rows.
pub fn assemble_block(
    table: &DataTable,
    descriptor: &RecordingDescriptor,
    data_types: &[DataType],
) -> Result<Array2<f64>> {
    let path = descriptor.path.as_path();
    let detector_count = descriptor.detector_count;
    let source_count = descriptor.source_count;

    let width = descriptor.samples();
    let n_rows = descriptor.channel_count() * data_types.len();
    let mut data = Array2::<f64>::zeros((n_rows, width));

    for (dt_index, &data_type) in data_types.iter().enumerate() {
        for (det_pos, &detector) in DETECTOR_LETTERS.iter().take(detector_count).enumerate() {
            for source in 1..=source_count {
                let row = channel_row(det_pos, source, dt_index, source_count, detector_count);
                let series = descriptor.layout.extract_series(
                    table,
                    path,
                    detector,
                    data_type,
                    source,
                    source_count,
                    width,
                )?;
                data.row_mut(row).assign(&series);
            }
        }
    }

    Ok(data)
}

/// Reads the metadata columns of one file.
pub fn read_metadata(descriptor: &RecordingDescriptor) -> Result<MetadataColumns> {
    let table = DataTable::read(descriptor)?;
    Ok(table.metadata(descriptor.detector_count))
}

/// Source of assembled blocks for segment reads.
pub trait BlockReader: Send + Sync {
    fn read_block(
        &self,
        descriptor: &RecordingDescriptor,
        data_types: &[DataType],
    ) -> Result<Arc<Array2<f64>>>;
}

/// Re-reads the file on every call and keeps nothing in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskBlockReader;

impl BlockReader for DiskBlockReader {
    fn read_block(
        &self,
        descriptor: &RecordingDescriptor,
        data_types: &[DataType],
    ) -> Result<Arc<Array2<f64>>> {
        log::debug!("Reading block {}", descriptor.path.display());
        read_block(descriptor, data_types).map(Arc::new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BlockKey {
    path: PathBuf,
    start_line: usize,
    end_line: usize,
    data_types: Vec<DataType>,
}

/// Read-through cache over another [`BlockReader`].
///
/// Blocks are keyed by file path and data line range.
#[derive(Debug, Default)]
pub struct CachedBlockReader<R> {
    inner: R,
    cache: Mutex<HashMap<BlockKey, Arc<Array2<f64>>>>,
}

impl<R: BlockReader> CachedBlockReader<R> {
    pub fn new(inner: R) -> Self {
        CachedBlockReader {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_blocks(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl<R: BlockReader> BlockReader for CachedBlockReader<R> {
    fn read_block(
        &self,
        descriptor: &RecordingDescriptor,
        data_types: &[DataType],
    ) -> Result<Arc<Array2<f64>>> {
        let key = BlockKey {
            path: descriptor.path.clone(),
            start_line: descriptor.start_line,
            end_line: descriptor.end_line,
            data_types: data_types.to_vec(),
        };
        if let Some(block) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Ok(Arc::clone(block));
        }
        let block = self.inner.read_block(descriptor, data_types)?;
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Arc::clone(&block));
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor(layout: FileLayout, detectors: usize, sources: usize, rows: usize) -> RecordingDescriptor {
        // One header line, column names on line 2, skipped line 3
        RecordingDescriptor {
            path: PathBuf::from("mem.txt"),
            detector_count: detectors,
            source_count: sources,
            aux_count: 0,
            modulation_frequency: None,
            sample_rate: 50.0,
            start_line: 3,
            end_line: 3 + rows,
            layout,
        }
    }

    fn table(text: &str, desc: &RecordingDescriptor) -> DataTable {
        DataTable::from_reader(Cursor::new(text.as_bytes()), desc).unwrap()
    }

    #[test]
    fn column_names_tokenize_hyphenated_words() {
        let columns = ColumnIndex::parse("time\tgroup\tbias-A\tA-DC1\tA-Ph12");
        assert_eq!(columns.names(), &["time", "group", "bias-A", "A-DC1", "A-Ph12"]);
        assert_eq!(columns.get("A-Ph12"), Some(4));
        assert_eq!(columns.get("A-DC2"), None);
    }

    #[test]
    fn short_rows_are_padded_with_nan() {
        let desc = descriptor(FileLayout::Parsed, 1, 2, 2);
        let t = table("#DATA BEGINS\ntime A-DC1 A-DC2\n\n0.0 1.5 2.5\n0.02 3.5\n", &desc);
        assert_eq!(t.values.dim(), (2, 3));
        assert_eq!(t.values[[1, 1]], 3.5);
        assert!(t.values[[1, 2]].is_nan());
    }

    #[test]
    fn unparsable_tokens_become_nan() {
        let desc = descriptor(FileLayout::Parsed, 1, 1, 1);
        let t = table("h\ntime A-DC1\n\n0.0 n/a\n", &desc);
        assert!(t.values[[0, 1]].is_nan());
    }

    #[test]
    fn row_count_mismatch_is_format_error() {
        let desc = descriptor(FileLayout::Parsed, 1, 1, 3);
        let err = DataTable::from_reader(Cursor::new(&b"h\ntime A-DC1\n\n0 1\n"[..]), &desc)
            .unwrap_err();
        assert!(matches!(err, BoxyError::Format { .. }));
    }

    #[test]
    fn absent_metadata_is_empty() {
        let desc = descriptor(FileLayout::Parsed, 2, 1, 2);
        let t = table("h\ntime bias-A A-DC1 B-DC1\n\n0.0 9 1 2\n0.5 9 3 4\n", &desc);
        let meta = t.metadata(2);
        assert_eq!(meta.get("time"), &[0.0, 0.5]);
        assert_eq!(meta.get("bias-A"), &[9.0, 9.0]);
        assert!(meta.get("bias-B").is_empty());
        assert!(meta.record().is_empty());
        assert_eq!(meta.keys().count(), METADATA_KEYS.len() + 2);
    }

    #[test]
    fn parsed_block_places_rows_by_detector_then_source() {
        let desc = descriptor(FileLayout::Parsed, 2, 2, 2);
        let t = table(
            "h\ntime A-AC1 A-AC2 B-AC1 B-AC2\n\n0 11 12 21 22\n1 111 112 121 122\n",
            &desc,
        );
        let block = assemble_block(&t, &desc, &[DataType::Ac]).unwrap();
        assert_eq!(block.dim(), (4, 2));
        assert_eq!(block.column(0).to_vec(), vec![11.0, 12.0, 21.0, 22.0]);
        assert_eq!(block.row(3).to_vec(), vec![22.0, 122.0]);
    }

    #[test]
    fn non_parsed_block_gathers_strided_rows() {
        let desc = descriptor(FileLayout::NonParsed, 1, 2, 4);
        let t = table(
            "h\nexmux record A-DC\n\n1 1 10\n2 2 20\n1 3 11\n2 4 21\n",
            &desc,
        );
        let block = assemble_block(&t, &desc, &[DataType::Dc]).unwrap();
        assert_eq!(block.dim(), (2, 2));
        assert_eq!(block.row(0).to_vec(), vec![10.0, 11.0]);
        assert_eq!(block.row(1).to_vec(), vec![20.0, 21.0]);
    }

    #[test]
    fn non_parsed_stops_at_last_record_cycle() {
        let desc = descriptor(FileLayout::NonParsed, 1, 2, 4);
        // The last record says only one cycle (two rows) is valid
        let t = table(
            "h\nexmux record A-DC\n\n1 1 10\n2 1 20\n1 1 11\n2 1 21\n",
            &desc,
        );
        let block = assemble_block(&t, &desc, &[DataType::Dc]).unwrap();
        assert_eq!(block[[0, 0]], 10.0);
        assert!(block[[0, 1]].is_nan());
        assert_eq!(block[[1, 0]], 20.0);
        assert!(block[[1, 1]].is_nan());
    }

    #[test]
    fn non_parsed_record_counts_source_cycles() {
        // Three sources, four cycles; record holds the cycle number
        let desc = descriptor(FileLayout::NonParsed, 1, 3, 12);
        let mut text = String::from("h\nexmux record A-AC\n\n");
        for cycle in 1..=4 {
            for src in 1..=3 {
                text.push_str(&format!("{} {} {}\n", src, cycle, src * 100 + cycle));
            }
        }
        let t = table(&text, &desc);
        let block = assemble_block(&t, &desc, &[DataType::Ac]).unwrap();
        assert_eq!(block.dim(), (3, 4));
        assert!(block.iter().all(|v| !v.is_nan()));
        assert_eq!(block.row(0).to_vec(), vec![101.0, 102.0, 103.0, 104.0]);
        assert_eq!(block.row(2).to_vec(), vec![301.0, 302.0, 303.0, 304.0]);
    }

    #[test]
    fn row_counting_record_is_capped_at_row_count() {
        // A record that counts rows overshoots; the row count wins
        let desc = descriptor(FileLayout::NonParsed, 1, 2, 4);
        let t = table(
            "h\nexmux record A-DC\n\n1 1 10\n2 2 20\n1 3 11\n2 4 21\n",
            &desc,
        );
        let block = assemble_block(&t, &desc, &[DataType::Dc]).unwrap();
        assert_eq!(block.row(0).to_vec(), vec![10.0, 11.0]);
        assert_eq!(block.row(1).to_vec(), vec![20.0, 21.0]);
    }

    #[test]
    fn missing_data_column_is_format_error() {
        let desc = descriptor(FileLayout::Parsed, 1, 2, 1);
        let t = table("h\ntime A-AC1\n\n0 1\n", &desc);
        let err = assemble_block(&t, &desc, &[DataType::Ac]).unwrap_err();
        assert!(err.to_string().contains("A-AC2"));
    }

    struct CountingReader(AtomicUsize);

    impl BlockReader for CountingReader {
        fn read_block(&self, _: &RecordingDescriptor, _: &[DataType]) -> Result<Arc<Array2<f64>>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Array2::zeros((1, 1))))
        }
    }

    #[test]
    fn cache_reads_each_block_once() {
        let reader = CachedBlockReader::new(CountingReader(AtomicUsize::new(0)));
        let desc = descriptor(FileLayout::Parsed, 1, 1, 1);
        reader.read_block(&desc, &[DataType::Ac]).unwrap();
        reader.read_block(&desc, &[DataType::Ac]).unwrap();
        reader.read_block(&desc, &[DataType::Ph]).unwrap();
        assert_eq!(reader.inner.0.load(Ordering::SeqCst), 2);
        assert_eq!(reader.cached_blocks(), 2);
        reader.clear();
        assert_eq!(reader.cached_blocks(), 0);
    }
}
