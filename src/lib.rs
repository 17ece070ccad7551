//! Reader for BOXY optical imaging recordings (ISS Imagent hardware).
//!
//! A recording is either a single `.txt` file or a set of
//! `<prefix><montage>.<block>` files. Opening scans every header; sample
//! data is parsed from disk on each [`RawBoxy::read_segment`] call and
//! returned as a `[channel, sample]` array whose rows follow
//! [`RawBoxy::channel_names`].

pub mod channels;
pub mod discovery;
pub mod header;
mod reader;
pub mod segment;
pub mod types;

use std::path::Path;

pub use reader::RawBoxy;
pub use segment::{BlockReader, CachedBlockReader, DiskBlockReader, MetadataColumns};
pub use types::*;

/// Opens a BOXY recording.
///
/// `datatype` is one of `"AC"`, `"DC"` or `"Ph"`; anything else is rejected
/// before any file is touched.
///
/// # Examples
///
/// ```no_run
/// use boxy_importer::read_raw_boxy;
///
/// let raw = read_raw_boxy("path/to/Participant-1", "AC", false).unwrap();
/// println!("Sample rate: {} Hz", raw.sample_rate());
/// let data = raw.load_data().unwrap();
/// println!("{} channels x {} samples", data.nrows(), data.ncols());
/// ```
pub fn read_raw_boxy<P: AsRef<Path>>(path: P, datatype: &str, multi_file: bool) -> Result<RawBoxy> {
    let data_type: DataType = datatype.parse()?;
    RawBoxy::open(path, LoadOptions::new(data_type).multi_file(multi_file))
}
