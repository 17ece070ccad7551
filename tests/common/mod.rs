//! Writes synthetic BOXY recordings for integration tests and benchmarks.
//!
//! Every optical value encodes where it came from:
//! `(detector + 1) * 1e6 + data_type * 1e5 + source * 1e4 + sample`,
//! with `data_type` 0 = AC, 1 = DC, 2 = Ph.

#![allow(dead_code)]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const DATA_TYPES: [&str; 3] = ["AC", "DC", "Ph"];
pub const DETECTORS: [char; 26] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

#[derive(Debug, Clone)]
pub struct Fixture {
    pub detectors: usize,
    pub sources: usize,
    pub sample_rate: f64,
    pub samples: usize,
    pub parsed: bool,
    /// Sample number of the first row, so consecutive blocks continue each other
    pub first_sample: usize,
    pub legacy_rate_label: bool,
    pub write_end_marker: bool,
    /// Non-parsed only: `record` counts source cycles instead of rows
    pub record_per_cycle: bool,
}

impl Fixture {
    pub fn parsed(detectors: usize, sources: usize, samples: usize) -> Self {
        Fixture {
            detectors,
            sources,
            sample_rate: 50.0,
            samples,
            parsed: true,
            first_sample: 0,
            legacy_rate_label: false,
            write_end_marker: true,
            record_per_cycle: false,
        }
    }

    pub fn non_parsed(detectors: usize, sources: usize, samples: usize) -> Self {
        Fixture {
            parsed: false,
            ..Fixture::parsed(detectors, sources, samples)
        }
    }

    pub fn starting_at(mut self, first_sample: usize) -> Self {
        self.first_sample = first_sample;
        self
    }

    pub fn write(&self, path: &Path) {
        let mut out = BufWriter::new(File::create(path).unwrap());
        writeln!(out, "#HEADER").unwrap();
        writeln!(out, "BOXY.EXE synthetic recording").unwrap();
        writeln!(out, "{} Detector Channels", self.detectors).unwrap();
        writeln!(out, "{} External MUX Channels", self.sources).unwrap();
        writeln!(out, "0 Auxiliary Channels").unwrap();
        writeln!(out, "110.0 Waveform (CCF) Frequency (Hz)").unwrap();
        let rate_label = if self.legacy_rate_label {
            "Updata Rate (Hz)"
        } else {
            "Update Rate (Hz)"
        };
        writeln!(out, "{} {}", self.sample_rate, rate_label).unwrap();
        writeln!(out, "#DATA BEGINS").unwrap();

        let detectors = &DETECTORS[..self.detectors];
        let mut columns: Vec<String> = Vec::new();
        if !self.parsed {
            columns.push("exmux".into());
        }
        columns.extend(["time", "record", "group", "step", "mark", "flag"].map(String::from));
        columns.extend(detectors.iter().map(|d| format!("bias-{}", d)));
        for d in detectors {
            for dt in DATA_TYPES {
                if self.parsed {
                    columns.extend((1..=self.sources).map(|s| format!("{}-{}{}", d, dt, s)));
                } else {
                    columns.push(format!("{}-{}", d, dt));
                }
            }
        }
        writeln!(out, "{}", columns.join("\t")).unwrap();
        writeln!(out).unwrap();

        if self.parsed {
            for t in 0..self.samples {
                let mut row = self.meta(t, t + 1);
                for det in 0..self.detectors {
                    for dt in 0..DATA_TYPES.len() {
                        for src in 1..=self.sources {
                            row.push(value(det, dt, src, self.first_sample + t).to_string());
                        }
                    }
                }
                writeln!(out, "{}", row.join("\t")).unwrap();
            }
        } else {
            for t in 0..self.samples {
                for src in 1..=self.sources {
                    let record = if self.record_per_cycle {
                        t + 1
                    } else {
                        t * self.sources + src
                    };
                    let mut row = vec![src.to_string()];
                    row.extend(self.meta(t, record));
                    for det in 0..self.detectors {
                        for dt in 0..DATA_TYPES.len() {
                            row.push(value(det, dt, src, self.first_sample + t).to_string());
                        }
                    }
                    writeln!(out, "{}", row.join("\t")).unwrap();
                }
            }
        }

        if self.write_end_marker {
            writeln!(out, "#DATA ENDS").unwrap();
        }
        out.flush().unwrap();
    }

    fn meta(&self, t: usize, record: usize) -> Vec<String> {
        let mut row = vec![
            format!("{:.3}", t as f64 / self.sample_rate),
            record.to_string(),
            "0".into(),
            "1".into(),
            "0".into(),
            "0".into(),
        ];
        row.extend((0..self.detectors).map(|_| "7.5".to_string()));
        row
    }
}

pub fn value(detector: usize, data_type: usize, source: usize, sample: usize) -> f64 {
    (detector + 1) as f64 * 1e6 + data_type as f64 * 1e5 + source as f64 * 1e4 + sample as f64
}

/// Splits a value back into `(detector, data_type, source, sample)`.
pub fn decode(value: f64) -> (usize, usize, usize, usize) {
    let v = value as usize;
    (
        v / 1_000_000 - 1,
        (v / 100_000) % 10,
        (v / 10_000) % 10,
        v % 10_000,
    )
}
