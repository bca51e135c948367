//! Kinematic-variable files: a JSON header describing the variables plus a
//! binary file of little-endian `f64` records, one record per event with one
//! field per variable in header order.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use pwa_core::serde::{read_json, write_json};
use pwa_core::{ErrorInfo, PwaError};
use serde::{Deserialize, Serialize};

use crate::kernel::KinematicPoint;

/// One kinematic variable and its histogram binning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicVariable {
    /// Variable name used in records and kernels.
    pub name: String,
    /// Histogram bin count.
    pub num_bins: usize,
    /// Lower edge of the histogram range.
    pub min: f64,
    /// Upper edge of the histogram range.
    pub max: f64,
    /// Display title.
    #[serde(default)]
    pub title: String,
}

impl KinematicVariable {
    /// Histogram bin holding `value`, or `None` outside `[min, max]`. The
    /// upper edge belongs to the last bin.
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        if self.num_bins == 0 || !(self.min..=self.max).contains(&value) || self.max <= self.min {
            return None;
        }
        let idx = (self.num_bins as f64 * (value - self.min) / (self.max - self.min)) as usize;
        Some(idx.min(self.num_bins - 1))
    }

    /// Centre of bin `index`.
    pub fn bin_center(&self, index: usize) -> f64 {
        self.min + (index as f64 + 0.5) * (self.max - self.min) / self.num_bins as f64
    }
}

/// Header of a kinematic-variable file pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinvarHeader {
    /// Variables in record field order.
    pub kinvars: Vec<KinematicVariable>,
    /// Binary data file, relative to the header's directory.
    pub data_file: String,
}

/// Loaded kinematic-variable file.
#[derive(Debug, Clone, PartialEq)]
pub struct KinvarFile {
    header: KinvarHeader,
    records: Vec<Vec<f64>>,
}

impl KinvarFile {
    /// Reads the header at `header_path` and its data file.
    pub fn open(header_path: &Path) -> Result<Self, PwaError> {
        let header: KinvarHeader = read_json(header_path)?;
        let data_path = data_path(header_path, &header);
        let width = header.kinvars.len();
        let mut reader = BufReader::new(
            File::open(&data_path).map_err(|err| PwaError::io("kinvar-open", &data_path, err))?,
        );
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|err| PwaError::io("kinvar-read", &data_path, err))?;
        let record_bytes = width * 8;
        if width == 0 || bytes.len() % record_bytes != 0 {
            return Err(PwaError::Io(
                ErrorInfo::new("kinvar-size", "data file is not a whole number of records")
                    .with_context("path", data_path.display().to_string())
                    .with_context("bytes", bytes.len().to_string()),
            ));
        }
        let records = bytes
            .chunks_exact(record_bytes)
            .map(|record| {
                record
                    .chunks_exact(8)
                    .map(|field| {
                        let mut raw = [0u8; 8];
                        raw.copy_from_slice(field);
                        f64::from_le_bytes(raw)
                    })
                    .collect()
            })
            .collect();
        Ok(Self { header, records })
    }

    /// Writes `header` and `records` to `header_path` and its data file.
    pub fn write(
        header_path: &Path,
        header: &KinvarHeader,
        records: &[Vec<f64>],
    ) -> Result<(), PwaError> {
        write_json(header_path, header)?;
        let data_path = data_path(header_path, header);
        let file =
            File::create(&data_path).map_err(|err| PwaError::io("kinvar-create", &data_path, err))?;
        let mut writer = BufWriter::new(file);
        for record in records {
            if record.len() != header.kinvars.len() {
                return Err(PwaError::Io(
                    ErrorInfo::new("kinvar-width", "record width differs from header")
                        .with_context("expected", header.kinvars.len().to_string())
                        .with_context("found", record.len().to_string()),
                ));
            }
            for value in record {
                writer
                    .write_all(&value.to_le_bytes())
                    .map_err(|err| PwaError::io("kinvar-write", &data_path, err))?;
            }
        }
        writer
            .flush()
            .map_err(|err| PwaError::io("kinvar-write", &data_path, err))
    }

    /// Variables in record order.
    pub fn kinvars(&self) -> &[KinematicVariable] {
        &self.header.kinvars
    }

    /// Variable named `name`.
    pub fn kinvar(&self, name: &str) -> Option<&KinematicVariable> {
        self.header.kinvars.iter().find(|kv| kv.name == name)
    }

    /// Field position of `name` in each record.
    pub fn index_of(&self, name: &str) -> Result<usize, PwaError> {
        self.header
            .kinvars
            .iter()
            .position(|kv| kv.name == name)
            .ok_or_else(|| {
                PwaError::Config(
                    ErrorInfo::new("unknown-kinvar", "no such kinematic variable")
                        .with_context("name", name),
                )
            })
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when no records were read.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Raw record of `event`.
    pub fn record(&self, event: usize) -> Option<&[f64]> {
        self.records.get(event).map(Vec::as_slice)
    }

    /// Record of `event` keyed by variable name.
    pub fn point(&self, event: usize) -> Option<KinematicPoint> {
        let record = self.record(event)?;
        Some(
            self.header
                .kinvars
                .iter()
                .zip(record)
                .map(|(kv, value)| (kv.name.clone(), *value))
                .collect(),
        )
    }
}

fn data_path(header_path: &Path, header: &KinvarHeader) -> PathBuf {
    match header_path.parent() {
        Some(parent) => parent.join(&header.data_file),
        None => PathBuf::from(&header.data_file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cos_theta() -> KinematicVariable {
        KinematicVariable {
            name: "cos_theta".into(),
            num_bins: 4,
            min: -1.0,
            max: 1.0,
            title: "cos#theta".into(),
        }
    }

    #[test]
    fn bin_index_and_center() {
        let kv = cos_theta();
        assert_eq!(kv.bin_index(-1.0), Some(0));
        assert_eq!(kv.bin_index(0.1), Some(2));
        assert_eq!(kv.bin_index(1.0), Some(3));
        assert_eq!(kv.bin_index(1.5), None);
        assert!((kv.bin_center(0) + 0.75).abs() < 1e-12);
    }

    #[test]
    fn write_then_open() {
        let dir = tempdir().unwrap();
        let header = KinvarHeader {
            kinvars: vec![
                cos_theta(),
                KinematicVariable {
                    name: "phi".into(),
                    num_bins: 10,
                    min: 0.0,
                    max: 6.3,
                    title: String::new(),
                },
            ],
            data_file: "kinvars.dat".into(),
        };
        let records = vec![vec![0.5, 1.0], vec![-0.25, 3.0]];
        let path = dir.path().join("kinvars.json");
        KinvarFile::write(&path, &header, &records).unwrap();
        let file = KinvarFile::open(&path).unwrap();
        assert_eq!(file.len(), 2);
        assert_eq!(file.index_of("phi").unwrap(), 1);
        assert_eq!(file.point(1).unwrap()["cos_theta"], -0.25);
        assert!(file.index_of("t").is_err());
    }
}
