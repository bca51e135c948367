//! Per-event amplitude files and cuts files.
//!
//! An amplitude file is a sequence of 8-byte records, two little-endian
//! `f32` values `(re, im)` per event. A cuts file is text with one line per
//! event: the first column is the event weight (q-value), the optional second
//! column its error.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use num_complex::Complex32;
use pwa_core::{ErrorInfo, PwaError};

/// Size in bytes of one amplitude record.
pub const RECORD_BYTES: usize = 8;

/// Number of leading records inspected by [`is_zero_file`].
pub const ZERO_CHECK_RECORDS: usize = 10;

fn open(path: &Path) -> Result<File, PwaError> {
    File::open(path).map_err(|err| PwaError::io("missing-event-file", path, err))
}

/// Number of records stored in `path`. A trailing partial record is an
/// error.
pub fn count_records(path: &Path) -> Result<usize, PwaError> {
    let meta = fs::metadata(path).map_err(|err| PwaError::io("missing-event-file", path, err))?;
    let len = meta.len() as usize;
    if len % RECORD_BYTES != 0 {
        return Err(PwaError::Amplitude(
            ErrorInfo::new("partial-record", "file size is not a whole number of records")
                .with_context("path", path.display().to_string())
                .with_context("bytes", len.to_string()),
        ));
    }
    Ok(len / RECORD_BYTES)
}

fn decode(record: &[u8; RECORD_BYTES]) -> Complex32 {
    let re = f32::from_le_bytes([record[0], record[1], record[2], record[3]]);
    let im = f32::from_le_bytes([record[4], record[5], record[6], record[7]]);
    Complex32::new(re, im)
}

/// Reads `path`, keeping records whose event passes `cuts`. The number of
/// kept records must equal `expected`.
pub fn read_amp_file(
    path: &Path,
    cuts: Option<&Cuts>,
    expected: usize,
) -> Result<Vec<Complex32>, PwaError> {
    let mut reader = BufReader::new(open(path)?);
    let mut record = [0u8; RECORD_BYTES];
    let mut values = Vec::with_capacity(expected);
    let mut event = 0;
    loop {
        match reader.read_exact(&mut record) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(PwaError::io("event-file-read", path, err)),
        }
        if cuts.map_or(true, |cuts| cuts.passes(event)) {
            values.push(decode(&record));
        }
        event += 1;
    }
    if values.len() != expected {
        return Err(PwaError::Amplitude(
            ErrorInfo::new("event-count", "amplitude file event count mismatch")
                .with_context("path", path.display().to_string())
                .with_context("expected", expected.to_string())
                .with_context("found", values.len().to_string()),
        ));
    }
    Ok(values)
}

/// Writes `values` as amplitude records.
pub fn write_amp_file(path: &Path, values: &[Complex32]) -> Result<(), PwaError> {
    let file = File::create(path).map_err(|err| PwaError::io("event-file-create", path, err))?;
    let mut writer = BufWriter::new(file);
    for value in values {
        writer
            .write_all(&value.re.to_le_bytes())
            .and_then(|_| writer.write_all(&value.im.to_le_bytes()))
            .map_err(|err| PwaError::io("event-file-write", path, err))?;
    }
    writer
        .flush()
        .map_err(|err| PwaError::io("event-file-write", path, err))
}

/// Returns `true` when the first [`ZERO_CHECK_RECORDS`] records of `path`
/// are all zero. Such files carry no signal and are skipped.
pub fn is_zero_file(path: &Path) -> Result<bool, PwaError> {
    let mut reader = BufReader::new(open(path)?);
    let mut record = [0u8; RECORD_BYTES];
    for _ in 0..ZERO_CHECK_RECORDS {
        match reader.read_exact(&mut record) {
            Ok(()) => {
                if decode(&record) != Complex32::new(0.0, 0.0) {
                    return Ok(false);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(PwaError::io("event-file-read", path, err)),
        }
    }
    Ok(true)
}

/// Per-event cut values (weights) and optional errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cuts {
    values: Vec<f64>,
    errors: Option<Vec<f64>>,
}

impl Cuts {
    /// Builds cuts from explicit values.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            errors: None,
        }
    }

    /// Reads a cuts file.
    pub fn read(path: &Path) -> Result<Self, PwaError> {
        let reader = BufReader::new(open(path)?);
        let mut values = Vec::new();
        let mut errors = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| PwaError::io("cuts-read", path, err))?;
            let mut columns = line.split_whitespace();
            let Some(first) = columns.next() else {
                continue;
            };
            let parse = |text: &str| {
                text.parse::<f64>().map_err(|err| {
                    PwaError::Io(
                        ErrorInfo::new("cuts-parse", err.to_string())
                            .with_context("path", path.display().to_string())
                            .with_context("line", (line_no + 1).to_string()),
                    )
                })
            };
            values.push(parse(first)?);
            if let Some(second) = columns.next() {
                errors.push(parse(second)?);
            }
        }
        let errors = (!errors.is_empty() && errors.len() == values.len()).then_some(errors);
        Ok(Self { values, errors })
    }

    /// Number of events listed.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when no events are listed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `true` when `event` passes (cut value > 0). Events beyond the
    /// listed range fail.
    pub fn passes(&self, event: usize) -> bool {
        self.values.get(event).is_some_and(|value| *value > 0.0)
    }

    /// Number of passing events.
    pub fn num_passing(&self) -> usize {
        self.values.iter().filter(|value| **value > 0.0).count()
    }

    /// Cut value of `event`.
    pub fn value(&self, event: usize) -> Option<f64> {
        self.values.get(event).copied()
    }

    /// Error of `event`, when the file carries a second column.
    pub fn error(&self, event: usize) -> Option<f64> {
        self.errors.as_ref().and_then(|errs| errs.get(event).copied())
    }

    /// Weights of the passing events, in event order.
    pub fn passing_weights(&self) -> Vec<f64> {
        self.values.iter().copied().filter(|value| *value > 0.0).collect()
    }

    /// Sum of the non-negative cut values (the data yield).
    pub fn total_yield(&self) -> f64 {
        self.values.iter().filter(|value| **value >= 0.0).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn amp_file_roundtrip_with_cuts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("w=1:.amps");
        let values = vec![
            Complex32::new(1.0, 2.0),
            Complex32::new(-1.0, 0.5),
            Complex32::new(3.0, 0.0),
        ];
        write_amp_file(&path, &values).unwrap();
        assert_eq!(count_records(&path).unwrap(), 3);
        let cuts = Cuts::new(vec![1.0, 0.0, 0.4]);
        let kept = read_amp_file(&path, Some(&cuts), 2).unwrap();
        assert_eq!(kept, vec![values[0], values[2]]);
        let err = read_amp_file(&path, None, 2).unwrap_err();
        assert!(matches!(err, PwaError::Amplitude(_)));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("w=1:.amps");
        write_amp_file(&path, &[Complex32::new(1.0, 2.0)]).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0, 0, 0]);
        fs::write(&path, bytes).unwrap();
        let err = count_records(&path).unwrap_err();
        assert_eq!(err.info().code, "partial-record");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = read_amp_file(&dir.path().join("absent.amps"), None, 0).unwrap_err();
        assert_eq!(err.info().code, "missing-event-file");
    }

    #[test]
    fn zero_files_are_detected() {
        let dir = tempdir().unwrap();
        let zero = dir.path().join("zero.amps");
        let mut values = vec![Complex32::new(0.0, 0.0); 12];
        write_amp_file(&zero, &values).unwrap();
        assert!(is_zero_file(&zero).unwrap());
        values[11] = Complex32::new(1.0, 0.0);
        write_amp_file(&zero, &values).unwrap();
        assert!(is_zero_file(&zero).unwrap());
        values[3] = Complex32::new(0.0, 1.0);
        write_amp_file(&zero, &values).unwrap();
        assert!(!is_zero_file(&zero).unwrap());
    }

    #[test]
    fn cuts_file_parses_weights_and_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cuts.txt");
        fs::write(&path, "0.9 0.1\n-1 0.0\n0.5 0.2\n0 0\n").unwrap();
        let cuts = Cuts::read(&path).unwrap();
        assert_eq!(cuts.len(), 4);
        assert_eq!(cuts.num_passing(), 2);
        assert_eq!(cuts.passing_weights(), vec![0.9, 0.5]);
        assert_eq!(cuts.error(2), Some(0.2));
        assert!((cuts.total_yield() - 1.4).abs() < 1e-12);
        assert!(!cuts.passes(1));
        assert!(!cuts.passes(10));
    }
}
