//! Static assignment of datasets to processes.

use std::ops::Range;

use pwa_core::{ErrorInfo, PwaError};
use serde::{Deserialize, Serialize};

/// Contiguous dataset ranges per process rank; rank 0 is the master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    ranges: Vec<Range<usize>>,
}

impl Partition {
    /// Splits `datasets` over `processes` as evenly as possible; the
    /// remainder goes to the lowest ranks.
    pub fn divide(datasets: usize, processes: usize) -> Result<Self, PwaError> {
        if processes == 0 {
            return Err(PwaError::Config(ErrorInfo::new(
                "no-processes",
                "at least one process is required",
            )));
        }
        let base = datasets / processes;
        let extra = datasets % processes;
        let mut start = 0;
        let ranges = (0..processes)
            .map(|rank| {
                let len = base + usize::from(rank < extra);
                let range = start..start + len;
                start += len;
                range
            })
            .collect();
        Ok(Self { ranges })
    }

    /// Number of processes.
    pub fn processes(&self) -> usize {
        self.ranges.len()
    }

    /// Datasets owned by `rank` (empty for unknown ranks).
    pub fn owned(&self, rank: usize) -> Range<usize> {
        self.ranges.get(rank).cloned().unwrap_or(0..0)
    }

    /// Ranges of every rank.
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }
}
