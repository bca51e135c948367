//! Dense per-event amplitude storage.

use std::path::Path;

use num_complex::Complex32;
use pwa_core::{ErrorInfo, PwaError};
use tracing::debug;

use crate::amplitude::AmplitudeModel;
use crate::io::{count_records, read_amp_file, Cuts};

/// Raw amplitude values indexed `[event][group][amp]` in one flat buffer,
/// plus the per-event weights of events that passed the cuts.
///
/// Indices outside the dimensions fixed at construction are programming
/// errors and panic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventAmplitudeTable {
    num_events: usize,
    num_groups: usize,
    max_amps: usize,
    values: Vec<Complex32>,
    weights: Vec<f64>,
}

impl EventAmplitudeTable {
    /// Allocates a zeroed table with unit weights.
    pub fn new(num_events: usize, num_groups: usize, max_amps: usize) -> Self {
        Self {
            num_events,
            num_groups,
            max_amps,
            values: vec![Complex32::new(0.0, 0.0); num_events * num_groups * max_amps],
            weights: vec![1.0; num_events],
        }
    }

    /// Number of stored events.
    pub fn num_events(&self) -> usize {
        self.num_events
    }

    /// Returns `true` when the table holds no events.
    pub fn is_empty(&self) -> bool {
        self.num_events == 0
    }

    fn index(&self, event: usize, group: usize, amp: usize) -> usize {
        assert!(
            event < self.num_events && group < self.num_groups && amp < self.max_amps,
            "table index ({event}, {group}, {amp}) outside ({}, {}, {})",
            self.num_events,
            self.num_groups,
            self.max_amps
        );
        (event * self.num_groups + group) * self.max_amps + amp
    }

    /// Raw value at `(event, group, amp)`.
    pub fn get(&self, event: usize, group: usize, amp: usize) -> Complex32 {
        self.values[self.index(event, group, amp)]
    }

    /// Stores a raw value.
    pub fn set(&mut self, event: usize, group: usize, amp: usize, value: Complex32) {
        let idx = self.index(event, group, amp);
        self.values[idx] = value;
    }

    /// All amplitudes of one group for one event (padded to the widest group).
    pub fn row(&self, event: usize, group: usize) -> &[Complex32] {
        let start = self.index(event, group, 0);
        &self.values[start..start + self.max_amps]
    }

    /// Weight of `event` (its cut value, or 1 without cuts).
    pub fn weight(&self, event: usize) -> f64 {
        assert!(event < self.num_events, "event {event} out of range");
        self.weights[event]
    }

    /// Replaces the per-event weights.
    pub fn set_weights(&mut self, weights: Vec<f64>) -> Result<(), PwaError> {
        if weights.len() != self.num_events {
            return Err(PwaError::Amplitude(
                ErrorInfo::new("weights-size", "weight count differs from event count")
                    .with_context("weights", weights.len().to_string())
                    .with_context("events", self.num_events.to_string()),
            ));
        }
        self.weights = weights;
        Ok(())
    }

    /// Releases the storage.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Reads every amplitude file of `model` from `dir`, keeping the events
    /// that pass `cuts`. A missing file fails the whole load.
    pub fn load(model: &AmplitudeModel, dir: &Path, cuts: Option<&Cuts>) -> Result<Self, PwaError> {
        let num_events = match cuts {
            Some(cuts) => cuts.num_passing(),
            None => match model.each_amp().next() {
                Some((_, _, amp)) => count_records(&dir.join(&amp.file))?,
                None => 0,
            },
        };
        let mut table = Self::new(num_events, model.num_groups(), model.max_amps());
        for (g, a, amp) in model.each_amp() {
            let values = read_amp_file(&dir.join(&amp.file), cuts, num_events)?;
            for (event, value) in values.into_iter().enumerate() {
                table.set(event, g, a, value);
            }
        }
        if let Some(cuts) = cuts {
            table.set_weights(cuts.passing_weights())?;
        }
        debug!(dir = %dir.display(), events = num_events, "loaded amplitude table");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_layout_is_row_major() {
        let mut table = EventAmplitudeTable::new(2, 2, 3);
        table.set(1, 1, 2, Complex32::new(4.0, -1.0));
        assert_eq!(table.row(1, 1)[2], Complex32::new(4.0, -1.0));
        assert_eq!(table.get(1, 1, 2), Complex32::new(4.0, -1.0));
        assert_eq!(table.get(1, 0, 2), Complex32::new(0.0, 0.0));
        assert_eq!(table.weight(0), 1.0);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn out_of_range_index_panics() {
        let table = EventAmplitudeTable::new(1, 1, 1);
        table.get(0, 0, 1);
    }

    #[test]
    fn weights_must_cover_every_event() {
        let mut table = EventAmplitudeTable::new(2, 1, 1);
        assert!(table.set_weights(vec![1.0]).is_err());
        table.set_weights(vec![0.5, 2.0]).unwrap();
        assert_eq!(table.weight(1), 2.0);
        table.clear();
        assert!(table.is_empty());
    }
}
