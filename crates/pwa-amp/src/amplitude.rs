//! Amplitudes, coherence groups and the bound amplitude model.

use std::sync::Arc;

use globset::Glob;
use num_complex::Complex64;
use pwa_core::{ErrorInfo, FileTags, ParamId, PwaError};

use crate::kernel::{AmplitudeKernel, Kernel, KernelArgs, KinematicPoint};
use crate::table::EventAmplitudeTable;

/// One amplitude: a per-event file plus the kernel forming its coupling.
#[derive(Debug, Clone)]
pub struct Amplitude {
    /// Per-event file name (no directory).
    pub file: String,
    /// Tags parsed from the file name.
    pub tags: FileTags,
    /// Kernel handle to minimizer parameter bindings.
    pub bindings: Vec<(String, ParamId)>,
    /// Value/derivative kernel, shared between amplitudes built by one rule.
    pub kernel: Arc<Kernel>,
    /// Diagnostic switch; unused amplitudes contribute nothing.
    pub used: bool,
}

impl Amplitude {
    /// Creates a used amplitude for `file`.
    pub fn new(file: impl Into<String>, kernel: Arc<Kernel>) -> Self {
        let file = file.into();
        Self {
            tags: FileTags::parse(&file),
            file,
            bindings: Vec::new(),
            kernel,
            used: true,
        }
    }

    /// Binds kernel handle `handle` to minimizer parameter `id`.
    pub fn bind_param(mut self, handle: impl Into<String>, id: ParamId) -> Self {
        self.bindings.push((handle.into(), id));
        self
    }

    /// Returns `true` when parameter `id` is bound to this amplitude.
    pub fn uses_param(&self, id: ParamId) -> bool {
        self.bindings.iter().any(|(_, bound)| *bound == id)
    }
}

/// Amplitudes summed coherently before squaring.
#[derive(Debug, Clone)]
pub struct CoherenceGroup {
    /// Coherence tag string, e.g. `hel=+:m=1`.
    pub key: String,
    /// Member amplitudes in table order.
    pub amps: Vec<Amplitude>,
}

impl CoherenceGroup {
    /// Creates an empty group.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            amps: Vec::new(),
        }
    }
}

/// Coherence groups plus their current bound coupling values.
///
/// Layout of the bound buffers is row-major `[group][amp]` with stride
/// `max_amps`; padding slots stay zero.
#[derive(Debug, Clone)]
pub struct AmplitudeModel {
    groups: Vec<CoherenceGroup>,
    max_amps: usize,
    values: Vec<Complex64>,
    derivs: Vec<Vec<(ParamId, Complex64)>>,
}

impl AmplitudeModel {
    /// Builds a model from its groups.
    pub fn new(groups: Vec<CoherenceGroup>) -> Self {
        let max_amps = groups.iter().map(|g| g.amps.len()).max().unwrap_or(0);
        let slots = groups.len() * max_amps;
        Self {
            groups,
            max_amps,
            values: vec![Complex64::new(0.0, 0.0); slots],
            derivs: vec![Vec::new(); slots],
        }
    }

    /// Coherence groups.
    pub fn groups(&self) -> &[CoherenceGroup] {
        &self.groups
    }

    /// Number of groups.
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Size of the largest group.
    pub fn max_amps(&self) -> usize {
        self.max_amps
    }

    /// Total number of amplitudes.
    pub fn num_amps(&self) -> usize {
        self.groups.iter().map(|g| g.amps.len()).sum()
    }

    /// Iterates over `(group, amp, amplitude)`.
    pub fn each_amp(&self) -> impl Iterator<Item = (usize, usize, &Amplitude)> {
        self.groups.iter().enumerate().flat_map(|(g, group)| {
            group
                .amps
                .iter()
                .enumerate()
                .map(move |(a, amp)| (g, a, amp))
        })
    }

    fn slot(&self, group: usize, amp: usize) -> usize {
        assert!(
            group < self.groups.len() && amp < self.max_amps,
            "amplitude slot ({group}, {amp}) out of range"
        );
        group * self.max_amps + amp
    }

    /// Evaluates every used kernel at `params` (and `vars` for
    /// cross-section points). Derivatives are filled when `with_derivs`.
    pub fn bind(
        &mut self,
        params: &[f64],
        vars: Option<&KinematicPoint>,
        with_derivs: bool,
    ) -> Result<(), PwaError> {
        for (g, group) in self.groups.iter().enumerate() {
            for (a, amp) in group.amps.iter().enumerate() {
                let slot = g * self.max_amps + a;
                let derivs = &mut self.derivs[slot];
                derivs.clear();
                if !amp.used {
                    self.values[slot] = Complex64::new(0.0, 0.0);
                    continue;
                }
                let args = KernelArgs::new(&amp.bindings, params, vars);
                self.values[slot] = amp.kernel.value(&args).map_err(|err| in_file(err, amp))?;
                if with_derivs {
                    for (handle, id) in &amp.bindings {
                        let d = amp
                            .kernel
                            .derivative(handle, &args)
                            .map_err(|err| in_file(err, amp))?;
                        derivs.push((*id, d));
                    }
                }
            }
        }
        Ok(())
    }

    /// Bound coupling of amplitude `(group, amp)`.
    pub fn value(&self, group: usize, amp: usize) -> Complex64 {
        self.values[self.slot(group, amp)]
    }

    /// Bound non-zero-capable derivatives of amplitude `(group, amp)`.
    pub fn derivs(&self, group: usize, amp: usize) -> &[(ParamId, Complex64)] {
        &self.derivs[self.slot(group, amp)]
    }

    /// Coherent sum `Σ_a V_ga · A[event][g][a]` of one group.
    pub fn group_total(
        &self,
        table: &EventAmplitudeTable,
        event: usize,
        group: usize,
    ) -> Complex64 {
        let row = table.row(event, group);
        let values = &self.values[group * self.max_amps..(group + 1) * self.max_amps];
        row.iter()
            .zip(values)
            .fold(Complex64::new(0.0, 0.0), |acc, (raw, value)| {
                acc + *value * Complex64::new(raw.re as f64, raw.im as f64)
            })
    }

    /// Intensity of `event`: groups add incoherently.
    pub fn intensity(&self, table: &EventAmplitudeTable, event: usize) -> f64 {
        (0..self.groups.len())
            .map(|g| self.group_total(table, event, g).norm_sqr())
            .sum()
    }

    /// Derivative of the intensity of `event` with respect to parameter `id`.
    pub fn d_intensity(&self, table: &EventAmplitudeTable, event: usize, id: ParamId) -> f64 {
        let mut total = 0.0;
        for (g, group) in self.groups.iter().enumerate() {
            let row = table.row(event, g);
            let mut d_sum = Complex64::new(0.0, 0.0);
            let mut touched = false;
            for a in 0..group.amps.len() {
                for (bound, d) in self.derivs(g, a) {
                    if *bound == id {
                        let raw = row[a];
                        d_sum += *d * Complex64::new(raw.re as f64, raw.im as f64);
                        touched = true;
                    }
                }
            }
            if touched {
                total += 2.0 * (self.group_total(table, event, g).conj() * d_sum).re;
            }
        }
        total
    }

    /// Adds `factor · dI(event)/dp` into `out[p]` for every bound parameter.
    /// `out` must cover every bound id.
    pub fn add_d_intensity(
        &self,
        table: &EventAmplitudeTable,
        event: usize,
        factor: f64,
        out: &mut [f64],
    ) {
        for (g, group) in self.groups.iter().enumerate() {
            let total = self.group_total(table, event, g).conj();
            let row = table.row(event, g);
            for (a, raw) in row.iter().enumerate().take(group.amps.len()) {
                let amp = Complex64::new(raw.re as f64, raw.im as f64);
                for (id, d) in self.derivs(g, a) {
                    out[id.index()] += factor * 2.0 * (total * *d * amp).re;
                }
            }
        }
    }

    /// Re-enables every amplitude.
    pub fn use_all(&mut self) {
        for group in &mut self.groups {
            for amp in &mut group.amps {
                amp.used = true;
            }
        }
    }

    /// Uses only amplitudes whose file name matches glob `pattern`; returns
    /// how many matched.
    pub fn use_matching(&mut self, pattern: &str) -> Result<usize, PwaError> {
        let matcher = Glob::new(pattern)
            .map_err(|err| {
                PwaError::Config(
                    ErrorInfo::new("glob", err.to_string()).with_context("pattern", pattern),
                )
            })?
            .compile_matcher();
        let mut matched = 0;
        for group in &mut self.groups {
            for amp in &mut group.amps {
                amp.used = matcher.is_match(&amp.file);
                matched += usize::from(amp.used);
            }
        }
        Ok(matched)
    }

    /// Use switches of every amplitude in group order.
    pub fn use_mask(&self) -> Vec<bool> {
        self.groups
            .iter()
            .flat_map(|group| group.amps.iter().map(|amp| amp.used))
            .collect()
    }

    /// Restores switches taken with [`AmplitudeModel::use_mask`].
    pub fn set_use_mask(&mut self, mask: &[bool]) {
        let amps = self.groups.iter_mut().flat_map(|group| group.amps.iter_mut());
        for (amp, used) in amps.zip(mask) {
            amp.used = *used;
        }
    }
}

fn in_file(err: PwaError, amp: &Amplitude) -> PwaError {
    match err {
        PwaError::Amplitude(info) => {
            PwaError::Amplitude(info.with_context("file", amp.file.clone()))
        }
        other => other,
    }
}
