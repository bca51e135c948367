use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use num_complex::{Complex32, Complex64};
use pwa_amp::{
    Amplitude, AmplitudeModel, CoherenceGroup, EventAmplitudeTable, Expr, ExprKernel, Kernel,
};
use pwa_core::{FcnFlag, ParamId};
use pwa_like::Dataset;
use pwa_norm::{CrossTermMatrix, NormalizationIntegral, ScaleChain, ScaleFactor};

const EVENTS: usize = 20_000;
const WAVES: usize = 8;

fn build_dataset() -> (Dataset, Vec<f64>) {
    let kernel = Arc::new(Kernel::Expr(ExprKernel::new(Expr::polar(
        Expr::par("mag"),
        Expr::par("phase"),
    ))));
    let mut groups = Vec::new();
    let mut next_id = 1;
    for hel in ["+", "-"] {
        let mut group = CoherenceGroup::new(format!("hel={hel}"));
        for wave in 0..WAVES {
            let amp = Amplitude::new(format!("hel={hel}:wave={wave}:.amps"), kernel.clone())
                .bind_param("mag", ParamId::new(next_id).unwrap())
                .bind_param("phase", ParamId::new(next_id + 1).unwrap());
            next_id += 2;
            group.amps.push(amp);
        }
        groups.push(group);
    }
    let model = AmplitudeModel::new(groups);

    let mut table = EventAmplitudeTable::new(EVENTS, 2, WAVES);
    for event in 0..EVENTS {
        for group in 0..2 {
            for wave in 0..WAVES {
                let x = (event * 31 + group * 7 + wave * 3) as f32 * 0.001;
                table.set(event, group, wave, Complex32::new(x.cos(), x.sin() * 0.5));
            }
        }
    }
    let matrices = (0..2)
        .map(|_| {
            let mut matrix = CrossTermMatrix::zeros(WAVES);
            for i in 0..WAVES {
                for j in 0..WAVES {
                    let value = if i == j { 1.0 } else { 0.1 / (1 + i + j) as f64 };
                    matrix.set(i, j, Complex64::new(value, 0.0));
                }
            }
            matrix
        })
        .collect();
    let chain = ScaleChain::new(vec![ScaleFactor::new("total-events-to-amps-ratio", 2.0, 0.0)])
        .unwrap();
    let norm = NormalizationIntegral::new(matrices, chain);

    let mut params = vec![0.0];
    for idx in 0..(2 * WAVES) {
        params.push(1.0 + 0.05 * idx as f64);
        params.push(0.1 * idx as f64);
    }
    (Dataset::from_events("bench", model, table, norm), params)
}

fn likelihood_benchmark(c: &mut Criterion) {
    let (mut dataset, params) = build_dataset();
    c.bench_function("likelihood/value", |b| {
        b.iter(|| {
            let value = dataset
                .evaluate(FcnFlag::Value, black_box(&params), None)
                .unwrap();
            black_box(value);
        })
    });
    let mut derivs = vec![0.0; params.len()];
    c.bench_function("likelihood/gradient", |b| {
        b.iter(|| {
            derivs.iter_mut().for_each(|d| *d = 0.0);
            let value = dataset
                .evaluate(FcnFlag::Gradient, black_box(&params), Some(&mut derivs))
                .unwrap();
            black_box(value);
        })
    });
}

criterion_group!(benches, likelihood_benchmark);
criterion_main!(benches);
