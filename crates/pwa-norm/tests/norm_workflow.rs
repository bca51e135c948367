use std::fs;
use std::path::Path;
use std::sync::Arc;

use approx::assert_relative_eq;
use num_complex::{Complex32, Complex64};
use pwa_amp::{
    write_amp_file, Amplitude, AmplitudeModel, CoherenceGroup, EventAmplitudeTable, Expr,
    ExprKernel, Kernel,
};
use pwa_core::{FcnFlag, ParamId};
use pwa_norm::{
    add_errors, generate, rescale, CrossTermMatrix, GenerateOptions, NormIntDocument, NormIntFile,
    NormalizationIntegral, ScaleChain, ScaleChange, ScaleFactor,
};
use proptest::prelude::*;
use tempfile::tempdir;

const FILES: [&str; 3] = ["hel=+:wave=a:.amps", "hel=+:wave=b:.amps", "hel=-:wave=a:.amps"];
const CUTS: [f64; 4] = [1.0, -1.0, 0.5, 0.0];

fn write_bin(dir: &Path) {
    let columns: [[(f32, f32); 4]; 3] = [
        [(1.0, 0.0), (0.5, 0.5), (0.2, -0.1), (-0.7, 0.3)],
        [(0.0, 1.0), (0.3, 0.0), (0.9, 0.9), (0.1, 0.4)],
        [(0.4, 0.4), (0.1, 0.0), (0.0, 0.2), (0.6, -0.5)],
    ];
    for (file, column) in FILES.iter().zip(columns) {
        let values: Vec<_> = column.iter().map(|(re, im)| Complex32::new(*re, *im)).collect();
        write_amp_file(&dir.join(file), &values).unwrap();
    }
    let cuts: String = CUTS.iter().map(|cut| format!("{cut}\n")).collect();
    fs::write(dir.join("cuts.txt"), cuts).unwrap();
}

fn amp(file: &str, re: u32, im: u32) -> Amplitude {
    let kernel = Arc::new(Kernel::Expr(ExprKernel::new(Expr::cartesian(
        Expr::par("re"),
        Expr::par("im"),
    ))));
    Amplitude::new(file, kernel)
        .bind_param("re", ParamId::new(re).unwrap())
        .bind_param("im", ParamId::new(im).unwrap())
}

fn model() -> AmplitudeModel {
    let mut plus = CoherenceGroup::new("hel=+");
    plus.amps.push(amp(FILES[0], 1, 2));
    plus.amps.push(amp(FILES[1], 3, 4));
    let mut minus = CoherenceGroup::new("hel=-");
    minus.amps.push(amp(FILES[2], 1, 2));
    AmplitudeModel::new(vec![plus, minus])
}

fn options() -> GenerateOptions {
    GenerateOptions {
        coherence_tags: vec!["hel".into()],
        total_events: 100.0,
        cuts_file: Some("cuts.txt".into()),
        scale_factors: vec![ScaleFactor::new("acc", 0.5, 0.1)],
        amp_match: None,
    }
}

const PARAMS: [f64; 5] = [0.0, 1.2, -0.3, 0.4, 0.8];

#[test]
fn stored_integral_matches_direct_intensity_sum() {
    let dir = tempdir().unwrap();
    write_bin(dir.path());
    let opts = options();
    let file = generate(dir.path(), &opts).unwrap();
    let path = dir.path().join(opts.file_name());
    file.store(&path).unwrap();

    let doc = NormIntDocument::load(&path).unwrap();
    assert_eq!(doc.scale_factors[0].value, 25.0);
    assert_eq!(doc.total_scale_factor.value, 12.5);
    assert_eq!(doc.incoherent_wavesets.len(), 2);

    let mut model = model();
    model.bind(&PARAMS, None, false).unwrap();
    let integral = NormalizationIntegral::load(&path, &model).unwrap();
    let norm = integral.calc_norm(FcnFlag::Value, &model, None).unwrap();

    let table = EventAmplitudeTable::load(&model, dir.path(), None).unwrap();
    let direct: f64 = (0..table.num_events())
        .filter(|event| CUTS[*event] >= 0.0)
        .map(|event| model.intensity(&table, event))
        .sum();
    assert_relative_eq!(norm, 12.5 * direct, max_relative = 1e-9);
}

#[test]
fn rescaling_and_inverse_restore_the_norm() {
    let dir = tempdir().unwrap();
    write_bin(dir.path());
    let mut file = generate(dir.path(), &options()).unwrap();
    let mut model = model();
    model.bind(&PARAMS, None, false).unwrap();
    let before = NormalizationIntegral::align(&file, &model)
        .unwrap()
        .calc_norm(FcnFlag::Value, &model, None)
        .unwrap();

    let ratio = rescale(
        &mut file,
        &[
            ScaleChange::Replace(ScaleFactor::new("acc", 2.0, 0.1)),
            ScaleChange::Add(ScaleFactor::new("flux", 3.0, 0.05)),
        ],
    )
    .unwrap();
    assert_relative_eq!(ratio, 12.0);
    let scaled = NormalizationIntegral::align(&file, &model)
        .unwrap()
        .calc_norm(FcnFlag::Value, &model, None)
        .unwrap();
    assert_relative_eq!(scaled, 12.0 * before, max_relative = 1e-12);

    let ratio = rescale(
        &mut file,
        &[
            ScaleChange::Remove("flux".into()),
            ScaleChange::Replace(ScaleFactor::new("acc", 0.5, 0.1)),
        ],
    )
    .unwrap();
    assert_relative_eq!(ratio, 1.0 / 12.0);
    let restored = NormalizationIntegral::align(&file, &model)
        .unwrap()
        .calc_norm(FcnFlag::Value, &model, None)
        .unwrap();
    assert_relative_eq!(restored, before, max_relative = 1e-12);
}

#[test]
fn added_errors_update_the_stored_total() {
    let dir = tempdir().unwrap();
    write_bin(dir.path());
    let mut file = generate(dir.path(), &options()).unwrap();
    add_errors(&mut file, &[("acc".into(), 0.3), (pwa_norm::EVENTS_TO_AMPS_RATIO.into(), 0.4)])
        .unwrap();
    let path = dir.path().join("errors.norm-int.json");
    file.store(&path).unwrap();
    let total = NormIntFile::load(&path).unwrap().chain.total();
    assert_relative_eq!(total.relative_error, 0.5, epsilon = 1e-12);
    assert_relative_eq!(total.error, 6.25, epsilon = 1e-12);
    assert!(add_errors(&mut file, &[("missing".into(), 0.1)]).is_err());
}

#[test]
fn amplitude_without_entry_is_fatal() {
    let dir = tempdir().unwrap();
    write_bin(dir.path());
    let opts = GenerateOptions {
        amp_match: Some("wave=a".into()),
        ..options()
    };
    assert!(opts.file_name().contains("amp_match=wave=a:"));
    let file = generate(dir.path(), &opts).unwrap();
    let err = NormalizationIntegral::align(&file, &model()).unwrap_err();
    assert_eq!(err.info().code, "missing-entry");
}

#[test]
fn constructed_integral_is_hermitian_and_its_gradient_consistent() {
    let mut matrix = CrossTermMatrix::zeros(2);
    matrix.set(0, 0, Complex64::new(1.0, 0.0));
    matrix.set(1, 1, Complex64::new(0.8, 0.0));
    matrix.set(0, 1, Complex64::new(0.5, 0.3));
    let chain = ScaleChain::new(vec![ScaleFactor::new("ratio", 1.0, 0.0)]).unwrap();
    let integral = NormalizationIntegral::new(vec![matrix], chain);
    let cells = &integral.matrices()[0];
    assert_eq!(cells.get(1, 0), Complex64::new(0.5, -0.3));

    let mut group = CoherenceGroup::new("hel=+");
    group.amps.push(amp(FILES[0], 1, 2));
    group.amps.push(amp(FILES[1], 3, 4));
    let mut model = AmplitudeModel::new(vec![group]);
    let params = vec![0.0, 1.0, 0.2, 0.5, -0.4];
    model.bind(&params, None, true).unwrap();
    let mut derivs = vec![0.0; params.len()];
    integral
        .calc_norm(FcnFlag::Gradient, &model, Some(&mut derivs))
        .unwrap();

    for slot in 1..params.len() {
        let h = 1e-6;
        let mut shifted = params.clone();
        shifted[slot] += h;
        model.bind(&shifted, None, false).unwrap();
        let hi = integral.calc_norm(FcnFlag::Value, &model, None).unwrap();
        shifted[slot] -= 2.0 * h;
        model.bind(&shifted, None, false).unwrap();
        let lo = integral.calc_norm(FcnFlag::Value, &model, None).unwrap();
        assert_relative_eq!(derivs[slot], (hi - lo) / (2.0 * h), epsilon = 1e-6);
    }
}

proptest! {
    #[test]
    fn norm_gradient_matches_central_difference(
        values in proptest::collection::vec(-2.0f64..2.0, 4),
    ) {
        let dir = tempdir().unwrap();
        write_bin(dir.path());
        let file = generate(dir.path(), &options()).unwrap();
        let mut params = vec![0.0];
        params.extend(values);
        let mut model = model();
        let integral = NormalizationIntegral::align(&file, &model).unwrap();

        model.bind(&params, None, true).unwrap();
        let mut derivs = vec![0.0; params.len()];
        let norm = integral.calc_norm(FcnFlag::Gradient, &model, Some(&mut derivs)).unwrap();
        prop_assert!(norm >= -1e-9, "hermitian form is positive semi-definite");

        let mut untouched = vec![0.0; params.len()];
        integral.calc_norm(FcnFlag::Value, &model, Some(&mut untouched)).unwrap();
        prop_assert!(untouched.iter().all(|d| *d == 0.0));

        for slot in 1..params.len() {
            let h = 1e-6;
            let mut shifted = params.clone();
            shifted[slot] += h;
            model.bind(&shifted, None, false).unwrap();
            let hi = integral.calc_norm(FcnFlag::Value, &model, None).unwrap();
            shifted[slot] -= 2.0 * h;
            model.bind(&shifted, None, false).unwrap();
            let lo = integral.calc_norm(FcnFlag::Value, &model, None).unwrap();
            let numeric = (hi - lo) / (2.0 * h);
            prop_assert!((derivs[slot] - numeric).abs() <= 1e-4 * (1.0 + numeric.abs()));
        }
    }
}
