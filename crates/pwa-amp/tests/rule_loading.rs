use std::collections::BTreeMap;
use std::fs;

use num_complex::Complex32;
use pwa_amp::{
    write_amp_file, AmplitudeModel, Cuts, EventAmplitudeTable, Expr, KernelSpec, NativeRegistry,
    ParamTemplate, Rule, RuleSet, BIN_TAG,
};
use pwa_core::{ParameterRegistry, PwaError};
use tempfile::tempdir;

fn wave_rule() -> Rule {
    let mut params = BTreeMap::new();
    for handle in ["mag", "phase"] {
        params.insert(
            handle.to_string(),
            ParamTemplate {
                tags: vec!["wave".into(), BIN_TAG.into()],
                ..ParamTemplate::default()
            },
        );
    }
    Rule {
        pattern: "*wave=*".into(),
        kernel: KernelSpec::Native {
            name: "polar".into(),
        },
        params,
    }
}

fn amps(values: &[(f32, f32)]) -> Vec<Complex32> {
    values.iter().map(|(re, im)| Complex32::new(*re, *im)).collect()
}

#[test]
fn groups_are_built_and_tables_loaded_through_cuts() {
    let dir = tempdir().unwrap();
    let data = dir.path();
    write_amp_file(
        &data.join("hel=+:wave=s11:.amps"),
        &amps(&[(1.0, 0.0), (0.5, 0.5), (0.2, -0.1)]),
    )
    .unwrap();
    write_amp_file(
        &data.join("hel=+:wave=p11:.amps"),
        &amps(&[(0.0, 1.0), (0.3, 0.0), (0.9, 0.9)]),
    )
    .unwrap();
    write_amp_file(
        &data.join("hel=-:wave=s11:.amps"),
        &amps(&[(0.4, 0.4), (0.1, 0.0), (0.0, 0.2)]),
    )
    .unwrap();
    write_amp_file(&data.join("hel=-:wave=d13:.amps"), &amps(&[(0.0, 0.0); 3])).unwrap();
    fs::write(data.join("cuts.txt"), "1.0\n0.0\n0.8\n").unwrap();

    let rules = RuleSet::new(vec![wave_rule()], &NativeRegistry::default()).unwrap();
    let mut registry = ParameterRegistry::new();
    let groups = rules
        .build_groups(data, "Wbin1800-1810", &["hel".to_string()], &mut registry)
        .unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].key, "hel=+");
    assert_eq!(groups[0].amps.len(), 2);
    assert_eq!(groups[1].amps.len(), 1, "all-zero file is skipped");
    assert_eq!(registry.max_id(), 4, "hel=+ and hel=- share the s11 parameters");

    let model = AmplitudeModel::new(groups);
    let cuts = Cuts::read(&data.join("cuts.txt")).unwrap();
    let table = EventAmplitudeTable::load(&model, data, Some(&cuts)).unwrap();
    assert_eq!(table.num_events(), 2);
    assert_eq!(table.weight(1), 0.8);
    // group hel=+ is sorted p11 then s11
    assert_eq!(table.get(1, 0, 0), Complex32::new(0.9, 0.9));
    assert_eq!(table.get(1, 0, 1), Complex32::new(0.2, -0.1));
}

#[test]
fn missing_amplitude_file_fails_the_load() {
    let dir = tempdir().unwrap();
    write_amp_file(&dir.path().join("wave=s11:.amps"), &amps(&[(1.0, 0.0)])).unwrap();
    let rules = RuleSet::new(vec![wave_rule()], &NativeRegistry::default()).unwrap();
    let mut registry = ParameterRegistry::new();
    let groups = rules
        .build_groups(dir.path(), "Wbin1-2", &[], &mut registry)
        .unwrap();
    let model = AmplitudeModel::new(groups);

    let other = tempdir().unwrap();
    let err = EventAmplitudeTable::load(&model, other.path(), None).unwrap_err();
    assert!(matches!(err, PwaError::Io(_)));
}

#[test]
fn expression_rules_parse_from_yaml() {
    let yaml = r#"
pattern: "*wave=*"
kernel:
  type: expr
  expr:
    op: cartesian
    re: {op: par, name: re}
    im: {op: par, name: im}
params:
  re: {tags: [wave], start: 1.0}
  im: {tags: [wave], start: {min: -1.0, max: 1.0}, limits: [-5.0, 5.0]}
"#;
    let rule: Rule = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(
        rule.kernel,
        KernelSpec::Expr {
            expr: Expr::cartesian(Expr::par("re"), Expr::par("im"))
        }
    );
    assert_eq!(rule.params["im"].limits, Some([-5.0, 5.0]));
}
