use std::fs;

use pwa_core::{bin_list, iteration_store_path, BinRanges};
use tempfile::tempdir;

#[test]
fn bin_list_filters_sorts_and_dedups() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    for name in ["Wbin1900-1910", "Wbin1800-1810", "Wbin2000-2010", "notes"] {
        fs::create_dir(first.path().join(name)).unwrap();
    }
    fs::create_dir(second.path().join("Wbin1800-1810")).unwrap();

    let all = bin_list(&[first.path(), second.path()], &BinRanges::all()).unwrap();
    assert_eq!(all, vec!["Wbin1800-1810", "Wbin1900-1910", "Wbin2000-2010"]);

    let ranges: BinRanges = "1850-1950,1990-2010".parse().unwrap();
    let picked = bin_list(&[first.path()], &ranges).unwrap();
    assert_eq!(picked, vec!["Wbin1900-1910", "Wbin2000-2010"]);
}

#[test]
fn store_path_uses_range_descriptor() {
    let ranges: BinRanges = "1800-1810".parse().unwrap();
    let path = iteration_store_path(std::path::Path::new("out"), &ranges);
    assert_eq!(path, std::path::Path::new("out/1800-1810.json"));
}
