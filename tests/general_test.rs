use miette::Report;
use mzspeclib_core::parser::Parser;
use mzspeclib_core::serialization::from_json_str;
use std::fs;
use std::path::Path;

fn fixture_files(dir: &str, suffix: &str) -> Vec<std::path::PathBuf> {
    let entries = fs::read_dir(dir).unwrap_or_else(|_| panic!("Failed to read {dir} directory"));
    let mut paths: Vec<_> = entries
        .map(|entry| entry.expect("Failed to read directory entry").path())
        .filter(|path| path.is_file() && path.to_string_lossy().ends_with(suffix))
        .collect();
    paths.sort();
    paths
}

fn parse_file(path: &Path) -> Result<(), Report> {
    let source = fs::read_to_string(path).unwrap_or_else(|_| panic!("Failed to read file: {:?}", path));
    let mut parser = Parser::new_with_name(&source, path.display().to_string());
    parser.parse_library().map(|_| ()).map_err(Report::new)
}

#[test]
fn test_all_ok_files() {
    let paths = fixture_files("./tests/ok", ".mzlb.txt");
    assert!(!paths.is_empty());
    for path in paths {
        println!("Parsing file: {:?}", path);
        if let Err(report) = parse_file(&path) {
            panic!("Failed to parse {:?}. Error: {:?}", path, report);
        }
    }
}

#[test]
fn test_all_err_files() {
    let paths = fixture_files("./tests/err", ".mzlb.txt");
    assert!(!paths.is_empty());
    for path in paths {
        println!("Parsing file: {:?}", path);
        assert!(parse_file(&path).is_err(), "{:?} should not parse", path);
    }
}

#[test]
fn test_all_json_files() {
    for path in fixture_files("./tests/ok", ".json") {
        let source = fs::read_to_string(&path).unwrap();
        if let Err(err) = from_json_str(&source) {
            panic!("Failed to read {:?}. Error: {:?}", path, Report::new(err));
        }
    }
    for path in fixture_files("./tests/err", ".json") {
        let source = fs::read_to_string(&path).unwrap();
        assert!(from_json_str(&source).is_err(), "{:?} should be rejected", path);
    }
}
