// Integration tests for mzspeclib-core using test fixtures
use mzspeclib_core::error::{MzLibError, ParserError, SchemaError};
use mzspeclib_core::rules::Tier;
use mzspeclib_core::validator::Validator;
use mzspeclib_core::vocabulary::Vocabulary;
use mzspeclib_core::{analyze, analyze_json};
use std::fs;
use std::path::PathBuf;

fn get_test_file_path(subdir: &str, filename: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join(subdir)
        .join(filename)
}

fn read_test_file(subdir: &str, filename: &str) -> String {
    let path = get_test_file_path(subdir, filename);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to read test file: {:?}", path))
}

fn builtin_validator() -> Validator {
    Validator::default()
        .with_builtin_tiers()
        .expect("bundled rule tables load")
}

// Libraries that parse; some of them are meant to fail validation.
mod ok_tests {
    use super::*;

    #[test]
    fn test_minimal() {
        let content = read_test_file("ok", "minimal.mzlb.txt");
        let result = analyze(&content, "minimal.mzlb.txt");
        assert!(result.is_ok(), "Should parse successfully: {:?}", result.err());

        let report = result.unwrap().validate(&builtin_validator(), &[]);
        assert!(report.is_valid(), "{report}");
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_peptide_library() {
        let content = read_test_file("ok", "peptide.mzlb.txt");
        let result = analyze(&content, "peptide.mzlb.txt").unwrap();

        assert_eq!(result.library.spectra.len(), 2);
        assert_eq!(result.library.clusters.len(), 1);
        assert_eq!(result.library.attribute_sets.len(), 2);
        assert_eq!(result.library.spectra[0].peaks[2].annotations.len(), 2);

        let report = result.validate(&builtin_validator(), &[Tier::PEPTIDE]);
        assert!(report.passed(&Tier::BASE), "{report}");
        assert!(report.passed(&Tier::PEPTIDE), "{report}");
        assert!(report.findings.is_empty(), "{report}");
    }

    #[test]
    fn test_peptide_library_silver_with_vocabulary() {
        let mut vocabulary = Vocabulary::new();
        vocabulary.insert("MS:1000044", "dissociation method", &[]);
        vocabulary.insert("MS:1000133", "collision-induced dissociation", &["MS:1000044"]);
        vocabulary.insert(
            "MS:1000422",
            "beam-type collision-induced dissociation",
            &["MS:1000133"],
        );
        let validator = Validator::new(vocabulary).with_builtin_tiers().unwrap();

        let content = read_test_file("ok", "peptide.mzlb.txt");
        let report = analyze(&content, "peptide.mzlb.txt")
            .unwrap()
            .validate(&validator, &[Tier::SILVER]);

        // The dissociation method and collision energy come from the `all` attribute set.
        assert!(report.passed(&Tier::SILVER), "{report}");
        let warnings: Vec<_> = report.findings_for(&Tier::SILVER).collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].rule, "interpretation_has_unassigned_intensity_fraction");
        assert_eq!(warnings[0].entity, "Spectrum=1/Interpretation=1");
    }

    #[test]
    fn test_consensus_library() {
        let mut vocabulary = Vocabulary::new();
        vocabulary.insert("MS:1003065", "spectrum aggregation type", &[]);
        vocabulary.insert("MS:1003067", "consensus spectrum", &["MS:1003065"]);
        let validator = Validator::new(vocabulary).with_builtin_tiers().unwrap();

        let content = read_test_file("ok", "consensus.mzlb.txt");
        let result = analyze(&content, "consensus.mzlb.txt").unwrap();
        let peaks = &result.library.spectra[0].peaks;
        assert_eq!(peaks[0].aggregations, vec!["4/5"]);
        assert!(peaks[2].annotations.is_empty());

        let report = result.validate(&validator, &[Tier::CONSENSUS]);
        assert!(report.passed(&Tier::CONSENSUS), "{report}");
    }

    #[test]
    fn test_duplicate_keys() {
        let content = read_test_file("ok", "duplicate_keys.mzlb.txt");
        let result = analyze(&content, "duplicate_keys.mzlb.txt");
        assert!(result.is_ok(), "Duplicate keys are a validation concern, not a parse error");

        let report = result.unwrap().validate(&builtin_validator(), &[]);
        let duplicates: Vec<_> = report
            .failures()
            .filter(|f| f.rule == "spectrum_has_key")
            .collect();
        assert_eq!(duplicates.len(), 1);
        assert!(duplicates[0].message.contains("spectrum index 0"));
        assert!(duplicates[0].message.contains("spectrum index 1"));
        assert!(!report.passed(&Tier::BASE));
    }

    #[test]
    fn test_json_document() {
        let content = read_test_file("ok", "peptide.json");
        let result = analyze_json(&content);
        assert!(result.is_ok(), "Should read successfully: {:?}", result.err());
        let result = result.unwrap();

        assert_eq!(result.library.format_version().as_deref(), Some("1.0"));
        let spectrum = &result.library.spectra[0];
        assert_eq!(spectrum.id, "1");
        assert_eq!(spectrum.peaks[2].annotations, vec!["b3/-0.2", "y3-H2O/0.4"]);

        let report = result.validate(&builtin_validator(), &[Tier::PEPTIDE]);
        assert!(report.passed(&Tier::BASE), "{report}");
        assert!(report.passed(&Tier::PEPTIDE), "{report}");
    }
}

// Inputs that must be rejected
mod bad_tests {
    use super::*;

    fn parse_error(filename: &str) -> ParserError {
        let content = read_test_file("err", filename);
        match analyze(&content, filename) {
            Err(MzLibError::Parser(err)) => err,
            other => panic!("{filename}: expected a parser error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_header() {
        let err = parse_error("missing_header.mzlb.txt");
        assert!(matches!(err, ParserError::MissingHeader { line: 1, .. }));
    }

    #[test]
    fn test_peak_count_mismatch() {
        match parse_error("peak_count_mismatch.mzlb.txt") {
            ParserError::PeakCountMismatch {
                declared, found, ..
            } => assert_eq!((declared, found), (3, 2)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag() {
        let err = parse_error("unknown_tag.mzlb.txt");
        assert!(matches!(err, ParserError::UnknownTag { line: 3, .. }), "{err:?}");
    }

    #[test]
    fn test_orphan_member() {
        let err = parse_error("orphan_member.mzlb.txt");
        assert!(matches!(err, ParserError::MissingParent { line: 4, .. }), "{err:?}");
    }

    #[test]
    fn test_duplicate_spectrum() {
        let err = parse_error("duplicate_spectrum.mzlb.txt");
        assert!(matches!(err, ParserError::DuplicateId { line: 5, .. }), "{err:?}");
    }

    #[test]
    fn test_bad_group() {
        let err = parse_error("bad_group.mzlb.txt");
        assert!(matches!(err, ParserError::UnmatchedGroup { line: 3, .. }), "{err:?}");
    }

    #[test]
    fn test_malformed_peak() {
        let err = parse_error("malformed_peak.mzlb.txt");
        assert!(matches!(err, ParserError::MalformedPeak { line: 4, .. }), "{err:?}");
    }

    #[test]
    fn test_attribute_after_peaks() {
        let err = parse_error("attribute_after_peaks.mzlb.txt");
        assert!(matches!(err, ParserError::UnexpectedLine { line: 6, .. }), "{err:?}");
    }

    #[test]
    fn test_peak_arrays_disagree() {
        let content = read_test_file("err", "peak_arrays.json");
        match analyze_json(&content) {
            Err(MzLibError::Schema(SchemaError::PeakArrayLength {
                mzs, intensities, ..
            })) => assert_eq!((mzs, intensities), (2, 1)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_format_version_mismatch() {
        let content = read_test_file("err", "version_mismatch.json");
        assert!(matches!(
            analyze_json(&content),
            Err(MzLibError::Schema(SchemaError::FormatVersionMismatch { .. }))
        ));
    }
}
