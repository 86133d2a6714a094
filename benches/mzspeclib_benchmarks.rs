use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mzspeclib_core::rules::Tier;
use mzspeclib_core::stream::RecordReader;
use mzspeclib_core::validator::Validator;
use mzspeclib_core::{analyze, analyze_json, lexer::Lexer, parser::Parser};

// ============================================================================
// Test Data: Generated Libraries
// ============================================================================

const HEADER: &str = "<mzSpecLib>
MS:1003186|library format version=1.0
MS:1003188|library name=benchmark

<AttributeSet Spectrum=all>
MS:1000044|dissociation method=MS:1000422|beam-type collision-induced dissociation
[1]MS:1000045|collision energy=27.0
[1]UO:0000000|unit=UO:0000266|electronvolt

";

// A library of `spectra` spectra with `peaks` peaks each
fn generate_library(spectra: usize, peaks: usize) -> String {
    let mut text = String::from(HEADER);
    for i in 0..spectra {
        text.push_str(&format!(
            "<Spectrum={id}>
MS:1003237|library spectrum key={id}
MS:1003062|library spectrum index={i}
MS:1003061|spectrum name=PEPTIDE{i}K/2
MS:1003212|library attribute set name=all
MS:1003208|experimental precursor monoisotopic m/z={mz}
[1]MS:1000894|retention time={rt}
[1]UO:0000000|unit=UO:0000010|second
MS:1003059|number of peaks={peaks}
<Analyte=1>
MS:1003169|proforma peptidoform sequence=PEPTIDE{i}K
MS:1000041|charge state=2
<Interpretation=1>
MS:1002357|PSM-level probability=0.99
<Peaks>
",
            id = i + 1,
            mz = 400.0 + i as f64 * 0.25,
            rt = 60.0 + i as f64,
        ));
        for p in 0..peaks {
            text.push_str(&format!(
                "{:.4}\t{:.1}\ty{}/0.0\n",
                100.0 + p as f64 * 13.5,
                1000.0 - p as f64,
                p + 1
            ));
        }
        text.push('\n');
    }
    text
}

// ============================================================================
// Lexer Benchmarks
// ============================================================================

fn bench_lexer_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_spectrum_scaling");

    for size in [10, 100, 1000] {
        let source = generate_library(size, 20);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, src| {
            b.iter(|| {
                let mut lexer = Lexer::new(black_box(src));
                lexer.lex()
            })
        });
    }

    group.finish();
}

// ============================================================================
// Parser Benchmarks
// ============================================================================

fn bench_parser_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_spectrum_scaling");

    for size in [10, 100, 1000] {
        let source = generate_library(size, 20);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, src| {
            b.iter(|| {
                let mut parser = Parser::new(black_box(src));
                parser.parse_library()
            })
        });
    }

    group.finish();
}

fn bench_parser_peak_heavy(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_peak_scaling");

    for peaks in [10, 100, 1000] {
        let source = generate_library(10, peaks);
        group.throughput(Throughput::Elements((10 * peaks) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(peaks), &source, |b, src| {
            b.iter(|| {
                let mut parser = Parser::new(black_box(src));
                parser.parse_library()
            })
        });
    }

    group.finish();
}

fn bench_streaming(c: &mut Criterion) {
    let source = generate_library(1000, 20);
    c.bench_function("stream_1000_spectra", |b| {
        b.iter(|| {
            let reader = RecordReader::new(black_box(&source), "benchmark.mzlb.txt").unwrap();
            reader.filter(Result::is_ok).count()
        })
    });
}

// ============================================================================
// Validation Benchmarks
// ============================================================================

fn bench_validation(c: &mut Criterion) {
    let validator = Validator::default().with_builtin_tiers().unwrap();
    let mut group = c.benchmark_group("validation");

    for size in [10, 100, 1000] {
        let library = analyze(&generate_library(size, 20), "benchmark.mzlb.txt")
            .unwrap()
            .library;
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &library, |b, lib| {
            b.iter(|| validator.validate(black_box(lib), &[Tier::PEPTIDE, Tier::SILVER]))
        });
    }

    group.finish();
}

// ============================================================================
// Serialization Benchmarks
// ============================================================================

fn bench_serialization(c: &mut Criterion) {
    let result = analyze(&generate_library(100, 50), "benchmark.mzlb.txt").unwrap();
    let json = result.to_json().unwrap();

    c.bench_function("to_json_100_spectra", |b| b.iter(|| black_box(&result).to_json()));
    c.bench_function("from_json_100_spectra", |b| {
        b.iter(|| analyze_json(black_box(&json)))
    });
    c.bench_function("to_text_100_spectra", |b| b.iter(|| black_box(&result).to_text()));
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(lexer_benches, bench_lexer_scaling);

criterion_group!(
    parser_benches,
    bench_parser_scaling,
    bench_parser_peak_heavy,
    bench_streaming
);

criterion_group!(validation_benches, bench_validation);

criterion_group!(serialization_benches, bench_serialization);

criterion_main!(
    lexer_benches,
    parser_benches,
    validation_benches,
    serialization_benches
);
