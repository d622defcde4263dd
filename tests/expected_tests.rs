//! Fixture runner: renders every `tests/fixtures/**/*.prism` file and compares
//! the result with its `.expected` output, or for fixtures under `errors/`,
//! with the error kind in `.expected.err`.
//!
//! Run with: cargo test --test expected_tests
//! Regenerate with: cargo run --bin accept_expected

use glob::glob;
use libtest_mimic::{Arguments, Failed, Trial};
use prism::{Options, VarFile, render_document};
use std::fs;
use std::path::{Path, PathBuf};

fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn collect_fixtures() -> Vec<PathBuf> {
    let pattern = format!("{}/**/*.prism", fixture_root().display());
    let mut files: Vec<PathBuf> = glob(&pattern)
        .expect("fixture pattern is valid")
        .filter_map(Result::ok)
        .collect();
    files.sort();
    files
}

fn is_error_fixture(path: &Path) -> bool {
    path.parent()
        .and_then(|p| p.file_name())
        .is_some_and(|name| name == "errors")
}

fn read(path: &Path) -> Result<String, Failed> {
    fs::read_to_string(path).map_err(|e| Failed::from(format!("Failed to read {}: {}", path.display(), e)))
}

fn load_vars(path: &Path) -> Result<VarFile, Failed> {
    let vars_path = path.with_extension("vars.json");
    if !vars_path.exists() {
        return Ok(VarFile::default());
    }
    VarFile::from_json(&read(&vars_path)?).map_err(|e| Failed::from(format!("{}: {}", vars_path.display(), e)))
}

fn run_fixture(path: &Path) -> Result<(), Failed> {
    let source = read(path)?;
    let vars = load_vars(path)?;
    let symbols = vars.symbols().map_err(|e| Failed::from(e.to_string()))?;
    let result = render_document(&source, symbols, Options::default());

    if is_error_fixture(path) {
        let expected = read(&path.with_extension("expected.err"))?;
        return match result {
            Ok(rendered) => Err(Failed::from(format!(
                "Expected error '{}', but rendering succeeded:\n{}",
                expected.trim(),
                rendered.output
            ))),
            Err(err) if err.kind.as_str() == expected.trim() => Ok(()),
            Err(err) => Err(Failed::from(format!(
                "Expected error '{}', got:{}",
                expected.trim(),
                err.render(&source, &path.display().to_string())
            ))),
        };
    }

    let expected_path = path.with_extension("expected");
    let expected = read(&expected_path)?;
    match result {
        Ok(rendered) if rendered.output == expected => Ok(()),
        Ok(rendered) => Err(Failed::from(format!(
            "Output mismatch\n--- expected ---\n{}\n--- actual ---\n{}",
            expected, rendered.output
        ))),
        Err(err) => Err(Failed::from(err.render(&source, &path.display().to_string()))),
    }
}

fn main() {
    let args = Arguments::from_args();
    let root = fixture_root();

    let trials: Vec<Trial> = collect_fixtures()
        .into_iter()
        .map(|path| {
            let name = path
                .strip_prefix(&root)
                .unwrap_or(&path)
                .with_extension("")
                .to_string_lossy()
                .replace('\\', "/");
            Trial::test(name, move || run_fixture(&path))
        })
        .collect();

    libtest_mimic::run(&args, trials).exit()
}
