//! Binary to generate/update .expected and .expected.err fixture files
//!
//! Usage:
//!   cargo run --bin accept_expected            # Update all
//!   cargo run --bin accept_expected -- loops   # Update only fixtures matching "loops"

use prism::{Options, VarFile, render_document};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

fn main() {
    let filter: Option<String> = std::env::args().nth(1);
    let fixture_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures");

    let mut updated = 0;
    let mut skipped = 0;

    for entry in WalkDir::new(&fixture_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|s| s == "prism").unwrap_or(false))
    {
        let path = entry.path();
        let path_str = path.to_string_lossy();

        if let Some(ref f) = filter {
            if !path_str.contains(f) {
                skipped += 1;
                continue;
            }
        }

        if process_file(path) {
            updated += 1;
        }
    }

    println!("Updated {} files, skipped {}", updated, skipped);
}

fn process_file(path: &Path) -> bool {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read {:?}: {}", path, e);
            return false;
        }
    };

    let vars_path = path.with_extension("vars.json");
    let vars = if vars_path.exists() {
        match fs::read_to_string(&vars_path).map_err(|e| e.to_string()).and_then(|text| {
            VarFile::from_json(&text).map_err(|e| e.to_string())
        }) {
            Ok(vars) => vars,
            Err(e) => {
                eprintln!("Failed to load {:?}: {}", vars_path, e);
                return false;
            }
        }
    } else {
        VarFile::default()
    };

    let symbols = match vars.symbols() {
        Ok(symbols) => symbols,
        Err(e) => {
            eprintln!("Invalid variables for {:?}: {}", path, e);
            return false;
        }
    };

    let is_error_test = path.to_string_lossy().contains("/errors/");
    let result = render_document(&source, symbols, Options::default());

    let (target, content) = match (is_error_test, result) {
        (false, Ok(rendered)) => (path.with_extension("expected"), rendered.output),
        (true, Err(err)) => (path.with_extension("expected.err"), format!("{}\n", err.kind.as_str())),
        (false, Err(err)) => {
            eprintln!("{}", err.render(&source, &path.display().to_string()));
            return false;
        }
        (true, Ok(_)) => {
            eprintln!("Expected {:?} to fail, but it rendered", path);
            return false;
        }
    };

    if let Err(e) = fs::write(&target, content) {
        eprintln!("Failed to write {:?}: {}", target, e);
        return false;
    }
    println!("  ✓ {}", target.display());
    true
}
