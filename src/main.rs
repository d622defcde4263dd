use clap::{Parser, Subcommand};
use prism::parser::{DocumentParser, split_header};
use prism::{IndexMode, IndexOrder, Options, TemplateError, VarFile, render_document};
use serde::Serialize;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "prism")]
#[command(about = "Prism - shader templates with expressions and control flow")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render .prism files
    Render {
        /// Path to .prism file or directory
        #[arg(required_unless_present = "stdin")]
        file: Option<PathBuf>,

        /// Read the template from stdin
        #[arg(long)]
        stdin: bool,

        /// JSON file with the variables to render against
        #[arg(long)]
        vars: Option<PathBuf>,

        /// Output as JSON with the parsed header
        #[arg(long)]
        json: bool,

        /// Skip per-dimension array bounds checks
        #[arg(long)]
        no_bounds_check: bool,

        /// Accept fewer indices than an array has dimensions
        #[arg(long)]
        reduced_indexing: bool,

        /// Address dimension 0 with the last bracket of a[i][j]
        #[arg(long)]
        reversed_indices: bool,

        /// Accept documents without a @prism(...) header
        #[arg(long)]
        allow_headerless: bool,
    },

    /// Print the block tree of a template as JSON
    Parse {
        /// Path to .prism file
        #[arg(required_unless_present = "stdin")]
        file: Option<PathBuf>,

        /// Read the template from stdin
        #[arg(long)]
        stdin: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            file,
            stdin,
            vars,
            json,
            no_bounds_check,
            reduced_indexing,
            reversed_indices,
            allow_headerless,
        } => {
            let options = Options {
                bounds_check: !no_bounds_check,
                index_mode: if reduced_indexing { IndexMode::Reduced } else { IndexMode::Full },
                index_order: if reversed_indices { IndexOrder::Reversed } else { IndexOrder::Declared },
                require_header: !allow_headerless,
            };
            let vars = load_vars(vars.as_deref());

            if stdin {
                let source = read_stdin();
                render_source(&source, "<stdin>", &options, &vars, json);
            } else if let Some(path) = file {
                render_path(&path, &options, &vars, json);
            } else {
                eprintln!("Error: provide a file/directory or use --stdin");
                std::process::exit(1);
            }
        }

        Commands::Parse { file, stdin } => {
            let (source, name) = if stdin {
                (read_stdin(), "<stdin>".to_string())
            } else if let Some(path) = file {
                (read_file(&path), path.display().to_string())
            } else {
                eprintln!("Error: provide a file or use --stdin");
                std::process::exit(1);
            };
            parse_source(&source, &name);
        }
    }
}

fn read_stdin() -> String {
    let mut source = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut source) {
        eprintln!("Error: failed to read stdin: {}", e);
        std::process::exit(1);
    }
    source
}

fn read_file(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn load_vars(path: Option<&Path>) -> VarFile {
    let Some(path) = path else {
        return VarFile::default();
    };
    let text = read_file(path);
    match VarFile::from_json(&text) {
        Ok(vars) => vars,
        Err(e) => {
            eprintln!("Error: {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn report(err: &TemplateError, source: &str, filename: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", err.render_color(source, filename));
    } else {
        eprintln!("{}", err.render(source, filename));
    }
}

fn render_to_string(source: &str, options: &Options, vars: &VarFile) -> Result<prism::RenderResult, TemplateError> {
    let symbols = vars.symbols()?;
    render_document(source, symbols, options.clone())
}

fn render_source(source: &str, filename: &str, options: &Options, vars: &VarFile, json_output: bool) {
    match render_to_string(source, options, vars) {
        Ok(result) if json_output => match serde_json::to_string(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize output: {}", e);
                std::process::exit(1);
            }
        },
        Ok(result) => print!("{}", result.output),
        Err(err) => {
            report(&err, source, filename);
            std::process::exit(1);
        }
    }
}

fn render_path(path: &Path, options: &Options, vars: &VarFile, json_output: bool) {
    if path.is_file() {
        let source = read_file(path);
        render_source(&source, &path.display().to_string(), options, vars, json_output);
    } else if path.is_dir() {
        render_directory(path, options, vars);
    } else {
        eprintln!("Error: {} does not exist", path.display());
        std::process::exit(1);
    }
}

fn render_directory(dir: &Path, options: &Options, vars: &VarFile) {
    let start = Instant::now();
    let mut file_count = 0;
    let mut failures = 0;

    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "prism"))
    {
        if render_file(entry.path(), options, vars) {
            file_count += 1;
        } else {
            failures += 1;
        }
    }

    if file_count == 0 && failures == 0 {
        eprintln!("No .prism files found in {}", dir.display());
        std::process::exit(1);
    }

    print_summary(file_count, start.elapsed());
    if failures > 0 {
        std::process::exit(1);
    }
}

/// Render `name.ext.prism` to `name.ext` next to it
fn render_file(path: &Path, options: &Options, vars: &VarFile) -> bool {
    let source = read_file(path);
    let filename = path.display().to_string();

    match render_to_string(&source, options, vars) {
        Ok(result) => {
            let output = path.with_extension("");
            if let Err(e) = fs::write(&output, &result.output) {
                eprintln!("Error: failed to write {}: {}", output.display(), e);
                return false;
            }
            print_generated(&output.display().to_string());
            true
        }
        Err(err) => {
            report(&err, &source, &filename);
            false
        }
    }
}

#[derive(Serialize)]
struct ParseOutput {
    header: Option<prism::Header>,
    template: prism::Template,
}

fn parse_source(source: &str, filename: &str) {
    let parsed = split_header(source).and_then(|document| {
        let template = DocumentParser::new().parse_at(document.body, document.origin)?;
        Ok(ParseOutput { header: document.header, template })
    });

    match parsed {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize block tree: {}", e);
                std::process::exit(1);
            }
        },
        Err(err) => {
            report(&err, source, filename);
            std::process::exit(1);
        }
    }
}

fn print_generated(path: &str) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("  \x1b[32m✓\x1b[0m {}", path);
    } else {
        eprintln!("  ✓ {}", path);
    }
}

fn print_summary(count: usize, elapsed: std::time::Duration) {
    let is_tty = io::stderr().is_terminal();
    let time_str = format_duration(elapsed);
    let files_word = if count == 1 { "file" } else { "files" };

    if is_tty {
        eprintln!("\n\x1b[1m✨ Rendered {} {} in {}\x1b[0m", count, files_word, time_str);
    } else {
        eprintln!("\n✨ Rendered {} {} in {}", count, files_word, time_str);
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let micros = d.as_micros();
    if micros < 1000 {
        format!("{}μs", micros)
    } else if micros < 1_000_000 {
        format!("{:.1}ms", micros as f64 / 1000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}
