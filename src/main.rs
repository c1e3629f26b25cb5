//! chtlc command line interface.
//!
//! `chtlc input.chtl [output.html]` compiles one CHTL file to HTML. Exit
//! codes: 0 success, 1 compile error, 2 usage error.

use chtlc::{CompileOptions, Compiler, Severity};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "chtlc",
    version,
    disable_version_flag = true,
    about = "CHTL to HTML compiler",
    arg_required_else_help = true
)]
struct Cli {
    /// Show version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Input .chtl file
    input: PathBuf,

    /// Output .html file (defaults to stdout)
    output: Option<PathBuf>,

    /// Output file (overrides the positional form)
    #[arg(short, long, value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,

    /// Minify output
    #[arg(short, long)]
    minify: bool,

    /// Generate fragment only (no HTML shell)
    #[arg(short, long)]
    fragment: bool,

    /// Disable pretty printing
    #[arg(long = "no-pretty")]
    no_pretty: bool,

    /// Treat warnings as errors
    #[arg(long)]
    strict: bool,

    /// Print the AST as JSON instead of generating HTML
    #[arg(long)]
    ast: bool,

    /// Root directory searched for [Import] modules (repeatable)
    #[arg(long = "import-path", value_name = "DIR")]
    import_paths: Vec<String>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders --help/--version through the error path too.
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let source = match std::fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("chtlc: cannot read {}: {}", cli.input.display(), err);
            return ExitCode::from(1);
        }
    };
    let filename = cli.input.display().to_string();

    let options = CompileOptions {
        pretty_print: !cli.no_pretty && !cli.minify,
        minify: cli.minify,
        fragment_only: cli.fragment,
        debug: cli.debug,
        import_paths: cli.import_paths.clone(),
        strict: cli.strict,
        preserve_comments: cli.debug,
    };
    let compiler = Compiler::new(options);

    if cli.ast {
        let (json, diagnostics) = compiler.parse_to_json(&source, &filename);
        for diag in &diagnostics {
            eprintln!("{}", diag);
        }
        match json {
            Some(json) if !diagnostics.iter().any(|d| d.severity >= Severity::Error) => {
                println!("{}", json);
                return ExitCode::SUCCESS;
            }
            Some(json) => {
                println!("{}", json);
                return ExitCode::from(1);
            }
            None => return ExitCode::from(1),
        }
    }

    let result = compiler.compile(&source, &filename);
    for diag in &result.diagnostics {
        eprintln!("{}", diag);
    }
    if !result.success {
        return ExitCode::from(1);
    }

    let output_path = cli.output_file.or(cli.output);
    match output_path {
        Some(path) => {
            if let Err(err) = std::fs::write(&path, &result.output) {
                eprintln!("chtlc: cannot write {}: {}", path.display(), err);
                return ExitCode::from(1);
            }
            if cli.debug {
                eprintln!("chtlc: wrote {}", path.display());
            }
        }
        None => print!("{}", result.output),
    }
    ExitCode::SUCCESS
}
