//! CLI entry point: a single `configure <builddir>` verb (spec §6).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;

#[derive(ClapParser)]
#[command(name = "bgc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Configure a build tree from a meson.build source description", long_about = None)]
struct Cli {
    /// Verb: currently only `configure` is supported.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Parse, lower, and optimize the source tree, writing the build
    /// rules and test manifest into `builddir`.
    Configure {
        /// Directory the build output (test manifest, rule dump) is
        /// written into.
        builddir: PathBuf,

        /// Root of the DSL source tree (defaults to the current
        /// directory).
        #[arg(short = 's', long = "source-dir", default_value = ".")]
        source_dir: PathBuf,

        /// A built-in option override, `key=value`. May be repeated.
        #[arg(short = 'D', long = "define", value_name = "key=value")]
        defines: Vec<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Configure {
            builddir,
            source_dir,
            defines,
        } => run_configure(&source_dir, &builddir, &defines),
    }
}

fn run_configure(source_dir: &PathBuf, builddir: &PathBuf, defines: &[String]) -> ExitCode {
    let result = (|| -> Result<(), buildgraph_core::CompileError> {
        let define_refs: Vec<&str> = defines.iter().map(String::as_str).collect();
        let options = buildgraph_compiler::BuildOptions::new(source_dir.clone(), builddir.clone())
            .with_defines(define_refs)?;

        let output = buildgraph_compiler::configure(&options)?;

        std::fs::create_dir_all(builddir)?;
        let manifest = buildgraph_compiler::test_manifest::serialize(&output.tests);
        std::fs::write(builddir.join("meson-test-manifest.txt"), manifest)?;

        tracing::info!(
            rules = output.rules.len(),
            tests = output.tests.len(),
            "configure complete"
        );
        Ok(())
    })();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
