use anyhow::{anyhow, Result};
use clap::Parser;
use jobs_eval::{EvalConfig, Interrupt, ReportLayout};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "eval-jobs",
    version = "0.3.0",
    about = "Find the jobs in a release tree and print them as JSON"
)]
struct Cli {
    /// Release document (JSON, or YAML with a .yaml/.yml extension)
    release_expr: Option<PathBuf>,
    /// Register a GC root for every job's derivation in this directory
    #[arg(long)]
    gc_roots_dir: Option<PathBuf>,
    /// Do not write anything to the store
    #[arg(long)]
    dry_run: bool,
    /// Key the report by dotted attribute path instead of nesting it
    #[arg(long)]
    flat: bool,
    /// Settings file (YAML, or JSON with a .json extension)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Pass NAME to functions in the tree; EXPR is a JSON literal
    #[arg(long = "arg", num_args = 2, value_names = ["NAME", "EXPR"])]
    args: Vec<String>,
    /// Pass NAME to functions in the tree as the string VALUE
    #[arg(long = "argstr", num_args = 2, value_names = ["NAME", "VALUE"])]
    argstrs: Vec<String>,
}

fn main() -> Result<()> {
    // Keep evaluation independent of the caller's search path.
    std::env::remove_var("NIX_PATH");
    init_tracing();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let release = cli
        .release_expr
        .as_deref()
        .ok_or_else(|| jobs_eval::Error::usage("no expression specified"))?;

    if !config.roots_enabled() {
        tracing::warn!("`--gc-roots-dir' not specified");
    }

    let interrupt = Interrupt::new();
    let (report, _stats) = jobs_eval::evaluate_release(release, &config, &interrupt)?;
    emit_json(&report.to_json(config.layout)?)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eval_jobs=info,jobs_eval=info".into()),
        )
        .init();
}

/// File settings first, then command-line flags on top.
fn build_config(cli: &Cli) -> Result<EvalConfig> {
    let mut config = match &cli.config {
        Some(path) => EvalConfig::load(path)?,
        None => EvalConfig::default(),
    };
    if let Some(dir) = &cli.gc_roots_dir {
        config.gc_roots_dir = Some(dir.clone());
    }
    if cli.dry_run {
        config.dry_run = true;
    }
    if cli.flat {
        config.layout = ReportLayout::Flat;
    }
    config.args.extend(parse_arg_bindings(&cli.args)?);
    for (name, value) in pairs("--argstr", &cli.argstrs)? {
        config.argstrs.insert(name.to_string(), value.to_string());
    }
    Ok(config)
}

fn parse_arg_bindings(values: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for (name, raw) in pairs("--arg", values)? {
        let parsed = serde_json::from_str::<Value>(raw)
            .map_err(|e| anyhow!("invalid --arg '{}': {}", name, e))?;
        out.insert(name.to_string(), parsed);
    }
    Ok(out)
}

fn pairs<'a>(flag: &str, values: &'a [String]) -> Result<Vec<(&'a str, &'a str)>> {
    let mut out = Vec::new();
    for pair in values.chunks(2) {
        match pair {
            [name, value] if !name.trim().is_empty() => out.push((name.as_str(), value.as_str())),
            [name, _] => return Err(anyhow!("invalid {} '{}': name cannot be empty", flag, name)),
            _ => return Err(anyhow!("{} expects a name and a value", flag)),
        }
    }
    Ok(out)
}

fn emit_json(value: &Value) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
