// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use method_coverage::{AnalyzerOptions, MethodAnalyzer, SynchronizedFilter};
use method_flow::MethodEvent;

/// Print the coverage of a method recorded as a JSON event stream.
#[derive(Parser, Debug)]
struct Args {
    /// JSON array of method events.
    #[arg(short, long)]
    events: PathBuf,

    /// JSON array of probe execution flags. Without it, the class is treated
    /// as never executed.
    #[arg(short, long)]
    probes: Option<PathBuf>,

    /// JSON analyzer options.
    #[arg(short, long)]
    options: Option<PathBuf>,

    /// Hide the exception exits of synchronized blocks.
    #[arg(long)]
    synchronized: bool,

    #[arg(long, default_value = "method")]
    name: String,

    #[arg(long, default_value = "()V")]
    desc: String,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    let value = serde_json::from_str(&text)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    Ok(value)
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let events: Vec<MethodEvent> = read_json(&args.events)?;
    let probes: Option<Vec<bool>> = args.probes.as_deref().map(read_json).transpose()?;
    let options: AnalyzerOptions = match args.options.as_deref() {
        Some(path) => read_json(path)?,
        None => AnalyzerOptions::default(),
    };

    let mut analyzer = MethodAnalyzer::new(args.name, args.desc)
        .probes(probes.as_deref())
        .options(options);

    if args.synchronized {
        analyzer = analyzer.filter(SynchronizedFilter::new());
    }

    let coverage = analyzer.analyze(&events)?;

    let text = serde_json::to_string_pretty(&coverage)?;
    println!("{text}");

    Ok(())
}
