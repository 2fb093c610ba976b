use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use chaos_cubes::batch::HostSink;
use chaos_cubes::config::{ConfigSource, FileSource};
use chaos_cubes::session::{Command, Session};

#[derive(Parser, Debug)]
#[command(version, about = "3D chaos-game attractor viewer")]
struct Args {
    /// JSON config file, reread on reload.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Run this many steps without a window and print the counts.
    #[arg(long, value_name = "STEPS")]
    headless: Option<u64>,
}

fn run_headless(source: &FileSource, steps: u64) -> Result<()> {
    let config = source.load()?;
    let mut session = Session::new(config)?;
    let mut sink = HostSink::new();

    let started = Instant::now();
    for _ in 0..steps {
        session.apply(Command::ManualStep, &mut sink, source);
    }

    println!(
        "{} steps in {:.2?}: {} live points, {} batches holding {} points",
        session.iterations(),
        started.elapsed(),
        session.live_points().len(),
        session.batches().len(),
        session.baked_points()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let source = FileSource::new(&args.config);

    if let Some(steps) = args.headless {
        return run_headless(&source, steps);
    }

    let config = source
        .load()
        .with_context(|| format!("refusing to start with config {}", args.config.display()))?;
    log::info!("loaded config from {}", args.config.display());

    chaos_cubes::window::run(config, Box::new(source))?;
    Ok(())
}
