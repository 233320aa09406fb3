use clap::Parser;
use lib::{PipelineError, RawConfig, SimpleLogger, build_table, generate_outputs, resolve_dataset};
use log::{debug, warn};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

static LOGGER: SimpleLogger = SimpleLogger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML file encoded in UTF-8
    file: PathBuf,

    /// Dump the parsed YAML content before processing
    #[arg(long, default_value_t = false)]
    echo: bool,

    /// Create missing output directories without prompting
    #[arg(short = 'y', long, default_value_t = false)]
    yes: bool,

    /// Log level for output
    #[arg(long, default_value = "false")]
    debug: bool,
}

fn main() -> Result<(), PipelineError> {
    // Initialize timer and logger
    let total_start = Instant::now();
    log::set_logger(&LOGGER).unwrap();

    // Acquire CLI args
    let args = Args::parse();
    if args.debug {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }

    // UI
    println!("yaml2data! Generate data files from a single YAML file");
    debug!("Input file: {}", args.file.display());

    // Load configuration
    let load_start = Instant::now();
    let text = fs::read_to_string(&args.file)?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&text)?;
    if args.echo {
        println!("{}", "-".repeat(70));
        println!("Content of [{}]", args.file.display());
        println!("{}", "-".repeat(70));
        print!("{}", serde_yaml::to_string(&doc)?);
    }
    let config: RawConfig = serde_yaml::from_value(doc)?;
    let load_time = load_start.elapsed();
    debug!(
        "Configuration loaded in {:.2?} | {} entries, {} active ids",
        load_time,
        config.datasets.len(),
        config.run.active_ids.len()
    );

    // Process each active dataset
    println!("Starting data generation...");
    let processing_start = Instant::now();
    let mut datasets_done = 0usize;
    let mut files_written = 0usize;
    for id in &config.run.active_ids {
        let Some(spec) = config.datasets.get(id) else {
            warn!("active id [{}] has no matching entry, skipping", id);
            continue;
        };
        let dataset = resolve_dataset(id, spec, &config.run.defaults)?;
        debug!(
            "dataset [{}]: {} data lines, {} output formats",
            id,
            dataset.data.len(),
            dataset.out_fmts.len()
        );
        let table = build_table(&dataset)?;
        let written = generate_outputs(&dataset, &table, args.yes)?;
        files_written += written.len();
        datasets_done += 1;
    }
    let processing_time = processing_start.elapsed();
    println!(
        "Data generation completed in {:.2?} | {} datasets, {} files",
        processing_time, datasets_done, files_written
    );

    let total_time = total_start.elapsed();
    debug!(
        "Performance breakdown: Load={:.1}%, Generation={:.1}%",
        (load_time.as_secs_f64() / total_time.as_secs_f64()) * 100.0,
        (processing_time.as_secs_f64() / total_time.as_secs_f64()) * 100.0
    );
    println!("\nTotal runtime: {:.2?}", total_time);
    Ok(())
}
