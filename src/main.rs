//! iio-info - Print the device tree of a context
//!
//! Loads a context snapshot (TOML or JSON), builds the entity graph over the
//! simulated backend and prints every device, channel and attribute. All
//! attribute values are fetched through the batched read path.
//!
//! Usage: `iio-info <snapshot> [--live] [--xml]`

use anyhow::Context as _;
use clap::Parser;
use iio_core::{
    backend::{SimulatedBackend, SimulationMode},
    AttrBatch, Context, ContextConfig, Device,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "iio-info")]
#[command(about = "Print the device tree of an IIO context snapshot", long_about = None)]
struct Cli {
    /// Context snapshot (TOML or JSON)
    snapshot: PathBuf,

    /// Serve buffers and registers instead of attribute reads only
    #[arg(long)]
    live: bool,

    /// Print the XML description and exit
    #[arg(long)]
    xml: bool,
}

fn print_batch(indent: &str, batch: &AttrBatch) {
    for (name, value) in batch.to_strings() {
        match value {
            Ok(value) => println!("{}attr: {} value: {}", indent, name, value),
            Err(e) => println!("{}attr: {} ERROR: {} ({})", indent, name, e, -e.errno()),
        }
    }
}

fn print_device(dev: &Device, ctx: &Context) -> anyhow::Result<()> {
    println!("\t{}: {}", dev.id(), dev.label());
    if let Some(trigger) = ctx.trigger(dev.index())? {
        println!("\t\ttrigger: {}", trigger.label());
    }

    println!("\t\t{} channels found:", dev.channels_count());
    for chn in dev.channels() {
        let kind = if chn.is_scan_element() { "" } else { " (not a scan element)" };
        match chn.name() {
            Some(name) => println!("\t\t\t{}: {} ({}){}", chn.id(), name, chn.direction(), kind),
            None => println!("\t\t\t{}: ({}){}", chn.id(), chn.direction(), kind),
        }
        if let (Some(index), Some(format)) = (chn.index(), chn.data_format()) {
            println!("\t\t\tindex: {}, format: {}", index, format);
        }
        if !chn.attrs().is_empty() {
            println!("\t\t\t{} channel-specific attributes found:", chn.attrs_count());
            let batch = chn
                .read_all_attrs()
                .with_context(|| format!("reading attributes of {}", chn.key()))?;
            print_batch("\t\t\t\t", &batch);
        }
    }

    if !dev.attrs().is_empty() {
        println!("\t\t{} device-specific attributes found:", dev.attrs_count());
        print_batch("\t\t\t", &dev.read_all_attrs()?);
    }
    if !dev.debug_attrs().is_empty() {
        println!("\t\t{} debug attributes found:", dev.debug_attrs_count());
        print_batch("\t\t\t", &dev.read_all_debug_attrs()?);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ContextConfig::default_path()
        .map(ContextConfig::load_or_default)
        .unwrap_or_default();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_filter))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mode = if cli.live {
        SimulationMode::Live
    } else {
        SimulationMode::Snapshot
    };
    tracing::info!("Loading snapshot {}", cli.snapshot.display());

    let backend = SimulatedBackend::from_file(&cli.snapshot, mode)
        .with_context(|| format!("loading {}", cli.snapshot.display()))?;
    let ctx = Context::with_config(backend, &config)?;

    if cli.xml {
        println!("{}", ctx.xml());
        return Ok(());
    }

    let version = ctx.version();
    println!(
        "Backend version: {}.{} (git tag: {})",
        version.major, version.minor, version.git_tag
    );
    println!("Backend description string: {}", ctx.description());
    println!("IIO context has {} devices:", ctx.devices_count());
    for dev in ctx.devices() {
        print_device(dev, &ctx)?;
    }

    let stats = ctx.stats();
    tracing::info!(
        "{} backend operations, {} failed, {} bytes in, {:.1} us average",
        stats.successful_ops + stats.failed_ops,
        stats.failed_ops,
        stats.bytes_in,
        stats.avg_time_us()
    );
    Ok(())
}
