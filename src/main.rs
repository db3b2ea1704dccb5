use reportkit::parsing::constituents::load_constituents;
use reportkit::{HarvestConfig, Harvester, logging};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logging::init_logging();

    let config = HarvestConfig::default();
    tracing::info!("reportkit {} starting", reportkit::VERSION);

    let stocks = load_constituents(&config.paths.constituent_files)?;
    let mut harvester = Harvester::from_config(config)?;
    tracing::info!(
        "{} reports already downloaded",
        harvester.repository().len()
    );

    let summary = if stocks.is_empty() {
        tracing::warn!("No constituent tables found, harvesting existing snapshots only");
        harvester.run_snapshot_dir().await?
    } else {
        let snapshots = harvester.fetch_snapshots(&stocks).await;
        tracing::info!(
            "Snapshots ready: {} fetched, {} still missing after {} passes",
            snapshots.fetched,
            snapshots.missing,
            snapshots.passes
        );
        harvester.run(&stocks).await
    };

    tracing::info!("All download tasks finished");
    println!("{}", summary);
    Ok(())
}
