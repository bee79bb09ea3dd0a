use std::path::PathBuf;
use std::sync::Arc;

use lastmile_dispatch::{logging, Dispatcher, NominatimGeocoder, StationConfig};
use lastmile_sorting::SortingStation;
use lastmile_store::SqliteStore;
use tracing::info;

mod commands;

const USAGE: &str = "\
Usage: lastmile-station [--config <path>] <command> [args]

Commands:
  ingest <gofo|cainiao> <file> [driver_id]    Import a carrier feed
  driver <name>                               Register a driver
  assign <driver_id> <id,id,...>              Assign parcels to a driver
  geocode <id,id,...>                         Geocode parcels without coordinates
  zone <zone_id>                              Tag parcels inside a zone boundary
  optimize <driver_id> [depot address]        Compute and store a route
  manual <driver_id> <id,id,...>              Apply an operator-chosen stop order
  scan <sorter_id>                            Interactive scan loop ('quit' to stop)
  unscan <sorter_id> <tracking> [--elevated]  Revert a scan
  summary <driver_id>                         Bag progress for a driver
  stats <sorter_id>                           Today's scan stats for a sorter
  status                                      Inventory counters";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let (config_path, rest) = split_args(&args)?;
    let config = match &config_path {
        Some(path) => StationConfig::from_file(path)?,
        None => StationConfig::default_config(),
    };

    let command = match rest.first() {
        Some(command) => command.as_str(),
        None => {
            eprintln!("{}", USAGE);
            return Err("missing command".into());
        }
    };

    let store = Arc::new(SqliteStore::open(&config.store.path)?);
    let geocoder = NominatimGeocoder::new(&config.geocoder)?;
    let dispatcher = Dispatcher::new(store.clone(), Box::new(geocoder), &config)?;
    let station = SortingStation::new(store.clone());
    info!(store = %config.store.path, command, "Station ready");

    let args = &rest[1..];
    match command {
        "ingest" => commands::ingest(&dispatcher, args),
        "driver" => commands::create_driver(store.as_ref(), args),
        "assign" => commands::assign(&dispatcher, args),
        "geocode" => commands::geocode(&dispatcher, args),
        "zone" => commands::zone(&dispatcher, args),
        "optimize" => commands::optimize(&dispatcher, args),
        "manual" => commands::manual(&dispatcher, args),
        "scan" => commands::scan_loop(&station, args),
        "unscan" => commands::unscan(&station, args),
        "summary" => commands::summary(&station, args),
        "stats" => commands::stats(&station, &config, args),
        "status" => commands::status(&dispatcher),
        other => {
            eprintln!("{}", USAGE);
            Err(format!("unknown command: {}", other).into())
        }
    }
}

fn split_args(
    args: &[String],
) -> Result<(Option<PathBuf>, Vec<String>), Box<dyn std::error::Error>> {
    let mut config_path = None;
    let mut rest = Vec::new();
    let mut args_iter = args.iter().skip(1);
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            match args_iter.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => return Err("--config was provided without a path".into()),
            }
        } else {
            rest.push(arg.clone());
        }
    }
    Ok((config_path, rest))
}
