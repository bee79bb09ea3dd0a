//! One handler per subcommand. Handlers print human summary lines on
//! stdout; route and ingest payloads go out as pretty JSON.

use std::error::Error;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use lastmile_dispatch::{Dispatcher, StationConfig};
use lastmile_domain::{DriverId, ParcelId, ParcelStore, SorterId, ZoneId};
use lastmile_ingest::SourceFormat;
use lastmile_sorting::{ScanAuthority, ScanReceipt, SortingStation};
use time::{OffsetDateTime, UtcOffset};

pub fn ingest(dispatcher: &Dispatcher, args: &[String]) -> Result<(), Box<dyn Error>> {
    let format: SourceFormat = arg_at(args, 0, "source format")?.parse()?;
    let path = PathBuf::from(arg_at(args, 1, "feed file")?);
    let driver = match args.get(2) {
        Some(raw) => Some(DriverId(raw.parse()?)),
        None => None,
    };
    let report = dispatcher.ingest_file(format, &path, driver, now_ms()?)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn create_driver(store: &dyn ParcelStore, args: &[String]) -> Result<(), Box<dyn Error>> {
    let name = args.join(" ");
    let name = name.trim();
    if name.is_empty() {
        return Err("missing driver name argument".into());
    }
    let driver = store.insert_driver(name)?;
    println!("Driver '{}' registered with id {}", driver.name, driver.id);
    Ok(())
}

pub fn assign(dispatcher: &Dispatcher, args: &[String]) -> Result<(), Box<dyn Error>> {
    let driver_id = DriverId(arg_at(args, 0, "driver id")?.parse()?);
    let ids = parse_parcel_ids(arg_at(args, 1, "parcel ids")?)?;
    let updated = dispatcher.assign(&ids, driver_id, now_ms()?)?;
    println!("{} parcels assigned to driver {}", updated, driver_id);
    Ok(())
}

pub fn geocode(dispatcher: &Dispatcher, args: &[String]) -> Result<(), Box<dyn Error>> {
    let ids = parse_parcel_ids(arg_at(args, 0, "parcel ids")?)?;
    let updated = dispatcher.geocode_missing(&ids)?;
    println!("{} of {} parcels geocoded", updated, ids.len());
    Ok(())
}

pub fn zone(dispatcher: &Dispatcher, args: &[String]) -> Result<(), Box<dyn Error>> {
    let zone_id = ZoneId(arg_at(args, 0, "zone id")?.parse()?);
    let updated = dispatcher.assign_zone(zone_id)?;
    println!("{} parcels tagged with zone {}", updated, zone_id);
    Ok(())
}

pub fn optimize(dispatcher: &Dispatcher, args: &[String]) -> Result<(), Box<dyn Error>> {
    let driver_id = DriverId(arg_at(args, 0, "driver id")?.parse()?);
    let depot = args[1..].join(" ");
    let depot = if depot.trim().is_empty() {
        None
    } else {
        Some(depot.as_str())
    };
    let route = dispatcher.optimize_route(driver_id, depot)?;
    println!("{}", serde_json::to_string_pretty(&route)?);
    Ok(())
}

pub fn manual(dispatcher: &Dispatcher, args: &[String]) -> Result<(), Box<dyn Error>> {
    let driver_id = DriverId(arg_at(args, 0, "driver id")?.parse()?);
    let ids = parse_parcel_ids(arg_at(args, 1, "parcel ids")?)?;
    let route = dispatcher.apply_manual_route(driver_id, &ids, None)?;
    println!("{}", serde_json::to_string_pretty(&route)?);
    Ok(())
}

pub fn scan_loop(station: &SortingStation, args: &[String]) -> Result<(), Box<dyn Error>> {
    let sorter_id = SorterId(arg_at(args, 0, "sorter id")?.parse()?);
    println!(
        "Scanning as sorter {}. Enter tracking numbers, 'quit' to stop.",
        sorter_id
    );
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let tracking = line.trim();
        if tracking.is_empty() {
            continue;
        }
        if tracking.eq_ignore_ascii_case("quit") {
            break;
        }
        match station.scan(tracking, sorter_id, now_ms()?) {
            Ok(receipt) => print_receipt(&receipt),
            Err(e) => eprintln!("scan failed: {}", e),
        }
    }
    Ok(())
}

pub fn unscan(station: &SortingStation, args: &[String]) -> Result<(), Box<dyn Error>> {
    let sorter_id = SorterId(arg_at(args, 0, "sorter id")?.parse()?);
    let tracking = arg_at(args, 1, "tracking number")?;
    let authority = if args.iter().any(|arg| arg == "--elevated") {
        ScanAuthority::Elevated
    } else {
        ScanAuthority::Standard
    };
    let parcel = station.unscan(tracking, sorter_id, authority)?;
    println!("{} reverted to {}", parcel.tracking_no, parcel.status.as_str());
    Ok(())
}

pub fn summary(station: &SortingStation, args: &[String]) -> Result<(), Box<dyn Error>> {
    let driver_id = DriverId(arg_at(args, 0, "driver id")?.parse()?);
    let summary = station.driver_bag_summary(driver_id)?;
    println!(
        "Driver {}: {} of {} sorted, {} pending ({}%)",
        summary.driver_id,
        summary.sorted,
        summary.total_parcels,
        summary.pending_sort,
        summary.progress_percent
    );
    Ok(())
}

pub fn stats(
    station: &SortingStation,
    config: &StationConfig,
    args: &[String],
) -> Result<(), Box<dyn Error>> {
    let sorter_id = SorterId(arg_at(args, 0, "sorter id")?.parse()?);
    let offset = UtcOffset::from_hms(config.stats.utc_offset_hours, 0, 0)?;
    let today = OffsetDateTime::now_utc().to_offset(offset).date();
    let stats = station.sorter_stats(sorter_id, today, offset)?;
    match stats.last_scan_ms {
        Some(ts) => {
            let at = OffsetDateTime::from_unix_timestamp((ts / 1000) as i64)?.to_offset(offset);
            println!(
                "Sorter {}: {} scans today, last scan {}",
                stats.sorter_id, stats.scanned, at
            );
        }
        None => println!("Sorter {}: no scans on record", stats.sorter_id),
    }
    Ok(())
}

pub fn status(dispatcher: &Dispatcher) -> Result<(), Box<dyn Error>> {
    let counts = dispatcher.counts()?;
    println!("Parcels on record: {}", counts.total);
    println!("By status:");
    for (status, count) in &counts.by_status {
        println!("  {:<10} {}", status, count);
    }
    println!("By source:");
    for (source, count) in &counts.by_source {
        println!("  {:<10} {}", source, count);
    }
    Ok(())
}

fn print_receipt(receipt: &ScanReceipt) {
    let driver = receipt.driver_name.as_deref().unwrap_or("unassigned");
    let position = match receipt.bag_position {
        Some(position) => position.to_string(),
        None => "-".to_string(),
    };
    let zone = receipt.zone_name.as_deref().unwrap_or("-");
    let marker = if receipt.already_sorted {
        " (already sorted)"
    } else {
        ""
    };
    println!(
        "{}  bag {}  driver {}  zone {}{}",
        receipt.tracking_no, position, driver, zone, marker
    );
}

fn arg_at<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str, Box<dyn Error>> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| format!("missing {} argument", what).into())
}

fn parse_parcel_ids(raw: &str) -> Result<Vec<ParcelId>, Box<dyn Error>> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<i64>()
                .map(ParcelId)
                .map_err(|e| format!("bad parcel id '{}': {}", token, e).into())
        })
        .collect()
}

fn now_ms() -> Result<u64, Box<dyn Error>> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(elapsed.as_millis() as u64)
}
