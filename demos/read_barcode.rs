extern crate gm65_barcodescanner;

use std::time::Duration;

use anyhow::Result;
use gm65_barcodescanner::{
    IlluminationMode, OperationMode, ScanArea, TargetLightMode, interface::BarcodeScanner,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // console output
    let console_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry().with(console_layer).init();

    let serial_port = "/dev/ttyAMA0";
    info!("using port {}", serial_port);
    let mut scanner = BarcodeScanner::new(serial_port)?;
    scanner.configure()?;

    info!("setting mode");
    scanner.set_mode(
        false,
        false,
        TargetLightMode::Standard,
        IlluminationMode::Standard,
        OperationMode::Command,
    )?;

    info!("setting scan area and enabling all barcodes");
    scanner.set_scan_area(ScanArea::Center)?;
    scanner.enable_all_formats()?;

    info!("setting scan time to 10s");
    scanner.set_scan_duration(Duration::from_secs(10))?;

    info!("starting scan");
    let result = scanner.scan(Duration::from_secs(12))?;
    if result.is_decoded() {
        println!("{}", result);
    } else {
        println!("no barcode could be identified");
    }

    scanner.close()?;
    Ok(())
}
