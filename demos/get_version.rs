extern crate gm65_barcodescanner;

use anyhow::Result;
use gm65_barcodescanner::{ModuleVariant, ScannerConfig, interface::BarcodeScanner};
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
    let config = ScannerConfig::default().with_variant(ModuleVariant::Waveshare);
    let mut scanner = BarcodeScanner::open(serial_port, config)?;
    scanner.configure()?;
    let hw_version = scanner.hardware_version()?;
    let sw_version = scanner.software_version()?;
    println!("version HW {}, SW {}", hw_version, sw_version);
    let sw_date = scanner.software_date()?;
    println!("SW build date {}", sw_date.format("%Y-%m-%d"));

    Ok(())
}
