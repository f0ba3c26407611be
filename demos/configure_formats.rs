extern crate gm65_barcodescanner;

use std::time::Duration;

use anyhow::Result;
use gm65_barcodescanner::{FormatCode, ScanResult, ScannerConfig, interface::BarcodeScanner};
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // console output
    let console_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry().with(console_layer).init();

    let serial_port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| String::from("/dev/ttyUSB0"));
    info!("using port {}", serial_port);
    let config = ScannerConfig::from_options(9600, 1.0, 2)?;
    let mut scanner = BarcodeScanner::open(&serial_port, config)?;
    scanner.configure()?;

    info!("only decoding QR and DataMatrix codes");
    scanner.disable_all_formats()?;
    scanner.enable_format(FormatCode::Qr)?;
    scanner.enable_format(FormatCode::DataMatrix)?;
    scanner.disable_setting_scanning()?;

    match scanner.scan(Duration::from_secs(6))? {
        ScanResult::Decoded(data) => println!("scanned: {}", String::from_utf8_lossy(&data)),
        ScanResult::NoRead(message) => println!("nothing decoded, scanner sent {:02X?}", message),
    }

    // keep the format selection across power cycles
    scanner.save_config()?;
    scanner.close()?;
    Ok(())
}
