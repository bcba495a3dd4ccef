use ble_uart_tester::domain::serial::SerialRange;
use ble_uart_tester::domain::settings::{Settings, SettingsService};
use ble_uart_tester::infrastructure::logging;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let mut settings_service = SettingsService::new()?;

    // Optional range override: ble_uart_tester <start> <end>
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [start, end] = args.as_slice() {
        SerialRange::parse(start, end)?;
        settings_service.update_serial_range(start, end)?;
    }

    let _logging_guard = logging::init_logger(&settings_service.get().log_settings)?;
    info!(
        "Starting BLE UART tester (settings: {})",
        settings_service.path().display()
    );

    let settings = settings_service.get().clone();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(settings)).map_err(|e| {
        error!("Run failed: {}", e);
        e
    })
}

#[cfg(windows)]
async fn run(settings: Settings) -> anyhow::Result<()> {
    use ble_uart_tester::infrastructure::bluetooth::service::BatchTester;

    let report = BatchTester::new(settings).run().await?;
    info!("Done, {} devices in report", report.total());
    Ok(())
}

#[cfg(not(windows))]
async fn run(_settings: Settings) -> anyhow::Result<()> {
    anyhow::bail!("No Bluetooth backend available on this platform")
}
