//! Output device listing.

use clap::Args;

#[derive(Args)]
pub struct DevicesArgs {}

pub fn run(_args: DevicesArgs) -> anyhow::Result<()> {
    let devices = rill_io::list_devices()?;
    if devices.is_empty() {
        println!("No output devices found");
        return Ok(());
    }
    println!("Output devices:");
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!(
            "  {}{}  {} Hz, {} ch",
            device.name, marker, device.default_sample_rate, device.channels
        );
    }
    Ok(())
}
