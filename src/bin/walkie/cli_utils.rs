use anyhow::Result;
use walkie::audio;

/// Print input devices. `WALKIE_TEST_DEVICES` (comma-separated) stands in for
/// the host list so the output can be tested without audio hardware.
pub(crate) fn list_input_devices() -> Result<()> {
    let devices = match std::env::var("WALKIE_TEST_DEVICES") {
        Ok(raw) => parse_device_list(&raw),
        Err(_) => audio::list_input_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio input devices: {err}");
            Vec::new()
        }),
    };

    if devices.is_empty() {
        println!("No audio input devices detected.");
    } else {
        println!("Available audio input devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
    Ok(())
}

fn parse_device_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
