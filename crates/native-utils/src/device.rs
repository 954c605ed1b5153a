use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Resolves an input device by name, falling back to the host default.
pub fn get_or_default_input(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());

    let Some(target) = device_name else {
        return host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No default input device"));
    };

    for device in host.input_devices()? {
        if device.name().is_ok_and(|name| name == target) {
            return Ok(device);
        }
    }
    Err(anyhow::anyhow!("Input device '{}' not found", target))
}

/// Resolves an output device by name, falling back to the host default.
pub fn get_or_default_output(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();

    let Some(target) = device_name else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("No default output device"));
    };

    for device in host.output_devices()? {
        if device.name().is_ok_and(|name| name == target) {
            return Ok(device);
        }
    }
    Err(anyhow::anyhow!("Output device '{}' not found", target))
}
