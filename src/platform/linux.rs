//! Linux platform implementation
//!
//! evdev for raw input device access (exclusive grab of button-capable
//! devices) and uinput for the virtual device that carries both forwarded
//! passthrough events and the daemon's own synthetic injections.

use super::EventResponse;
use crate::key::{KeyCode, KeyEvent};
use crate::ports::InjectPort;
use anyhow::{Context, Result, anyhow};
use evdev::uinput::VirtualDevice;
use evdev::{Device, EventType};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};

// ============================================================================
// Key Name Resolution
// ============================================================================

/// Get human-readable key name from a Linux evdev code
pub fn get_key_name(code: u32) -> String {
    if code > u16::MAX as u32 {
        return format!("UNKNOWN_{:#06X}", code);
    }
    format!("{:?}", evdev::KeyCode::new(code as u16))
}

/// Build reverse lookup map: name -> evdev code
pub fn build_key_name_map() -> HashMap<String, u32> {
    let mut map = HashMap::new();

    // Probe the evdev key range (0-767 covers all standard keys)
    for code in 0..768u32 {
        let name = get_key_name(code);
        if !name.starts_with("UNKNOWN") {
            let normalized = name.to_lowercase();
            map.insert(normalized.clone(), code);

            // Strip "KEY_" prefix for convenience: "KEY_POWER" -> "power"
            if let Some(short) = normalized.strip_prefix("key_") {
                map.insert(short.to_string(), code);
            }
            if let Some(short) = normalized.strip_prefix("btn_") {
                map.insert(short.to_string(), code);
            }
        }
    }

    map
}

// ============================================================================
// Synthetic Injection (InjectPort)
// ============================================================================

/// Injects key events through the shared uinput device.
///
/// uinput cannot carry policy flags, so the injected marker exists only in
/// process: events we emit never re-enter the grabbed physical devices, and
/// the marker guards the in-process replay paths.
#[derive(Clone)]
pub struct UinputInjector {
    device: Arc<Mutex<VirtualDevice>>,
}

impl InjectPort for UinputInjector {
    fn inject_key(&self, code: KeyCode, down: bool, repeat: u32, _policy_flags: u32) -> Result<()> {
        let events = [key_input_event(code, down, repeat)?, create_syn_report()];
        let mut device = self
            .device
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        device
            .emit(&events)
            .with_context(|| format!("failed to inject key {code}"))
    }
}

/// Build the raw input event for a key transition. Codes above the 16-bit
/// evdev range are rejected rather than truncated onto an unrelated key.
fn key_input_event(code: KeyCode, down: bool, repeat: u32) -> Result<evdev::InputEvent> {
    let raw = u16::try_from(code.code())
        .map_err(|_| anyhow!("key code {:#x} is outside the injectable range", code.code()))?;
    // evdev key values: 0 = release, 1 = press, 2 = auto-repeat
    let value = match (down, repeat) {
        (false, _) => 0,
        (true, 0) => 1,
        (true, _) => 2,
    };
    Ok(evdev::InputEvent::new(EventType::KEY.0, raw, value))
}

// ============================================================================
// Platform
// ============================================================================

/// Linux platform: grabbed source devices plus the virtual output device
pub struct Platform {
    uinput: Arc<Mutex<VirtualDevice>>,
}

impl Platform {
    /// Set up the virtual output device. Fails early with guidance when
    /// permissions are missing.
    pub fn create() -> Result<Self> {
        check_permissions()?;
        let uinput = create_virtual_device()?;
        info!("created virtual device for forwarding and injection");
        Ok(Self {
            uinput: Arc::new(Mutex::new(uinput)),
        })
    }

    /// Injection handle sharing this platform's virtual device
    pub fn injector(&self) -> UinputInjector {
        UinputInjector {
            device: Arc::clone(&self.uinput),
        }
    }

    /// Grab button devices and run the event loop. The handler sees every
    /// key transition (auto-repeats included) and decides per event whether
    /// the raw event is forwarded.
    pub async fn run<F, Fut>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(KeyEvent) -> Fut,
        Fut: Future<Output = EventResponse>,
    {
        info!("starting Linux input handler");

        setup_panic_hook();

        let paths = find_button_devices()?;
        if paths.is_empty() {
            return Err(anyhow!("no button-capable input devices found"));
        }

        let mut grabbed = Vec::new();
        for path in paths {
            match grab_device(&path) {
                Ok(device) => {
                    info!(
                        "grabbed device: {} ({})",
                        device.name().unwrap_or("unknown"),
                        path.display()
                    );
                    grabbed.push((path, device));
                }
                Err(e) => {
                    warn!("failed to grab {:?}: {}", path, e);
                }
            }
        }
        if grabbed.is_empty() {
            return Err(anyhow!("failed to grab any input devices"));
        }

        // Merge all device streams into one channel
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<(evdev::InputEvent, PathBuf)>();
        for (path, device) in grabbed {
            let tx = event_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = pump_device_events(device, path.clone(), tx).await {
                    warn!("device {} stopped: {}", path.display(), e);
                }
            });
        }
        drop(event_tx); // channel closes when all pumps exit

        while let Some((raw_event, _path)) = event_rx.recv().await {
            let Some(event) = convert_event(&raw_event) else {
                // Non-key events (SYN, MSC) from grabbed devices are
                // forwarded untouched so the device stays usable
                if raw_event.event_type() != EventType::SYNCHRONIZATION {
                    self.forward_raw(raw_event);
                }
                continue;
            };

            trace!(?event, "processing event");
            let response = handler(event).await;
            if response == EventResponse::Passthrough {
                self.forward_raw(raw_event);
            }
        }

        info!("all device streams closed, shutting down");
        Ok(())
    }

    fn forward_raw(&self, raw_event: evdev::InputEvent) {
        let mut device = self
            .uinput
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = device.emit(&[raw_event, create_syn_report()]) {
            warn!("failed to forward event: {}", e);
        }
    }
}

// ============================================================================
// Device Management
// ============================================================================

/// Buttons we require a device to expose before grabbing it
const BUTTON_CODES: [evdev::KeyCode; 4] = [
    evdev::KeyCode::KEY_POWER,
    evdev::KeyCode::KEY_VOLUMEUP,
    evdev::KeyCode::KEY_VOLUMEDOWN,
    evdev::KeyCode::KEY_CAMERA,
];

/// Find input devices exposing hardware buttons
fn find_button_devices() -> Result<Vec<PathBuf>> {
    let mut devices = Vec::new();

    for entry in std::fs::read_dir("/dev/input").context("failed to read /dev/input directory")? {
        let entry = entry?;
        let path = entry.path();

        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !filename.starts_with("event") {
            continue;
        }

        let Ok(device) = Device::open(&path) else {
            continue;
        };

        let has_buttons = device
            .supported_keys()
            .map(|keys| BUTTON_CODES.iter().any(|code| keys.contains(*code)))
            .unwrap_or(false);

        if has_buttons {
            devices.push(path);
        }
    }

    Ok(devices)
}

/// Grab a device for exclusive access
fn grab_device(path: &Path) -> Result<Device> {
    let mut device =
        Device::open(path).with_context(|| format!("failed to open device: {}", path.display()))?;

    device
        .grab()
        .with_context(|| format!("failed to grab device: {}", path.display()))?;

    Ok(device)
}

/// Pump events from a single device into the merge channel
async fn pump_device_events(
    device: Device,
    device_path: PathBuf,
    event_tx: mpsc::UnboundedSender<(evdev::InputEvent, PathBuf)>,
) -> Result<()> {
    let mut stream = device.into_event_stream()?;

    loop {
        match stream.next_event().await {
            Ok(event) => {
                if event_tx.send((event, device_path.clone())).is_err() {
                    // Channel closed, exit
                    break;
                }
            }
            Err(e) => {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Convert an evdev event to a key transition.
///
/// Auto-repeats (value 2) are kept as down transitions; the gesture engine
/// distinguishes them from fresh presses by tracking which keys it already
/// holds. Repeat cadence is load-bearing for the emulated-hold path, so
/// repeats are never dropped here.
fn convert_event(ev: &evdev::InputEvent) -> Option<KeyEvent> {
    if ev.event_type() != EventType::KEY {
        return None;
    }
    let code = KeyCode::new(ev.code() as u32);
    // value: 1 = press, 0 = release, 2 = auto-repeat
    let down = ev.value() != 0;
    Some(KeyEvent::new(code, down, 0))
}

// ============================================================================
// Virtual Device (uinput)
// ============================================================================

/// Create the virtual device carrying forwarded and injected key events
fn create_virtual_device() -> Result<VirtualDevice> {
    use evdev::AttributeSet;

    // Expose the full key range so any forwarded code is accepted
    let mut keys = AttributeSet::<evdev::KeyCode>::new();
    for code in 0..=767u16 {
        keys.insert(evdev::KeyCode::new(code));
    }

    let device = VirtualDevice::builder()?
        .name("gestured-virtual-buttons")
        .with_keys(&keys)?
        .build()?;

    Ok(device)
}

/// Create a SYN_REPORT synchronization event
fn create_syn_report() -> evdev::InputEvent {
    evdev::InputEvent::new(
        evdev::EventType::SYNCHRONIZATION.0,
        0, // SYN_REPORT code
        0,
    )
}

// ============================================================================
// Error Handling & Utilities
// ============================================================================

/// Check system permissions and requirements
fn check_permissions() -> Result<()> {
    if !Path::new("/dev/input").exists() {
        return Err(anyhow!("/dev/input not found. Are you running on Linux?"));
    }

    let readable = std::fs::read_dir("/dev/input")?
        .filter_map(|e| e.ok())
        .any(|e| {
            let path = e.path();
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("event"))
                .unwrap_or(false)
                && std::fs::File::open(&path).is_ok()
        });

    if !readable {
        return Err(anyhow!(
            "Cannot read /dev/input devices.\n\
            Add yourself to the 'input' group:\n  \
            sudo usermod -aG input $USER\n\
            Then log out and back in."
        ));
    }

    if !Path::new("/dev/uinput").exists() {
        return Err(anyhow!(
            "/dev/uinput not found. Load the uinput module:\n  \
            sudo modprobe uinput\n\n\
            To load automatically at boot:\n  \
            echo uinput | sudo tee /etc/modules-load.d/uinput.conf"
        ));
    }

    if OpenOptions::new().write(true).open("/dev/uinput").is_err() {
        return Err(anyhow!(
            "Cannot write to /dev/uinput.\n\
            Create a udev rule:\n  \
            echo 'KERNEL==\"uinput\", GROUP=\"input\", MODE=\"0660\"' | \\\n    \
            sudo tee /etc/udev/rules.d/99-input.rules\n  \
            sudo udevadm control --reload-rules\n  \
            sudo udevadm trigger"
        ));
    }

    Ok(())
}

/// Set up panic hook to ungrab devices on crash
fn setup_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        warn!("panic detected, attempting to ungrab devices");
        let _ = ungrab_all_devices();
        default_hook(panic_info);
    }));
}

/// Attempt to ungrab all devices (best effort)
fn ungrab_all_devices() -> Result<()> {
    for entry in std::fs::read_dir("/dev/input")? {
        let path = entry?.path();
        if let Some(filename) = path.file_name().and_then(|n| n.to_str())
            && filename.starts_with("event")
            && let Ok(mut device) = Device::open(&path)
        {
            let _ = device.ungrab();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    #[test]
    fn test_key_name_roundtrip() {
        let name = get_key_name(116);
        assert!(name == "KEY_POWER");

        let map = build_key_name_map();
        assert!(map.get("power") == Some(&116));
        assert!(map.get("key_power") == Some(&116));
    }

    #[test]
    fn test_key_event_values_and_range_guard() {
        let press = key_input_event(KeyCode::new(116), true, 0).unwrap();
        let repeat = key_input_event(KeyCode::new(116), true, 3).unwrap();
        let release = key_input_event(KeyCode::new(116), false, 0).unwrap();
        assert!(press.value() == 1);
        assert!(repeat.value() == 2);
        assert!(release.value() == 0);

        // A code past the evdev range must fail, not wrap onto another key
        assert!(key_input_event(KeyCode::new(0x1_0000), true, 0).is_err());
    }

    #[test]
    fn test_convert_keeps_auto_repeats() {
        let press = evdev::InputEvent::new(EventType::KEY.0, 116, 1);
        let repeat = evdev::InputEvent::new(EventType::KEY.0, 116, 2);
        let release = evdev::InputEvent::new(EventType::KEY.0, 116, 0);
        let syn = create_syn_report();

        assert!(convert_event(&press).unwrap().down);
        assert!(convert_event(&repeat).unwrap().down);
        assert!(!convert_event(&release).unwrap().down);
        assert!(convert_event(&syn).is_none());
    }
}
