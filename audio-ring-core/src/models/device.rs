use serde::{Deserialize, Serialize};

/// Direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFlow {
    /// Output endpoint (speakers, headphones). Captured through loopback.
    Render,
    /// Input endpoint (microphone).
    Capture,
}

/// An audio endpoint that a session can capture from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Platform endpoint identifier. Empty for the platform default, which is
    /// resolved when the device is opened.
    pub id: String,
    pub name: String,
    pub flow: DeviceFlow,
    pub is_default: bool,
}

impl AudioDevice {
    /// Whether capturing from this device means recording what it plays.
    pub fn is_loopback(&self) -> bool {
        self.flow == DeviceFlow::Render
    }

    /// Human-readable label used in device pickers.
    pub fn display_name(&self) -> String {
        match (self.is_default, self.flow) {
            (true, DeviceFlow::Render) => "Default output (System Sound)".into(),
            (true, DeviceFlow::Capture) => "Default input (Microphone)".into(),
            (false, DeviceFlow::Render) => format!("Output: {}", self.name),
            (false, DeviceFlow::Capture) => format!("Input: {}", self.name),
        }
    }
}

/// Snapshot of the endpoints available when it was built.
///
/// Built once by a [`CaptureHost`](crate::traits::capture_host::CaptureHost),
/// queried by index when a session is created, then dropped. Entries keep the
/// enumeration order: default output, active outputs, default input, active
/// inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCatalog {
    devices: Vec<AudioDevice>,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, device: AudioDevice) {
        self.devices.push(device);
    }

    pub fn get(&self, index: usize) -> Option<&AudioDevice> {
        self.devices.get(index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AudioDevice> {
        self.devices.iter()
    }

    pub fn default_output(&self) -> Option<&AudioDevice> {
        self.devices
            .iter()
            .find(|d| d.is_default && d.flow == DeviceFlow::Render)
    }

    pub fn default_input(&self) -> Option<&AudioDevice> {
        self.devices
            .iter()
            .find(|d| d.is_default && d.flow == DeviceFlow::Capture)
    }

    /// Labels for every entry, index-aligned with [`get`](Self::get).
    pub fn display_names(&self) -> Vec<String> {
        self.devices.iter().map(AudioDevice::display_name).collect()
    }
}

impl FromIterator<AudioDevice> for DeviceCatalog {
    fn from_iter<I: IntoIterator<Item = AudioDevice>>(iter: I) -> Self {
        Self {
            devices: iter.into_iter().collect(),
        }
    }
}
