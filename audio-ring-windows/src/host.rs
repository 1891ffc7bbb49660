//! Windows endpoint enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to build a [`DeviceCatalog`] of render
//! (loopback) and capture endpoints, and to open a [`WasapiCapture`] on one
//! of them.

use std::sync::Arc;

use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::core::HSTRING;

use audio_ring_core::models::config::CaptureConfiguration;
use audio_ring_core::models::device::{AudioDevice, DeviceCatalog, DeviceFlow};
use audio_ring_core::models::error::CaptureError;
use audio_ring_core::traits::capture_host::CaptureHost;

use crate::com::{take_pwstr, MtaUsage};
use crate::error::WasapiResultExt;
use crate::wasapi_capture::WasapiCapture;

/// Capture host backed by WASAPI shared mode.
pub struct WasapiHost {
    enumerator: IMMDeviceEnumerator,
    mta: Arc<MtaUsage>,
}

// SAFETY: IMMDeviceEnumerator is free-threaded and the MTA is held by `mta`.
unsafe impl Send for WasapiHost {}
unsafe impl Sync for WasapiHost {}

impl WasapiHost {
    /// Join the multithreaded apartment and create the endpoint enumerator.
    pub fn new() -> Result<Self, CaptureError> {
        let mta = MtaUsage::acquire()?;
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
                .device_call("CoCreateInstance(MMDeviceEnumerator)")?;
        Ok(Self { enumerator, mta })
    }

    fn has_default(&self, data_flow: EDataFlow) -> bool {
        unsafe { self.enumerator.GetDefaultAudioEndpoint(data_flow, eConsole) }.is_ok()
    }

    fn push_active(&self, catalog: &mut DeviceCatalog, data_flow: EDataFlow, flow: DeviceFlow) -> Result<(), CaptureError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(data_flow, DEVICE_STATE_ACTIVE)
                .device_call("EnumAudioEndpoints")?;
            let count = collection.GetCount().device_call("IMMDeviceCollection::GetCount")?;

            for i in 0..count {
                let device = match collection.Item(i) {
                    Ok(d) => d,
                    Err(e) => {
                        log::warn!("Skipping {:?} endpoint {}: {}", flow, i, e);
                        continue;
                    }
                };

                let id = match device.GetId() {
                    Ok(raw) => take_pwstr(raw),
                    Err(e) => {
                        log::warn!("Skipping {:?} endpoint {} without id: {}", flow, i, e);
                        continue;
                    }
                };

                let name = friendly_name(&device).unwrap_or_else(|| format!("Device {}", i));

                catalog.push(AudioDevice {
                    id,
                    name,
                    flow,
                    is_default: false,
                });
            }
        }
        Ok(())
    }
}

impl CaptureHost for WasapiHost {
    type Backend = WasapiCapture;

    fn enumerate_devices(&self) -> Result<DeviceCatalog, CaptureError> {
        let mut catalog = DeviceCatalog::new();

        catalog.push(default_entry(DeviceFlow::Render));
        self.push_active(&mut catalog, eRender, DeviceFlow::Render)?;

        // Machines without a microphone have no default capture endpoint
        if self.has_default(eCapture) {
            catalog.push(default_entry(DeviceFlow::Capture));
        }
        self.push_active(&mut catalog, eCapture, DeviceFlow::Capture)?;

        log::debug!("Enumerated {} audio endpoints", catalog.len());
        Ok(catalog)
    }

    fn open_device(
        &self,
        device: &AudioDevice,
        config: &CaptureConfiguration,
    ) -> Result<Self::Backend, CaptureError> {
        let data_flow = match device.flow {
            DeviceFlow::Render => eRender,
            DeviceFlow::Capture => eCapture,
        };

        let endpoint = unsafe {
            if device.id.is_empty() {
                self.enumerator
                    .GetDefaultAudioEndpoint(data_flow, eConsole)
                    .device_call("GetDefaultAudioEndpoint")?
            } else {
                self.enumerator
                    .GetDevice(&HSTRING::from(device.id.as_str()))
                    .device_call("IMMDeviceEnumerator::GetDevice")?
            }
        };

        log::info!("Opening {}", device.display_name());
        Ok(WasapiCapture::new(
            endpoint,
            device.flow,
            config.buffer_duration(),
            Arc::clone(&self.mta),
        ))
    }
}

fn default_entry(flow: DeviceFlow) -> AudioDevice {
    AudioDevice {
        id: String::new(),
        name: String::new(),
        flow,
        is_default: true,
    }
}

/// Read `PKEY_Device_FriendlyName` from the endpoint's property store.
fn friendly_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;
        let value = store.GetValue(&PKEY_Device_FriendlyName).ok()?;
        let name = value.to_string();
        (!name.is_empty()).then_some(name)
    }
}
