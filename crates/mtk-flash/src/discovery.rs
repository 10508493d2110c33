//! Finds the one attached device in Preloader (or DA) mode and hands back a
//! [`Port`] ready for the handshake.
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use mtk_transport::UsbBulk;

use crate::{Port, Result, err::Error};

/// Records the first hotplug arrival matching the VID/PID filters the
/// caller registered, so the polling loop in [`open`] has something to
/// check without blocking inside the callback itself.
struct Arrival {
    found: Arc<Mutex<Option<rusb::Device<rusb::Context>>>>,
}

impl rusb::Hotplug<rusb::Context> for Arrival {
    fn device_arrived(&mut self, device: rusb::Device<rusb::Context>) {
        let mut found = self.found.lock().unwrap();
        if found.is_none() {
            *found = Some(device);
        }
    }

    fn device_left(&mut self, _device: rusb::Device<rusb::Context>) {}
}

fn enumerate_matches(context: &rusb::Context) -> Result<Vec<rusb::Device<rusb::Context>>> {
    let mut matches = Vec::new();
    for device in context.devices()?.iter() {
        let descriptor = device.device_descriptor()?;
        if descriptor.vendor_id() == mtk_transport::usb::VENDOR_ID && descriptor.product_id() == mtk_transport::usb::PRODUCT_ID {
            matches.push(device);
        }
    }
    Ok(matches)
}

/// Blocks until exactly one MediaTek device is available, then opens it,
/// enables kernel-driver auto-detach, and claims interface 0 exactly once.
///
/// A device already plugged in is picked up by the initial enumeration;
/// one that isn't is waited for via a hotplug registration and the USB
/// library's event loop, the same `libusb_hotplug_register_callback` +
/// `libusb_handle_events` dance the original performs — there is no
/// timeout, matching the original's unconditional `while (dev == NULL)`.
pub fn open(verbose: bool) -> Result<Port> {
    let context = rusb::Context::new()?;
    context.set_log_level(if verbose { rusb::LogLevel::Debug } else { rusb::LogLevel::Info });

    let matches = enumerate_matches(&context)?;
    if matches.len() > 1 {
        return Err(Error::MoreThanOneDevice);
    }

    let device = match matches.into_iter().next() {
        Some(device) => device,
        None => {
            let found: Arc<Mutex<Option<rusb::Device<rusb::Context>>>> = Arc::new(Mutex::new(None));
            let _registration = rusb::HotplugBuilder::new()
                .vendor_id(mtk_transport::usb::VENDOR_ID)
                .product_id(mtk_transport::usb::PRODUCT_ID)
                .enumerate(true)
                .register(&context, Box::new(Arrival { found: found.clone() }))?;

            loop {
                if let Some(device) = found.lock().unwrap().take() {
                    break device;
                }
                context.handle_events(Some(Duration::from_millis(500)))?;
            }
        }
    };

    let mut handle = device.open()?;
    // Not supported on every platform; best-effort only.
    let _ = handle.set_auto_detach_kernel_driver(true);
    handle.claim_interface(mtk_transport::usb::INTERFACE)?;

    Ok(mtk_transport::Transport::new(UsbBulk::new(handle)))
}
