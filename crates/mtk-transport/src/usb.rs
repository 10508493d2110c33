use std::time::Duration;

use crate::err::Result;
use crate::RawIo;

pub const VENDOR_ID: u16 = 0x0e8d;
pub const PRODUCT_ID: u16 = 0x2000;
pub const INTERFACE: u8 = 0;
pub const ENDPOINT_IN: u8 = 0x81;
pub const ENDPOINT_OUT: u8 = 0x01;

const TIMEOUT: Duration = Duration::from_millis(1000);

/// [`RawIo`] over an already-opened, already-claimed USB device handle.
///
/// Claiming and recipient selection are the caller's job; this just moves
/// bytes over the bulk endpoint pair and issues the one class control
/// transfer the Preloader handshake needs first.
pub struct UsbBulk<T: rusb::UsbContext> {
    handle: rusb::DeviceHandle<T>,
}

impl<T: rusb::UsbContext> UsbBulk<T> {
    pub fn new(handle: rusb::DeviceHandle<T>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &rusb::DeviceHandle<T> {
        &self.handle
    }

    /// bmRequestType=0x21 (class, host-to-device, recipient=interface),
    /// bRequest=0x20, wValue=0, wIndex=0, no data. Precedes the first
    /// handshake byte and nothing else.
    pub fn control_handshake(&self) -> Result<()> {
        self.handle.write_control(
            rusb::request_type(
                rusb::Direction::Out,
                rusb::RequestType::Class,
                rusb::Recipient::Interface,
            ),
            0x20,
            0,
            0,
            &[],
            TIMEOUT,
        )?;
        Ok(())
    }
}

impl<T: rusb::UsbContext> RawIo for UsbBulk<T> {
    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.handle.read_bulk(ENDPOINT_IN, buf, TIMEOUT)?)
    }

    fn bulk_write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.handle.write_bulk(ENDPOINT_OUT, buf, TIMEOUT)?)
    }
}
