//! Framed transport over a single USB bulk endpoint pair.
//!
//! A [`Transport`] buffers reads in 512-byte packets the way the device
//! hands them back, retries short writes, and layers big-endian scalar
//! and echo (write-then-read-back-compare) primitives on top. It is
//! generic over [`RawIo`] so the exact same buffering and scalar logic
//! runs against a real device or an in-memory double in tests.

pub mod err;
pub mod usb;

use err::{Error, Result};

pub use usb::UsbBulk;

pub const PACKET_SIZE: usize = 512;

/// Raw, unbuffered byte transfer a [`Transport`] is built on.
pub trait RawIo {
    /// Reads at most `buf.len()` bytes, returning the number actually read.
    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize>;
    /// Writes at most `buf.len()` bytes, returning the number actually written.
    fn bulk_write(&mut self, buf: &[u8]) -> Result<usize>;
}

/// Buffered reader and scalar codec over a [`RawIo`].
pub struct Transport<T: RawIo> {
    io: T,
    buffer: [u8; PACKET_SIZE],
    offset: usize,
    available: usize,
}

impl<T: RawIo> Transport<T> {
    pub fn new(io: T) -> Self {
        Self {
            io,
            buffer: [0; PACKET_SIZE],
            offset: 0,
            available: 0,
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.io
    }

    pub fn into_inner(self) -> T {
        self.io
    }

    /// Discards any buffered, not-yet-returned bytes without touching the wire.
    pub fn flush(&mut self) {
        self.available = 0;
    }

    /// Fills `buf` completely, pulling fresh 512-byte packets as needed.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            if self.available == 0 {
                let n = self.io.bulk_read(&mut self.buffer)?;
                self.offset = 0;
                self.available = n;
            }
            let n = (buf.len() - written).min(self.available);
            buf[written..written + n].copy_from_slice(&self.buffer[self.offset..self.offset + n]);
            written += n;
            self.offset += n;
            self.available -= n;
        }
        Ok(())
    }

    /// Reads and discards `len` bytes, e.g. to skip a report the caller
    /// doesn't need without abandoning buffered framing.
    pub fn read_discard(&mut self, mut len: usize) -> Result<()> {
        let mut scratch = [0u8; PACKET_SIZE];
        while len > 0 {
            let n = len.min(scratch.len());
            self.read(&mut scratch[..n])?;
            len -= n;
        }
        Ok(())
    }

    /// Writes all of `buf`, retrying on short writes.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let mut sent = 0;
        while sent < buf.len() {
            let n = self.io.bulk_write(&buf[sent..])?;
            sent += n;
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0; 1];
        self.read(&mut b)?;
        Ok(b[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0; 2];
        self.read(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0; 4];
        self.read(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut b = [0; 8];
        self.read(&mut b)?;
        Ok(u64::from_be_bytes(b))
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    /// Writes `value` then reads the same width back, failing if the
    /// device didn't return exactly what was sent.
    pub fn echo_u8(&mut self, value: u8) -> Result<()> {
        self.write_u8(value)?;
        let got = self.read_u8()?;
        if got != value {
            return Err(Error::EchoMismatch {
                written: value as u64,
                got: got as u64,
            });
        }
        Ok(())
    }

    pub fn echo_u16(&mut self, value: u16) -> Result<()> {
        self.write_u16(value)?;
        let got = self.read_u16()?;
        if got != value {
            return Err(Error::EchoMismatch {
                written: value as u64,
                got: got as u64,
            });
        }
        Ok(())
    }

    pub fn echo_u32(&mut self, value: u32) -> Result<()> {
        self.write_u32(value)?;
        let got = self.read_u32()?;
        if got != value {
            return Err(Error::EchoMismatch {
                written: value as u64,
                got: got as u64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted duplex: packets queued with `queue_read` come back in
    /// order, one per `bulk_read` call; writes are recorded verbatim.
    struct Scripted {
        to_read: VecDeque<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                to_read: VecDeque::new(),
                written: Vec::new(),
            }
        }

        fn queue_read(&mut self, packet: Vec<u8>) {
            self.to_read.push_back(packet);
        }
    }

    impl RawIo for Scripted {
        fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let packet = self.to_read.pop_front().expect("unscripted read");
            buf[..packet.len()].copy_from_slice(&packet);
            Ok(packet.len())
        }

        fn bulk_write(&mut self, buf: &[u8]) -> Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    /// Loopback: every byte written is appended to a FIFO that reads drain
    /// from, optionally complemented to simulate a broken device.
    struct Loopback {
        queue: VecDeque<u8>,
        invert: bool,
    }

    impl Loopback {
        fn new(invert: bool) -> Self {
            Self {
                queue: VecDeque::new(),
                invert,
            }
        }
    }

    impl RawIo for Loopback {
        fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let n = buf.len().min(self.queue.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.queue.pop_front().unwrap();
            }
            Ok(n)
        }

        fn bulk_write(&mut self, buf: &[u8]) -> Result<usize> {
            for &b in buf {
                self.queue.push_back(if self.invert { !b } else { b });
            }
            Ok(buf.len())
        }
    }

    #[test]
    fn read_spans_multiple_packets() {
        let mut io = Scripted::new();
        io.queue_read(vec![1, 2, 3]);
        io.queue_read(vec![4, 5]);
        let mut transport = Transport::new(io);
        let mut buf = [0u8; 5];
        transport.read(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn read_buffers_leftovers_across_calls() {
        let mut io = Scripted::new();
        io.queue_read(vec![0xaa, 0xbb, 0xcc, 0xdd]);
        let mut transport = Transport::new(io);
        let mut first = [0u8; 2];
        transport.read(&mut first).unwrap();
        assert_eq!(first, [0xaa, 0xbb]);
        let mut second = [0u8; 2];
        transport.read(&mut second).unwrap();
        assert_eq!(second, [0xcc, 0xdd]);
    }

    #[test]
    fn flush_drops_buffered_bytes() {
        let mut io = Scripted::new();
        io.queue_read(vec![1, 2, 3, 4]);
        io.queue_read(vec![9]);
        let mut transport = Transport::new(io);
        let mut one = [0u8; 1];
        transport.read(&mut one).unwrap();
        assert_eq!(one, [1]);
        transport.flush();
        let mut next = [0u8; 1];
        transport.read(&mut next).unwrap();
        assert_eq!(next, [9]);
    }

    #[test]
    fn scalars_round_trip_big_endian() {
        let mut io = Scripted::new();
        io.queue_read(vec![0x00, 0x00, 0x01, 0x02]);
        let mut transport = Transport::new(io);
        assert_eq!(transport.read_u32().unwrap(), 0x0000_0102);
        transport.write_u32(0xdead_beef).unwrap();
        assert_eq!(
            transport.into_inner().written,
            vec![0xde, 0xad, 0xbe, 0xef]
        );
    }

    #[test]
    fn echo_succeeds_when_device_returns_same_value() {
        let io = Loopback::new(false);
        let mut transport = Transport::new(io);
        transport.echo_u32(0x1234_5678).unwrap();
    }

    #[test]
    fn echo_fails_when_device_returns_complement() {
        let io = Loopback::new(true);
        let mut transport = Transport::new(io);
        let err = transport.echo_u8(0xa0).unwrap_err();
        match err {
            Error::EchoMismatch { written, got } => {
                assert_eq!(written, 0xa0);
                assert_eq!(got, !0xa0u8 as u64);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn arbitrary_bytes_round_trip_through_loopback() {
        let io = Loopback::new(false);
        let mut transport = Transport::new(io);
        let sent: Vec<u8> = (0..=255).collect();
        transport.write(&sent).unwrap();
        let mut got = vec![0u8; sent.len()];
        transport.read(&mut got).unwrap();
        assert_eq!(sent, got);
    }
}
