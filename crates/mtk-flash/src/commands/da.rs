//! DA protocol: available after `JUMP_DA` hands control to DA Stage 1, and
//! later Stage 2. Unlike the Preloader, commands are a single literal byte
//! with no echo; replies are single-byte acknowledgements from the alphabet
//! below, or multi-byte big-endian scalars for data-bearing commands.
use mtk_transport::RawIo;

use crate::{
    Port, Result,
    commands::{Direction, IoCallback, sum_checksum},
    err::Error,
};

pub const ACK: u8 = 0x5a;
pub const NACK: u8 = 0xa5;
pub const CONT: u8 = 0x69;
pub const SYNC: u8 = 0xc0;
pub const SOC_OK: u8 = 0xc1;
pub const SOC_FAIL: u8 = 0xcf;

const NAND_NOT_FOUND: u32 = 0xbc4;

const CMD_USB_CHECK_STATUS: u8 = 0x72;
const CMD_SWITCH_PART: u8 = 0x60;
const CMD_READ: u8 = 0xd6;
const CMD_SDMMC_WRITE_DATA: u8 = 0x62;
const CMD_ENABLE_WATCHDOG: u8 = 0xdb;

const HOST_OS_LINUX: u8 = 0x0c;
const STORAGE_EMMC: u8 = 2;
const STORAGE_TYPE_EMMC: u8 = 1;
pub const PART_EMMC_USER: u8 = 8;

const SEND_DA2_CHUNK: u32 = 0x1000;
const READ_CHUNK: u32 = 0x10_0000;
const SDMMC_WRITE_CHUNK: u32 = 0x10_0000;
const FULL_REPORT_SIZE: usize = 235;

/// The 22-byte "device config" prologue DA Stage 2 expects ahead of the
/// payload, composed of fixed literal values of mixed width (all
/// multi-byte values big-endian on the wire).
fn send_device_config<T: RawIo>(port: &mut Port<T>) -> Result<()> {
    port.write_u8(0xff)?;
    port.write_u8(0x01)?;
    port.write_u16(0x0008)?;
    port.write_u8(0x00)?;
    port.write_u32(0x7007_ffff)?;
    port.write_u8(0x01)?;
    port.write_u32(0x0000_0000)?;
    port.write_u8(0x02)?;
    port.write_u8(0x01)?;
    port.write_u8(0x02)?;
    port.write_u8(0x00)?;
    port.write_u32(0x0000_0001)?;
    Ok(())
}

/// The 16-byte "name" block: two `'F'` bytes then 14 zero bytes.
fn send_name<T: RawIo>(port: &mut Port<T>) -> Result<()> {
    let mut name = [0u8; 16];
    name[0] = b'F';
    name[1] = b'F';
    port.write(&name)
}

/// A device identity read during DA Stage 1 sync.
#[derive(Debug, Clone, Copy)]
pub struct SyncInfo {
    pub nand_ret: u32,
    pub emmc_ret: u32,
    pub emmc_id: [u32; 4],
    pub da_major: u8,
    pub da_minor: u8,
}

impl SyncInfo {
    /// Asserts the invariants the orchestrator requires before proceeding:
    /// no NAND controller present, and no eMMC controller error.
    pub fn assert_emmc_only(&self) -> Result<()> {
        if self.nand_ret != NAND_NOT_FOUND {
            return Err(Error::NandPresent(self.nand_ret));
        }
        if self.emmc_ret != 0 {
            return Err(Error::EmmcError(self.emmc_ret));
        }
        Ok(())
    }
}

/// Stage 1 sync, run immediately after `JUMP_DA` succeeds.
pub fn sync<T: RawIo>(port: &mut Port<T>) -> Result<SyncInfo> {
    let b = port.read_u8()?;
    if b != SYNC {
        return Err(Error::InvalidRetval { command: "da_sync", retval: b });
    }

    let nand_ret = port.read_u32()?;
    let nand_count = port.read_u16()?;
    port.read_discard(2 * nand_count as usize)?;

    let emmc_ret = port.read_u32()?;
    let mut emmc_id = [0u32; 4];
    for id in &mut emmc_id {
        *id = port.read_u32()?;
    }

    port.write_u8(ACK)?;

    let da_major = port.read_u8()?;
    let da_minor = port.read_u8()?;
    let _unknown = port.read_u8()?;

    Ok(SyncInfo {
        nand_ret,
        emmc_ret,
        emmc_id,
        da_major,
        da_minor,
    })
}

/// DA `SEND_DA` (Stage 2 upload). Distinct from the Preloader `SEND_DA`:
/// the device-config prologue and name block precede the payload, and a
/// non-ACK `retval` anywhere in the exchange is a normal termination the
/// caller classifies, not a transport-level error.
pub fn send_da_stage2<T: RawIo>(port: &mut Port<T>, addr: u32, len: u32, source: &mut dyn IoCallback) -> Result<u8> {
    send_device_config(port)?;
    send_name(port)?;
    port.write_u32(0xff00_0000)?;
    let zero = port.read_u32()?;
    if zero != 0 {
        return Err(Error::UnexpectedValue {
            context: "send_da_stage2 acknowledgement",
            expected: 0,
            got: zero as u64,
        });
    }

    port.write_u32(addr)?;
    port.write_u32(len)?;
    port.write_u32(SEND_DA2_CHUNK)?;

    let retval = port.read_u8()?;
    if retval != ACK {
        return Ok(retval);
    }

    let total = len as usize;
    let chunk = SEND_DA2_CHUNK as usize;
    let mut offset = 0;
    let mut buf = vec![0u8; chunk];
    while offset < total {
        let count = chunk.min(total - offset);
        source.call(Direction::Flash, offset, total, &mut buf, count)?;
        port.write(&buf[..count])?;
        offset += count;

        let retval = port.read_u8()?;
        if retval != ACK {
            return Ok(retval);
        }
    }

    let retval = port.read_u8()?;
    if retval == ACK {
        port.write_u8(ACK)?;
    }
    Ok(retval)
}

/// Reads and discards the 235-byte full report, then asserts `SOC_OK`.
pub fn await_soc_ok<T: RawIo>(port: &mut Port<T>) -> Result<()> {
    port.read_discard(FULL_REPORT_SIZE)?;
    let b = port.read_u8()?;
    if b != SOC_OK {
        return Err(Error::InvalidRetval { command: "soc_ok", retval: b });
    }
    Ok(())
}

/// `USB_CHECK_STATUS` (`0x72`): write cmd; read retval; if ACK, read and
/// return the u8 USB status (expected `1`).
pub fn usb_check_status<T: RawIo>(port: &mut Port<T>) -> Result<u8> {
    port.write_u8(CMD_USB_CHECK_STATUS)?;
    let retval = port.read_u8()?;
    if retval != ACK {
        return Err(Error::InvalidRetval {
            command: "usb_check_status",
            retval,
        });
    }
    port.read_u8()
}

/// `SWITCH_PART` (`0x60`): write cmd; read retval; if ACK, write the
/// partition id and read the final retval.
pub fn switch_part<T: RawIo>(port: &mut Port<T>, part: u8) -> Result<()> {
    port.write_u8(CMD_SWITCH_PART)?;
    let retval = port.read_u8()?;
    if retval != ACK {
        return Err(Error::InvalidRetval {
            command: "switch_part",
            retval,
        });
    }
    port.write_u8(part)?;
    let retval = port.read_u8()?;
    if retval != ACK {
        return Err(Error::InvalidRetval {
            command: "switch_part",
            retval,
        });
    }
    Ok(())
}

/// `READ` (`0xd6`) — the dump flow. Streams `len` bytes starting at `addr`
/// from the eMMC user partition, verifying the device's checksum before
/// handing each chunk to the sink (so a sink error can't be reported back
/// to the device).
pub fn read<T: RawIo>(port: &mut Port<T>, addr: u64, len: u64, sink: &mut dyn IoCallback) -> Result<()> {
    port.write_u8(CMD_READ)?;
    port.write_u8(HOST_OS_LINUX)?;
    port.write_u8(STORAGE_EMMC)?;
    port.write_u64(addr)?;
    port.write_u64(len)?;

    let retval = port.read_u8()?;
    if retval != ACK {
        return Err(Error::InvalidRetval { command: "read", retval });
    }
    port.write_u32(READ_CHUNK)?;

    let total = len as usize;
    let chunk = READ_CHUNK as usize;
    let mut offset = 0;
    let mut buf = vec![0u8; chunk];
    while offset < total {
        let count = chunk.min(total - offset);
        port.read(&mut buf[..count])?;

        let host_chksum = sum_checksum(&buf[..count]);
        let device_chksum = port.read_u16()?;
        if device_chksum != host_chksum {
            return Err(Error::ChecksumMismatch {
                host: host_chksum,
                device: device_chksum,
            });
        }
        port.write_u8(ACK)?;

        sink.call(Direction::Dump, offset, total, &mut buf, count)?;
        offset += count;
    }
    Ok(())
}

/// `SDMMC_WRITE_DATA` (`0x62`) — the flash flow. Streams `len` bytes from
/// the source into the eMMC user partition starting at `addr`.
pub fn sdmmc_write_data<T: RawIo>(port: &mut Port<T>, addr: u64, len: u64, source: &mut dyn IoCallback) -> Result<()> {
    port.write_u8(CMD_SDMMC_WRITE_DATA)?;
    port.write_u8(STORAGE_TYPE_EMMC)?;
    port.write_u8(PART_EMMC_USER)?;
    port.write_u64(addr)?;
    port.write_u64(len)?;
    port.write_u32(SDMMC_WRITE_CHUNK)?;

    let retval = port.read_u8()?;
    if retval != ACK {
        return Err(Error::InvalidRetval {
            command: "sdmmc_write_data",
            retval,
        });
    }

    let total = len as usize;
    let chunk = SDMMC_WRITE_CHUNK as usize;
    let mut offset = 0;
    let mut buf = vec![0u8; chunk];
    while offset < total {
        port.write_u8(ACK)?;

        let count = chunk.min(total - offset);
        source.call(Direction::Flash, offset, total, &mut buf, count)?;
        port.write(&buf[..count])?;
        port.write_u16(sum_checksum(&buf[..count]))?;

        let retval = port.read_u8()?;
        if retval != CONT {
            return Err(Error::InvalidRetval {
                command: "sdmmc_write_data",
                retval,
            });
        }
        offset += count;
    }
    Ok(())
}

/// `ENABLE_WATCHDOG` (`0xdb`): write cmd, u32 timeout, then the four
/// boolean bytes in declaration order, then read the retval.
pub fn enable_watchdog<T: RawIo>(port: &mut Port<T>, timeout_ms: u32, async_: bool, bootup: bool, dlbit: bool, not_reset_rtc_time: bool) -> Result<u8> {
    port.write_u8(CMD_ENABLE_WATCHDOG)?;
    port.write_u32(timeout_ms)?;
    port.write_u8(async_ as u8)?;
    port.write_u8(bootup as u8)?;
    port.write_u8(dlbit as u8)?;
    port.write_u8(not_reset_rtc_time as u8)?;
    port.read_u8()
}

#[cfg(test)]
mod tests {
    use mtk_transport::Transport;

    use super::*;
    use crate::commands::mock::ScriptedIo;

    #[test]
    fn sync_reads_identity_and_acks() {
        let mut bytes = vec![SYNC];
        bytes.extend(0xbc4u32.to_be_bytes()); // nand_ret == NAND_NOT_FOUND
        bytes.extend(0u16.to_be_bytes()); // nand_count
        bytes.extend(0u32.to_be_bytes()); // emmc_ret
        for id in [1u32, 2, 3, 4] {
            bytes.extend(id.to_be_bytes());
        }
        bytes.push(7); // da_major
        bytes.push(2); // da_minor
        bytes.push(0); // unknown

        let io = ScriptedIo::with_bytes(&bytes);
        let mut port: Port<ScriptedIo> = Transport::new(io);
        let info = sync(&mut port).unwrap();
        info.assert_emmc_only().unwrap();
        assert_eq!(info.emmc_id, [1, 2, 3, 4]);
        assert_eq!((info.da_major, info.da_minor), (7, 2));
        assert_eq!(port.into_inner().written, vec![ACK]);
    }

    #[test]
    fn sync_rejects_a_byte_that_is_not_sync() {
        let io = ScriptedIo::with_bytes(&[0x00]);
        let mut port: Port<ScriptedIo> = Transport::new(io);
        let err = sync(&mut port).unwrap_err();
        assert!(matches!(err, Error::InvalidRetval { command: "da_sync", retval: 0 }));
    }

    #[test]
    fn read_verifies_device_checksum_before_sinking_bytes() {
        let mut bytes = vec![ACK];
        bytes.extend([0x10, 0x20, 0x30, 0x40]);
        bytes.extend(0x00a0u16.to_be_bytes());

        let io = ScriptedIo::with_bytes(&bytes);
        let mut port: Port<ScriptedIo> = Transport::new(io);

        let mut sunk = Vec::new();
        let mut sink = |_: Direction, _: usize, _: usize, buffer: &mut [u8], count: usize| -> Result<()> {
            sunk.extend_from_slice(&buffer[..count]);
            Ok(())
        };
        read(&mut port, 0, 4, &mut sink).unwrap();
        assert_eq!(sunk, vec![0x10, 0x20, 0x30, 0x40]);
    }

    #[test]
    fn read_fails_on_checksum_mismatch_without_sinking() {
        let mut bytes = vec![ACK];
        bytes.extend([0x10, 0x20, 0x30, 0x40]);
        bytes.extend(0x00a1u16.to_be_bytes()); // wrong checksum

        let io = ScriptedIo::with_bytes(&bytes);
        let mut port: Port<ScriptedIo> = Transport::new(io);

        let mut sink_calls = 0;
        let mut sink = |_: Direction, _: usize, _: usize, _: &mut [u8], _: usize| -> Result<()> {
            sink_calls += 1;
            Ok(())
        };
        let err = read(&mut port, 0, 4, &mut sink).unwrap_err();
        match err {
            Error::ChecksumMismatch { host, device } => {
                assert_eq!(host, 0x00a0);
                assert_eq!(device, 0x00a1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sink_calls, 0);
    }

    #[test]
    fn sdmmc_write_data_streams_payload_and_checksum() {
        let io = ScriptedIo::with_bytes(&[ACK, CONT]);
        let mut port: Port<ScriptedIo> = Transport::new(io);
        let payload = [0x01, 0x02, 0x03];
        sdmmc_write_data(&mut port, 0, 3, &mut crate::commands::SliceSource::new(&payload)).unwrap();

        let mut expected = vec![CMD_SDMMC_WRITE_DATA, STORAGE_TYPE_EMMC, PART_EMMC_USER];
        expected.extend(0u64.to_be_bytes());
        expected.extend(3u64.to_be_bytes());
        expected.extend(SDMMC_WRITE_CHUNK.to_be_bytes());
        expected.push(ACK);
        expected.extend(payload);
        expected.extend(0x0006u16.to_be_bytes());
        assert_eq!(port.into_inner().written, expected);
    }

    #[test]
    fn send_da_stage2_rejects_a_nonzero_acknowledgement_word() {
        // Everything before the acknowledgement word is pure writes; the
        // device's reply to `0xff00_0000` is the first and only read.
        let io = ScriptedIo::with_bytes(&1u32.to_be_bytes());
        let mut port: Port<ScriptedIo> = Transport::new(io);
        let err = send_da_stage2(&mut port, 0, 0, &mut crate::commands::SliceSource::new(&[])).unwrap_err();
        match err {
            Error::UnexpectedValue { expected, got, .. } => {
                assert_eq!(expected, 0);
                assert_eq!(got, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
