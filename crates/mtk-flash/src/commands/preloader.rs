//! Preloader commands: available before `JUMP_DA` hands control to the
//! download agent. Framed as `echo(cmd)` followed by a payload, ending in a
//! u16 big-endian status where `0` means success.
use mtk_flash_macros::Protocol;
use mtk_transport::RawIo;

use crate::{
    Port, Result,
    commands::{Direction, IoCallback, xor_checksum},
    err::Error,
};

const HANDSHAKE_BYTES: [u8; 4] = [0xa0, 0x0a, 0x50, 0x05];

const CMD_WRITE32: u8 = 0xd4;
const CMD_SEND_DA: u8 = 0xd7;

const DISABLE_WDT_ADDR: u32 = 0x1000_7000;
const DISABLE_WDT_VALUE: u32 = 0x2200_0064;

const SEND_DA_CHUNK: usize = 0x400;

/// Byte-wise handshake dance, run after the class control transfer. The
/// device emits stray bytes right after the control transfer settles, so
/// the read buffer is flushed before every write and a mismatched reply
/// restarts the whole sequence rather than retrying the single byte.
pub fn handshake<T: RawIo>(port: &mut Port<T>) -> Result<()> {
    let mut i = 0;
    while i < HANDSHAKE_BYTES.len() {
        let b = HANDSHAKE_BYTES[i];
        port.flush();
        port.write_u8(b)?;
        let reply = port.read_u8()?;
        if reply == !b {
            i += 1;
        } else {
            i = 0;
        }
    }
    Ok(())
}

/// `GET_HW_CODE` (`0xfd`): echo cmd; read u16 hw_code; read u16 status.
#[derive(Default, Protocol)]
#[protocol(command = 0xfd)]
pub struct GetHwCode {
    #[protocol(rx)]
    pub hw_code: u16,
    #[protocol(rx, status = 0)]
    status: u16,
}

/// `GET_HW_SW_VER` (`0xfc`): echo cmd; read u16 hw_sub_code, hw_ver, sw_ver; read u16 status.
#[derive(Default, Protocol)]
#[protocol(command = 0xfc)]
pub struct GetHwSwVer {
    #[protocol(rx)]
    pub hw_sub_code: u16,
    #[protocol(rx)]
    pub hw_ver: u16,
    #[protocol(rx)]
    pub sw_ver: u16,
    #[protocol(rx, status = 0)]
    status: u16,
}

impl GetHwCode {
    pub fn get<T: RawIo>(port: &mut Port<T>) -> Result<u16> {
        let mut cmd = Self::new();
        cmd.run(port)?;
        Ok(cmd.hw_code)
    }
}

impl GetHwSwVer {
    pub fn get<T: RawIo>(port: &mut Port<T>) -> Result<(u16, u16, u16)> {
        let mut cmd = Self::new();
        cmd.run(port)?;
        Ok((cmd.hw_sub_code, cmd.hw_ver, cmd.sw_ver))
    }
}

/// `GET_TARGET_CONFIG` (`0xd8`): echo cmd; read u32 tgt_config; read u16 status.
#[derive(Default, Protocol)]
#[protocol(command = 0xd8)]
pub struct GetTargetConfig {
    #[protocol(rx)]
    pub tgt_config: u32,
    #[protocol(rx, status = 0)]
    status: u16,
}

impl GetTargetConfig {
    pub fn get<T: RawIo>(port: &mut Port<T>) -> Result<u32> {
        let mut cmd = Self::new();
        cmd.run(port)?;
        Ok(cmd.tgt_config)
    }
}

/// `JUMP_DA` (`0xd5`): echo cmd; echo u32 da_addr; read u16 status. On
/// success, the Preloader command set is no longer usable on this device.
#[derive(Default, Protocol)]
#[protocol(command = 0xd5)]
pub struct JumpDa {
    #[protocol(echo)]
    addr: u32,
    #[protocol(rx, status = 0)]
    status: u16,
}

impl JumpDa {
    pub fn jump<T: RawIo>(port: &mut Port<T>, addr: u32) -> Result<()> {
        Self::new(addr).run(port)
    }
}

/// `WRITE32` (`0xd4`): echo cmd; echo base address; echo word count; read
/// status. If the status is zero, echo each word in turn, then read a
/// final status.
pub fn write32<T: RawIo>(port: &mut Port<T>, addr: u32, words: &[u32]) -> Result<()> {
    port.echo_u8(CMD_WRITE32)?;
    port.echo_u32(addr)?;
    port.echo_u32(words.len() as u32)?;
    let status = port.read_u16()?;
    if status != 0 {
        return Err(Error::InvalidStatus(0, status));
    }
    for &word in words {
        port.echo_u32(word)?;
    }
    let status = port.read_u16()?;
    if status != 0 {
        return Err(Error::InvalidStatus(0, status));
    }
    Ok(())
}

/// Convenience over [`write32`]: disables the hardware watchdog.
pub fn disable_wdt<T: RawIo>(port: &mut Port<T>) -> Result<()> {
    write32(port, DISABLE_WDT_ADDR, &[DISABLE_WDT_VALUE])
}

/// `SEND_DA` (`0xd7`): echo cmd; echo address/length/signature length; read
/// status. If zero, stream the payload in 1024-byte chunks, accumulating a
/// 16-bit XOR-over-LE-words checksum, then compare against the device's.
pub fn send_da<T: RawIo>(port: &mut Port<T>, addr: u32, len: u32, sig_len: u32, source: &mut dyn IoCallback) -> Result<()> {
    port.echo_u8(CMD_SEND_DA)?;
    port.echo_u32(addr)?;
    port.echo_u32(len)?;
    port.echo_u32(sig_len)?;
    let status = port.read_u16()?;
    if status != 0 {
        return Err(Error::InvalidStatus(0, status));
    }

    let total = len as usize;
    let mut offset = 0;
    let mut chksum: u16 = 0;
    let mut buf = [0u8; SEND_DA_CHUNK];
    while offset < total {
        let count = SEND_DA_CHUNK.min(total - offset);
        source.call(Direction::Flash, offset, total, &mut buf, count)?;
        port.write(&buf[..count])?;
        chksum ^= xor_checksum(&buf[..count]);
        offset += count;
    }

    let device_chksum = port.read_u16()?;
    if device_chksum != chksum {
        return Err(Error::ChecksumMismatch {
            host: chksum,
            device: device_chksum,
        });
    }
    let status = port.read_u16()?;
    if status != 0 {
        return Err(Error::InvalidStatus(0, status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mtk_transport::Transport;

    use super::*;
    use crate::commands::{SliceSource, mock::ScriptedIo};

    #[test]
    fn handshake_completes_against_expected_replies() {
        let io = ScriptedIo::with_bytes(&[0x5f, 0xf5, 0xaf, 0xfa]);
        let mut port: Port<ScriptedIo> = Transport::new(io);
        handshake(&mut port).unwrap();
        assert_eq!(port.into_inner().written, vec![0xa0, 0x0a, 0x50, 0x05]);
    }

    #[test]
    fn handshake_discards_a_stray_byte_and_restarts() {
        // A stray 0x00 rides in with the real first reply in one bulk
        // transfer; the flush ahead of the retried write must drop it
        // rather than let it masquerade as the device's reply.
        let io = ScriptedIo::with_packets(vec![vec![0x00, 0x5f], vec![0xf5], vec![0xaf], vec![0xfa]]);
        let mut port: Port<ScriptedIo> = Transport::new(io);
        handshake(&mut port).unwrap();
        assert_eq!(port.into_inner().written, vec![0xa0, 0xa0, 0x0a, 0x50, 0x05]);
    }

    #[test]
    fn get_hw_code_decodes_echoed_reply() {
        let io = ScriptedIo::with_bytes(&[0xfd, 0x12, 0x34, 0x00, 0x00]);
        let mut port: Port<ScriptedIo> = Transport::new(io);
        let hw_code = GetHwCode::get(&mut port).unwrap();
        assert_eq!(hw_code, 0x1234);
        assert_eq!(port.into_inner().written, vec![0xfd]);
    }

    #[test]
    fn send_da_streams_payload_and_checks_host_checksum() {
        // addr=0x200000, len=3, sig_len=0; status 0; payload 01 02 03;
        // host checksum 0x0201 ^ 0x03 = 0x0202; device echoes it back.
        let io = ScriptedIo::with_bytes(&[
            0xd7, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x02,
            0x00, 0x00,
        ]);
        let mut port: Port<ScriptedIo> = Transport::new(io);
        let payload = [0x01, 0x02, 0x03];
        send_da(&mut port, 0x0020_0000, 3, 0, &mut SliceSource::new(&payload)).unwrap();

        let expected_written = [
            vec![CMD_SEND_DA],
            0x0020_0000u32.to_be_bytes().to_vec(),
            3u32.to_be_bytes().to_vec(),
            0u32.to_be_bytes().to_vec(),
            payload.to_vec(),
        ]
        .concat();
        assert_eq!(port.into_inner().written, expected_written);
    }

    #[test]
    fn send_da_rejects_mismatched_device_checksum() {
        let io = ScriptedIo::with_bytes(&[
            0xd7, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x01,
            0x00, 0x00,
        ]);
        let mut port: Port<ScriptedIo> = Transport::new(io);
        let payload = [0x01, 0x02, 0x03];
        let err = send_da(&mut port, 0x0020_0000, 3, 0, &mut SliceSource::new(&payload)).unwrap_err();
        match err {
            Error::ChecksumMismatch { host, device } => {
                assert_eq!(host, 0x0202);
                assert_eq!(device, 0x0201);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn write32_surfaces_nonzero_status_as_invalid_status() {
        let io = ScriptedIo::with_bytes(&[0xd4, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x07]);
        let mut port: Port<ScriptedIo> = Transport::new(io);
        let err = write32(&mut port, 0x1000, &[0x22]).unwrap_err();
        match err {
            Error::InvalidStatus(expected, got) => {
                assert_eq!(expected, 0);
                assert_eq!(got, 0x0007);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
