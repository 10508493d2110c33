//! The linear state-machine staircase `NONE -> PRELOADER -> DA_STAGE2`: each
//! state falls through into the next, so starting cold runs every stage
//! while `--preloader`/`--da-stage2` let the operator resume a session the
//! device is already partway through.
use std::io::{Write, stdout};

use colored::Colorize;
use mtk_da_parser::DA;
use mtk_transport::RawIo;

use crate::{
    Port, Result,
    cli::{Config, Operation, OperationKind},
    commands::{SliceSource, da as da_cmd, preloader as pl_cmd},
    discovery,
    err::Error,
    log, status,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    None,
    Preloader,
    DaStage2,
}

pub fn run(mut config: Config) -> Result<()> {
    log!("Waiting for MediaTek device...\n");
    let mut port = discovery::open(config.verbose)?;

    if config.state == DeviceState::None {
        handle_none(&mut port)?;
    }
    if config.state != DeviceState::DaStage2 {
        let path = config.download_agent.as_ref().ok_or(Error::MissingDownloadAgent)?;
        let da_bytes = std::fs::read(path)?;
        let da = mtk_da_parser::parse_da(&da_bytes)?;
        handle_preloader(&mut port, &da)?;
    }
    handle_da_stage2(&mut port, &mut config.operations, config.reboot)?;

    Ok(())
}

fn handle_none(port: &mut Port) -> Result<()> {
    log!("Syncing with MediaTek Preloader...\n");
    port.get_mut().control_handshake()?;
    pl_cmd::handshake(port)
}

fn handle_preloader<T: RawIo>(port: &mut Port<T>, da: &DA) -> Result<()> {
    let hw_code = pl_cmd::GetHwCode::get(port)?;
    log!("");
    println!("HW code:     {hw_code:#06x}");

    let (hw_sub_code, hw_ver, sw_ver) = pl_cmd::GetHwSwVer::get(port)?;
    println!("HW subcode:  {hw_sub_code:#06x}");
    println!("HW version:  {hw_ver:#06x}");
    println!("SW version:  {sw_ver:#06x}");

    let mut cfg = pl_cmd::GetTargetConfig::default();
    cfg.run(port)?;
    println!("\nTarget config:  {:#010x}\n", cfg.tgt_config);

    let entry = da
        .entry(hw_code, hw_ver, sw_ver)
        .ok_or(Error::NoMatchingDaEntry { hw_code, hw_ver, sw_ver })?;
    entry.validate().map_err(mtk_da_parser::err::Error::from)?;

    let stage1 = entry.stage1().ok_or(Error::NoUsableLoadRegions)?;
    stage1.validate().map_err(mtk_da_parser::err::Error::from)?;
    let stage2 = entry.stage2().ok_or(Error::NoUsableLoadRegions)?;
    stage2.validate().map_err(mtk_da_parser::err::Error::from)?;

    log!("Disabling watchdog timer...");
    status!(pl_cmd::disable_wdt(port))?;

    let stage1_data = stage1.data().map_err(mtk_da_parser::err::Error::from)?;
    log!("Sending DA Stage 1...");
    status!(pl_cmd::send_da(
        port,
        stage1.start_addr(),
        stage1_data.len() as u32,
        stage1.sig_len(),
        &mut SliceSource::new(stage1_data)
    ))?;

    log!("Jumping to DA Stage 1...");
    status!(pl_cmd::JumpDa::jump(port, stage1.start_addr()))?;

    let info = da_cmd::sync(port)?;
    info.assert_emmc_only()?;
    println!(
        "EMMC ID:     {:08X} {:08X} {:08X} {:08X}",
        info.emmc_id[0], info.emmc_id[1], info.emmc_id[2], info.emmc_id[3]
    );
    println!("DA version:  DA_v{}.{}", info.da_major, info.da_minor);

    let stage2_data = stage2.data().map_err(mtk_da_parser::err::Error::from)?;
    log!("\nSending DA Stage 2...");
    let retval = status!(da_cmd::send_da_stage2(
        port,
        stage2.start_addr(),
        stage2_data.len() as u32,
        &mut SliceSource::new(stage2_data)
    ))?;
    if retval != da_cmd::ACK {
        return Err(Error::InvalidRetval { command: "send_da_stage2", retval });
    }

    da_cmd::await_soc_ok(port)
}

fn handle_da_stage2<T: RawIo>(port: &mut Port<T>, operations: &mut [Operation], reboot: bool) -> Result<()> {
    let usb_status = da_cmd::usb_check_status(port)?;
    if usb_status != 1 {
        return Err(Error::InvalidRetval { command: "usb_check_status", retval: usb_status });
    }

    println!();
    for operation in operations {
        println!("Address:  {:#018x}", operation.address);
        println!("Length:   {:#018x}", operation.length);

        da_cmd::switch_part(port, da_cmd::PART_EMMC_USER)?;

        match operation.kind {
            OperationKind::Dump => da_cmd::read(port, operation.address, operation.length, operation.io.as_mut())?,
            OperationKind::Flash => da_cmd::sdmmc_write_data(port, operation.address, operation.length, operation.io.as_mut())?,
        }
        println!();
    }

    if reboot {
        log!("Enabling WDT to reboot device...");
        status!(da_cmd::enable_watchdog(port, 0, false, false, false, true))?;
    }

    Ok(())
}
