use anyhow::Result;
use clap::Parser;

mod cli;
mod cmd_admin;
mod cmd_query;
mod util;

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::InitDevice { device } => cmd_admin::exec_init(device),

        cli::Cmd::VacuumDevice { device } => cmd_admin::exec_vacuum(device),

        cli::Cmd::GetDeviceInfo { device, json } => cmd_query::exec_device_info(device, json),

        cli::Cmd::GetVolumeInfo { device, json } => cmd_query::exec_volume_info(device, json),

        cli::Cmd::GetSnapshotInfo {
            device,
            volume_name,
            json,
        } => cmd_query::exec_snapshot_info(device, volume_name, json),

        cli::Cmd::CreateVolume {
            device,
            volume_name,
            volume_size,
        } => cmd_admin::exec_create_volume(device, volume_name, volume_size),

        cli::Cmd::RenameVolume {
            device,
            volume_name,
            new_volume_name,
        } => cmd_admin::exec_rename_volume(device, volume_name, new_volume_name),

        cli::Cmd::CreateSnapshot {
            device,
            volume_name,
        } => cmd_admin::exec_create_snapshot(device, volume_name),

        cli::Cmd::CloneSnapshot {
            device,
            new_volume_name,
            snapshot_id,
        } => cmd_admin::exec_clone_snapshot(device, new_volume_name, snapshot_id),

        cli::Cmd::DeleteVolume {
            device,
            volume_name,
        } => cmd_admin::exec_delete_volume(device, volume_name),

        cli::Cmd::DeleteSnapshot {
            device,
            snapshot_id,
        } => cmd_admin::exec_delete_snapshot(device, snapshot_id),
    }
}
