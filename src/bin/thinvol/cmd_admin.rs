use anyhow::Result;
use std::path::PathBuf;

use ThinVol::{
    clone_snapshot, create_snapshot, create_volume, delete_snapshot, delete_volume, init_device,
    rename_volume, vacuum_device,
};

use crate::util::parse_size;

pub fn exec_init(device: PathBuf) -> Result<()> {
    init_device(&device)?;
    println!("initialized {}", device.display());
    Ok(())
}

pub fn exec_vacuum(device: PathBuf) -> Result<()> {
    vacuum_device(&device)
}

pub fn exec_create_volume(device: PathBuf, volume_name: String, volume_size: String) -> Result<()> {
    let size = parse_size(&volume_size)?;
    create_volume(&device, &volume_name, size)?;
    println!("created volume {}", volume_name);
    Ok(())
}

pub fn exec_rename_volume(
    device: PathBuf,
    volume_name: String,
    new_volume_name: String,
) -> Result<()> {
    rename_volume(&device, &volume_name, &new_volume_name)?;
    println!("renamed volume {} to {}", volume_name, new_volume_name);
    Ok(())
}

pub fn exec_create_snapshot(device: PathBuf, volume_name: String) -> Result<()> {
    create_snapshot(&device, &volume_name)?;
    println!("created snapshot of volume {}", volume_name);
    Ok(())
}

pub fn exec_clone_snapshot(
    device: PathBuf,
    new_volume_name: String,
    snapshot_id: u16,
) -> Result<()> {
    clone_snapshot(&device, &new_volume_name, snapshot_id)?;
    println!("cloned snapshot {} into {}", snapshot_id, new_volume_name);
    Ok(())
}

pub fn exec_delete_volume(device: PathBuf, volume_name: String) -> Result<()> {
    delete_volume(&device, &volume_name)?;
    println!("deleted volume {}", volume_name);
    Ok(())
}

pub fn exec_delete_snapshot(device: PathBuf, snapshot_id: u16) -> Result<()> {
    delete_snapshot(&device, snapshot_id)?;
    println!("deleted snapshot {}", snapshot_id);
    Ok(())
}
