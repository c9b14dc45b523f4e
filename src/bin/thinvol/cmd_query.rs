use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;

use ThinVol::{get_device_info, get_snapshot_info, get_volume_info};

use crate::util::{fmt_time, human_size};

pub fn exec_device_info(device: PathBuf, json_out: bool) -> Result<()> {
    let di = get_device_info(&device)?;
    if json_out {
        let obj = json!({
            "version": di.version,
            "device_size": di.device_size,
            "total_device_extents": di.total_device_extents,
            "allocated_device_extents": di.allocated_device_extents,
            "volume_count": di.volume_count,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }
    println!("{:<26} {}", "version", di.version);
    println!("{:<26} {}", "device_size", human_size(di.device_size));
    println!("{:<26} {}", "total_device_extents", di.total_device_extents);
    println!(
        "{:<26} {}",
        "allocated_device_extents", di.allocated_device_extents
    );
    println!("{:<26} {}", "volume_count", di.volume_count);
    Ok(())
}

pub fn exec_volume_info(device: PathBuf, json_out: bool) -> Result<()> {
    let vi = get_volume_info(&device)?;
    if json_out {
        let arr: Vec<_> = vi
            .iter()
            .map(|v| {
                json!({
                    "volume_name": v.volume_name,
                    "volume_size": v.volume_size,
                    "snapshot_id": v.snapshot_id,
                    "created_at": v.created_at,
                    "snapshot_count": v.snapshot_count,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&arr)?);
        return Ok(());
    }
    println!(
        "{:<26} {:>10} {:>12} {:>15} {:>26}",
        "volume_name", "size", "snapshot_id", "snapshot_count", "created_at"
    );
    for v in &vi {
        println!(
            "{:<26} {:>10} {:>12} {:>15} {:>26}",
            v.volume_name,
            human_size(v.volume_size),
            v.snapshot_id,
            v.snapshot_count,
            fmt_time(v.created_at)
        );
    }
    Ok(())
}

pub fn exec_snapshot_info(device: PathBuf, volume_name: String, json_out: bool) -> Result<()> {
    let si = get_snapshot_info(&device, &volume_name)?;
    if json_out {
        let arr: Vec<_> = si
            .iter()
            .map(|s| {
                json!({
                    "snapshot_id": s.snapshot_id,
                    "parent_snapshot_id": s.parent_snapshot_id,
                    "created_at": s.created_at,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&arr)?);
        return Ok(());
    }
    println!(
        "{:>12} {:>20} {:>26}",
        "snapshot_id", "parent_snapshot_id", "created_at"
    );
    for s in &si {
        let parent = if s.parent_snapshot_id == 0 {
            "-".to_string()
        } else {
            s.parent_snapshot_id.to_string()
        };
        println!(
            "{:>12} {:>20} {:>26}",
            s.snapshot_id,
            parent,
            fmt_time(s.created_at)
        );
    }
    Ok(())
}
