//! query — read-only срезы состояния устройства для инструментов.

use anyhow::Result;
use std::path::Path;

use crate::device::DeviceContext;
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Версия формата строкой "major.minor.patch".
    pub version: String,
    pub device_size: u64,
    pub total_device_extents: u32,
    pub allocated_device_extents: u32,
    pub volume_count: usize,
}

#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub volume_name: String,
    pub volume_size: u64,
    /// Текущий tip цепочки.
    pub snapshot_id: u16,
    /// Unix-секунды создания tip'а.
    pub created_at: i64,
    pub snapshot_count: usize,
}

#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub snapshot_id: u16,
    pub parent_snapshot_id: u16,
    pub created_at: i64,
}

fn human_version(version: u32) -> String {
    format!(
        "{}.{}.{}",
        version >> 16,
        (version & 0xFF00) >> 8,
        version & 0xFF
    )
}

pub fn get_device_info(device: &Path) -> Result<DeviceInfo> {
    let dc = DeviceContext::open(device)?;
    let di = DeviceInfo {
        version: human_version(dc.superblock.version),
        device_size: dc.superblock.device_size,
        total_device_extents: dc.total_device_extents(),
        allocated_device_extents: dc.superblock.allocated_device_extents,
        volume_count: dc.count_volumes(),
    };
    dc.close()?;
    Ok(di)
}

/// Тома в порядке слотов таблицы.
pub fn get_volume_info(device: &Path) -> Result<Vec<VolumeInfo>> {
    let dc = DeviceContext::open(device)?;
    let mut vi = Vec::with_capacity(dc.count_volumes());
    for (idx, v) in dc.volumes.iter().enumerate() {
        if v.is_free() {
            continue;
        }
        vi.push(VolumeInfo {
            volume_name: v.name().to_string(),
            volume_size: v.volume_size,
            snapshot_id: v.snapshot_id,
            created_at: dc.snapshot(v.snapshot_id)?.created_at,
            snapshot_count: dc.count_snapshots(idx),
        });
    }
    dc.close()?;
    Ok(vi)
}

/// Цепочка снапшотов тома от tip'а к корню.
pub fn get_snapshot_info(device: &Path, volume_name: &str) -> Result<Vec<SnapshotInfo>> {
    let dc = DeviceContext::open(device)?;
    let vidx = dc
        .find_volume(volume_name)
        .ok_or_else(|| StoreError::VolumeNotFound(volume_name.to_string()))?;

    let mut si = Vec::with_capacity(dc.count_snapshots(vidx));
    let mut sid = dc.volumes[vidx].snapshot_id;
    while sid != 0 {
        let s = dc.snapshot(sid)?;
        si.push(SnapshotInfo {
            snapshot_id: sid,
            parent_snapshot_id: s.parent_snapshot_id,
            created_at: s.created_at,
        });
        sid = s.parent_snapshot_id;
    }
    dc.close()?;
    Ok(si)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_version_format() {
        assert_eq!(human_version(0x0001_0000), "1.0.0");
        assert_eq!(human_version(0x0002_0103), "2.1.3");
    }
}
