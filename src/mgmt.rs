//! mgmt — управляющие операции над устройством.
//!
//! Общая форма: открыть контекст устройства → проверить → изменить в памяти
//! → персистнуть затронутые регионы → закрыть. Отката нет: при сбое I/O на
//! диске остаётся то, что успело записаться (журналирование — вне задач
//! ядра).

use anyhow::Result;
use log::{debug, info};
use std::path::Path;

use crate::consts::{EXTENT_BATCH, EXTENT_SIZE};
use crate::device::DeviceContext;
use crate::error::StoreError;
use crate::extmap::ExtentMap;
use crate::format::{ExtentMeta, SnapshotMeta, VolumeMeta};

/// Инициализировать устройство: свежий superblock, нулевые таблицы,
/// обнулённая таблица extent-записей (батчами по EXTENT_BATCH).
pub fn init_device(device: &Path) -> Result<()> {
    let dc = DeviceContext::new(device)?;
    info!(
        "initializing {}: {} extents of {} B",
        device.display(),
        dc.total_device_extents(),
        EXTENT_SIZE
    );

    let total = dc.total_device_extents();
    let batch = vec![ExtentMeta::default(); EXTENT_BATCH.min(total as usize)];
    let mut slot = 0u32;
    while slot < total {
        let n = ((total - slot) as usize).min(EXTENT_BATCH);
        dc.write_extents(&batch[..n], slot)?;
        slot += n as u32;
    }
    dc.write_metadata()?;
    dc.write_superblock()?;
    dc.close()
}

/// Дефрагментация тёмных слотов устройства. Объявлена, не реализована.
pub fn vacuum_device(_device: &Path) -> Result<()> {
    Err(StoreError::NotImplemented.into())
}

/// Создать том. Размер усекается до кратного EXTENT_SIZE и должен после
/// усечения составлять хотя бы один extent.
pub fn create_volume(device: &Path, volume_name: &str, volume_size: u64) -> Result<()> {
    if volume_size / EXTENT_SIZE as u64 == 0 {
        return Err(StoreError::ZeroSize.into());
    }
    let mut dc = DeviceContext::open(device)?;
    if dc.find_volume(volume_name).is_some() {
        return Err(StoreError::VolumeExists(volume_name.to_string()).into());
    }
    dc.add_volume(volume_name, volume_size)?;
    info!("created volume {} ({} B)", volume_name, volume_size);
    dc.write_metadata()?;
    dc.close()
}

/// Переименовать том. Совпадение со старым именем — no-op; имя другого
/// занятого слота — отказ.
pub fn rename_volume(device: &Path, volume_name: &str, new_volume_name: &str) -> Result<()> {
    let mut dc = DeviceContext::open(device)?;
    let vidx = dc
        .find_volume(volume_name)
        .ok_or_else(|| StoreError::VolumeNotFound(volume_name.to_string()))?;
    if let Some(other) = dc.find_volume(new_volume_name) {
        if other != vidx {
            return Err(StoreError::VolumeExists(new_volume_name.to_string()).into());
        }
    }
    dc.volumes[vidx].set_name(new_volume_name);
    dc.write_metadata()?;
    dc.close()
}

/// Снять снапшот: новый слот становится tip'ом, прежний tip — его
/// родителем (и с этого момента read-only предком для COW).
pub fn create_snapshot(device: &Path, volume_name: &str) -> Result<()> {
    let mut dc = DeviceContext::open(device)?;
    let vidx = dc
        .find_volume(volume_name)
        .ok_or_else(|| StoreError::VolumeNotFound(volume_name.to_string()))?;
    let sid = dc.add_snapshot(dc.volumes[vidx].snapshot_id)?;
    dc.volumes[vidx].snapshot_id = sid;
    info!("created snapshot {} of volume {}", sid, volume_name);
    dc.write_metadata()?;
    dc.close()
}

/// Клонировать снапшот в новый том: свежий корневой снапшот + физическая
/// копия всех extent'ов, видимых из `snapshot_id`.
pub fn clone_snapshot(device: &Path, new_volume_name: &str, snapshot_id: u16) -> Result<()> {
    let mut dc = DeviceContext::open(device)?;
    let vsrc = dc
        .find_volume_with_snapshot(snapshot_id)
        .ok_or(StoreError::SnapshotNotFound(snapshot_id))?;
    if dc.find_volume(new_volume_name).is_some() {
        return Err(StoreError::VolumeExists(new_volume_name.to_string()).into());
    }
    let volume_size = dc.volumes[vsrc].volume_size;

    let mut vem = ExtentMap::volume_map(&dc, volume_size, snapshot_id)?;
    // Проверка до любых изменений: неудавшийся clone не трогает диск.
    if dc.superblock.allocated_device_extents + vem.count() > dc.total_device_extents() {
        return Err(StoreError::NoSpace.into());
    }

    let vdst = dc.add_volume(new_volume_name, volume_size)?;
    let dst_sid = dc.volumes[vdst].snapshot_id;
    dc.write_metadata()?;
    debug!(
        "cloning snapshot {} into {} ({} extents)",
        snapshot_id,
        new_volume_name,
        vem.count()
    );
    vem.copy_all_to(&mut dc, dst_sid)?;
    dc.write_superblock()?;
    dc.close()
}

/// Удалить том: очистить extent-записи каждого снапшота цепочки от tip'а
/// к корню, освободить слоты снапшотов и слот тома.
pub fn delete_volume(device: &Path, volume_name: &str) -> Result<()> {
    let mut dc = DeviceContext::open(device)?;
    let vidx = dc
        .find_volume(volume_name)
        .ok_or_else(|| StoreError::VolumeNotFound(volume_name.to_string()))?;
    let volume_size = dc.volumes[vidx].volume_size;

    let mut sid = dc.volumes[vidx].snapshot_id;
    while sid != 0 {
        let mut sem = ExtentMap::snapshot_map(&dc, volume_size, sid)?;
        sem.clear_all(&dc)?;
        let parent = dc.snapshots[sid as usize - 1].parent_snapshot_id;
        dc.snapshots[sid as usize - 1] = SnapshotMeta::default();
        sid = parent;
    }
    dc.volumes[vidx] = VolumeMeta::default();
    info!("deleted volume {}", volume_name);
    dc.write_metadata()?;
    dc.close()
}

/// Удалить снапшот, не являющийся tip'ом. Extent'ы жертвы, не затенённые
/// потомком, перевешиваются на потомка; родительская связь сшивается.
pub fn delete_snapshot(device: &Path, snapshot_id: u16) -> Result<()> {
    let mut dc = DeviceContext::open(device)?;
    let vidx = dc
        .find_volume_with_snapshot(snapshot_id)
        .ok_or(StoreError::SnapshotNotFound(snapshot_id))?;
    if dc.volumes[vidx].snapshot_id == snapshot_id {
        return Err(StoreError::CannotDeleteCurrent.into());
    }
    let child = dc.find_child_snapshot(snapshot_id);
    if child == 0 {
        // Не-tip без потомка: в линейной цепочке недостижимо, возможно
        // только на повреждённой таблице.
        return Err(StoreError::CannotDeleteRoot.into());
    }
    let volume_size = dc.volumes[vidx].volume_size;

    let mut sem = ExtentMap::snapshot_map(&dc, volume_size, snapshot_id)?;
    let mut cem = ExtentMap::snapshot_map(&dc, volume_size, child)?;
    sem.merge_into(&dc, &mut cem, child)?;
    sem.clear_all(&dc)?;

    dc.snapshots[child as usize - 1].parent_snapshot_id =
        dc.snapshots[snapshot_id as usize - 1].parent_snapshot_id;
    dc.snapshots[snapshot_id as usize - 1] = SnapshotMeta::default();
    info!("deleted snapshot {} (merged into {})", snapshot_id, child);
    dc.write_metadata()?;
    dc.close()
}
