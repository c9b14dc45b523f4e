//! device — контекст устройства: зеркало superblock + таблиц и производные
//! смещения. Разбивка как в остальных подсистемах:
//! - mod.rs: структура, new()/open()/close(), вычисление смещений
//! - io.rs: персистенция (superblock, таблицы, extent-записи, данные блоков)
//! - lookup.rs: поиск/подсчёт/добавление томов и снапшотов

mod io;
mod lookup;

use anyhow::{anyhow, Context, Result};
use std::path::Path;

use crate::consts::{
    BLOCK_SIZE, EXTENT_META_SIZE, EXTENT_SIZE, MAX_SNAPSHOTS, MAX_VOLUMES, MIN_DEVICE_SIZE,
    SNAPSHOT_META_SIZE, VOLUME_META_SIZE,
};
use crate::dio::DirectFile;
use crate::error::StoreError;
use crate::format::{SnapshotMeta, Superblock, VolumeMeta};
use crate::util::div_round_up;

/// Суммарный размер таблиц томов и снапшотов (до выравнивания).
const TABLES_SIZE: u64 =
    (MAX_VOLUMES * VOLUME_META_SIZE + MAX_SNAPSHOTS * SNAPSHOT_META_SIZE) as u64;

/// Контекст устройства: дескриптор + все метаданные, кроме extent-записей.
pub struct DeviceContext {
    pub(crate) f: DirectFile,
    pub(crate) superblock: Superblock,
    pub(crate) volumes: Vec<VolumeMeta>,
    pub(crate) snapshots: Vec<SnapshotMeta>,
    extent_offset: u64,
    data_offset: u64,
    total_device_extents: u32,
}

impl DeviceContext {
    /// Открыть backing object и подготовить пустой контекст со свежим
    /// superblock (ничего с диска ещё не прочитано). Используется init'ом.
    pub fn new(device: &Path) -> Result<Self> {
        let f = DirectFile::open(device)?;
        let device_size = f.size()?;
        if device_size == 0 {
            return Err(StoreError::ZeroSize.into());
        }
        if device_size < MIN_DEVICE_SIZE {
            return Err(StoreError::TooSmall.into());
        }

        let extent_offset =
            (1 + div_round_up(TABLES_SIZE, BLOCK_SIZE as u64)) * BLOCK_SIZE as u64;
        let total_device_extents = (device_size - extent_offset) / EXTENT_SIZE as u64;
        let metadata_size = extent_offset + total_device_extents * EXTENT_META_SIZE as u64;
        let data_offset = div_round_up(metadata_size, EXTENT_SIZE as u64) * EXTENT_SIZE as u64;
        // Слоты, съеденные таблицей extent-записей: считаем от data_offset,
        // чтобы таблица и данные гарантированно умещались в устройство.
        let total_device_extents = (device_size - data_offset) / EXTENT_SIZE as u64;

        Ok(Self {
            f,
            superblock: Superblock::new(device_size),
            volumes: vec![VolumeMeta::default(); MAX_VOLUMES],
            snapshots: vec![SnapshotMeta::default(); MAX_SNAPSHOTS],
            extent_offset,
            data_offset,
            total_device_extents: total_device_extents as u32,
        })
    }

    /// Открыть инициализированное устройство: superblock + таблицы.
    pub fn open(device: &Path) -> Result<Self> {
        let mut dc = Self::new(device)?;
        dc.read_superblock()
            .with_context(|| format!("open {}", device.display()))?;
        dc.read_metadata()
            .with_context(|| format!("open {}", device.display()))?;
        Ok(dc)
    }

    #[inline]
    pub fn extent_offset(&self) -> u64 {
        self.extent_offset
    }

    #[inline]
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    #[inline]
    pub fn total_device_extents(&self) -> u32 {
        self.total_device_extents
    }

    /// Метаданные снапшота по идентификатору (слот + 1).
    pub(crate) fn snapshot(&self, sid: u16) -> Result<&SnapshotMeta> {
        if sid == 0 || sid as usize > MAX_SNAPSHOTS {
            return Err(anyhow!(StoreError::SnapshotNotFound(sid)));
        }
        Ok(&self.snapshots[sid as usize - 1])
    }

    /// Родитель снапшота (0 — корень).
    pub(crate) fn parent_of(&self, sid: u16) -> Result<u16> {
        Ok(self.snapshot(sid)?.parent_snapshot_id)
    }

    /// Синхронизировать и закрыть устройство.
    pub fn close(self) -> Result<()> {
        self.f.sync().context("cannot sync device")?;
        Ok(())
    }
}
