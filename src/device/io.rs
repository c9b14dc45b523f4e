//! device/io — персистенция метаданных и данных.
//!
//! Extent-записи (38 B) не выровнены на блок, поэтому их чтение/запись идёт
//! через покрывающий блочный интервал: читаем целые блоки, патчим нужный
//! срез, пишем блоки назад. Таблицы томов/снапшотов пишутся одним буфером
//! в [BLOCK_SIZE, extent_offset).

use anyhow::{anyhow, Context, Result};

use crate::consts::{BLOCK_SIZE, EXTENT_META_SIZE, EXTENT_SIZE, SNAPSHOT_META_SIZE,
    SUPERBLOCK_SIZE, VOLUME_META_SIZE};
use crate::dio::AlignedBuf;
use crate::format::{ExtentMeta, SnapshotMeta, Superblock, VolumeMeta};
use crate::util::div_round_up;

use super::DeviceContext;

impl DeviceContext {
    // ---------------- superblock ----------------

    pub(crate) fn read_superblock(&mut self) -> Result<()> {
        let mut abuf = AlignedBuf::zeroed(BLOCK_SIZE);
        self.f
            .read_at(&mut abuf, 0)
            .context("failed to read superblock")?;
        let sb = Superblock::decode_from(&abuf[..SUPERBLOCK_SIZE])?;
        if sb.device_size != self.superblock.device_size {
            return Err(anyhow!(
                "device size mismatch in superblock ({} != {})",
                sb.device_size,
                self.superblock.device_size
            ));
        }
        self.superblock = sb;
        Ok(())
    }

    pub(crate) fn write_superblock(&self) -> Result<()> {
        let mut abuf = AlignedBuf::zeroed(BLOCK_SIZE);
        self.superblock.encode_into(&mut abuf[..SUPERBLOCK_SIZE]);
        self.f
            .write_at(&abuf, 0)
            .context("failed to write superblock")
    }

    // ---------------- таблицы томов и снапшотов ----------------

    pub(crate) fn read_metadata(&mut self) -> Result<()> {
        let region = (self.extent_offset() - BLOCK_SIZE as u64) as usize;
        let mut abuf = AlignedBuf::zeroed(region);
        self.f
            .read_at(&mut abuf, BLOCK_SIZE as u64)
            .context("failed to read metadata")?;

        let mut off = 0usize;
        for v in self.volumes.iter_mut() {
            *v = VolumeMeta::decode_from(&abuf[off..off + VOLUME_META_SIZE]);
            off += VOLUME_META_SIZE;
        }
        for s in self.snapshots.iter_mut() {
            *s = SnapshotMeta::decode_from(&abuf[off..off + SNAPSHOT_META_SIZE]);
            off += SNAPSHOT_META_SIZE;
        }
        Ok(())
    }

    pub(crate) fn write_metadata(&self) -> Result<()> {
        let region = (self.extent_offset() - BLOCK_SIZE as u64) as usize;
        let mut abuf = AlignedBuf::zeroed(region);

        let mut off = 0usize;
        for v in self.volumes.iter() {
            v.encode_into(&mut abuf[off..off + VOLUME_META_SIZE]);
            off += VOLUME_META_SIZE;
        }
        for s in self.snapshots.iter() {
            s.encode_into(&mut abuf[off..off + SNAPSHOT_META_SIZE]);
            off += SNAPSHOT_META_SIZE;
        }
        self.f
            .write_at(&abuf, BLOCK_SIZE as u64)
            .context("failed to write metadata")
    }

    // ---------------- extent-записи ----------------

    /// Покрывающий блочный интервал для `count` записей со слота `slot`:
    /// (byte_offset записи, выровненное начало, размер интервала).
    fn extent_span(&self, slot: u32, count: usize) -> (u64, u64, usize) {
        let offset = self.extent_offset() + slot as u64 * EXTENT_META_SIZE as u64;
        let size = (count * EXTENT_META_SIZE) as u64;
        let astart = (offset / BLOCK_SIZE as u64) * BLOCK_SIZE as u64;
        let aend = div_round_up(offset + size, BLOCK_SIZE as u64) * BLOCK_SIZE as u64;
        (offset, astart, (aend - astart) as usize)
    }

    /// Прочитать батч extent-записей начиная со слота `slot`.
    pub(crate) fn read_extents(&self, batch: &mut [ExtentMeta], slot: u32) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let (offset, astart, span) = self.extent_span(slot, batch.len());
        let mut abuf = AlignedBuf::zeroed(span);
        self.f
            .read_at(&mut abuf, astart)
            .context("failed to read extent metadata")?;

        let mut off = (offset - astart) as usize;
        for e in batch.iter_mut() {
            *e = ExtentMeta::decode_from(&abuf[off..off + EXTENT_META_SIZE]);
            off += EXTENT_META_SIZE;
        }
        Ok(())
    }

    /// Записать батч extent-записей (read-modify-write покрывающих блоков).
    pub(crate) fn write_extents(&self, batch: &[ExtentMeta], slot: u32) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let (offset, astart, span) = self.extent_span(slot, batch.len());
        let mut abuf = AlignedBuf::zeroed(span);
        self.f
            .read_at(&mut abuf, astart)
            .context("failed to read extent metadata")?;

        let mut off = (offset - astart) as usize;
        for e in batch.iter() {
            e.encode_into(&mut abuf[off..off + EXTENT_META_SIZE]);
            off += EXTENT_META_SIZE;
        }
        self.f
            .write_at(&abuf, astart)
            .context("failed to write extent metadata")
    }

    /// Записать одну extent-запись в слот устройства.
    pub(crate) fn write_extent(&self, e: &ExtentMeta, slot: u32) -> Result<()> {
        self.write_extents(std::slice::from_ref(e), slot)
    }

    // ---------------- данные ----------------

    /// Прочитать блок данных: слот устройства `epos`, блок `bidx` внутри него.
    pub(crate) fn read_block_data(&self, data: &mut [u8], epos: u32, bidx: u64) -> Result<()> {
        let offset =
            self.data_offset() + epos as u64 * EXTENT_SIZE as u64 + bidx * BLOCK_SIZE as u64;
        self.f
            .read_at(&mut data[..BLOCK_SIZE], offset)
            .context("failed to read block")
    }

    pub(crate) fn write_block_data(&self, data: &[u8], epos: u32, bidx: u64) -> Result<()> {
        let offset =
            self.data_offset() + epos as u64 * EXTENT_SIZE as u64 + bidx * BLOCK_SIZE as u64;
        self.f
            .write_at(&data[..BLOCK_SIZE], offset)
            .context("failed to write block")
    }

    /// Скопировать 1 MiB данных из слота `esrc` в слот `edst`.
    pub(crate) fn copy_extent_data(&self, esrc: u32, edst: u32) -> Result<()> {
        let mut abuf = AlignedBuf::zeroed(EXTENT_SIZE);
        self.f
            .read_at(&mut abuf, self.data_offset() + esrc as u64 * EXTENT_SIZE as u64)
            .context("failed to read extent data")?;
        self.f
            .write_at(&abuf, self.data_offset() + edst as u64 * EXTENT_SIZE as u64)
            .context("failed to write extent data")
    }
}
