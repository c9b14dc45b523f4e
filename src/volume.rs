//! volume — блочный API открытого тома.
//!
//! VolumeContext владеет контекстом устройства и сплющенной картой extent'ов
//! (tip + все предки). Запись ведёт COW-протокол из трёх случаев:
//! - extent уже принадлежит tip'у — пишем на место;
//! - extent не материализован — выделяем новый слот устройства;
//! - extent принадлежит предку — копируем слот и перевешиваем на tip.
//! В двух последних случаях при update_metadata=false возвращается сигнал
//! MetadataNeedsUpdate: вызывающий повторяет запись под эксклюзивной
//! блокировкой. Порядок персистенции: extent-запись → superblock → данные.

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::consts::{BLOCK_BITS_IN_EXTENT, BLOCK_MASK_IN_EXTENT, BLOCK_SIZE};
use crate::device::DeviceContext;
use crate::error::StoreError;
use crate::extmap::ExtentMap;

pub struct VolumeContext {
    dc: DeviceContext,
    vidx: usize,
    vem: ExtentMap,
}

/// Открыть том: контекст устройства + карта тома по всей цепочке снапшотов.
pub fn open_volume(device: &Path, volume_name: &str) -> Result<VolumeContext> {
    let dc = DeviceContext::open(device)?;
    let vidx = dc
        .find_volume(volume_name)
        .ok_or_else(|| StoreError::VolumeNotFound(volume_name.to_string()))?;
    let v = &dc.volumes[vidx];
    let vem = ExtentMap::volume_map(&dc, v.volume_size, v.snapshot_id)?;
    Ok(VolumeContext { dc, vidx, vem })
}

impl VolumeContext {
    #[inline]
    fn tip(&self) -> u16 {
        self.dc.volumes[self.vidx].snapshot_id
    }

    /// Идентификатор снапшота, в который идут записи.
    #[inline]
    pub fn tip_snapshot_id(&self) -> u16 {
        self.tip()
    }

    /// Логический размер тома в байтах.
    #[inline]
    pub fn volume_size(&self) -> u64 {
        self.dc.volumes[self.vidx].volume_size
    }

    fn locate(&self, block: u64) -> Result<(u32, u64)> {
        let eidx = block >> BLOCK_BITS_IN_EXTENT;
        if eidx >= self.vem.total_volume_extents() as u64 {
            return Err(StoreError::OutOfRange.into());
        }
        Ok((eidx as u32, block & BLOCK_MASK_IN_EXTENT))
    }

    /// Прочитать блок. Нематериализованный extent или снятый бит битмапа
    /// читаются как нули.
    pub fn read_block(&self, data: &mut [u8], block: u64) -> Result<()> {
        if data.len() != BLOCK_SIZE {
            return Err(anyhow!(
                "buffer size {} != block size {}",
                data.len(),
                BLOCK_SIZE
            ));
        }
        let (eidx, bidx) = self.locate(block)?;
        let e = self.vem.entry(eidx);
        if e.is_free() || !e.block_test(bidx) {
            data.fill(0);
            return Ok(());
        }
        self.dc.read_block_data(data, e.extent_pos, bidx)
    }

    /// Записать блок. При update_metadata=false запись, требующая аллокации
    /// или COW, не выполняется — возвращается MetadataNeedsUpdate.
    pub fn write_block(&mut self, data: &[u8], block: u64, update_metadata: bool) -> Result<()> {
        if data.len() != BLOCK_SIZE {
            return Err(anyhow!(
                "buffer size {} != block size {}",
                data.len(),
                BLOCK_SIZE
            ));
        }
        let (eidx, bidx) = self.locate(block)?;
        let tip = self.tip();

        let owner = self.vem.entry(eidx).snapshot_id;
        if owner != tip {
            if !update_metadata {
                return Err(StoreError::MetadataNeedsUpdate.into());
            }
            if owner == 0 {
                self.vem.new_extent(&mut self.dc, eidx, tip)?;
            } else {
                self.vem.copy_extent(&mut self.dc, eidx, tip)?;
            }
            // allocated_device_extents изменился
            self.dc.write_superblock()?;
        }

        let e = self.vem.entry(eidx);
        let epos = e.extent_pos;
        let present = e.block_test(bidx);
        self.dc.write_block_data(data, epos, bidx)?;

        if !present {
            self.vem.entry_mut(eidx).block_set(bidx);
            self.vem.write_extent(&self.dc, eidx)?;
        }
        Ok(())
    }

    /// Снять блок с учёта. Идемпотентен: неразмеченный блок — успех без I/O.
    /// Когда битмап extent'а пустеет, запись освобождается (слот устройства
    /// остаётся тёмным до vacuum).
    pub fn unmap_block(&mut self, block: u64) -> Result<()> {
        let (eidx, bidx) = self.locate(block)?;
        let e = self.vem.entry(eidx);
        if e.is_free() || !e.block_test(bidx) {
            return Ok(());
        }

        let e = self.vem.entry_mut(eidx);
        e.block_clear(bidx);
        if e.bitmap_is_empty() {
            e.snapshot_id = 0;
            self.vem.write_extent(&self.dc, eidx)?;
            self.vem.remove(eidx);
        } else {
            self.vem.write_extent(&self.dc, eidx)?;
        }
        Ok(())
    }

    // ---------------- байтовые обёртки ----------------

    /// Чтение с произвольного байтового смещения; частичные блоки по краям
    /// читаются через промежуточный буфер.
    pub fn read_at(&self, data: &mut [u8], offset: u64) -> Result<()> {
        let mut doffset = 0usize;
        while doffset < data.len() {
            let pos = offset + doffset as u64;
            let block = pos / BLOCK_SIZE as u64;
            let boffset = (pos % BLOCK_SIZE as u64) as usize;
            let remaining = data.len() - doffset;
            if boffset == 0 && remaining >= BLOCK_SIZE {
                self.read_block(&mut data[doffset..doffset + BLOCK_SIZE], block)?;
                doffset += BLOCK_SIZE;
            } else {
                let mut buf = vec![0u8; BLOCK_SIZE];
                self.read_block(&mut buf, block)?;
                let dlength = (BLOCK_SIZE - boffset).min(remaining);
                data[doffset..doffset + dlength]
                    .copy_from_slice(&buf[boffset..boffset + dlength]);
                doffset += dlength;
            }
        }
        Ok(())
    }

    /// Запись с произвольного байтового смещения; частичные блоки проходят
    /// read-modify-write.
    pub fn write_at(&mut self, data: &[u8], offset: u64, update_metadata: bool) -> Result<()> {
        let mut doffset = 0usize;
        while doffset < data.len() {
            let pos = offset + doffset as u64;
            let block = pos / BLOCK_SIZE as u64;
            let boffset = (pos % BLOCK_SIZE as u64) as usize;
            let remaining = data.len() - doffset;
            if boffset == 0 && remaining >= BLOCK_SIZE {
                self.write_block(&data[doffset..doffset + BLOCK_SIZE], block, update_metadata)?;
                doffset += BLOCK_SIZE;
            } else {
                let mut buf = vec![0u8; BLOCK_SIZE];
                self.read_block(&mut buf, block)?;
                let dlength = (BLOCK_SIZE - boffset).min(remaining);
                buf[boffset..boffset + dlength]
                    .copy_from_slice(&data[doffset..doffset + dlength]);
                self.write_block(&buf, block, update_metadata)?;
                doffset += dlength;
            }
        }
        Ok(())
    }

    /// Снять с учёта целые блоки интервала; частичные края не трогаем.
    pub fn unmap_at(&mut self, length: u64, offset: u64) -> Result<()> {
        let mut doffset = 0u64;
        while doffset < length {
            let pos = offset + doffset;
            let block = pos / BLOCK_SIZE as u64;
            let boffset = pos % BLOCK_SIZE as u64;
            let remaining = length - doffset;
            if boffset == 0 && remaining >= BLOCK_SIZE as u64 {
                self.unmap_block(block)?;
                doffset += BLOCK_SIZE as u64;
            } else {
                doffset += (BLOCK_SIZE as u64 - boffset).min(remaining);
            }
        }
        Ok(())
    }

    /// Закрыть том (sync устройства).
    pub fn close_volume(self) -> Result<()> {
        self.dc.close()
    }
}
