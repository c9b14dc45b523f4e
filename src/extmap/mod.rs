//! extmap — карта extent'ов тома для заданного снапшота.
//!
//! Для каждого индекса extent'а относительно тома карта говорит, есть ли
//! данные и в каком слоте устройства они лежат. Две параллельные структуры:
//! упакованный по словам (u32) битмап присутствия и плотный массив записей.
//! Сканы пропускают пустые регионы по 32 extent'а одним сравнением слова и
//! обрываются на max_extent_idx — существенно для разреженных томов.
//!
//! Инвариант поля extent_pos: в `extents[]` лежит индекс слота устройства;
//! на диске та же запись хранит индекс относительно тома. Подмену в обе
//! стороны выполняют builders и write_extent().

use anyhow::Result;
use log::debug;

use crate::consts::{EXTENT_BATCH, EXTENT_SIZE};
use crate::device::DeviceContext;
use crate::error::StoreError;
use crate::format::ExtentMeta;

pub struct ExtentMap {
    total_volume_extents: u32,
    /// Заполненных записей.
    count: u32,
    /// Максимальный заполненный индекс (значим только при count > 0).
    max_extent_idx: u32,
    bitmap: Vec<u32>,
    extents: Vec<ExtentMeta>,
}

impl ExtentMap {
    fn empty(volume_size: u64) -> Self {
        let tve = (volume_size / EXTENT_SIZE as u64) as u32;
        Self {
            total_volume_extents: tve,
            count: 0,
            max_extent_idx: 0,
            bitmap: vec![0u32; ((tve + 31) / 32) as usize],
            extents: vec![ExtentMeta::default(); tve as usize],
        }
    }

    // ---------------- битмап присутствия ----------------

    #[inline]
    pub fn is_present(&self, v: u32) -> bool {
        self.bitmap[(v >> 5) as usize] & (1 << (v & 31)) != 0
    }

    fn insert(&mut self, v: u32, rec: ExtentMeta) {
        if !self.is_present(v) {
            self.bitmap[(v >> 5) as usize] |= 1 << (v & 31);
            self.count += 1;
        }
        if v > self.max_extent_idx {
            self.max_extent_idx = v;
        }
        self.extents[v as usize] = rec;
    }

    pub(crate) fn remove(&mut self, v: u32) {
        if self.is_present(v) {
            self.bitmap[(v >> 5) as usize] &= !(1 << (v & 31));
            self.count -= 1;
        }
        self.extents[v as usize] = ExtentMeta::default();
    }

    /// Следующий заполненный индекс, начиная с `from`. Пустые слова
    /// перескакиваются целиком; за max_extent_idx не заглядываем.
    fn next_present(&self, from: u32) -> Option<u32> {
        if self.count == 0 {
            return None;
        }
        let mut v = from;
        while v <= self.max_extent_idx {
            let w = self.bitmap[(v >> 5) as usize] >> (v & 31);
            if w == 0 {
                v = (v | 31) + 1;
                continue;
            }
            let hit = v + w.trailing_zeros();
            if hit > self.max_extent_idx {
                return None;
            }
            return Some(hit);
        }
        None
    }

    // ---------------- доступ ----------------

    #[inline]
    pub fn total_volume_extents(&self) -> u32 {
        self.total_volume_extents
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub(crate) fn entry(&self, v: u32) -> &ExtentMeta {
        &self.extents[v as usize]
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, v: u32) -> &mut ExtentMeta {
        &mut self.extents[v as usize]
    }

    // ---------------- builders ----------------

    /// Карта одного снапшота: батчевый проход по
    /// min(total_device_extents, allocated_device_extents) записям.
    pub fn snapshot_map(dc: &DeviceContext, volume_size: u64, sid: u16) -> Result<Self> {
        debug_assert!(sid != 0);
        let mut em = Self::empty(volume_size);

        let remaining = dc
            .total_device_extents()
            .min(dc.superblock.allocated_device_extents);
        if remaining == 0 {
            return Ok(em);
        }

        let mut batch = vec![ExtentMeta::default(); EXTENT_BATCH.min(remaining as usize)];
        let mut slot = 0u32;
        while slot < remaining {
            let n = ((remaining - slot) as usize).min(EXTENT_BATCH);
            dc.read_extents(&mut batch[..n], slot)?;
            for (i, rec) in batch[..n].iter().enumerate() {
                if rec.snapshot_id != sid {
                    continue;
                }
                // На диске extent_pos — индекс относительно тома.
                let v = rec.extent_pos;
                if v >= em.total_volume_extents {
                    continue;
                }
                let mut e = *rec;
                e.extent_pos = slot + i as u32;
                em.insert(v, e);
            }
            slot += n as u32;
        }
        debug!(
            "snapshot map for sid {}: {} of {} extents",
            sid, em.count, em.total_volume_extents
        );
        Ok(em)
    }

    /// Сплющенная карта тома: снапшот `sid` плюс все предки. При совпадении
    /// индексов побеждает ближайший к tip'у снапшот.
    pub fn volume_map(dc: &DeviceContext, volume_size: u64, sid: u16) -> Result<Self> {
        let mut vem = Self::snapshot_map(dc, volume_size, sid)?;

        let mut ancestor = dc.parent_of(sid)?;
        while ancestor != 0 {
            let sem = Self::snapshot_map(dc, volume_size, ancestor)?;
            let mut v = 0u32;
            while let Some(i) = sem.next_present(v) {
                if !vem.is_present(i) {
                    vem.insert(i, sem.extents[i as usize]);
                }
                v = i + 1;
            }
            ancestor = dc.parent_of(ancestor)?;
        }
        Ok(vem)
    }

    // ---------------- персистенция ----------------

    /// Записать запись индекса `v` на диск, восстановив в поле extent_pos
    /// индекс относительно тома.
    pub(crate) fn write_extent(&self, dc: &DeviceContext, v: u32) -> Result<()> {
        let slot = self.extents[v as usize].extent_pos;
        let mut rec = self.extents[v as usize];
        rec.extent_pos = v;
        dc.write_extent(&rec, slot)
    }

    // ---------------- массовые операции ----------------

    /// Выделить новый слот устройства под extent `v` снапшота `sid`.
    /// Superblock после успеха персистит вызывающий.
    pub(crate) fn new_extent(
        &mut self,
        dc: &mut DeviceContext,
        v: u32,
        sid: u16,
    ) -> Result<()> {
        let pos = dc.superblock.allocated_device_extents;
        if pos >= dc.total_device_extents() {
            return Err(StoreError::NoSpace.into());
        }
        self.insert(
            v,
            ExtentMeta {
                snapshot_id: sid,
                extent_pos: pos,
                ..Default::default()
            },
        );
        self.write_extent(dc, v)?;
        dc.superblock.allocated_device_extents += 1;
        Ok(())
    }

    /// COW: скопировать данные extent'а `v` в свежий слот и перевесить
    /// запись на снапшот `sid`.
    pub(crate) fn copy_extent(
        &mut self,
        dc: &mut DeviceContext,
        v: u32,
        sid: u16,
    ) -> Result<()> {
        let pdst = dc.superblock.allocated_device_extents;
        if pdst >= dc.total_device_extents() {
            return Err(StoreError::NoSpace.into());
        }
        let psrc = self.extents[v as usize].extent_pos;
        dc.copy_extent_data(psrc, pdst)?;
        let e = &mut self.extents[v as usize];
        e.snapshot_id = sid;
        e.extent_pos = pdst;
        self.write_extent(dc, v)?;
        dc.superblock.allocated_device_extents += 1;
        Ok(())
    }

    /// Скопировать все заполненные extent'ы под другой снапшот (clone).
    pub(crate) fn copy_all_to(&mut self, dc: &mut DeviceContext, sid: u16) -> Result<()> {
        let mut v = 0u32;
        while let Some(i) = self.next_present(v) {
            self.copy_extent(dc, i, sid)?;
            v = i + 1;
        }
        Ok(())
    }

    /// Перенести в `dst` все записи, которых там нет, перевесив их на
    /// снапшот `sid` (слияние при удалении снапшота). Затенённые записи
    /// остаются в self — их добивает clear_all().
    pub(crate) fn merge_into(
        &mut self,
        dc: &DeviceContext,
        dst: &mut ExtentMap,
        sid: u16,
    ) -> Result<()> {
        let mut v = 0u32;
        while let Some(i) = self.next_present(v) {
            if !dst.is_present(i) {
                let mut rec = self.extents[i as usize];
                rec.snapshot_id = sid;
                dst.insert(i, rec);
                dst.write_extent(dc, i)?;
                self.remove(i);
            }
            v = i + 1;
        }
        Ok(())
    }

    /// Обнулить на диске все записи карты (слоты устройства остаются
    /// тёмными до vacuum).
    pub(crate) fn clear_all(&mut self, dc: &DeviceContext) -> Result<()> {
        let zero = ExtentMeta::default();
        let mut v = 0u32;
        while let Some(i) = self.next_present(v) {
            dc.write_extent(&zero, self.extents[i as usize].extent_pos)?;
            self.remove(i);
            v = i + 1;
        }
        Ok(())
    }
}
