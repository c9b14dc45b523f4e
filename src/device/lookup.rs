//! device/lookup — поиск, подсчёт и добавление томов/снапшотов.
//!
//! Идентификатор снапшота = индекс слота + 1; ноль зарезервирован под
//! «нет родителя» / «слот свободен».

use anyhow::Result;

use crate::error::StoreError;
use crate::util::now_secs;

use crate::consts::EXTENT_SIZE;

use super::DeviceContext;

impl DeviceContext {
    /// Слот тома по имени. None, если не найден.
    pub(crate) fn find_volume(&self, volume_name: &str) -> Option<usize> {
        self.volumes
            .iter()
            .position(|v| !v.is_free() && v.name() == volume_name)
    }

    /// Единственный потомок снапшота `sid`. 0, если потомка нет.
    pub(crate) fn find_child_snapshot(&self, sid: u16) -> u16 {
        for (i, s) in self.snapshots.iter().enumerate() {
            if s.is_free() {
                continue;
            }
            if s.parent_snapshot_id == sid {
                return (i + 1) as u16;
            }
        }
        0
    }

    /// Слот тома, в чью цепочку входит снапшот `sid`: идём по потомкам,
    /// пока какой-нибудь tip не совпадёт.
    pub(crate) fn find_volume_with_snapshot(&self, snapshot_id: u16) -> Option<usize> {
        let mut sid = snapshot_id;
        while sid != 0 {
            if let Some(idx) = self
                .volumes
                .iter()
                .position(|v| v.snapshot_id == sid)
            {
                return Some(idx);
            }
            sid = self.find_child_snapshot(sid);
        }
        None
    }

    pub(crate) fn count_volumes(&self) -> usize {
        self.volumes.iter().filter(|v| !v.is_free()).count()
    }

    /// Длина цепочки снапшотов от tip'а слота `vidx` до корня.
    pub(crate) fn count_snapshots(&self, vidx: usize) -> usize {
        let mut count = 0usize;
        let mut sid = self.volumes[vidx].snapshot_id;
        while sid != 0 {
            count += 1;
            sid = self.snapshots[sid as usize - 1].parent_snapshot_id;
        }
        count
    }

    /// Завести том (и корневой снапшот). Возвращает слот тома.
    /// Размер усекается до кратного EXTENT_SIZE.
    pub(crate) fn add_volume(&mut self, volume_name: &str, volume_size: u64) -> Result<usize> {
        let vidx = self
            .volumes
            .iter()
            .position(|v| v.is_free())
            .ok_or(StoreError::OutOfVolumeSlots)?;

        let sid = self.add_snapshot(0)?;
        let v = &mut self.volumes[vidx];
        v.snapshot_id = sid;
        v.volume_size = (volume_size / EXTENT_SIZE as u64) * EXTENT_SIZE as u64;
        v.set_name(volume_name);
        Ok(vidx)
    }

    /// Завести снапшот с данным родителем. Возвращает идентификатор.
    pub(crate) fn add_snapshot(&mut self, parent_snapshot_id: u16) -> Result<u16> {
        let sidx = self
            .snapshots
            .iter()
            .position(|s| s.is_free())
            .ok_or(StoreError::OutOfSnapshotSlots)?;

        let s = &mut self.snapshots[sidx];
        s.parent_snapshot_id = parent_snapshot_id;
        s.created_at = now_secs();
        Ok((sidx + 1) as u16)
    }
}
