//! format — сериализация записей формата (LE, фиксированные размеры).
//!
//! Записи:
//! - Superblock: [magic8][version u32][allocated_device_extents u32][device_size u64] = 24 B,
//!   на диске дополняется нулями до BLOCK_SIZE.
//! - VolumeMeta: [snapshot_id u16][volume_size u64][volume_name 256 B, NUL-padded] = 266 B.
//! - SnapshotMeta: [parent_snapshot_id u16][created_at i64] = 10 B.
//! - ExtentMeta: [snapshot_id u16][extent_pos u32][block_bitmap 32 B] = 38 B.
//!
//! Поле extent_pos двухцелевое: на диске это индекс extent'а относительно
//! тома, в памяти (внутри ExtentMap) — индекс слота устройства. Подмену
//! выполняют ExtentMap-хелперы, кодек пишет поле как есть.

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{
    EXTENT_BITMAP_SIZE, EXTENT_META_SIZE, MAGIC, MAX_VOLUME_NAME_SIZE, SNAPSHOT_META_SIZE,
    SUPERBLOCK_SIZE, VERSION, VOLUME_META_SIZE, VOLUME_NAME_FIELD,
};
use crate::error::StoreError;

// ---------------- Superblock ----------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub version: u32,
    pub allocated_device_extents: u32,
    pub device_size: u64,
}

impl Superblock {
    /// Свежий superblock для устройства заданного размера.
    pub fn new(device_size: u64) -> Self {
        Self {
            version: VERSION,
            allocated_device_extents: 0,
            device_size,
        }
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(MAGIC);
        LittleEndian::write_u32(&mut buf[8..12], self.version);
        LittleEndian::write_u32(&mut buf[12..16], self.allocated_device_extents);
        LittleEndian::write_u64(&mut buf[16..24], self.device_size);
    }

    /// Разбор с проверкой magic и версии.
    pub fn decode_from(buf: &[u8]) -> Result<Self> {
        debug_assert!(buf.len() >= SUPERBLOCK_SIZE);
        if &buf[0..8] != MAGIC {
            return Err(StoreError::NotInitialized.into());
        }
        let version = LittleEndian::read_u32(&buf[8..12]);
        if version != VERSION {
            return Err(StoreError::VersionMismatch.into());
        }
        Ok(Self {
            version,
            allocated_device_extents: LittleEndian::read_u32(&buf[12..16]),
            device_size: LittleEndian::read_u64(&buf[16..24]),
        })
    }
}

// ---------------- Volume record ----------------

#[derive(Debug, Clone, Copy)]
pub struct VolumeMeta {
    /// Текущий tip (индекс в таблице снапшотов + 1); 0 — слот свободен.
    pub snapshot_id: u16,
    pub volume_size: u64,
    pub volume_name: [u8; VOLUME_NAME_FIELD],
}

impl Default for VolumeMeta {
    fn default() -> Self {
        Self {
            snapshot_id: 0,
            volume_size: 0,
            volume_name: [0u8; VOLUME_NAME_FIELD],
        }
    }
}

impl VolumeMeta {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.snapshot_id == 0
    }

    /// Имя до первого NUL.
    pub fn name(&self) -> &str {
        let end = self
            .volume_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_VOLUME_NAME_SIZE);
        std::str::from_utf8(&self.volume_name[..end]).unwrap_or("")
    }

    /// Записать имя (усечение до MAX_VOLUME_NAME_SIZE, NUL-padding).
    pub fn set_name(&mut self, name: &str) {
        self.volume_name = [0u8; VOLUME_NAME_FIELD];
        let n = name.len().min(MAX_VOLUME_NAME_SIZE);
        self.volume_name[..n].copy_from_slice(&name.as_bytes()[..n]);
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        LittleEndian::write_u16(&mut buf[0..2], self.snapshot_id);
        LittleEndian::write_u64(&mut buf[2..10], self.volume_size);
        buf[10..10 + VOLUME_NAME_FIELD].copy_from_slice(&self.volume_name);
    }

    pub fn decode_from(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= VOLUME_META_SIZE);
        let mut volume_name = [0u8; VOLUME_NAME_FIELD];
        volume_name.copy_from_slice(&buf[10..10 + VOLUME_NAME_FIELD]);
        Self {
            snapshot_id: LittleEndian::read_u16(&buf[0..2]),
            volume_size: LittleEndian::read_u64(&buf[2..10]),
            volume_name,
        }
    }
}

// ---------------- Snapshot record ----------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotMeta {
    /// 0 — корень цепочки.
    pub parent_snapshot_id: u16,
    /// Unix-секунды; 0 — слот свободен.
    pub created_at: i64,
}

impl SnapshotMeta {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.created_at == 0
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        LittleEndian::write_u16(&mut buf[0..2], self.parent_snapshot_id);
        LittleEndian::write_i64(&mut buf[2..10], self.created_at);
    }

    pub fn decode_from(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= SNAPSHOT_META_SIZE);
        Self {
            parent_snapshot_id: LittleEndian::read_u16(&buf[0..2]),
            created_at: LittleEndian::read_i64(&buf[2..10]),
        }
    }
}

// ---------------- Extent record ----------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtentMeta {
    /// Снапшот-владелец; 0 — слот свободен.
    pub snapshot_id: u16,
    pub extent_pos: u32,
    pub block_bitmap: [u8; EXTENT_BITMAP_SIZE],
}

impl ExtentMeta {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.snapshot_id == 0
    }

    #[inline]
    pub fn block_test(&self, bidx: u64) -> bool {
        self.block_bitmap[(bidx >> 3) as usize] & (1 << (bidx & 0x7)) != 0
    }

    #[inline]
    pub fn block_set(&mut self, bidx: u64) {
        self.block_bitmap[(bidx >> 3) as usize] |= 1 << (bidx & 0x7);
    }

    #[inline]
    pub fn block_clear(&mut self, bidx: u64) {
        self.block_bitmap[(bidx >> 3) as usize] &= !(1 << (bidx & 0x7));
    }

    #[inline]
    pub fn bitmap_is_empty(&self) -> bool {
        self.block_bitmap.iter().all(|&b| b == 0)
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        LittleEndian::write_u16(&mut buf[0..2], self.snapshot_id);
        LittleEndian::write_u32(&mut buf[2..6], self.extent_pos);
        buf[6..6 + EXTENT_BITMAP_SIZE].copy_from_slice(&self.block_bitmap);
    }

    pub fn decode_from(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= EXTENT_META_SIZE);
        let mut block_bitmap = [0u8; EXTENT_BITMAP_SIZE];
        block_bitmap.copy_from_slice(&buf[6..6 + EXTENT_BITMAP_SIZE]);
        Self {
            snapshot_id: LittleEndian::read_u16(&buf[0..2]),
            extent_pos: LittleEndian::read_u32(&buf[2..6]),
            block_bitmap,
        }
    }
}
