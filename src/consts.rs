//! Общие константы формата устройства (superblock, таблицы, extent-записи).
//!
//! Раскладка устройства (LE):
//! - Байты [0, BLOCK_SIZE)             — superblock, дополненный нулями до блока
//! - Байты [BLOCK_SIZE, extent_offset) — таблица томов, затем таблица снапшотов
//! - Байты [extent_offset, data_offset) — extent-записи, по слотам устройства
//! - Байты [data_offset, device_size)   — данные; i-й слот занимает EXTENT_SIZE

// -------- Superblock --------
pub const MAGIC: &[u8; 8] = &[0x44, 0x42, 0x53, 0x40, 0x33, 0x39, 0x0D, 0x21]; // "DBS@39\r!"
pub const VERSION: u32 = 0x0001_0000; // 16-bit major, 8-bit minor, 8-bit patch
pub const SUPERBLOCK_SIZE: usize = 24; // [magic8][version u32][allocated u32][device_size u64]

// -------- Блоки и extents --------
pub const BLOCK_SIZE: usize = 4096;
pub const EXTENT_SIZE: usize = 1 << 20; // 1 MiB
pub const BLOCKS_PER_EXTENT: u64 = 256;
pub const BLOCK_BITS_IN_EXTENT: u64 = 8;
pub const BLOCK_MASK_IN_EXTENT: u64 = 0xFF;
pub const EXTENT_BITMAP_SIZE: usize = 32; // 256 бит, по одному на блок extent'а

// -------- Таблицы --------
pub const MAX_VOLUMES: usize = 256;
pub const MAX_SNAPSHOTS: usize = 65_535;
pub const MAX_VOLUME_NAME_SIZE: usize = 255;
pub const VOLUME_NAME_FIELD: usize = MAX_VOLUME_NAME_SIZE + 1; // NUL-padded

// Размеры записей на диске (байт):
pub const VOLUME_META_SIZE: usize = 2 + 8 + VOLUME_NAME_FIELD; // 266
pub const SNAPSHOT_META_SIZE: usize = 2 + 8; // 10
pub const EXTENT_META_SIZE: usize = 2 + 4 + EXTENT_BITMAP_SIZE; // 38

// -------- Прочее --------
/// Записей extent-метаданных за один батч чтения/записи (ограничивает память).
pub const EXTENT_BATCH: usize = 65_536;

/// Минимальный размер устройства: 100 MiB.
pub const MIN_DEVICE_SIZE: u64 = 100 * (1 << 20);
