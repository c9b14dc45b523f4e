#![allow(non_snake_case)]

//! ThinVol — тонкие снапшотируемые виртуальные тома поверх одного backing
//! object (файла или блочного устройства).
//!
//! Раскладка устройства:
//! - [0, BLOCK_SIZE) — superblock
//! - [BLOCK_SIZE, extent_offset) — таблицы томов и снапшотов
//! - [extent_offset, data_offset) — extent-записи (data_offset выровнен на extent)
//! - [data_offset, device_size) — данные

// Базовые модули
pub mod consts;
pub mod error;
pub mod util;

// Ввод/вывод и формат
pub mod dio;
pub mod format;

// Ядро: контекст устройства, карта extent'ов, блочный API
pub mod device;
pub mod extmap;
pub mod volume;

// Управление и запросы
pub mod mgmt;
pub mod query;

// Удобные реэкспорты
pub use error::StoreError;
pub use mgmt::{
    clone_snapshot, create_snapshot, create_volume, delete_snapshot, delete_volume, init_device,
    rename_volume, vacuum_device,
};
pub use query::{get_device_info, get_snapshot_info, get_volume_info};
pub use query::{DeviceInfo, SnapshotInfo, VolumeInfo};
pub use volume::{open_volume, VolumeContext};
