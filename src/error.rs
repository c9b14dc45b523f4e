//! Классификация ошибок ядра.
//!
//! Все публичные операции возвращают `anyhow::Result`; конкретный вид ошибки
//! несёт `StoreError` внутри цепочки (`err.downcast_ref::<StoreError>()`).
//! `MetadataNeedsUpdate` — не сбой, а сигнал повторить запись под
//! эксклюзивной блокировкой с `update_metadata=true`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("device not initialized")]
    NotInitialized,

    #[error("version mismatch in superblock")]
    VersionMismatch,

    #[error("device with zero size")]
    ZeroSize,

    #[error("device size less than 100 MiB")]
    TooSmall,

    #[error("volume {0} not found")]
    VolumeNotFound(String),

    #[error("snapshot {0} not found")]
    SnapshotNotFound(u16),

    #[error("volume {0} already exists")]
    VolumeExists(String),

    #[error("max volume count reached")]
    OutOfVolumeSlots,

    #[error("max snapshot count reached")]
    OutOfSnapshotSlots,

    #[error("no space left on device")]
    NoSpace,

    #[error("block offset out of bounds")]
    OutOfRange,

    #[error("cannot delete current snapshot")]
    CannotDeleteCurrent,

    #[error("cannot delete root snapshot without descendants")]
    CannotDeleteRoot,

    #[error("metadata needs update")]
    MetadataNeedsUpdate,

    #[error("not implemented")]
    NotImplemented,
}

impl StoreError {
    /// Быстрая проверка сигнала fast-path записи.
    pub fn is_metadata_needs_update(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::MetadataNeedsUpdate)
        )
    }
}
