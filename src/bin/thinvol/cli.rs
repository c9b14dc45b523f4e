use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI поверх query/management API ThinVol.
#[derive(Parser, Debug)]
#[command(name = "thinvol", version, about = "ThinVol device management CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Initialize a device (superblock + empty tables)
    InitDevice {
        device: PathBuf,
    },
    /// Compact dark device slots (not implemented)
    VacuumDevice {
        device: PathBuf,
    },
    /// Print device summary
    GetDeviceInfo {
        device: PathBuf,
        /// JSON output (single object)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print per-volume summary
    GetVolumeInfo {
        device: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the snapshot chain of a volume (tip to root)
    GetSnapshotInfo {
        device: PathBuf,
        volume_name: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Create a volume (SIZE accepts IEC suffixes, e.g. 2GiB)
    CreateVolume {
        device: PathBuf,
        volume_name: String,
        volume_size: String,
    },
    /// Rename a volume
    RenameVolume {
        device: PathBuf,
        volume_name: String,
        new_volume_name: String,
    },
    /// Snapshot a volume (the new snapshot becomes the tip)
    CreateSnapshot {
        device: PathBuf,
        volume_name: String,
    },
    /// Clone a snapshot into a new volume (physical copy)
    CloneSnapshot {
        device: PathBuf,
        new_volume_name: String,
        snapshot_id: u16,
    },
    /// Delete a volume and its whole snapshot chain
    DeleteVolume {
        device: PathBuf,
        volume_name: String,
    },
    /// Delete a non-tip snapshot (merges into its child)
    DeleteSnapshot {
        device: PathBuf,
        snapshot_id: u16,
    },
}
