//! Removable drive enumeration

use std::fs;
use std::path::PathBuf;

use sysinfo::Disks;

/// What the detector needs to know about a mounted disk
#[derive(Debug, Clone)]
pub(crate) struct MountedDisk {
    pub name: String,
    pub mount_point: PathBuf,
    pub total_space: u64,
    pub removable: bool,
}

/// Every mounted disk, as reported by the OS
pub(crate) fn mounted_disks() -> Vec<MountedDisk> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|disk| MountedDisk {
            name: disk.name().to_string_lossy().trim().to_string(),
            mount_point: disk.mount_point().to_path_buf(),
            total_space: disk.total_space(),
            removable: disk.is_removable(),
        })
        .collect()
}

impl MountedDisk {
    /// Whether the disk looks like a writable drive a user plugged in
    ///
    /// Only reads metadata. Nothing is written to the drive.
    pub fn is_backup_candidate(&self) -> bool {
        self.removable && self.total_space > 0 && self.is_writable_mount()
    }

    fn is_writable_mount(&self) -> bool {
        fs::metadata(&self.mount_point)
            .map(|meta| meta.is_dir() && !meta.permissions().readonly())
            .unwrap_or(false)
    }

    /// Volume name, or the mount point when the volume has none
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.mount_point.display().to_string()
        } else {
            self.name.clone()
        }
    }
}
