//! Shared-memory handles for zero-copy hand-off to an external collaborator:
//! the core owns creation and destruction of a named, sized region; an
//! external process maps the same region read-only or read-write.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};

/// The triple identifying a region: a name (the backing file, relative to
/// whatever directory the core and the external collaborator both agree on),
/// a byte offset, and a byte size.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SharedMemoryHandle {
    pub name: String,
    pub offset: u64,
    pub size: usize,
}

/// An open shared-memory region. The core creates it via [`SharedMemoryRegion::create`]
/// and is the only side that calls [`SharedMemoryRegion::destroy`]; external processes
/// open the same path independently and map it themselves.
pub struct SharedMemoryRegion {
    handle: SharedMemoryHandle,
    path: PathBuf,
    file: File,
}

impl SharedMemoryRegion {
    /// Create (or truncate) a backing file of exactly `size` bytes under `dir`.
    pub fn create(dir: &Path, name: &str, size: usize) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(name);
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&path)?;
        file.set_len(size as u64)?;
        Ok(Self { handle: SharedMemoryHandle { name: name.to_string(), offset: 0, size }, path, file })
    }

    pub fn handle(&self) -> SharedMemoryHandle {
        self.handle.clone()
    }

    /// Map the region read-write for the core's own use.
    pub fn map_mut(&self) -> io::Result<MmapMut> {
        unsafe {
            MmapOptions::new()
                .offset(self.handle.offset)
                .len(self.handle.size)
                .map_mut(&self.file)
        }
    }

    /// Map the region read-only, the same way an external collaborator would.
    pub fn map_read_only(&self) -> io::Result<Mmap> {
        unsafe {
            MmapOptions::new()
                .offset(self.handle.offset)
                .len(self.handle.size)
                .map(&self.file)
        }
    }

    /// Unmap is implicit: dropping an `Mmap`/`MmapMut` unmaps it. `destroy`
    /// additionally removes the backing file, so no handle outlives its region.
    pub fn destroy(self) -> io::Result<()> {
        let path = self.path;
        drop(self.file);
        std::fs::remove_file(path)
    }
}
