//! Shared-memory framebuffers
//!
//! `ShmRegion` owns one anonymous, sealed memory file and its writable
//! mapping. The compositor reads pixels straight out of this file through a
//! `wl_shm_pool`, so the region can only ever grow: shrinking is sealed off.
//!
//! The pool in [`pool`] layers buffer reuse and release tracking on top.

pub mod pool;
pub mod wayland;

pub use pool::{
    BufferPool, BufferProxy, CommitTarget, PoolProxy, PoolStats, SharedBuffer, ShmAllocator,
};
pub use wayland::{WaylandPool, WaylandShm};

use log::{debug, trace};
use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};

use crate::error::{Result, WindowError};

/// Name given to the memfd backing each framebuffer
const SHM_FILE_NAME: &str = "hello-wayland-framebuffer";

/// `MFD_NOEXEC_SEAL` and `F_SEAL_EXEC` from Linux 6.3; older kernels reject
/// them with `EINVAL`
#[cfg(target_os = "linux")]
const MFD_NOEXEC_SEAL: libc::c_uint = 0x0008;
#[cfg(target_os = "linux")]
const F_SEAL_EXEC: libc::c_int = 0x0020;

/// A growable, memory-mapped anonymous file
pub struct ShmRegion {
    file: File,
    map: MmapMut,
    len: usize,
}

impl ShmRegion {
    /// Create a region of exactly `len` bytes
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(WindowError::ResourceExhaustion(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to create a zero-sized shared memory region",
            )));
        }

        let file = create_anonymous_file(SHM_FILE_NAME).map_err(WindowError::ResourceExhaustion)?;
        file.set_len(len as u64)
            .map_err(WindowError::ResourceExhaustion)?;

        // SAFETY: the file is private to this process until its fd is handed
        // to the compositor, which only reads from it.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .map_err(WindowError::ResourceExhaustion)?;

        seal(&file).map_err(WindowError::ResourceExhaustion)?;
        debug!("🧱 shm region created: {} bytes", len);

        Ok(Self { file, map, len })
    }

    /// Mapped size in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grow to `new_len` bytes; a no-op when already large enough
    pub fn grow(&mut self, new_len: usize) -> Result<bool> {
        if new_len <= self.len {
            return Ok(false);
        }
        self.file
            .set_len(new_len as u64)
            .map_err(WindowError::ResourceExhaustion)?;
        self.remap(new_len).map_err(WindowError::ResourceExhaustion)?;
        trace!("shm region grown {} -> {} bytes", self.len, new_len);
        self.len = new_len;
        Ok(true)
    }

    #[cfg(target_os = "linux")]
    fn remap(&mut self, new_len: usize) -> io::Result<()> {
        use memmap2::RemapOptions;
        // SAFETY: the file was just extended to `new_len`, and no slice into
        // the old mapping outlives this `&mut self` borrow.
        unsafe { self.map.remap(new_len, RemapOptions::new().may_move(true)) }
    }

    #[cfg(not(target_os = "linux"))]
    fn remap(&mut self, new_len: usize) -> io::Result<()> {
        // Pixels live in the file, so a fresh mapping sees the old contents.
        // SAFETY: same invariants as `new`.
        self.map = unsafe { MmapOptions::new().len(new_len).map_mut(&self.file)? };
        Ok(())
    }

    /// The whole mapping
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map[..]
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map[..]
    }

    /// Seals currently applied to the backing file
    #[cfg(target_os = "linux")]
    pub fn seals(&self) -> io::Result<i32> {
        use std::os::fd::AsRawFd;
        // SAFETY: F_GET_SEALS only reads fd state.
        let seals = unsafe { libc::fcntl(self.file.as_raw_fd(), libc::F_GET_SEALS) };
        if seals < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(seals)
    }
}

impl AsFd for ShmRegion {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl std::fmt::Debug for ShmRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmRegion").field("len", &self.len).finish()
    }
}

#[cfg(all(target_os = "linux", test))]
fn exec_seal_supported() -> bool {
    use std::os::fd::AsRawFd;
    // MFD_NOEXEC_SEAL applies F_SEAL_EXEC at creation on kernels that know it
    match create_anonymous_file("hello-wayland-seal-check") {
        Ok(file) => {
            // SAFETY: F_GET_SEALS only reads fd state.
            let seals = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GET_SEALS) };
            seals >= 0 && seals & F_SEAL_EXEC != 0
        }
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
fn create_anonymous_file(name: &str) -> io::Result<File> {
    use std::ffi::CString;
    use std::os::fd::{FromRawFd, OwnedFd};

    let name = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let create = |flags: libc::c_uint| -> io::Result<libc::c_int> {
        // SAFETY: `name` is a valid NUL-terminated string for the duration of the call.
        let fd = unsafe { libc::memfd_create(name.as_ptr(), flags) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(fd)
    };

    let flags = libc::MFD_CLOEXEC | libc::MFD_ALLOW_SEALING;
    let fd = match create(flags | MFD_NOEXEC_SEAL) {
        Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
            trace!("memfd_create without MFD_NOEXEC_SEAL");
            create(flags)?
        }
        other => other?,
    };
    // SAFETY: memfd_create returned a fresh descriptor we now own.
    Ok(File::from(unsafe { OwnedFd::from_raw_fd(fd) }))
}

#[cfg(not(target_os = "linux"))]
fn create_anonymous_file(name: &str) -> io::Result<File> {
    use std::fs::OpenOptions;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let dir = std::env::var_os("XDG_RUNTIME_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    let path = dir.join(format!(
        "{}-{}-{}",
        name,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(&path)?;
    std::fs::remove_file(&path)?;
    Ok(file)
}

/// Forbid shrinking, permission changes and further seal changes; growth
/// stays possible
#[cfg(target_os = "linux")]
fn seal(file: &File) -> io::Result<()> {
    use std::os::fd::AsRawFd;
    let add_seals = |seals: libc::c_int| -> io::Result<()> {
        // SAFETY: plain fcntl on a descriptor we own.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_ADD_SEALS, seals) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    };

    let seals = libc::F_SEAL_SHRINK | libc::F_SEAL_SEAL;
    match add_seals(seals | F_SEAL_EXEC) {
        Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
            trace!("kernel has no F_SEAL_EXEC");
            add_seals(seals)
        }
        other => other,
    }
}

#[cfg(not(target_os = "linux"))]
fn seal(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests;
