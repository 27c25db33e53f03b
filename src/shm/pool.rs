//! N-buffered framebuffer pool with asynchronous release tracking
//!
//! Ownership of a [`SharedBuffer`] moves in one direction at each step:
//!
//! ```text
//!   acquire()          submit()              on_released()
//! pool ──────► caller ─────────► in-flight ──────────────► usable ──┐
//!   ▲                                                               │
//!   └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! A buffer only becomes usable again when the compositor releases the exact
//! `wl_buffer` it was committed with.

use log::{debug, trace};
use std::fmt;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};

use super::ShmRegion;
use crate::error::{Result, WindowError};
use crate::handler::Size;

/// A server-side buffer object (`wl_buffer`)
pub trait BufferProxy {
    /// Release the server-side resource
    fn destroy_proxy(&self);
}

/// A server-side pool object (`wl_shm_pool`) over one shared-memory file
pub trait PoolProxy {
    type Buffer: BufferProxy + PartialEq + fmt::Debug;

    /// Create an XRGB8888 buffer at offset 0 spanning `size`
    fn create_buffer(&self, size: Size) -> Self::Buffer;

    /// Tell the server the backing file is now `len` bytes
    fn resize(&self, len: usize);

    fn destroy_pool(&self);
}

/// Creates server-side pools from a shared-memory file descriptor (`wl_shm`)
pub trait ShmAllocator {
    type Pool: PoolProxy;

    fn create_pool(&self, fd: BorrowedFd<'_>, len: usize) -> Self::Pool;
}

/// Where a finished frame is presented (`wl_surface`)
pub trait CommitTarget<B> {
    /// Attach `buffer`, damage `damage` in buffer coordinates, commit
    fn present(&self, buffer: &B, damage: Size);
}

/// Counters describing pool behaviour since creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers allocated because nothing was usable
    pub created: usize,
    /// Acquisitions served from the usable set
    pub reused: usize,
    /// Backing region growths
    pub growths: usize,
    /// `wl_buffer` recreations after a size change
    pub recreations: usize,
    /// Frames submitted
    pub submitted: usize,
    /// Release notifications that matched an in-flight buffer
    pub releases: usize,
    /// Release notifications for buffers we no longer track
    pub stale_releases: usize,
}

/// One framebuffer: a shared-memory region, its server pool and buffer
pub struct SharedBuffer<P: PoolProxy> {
    id: u64,
    region: ShmRegion,
    pool: P,
    buffer: P::Buffer,
    extent: Size,
}

impl<P: PoolProxy> SharedBuffer<P> {
    /// Pool-local identity, stable for the buffer's lifetime
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Dimensions the current server-side buffer was created with
    pub fn extent(&self) -> Size {
        self.extent
    }

    /// Size of the mapped region in bytes
    pub fn region_len(&self) -> usize {
        self.region.len()
    }

    pub fn proxy(&self) -> &P::Buffer {
        &self.buffer
    }

    pub fn pixels(&self) -> &[u8] {
        let len = self.extent.byte_len();
        &self.region.bytes()[..len]
    }
}

impl<P: PoolProxy> Drop for SharedBuffer<P> {
    fn drop(&mut self) {
        trace!("destroying framebuffer #{}", self.id);
        self.buffer.destroy_proxy();
        self.pool.destroy_pool();
    }
}

impl<P: PoolProxy> fmt::Debug for SharedBuffer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("id", &self.id)
            .field("extent", &self.extent)
            .field("region_len", &self.region.len())
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// Bytes needed for `size`, rejecting empty sizes and any that `wl_shm`
/// cannot describe
fn framebuffer_len(size: Size, action: &str) -> Result<usize> {
    match size.checked_byte_len() {
        Some(len) if len > 0 => Ok(len),
        _ => Err(WindowError::ResourceExhaustion(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot {} a framebuffer of size {}", action, size),
        ))),
    }
}

/// Hands out drawable buffers and tracks which ones the compositor holds
pub struct BufferPool<A: ShmAllocator> {
    allocator: A,
    usable: Vec<SharedBuffer<A::Pool>>,
    in_flight: Vec<SharedBuffer<A::Pool>>,
    next_id: u64,
    stats: PoolStats,
}

impl<A: ShmAllocator> BufferPool<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            usable: Vec::new(),
            in_flight: Vec::new(),
            next_id: 0,
            stats: PoolStats::default(),
        }
    }

    /// Take a usable buffer, or allocate one sized for `size`
    pub fn acquire(&mut self, size: Size) -> Result<SharedBuffer<A::Pool>> {
        if let Some(buffer) = self.usable.pop() {
            self.stats.reused += 1;
            trace!("reusing framebuffer #{}", buffer.id);
            return Ok(buffer);
        }

        let len = framebuffer_len(size, "allocate")?;
        let region = ShmRegion::new(len)?;
        let pool = self.allocator.create_pool(region.as_fd(), region.len());
        let buffer = pool.create_buffer(size);
        let id = self.next_id;
        self.next_id += 1;
        self.stats.created += 1;
        debug!("🖼️ framebuffer #{} created at {}", id, size);

        Ok(SharedBuffer {
            id,
            region,
            pool,
            buffer,
            extent: size,
        })
    }

    /// Make `buffer` match `size`, then let `writer` fill its pixels
    ///
    /// The region grows when too small; the server-side buffer is recreated
    /// whenever its dimensions differ, because width, height and stride are
    /// fixed when a `wl_buffer` is created.
    pub fn draw<F>(
        &mut self,
        buffer: &mut SharedBuffer<A::Pool>,
        size: Size,
        writer: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut [u8], Size),
    {
        let required = framebuffer_len(size, "draw")?;

        if buffer.region.grow(required)? {
            buffer.pool.resize(buffer.region.len());
            self.stats.growths += 1;
            debug!(
                "📈 framebuffer #{} grown to {} bytes for {}",
                buffer.id,
                buffer.region.len(),
                size
            );
        }

        if size != buffer.extent {
            let fresh = buffer.pool.create_buffer(size);
            let stale = std::mem::replace(&mut buffer.buffer, fresh);
            stale.destroy_proxy();
            buffer.extent = size;
            self.stats.recreations += 1;
            debug!("♻️ framebuffer #{} recreated at {}", buffer.id, size);
        }

        writer(&mut buffer.region.bytes_mut()[..required], size);
        Ok(())
    }

    /// Present `buffer` on `target` with full damage; the pool now holds it
    /// until the compositor releases it
    pub fn submit<T>(&mut self, buffer: SharedBuffer<A::Pool>, target: &T)
    where
        T: CommitTarget<<A::Pool as PoolProxy>::Buffer>,
    {
        target.present(&buffer.buffer, buffer.extent);
        self.stats.submitted += 1;
        trace!("framebuffer #{} in flight", buffer.id);
        self.in_flight.push(buffer);
    }

    /// The compositor is done reading `proxy`; returns whether it was ours
    pub fn on_released(&mut self, proxy: &<A::Pool as PoolProxy>::Buffer) -> bool {
        match self.in_flight.iter().position(|b| &b.buffer == proxy) {
            Some(index) => {
                let buffer = self.in_flight.swap_remove(index);
                trace!("framebuffer #{} released", buffer.id);
                self.usable.push(buffer);
                self.stats.releases += 1;
                true
            }
            None => {
                debug!("release for untracked buffer {:?} ignored", proxy);
                self.stats.stale_releases += 1;
                false
            }
        }
    }

    pub fn usable_len(&self) -> usize {
        self.usable.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Ids of buffers ready to draw into
    pub fn usable_ids(&self) -> Vec<u64> {
        self.usable.iter().map(|b| b.id).collect()
    }

    /// Ids of buffers the compositor still holds
    pub fn in_flight_ids(&self) -> Vec<u64> {
        self.in_flight.iter().map(|b| b.id).collect()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Destroy every tracked buffer, in flight or not
    pub fn clear(&mut self) {
        if !self.usable.is_empty() || !self.in_flight.is_empty() {
            debug!(
                "🧹 dropping {} usable and {} in-flight framebuffers ({:?})",
                self.usable.len(),
                self.in_flight.len(),
                self.stats
            );
        }
        self.usable.clear();
        self.in_flight.clear();
    }
}

impl<A: ShmAllocator> Drop for BufferPool<A> {
    fn drop(&mut self) {
        self.clear();
    }
}
