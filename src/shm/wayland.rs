//! `wl_shm` / `wl_shm_pool` / `wl_buffer` / `wl_surface` bindings for the pool traits

use std::os::fd::BorrowedFd;
use wayland_client::{
    protocol::{
        wl_buffer::WlBuffer,
        wl_shm::{self, WlShm},
        wl_shm_pool::WlShmPool,
        wl_surface::WlSurface,
    },
    Dispatch, QueueHandle,
};

use super::pool::{BufferProxy, CommitTarget, PoolProxy, ShmAllocator};
use crate::handler::Size;

/// Pool lengths travel as `int`; the buffer pool never asks for more
fn wire_len(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

/// Bound `wl_shm` global plus the queue new pools and buffers are created on
pub struct WaylandShm<D> {
    shm: WlShm,
    qh: QueueHandle<D>,
}

impl<D> WaylandShm<D> {
    pub fn new(shm: WlShm, qh: QueueHandle<D>) -> Self {
        Self { shm, qh }
    }

    pub fn shm(&self) -> &WlShm {
        &self.shm
    }
}

impl<D> ShmAllocator for WaylandShm<D>
where
    D: Dispatch<WlShmPool, ()> + Dispatch<WlBuffer, ()> + 'static,
{
    type Pool = WaylandPool<D>;

    fn create_pool(&self, fd: BorrowedFd<'_>, len: usize) -> WaylandPool<D> {
        WaylandPool {
            pool: self.shm.create_pool(fd, wire_len(len), &self.qh, ()),
            qh: self.qh.clone(),
        }
    }
}

/// A `wl_shm_pool` over one framebuffer's memory file
pub struct WaylandPool<D> {
    pool: WlShmPool,
    qh: QueueHandle<D>,
}

impl<D> PoolProxy for WaylandPool<D>
where
    D: Dispatch<WlShmPool, ()> + Dispatch<WlBuffer, ()> + 'static,
{
    type Buffer = WlBuffer;

    fn create_buffer(&self, size: Size) -> WlBuffer {
        self.pool.create_buffer(
            0,
            size.width,
            size.height,
            size.stride(),
            wl_shm::Format::Xrgb8888,
            &self.qh,
            (),
        )
    }

    fn resize(&self, len: usize) {
        self.pool.resize(wire_len(len));
    }

    fn destroy_pool(&self) {
        self.pool.destroy();
    }
}

impl BufferProxy for WlBuffer {
    fn destroy_proxy(&self) {
        self.destroy();
    }
}

impl CommitTarget<WlBuffer> for WlSurface {
    fn present(&self, buffer: &WlBuffer, damage: Size) {
        self.attach(Some(buffer), 0, 0);
        self.damage_buffer(0, 0, damage.width, damage.height);
        self.commit();
    }
}
