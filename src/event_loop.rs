//! Read/dispatch/flush driver
//!
//! One call to [`pump`] is one loop iteration:
//!
//! 1. dispatch everything already queued,
//! 2. register the intent to read (re-dispatching until nothing is queued),
//! 3. flush outgoing requests, waiting for writability on would-block,
//! 4. block until the socket is readable, read, dispatch the new batch,
//! 5. check the connection for a protocol error.
//!
//! The driver only speaks to the connection through [`Transport`].

use log::{debug, trace};
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use wayland_backend::client::{ReadEventsGuard, WaylandError};
use wayland_client::{Connection, EventQueue};

use crate::error::{Result, WindowError};

/// Outcome of one flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    Flushed,
    /// The socket buffer is full; retry once writable
    WouldBlock,
}

/// The only I/O surface the driver uses
pub trait Transport {
    /// Dispatch queued events; returns how many were handled
    fn dispatch_pending(&mut self) -> Result<usize>;

    /// Register the intent to read; `false` while events are still queued
    fn prepare_read(&mut self) -> bool;

    fn flush(&mut self) -> Result<FlushStatus>;

    /// Block until outgoing data can be written
    fn wait_writable(&mut self) -> Result<()>;

    /// Block until incoming data is available; no timeout
    fn wait_readable(&mut self) -> Result<()>;

    /// Read what is available, consuming the prepared read
    fn read_events(&mut self) -> Result<()>;

    /// Abandon a prepared read
    fn cancel_read(&mut self);

    /// Fatal error recorded on the connection, if any
    fn check_error(&self) -> Result<()>;
}

/// Run one loop iteration; returns the number of events dispatched
///
/// Step 2 always terminates: each failed `prepare_read` is followed by a
/// dispatch that empties the queue it complained about.
pub fn pump<T: Transport>(transport: &mut T) -> Result<usize> {
    let mut dispatched = transport.dispatch_pending()?;
    while !transport.prepare_read() {
        dispatched += transport.dispatch_pending()?;
    }

    if let Err(e) = flush_and_wait(transport) {
        transport.cancel_read();
        return Err(e);
    }

    transport.read_events()?;
    dispatched += transport.dispatch_pending()?;
    transport.check_error()?;

    trace!("pump dispatched {} events", dispatched);
    Ok(dispatched)
}

fn flush_and_wait<T: Transport>(transport: &mut T) -> Result<()> {
    while transport.flush()? == FlushStatus::WouldBlock {
        debug!("flush would block, waiting for the socket");
        transport.wait_writable()?;
    }
    transport.wait_readable()
}

/// [`Transport`] over a `wayland-client` connection and its event queue
pub struct WaylandTransport<'a, S: 'static> {
    conn: &'a Connection,
    queue: &'a mut EventQueue<S>,
    state: &'a mut S,
    guard: Option<ReadEventsGuard>,
}

impl<'a, S: 'static> WaylandTransport<'a, S> {
    pub fn new(conn: &'a Connection, queue: &'a mut EventQueue<S>, state: &'a mut S) -> Self {
        Self {
            conn,
            queue,
            state,
            guard: None,
        }
    }
}

impl<'a, S: 'static> Transport for WaylandTransport<'a, S> {
    fn dispatch_pending(&mut self) -> Result<usize> {
        Ok(self.queue.dispatch_pending(self.state)?)
    }

    fn prepare_read(&mut self) -> bool {
        if self.guard.is_none() {
            self.guard = self.queue.prepare_read();
        }
        self.guard.is_some()
    }

    fn flush(&mut self) -> Result<FlushStatus> {
        match self.conn.flush() {
            Ok(()) => Ok(FlushStatus::Flushed),
            Err(WaylandError::Io(e))
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(FlushStatus::WouldBlock)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn wait_writable(&mut self) -> Result<()> {
        let backend = self.conn.backend();
        poll_fd(backend.poll_fd(), libc::POLLOUT)
    }

    fn wait_readable(&mut self) -> Result<()> {
        match &self.guard {
            Some(guard) => poll_fd(guard.connection_fd(), libc::POLLIN),
            None => Err(WindowError::Protocol(
                "waiting for events without a prepared read".into(),
            )),
        }
    }

    fn read_events(&mut self) -> Result<()> {
        match self.guard.take() {
            Some(guard) => match guard.read() {
                Ok(_) => Ok(()),
                Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
                Err(e) => Err(e.into()),
            },
            None => Ok(()),
        }
    }

    fn cancel_read(&mut self) {
        // Dropping the guard cancels the read
        self.guard = None;
    }

    fn check_error(&self) -> Result<()> {
        match self.conn.protocol_error() {
            Some(err) => Err(WindowError::Protocol(err.to_string())),
            None => Ok(()),
        }
    }
}

/// Block on `fd` until `events` is signalled, retrying on EINTR
fn poll_fd(fd: BorrowedFd<'_>, events: libc::c_short) -> Result<()> {
    let mut pollfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events,
        revents: 0,
    };
    loop {
        // SAFETY: one valid pollfd, borrowed for the duration of the call
        let ready = unsafe { libc::poll(&mut pollfd, 1, -1) };
        if ready >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(WindowError::Io(err));
        }
    }
}
