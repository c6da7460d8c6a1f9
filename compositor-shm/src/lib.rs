//! Shared-memory buffers used to hand window contents from a client process
//! to the compositor without copying.
//!
//! Each buffer is backed by a POSIX shared-memory object (`shm_open(3)`),
//! sized to hold `width * height` 32-bit BGRA pixels, and mapped once with
//! `mmap(2)`.  The compositor and the client that owns the buffer map the
//! same object independently; this crate only manages the compositor side's
//! mapping and the lifetime of the backing object.
//!
//! This plays the role that Xen grant-table shared memory plays in a
//! multi-VM GUI stack: a zero-copy handoff of pixel data across a process
//! boundary. On a single machine a named POSIX shared-memory object is the
//! natural equivalent, and needs no privileged setup.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Bytes per pixel. Every buffer stores packed 32-bit BGRA.
pub const BYTES_PER_PIXEL: usize = 4;

/// Errors that can occur while allocating or mapping a shared buffer.
#[derive(Debug, Error)]
pub enum ShmError {
    /// The requested dimensions overflow `usize` or are otherwise absurd.
    #[error("buffer dimensions {width}x{height} are invalid")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// `shm_open` failed.
    #[error("shm_open failed: {0}")]
    Open(#[source] io::Error),
    /// `ftruncate` failed.
    #[error("ftruncate failed: {0}")]
    Truncate(#[source] io::Error),
    /// `mmap` failed.
    #[error("mmap failed: {0}")]
    Map(#[source] io::Error),
}

/// Opaque identifier for a buffer, unique for the lifetime of the process.
///
/// This is handed to clients over the wire (see `ResizeBufid`/`WindowInit`
/// in `compositor-proto`) so they can open the same shared-memory object by
/// name via [`Buffer::name_for_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufId(u64);

impl BufId {
    /// Returns the raw numeric id, suitable for the wire protocol's `bufid`
    /// fields.
    pub fn as_u32(self) -> u32 {
        self.0 as u32
    }

    /// Reconstructs a `BufId` from a raw id received over the wire, e.g. in
    /// a `WindowInit` or `ResizeBufid` message.
    pub fn from_raw(id: u32) -> BufId {
        BufId(id as u64)
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A shared-memory pixel buffer owned by the compositor.
///
/// Dropping a `Buffer` unmaps it and unlinks its backing object; any client
/// that still has it open keeps its own mapping valid until it unmaps too,
/// per the usual POSIX shared-memory semantics.
#[derive(Debug)]
pub struct Buffer {
    id: BufId,
    fd: RawFd,
    ptr: *mut u8,
    len: usize,
    width: u32,
    height: u32,
}

// SAFETY: the mapping is exclusively owned by this `Buffer`; no other part
// of this process holds `ptr`. Sending it across threads is fine as long as
// access is synchronized by the caller, exactly as for any other raw buffer.
unsafe impl Send for Buffer {}

impl Buffer {
    /// Allocates a new shared-memory buffer sized for `width * height` BGRA
    /// pixels, zero-filled.
    pub fn new(width: u32, height: u32) -> Result<Buffer, ShmError> {
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or(ShmError::InvalidDimensions { width, height })?;
        let len = pixels
            .checked_mul(BYTES_PER_PIXEL)
            .ok_or(ShmError::InvalidDimensions { width, height })?;
        if len == 0 {
            // A zero-area window is legal (see the design notes on
            // zero-sized windows); map a single page so later code never
            // has to special-case a null buffer.
            return Self::map(width, height, 1);
        }
        Self::map(width, height, len)
    }

    fn map(width: u32, height: u32, len: usize) -> Result<Buffer, ShmError> {
        let id = BufId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        let name = Self::name_for_id(id);
        let cname = CString::new(name).expect("generated shm name has no NUL bytes");

        let fd = unsafe {
            libc::shm_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            return Err(ShmError::Open(io::Error::last_os_error()));
        }

        if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(cname.as_ptr());
            }
            return Err(ShmError::Truncate(err));
        }

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(cname.as_ptr());
            }
            return Err(ShmError::Map(err));
        }

        log::debug!("allocated shm buffer {:?}: {}x{} ({} bytes)", id, width, height, len);
        Ok(Buffer {
            id,
            fd,
            ptr: ptr as *mut u8,
            len,
            width,
            height,
        })
    }

    /// The POSIX shared-memory object name for a given id, e.g.
    /// `/compositor-buf-3`. Clients derive this same name from the `bufid`
    /// they receive over the wire to open their own mapping.
    pub fn name_for_id(id: BufId) -> String {
        format!("/compositor-buf-{}", id.0)
    }

    /// This buffer's id, as handed to clients in wire messages.
    pub fn id(&self) -> BufId {
        self.id
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The mapped pixel data, as packed BGRA bytes.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// The mapped pixel data, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
            libc::close(self.fd);
            if let Ok(cname) = CString::new(Self::name_for_id(self.id)) {
                libc::shm_unlink(cname.as_ptr());
            }
        }
    }
}

/// A client's mapping of a buffer the compositor already owns.
///
/// Unlike [`Buffer`], a `ClientMapping` neither creates nor unlinks the
/// backing shared-memory object: the compositor created it as part of
/// `WINDOW_NEW`/`RESIZE_ACCEPT`, and will unlink it itself once the window
/// is destroyed or the resize commits. Dropping a `ClientMapping` only
/// unmaps the client's own view of it.
#[derive(Debug)]
pub struct ClientMapping {
    fd: RawFd,
    ptr: *mut u8,
    len: usize,
    width: u32,
    height: u32,
}

unsafe impl Send for ClientMapping {}

impl ClientMapping {
    /// Opens the buffer named by `id`, as previously allocated by the
    /// compositor and announced in a `WindowInit`/`ResizeBufid` message.
    pub fn open(id: BufId, width: u32, height: u32) -> Result<ClientMapping, ShmError> {
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or(ShmError::InvalidDimensions { width, height })?;
        let len = pixels.checked_mul(BYTES_PER_PIXEL).ok_or(ShmError::InvalidDimensions { width, height })?.max(1);

        let name = Buffer::name_for_id(id);
        let cname = CString::new(name).expect("generated shm name has no NUL bytes");
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o600) };
        if fd < 0 {
            return Err(ShmError::Open(io::Error::last_os_error()));
        }
        let ptr = unsafe {
            libc::mmap(ptr::null_mut(), len, libc::PROT_READ | libc::PROT_WRITE, libc::MAP_SHARED, fd, 0)
        };
        if ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(ShmError::Map(err));
        }
        Ok(ClientMapping { fd, ptr: ptr as *mut u8, len, width, height })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The mapped pixel data, as packed BGRA bytes.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// The mapped pixel data, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for ClientMapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
            libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_and_maps() {
        let mut buf = Buffer::new(4, 4).expect("alloc");
        assert_eq!(buf.width(), 4);
        assert_eq!(buf.height(), 4);
        assert_eq!(buf.as_slice().len(), 4 * 4 * BYTES_PER_PIXEL);
        buf.as_mut_slice()[0] = 0xAB;
        assert_eq!(buf.as_slice()[0], 0xAB);
    }

    #[test]
    fn zero_area_buffer_still_maps() {
        let buf = Buffer::new(0, 0).expect("alloc");
        assert!(!buf.as_slice().is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let a = Buffer::new(1, 1).expect("alloc");
        let b = Buffer::new(1, 1).expect("alloc");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn overflowing_dimensions_are_rejected() {
        let err = Buffer::new(u32::MAX, u32::MAX).unwrap_err();
        assert!(matches!(err, ShmError::InvalidDimensions { .. }));
    }

    #[test]
    fn client_mapping_sees_the_same_bytes() {
        let mut buf = Buffer::new(2, 2).expect("alloc");
        buf.as_mut_slice()[4] = 0x42;
        let mapping = ClientMapping::open(buf.id(), 2, 2).expect("open");
        assert_eq!(mapping.as_slice()[4], 0x42);
        assert_eq!(mapping.as_slice().len(), buf.as_slice().len());
    }
}
