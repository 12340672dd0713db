// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! POSIX named shared memory segments.
//!
//! Safe wrapper around `shm_open`, `ftruncate` and `mmap` with an atomic
//! create-or-open: the first caller system-wide creates and sizes the
//! segment, everyone else attaches to the existing pages.
//!
//! # Segment Lifecycle
//!
//! 1. `ShmSegment::create_or_open()` maps the segment (creating it if absent)
//! 2. The mapping is released on drop; the name is left in place
//! 3. `ShmSegment::unlink()` removes the name explicitly
//!
//! # Naming Convention
//!
//! Segment names must start with `/` and contain no other `/`.
//! Example: `/winsync_myapp_u1000_count`

use super::{Result, ShmError};
use std::ffi::CString;
use std::io;
use std::ptr;
use std::time::{Duration, Instant};

/// Number of create/open rounds before giving up when another process
/// keeps unlinking the name between our two `shm_open` calls.
#[cfg(unix)]
const OPEN_ATTEMPTS: usize = 3;

/// How this process came to hold the mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// This call created the segment; it is zero-filled
    Created,
    /// The segment already existed; its contents were preserved
    Attached,
}

/// Mapped named shared memory segment.
///
/// Unmaps the region on drop. Never unlinks the name: other processes may
/// still be attached to it.
pub struct ShmSegment {
    /// Pointer to mapped memory region
    ptr: *mut u8,
    /// Size of the mapping
    size: usize,
    /// Segment name
    name: String,
}

// SAFETY: ShmSegment points to shared memory that is accessed from several
// threads and processes; every structure placed in it is made of atomics.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Create the named segment, or attach to it if it already exists.
    ///
    /// The creator is decided by `O_CREAT | O_EXCL`: the errno of that call
    /// is read before anything else touches it. A newly created segment is
    /// zero-filled by `ftruncate`. An attacher waits up to `attach_timeout`
    /// for the creator to size the segment.
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid, the segment cannot be created,
    /// opened or mapped, or an existing segment has an incompatible size.
    #[cfg(unix)]
    pub fn create_or_open(
        name: &str,
        size: usize,
        attach_timeout: Duration,
    ) -> Result<(Self, Disposition)> {
        Self::validate_name(name)?;

        let c_name = CString::new(name).map_err(|_| ShmError::InvalidName(name.to_string()))?;

        for _ in 0..OPEN_ATTEMPTS {
            // SAFETY:
            // - c_name is a valid null-terminated CString created above
            // - O_CREAT|O_EXCL|O_RDWR either creates a new object or fails with EEXIST
            // - The mode 0o600 is a valid file permission mask
            let fd = unsafe {
                libc::shm_open(
                    c_name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                    0o600, // Owner read/write only
                )
            };
            // Must be captured before any other libc call overwrites errno.
            let create_err = io::Error::last_os_error();

            if fd >= 0 {
                return Self::finish_create(fd, &c_name, name, size)
                    .map(|seg| (seg, Disposition::Created));
            }

            if create_err.raw_os_error() != Some(libc::EEXIST) {
                return Err(ShmError::SegmentCreate(create_err));
            }

            // SAFETY:
            // - c_name is a valid null-terminated CString
            // - O_RDWR opens the existing object; mode is ignored without O_CREAT
            let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
            if fd < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::NotFound {
                    // Unlinked between our two calls; race for creation again.
                    log::debug!("[SHM] {} vanished during attach, retrying", name);
                    continue;
                }
                return Err(ShmError::SegmentOpen(err));
            }

            let attached = Self::wait_for_size(fd, name, size, attach_timeout)
                .and_then(|()| Self::map(fd, size));

            // SAFETY:
            // - fd is valid from the successful shm_open above
            // - A successful mmap keeps its own reference; the fd is not used afterwards
            unsafe { libc::close(fd) };

            let ptr = attached?;
            log::debug!("[SHM] attached {} ({} bytes)", name, size);
            return Ok((
                Self {
                    ptr,
                    size,
                    name: name.to_string(),
                },
                Disposition::Attached,
            ));
        }

        Err(ShmError::SegmentOpen(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{name} kept disappearing while attaching"),
        )))
    }

    #[cfg(not(unix))]
    pub fn create_or_open(
        name: &str,
        _size: usize,
        _attach_timeout: Duration,
    ) -> Result<(Self, Disposition)> {
        Self::validate_name(name)?;
        Err(ShmError::Unsupported)
    }

    /// Size and map a segment this process just created.
    ///
    /// On failure the half-made name is unlinked so the next caller can
    /// race for creation again.
    #[cfg(unix)]
    fn finish_create(fd: libc::c_int, c_name: &CString, name: &str, size: usize) -> Result<Self> {
        // SAFETY:
        // - fd is a valid descriptor from the successful shm_open call
        // - ftruncate zero-fills the new object up to `size` bytes
        let ret = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        let mapped = if ret < 0 {
            Err(ShmError::SegmentCreate(io::Error::last_os_error()))
        } else {
            Self::map(fd, size)
        };

        // SAFETY: fd is valid and not used after this point.
        unsafe { libc::close(fd) };

        match mapped {
            Ok(ptr) => {
                log::debug!("[SHM] created {} ({} bytes)", name, size);
                Ok(Self {
                    ptr,
                    size,
                    name: name.to_string(),
                })
            }
            Err(e) => {
                // SAFETY: c_name is a valid CString; unlinking our own object.
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                Err(e)
            }
        }
    }

    /// Block until the creator has sized the segment.
    #[cfg(unix)]
    fn wait_for_size(
        fd: libc::c_int,
        name: &str,
        size: usize,
        attach_timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + attach_timeout;

        loop {
            // SAFETY:
            // - stat is plain old data; zeroed is a valid initial value
            // - fd is valid for the duration of this call
            let mut stat: libc::stat = unsafe { std::mem::zeroed() };
            let ret = unsafe { libc::fstat(fd, &mut stat) };
            if ret < 0 {
                return Err(ShmError::SegmentOpen(io::Error::last_os_error()));
            }

            let actual = stat.st_size as usize;
            if Self::size_compatible(actual, size) {
                return Ok(());
            }
            if actual != 0 {
                return Err(ShmError::SizeMismatch {
                    name: name.to_string(),
                    expected: size,
                    actual,
                });
            }
            if Instant::now() >= deadline {
                return Err(ShmError::NotReady(name.to_string()));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Some kernels report the object size rounded up to a page.
    #[cfg(unix)]
    fn size_compatible(actual: usize, expected: usize) -> bool {
        if actual == expected {
            return true;
        }
        // SAFETY: sysconf has no preconditions.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let page = if page > 0 { page as usize } else { 4096 };
        let rounded = expected.div_ceil(page) * page;
        actual == rounded
    }

    #[cfg(unix)]
    fn map(fd: libc::c_int, size: usize) -> Result<*mut u8> {
        // SAFETY:
        // - Null hint lets the kernel choose the address
        // - PROT_READ | PROT_WRITE with MAP_SHARED makes writes visible to other processes
        // - fd is valid and the object is at least `size` bytes (checked by callers)
        // - mmap returns MAP_FAILED on error, checked below
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(ShmError::Mmap(io::Error::last_os_error()));
        }
        Ok(ptr.cast::<u8>())
    }

    /// Validate segment name follows POSIX rules
    fn validate_name(name: &str) -> Result<()> {
        if !name.starts_with('/') {
            return Err(ShmError::InvalidName(format!(
                "Segment name must start with '/': {name}"
            )));
        }
        if name.len() < 2 {
            return Err(ShmError::InvalidName(format!(
                "Segment name is empty after prefix: {name}"
            )));
        }
        if name[1..].contains('/') {
            return Err(ShmError::InvalidName(format!(
                "Segment name cannot contain '/' after prefix: {name}"
            )));
        }
        if name.len() > 255 {
            return Err(ShmError::InvalidName(format!(
                "Segment name too long (max 255): {name}"
            )));
        }
        Ok(())
    }

    /// Unlink (delete) a named segment.
    ///
    /// The pages stay alive until every process unmaps them. Unlinking a
    /// name that does not exist is not an error.
    pub fn unlink(name: &str) -> Result<()> {
        #[cfg(unix)]
        {
            let c_name =
                CString::new(name).map_err(|_| ShmError::InvalidName(name.to_string()))?;

            // SAFETY: c_name is a valid null-terminated CString; only the
            // filesystem namespace is affected.
            let ret = unsafe { libc::shm_unlink(c_name.as_ptr()) };

            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::NotFound {
                    return Err(ShmError::SegmentOpen(err));
                }
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            let _ = name;
            Err(ShmError::Unsupported)
        }
    }

    /// Check if a segment with the given name exists
    #[must_use]
    pub fn exists(name: &str) -> bool {
        #[cfg(unix)]
        {
            let Ok(c_name) = CString::new(name) else {
                return false;
            };

            // SAFETY: c_name is a valid CString; O_RDONLY without O_CREAT.
            let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
            if fd >= 0 {
                // SAFETY: fd is valid and not used afterwards.
                unsafe { libc::close(fd) };
                true
            } else {
                false
            }
        }
        #[cfg(not(unix))]
        {
            let _ = name;
            false
        }
    }

    /// Get raw pointer to the mapped memory
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Get the size of the mapping
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the segment name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            // SAFETY:
            // - self.ptr/self.size come from a successful mmap in create_or_open()
            // - Drop runs once, so the region has not been unmapped yet
            unsafe {
                libc::munmap(self.ptr.cast::<libc::c_void>(), self.size);
            }
        }
    }
}
