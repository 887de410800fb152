//! Platform waitable handle (spec §6): the frame-latency signal shared
//! between the application, the wait thread, and (on Win32) handed out to
//! the caller via `GetFrameLatencyWaitableObject` as a `SYNCHRONIZE`-only
//! duplicate. Backed by a semaphore on Win32 and an `eventfd` on Linux,
//! mirroring `vkd3d_native_sync_handle` in the original runtime.

use crate::error::{ApiError, Result};

#[cfg(windows)]
mod imp {
    use super::*;
    use std::ptr;
    use winapi::shared::minwindef::FALSE;
    use winapi::um::handleapi::{CloseHandle, DuplicateHandle, INVALID_HANDLE_VALUE};
    use winapi::um::processthreadsapi::GetCurrentProcess;
    use winapi::um::synchapi::{CreateSemaphoreW, ReleaseSemaphore, WaitForSingleObject};
    use winapi::um::winbase::WAIT_OBJECT_0;
    use winapi::um::winnt::{HANDLE, SYNCHRONIZE};

    pub struct RawHandle(HANDLE);

    unsafe impl Send for RawHandle {}
    unsafe impl Sync for RawHandle {}

    impl RawHandle {
        pub fn new(initial_count: i32, max_count: i32) -> Result<Self> {
            let handle = unsafe {
                CreateSemaphoreW(ptr::null_mut(), initial_count, max_count, ptr::null())
            };
            if handle.is_null() || handle == INVALID_HANDLE_VALUE {
                return Err(ApiError::OutOfMemory);
            }
            Ok(RawHandle(handle))
        }

        pub fn is_valid(&self) -> bool {
            !self.0.is_null() && self.0 != INVALID_HANDLE_VALUE
        }

        /// Releases `count` units, returning the previous count.
        pub fn release(&self, count: i32) -> Result<i32> {
            let mut previous = 0i32;
            let ok = unsafe { ReleaseSemaphore(self.0, count, &mut previous) };
            if ok == 0 {
                return Err(ApiError::Unsupported("ReleaseSemaphore failed"));
            }
            Ok(previous)
        }

        pub fn wait(&self, timeout_ms: u32) -> Result<bool> {
            let result = unsafe { WaitForSingleObject(self.0, timeout_ms) };
            Ok(result == WAIT_OBJECT_0)
        }

        /// Duplicates the handle with `SYNCHRONIZE` access only, so the
        /// application can wait on it but never close or signal it itself.
        pub fn duplicate_wait_only(&self) -> Result<RawHandle> {
            let mut duplicated: HANDLE = ptr::null_mut();
            let process = unsafe { GetCurrentProcess() };
            let ok = unsafe {
                DuplicateHandle(
                    process,
                    self.0,
                    process,
                    &mut duplicated,
                    SYNCHRONIZE,
                    FALSE,
                    0,
                )
            };
            if ok == 0 {
                return Err(ApiError::Unsupported("DuplicateHandle failed"));
            }
            Ok(RawHandle(duplicated))
        }
    }

    impl Drop for RawHandle {
        fn drop(&mut self) {
            if self.is_valid() {
                unsafe {
                    CloseHandle(self.0);
                }
            }
        }
    }
}

#[cfg(unix)]
mod imp {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// `eventfd` doesn't expose a "previous value" on write the way a Win32
    /// semaphore does, so the count is tracked alongside the descriptor.
    pub struct RawHandle {
        fd: libc::c_int,
        count: AtomicI64,
        wait_lock: Mutex<()>,
    }

    unsafe impl Send for RawHandle {}
    unsafe impl Sync for RawHandle {}

    impl RawHandle {
        pub fn new(initial_count: i32, _max_count: i32) -> Result<Self> {
            let fd = unsafe { libc::eventfd(initial_count.max(0) as u32, libc::EFD_SEMAPHORE) };
            if fd < 0 {
                return Err(ApiError::OutOfMemory);
            }
            Ok(RawHandle {
                fd,
                count: AtomicI64::new(initial_count as i64),
                wait_lock: Mutex::new(()),
            })
        }

        pub fn is_valid(&self) -> bool {
            self.fd >= 0
        }

        pub fn release(&self, count: i32) -> Result<i32> {
            let previous = self.count.fetch_add(count as i64, Ordering::SeqCst);
            let value: u64 = count as u64;
            let written = unsafe {
                libc::write(
                    self.fd,
                    &value as *const u64 as *const libc::c_void,
                    std::mem::size_of::<u64>(),
                )
            };
            if written != std::mem::size_of::<u64>() as isize {
                return Err(ApiError::Unsupported("eventfd write failed"));
            }
            Ok(previous as i32)
        }

        pub fn wait(&self, timeout_ms: u32) -> Result<bool> {
            let _guard = self.wait_lock.lock().unwrap();
            let mut pollfd = libc::pollfd {
                fd: self.fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let timeout = if timeout_ms == u32::MAX { -1 } else { timeout_ms as libc::c_int };
            let rc = unsafe { libc::poll(&mut pollfd, 1, timeout) };
            if rc <= 0 {
                return Ok(false);
            }
            let mut value: u64 = 0;
            let read = unsafe {
                libc::read(
                    self.fd,
                    &mut value as *mut u64 as *mut libc::c_void,
                    std::mem::size_of::<u64>(),
                )
            };
            if read == std::mem::size_of::<u64>() as isize {
                self.count.fetch_sub(1, Ordering::SeqCst);
            }
            let _ = Duration::from_millis(timeout_ms as u64);
            Ok(read == std::mem::size_of::<u64>() as isize)
        }

        /// Linux has no distinct "wait-only" duplicate of an eventfd; `dup(2)`
        /// shares the same underlying counter, which is the closest analogue.
        pub fn duplicate_wait_only(&self) -> Result<RawHandle> {
            let dup_fd = unsafe { libc::dup(self.fd) };
            if dup_fd < 0 {
                return Err(ApiError::Unsupported("dup failed"));
            }
            Ok(RawHandle {
                fd: dup_fd,
                count: AtomicI64::new(self.count.load(Ordering::SeqCst)),
                wait_lock: Mutex::new(()),
            })
        }
    }

    impl Drop for RawHandle {
        fn drop(&mut self) {
            if self.is_valid() {
                unsafe {
                    libc::close(self.fd);
                }
            }
        }
    }
}

/// A native waitable handle used as a frame-latency signal. `None` means the
/// handle was never created (the application never requested one).
pub struct NativeSyncHandle(Option<imp::RawHandle>);

impl NativeSyncHandle {
    pub fn new(initial_count: i32, max_count: i32) -> Result<Self> {
        Ok(NativeSyncHandle(Some(imp::RawHandle::new(initial_count, max_count)?)))
    }

    pub fn invalid() -> Self {
        NativeSyncHandle(None)
    }

    pub fn is_valid(&self) -> bool {
        match &self.0 {
            Some(handle) => handle.is_valid(),
            None => false,
        }
    }

    /// Releases `count` units, returning the previous count. A no-op
    /// returning 0 on an invalid handle, mirroring the original's pattern of
    /// checking `vkd3d_native_sync_handle_is_valid` before every release.
    pub fn release(&self, count: i32) -> Result<i32> {
        match &self.0 {
            Some(handle) => handle.release(count),
            None => Ok(0),
        }
    }

    pub fn wait(&self, timeout_ms: u32) -> Result<bool> {
        match &self.0 {
            Some(handle) => handle.wait(timeout_ms),
            None => Ok(true),
        }
    }

    pub fn duplicate_wait_only(&self) -> Result<NativeSyncHandle> {
        match &self.0 {
            Some(handle) => Ok(NativeSyncHandle(Some(handle.duplicate_wait_only()?))),
            None => Ok(NativeSyncHandle(None)),
        }
    }
}
