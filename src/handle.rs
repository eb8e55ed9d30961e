//! RAII ownership of native handles.
//!
//! Every handle the runtime hands out is wrapped in an [`OwnedHandle`] that
//! stays non-null while alive and calls the runtime's release function
//! exactly once on drop. The handle also keeps the [`Runtime`] alive, so the
//! release function pointer stays valid until it has run.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::error::{OrtError, OrtResult};
use crate::runtime::Runtime;

/// Release function registered by the wrapped library.
pub type ReleaseFn<T> = unsafe extern "C" fn(*mut T);

/// Exclusively owned native handle.
pub struct OwnedHandle<T> {
    ptr: NonNull<T>,
    release: ReleaseFn<T>,
    runtime: Arc<Runtime>,
}

impl<T> OwnedHandle<T> {
    /// Take ownership of `ptr`.
    ///
    /// # Errors
    /// Returns `NullHandle` when `ptr` is null; nothing is released then.
    ///
    /// # Safety
    /// `ptr` must be owned by the caller and `release` must be the function
    /// the runtime expects for it.
    pub unsafe fn from_raw(
        runtime: &Arc<Runtime>,
        ptr: *mut T,
        release: ReleaseFn<T>,
        operation: &'static str,
    ) -> OrtResult<Self> {
        let ptr = NonNull::new(ptr).ok_or(OrtError::NullHandle(operation))?;
        Ok(Self {
            ptr,
            release,
            runtime: Arc::clone(runtime),
        })
    }

    /// Borrow the raw pointer. The handle keeps ownership.
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Runtime this handle belongs to.
    #[inline]
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Give up ownership without releasing.
    ///
    /// The caller becomes responsible for the handle (usually because the
    /// runtime took it over).
    pub fn into_raw(self) -> *mut T {
        let this = ManuallyDrop::new(self);
        // The runtime Arc is not needed once ownership has moved on.
        // SAFETY: `this` is never dropped, so the field is read exactly once.
        drop(unsafe { ptr::read(&this.runtime) });
        this.ptr.as_ptr()
    }
}

impl<T> Drop for OwnedHandle<T> {
    fn drop(&mut self) {
        // SAFETY: the pointer is non-null, owned, and released only here.
        unsafe { (self.release)(self.ptr.as_ptr()) }
    }
}

impl<T> fmt::Debug for OwnedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnedHandle<{}>({:p})", std::any::type_name::<T>(), self.ptr)
    }
}

// Safety: a handle is a plain pointer into the runtime's heap with no
// thread affinity. Synchronisation of the calls made through it belongs to
// the wrapped runtime.
unsafe impl<T> Send for OwnedHandle<T> {}
unsafe impl<T> Sync for OwnedHandle<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::OrtValue;
    use std::cell::Cell;

    thread_local! {
        static RELEASED: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C" fn count_release(_ptr: *mut OrtValue) {
        RELEASED.with(|c| c.set(c.get() + 1));
    }

    fn dangling() -> *mut OrtValue {
        NonNull::<OrtValue>::dangling().as_ptr()
    }

    #[test]
    fn test_null_handle_is_rejected() {
        let runtime = crate::testing::fake_runtime();
        let result = unsafe {
            OwnedHandle::<OrtValue>::from_raw(&runtime, ptr::null_mut(), count_release, "op")
        };
        assert!(matches!(result, Err(OrtError::NullHandle("op"))));
        assert_eq!(RELEASED.with(Cell::get), 0);
    }

    #[test]
    fn test_drop_releases_once() {
        let runtime = crate::testing::fake_runtime();
        let handle =
            unsafe { OwnedHandle::from_raw(&runtime, dangling(), count_release, "op") }.unwrap();
        assert_eq!(handle.as_ptr(), dangling());
        drop(handle);
        assert_eq!(RELEASED.with(Cell::get), 1);
    }

    #[test]
    fn test_into_raw_skips_release() {
        let runtime = crate::testing::fake_runtime();
        let before = Arc::strong_count(&runtime);
        let handle =
            unsafe { OwnedHandle::from_raw(&runtime, dangling(), count_release, "op") }.unwrap();
        assert_eq!(Arc::strong_count(&runtime), before + 1);

        let raw = handle.into_raw();
        assert_eq!(raw, dangling());
        assert_eq!(RELEASED.with(Cell::get), 0);
        assert_eq!(Arc::strong_count(&runtime), before);
    }
}
