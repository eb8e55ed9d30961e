//! Custom operator registries.

use std::fmt;
use std::ptr;
use std::sync::Arc;

use crate::error::OrtResult;
use crate::ffi::OperatorRegistry;
use crate::handle::OwnedHandle;
use crate::runtime::Runtime;

/// Registry of custom operators, handed to an engine before initialisation.
pub struct CustomRegistry {
    handle: OwnedHandle<OperatorRegistry>,
}

impl CustomRegistry {
    pub fn new(runtime: &Arc<Runtime>) -> OrtResult<Self> {
        let adapter = runtime.adapter();
        let mut registry: *mut OperatorRegistry = ptr::null_mut();
        let status = unsafe { (adapter.create_custom_registry)(&mut registry) };
        runtime.check(status, "create_custom_registry")?;
        let handle = unsafe {
            OwnedHandle::from_raw(
                runtime,
                registry,
                adapter.release_custom_registry,
                "create_custom_registry",
            )?
        };
        Ok(Self { handle })
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut OperatorRegistry {
        self.handle.as_ptr()
    }
}

impl fmt::Debug for CustomRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRegistry")
            .field("handle", &self.handle)
            .finish()
    }
}
