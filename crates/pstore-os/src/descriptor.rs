// Path: crates/pstore-os/src/descriptor.rs

//! A move-only owner of a platform handle (§4.A, §9 "Descriptor traits
//! templates → variant with RAII"). `DescriptorTraits` fixes the raw handle
//! type, its invalid sentinel, and how to close it; `Descriptor<T>` provides
//! move-only ownership and RAII close on drop. Two concrete instantiations
//! are exported: [`crate::socket::Socket`] and [`crate::event::EventHandle`].

use std::mem::ManuallyDrop;

/// Implemented by a zero-sized marker type per handle kind.
pub trait DescriptorTraits {
    type Raw: Copy + PartialEq + std::fmt::Debug;

    const INVALID: Self::Raw;

    fn is_valid(raw: Self::Raw) -> bool {
        raw != Self::INVALID
    }

    /// Closes `raw`. Called at most once per live `raw` value; never called
    /// on `Self::INVALID`.
    ///
    /// # Safety
    /// `raw` must be a handle this traits type owns and that has not already
    /// been closed.
    unsafe fn close(raw: Self::Raw);
}

/// Move-only RAII wrapper around a platform handle. Copy is intentionally
/// not implemented; [`Descriptor::release`] is the only way to part with the
/// handle without closing it.
pub struct Descriptor<T: DescriptorTraits> {
    raw: T::Raw,
}

impl<T: DescriptorTraits> Descriptor<T> {
    #[must_use]
    pub fn new(raw: T::Raw) -> Self {
        Descriptor { raw }
    }

    #[must_use]
    pub fn invalid() -> Self {
        Descriptor { raw: T::INVALID }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        T::is_valid(self.raw)
    }

    #[must_use]
    pub fn raw(&self) -> T::Raw {
        self.raw
    }

    /// Surrenders ownership without closing. The caller becomes responsible
    /// for the handle's lifetime.
    #[must_use]
    pub fn release(self) -> T::Raw {
        let this = ManuallyDrop::new(self);
        this.raw
    }
}

impl<T: DescriptorTraits> Drop for Descriptor<T> {
    fn drop(&mut self) {
        if T::is_valid(self.raw) {
            // SAFETY: `self.raw` is valid and owned exclusively by `self`
            // (the type is move-only), so this is the single close call for
            // this handle value.
            unsafe { T::close(self.raw) };
        }
    }
}

impl<T: DescriptorTraits> std::fmt::Debug for Descriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor").field("raw", &self.raw).finish()
    }
}
