use core::cell::UnsafeCell;

/// Minimal wrapper to store non-`Sync` types in statics.
///
/// Safety: Callers must guarantee exclusive access when mutating.
pub struct Global<T> {
    inner: UnsafeCell<T>,
}

impl<T> Global<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: UnsafeCell::new(value),
        }
    }

    /// # Safety
    /// Callers must ensure exclusive access or otherwise serialize mutations.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut T {
        unsafe { &mut *self.inner.get() }
    }

    /// Takes the value out, leaving the default behind.
    ///
    /// # Safety
    /// As for [`Global::get_mut`].
    pub unsafe fn take(&self) -> T
    where
        T: Default,
    {
        core::mem::take(unsafe { self.get_mut() })
    }
}

unsafe impl<T> Sync for Global<T> {}

#[cfg(test)]
mod tests {
    use super::Global;

    static SLOT: Global<Option<u32>> = Global::new(None);

    #[test]
    fn take_leaves_the_default_behind() {
        // SAFETY: this test is the only user of `SLOT`.
        unsafe {
            *SLOT.get_mut() = Some(7);
            assert_eq!(SLOT.take(), Some(7));
            assert_eq!(SLOT.take(), None);
        }
    }
}
