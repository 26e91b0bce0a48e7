use core::marker::PhantomData;
use critical_section::RestoreState;

/// Masks interrupts until dropped, then puts the previous mask state back.
///
/// Must not be nested. Every early return out of the guarded block still
/// restores the mask through `Drop`.
pub(crate) struct Atomic {
    state: RestoreState,
    _not_send: PhantomData<*const ()>,
}

impl Atomic {
    #[inline(always)]
    pub(crate) fn enter() -> Self {
        // SAFETY: paired with exactly one `release` in `Drop`, and the guard
        // cannot leave the context that acquired it.
        let state = unsafe { critical_section::acquire() };
        Atomic {
            state,
            _not_send: PhantomData,
        }
    }
}

impl Drop for Atomic {
    #[inline(always)]
    fn drop(&mut self) {
        // SAFETY: `state` came from the matching `acquire` in `enter`.
        unsafe { critical_section::release(self.state) }
    }
}
