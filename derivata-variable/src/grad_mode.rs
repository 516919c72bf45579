//! Thread-local switch controlling whether operations record graph nodes.

use std::cell::Cell;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = Cell::new(true);
}

/// Returns `true` when operations executed on this thread record their history.
pub fn is_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Restores the previous gradient mode of the thread when dropped.
#[must_use = "the previous gradient mode is restored as soon as the guard is dropped"]
pub struct GradModeGuard {
    previous: bool,
}

impl Drop for GradModeGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|flag| flag.set(self.previous));
    }
}

/// Sets the gradient mode of the current thread until the returned guard is dropped.
///
/// # Arguments
///
/// * `enabled` - whether operations should record their history.
pub fn set_grad_enabled(enabled: bool) -> GradModeGuard {
    let previous = GRAD_ENABLED.with(|flag| flag.replace(enabled));

    GradModeGuard { previous }
}

/// Runs `f` with graph recording disabled on the current thread.
pub fn no_grad<F, T>(f: F) -> T
where
    F: FnOnce() -> T,
{
    let _guard = set_grad_enabled(false);
    f()
}

/// Runs `f` with graph recording enabled on the current thread.
pub fn enable_grad<F, T>(f: F) -> T
where
    F: FnOnce() -> T,
{
    let _guard = set_grad_enabled(true);
    f()
}
