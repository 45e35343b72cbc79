use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Running,
}

/// Refresh-in-progress flag for one scope (an account, or the whole app).
///
/// A second refresh requested while one runs is refused, not queued.
#[derive(Debug, Default)]
pub struct RefreshGuard {
    running: AtomicBool,
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RefreshState {
        if self.running.load(Ordering::Acquire) {
            RefreshState::Running
        } else {
            RefreshState::Idle
        }
    }

    pub fn try_begin(&self) -> Option<RefreshTicket<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshTicket { guard: self })
    }
}

/// Held for the duration of a refresh; the scope goes idle when dropped.
#[derive(Debug)]
pub struct RefreshTicket<'a> {
    guard: &'a RefreshGuard,
}

impl Drop for RefreshTicket<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_refresh_is_refused() {
        let guard = RefreshGuard::new();
        let ticket = guard.try_begin();
        assert!(ticket.is_some());
        assert_eq!(guard.state(), RefreshState::Running);
        assert!(guard.try_begin().is_none());

        drop(ticket);
        assert_eq!(guard.state(), RefreshState::Idle);
        assert!(guard.try_begin().is_some());
    }

    #[test]
    fn test_guards_are_independent() {
        let first = RefreshGuard::new();
        let second = RefreshGuard::new();

        let _running = first.try_begin().unwrap();
        assert!(second.try_begin().is_some());
        assert_eq!(second.state(), RefreshState::Idle);
    }
}
