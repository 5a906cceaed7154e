//! Scoped log-level suppression.

use log::LevelFilter;
use parking_lot::{const_mutex, Mutex};

/// Guards alive in this process and the level to restore once they are gone.
struct Caps {
    saved: LevelFilter,
    active: Vec<(u64, LevelFilter)>,
    next: u64,
}

impl Caps {
    fn effective(&self) -> LevelFilter {
        self.active
            .iter()
            .fold(self.saved, |level, &(_, cap)| level.min(cap))
    }
}

static CAPS: Mutex<Caps> = const_mutex(Caps {
    saved: LevelFilter::Off,
    active: Vec::new(),
    next: 0,
});

/// Caps the global `log` level for its lifetime, including during unwinding.
///
/// Guards are counted process-wide. The first guard records the level in
/// force; while any guard lives the level is the tightest active cap, and
/// the recorded level comes back when the last one drops. Drop order does
/// not matter, so guards held on different threads may overlap freely.
#[derive(Debug)]
#[must_use = "the previous level is restored when the guard is dropped"]
pub struct LogLevelGuard {
    id: u64,
    previous: LevelFilter,
}

impl LogLevelGuard {
    /// Lowers the global level to at most `cap`; never raises it.
    pub fn cap(cap: LevelFilter) -> Self {
        let mut caps = CAPS.lock();
        let previous = log::max_level();
        if caps.active.is_empty() {
            caps.saved = previous;
        }
        let id = caps.next;
        caps.next += 1;
        caps.active.push((id, cap));
        log::set_max_level(caps.effective());
        Self { id, previous }
    }

    /// Suppresses everything below `error`.
    pub fn errors_only() -> Self {
        Self::cap(LevelFilter::Error)
    }

    /// Level in force when this guard was created.
    #[must_use]
    pub fn previous(&self) -> LevelFilter {
        self.previous
    }
}

impl Drop for LogLevelGuard {
    fn drop(&mut self) {
        let mut caps = CAPS.lock();
        caps.active.retain(|&(id, _)| id != self.id);
        log::set_max_level(caps.effective());
    }
}
