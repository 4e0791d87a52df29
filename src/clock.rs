//! Injectable date source.
//!
//! All status derivations are pure functions of `(data, today)`; nothing in
//! the engine reads wall-clock time directly. A `Clock` is either the system
//! date or a fixed override used for testing and demos. The store persists
//! the override (see [`crate::store::SqliteStore::clock`]) so a demo session
//! can fast-forward time across invocations.

use chrono::{Local, NaiveDate};

/// Source of "today's date" for status derivation and scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Use the local system date.
    #[default]
    System,
    /// Use a fixed date, regardless of system time.
    Fixed(NaiveDate),
}

impl Clock {
    /// Create a clock fixed at the given date.
    #[must_use]
    pub const fn fixed(date: NaiveDate) -> Self {
        Self::Fixed(date)
    }

    /// The current date according to this clock.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        match self {
            Self::System => Local::now().date_naive(),
            Self::Fixed(date) => *date,
        }
    }

    /// Advance a fixed clock by the given number of days.
    ///
    /// A system clock is first pinned to the current system date, then
    /// advanced, so "fast forward one day" behaves the same from either
    /// starting state.
    #[must_use]
    pub fn advanced_by(&self, days: i64) -> Self {
        Self::Fixed(self.today() + chrono::Duration::days(days))
    }

    /// The override date, if this clock is fixed.
    #[must_use]
    pub const fn override_date(&self) -> Option<NaiveDate> {
        match self {
            Self::System => None,
            Self::Fixed(date) => Some(*date),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_fixed_clock_returns_override() {
        let clock = Clock::fixed(date("2026-03-01"));
        assert_eq!(clock.today(), date("2026-03-01"));
        assert_eq!(clock.override_date(), Some(date("2026-03-01")));
    }

    #[test]
    fn test_system_clock_has_no_override() {
        assert_eq!(Clock::System.override_date(), None);
    }

    #[test]
    fn test_advanced_by_moves_fixed_date() {
        let clock = Clock::fixed(date("2026-03-01"));
        assert_eq!(clock.advanced_by(1).today(), date("2026-03-02"));
        assert_eq!(clock.advanced_by(-1).today(), date("2026-02-28"));
    }

    #[test]
    fn test_advanced_by_pins_system_clock() {
        let advanced = Clock::System.advanced_by(0);
        assert!(matches!(advanced, Clock::Fixed(_)));
        assert_eq!(advanced.today(), Local::now().date_naive());
    }

    #[test]
    fn test_default_is_system() {
        assert_eq!(Clock::default(), Clock::System);
    }
}
