use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use equiplend_core::{DomainError, DomainResult};

/// Half-open borrow window `[from, until)`.
///
/// `until` is excluded, so back-to-back bookings (`a.until == b.from`) do not
/// collide.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WindowBounds")]
pub struct BorrowWindow {
    #[serde(rename = "borrow_from")]
    from: DateTime<Utc>,
    #[serde(rename = "borrow_until")]
    until: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WindowBounds {
    borrow_from: DateTime<Utc>,
    borrow_until: DateTime<Utc>,
}

impl TryFrom<WindowBounds> for BorrowWindow {
    type Error = DomainError;

    fn try_from(value: WindowBounds) -> Result<Self, Self::Error> {
        BorrowWindow::new(value.borrow_from, value.borrow_until)
    }
}

impl BorrowWindow {
    /// Build a window; `from` must be strictly before `until`.
    pub fn new(from: DateTime<Utc>, until: DateTime<Utc>) -> DomainResult<Self> {
        if until <= from {
            return Err(DomainError::validation(
                "borrow_until must be after borrow_from",
            ));
        }
        Ok(Self { from, until })
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn until(&self) -> DateTime<Utc> {
        self.until
    }

    /// `[a, b)` and `[c, d)` overlap iff `a < d && c < b`.
    pub fn overlaps(&self, other: &BorrowWindow) -> bool {
        self.from < other.until && other.from < self.until
    }

    pub fn starts_before(&self, instant: DateTime<Utc>) -> bool {
        self.from < instant
    }

    /// The window has fully elapsed at `instant`.
    pub fn ended_before(&self, instant: DateTime<Utc>) -> bool {
        self.until < instant
    }
}

impl core::fmt::Display for BorrowWindow {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}, {})", self.from.to_rfc3339(), self.until.to_rfc3339())
    }
}
