//! Persistence boundary for equipment and borrow requests.
//!
//! The lending service owns the rules; repositories load, filter and commit.
//! A commit re-checks its [`LineEffect`] under an exclusive hold on the
//! equipment line and moves the request and the counter together.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLendingRepository;
#[cfg(feature = "postgres")]
pub use postgres::PostgresLendingRepository;
pub use r#trait::{LendingRepository, LineEffect, RepositoryError, RequestCriteria};
