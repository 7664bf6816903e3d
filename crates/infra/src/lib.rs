//! Infrastructure layer: persistence, concurrency control, the lending
//! service pipeline and background workers.

pub mod locks;
pub mod query;
pub mod repository;
pub mod service;
pub mod workers;


pub use locks::EquipmentLocks;
pub use query::{
    CategoryFilter, CategoryView, EquipmentFilter, EquipmentView, RequestFilter, RequestView,
};
pub use repository::{
    InMemoryLendingRepository, LendingRepository, LineEffect, RepositoryError, RequestCriteria,
};
pub use service::{LendingError, LendingService, NewBorrowRequest};
