//! Inventory domain module.
//!
//! Equipment records, their categories and quantity counters, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod category;
pub mod equipment;

pub use category::{CategoryUpdate, EquipmentCategory, NewCategory};
pub use equipment::{
    Equipment, EquipmentCondition, EquipmentSnapshot, EquipmentUpdate, NewEquipment,
};
