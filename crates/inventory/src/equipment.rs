use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use equiplend_core::{CategoryId, DomainError, DomainResult, EquipmentId};

/// Physical condition of an equipment line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentCondition {
    Excellent,
    #[default]
    Good,
    Fair,
    Poor,
    Maintenance,
}

impl EquipmentCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentCondition::Excellent => "excellent",
            EquipmentCondition::Good => "good",
            EquipmentCondition::Fair => "fair",
            EquipmentCondition::Poor => "poor",
            EquipmentCondition::Maintenance => "maintenance",
        }
    }
}

impl core::fmt::Display for EquipmentCondition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquipmentCondition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "excellent" => Ok(EquipmentCondition::Excellent),
            "good" => Ok(EquipmentCondition::Good),
            "fair" => Ok(EquipmentCondition::Fair),
            "poor" => Ok(EquipmentCondition::Poor),
            "maintenance" => Ok(EquipmentCondition::Maintenance),
            other => Err(DomainError::validation(format!(
                "unknown condition '{other}' (expected excellent, good, fair, poor or maintenance)"
            ))),
        }
    }
}

/// Input for registering a new equipment line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewEquipment {
    pub name: String,
    pub category: Option<CategoryId>,
    pub description: String,
    pub condition: EquipmentCondition,
    pub total_quantity: u32,
    pub serial_number: Option<String>,
    pub location: String,
    pub purchase_date: Option<NaiveDate>,
}

/// Administrative edit. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EquipmentUpdate {
    pub name: Option<String>,
    pub category: Option<CategoryId>,
    pub description: Option<String>,
    pub condition: Option<EquipmentCondition>,
    pub total_quantity: Option<u32>,
    pub serial_number: Option<String>,
    pub location: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub is_active: Option<bool>,
}

/// Flat, serializable view of an equipment record.
///
/// Used for persistence and API responses. Going back to an [`Equipment`]
/// always passes through [`Equipment::restore`], which re-applies the counter
/// invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentSnapshot {
    pub id: EquipmentId,
    pub name: String,
    pub category: Option<CategoryId>,
    pub description: String,
    pub condition: EquipmentCondition,
    pub total_quantity: u32,
    pub available_quantity: u32,
    pub serial_number: Option<String>,
    pub location: String,
    pub purchase_date: Option<NaiveDate>,
    pub is_active: bool,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entity: an equipment line with a business ceiling (`total_quantity`) and a
/// stock-on-hand counter (`available_quantity`).
///
/// Invariant: `1 <= total_quantity` and `0 <= available_quantity <= total_quantity`
/// after every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equipment {
    id: EquipmentId,
    name: String,
    category: Option<CategoryId>,
    description: String,
    condition: EquipmentCondition,
    total_quantity: u32,
    available_quantity: u32,
    serial_number: Option<String>,
    location: String,
    purchase_date: Option<NaiveDate>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Equipment {
    /// Register a new line; everything starts on the shelf.
    pub fn register(id: EquipmentId, new: NewEquipment, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if new.total_quantity < 1 {
            return Err(DomainError::validation("total_quantity must be at least 1"));
        }

        Ok(Self {
            id,
            name,
            category: new.category,
            description: new.description,
            condition: new.condition,
            total_quantity: new.total_quantity,
            available_quantity: new.total_quantity,
            serial_number: normalize_optional(new.serial_number),
            location: new.location,
            purchase_date: new.purchase_date,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rehydrate from storage, correcting an out-of-range counter.
    pub fn restore(s: EquipmentSnapshot) -> Self {
        let mut equipment = Self {
            id: s.id,
            name: s.name,
            category: s.category,
            description: s.description,
            condition: s.condition,
            total_quantity: s.total_quantity.max(1),
            available_quantity: s.available_quantity,
            serial_number: s.serial_number,
            location: s.location,
            purchase_date: s.purchase_date,
            is_active: s.is_active,
            created_at: s.created_at,
            updated_at: s.updated_at,
        };
        equipment.normalize();
        equipment
    }

    pub fn snapshot(&self) -> EquipmentSnapshot {
        EquipmentSnapshot {
            id: self.id,
            name: self.name.clone(),
            category: self.category,
            description: self.description.clone(),
            condition: self.condition,
            total_quantity: self.total_quantity,
            available_quantity: self.available_quantity,
            serial_number: self.serial_number.clone(),
            location: self.location.clone(),
            purchase_date: self.purchase_date,
            is_active: self.is_active,
            is_available: self.is_available(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn id_typed(&self) -> EquipmentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Option<CategoryId> {
        self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn condition(&self) -> EquipmentCondition {
        self.condition
    }

    pub fn total_quantity(&self) -> u32 {
        self.total_quantity
    }

    pub fn available_quantity(&self) -> u32 {
        self.available_quantity
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn purchase_date(&self) -> Option<NaiveDate> {
        self.purchase_date
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Units on the shelf right now and the line is lendable.
    pub fn is_available(&self) -> bool {
        self.available_quantity > 0 && self.is_active
    }

    /// Hand out `quantity` units (issue-decrement).
    ///
    /// Fails without touching the counter when stock on hand is short.
    pub fn checkout(&mut self, quantity: u32, now: DateTime<Utc>) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if self.available_quantity < quantity {
            return Err(DomainError::unavailable(format!(
                "insufficient stock on hand (available: {}, requested: {quantity})",
                self.available_quantity
            )));
        }

        self.available_quantity -= quantity;
        self.touch(now);
        Ok(())
    }

    /// Take back `quantity` units (return-increment), clamped to the ceiling.
    pub fn check_in(&mut self, quantity: u32, now: DateTime<Utc>) {
        self.available_quantity = self.available_quantity.saturating_add(quantity);
        self.touch(now);
    }

    /// Apply an administrative edit.
    ///
    /// Lowering `total_quantity` below the shelf count pulls the shelf count
    /// down with it.
    pub fn update(&mut self, update: EquipmentUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("name cannot be empty"));
            }
        }
        if update.total_quantity == Some(0) {
            return Err(DomainError::validation("total_quantity must be at least 1"));
        }

        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(category) = update.category {
            self.category = Some(category);
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(condition) = update.condition {
            self.condition = condition;
        }
        if let Some(total) = update.total_quantity {
            self.total_quantity = total;
        }
        if let Some(serial) = update.serial_number {
            self.serial_number = normalize_optional(Some(serial));
        }
        if let Some(location) = update.location {
            self.location = location;
        }
        if let Some(date) = update.purchase_date {
            self.purchase_date = Some(date);
        }
        if let Some(active) = update.is_active {
            self.is_active = active;
        }

        self.touch(now);
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.normalize();
    }

    fn normalize(&mut self) {
        if self.available_quantity > self.total_quantity {
            self.available_quantity = self.total_quantity;
        }
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn camera(total: u32) -> Equipment {
        Equipment::register(
            EquipmentId::new(),
            NewEquipment {
                name: "DSLR Camera".to_string(),
                category: Some(CategoryId::new()),
                total_quantity: total,
                ..NewEquipment::default()
            },
            test_time(),
        )
        .unwrap()
    }

    #[test]
    fn register_puts_all_units_on_the_shelf() {
        let eq = camera(5);
        assert_eq!(eq.total_quantity(), 5);
        assert_eq!(eq.available_quantity(), 5);
        assert!(eq.is_active());
        assert!(eq.is_available());
    }

    #[test]
    fn register_rejects_zero_total_and_blank_name() {
        let err = Equipment::register(
            EquipmentId::new(),
            NewEquipment {
                name: "Tripod".to_string(),
                total_quantity: 0,
                ..NewEquipment::default()
            },
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = Equipment::register(
            EquipmentId::new(),
            NewEquipment {
                name: "   ".to_string(),
                total_quantity: 1,
                ..NewEquipment::default()
            },
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn checkout_then_check_in_restores_counter() {
        let mut eq = camera(5);

        eq.checkout(2, test_time()).unwrap();
        assert_eq!(eq.available_quantity(), 3);

        eq.check_in(2, test_time());
        assert_eq!(eq.available_quantity(), 5);
    }

    #[test]
    fn checkout_beyond_stock_fails_without_mutation() {
        let mut eq = camera(2);
        let before = eq.clone();

        let err = eq.checkout(3, test_time()).unwrap_err();
        assert!(matches!(err, DomainError::Unavailable(_)));
        assert_eq!(eq, before);
    }

    #[test]
    fn check_in_is_clamped_to_total() {
        let mut eq = camera(3);
        eq.check_in(10, test_time());
        assert_eq!(eq.available_quantity(), 3);
    }

    #[test]
    fn lowering_total_pulls_available_down() {
        let mut eq = camera(5);
        eq.update(
            EquipmentUpdate {
                total_quantity: Some(2),
                ..EquipmentUpdate::default()
            },
            test_time(),
        )
        .unwrap();
        assert_eq!(eq.total_quantity(), 2);
        assert_eq!(eq.available_quantity(), 2);
    }

    #[test]
    fn inactive_equipment_is_not_available() {
        let mut eq = camera(1);
        eq.update(
            EquipmentUpdate {
                is_active: Some(false),
                ..EquipmentUpdate::default()
            },
            test_time(),
        )
        .unwrap();
        assert!(!eq.is_available());
        assert!(!eq.snapshot().is_available);
    }

    #[test]
    fn restore_corrects_out_of_range_counter() {
        let mut snap = camera(4).snapshot();
        snap.available_quantity = 9;

        let eq = Equipment::restore(snap);
        assert_eq!(eq.available_quantity(), 4);
    }

    #[test]
    fn condition_parses_case_insensitively() {
        assert_eq!(
            "Maintenance".parse::<EquipmentCondition>().unwrap(),
            EquipmentCondition::Maintenance
        );
        assert!("broken".parse::<EquipmentCondition>().is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Checkout(u32),
            CheckIn(u32),
            Resize(u32),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u32..8).prop_map(Op::Checkout),
                (0u32..8).prop_map(Op::CheckIn),
                (0u32..8).prop_map(Op::Resize),
            ]
        }

        proptest! {
            /// Property: counters stay within [0, total] whatever the write sequence.
            #[test]
            fn counter_stays_in_bounds(total in 1u32..10, ops in proptest::collection::vec(op(), 0..40)) {
                let mut eq = camera(total);
                for op in ops {
                    match op {
                        Op::Checkout(q) => { let _ = eq.checkout(q, test_time()); }
                        Op::CheckIn(q) => eq.check_in(q, test_time()),
                        Op::Resize(t) => {
                            let _ = eq.update(
                                EquipmentUpdate { total_quantity: Some(t), ..EquipmentUpdate::default() },
                                test_time(),
                            );
                        }
                    }
                    prop_assert!(eq.total_quantity() >= 1);
                    prop_assert!(eq.available_quantity() <= eq.total_quantity());
                }
            }
        }
    }
}
