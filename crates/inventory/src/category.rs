use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use equiplend_core::{CategoryId, DomainError, DomainResult};

/// Input for creating a category.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewCategory {
    pub name: String,
    pub description: String,
}

/// Administrative edit. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Classification bucket for equipment lines.
///
/// Names are unique across categories; the repository enforces that, this
/// type only rejects blank names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentCategory {
    id: CategoryId,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
}

impl EquipmentCategory {
    pub fn create(id: CategoryId, new: NewCategory, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id,
            name: clean_name(&new.name)?,
            description: new.description,
            created_at: now,
        })
    }

    /// Rehydrate from storage.
    pub fn restore(
        id: CategoryId,
        name: String,
        description: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            description,
            created_at,
        }
    }

    pub fn update(&mut self, update: CategoryUpdate) -> DomainResult<()> {
        if let Some(name) = &update.name {
            self.name = clean_name(name)?;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        Ok(())
    }

    pub fn id_typed(&self) -> CategoryId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Case-insensitive match on name or description.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.name.to_lowercase().contains(&term) || self.description.to_lowercase().contains(&term)
    }
}

fn clean_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("category name cannot be empty"));
    }
    if name.chars().count() > 100 {
        return Err(DomainError::validation(
            "category name must be at most 100 characters",
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optics() -> EquipmentCategory {
        EquipmentCategory::create(
            CategoryId::new(),
            NewCategory {
                name: "  Optics ".to_string(),
                description: "Lenses and microscopes".to_string(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_trims_the_name() {
        assert_eq!(optics().name(), "Optics");
    }

    #[test]
    fn blank_or_oversized_names_are_rejected() {
        let blank = NewCategory {
            name: " ".to_string(),
            ..NewCategory::default()
        };
        assert!(EquipmentCategory::create(CategoryId::new(), blank, Utc::now()).is_err());

        let mut c = optics();
        let err = c
            .update(CategoryUpdate {
                name: Some("x".repeat(101)),
                ..CategoryUpdate::default()
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(c.name(), "Optics");
    }

    #[test]
    fn search_looks_at_name_and_description() {
        let c = optics();
        assert!(c.matches_search("opt"));
        assert!(c.matches_search("MICRO"));
        assert!(!c.matches_search("audio"));
    }
}
