use serde::{Deserialize, Serialize};

use kardex_core::{AggregateId, CompanyId};

/// Catalog item identifier (company-scoped via `company_id`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EppId(pub AggregateId);

impl EppId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for EppId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What kind of article the catalog entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    Ppe,
    Uniform,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Ppe => "ppe",
            ItemCategory::Uniform => "uniform",
        }
    }
}

/// Criticality tier of an item.
///
/// An expired `Core` item blocks a worker's compliance; an expired `Recurring`
/// item only degrades it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriticalityTier {
    Core,
    Recurring,
}

/// A catalog entry as exposed by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: EppId,
    pub company_id: CompanyId,
    pub name: String,
    pub protection_type: String,
    pub category: ItemCategory,
    /// Months an issued unit stays valid; `None` means it never expires.
    pub validity_months: Option<u32>,
    /// Cost in smallest currency unit (e.g., cents).
    pub unit_cost: u64,
    pub criticality: Option<CriticalityTier>,
}

impl CatalogItem {
    pub fn new(id: EppId, company_id: CompanyId, name: impl Into<String>, category: ItemCategory) -> Self {
        Self {
            id,
            company_id,
            name: name.into(),
            protection_type: String::new(),
            category,
            validity_months: None,
            unit_cost: 0,
            criticality: None,
        }
    }

    pub fn with_validity_months(mut self, months: u32) -> Self {
        self.validity_months = Some(months);
        self
    }

    pub fn with_criticality(mut self, tier: CriticalityTier) -> Self {
        self.criticality = Some(tier);
        self
    }

    pub fn with_protection_type(mut self, protection_type: impl Into<String>) -> Self {
        self.protection_type = protection_type.into();
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: u64) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    /// An item expires only if it declares a positive validity period.
    pub fn expires(&self) -> bool {
        matches!(self.validity_months, Some(m) if m > 0)
    }

    pub fn belongs_to(&self, company_id: CompanyId) -> bool {
        self.company_id == company_id
    }
}
