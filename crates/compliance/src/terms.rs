use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use kardex_catalog::{CatalogItem, CriticalityTier, EppId, ItemCategory};

/// The part of a catalog item the engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTerms {
    pub validity_months: Option<u32>,
    pub criticality: Option<CriticalityTier>,
    pub category: ItemCategory,
}

impl From<&CatalogItem> for ItemTerms {
    fn from(item: &CatalogItem) -> Self {
        Self {
            validity_months: item.validity_months,
            criticality: item.criticality,
            category: item.category,
        }
    }
}

/// Validity and criticality terms for every item a history references.
///
/// Owned by the catalog and handed to the engine read-only; items missing from
/// the map are treated as perpetual and untiered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogTerms {
    items: HashMap<EppId, ItemTerms>,
}

impl CatalogTerms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, epp_id: EppId, terms: ItemTerms) -> Self {
        self.items.insert(epp_id, terms);
        self
    }

    pub fn insert(&mut self, epp_id: EppId, terms: ItemTerms) {
        self.items.insert(epp_id, terms);
    }

    pub fn get(&self, epp_id: EppId) -> Option<&ItemTerms> {
        self.items.get(&epp_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> FromIterator<&'a CatalogItem> for CatalogTerms {
    fn from_iter<I: IntoIterator<Item = &'a CatalogItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(|i| (i.id, ItemTerms::from(i))).collect(),
        }
    }
}
