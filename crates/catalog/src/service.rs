use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::item::{CatalogItem, EppId};

/// Read-only port onto the catalog service.
pub trait CatalogService: Send + Sync {
    /// Look up a catalog item by id; `None` if it does not exist.
    fn get_item(&self, id: EppId) -> Option<CatalogItem>;
}

impl<S> CatalogService for Arc<S>
where
    S: CatalogService + ?Sized,
{
    fn get_item(&self, id: EppId) -> Option<CatalogItem> {
        (**self).get_item(id)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: RwLock<HashMap<EppId, CatalogItem>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an item (the external catalog may edit items at any time).
    pub fn upsert(&self, item: CatalogItem) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.id, item);
    }

    /// Retire an item from the catalog.
    pub fn remove(&self, id: EppId) -> Option<CatalogItem> {
        self.items.write().unwrap_or_else(PoisonError::into_inner).remove(&id)
    }
}

impl CatalogService for InMemoryCatalog {
    fn get_item(&self, id: EppId) -> Option<CatalogItem> {
        self.items.read().unwrap_or_else(PoisonError::into_inner).get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemCategory;
    use kardex_core::{AggregateId, CompanyId};

    #[test]
    fn upsert_replaces_and_remove_retires() {
        let catalog = InMemoryCatalog::new();
        let id = EppId::new(AggregateId::new());
        let company = CompanyId::new();

        catalog.upsert(CatalogItem::new(id, company, "Gloves", ItemCategory::Ppe));
        catalog.upsert(CatalogItem::new(id, company, "Nitrile gloves", ItemCategory::Ppe));
        assert_eq!(catalog.get_item(id).unwrap().name, "Nitrile gloves");

        assert!(catalog.remove(id).is_some());
        assert!(catalog.get_item(id).is_none());
    }

    #[test]
    fn writes_survive_a_poisoned_lock() {
        let catalog = InMemoryCatalog::new();
        let id = EppId::new(AggregateId::new());
        let company = CompanyId::new();

        std::thread::scope(|s| {
            let crashed = s
                .spawn(|| {
                    let _guard = catalog.items.write().unwrap();
                    panic!("writer crashed");
                })
                .join();
            assert!(crashed.is_err());
        });
        assert!(catalog.items.is_poisoned());

        catalog.upsert(CatalogItem::new(id, company, "Helmet", ItemCategory::Ppe));
        assert_eq!(catalog.get_item(id).unwrap().name, "Helmet");
        assert!(catalog.remove(id).is_some());
        assert!(catalog.get_item(id).is_none());
    }
}
