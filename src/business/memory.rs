//! In-memory tenant registry for tests and dry runs

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::models::Business;
use super::repository::{BusinessError, BusinessStore};

#[derive(Default)]
pub struct MemoryBusinessStore {
    businesses: Mutex<BTreeMap<String, Business>>,
}

impl MemoryBusinessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BusinessStore for MemoryBusinessStore {
    async fn query_business_by_uid(
        &self,
        business_uid: &str,
    ) -> Result<Option<Business>, BusinessError> {
        Ok(self.businesses.lock().unwrap().get(business_uid).cloned())
    }

    async fn query_business_list(&self) -> Result<Vec<Business>, BusinessError> {
        Ok(self.businesses.lock().unwrap().values().cloned().collect())
    }

    async fn store_business(&self, business: &Business) -> Result<(), BusinessError> {
        business.namespace()?;

        let mut businesses = self.businesses.lock().unwrap();
        if businesses.contains_key(&business.business_uid) {
            return Err(BusinessError::Duplicate(business.business_uid.clone()));
        }
        businesses.insert(business.business_uid.clone(), business.clone());
        Ok(())
    }
}
