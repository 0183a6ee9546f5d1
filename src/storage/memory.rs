use crate::models::{Pop, PopKey};
use crate::storage::{PopTotals, Storage, StorageError, StorageResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    visitors: HashMap<(String, String), Pop>,
    regions: HashMap<String, Pop>,
}

/// Process-local storage; counters vanish on restart
///
/// Both tables sit behind one lock so a pop updates them as a unit.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::Other(anyhow!("memory storage lock poisoned")))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::Other(anyhow!("memory storage lock poisoned")))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn add_pops(
        &self,
        ip_address: &str,
        region_code: &str,
        amount: u64,
    ) -> StorageResult<PopTotals> {
        let mut tables = self.write()?;

        let visitor_key = (ip_address.to_string(), region_code.to_string());
        let visitor = tables
            .visitors
            .get(&visitor_key)
            .cloned()
            .unwrap_or_else(|| Pop::new(PopKey::visitor(ip_address, region_code)))
            .add_count(amount);

        let region = tables
            .regions
            .get(region_code)
            .cloned()
            .unwrap_or_else(|| Pop::new(PopKey::region(region_code)))
            .add_count(amount);

        let totals = PopTotals {
            visitor_count: visitor.count(),
            region_count: region.count(),
        };

        tables.visitors.insert(visitor_key, visitor);
        tables.regions.insert(region_code.to_string(), region);

        Ok(totals)
    }

    async fn get_visitor_pop(
        &self,
        ip_address: &str,
        region_code: &str,
    ) -> StorageResult<Option<Pop>> {
        let tables = self.read()?;
        Ok(tables
            .visitors
            .get(&(ip_address.to_string(), region_code.to_string()))
            .cloned())
    }

    async fn get_region_pop(&self, region_code: &str) -> StorageResult<Option<Pop>> {
        let tables = self.read()?;
        Ok(tables.regions.get(region_code).cloned())
    }

    async fn list_region_pops(&self) -> StorageResult<Vec<Pop>> {
        let tables = self.read()?;
        let mut pops: Vec<Pop> = tables.regions.values().cloned().collect();
        pops.sort_by(|a, b| {
            b.count()
                .cmp(&a.count())
                .then_with(|| a.key().region_code().cmp(b.key().region_code()))
        });
        Ok(pops)
    }
}
