//! [`AlarmStore`] over the SQLite store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use rooster_core::{Alarm, AlarmId, AlarmStore, StoreResult};
use rooster_store::Store;

/// Shares one SQLite connection between the engine and the rest of the
/// service.
#[derive(Clone)]
pub struct SqliteAlarmStore {
    store: Arc<Mutex<Store>>,
}

impl SqliteAlarmStore {
    pub fn new(store: Arc<Mutex<Store>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AlarmStore for SqliteAlarmStore {
    async fn get_by_id(&self, id: AlarmId) -> StoreResult<Option<Alarm>> {
        Ok(self.store.lock().await.get_alarm(id)?)
    }

    async fn get_all_enabled(&self) -> StoreResult<Vec<Alarm>> {
        Ok(self.store.lock().await.list_enabled()?)
    }

    async fn update(&self, alarm: &Alarm) -> StoreResult<()> {
        Ok(self.store.lock().await.update_alarm(alarm)?)
    }

    async fn update_calculated_time(
        &self,
        id: AlarmId,
        calculated_time: i64,
        needs_recompute: bool,
    ) -> StoreResult<()> {
        Ok(self
            .store
            .lock()
            .await
            .update_calculated_time(id, calculated_time, needs_recompute)?)
    }
}
