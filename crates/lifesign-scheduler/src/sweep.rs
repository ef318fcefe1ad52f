//! Hourly retention sweep over the ephemeral record classes.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use lifesign_core::traits::DeadlineStore;
use lifesign_core::types::EphemeralTable;

pub struct RetentionSweeper {
    store: Arc<dyn DeadlineStore>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn DeadlineStore>) -> Self {
        Self { store }
    }

    /// Delete expired rows from every ephemeral table. A failing table is
    /// logged and the remaining tables are still swept.
    pub async fn sweep(&self, now: DateTime<Utc>) -> u64 {
        let mut total = 0;
        for table in EphemeralTable::ALL {
            match self.store.delete_expired(table, now).await {
                Ok(count) => {
                    total += count;
                    if count > 0 {
                        tracing::info!("🧹 removed {count} expired {} row(s)", table.table_name());
                    }
                }
                Err(e) => {
                    tracing::error!("retention sweep of {} failed: {e}", table.table_name());
                }
            }
        }
        total
    }
}
