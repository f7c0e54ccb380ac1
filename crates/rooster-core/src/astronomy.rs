//! In-process astronomy snapshot.
//!
//! [`AstronomyCache`] holds the most recent [`AstronomyData`] as an immutable
//! `Arc` that is swapped as a whole when fresh data arrives. Readers clone
//! the `Arc` and never observe a half-updated record. Refresh requests are
//! forwarded to whoever owns the receiving end of the refresh channel
//! (the service's fetch loop); at most one request is outstanding at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::debug;

use rooster_types::{AstronomyData, Location};

use crate::traits::AstronomyProvider;

/// Cached data is only used for locations within this many degrees.
pub const LOCATION_TOLERANCE_DEG: f64 = 0.5;

/// Shared astronomy snapshot with non-blocking refresh requests.
#[derive(Debug, Default)]
pub struct AstronomyCache {
    current: RwLock<Option<Arc<AstronomyData>>>,
    refresh_tx: Option<mpsc::UnboundedSender<Location>>,
    refresh_pending: AtomicBool,
}

impl AstronomyCache {
    /// A cache without a refresh channel. Refresh requests are dropped.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache whose refresh requests are delivered on the returned receiver.
    pub fn with_refresh_channel() -> (Self, mpsc::UnboundedReceiver<Location>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cache = Self {
            refresh_tx: Some(tx),
            ..Self::default()
        };
        (cache, rx)
    }

    /// Seed the cache, typically with data loaded from the store at startup.
    #[must_use]
    pub fn with_data(self, data: AstronomyData) -> Self {
        self.replace(data);
        self
    }

    /// The current snapshot regardless of location.
    pub fn current(&self) -> Option<Arc<AstronomyData>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new snapshot and clear the pending refresh flag.
    pub fn replace(&self, data: AstronomyData) -> Arc<AstronomyData> {
        let data = Arc::new(data);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&data));
        self.refresh_pending.store(false, Ordering::Release);
        data
    }

    /// Allow a new refresh request after a failed fetch.
    pub fn refresh_failed(&self) {
        self.refresh_pending.store(false, Ordering::Release);
    }

    pub fn refresh_pending(&self) -> bool {
        self.refresh_pending.load(Ordering::Acquire)
    }
}

impl AstronomyProvider for AstronomyCache {
    fn get(&self, location: &Location) -> Option<Arc<AstronomyData>> {
        self.current().filter(|data| {
            (data.location.latitude - location.latitude).abs() <= LOCATION_TOLERANCE_DEG
                && (data.location.longitude - location.longitude).abs() <= LOCATION_TOLERANCE_DEG
        })
    }

    fn request_refresh(&self, location: &Location) {
        let Some(tx) = &self.refresh_tx else {
            return;
        };
        if self.refresh_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        if tx.send(*location).is_err() {
            debug!("Astronomy refresh receiver dropped");
            self.refresh_pending.store(false, Ordering::Release);
        }
    }
}
