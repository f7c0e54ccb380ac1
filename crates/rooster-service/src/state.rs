//! Application state shared by the daemon loop and the CLI commands.
//!
//! The SQLite store sits behind a single async mutex shared by the engine's
//! [`SqliteAlarmStore`] and the command handlers. Astronomy data lives in an
//! [`AstronomyCache`] seeded from the store at startup; the engine reads it
//! without blocking and asks for refreshes over a channel that the
//! [`Runner`](crate::Runner) drains.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use rooster_core::{AlarmId, AstronomyCache, Location, ScheduleOrchestrator};
use rooster_store::Store;

use crate::astronomy::AstronomyFetcher;
use crate::config::Config;
use crate::error::Result;
use crate::store_adapter::SqliteAlarmStore;
use crate::timer::TokioTimer;

/// Shared application state.
pub struct AppState {
    /// The data store (wrapped in Mutex for thread-safe access).
    pub store: Arc<Mutex<Store>>,
    /// Configuration the state was built from.
    pub config: Config,
    /// Latest astronomy snapshot.
    pub astronomy: Arc<AstronomyCache>,
    /// In-process alarm timers.
    pub timer: Arc<TokioTimer>,
    pub fetcher: AstronomyFetcher,
    pub orchestrator: ScheduleOrchestrator,
}

/// Receiving ends of the channels feeding the [`Runner`](crate::Runner).
pub struct Channels {
    /// Ids whose timers fired.
    pub fired: mpsc::UnboundedReceiver<AlarmId>,
    /// Locations the engine wants fresh astronomy data for.
    pub refresh: mpsc::UnboundedReceiver<Location>,
}

impl AppState {
    /// Wire the engine to `store` according to `config`.
    pub fn new(store: Store, config: Config) -> Result<(Arc<Self>, Channels)> {
        let (cache, refresh_rx) = AstronomyCache::with_refresh_channel();
        let cache = match store.load_astronomy()? {
            Some(data) => {
                debug!("Loaded cached astronomy data (updated {})", data.last_updated);
                cache.with_data(data)
            }
            None => cache,
        };
        let astronomy = Arc::new(cache);

        let store = Arc::new(Mutex::new(store));
        let (timer, fired_rx) = TokioTimer::new();
        let timer = Arc::new(timer);
        let fetcher = AstronomyFetcher::new(&config.astronomy)?;

        let location = config.location.location();
        if location.is_unset() {
            info!("No location configured; solar alarms will use approximate times");
        }

        let orchestrator = ScheduleOrchestrator::new(
            Arc::new(SqliteAlarmStore::new(Arc::clone(&store))),
            Arc::clone(&timer) as Arc<dyn rooster_core::PlatformTimer>,
            Arc::clone(&astronomy) as Arc<dyn rooster_core::AstronomyProvider>,
        )
        .with_calculator(config.scheduler.calculator())
        .with_missed_grace(config.scheduler.missed_grace())
        .with_location(location);

        let state = Arc::new(Self {
            store,
            config,
            astronomy,
            timer,
            fetcher,
            orchestrator,
        });
        let channels = Channels {
            fired: fired_rx,
            refresh: refresh_rx,
        };
        Ok((state, channels))
    }
}
