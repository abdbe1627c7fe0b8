//! Client Sync Module
//!
//! Offline-first data layer for trip entities. Reads go through a local
//! cache, writes are applied optimistically and either confirmed by the
//! backend or queued until the device is back online.
//!
//! # Architecture
//!
//! - **`config`** - Environment and file configuration, session token
//! - **`logging`** - Tracing subscriber setup
//! - **`api`** - Backend trait with HTTP and in-memory implementations
//! - **`local_db`** - SQLite storage for the cache and the offline queue
//! - **`offline`** - Cache, queue, optimistic updates, reconciliation, retry
//! - **`polls`** - Optimistic poll mutations
//! - **`basecamp`** - Online-only basecamp updates
//! - **`sync`** - Network monitor and queue replay
//! - **`state`** - Application context wiring it all together
//!
//! # Example
//!
//! ```rust,no_run
//! use tripsync::client::{AppState, Config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::initialize(Config::from_env()?).await?;
//! state.sync.start().await;
//!
//! let polls = state.polls.fetch_polls("trip-1").await;
//! if let Some(poll) = polls.first() {
//!     let option = poll.options[0].id.clone();
//!     match state.polls.vote("trip-1", &poll.id, "user-1", &[option]).await {
//!         Ok(poll) => println!("{} votes", poll.total_votes),
//!         Err(e) if e.is_offline() => println!("queued: {}", e),
//!         Err(e) => return Err(e.into()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod basecamp;
pub mod config;
pub mod error;
pub mod local_db;
pub mod logging;
pub mod notify;
pub mod offline;
pub mod polls;
pub mod state;
pub mod sync;

pub use api::{ApiError, Backend, HttpBackend, MemoryBackend};
pub use basecamp::BasecampService;
pub use config::Config;
pub use error::{MutationError, MutationErrorKind};
pub use local_db::LocalDatabase;
pub use notify::{Notice, NoticeLevel, Notifier};
pub use polls::PollService;
pub use state::AppState;
pub use sync::network_monitor::{NetworkMonitor, NetworkStatus};
pub use sync::{ReplayReport, SyncService, SyncStatus};
