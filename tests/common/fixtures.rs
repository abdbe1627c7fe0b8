//! Client fixtures
//!
//! `TestClient` is a fully assembled `AppState` whose backend, notices and
//! haptics can be inspected from the test.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tripsync::client::api::MemoryBackend;
use tripsync::client::config::Config;
use tripsync::client::local_db::LocalDatabase;
use tripsync::client::notify::{Haptics, NoticeLog};
use tripsync::client::state::AppState;
use tripsync::shared::config::{AppConfig, SyncSettings};
use tripsync::shared::poll::{NewPoll, Poll, PollOption};

pub const TRIP: &str = "trip-1";
pub const CREATOR: &str = "alice";

/// Counts haptic calls
#[derive(Debug, Default)]
pub struct CountingHaptics {
    pub light: AtomicUsize,
    pub success: AtomicUsize,
}

impl CountingHaptics {
    pub fn light_count(&self) -> usize {
        self.light.load(Ordering::SeqCst)
    }

    pub fn success_count(&self) -> usize {
        self.success.load(Ordering::SeqCst)
    }
}

impl Haptics for CountingHaptics {
    fn light(&self) {
        self.light.fetch_add(1, Ordering::SeqCst);
    }

    fn success(&self) {
        self.success.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct TestClient {
    pub state: AppState,
    pub backend: Arc<MemoryBackend>,
    pub notices: Arc<NoticeLog>,
    pub haptics: Arc<CountingHaptics>,
}

impl TestClient {
    /// Client over an in-memory database with its own backend
    pub async fn new() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()), SyncSettings::default()).await
    }

    pub async fn with_backend(backend: Arc<MemoryBackend>, settings: SyncSettings) -> Self {
        let db = LocalDatabase::in_memory()
            .await
            .expect("Failed to create in-memory database");
        Self::assemble(Arc::new(db), backend, settings)
    }

    /// Client over a database file, to exercise restarts
    pub async fn on_disk(path: &Path, backend: Arc<MemoryBackend>) -> Self {
        let db = LocalDatabase::open(path)
            .await
            .expect("Failed to open database file");
        Self::assemble(Arc::new(db), backend, SyncSettings::default())
    }

    fn assemble(db: Arc<LocalDatabase>, backend: Arc<MemoryBackend>, settings: SyncSettings) -> Self {
        let config = Config::with_builder(AppConfig::builder().demo_mode(true).sync(settings))
            .expect("Demo config is valid");
        let notices = Arc::new(NoticeLog::new());
        let haptics = Arc::new(CountingHaptics::default());
        let state = AppState::assemble(
            config,
            db,
            backend.clone(),
            notices.clone(),
            haptics.clone(),
        );

        Self {
            state,
            backend,
            notices,
            haptics,
        }
    }

    pub fn go_offline(&self) {
        self.state.network.set_reported(false);
    }

    pub fn go_online(&self) {
        self.state.network.set_reported(true);
    }

    /// Seed a poll on the server and load it into the client
    pub async fn load_poll(&self, poll: Poll) -> Poll {
        self.backend.seed_poll(poll.clone()).await;
        self.state.polls.fetch_polls(&poll.trip_id).await;
        self.state
            .polls
            .poll(&poll.trip_id, &poll.id)
            .await
            .expect("Seeded poll is loaded")
    }
}

/// Poll with options `opt-1`.. named after `texts`
pub fn poll_with_options(id: &str, texts: &[&str], allow_multiple: bool) -> Poll {
    let request = NewPoll {
        question: "Where should we eat?".to_string(),
        options: texts.iter().map(|t| t.to_string()).collect(),
        allow_multiple,
        allow_vote_change: true,
    };
    let mut poll = Poll::from_new(id, TRIP, CREATOR, &request).expect("Valid poll request");
    poll.options = texts
        .iter()
        .enumerate()
        .map(|(i, text)| PollOption::new(format!("opt-{}", i + 1), *text))
        .collect();
    poll
}

pub fn ids(options: &[&str]) -> Vec<String> {
    options.iter().map(|o| o.to_string()).collect()
}
