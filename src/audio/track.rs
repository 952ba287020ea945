use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Snapshot of what is known about a queued track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub query: String,
    pub title: Option<String>,
    pub artwork: Option<String>,
}

impl TrackInfo {
    /// Title if known, otherwise the raw query.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.query)
    }
}

/// Receives the lifecycle notices of a single track.
///
/// Implementations must not block: they are called from the session's
/// event loop.
pub trait TrackEvents: Send + Sync {
    fn started(&self, track: &TrackInfo, up_next: Option<&str>);
    fn finished(&self, track: &TrackInfo);
    fn failed(&self, track: &TrackInfo, error: &str);
}

/// Hands out a fresh [`TrackEvents`] for every track queued from one place
/// (a text channel, usually).
pub trait NotificationSink: Send + Sync {
    fn track_events(&self) -> Arc<dyn TrackEvents>;
}

/// Where a track is in its notification lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Pending,
    Started,
    Finished,
    Errored,
}

impl Lifecycle {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Errored)
    }
}

/// A queue entry: a raw query plus lazily filled metadata.
///
/// Each notice fires at most once, and at most one of `finished`/`failed`
/// ever fires.
pub struct Track {
    query: String,
    meta: Mutex<(Option<String>, Option<String>)>,
    lifecycle: Mutex<Lifecycle>,
    events: Arc<dyn TrackEvents>,
}

impl Track {
    pub fn new(
        query: impl Into<String>,
        title: Option<String>,
        artwork: Option<String>,
        events: Arc<dyn TrackEvents>,
    ) -> Arc<Self> {
        Arc::new(Self {
            query: query.into(),
            meta: Mutex::new((title, artwork)),
            lifecycle: Mutex::new(Lifecycle::Pending),
            events,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn title(&self) -> Option<String> {
        self.meta.lock().0.clone()
    }

    pub fn artwork(&self) -> Option<String> {
        self.meta.lock().1.clone()
    }

    pub fn info(&self) -> TrackInfo {
        let meta = self.meta.lock();
        TrackInfo {
            query: self.query.clone(),
            title: meta.0.clone(),
            artwork: meta.1.clone(),
        }
    }

    /// Fills in metadata that was not known when the track was queued.
    pub fn fill_metadata(&self, title: Option<String>, artwork: Option<String>) {
        let mut meta = self.meta.lock();
        if meta.0.is_none() {
            meta.0 = title;
        }
        if meta.1.is_none() {
            meta.1 = artwork;
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    /// Fires `started` once. Returns whether the notice was delivered.
    pub fn notify_start(&self, up_next: Option<&str>) -> bool {
        if !self.advance(|state| state == Lifecycle::Pending, Lifecycle::Started) {
            return false;
        }
        self.events.started(&self.info(), up_next);
        true
    }

    pub fn notify_finish(&self) -> bool {
        if !self.advance(|state| !state.is_terminal(), Lifecycle::Finished) {
            return false;
        }
        self.events.finished(&self.info());
        true
    }

    pub fn notify_error(&self, error: &str) -> bool {
        if !self.advance(|state| !state.is_terminal(), Lifecycle::Errored) {
            return false;
        }
        self.events.failed(&self.info(), error);
        true
    }

    fn advance(&self, allowed: impl FnOnce(Lifecycle) -> bool, next: Lifecycle) -> bool {
        let mut state = self.lifecycle.lock();
        if !allowed(*state) {
            debug!(
                "🔁 Ignoring {:?} notice for `{}` in state {:?}",
                next, self.query, *state
            );
            return false;
        }
        *state = next;
        true
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("query", &self.query)
            .field("title", &self.title())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
