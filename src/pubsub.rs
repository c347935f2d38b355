//! Game events shared between server processes.
//!
//! [`Db::broadcast`](crate::db::Db::broadcast) is the publishing side. Each
//! process runs one [`Broadcaster`], which keeps a dedicated connection
//! listening on [`PUBSUB_CHANNEL`] and hands every notification to its
//! [`EventHub`]. The hub calls only the handlers registered for that event's
//! game.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::PUBSUB_CHANNEL;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    #[serde(rename(serialize = "gameId", deserialize = "game_id"))]
    pub game_id: i32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Read a notification payload (a JSON `pubsub` row) as a game event.
pub fn parse_notification(payload: &str) -> Option<GameEvent> {
    serde_json::from_str(payload).ok()
}

pub type Handler = Arc<dyn Fn(&GameEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Process-local registry of event handlers, keyed by game id.
#[derive(Default)]
pub struct EventHub {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<i32, Vec<(SubscriptionId, Handler)>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `handler` for every event of `game_id` until [`EventHub::off`].
    pub fn on<F>(&self, game_id: i32, handler: F) -> SubscriptionId
    where
        F: Fn(&GameEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(game_id)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns whether the subscription existed.
    pub fn off(&self, game_id: i32, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = handlers.get_mut(&game_id) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            handlers.remove(&game_id);
        }
        removed
    }

    /// Forward events of `game_id` into a channel, e.g. one per websocket.
    ///
    /// The returned receiver sees nothing once the subscription is removed.
    pub fn subscribe(&self, game_id: i32) -> (SubscriptionId, mpsc::UnboundedReceiver<GameEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.on(game_id, move |event| {
            // a closed receiver just means the consumer went away
            let _ = tx.send(event.clone());
        });
        (id, rx)
    }

    pub fn subscriber_count(&self, game_id: i32) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&game_id)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to the handlers of its game. Returns how many ran.
    ///
    /// Handlers run outside the registry lock, so they may subscribe or
    /// unsubscribe themselves.
    pub fn dispatch(&self, event: &GameEvent) -> usize {
        let targets: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.game_id)
            .map(|subscribers| subscribers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in &targets {
            handler(event);
        }
        targets.len()
    }

    /// Parse and deliver a raw notification payload. Unreadable payloads are dropped.
    pub fn dispatch_payload(&self, payload: &str) -> usize {
        match parse_notification(payload) {
            Some(event) => self.dispatch(&event),
            None => {
                tracing::debug!(payload, "dropping unreadable event notification");
                0
            }
        }
    }
}

/// Reconnect delays for the listening connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
    }
}

/// Listens for game events from every server process and re-emits them locally.
pub struct Broadcaster {
    pool: PgPool,
    hub: Arc<EventHub>,
    listening: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Broadcaster {
    /// `pool` only supplies connection settings; the listener opens its own connection.
    pub fn new(pool: &PgPool) -> Self {
        Self {
            pool: pool.clone(),
            hub: Arc::new(EventHub::new()),
            listening: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn hub(&self) -> Arc<EventHub> {
        Arc::clone(&self.hub)
    }

    pub fn on<F>(&self, game_id: i32, handler: F) -> SubscriptionId
    where
        F: Fn(&GameEvent) + Send + Sync + 'static,
    {
        self.hub.on(game_id, handler)
    }

    pub fn off(&self, game_id: i32, id: SubscriptionId) -> bool {
        self.hub.off(game_id, id)
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Start listening. Calling this again while listening does nothing.
    ///
    /// If the first connection cannot be made the broadcaster stays idle and
    /// the error is returned, so the call can be retried.
    pub async fn listen(&self) -> Result<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let dedicated = self.dedicated_pool();
        let listener = match open_listener(&dedicated).await {
            Ok(listener) => listener,
            Err(e) => {
                self.listening.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        tracing::info!(channel = PUBSUB_CHANNEL, "listening for game events");

        let handle = tokio::spawn(receive_loop(listener, dedicated, Arc::clone(&self.hub)));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    // a one-connection pool of its own keeps the listener out of the shared pool
    fn dedicated_pool(&self) -> PgPool {
        let options = (*self.pool.connect_options()).clone();
        PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(options)
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

async fn open_listener(pool: &PgPool) -> Result<PgListener> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(PUBSUB_CHANNEL).await?;
    Ok(listener)
}

/// Retry `connect` until it succeeds, sleeping `backoff` between attempts.
/// The backoff starts over once a connection is made.
async fn retry_with_backoff<T, F, Fut>(backoff: &mut Backoff, mut connect: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    loop {
        match connect().await {
            Ok(value) => {
                backoff.reset();
                return value;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!("event listener reconnect failed, retrying in {delay:?}: {e}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn receive_loop(mut listener: PgListener, pool: PgPool, hub: Arc<EventHub>) {
    let mut backoff = Backoff::default();
    loop {
        match listener.try_recv().await {
            Ok(Some(notification)) => {
                hub.dispatch_payload(notification.payload());
                continue;
            }
            Ok(None) => tracing::warn!("event listener connection lost, reconnecting"),
            Err(e) => tracing::warn!("event listener failed, reconnecting: {e}"),
        }

        // the pool holds a single connection, release it before asking for another
        drop(listener);
        listener = retry_with_backoff(&mut backoff, || open_listener(&pool)).await;
        tracing::info!(channel = PUBSUB_CHANNEL, "event listener reconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(hub: &EventHub, game_id: i32) -> (SubscriptionId, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let id = hub.on(game_id, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (id, hits)
    }

    #[test]
    fn parses_stored_row_payload() {
        let payload = r#"{"id":12,"game_id":5,"type":"start","data":{"q":1},"created_at":"2024-01-01T00:00:00+00:00"}"#;
        let event = parse_notification(payload).unwrap();

        assert_eq!(event.game_id, 5);
        assert_eq!(event.kind, "start");
        assert_eq!(event.data, serde_json::json!({"q": 1}));
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(parse_notification("not json").is_none());
        assert!(parse_notification("null").is_none());
        assert!(parse_notification(r#"{"type":"start"}"#).is_none());
        assert!(parse_notification(r#"{"game_id":"five","type":"start"}"#).is_none());
    }

    #[test]
    fn missing_data_reads_as_null() {
        let event = parse_notification(r#"{"game_id":1,"type":"join"}"#).unwrap();
        assert_eq!(event.data, serde_json::Value::Null);
    }

    #[test]
    fn event_serializes_with_camel_case_game_id() {
        let event = GameEvent {
            game_id: 3,
            kind: "answer".into(),
            data: serde_json::json!({}),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json, serde_json::json!({"gameId": 3, "type": "answer", "data": {}}));
    }

    #[test]
    fn dispatch_reaches_only_the_events_game() {
        let hub = EventHub::new();
        let (_, game5) = counter(&hub, 5);
        let (_, game6) = counter(&hub, 6);

        let delivered = hub.dispatch_payload(r#"{"game_id":5,"type":"start","data":{}}"#);

        assert_eq!(delivered, 1);
        assert_eq!(game5.load(Ordering::SeqCst), 1);
        assert_eq!(game6.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn every_subscriber_of_a_game_is_called() {
        let hub = EventHub::new();
        let (_, a) = counter(&hub, 1);
        let (_, b) = counter(&hub, 1);

        let event = GameEvent {
            game_id: 1,
            kind: "next".into(),
            data: serde_json::Value::Null,
        };
        assert_eq!(hub.dispatch(&event), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unreadable_payload_reaches_nobody() {
        let hub = EventHub::new();
        let (_, hits) = counter(&hub, 5);

        assert_eq!(hub.dispatch_payload("{broken"), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn off_removes_only_that_subscription() {
        let hub = EventHub::new();
        let (first, first_hits) = counter(&hub, 2);
        let (_, second_hits) = counter(&hub, 2);

        assert!(hub.off(2, first));
        assert!(!hub.off(2, first));
        assert!(!hub.off(99, first));
        assert_eq!(hub.subscriber_count(2), 1);

        hub.dispatch_payload(r#"{"game_id":2,"type":"x"}"#);
        assert_eq!(first_hits.load(Ordering::SeqCst), 0);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_dispatch() {
        let hub = Arc::new(EventHub::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::default();

        let inner_hub = Arc::clone(&hub);
        let inner_slot = Arc::clone(&slot);
        let id = hub.on(4, move |event| {
            if let Some(id) = *inner_slot.lock().unwrap() {
                inner_hub.off(event.game_id, id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        assert_eq!(hub.dispatch_payload(r#"{"game_id":4,"type":"end"}"#), 1);
        assert_eq!(hub.subscriber_count(4), 0);
        assert_eq!(hub.dispatch_payload(r#"{"game_id":4,"type":"end"}"#), 0);
    }

    #[tokio::test]
    async fn subscribe_forwards_events_into_a_channel() {
        let hub = EventHub::new();
        let (id, mut rx) = hub.subscribe(8);

        hub.dispatch_payload(r#"{"game_id":8,"type":"join","data":{"name":"ann"}}"#);
        hub.dispatch_payload(r#"{"game_id":9,"type":"join"}"#);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "join");
        assert_eq!(event.data["name"], "ann");
        assert!(rx.try_recv().is_err());

        assert!(hub.off(8, id));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn concurrent_registration_and_dispatch() {
        let hub = Arc::new(EventHub::new());
        let total = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let hub = Arc::clone(&hub);
                let total = Arc::clone(&total);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let total = Arc::clone(&total);
                        let id = hub.on(1, move |_| {
                            total.fetch_add(1, Ordering::SeqCst);
                        });
                        hub.dispatch_payload(r#"{"game_id":1,"type":"tick"}"#);
                        assert!(hub.off(1, id));
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(hub.subscriber_count(1), 0);
        // each dispatch sees at least the handler its own thread registered
        assert!(total.load(Ordering::SeqCst) >= 400);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn reconnect_retries_until_connected_then_resets_backoff() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(8));
        let mut attempts = 0;

        let connected = retry_with_backoff(&mut backoff, || {
            attempts += 1;
            let refused = attempts < 3;
            async move {
                if refused {
                    Err(color_eyre::eyre::eyre!("connection refused"))
                } else {
                    Ok("listener")
                }
            }
        })
        .await;

        assert_eq!(connected, "listener");
        assert_eq!(attempts, 3);
        assert_eq!(backoff.next_delay(), Duration::from_millis(1));
    }
}
