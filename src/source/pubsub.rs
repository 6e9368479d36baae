use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::core::Sample;
use crate::error::{FeedError, FeedResult};
use crate::source::codec::parse_payload;
use crate::source::{SourceAdapter, SourceHandle, TransportKind};

const LOCAL_SUBSCRIBER_CAPACITY: usize = 1024;

/// An open message subscription.
pub trait Subscription: Send {
    /// Waits up to `timeout` for one message body. `Ok(None)` on timeout.
    fn recv(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>>;
}

/// Opens a fresh subscription on every (re)connect.
pub type SubscriptionConnector = Box<dyn FnMut() -> io::Result<Box<dyn Subscription>> + Send>;

/// Publish/subscribe adapter; one message per `read`.
pub struct PubSubAdapter {
    id: String,
    endpoint: String,
    topic: String,
    connector: SubscriptionConnector,
    subscription: Option<Box<dyn Subscription>>,
}

impl PubSubAdapter {
    pub fn new(id: &str, endpoint: &str, topic: &str, connector: SubscriptionConnector) -> Self {
        Self {
            id: id.to_owned(),
            endpoint: endpoint.to_owned(),
            topic: topic.to_owned(),
            connector,
            subscription: None,
        }
    }

    /// Subscribes to `topic` on an in-process bus.
    pub fn local(id: &str, bus: &LocalBus, topic: &str) -> Self {
        let bus = bus.clone();
        let filter = topic.to_owned();
        let connector: SubscriptionConnector = Box::new(move || {
            bus.subscribe(&filter)
                .map(|subscription| Box::new(subscription) as Box<dyn Subscription>)
        });
        Self::new(id, "local", topic, connector)
    }

    /// Subscribes to `topic` on a ZeroMQ publisher.
    #[cfg(feature = "pubsub")]
    pub fn zmq(id: &str, endpoint: &str, topic: &str) -> Self {
        let target = endpoint.to_owned();
        let filter = topic.to_owned();
        let connector: SubscriptionConnector = Box::new(move || {
            ZmqSubscription::connect(&target, &filter)
                .map(|subscription| Box::new(subscription) as Box<dyn Subscription>)
        });
        Self::new(id, endpoint, topic, connector)
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl SourceAdapter for PubSubAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::PubSub
    }

    fn connect(&mut self) -> FeedResult<SourceHandle> {
        if self.subscription.is_none() {
            let subscription = (self.connector)().map_err(|e| {
                FeedError::connection(&self.id, format!("subscribe to {} failed: {e}", self.endpoint))
            })?;
            self.subscription = Some(subscription);
            info!(
                source = %self.id,
                endpoint = %self.endpoint,
                topic = %self.topic,
                "subscribed"
            );
        }
        Ok(SourceHandle {
            source_id: self.id.clone(),
            kind: TransportKind::PubSub,
            endpoint: self.endpoint.clone(),
        })
    }

    fn read(&mut self, timeout: Duration) -> FeedResult<Vec<Sample>> {
        let Some(subscription) = self.subscription.as_mut() else {
            return Err(FeedError::connection(&self.id, "not subscribed"));
        };
        match subscription.recv(timeout) {
            Ok(Some(payload)) => parse_payload(&payload),
            Ok(None) => Ok(Vec::new()),
            Err(err) => {
                self.subscription = None;
                Err(FeedError::connection(&self.id, err.to_string()))
            }
        }
    }

    fn disconnect(&mut self) {
        if self.subscription.take().is_some() {
            debug!(source = %self.id, endpoint = %self.endpoint, "unsubscribed");
        }
    }

    fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }
}

/// In-process publish/subscribe hub.
///
/// Topics match by prefix; an empty filter receives everything. Slow
/// subscribers lose messages instead of blocking publishers. Closing the bus
/// disconnects every subscriber and refuses new ones until reopened.
#[derive(Debug, Clone, Default)]
pub struct LocalBus {
    state: Arc<Mutex<BusState>>,
}

#[derive(Debug, Default)]
struct BusState {
    subscribers: Vec<(String, Sender<Vec<u8>>)>,
    closed: bool,
}

impl LocalBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `payload` to every matching subscriber; returns how many got it.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> usize {
        let payload = payload.into();
        let mut state = self.state.lock();
        if state.closed {
            return 0;
        }
        let mut delivered = 0;
        state.subscribers.retain(|(filter, tx)| {
            if !topic.starts_with(filter.as_str()) {
                return true;
            }
            match tx.try_send(payload.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    trace!(topic, "local subscriber full, message dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
        delivered
    }

    pub fn publish_json<T: Serialize>(&self, topic: &str, message: &T) -> FeedResult<usize> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| FeedError::Parse(format!("failed to encode message: {e}")))?;
        Ok(self.publish(topic, payload))
    }

    pub fn subscribe(&self, topic_filter: &str) -> io::Result<LocalSubscription> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "local bus is closed",
            ));
        }
        let (tx, rx) = channel::bounded(LOCAL_SUBSCRIBER_CAPACITY);
        state.subscribers.push((topic_filter.to_owned(), tx));
        Ok(LocalSubscription { rx })
    }

    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.subscribers.clear();
    }

    pub fn reopen(&self) {
        self.state.lock().closed = false;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

/// Receiving end of a [`LocalBus`] subscription.
#[derive(Debug)]
pub struct LocalSubscription {
    rx: Receiver<Vec<u8>>,
}

impl Subscription for LocalSubscription {
    fn recv(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        match self.rx.recv_timeout(timeout) {
            Ok(payload) => Ok(Some(payload)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "local bus closed",
            )),
        }
    }
}

/// ZeroMQ SUB socket driven by a private current-thread runtime.
#[cfg(feature = "pubsub")]
pub struct ZmqSubscription {
    runtime: tokio::runtime::Runtime,
    socket: zeromq::SubSocket,
}

#[cfg(feature = "pubsub")]
impl ZmqSubscription {
    pub fn connect(endpoint: &str, topic: &str) -> io::Result<Self> {
        use zeromq::Socket;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()?;
        let socket = runtime.block_on(async {
            let mut socket = zeromq::SubSocket::new();
            socket.connect(endpoint).await.map_err(|e| io::Error::other(e.to_string()))?;
            socket.subscribe(topic).await.map_err(|e| io::Error::other(e.to_string()))?;
            Ok::<_, io::Error>(socket)
        })?;
        Ok(Self { runtime, socket })
    }
}

#[cfg(feature = "pubsub")]
impl Subscription for ZmqSubscription {
    fn recv(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        use zeromq::SocketRecv;

        let socket = &mut self.socket;
        let received = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, socket.recv()).await });
        match received {
            Err(_elapsed) => Ok(None),
            Ok(Ok(message)) => {
                // Multipart messages carry the topic first and the body last.
                let frames = message.into_vec();
                Ok(frames.last().map(|frame| frame.to_vec()))
            }
            Ok(Err(err)) => Err(io::Error::other(err.to_string())),
        }
    }
}
