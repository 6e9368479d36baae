//! Transport adapters that turn raw feeds into [`Sample`]s.
//!
//! Each adapter is owned by one worker thread which drives the
//! connect / read / backoff loop and publishes into per-channel queues.
//! Adding a transport means implementing [`SourceAdapter`], adding a
//! [`SourceConfig`] variant and wiring it in [`create_adapter`].

mod backoff;
pub mod codec;
mod pubsub;
mod queue;
mod replay;
mod serial;
pub(crate) mod worker;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::Sample;
use crate::error::{FeedError, FeedResult};

pub use backoff::{BackoffPolicy, ReconnectBackoff};
pub use pubsub::{
    LocalBus, LocalSubscription, PubSubAdapter, Subscription, SubscriptionConnector,
};
#[cfg(feature = "pubsub")]
pub use pubsub::ZmqSubscription;
pub use queue::{ChannelQueues, SampleQueue};
pub use replay::ReplayAdapter;
pub use serial::{SerialAdapter, SerialOpener};
pub use worker::SourceHealth;

/// Transport family of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Serial,
    PubSub,
    Replay,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Serial => "serial",
            Self::PubSub => "pubsub",
            Self::Replay => "replay",
        };
        f.write_str(name)
    }
}

/// Description of an established connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceHandle {
    pub source_id: String,
    pub kind: TransportKind,
    pub endpoint: String,
}

/// One physical transport normalized into typed samples.
///
/// `read` returns `Err` carrying [`FeedError::Parse`] for a single malformed
/// record; the adapter stays usable and later records arrive on later calls.
/// Any other error means the transport is gone and the caller reconnects.
pub trait SourceAdapter: Send {
    fn id(&self) -> &str;

    fn kind(&self) -> TransportKind;

    fn connect(&mut self) -> FeedResult<SourceHandle>;

    /// Waits at most roughly `timeout` and returns whatever arrived.
    fn read(&mut self, timeout: Duration) -> FeedResult<Vec<Sample>>;

    /// Releases transport resources. Safe to call repeatedly.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

/// Serializable description of a source, as found in a session config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Serial port, e.g. `/dev/ttyUSB0` or `COM3`.
    Serial {
        id: String,
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },

    /// ZeroMQ SUB socket.
    #[serde(rename = "zmq")]
    ZeroMq {
        id: String,
        /// e.g. `tcp://127.0.0.1:5556`
        endpoint: String,
        /// Prefix filter; empty subscribes to everything.
        #[serde(default)]
        topic: String,
    },

    /// Recorded NDJSON or JSON-array file played back as a live feed.
    Replay {
        id: String,
        path: PathBuf,
        #[serde(default = "default_replay_speed")]
        speed: f64,
        #[serde(default = "default_true")]
        realtime: bool,
        #[serde(default)]
        loop_playback: bool,
        #[serde(default = "default_replay_interval_ms")]
        default_interval_ms: u64,
    },
}

impl SourceConfig {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Serial { id, .. } | Self::ZeroMq { id, .. } | Self::Replay { id, .. } => id,
        }
    }

    #[must_use]
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Serial { .. } => TransportKind::Serial,
            Self::ZeroMq { .. } => TransportKind::PubSub,
            Self::Replay { .. } => TransportKind::Replay,
        }
    }

    pub fn validate(&self) -> FeedResult<()> {
        if self.id().trim().is_empty() {
            return Err(FeedError::Configuration(
                "source id must not be empty".to_owned(),
            ));
        }
        match self {
            Self::Serial { port, baud_rate, .. } => {
                if port.trim().is_empty() {
                    return Err(FeedError::Configuration(format!(
                        "serial source `{}` needs a port",
                        self.id()
                    )));
                }
                if *baud_rate == 0 {
                    return Err(FeedError::Configuration(format!(
                        "serial source `{}` baud rate must be > 0",
                        self.id()
                    )));
                }
            }
            Self::ZeroMq { endpoint, .. } => {
                if endpoint.trim().is_empty() {
                    return Err(FeedError::Configuration(format!(
                        "zmq source `{}` needs an endpoint",
                        self.id()
                    )));
                }
            }
            Self::Replay { speed, .. } => {
                if !speed.is_finite() || *speed <= 0.0 {
                    return Err(FeedError::Configuration(format!(
                        "replay source `{}` speed must be finite and > 0",
                        self.id()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Builds the adapter described by `config`.
///
/// Transports compiled out of this build yield a configuration error.
#[cfg_attr(not(feature = "serial"), allow(unused_variables))]
pub fn create_adapter(
    config: &SourceConfig,
    read_timeout: Duration,
) -> FeedResult<Box<dyn SourceAdapter>> {
    config.validate()?;
    match config {
        #[cfg(feature = "serial")]
        SourceConfig::Serial {
            id,
            port,
            baud_rate,
        } => Ok(Box::new(SerialAdapter::open_port(
            id,
            port,
            *baud_rate,
            read_timeout,
        ))),
        #[cfg(not(feature = "serial"))]
        SourceConfig::Serial { id, .. } => Err(FeedError::Configuration(format!(
            "serial source `{id}` requires the `serial` feature"
        ))),
        #[cfg(feature = "pubsub")]
        SourceConfig::ZeroMq {
            id,
            endpoint,
            topic,
        } => Ok(Box::new(PubSubAdapter::zmq(id, endpoint, topic))),
        #[cfg(not(feature = "pubsub"))]
        SourceConfig::ZeroMq { id, .. } => Err(FeedError::Configuration(format!(
            "zmq source `{id}` requires the `pubsub` feature"
        ))),
        SourceConfig::Replay {
            id,
            path,
            speed,
            realtime,
            loop_playback,
            default_interval_ms,
        } => {
            let adapter = ReplayAdapter::new(id, path.clone(), *speed)?
                .with_realtime(*realtime)
                .with_loop(*loop_playback)
                .with_default_interval(Duration::from_millis(*default_interval_ms));
            Ok(Box::new(adapter))
        }
    }
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_replay_speed() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_replay_interval_ms() -> u64 {
    500
}
