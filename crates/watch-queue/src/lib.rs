//! # Watch Queue
//!
//! Intake side of the exporter: watch notifications, the sources that
//! produce them and the discovery of watchable resource kinds.

pub mod discovery;
pub mod event;
pub mod source;

pub use discovery::{ApiResourceEntry, ApiResourceList, ResourceDiscovery, StaticDiscovery};
pub use event::{EventType, RawWatchEvent, WatchEvent};
pub use source::{channel, ChannelSource, ReplaySource, WatchSender, WatchSource};
