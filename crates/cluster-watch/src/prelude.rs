//! Common imports for typical watch usage.
pub use crate::{
    Cluster, ClusterConfig, SessionHandle, StaticClusterConfig, Watch, WatchBuilder, WatchError,
    WatchEvent, WatchEventType, WatchOptions, WatchStream,
};
