//! Services shared by every connection

use std::sync::Arc;

use crate::media::{FilenameGenerator, VideoSink};
use crate::registry::SessionRegistry;
use crate::stats::RelayStats;

use super::config::ServerConfig;

/// Everything a session needs besides its own socket
pub struct RelayContext {
    pub config: ServerConfig,
    pub registry: Arc<SessionRegistry>,
    pub stats: Arc<RelayStats>,
    pub sink: Arc<dyn VideoSink>,
    pub names: Arc<dyn FilenameGenerator>,
}

impl RelayContext {
    pub fn new(
        config: ServerConfig,
        sink: Arc<dyn VideoSink>,
        names: Arc<dyn FilenameGenerator>,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            stats: Arc::new(RelayStats::new()),
            sink,
            names,
        }
    }
}
