//! Blocking request/reply round trips for region clients.

use crate::command::{CommandRecord, Reply};
use crate::error::{ShmError, ShmResult};
use crate::region::SharedMemoryRegion;
use plcio_common::consts::DEFAULT_REPLY_TIMEOUT_MS;
use std::time::{Duration, Instant};
use tracing::debug;

/// Client side of a region's command channel.
///
/// The channel holds one record, so a region supports one outstanding
/// request at a time.
#[derive(Debug)]
pub struct RegionClient {
    region: SharedMemoryRegion,
    timeout: Duration,
}

impl RegionClient {
    /// Attach to region `name` with the default reply timeout.
    pub fn attach(name: &str) -> ShmResult<Self> {
        Ok(Self::new(SharedMemoryRegion::attach(name)?))
    }

    /// Wrap an attached region.
    pub fn new(region: SharedMemoryRegion) -> Self {
        Self {
            region,
            timeout: Duration::from_millis(DEFAULT_REPLY_TIMEOUT_MS),
        }
    }

    /// Replace the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reply timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Underlying region.
    pub fn region(&self) -> &SharedMemoryRegion {
        &self.region
    }

    /// Submit `cmd` and wait for its reply.
    ///
    /// # Errors
    ///
    /// `ReplyTimeout` if no reply arrives within the timeout.
    pub fn request(&self, cmd: &CommandRecord) -> ShmResult<Reply> {
        self.request_within(cmd, self.timeout)
    }

    /// Submit `cmd` and wait up to `timeout` for its reply.
    pub fn request_within(&self, cmd: &CommandRecord, timeout: Duration) -> ShmResult<Reply> {
        self.region.submit_request(cmd)?;
        match self.region.wait_reply(timeout)? {
            Some(record) => Ok(Reply::from_record(&record)),
            None => Err(ShmError::ReplyTimeout { timeout }),
        }
    }

    /// Round-trip a PING and return its latency.
    pub fn ping(&self, timeout: Duration) -> ShmResult<Duration> {
        let start = Instant::now();
        let reply = self.request_within(&CommandRecord::ping(), timeout)?;
        let rtt = start.elapsed();
        debug!("PING {} -> {:?} in {:?}", self.region.name(), reply, rtt);
        match reply {
            Reply::Pong => Ok(rtt),
            reply => Err(ShmError::UnexpectedReply { reply }),
        }
    }

    /// Ask the dispatch loop to stop.
    pub fn exit(&self) -> ShmResult<Reply> {
        self.request(&CommandRecord::exit())
    }
}
