//! Runtime core and thread management.
//!
//! `PlcioCore` owns the hosted region (if any), the driver manager and the
//! worker threads:
//!
//! - one poll thread per Modbus driver, refreshing its buffer at the
//!   polling interval
//! - one updater thread per scheduled `ProcessUpdater`
//! - the dispatch loop of the hosted region, on the calling thread
//!
//! Every loop watches the same running flag. Cancellation is cooperative: a
//! cycle in flight always finishes.

use crate::error::HalError;
use crate::manager::DriverManager;
use crate::process::{ProcessReader, ProcessWriter};
use plcio_common::config::{ConfigLoader, PlcioConfig};
use plcio_common::driver::Driver;
use plcio_shared_memory::{CommandDispatcher, SharedMemoryRegion};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Timing statistics for one periodic loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopStats {
    /// Number of cycles executed
    pub cycle_count: u64,
    /// Number of cycles that overran the period
    pub timing_violations: u64,
    /// Number of cycles whose work failed
    pub failures: u64,
    /// Maximum observed cycle time
    pub max_cycle_time_us: u64,
}

/// Run `work` every `period` until `running` drops.
fn periodic(
    label: &str,
    running: &AtomicBool,
    period: Duration,
    mut work: impl FnMut() -> Result<(), plcio_common::driver::DriverError>,
) -> LoopStats {
    let mut stats = LoopStats::default();

    while running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();

        if let Err(e) = work() {
            stats.failures += 1;
            if stats.failures <= 10 || stats.failures % 1000 == 0 {
                warn!("{} failed (#{}): {}", label, stats.failures, e);
            }
        }

        let elapsed = cycle_start.elapsed();
        let cycle_time_us = elapsed.as_micros() as u64;
        stats.cycle_count += 1;
        stats.max_cycle_time_us = stats.max_cycle_time_us.max(cycle_time_us);

        if elapsed < period {
            std::thread::sleep(period - elapsed);
        } else {
            stats.timing_violations += 1;
            if stats.timing_violations <= 10 || stats.timing_violations % 1000 == 0 {
                warn!(
                    "{}: timing violation #{}: cycle took {}us (target {}us)",
                    label,
                    stats.timing_violations,
                    cycle_time_us,
                    period.as_micros()
                );
            }
        }

        if stats.cycle_count % 1000 == 0 {
            debug!(
                "{}: {} cycles, max={}us, violations={}, failures={}",
                label, stats.cycle_count, stats.max_cycle_time_us, stats.timing_violations, stats.failures
            );
        }
    }

    stats
}

/// plcio runtime.
pub struct PlcioCore {
    config: PlcioConfig,
    running: Arc<AtomicBool>,
    region: Option<SharedMemoryRegion>,
    manager: Option<DriverManager>,
    workers: Vec<(String, JoinHandle<LoopStats>)>,
}

impl PlcioCore {
    /// Runtime for a validated configuration.
    ///
    /// # Errors
    /// Returns `HalError::Config` if validation fails.
    pub fn new(config: PlcioConfig) -> Result<Self, HalError> {
        config.validate()?;

        info!(
            "PlcioCore created for '{}' with {} connections, {} updaters, server={}",
            config.shared.service_name,
            config.connections.len(),
            config.updaters.len(),
            config.server.is_some()
        );

        Ok(Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            region: None,
            manager: None,
            workers: Vec::new(),
        })
    }

    /// Load configuration from a TOML file.
    pub fn load_config(path: &Path) -> Result<PlcioConfig, HalError> {
        info!("Loading configuration from {:?}", path);
        Ok(PlcioConfig::load(path)?)
    }

    /// Create the hosted region, then open every connection.
    ///
    /// The region comes first so that `shm` connections to it can attach.
    pub fn init(&mut self) -> Result<(), HalError> {
        if let Some(server) = &self.config.server {
            let region = SharedMemoryRegion::create(&server.segment)?;
            info!("Hosting region '{}'", region.name());
            self.region = Some(region);
        }

        let mut manager = DriverManager::with_builtin();
        if let Err(e) = manager.open_all(&self.config.connections) {
            if let Some(region) = self.region.take() {
                if let Err(destroy) = region.destroy() {
                    warn!("Failed to remove region after startup error: {}", destroy);
                }
            }
            return Err(e);
        }
        self.manager = Some(manager);

        info!("PlcioCore initialized successfully");
        Ok(())
    }

    /// Reader over every open connection.
    pub fn reader(&self) -> Result<ProcessReader, HalError> {
        Ok(self.manager()?.reader())
    }

    /// Writer over every open connection.
    pub fn writer(&self) -> Result<ProcessWriter, HalError> {
        Ok(self.manager()?.writer())
    }

    fn manager(&self) -> Result<&DriverManager, HalError> {
        self.manager.as_ref().ok_or(HalError::NotInitialized)
    }

    fn spawn(
        &mut self,
        name: String,
        period: Duration,
        work: impl FnMut() -> Result<(), plcio_common::driver::DriverError> + Send + 'static,
    ) -> Result<(), HalError> {
        let running = Arc::clone(&self.running);
        let label = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || periodic(&label, &running, period, work))
            .map_err(|source| HalError::Spawn {
                thread: name.clone(),
                source,
            })?;
        self.workers.push((name, handle));
        Ok(())
    }

    /// Start poll and updater threads.
    pub fn start(&mut self) -> Result<(), HalError> {
        let manager = self.manager()?;
        let pollers = manager.pollers();
        let updaters = manager.updaters(&self.config.updaters)?;

        self.running.store(true, Ordering::SeqCst);

        for (id, driver) in pollers {
            let period = driver
                .as_modbus()
                .map(|modbus| modbus.polling_interval())
                .unwrap_or(Duration::from_millis(plcio_common::consts::DEFAULT_POLL_INTERVAL_MS));
            self.spawn(format!("poll-{id}"), period, move || driver.buffer().refresh())?;
        }

        for updater in updaters {
            let name = format!("update-{}", updater.connection_id());
            let period = updater.interval();
            self.spawn(name, period, move || updater.update())?;
        }

        info!("Started {} worker threads", self.workers.len());
        Ok(())
    }

    /// Start workers and block until shutdown is requested.
    ///
    /// With a hosted region this runs its dispatch loop, which also returns
    /// on `EXIT`; otherwise it waits for the running flag to drop.
    pub fn run(&mut self) -> Result<(), HalError> {
        self.start()?;

        if detect_rt_mode() {
            info!("Running in real-time mode");
        } else {
            info!("Running in standard (non-RT) mode");
        }

        let result = match self.region.take() {
            Some(region) => {
                let tick = self
                    .config
                    .server
                    .as_ref()
                    .map(|server| server.cycle_time())
                    .unwrap_or(plcio_common::prelude::DEFAULT_CYCLE_TIME);
                let mut dispatcher = CommandDispatcher::new(region);
                let result = dispatcher.run(&self.running, tick);
                self.region = Some(dispatcher.into_region());
                result.map(|stats| {
                    info!(
                        "Dispatch loop stopped after {} cycles ({} served, {} rejected, {} overruns)",
                        stats.cycles, stats.served, stats.rejected, stats.overruns
                    );
                })
            }
            None => {
                while self.running.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Ok(())
            }
        };

        self.running.store(false, Ordering::SeqCst);
        Ok(result?)
    }

    /// Stop workers, join them and remove the hosted region.
    pub fn shutdown(&mut self) -> Result<(), HalError> {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);

        for (name, handle) in self.workers.drain(..) {
            match handle.join() {
                Ok(stats) => debug!(
                    "{} stopped after {} cycles (violations: {}, failures: {})",
                    name, stats.cycle_count, stats.timing_violations, stats.failures
                ),
                Err(_) => warn!("{} panicked", name),
            }
        }

        self.manager = None;
        if let Some(region) = self.region.take() {
            region.destroy()?;
        }
        Ok(())
    }

    /// Running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Loaded configuration.
    pub fn config(&self) -> &PlcioConfig {
        &self.config
    }
}

/// Detect if running in real-time mode by checking scheduler policy.
fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        // SAFETY: sched_getscheduler(0) only queries the calling process.
        let policy = unsafe { sched_getscheduler(0) };
        policy == SCHED_FIFO || policy == SCHED_RR
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plcio_common::config::{LogLevel, ServerConfig, SharedConfig};

    fn config(server: Option<ServerConfig>) -> PlcioConfig {
        PlcioConfig {
            shared: SharedConfig {
                log_level: LogLevel::Info,
                service_name: "core-test".to_string(),
            },
            server,
            connections: Vec::new(),
            updaters: Vec::new(),
        }
    }

    #[test]
    fn periodic_runs_until_flag_drops() {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            let mut calls = 0u32;
            periodic("test", &flag, Duration::from_millis(1), || {
                calls += 1;
                if calls % 2 == 0 {
                    Err(plcio_common::driver::DriverError::ReadOnlyArea {
                        area: plcio_common::process::ProcessArea::Input,
                    })
                } else {
                    Ok(())
                }
            })
        });
        std::thread::sleep(Duration::from_millis(30));
        running.store(false, Ordering::SeqCst);

        let stats = handle.join().unwrap();
        assert!(stats.cycle_count >= 2);
        assert_eq!(stats.failures, stats.cycle_count / 2);
    }

    #[test]
    fn invalid_config_rejected() {
        let mut bad = config(None);
        bad.shared.service_name.clear();
        assert!(matches!(PlcioCore::new(bad), Err(HalError::Config(_))));
    }

    #[test]
    fn handles_require_init() {
        let core = PlcioCore::new(config(None)).unwrap();
        assert!(matches!(core.reader().err(), Some(HalError::NotInitialized)));
    }

    #[test]
    fn shutdown_removes_hosted_region() {
        let segment = format!("hal_core_{}", std::process::id());
        let mut core = PlcioCore::new(config(Some(ServerConfig {
            segment: segment.clone(),
            cycle_time_us: 500,
        })))
        .unwrap();
        core.init().unwrap();
        assert!(SharedMemoryRegion::attach(&segment).is_ok());

        core.shutdown().unwrap();
        assert!(SharedMemoryRegion::attach(&segment).is_err());
    }

    #[test]
    fn failed_init_removes_hosted_region() {
        use plcio_common::driver::{ConnectionKind, DriverConnection};

        let segment = format!("hal_core_failed_{}", std::process::id());
        let mut cfg = config(Some(ServerConfig {
            segment: segment.clone(),
            cycle_time_us: 500,
        }));
        cfg.connections.push(DriverConnection {
            id: 1,
            kind: ConnectionKind::Shm {
                segment: format!("hal_core_missing_{}", std::process::id()),
            },
        });
        let mut core = PlcioCore::new(cfg).unwrap();

        assert!(core.init().is_err());
        drop(core);
        assert!(SharedMemoryRegion::attach(&segment).is_err());
    }
}
