//! Background visibility scanning.
//!
//! The scanner owns residency decisions. On every pass it compares the
//! viewpoint cell with the last scanned one, queries the published octree
//! topology for leaves in range, diffs them against the resident set and
//! emits the differences on the materialize/evict queues. It never mutates
//! the tree: when the visibility circle leaves the root it posts an
//! [`ExpandRequest`] and retries once the driver publishes the grown topology.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use glam::{DVec3, IVec3};
use rustc_hash::FxHashSet;
use tracing::{debug, debug_span, trace};

use terra_octree::Octree;

/// Ask the driver to grow the root until the circle fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpandRequest {
    pub center: DVec3,
    pub radius: f64,
    /// Topology version the scanner saw when it asked.
    pub version: u64,
}

/// State shared between the scanner, the driver and the world handle.
///
/// Each lock is held only to copy or replace its value.
pub struct ScanShared {
    viewpoint: Mutex<Option<IVec3>>,
    resident: Mutex<FxHashSet<IVec3>>,
    topology: Mutex<Arc<Octree<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScanShared {
    pub fn new(topology: Octree<()>) -> Self {
        Self {
            viewpoint: Mutex::new(None),
            resident: Mutex::new(FxHashSet::default()),
            topology: Mutex::new(Arc::new(topology)),
        }
    }

    pub fn set_viewpoint_cell(&self, cell: IVec3) {
        *lock(&self.viewpoint) = Some(cell);
    }

    pub fn viewpoint_cell(&self) -> Option<IVec3> {
        *lock(&self.viewpoint)
    }

    /// True if the last completed scan wants `anchor` resident.
    pub fn is_wanted(&self, anchor: IVec3) -> bool {
        lock(&self.resident).contains(&anchor)
    }

    pub fn resident_count(&self) -> usize {
        lock(&self.resident).len()
    }

    pub fn resident_snapshot(&self) -> FxHashSet<IVec3> {
        lock(&self.resident).clone()
    }

    pub fn topology(&self) -> Arc<Octree<()>> {
        Arc::clone(&lock(&self.topology))
    }

    pub fn publish_topology(&self, topology: Octree<()>) {
        *lock(&self.topology) = Arc::new(topology);
    }

    /// Replace the resident set, returning the previous one.
    fn swap_resident(&self, desired: FxHashSet<IVec3>) -> FxHashSet<IVec3> {
        std::mem::replace(&mut *lock(&self.resident), desired)
    }
}

/// Producer ends of the scanner's output queues.
#[derive(Clone)]
pub struct ScanQueues {
    pub materialize: Sender<IVec3>,
    pub evict: Sender<IVec3>,
    pub expand: Sender<ExpandRequest>,
}

/// Consumer ends of the scanner's output queues.
pub struct ScanReceivers {
    pub materialize: Receiver<IVec3>,
    pub evict: Receiver<IVec3>,
    pub expand: Receiver<ExpandRequest>,
}

/// Create a connected queue pair.
pub fn scan_queues() -> (ScanQueues, ScanReceivers) {
    let (materialize, materialize_rx) = unbounded();
    let (evict, evict_rx) = unbounded();
    let (expand, expand_rx) = unbounded();
    (
        ScanQueues {
            materialize,
            evict,
            expand,
        },
        ScanReceivers {
            materialize: materialize_rx,
            evict: evict_rx,
            expand: expand_rx,
        },
    )
}

/// What a single pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No viewpoint yet, or the cell is unchanged.
    Skipped,
    /// The circle left the root; waiting for the driver to expand it.
    AwaitingExpansion,
    Scanned { materialize: usize, evict: usize },
    /// The driver dropped its queue ends; no further pass can be delivered.
    Disconnected,
}

/// Pass-to-pass scanner state. Runs on the scanner thread, or directly in
/// tests through [`Scanner::scan_once`].
pub struct Scanner {
    shared: Arc<ScanShared>,
    queues: ScanQueues,
    radius: f64,
    last_cell: Option<IVec3>,
    requested_at: Option<u64>,
}

impl Scanner {
    pub fn new(shared: Arc<ScanShared>, queues: ScanQueues, radius: f64) -> Self {
        Self {
            shared,
            queues,
            radius,
            last_cell: None,
            requested_at: None,
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn scan_once(&mut self) -> ScanOutcome {
        let Some(cell) = self.shared.viewpoint_cell() else {
            return ScanOutcome::Skipped;
        };
        if self.last_cell == Some(cell) {
            return ScanOutcome::Skipped;
        }
        let _span = debug_span!("scan", ?cell).entered();

        let topology = self.shared.topology();
        let center = cell.as_dvec3();
        if !topology.contains_circle(center, self.radius) {
            if self.requested_at != Some(topology.version()) {
                debug!(version = topology.version(), "visibility circle leaves root; expansion requested");
                let request = ExpandRequest {
                    center,
                    radius: self.radius,
                    version: topology.version(),
                };
                if self.queues.expand.send(request).is_err() {
                    return disconnected();
                }
                self.requested_at = Some(topology.version());
            }
            return ScanOutcome::AwaitingExpansion;
        }
        self.requested_at = None;

        let desired: FxHashSet<IVec3> = topology
            .leaves_within_distance(center, self.radius)
            .into_iter()
            .map(|leaf| leaf.anchor())
            .collect();

        let previous = self.shared.swap_resident(desired.clone());
        let evict: Vec<IVec3> = previous.difference(&desired).copied().collect();
        let materialize: Vec<IVec3> = desired.difference(&previous).copied().collect();

        let sent = evict
            .iter()
            .try_for_each(|anchor| self.queues.evict.send(*anchor))
            .and_then(|()| {
                materialize
                    .iter()
                    .try_for_each(|anchor| self.queues.materialize.send(*anchor))
            });
        if sent.is_err() {
            return disconnected();
        }
        self.last_cell = Some(cell);

        debug!(
            materialize = materialize.len(),
            evict = evict.len(),
            resident = desired.len(),
            "scan pass complete"
        );
        ScanOutcome::Scanned {
            materialize: materialize.len(),
            evict: evict.len(),
        }
    }
}

fn disconnected() -> ScanOutcome {
    debug!("driver queues closed; visibility scanning stops");
    ScanOutcome::Disconnected
}

enum Control {
    Wake,
    Shutdown,
}

/// Handle to the scanner thread.
pub struct VisibilityScanner {
    control: Sender<Control>,
    handle: Option<JoinHandle<()>>,
}

impl VisibilityScanner {
    /// Spawn the scanner thread, polling every `interval`.
    pub fn spawn(mut scanner: Scanner, interval: Duration) -> std::io::Result<Self> {
        let (control, control_rx) = unbounded();
        let handle = std::thread::Builder::new()
            .name("terra-scanner".into())
            .spawn(move || {
                debug!(interval_ms = interval.as_millis() as u64, "visibility scanner started");
                loop {
                    if scanner.scan_once() == ScanOutcome::Disconnected {
                        break;
                    }
                    match control_rx.recv_timeout(interval) {
                        Ok(Control::Wake) | Err(RecvTimeoutError::Timeout) => {}
                        Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("visibility scanner stopped");
            })?;
        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    /// Run a pass now instead of waiting out the interval.
    pub fn wake(&self) {
        let _ = self.control.send(Control::Wake);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.control.send(Control::Shutdown);
        if handle.join().is_err() {
            trace!("scanner thread panicked");
        }
    }
}

impl Drop for VisibilityScanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
