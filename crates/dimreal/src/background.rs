//! Pyramid solve on a worker thread with live preview and cooperative
//! cancellation.
//!
//! At most one solve runs per [`BackgroundSolver`]: `start` cancels and joins
//! the previous worker before spawning a new one. The worker shares only a
//! cancel flag, a done flag and whole-buffer snapshot slots with the owner.
//! Cancellation is observed between pyramid levels.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use image::{GrayImage, RgbImage};

use crate::error::{ensure_extent, InpaintError};
use crate::params::InpaintParams;
use crate::pyramid::{PyramidSolver, Solve, SolveObserver};
use crate::quad::hole_pixel_count;
use crate::warp::resize_bilinear;

/// Lifecycle of the background worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Idle,
    Running,
    /// Cancellation requested, current level still finishing.
    Stopping,
}

struct Shared {
    cancel: AtomicBool,
    done: AtomicBool,
    preview: Mutex<Option<RgbImage>>,
    result: Mutex<Option<Solve>>,
    error: Mutex<Option<InpaintError>>,
}

impl Shared {
    /// Nothing in flight: an idle solver counts as done.
    fn idle() -> Self {
        Self {
            cancel: AtomicBool::new(false),
            done: AtomicBool::new(true),
            preview: Mutex::new(None),
            result: Mutex::new(None),
            error: Mutex::new(None),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Publishes each finished level, upsampled to the input size.
struct Publisher<'a> {
    shared: &'a Shared,
    width: u32,
    height: u32,
}

impl SolveObserver for Publisher<'_> {
    fn is_cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::Acquire)
    }

    fn level_done(&self, level: usize, color: &RgbImage) {
        let full = resize_bilinear(color, self.width, self.height);
        *lock(&self.shared.preview) = Some(full);
        tracing::debug!(level, "preview published");
    }
}

/// Marks the run finished even if the solve panics.
struct RunGuard {
    shared: Arc<Shared>,
    active: Arc<AtomicUsize>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.shared.done.store(true, Ordering::Release);
    }
}

/// Owner of at most one in-flight background solve.
pub struct BackgroundSolver {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    exclusive: Option<Arc<Mutex<()>>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for BackgroundSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundSolver {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::idle()),
            handle: None,
            exclusive: None,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Solver whose workers also hold `lock` while solving, serializing them
    /// with every other solver built from the same lock.
    pub fn with_exclusive_lock(lock: Arc<Mutex<()>>) -> Self {
        let mut solver = Self::new();
        solver.exclusive = Some(lock);
        solver
    }

    /// Start solving `frame` with hole `mask`.
    ///
    /// Input is validated before anything else happens. A solve already in
    /// flight is cancelled and joined first, so this call may block for the
    /// remainder of that solve's current pyramid level.
    pub fn start(
        &mut self,
        frame: &RgbImage,
        mask: &GrayImage,
        params: &InpaintParams,
    ) -> Result<(), InpaintError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(InpaintError::EmptyImage);
        }
        ensure_extent("mask", (width, height), mask.dimensions())?;
        if hole_pixel_count(mask) == mask.as_raw().len() {
            return Err(InpaintError::NoKnownPixels);
        }

        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "previous background solve failed");
        }
        self.shared.cancel.store(false, Ordering::Release);
        self.shared.done.store(false, Ordering::Release);
        *lock(&self.shared.result) = None;
        *lock(&self.shared.error) = None;

        let shared = Arc::clone(&self.shared);
        let active = Arc::clone(&self.active);
        let peak = Arc::clone(&self.peak);
        let exclusive = self.exclusive.clone();
        let frame = frame.clone();
        let mask = mask.clone();
        let solver = PyramidSolver::new(params.clone());

        let handle = thread::Builder::new()
            .name("dimreal-solver".to_string())
            .spawn(move || {
                let _exclusive = exclusive.as_deref().map(lock);
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let _guard = RunGuard {
                    shared: Arc::clone(&shared),
                    active,
                };

                let publisher = Publisher {
                    shared: &shared,
                    width,
                    height,
                };
                match solver.solve_observed(&frame, &mask, &publisher) {
                    Ok(Some(solve)) => {
                        *lock(&shared.preview) = Some(solve.color.clone());
                        *lock(&shared.result) = Some(solve);
                        tracing::info!("background solve finished");
                    }
                    Ok(None) => tracing::info!("background solve cancelled"),
                    Err(e) => {
                        tracing::error!(error = %e, "background solve failed");
                        *lock(&shared.error) = Some(e);
                    }
                }
            })
            .map_err(|e| InpaintError::Worker(e.to_string()))?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Latest published color buffer, if any. Never blocks on the solve.
    pub fn poll_preview(&self) -> Option<RgbImage> {
        lock(&self.shared.preview).clone()
    }

    /// `true` while idle and once the most recent run has finished,
    /// cancelled or not.
    pub fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::Acquire)
    }

    /// Request cancellation without waiting.
    pub fn cancel(&self) {
        if self.handle.is_some() {
            self.shared.cancel.store(true, Ordering::Release);
        }
    }

    /// Wait for the current run to end on its own.
    pub fn join(&mut self) -> Result<(), InpaintError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| InpaintError::Worker("solver thread panicked".to_string())),
            None => Ok(()),
        }
    }

    /// Cancel and join the current run.
    pub fn stop(&mut self) -> Result<(), InpaintError> {
        self.cancel();
        self.join()
    }

    pub fn state(&self) -> SolverState {
        match &self.handle {
            None => SolverState::Idle,
            Some(_) if self.is_done() => SolverState::Idle,
            Some(_) if self.shared.cancel.load(Ordering::Acquire) => SolverState::Stopping,
            Some(_) => SolverState::Running,
        }
    }

    /// Final solve of the last completed run; `None` if it was cancelled,
    /// failed, is still running, or was already taken.
    pub fn take_result(&self) -> Option<Solve> {
        lock(&self.shared.result).take()
    }

    /// Error of the last run, if it failed.
    pub fn last_error(&self) -> Option<InpaintError> {
        lock(&self.shared.error).clone()
    }

    /// Highest number of simultaneously running solves observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for BackgroundSolver {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "background solver dropped with failed worker");
        }
    }
}
