//! Host-only backend that records work instead of executing it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kernelweave_codegen::LaunchDims;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{Backend, CommandQueue};
use crate::args::KernelArg;
use crate::error::{KernelError, Result};

/// A "compiled" program: the source it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingProgram {
    /// Program id, unique per backend.
    pub id: u64,
    /// Kernel entry point.
    pub kernel_name: String,
    /// Composed source.
    pub source: String,
    /// Compiler options.
    pub options: Vec<String>,
}

/// One recorded dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Program id.
    pub program: u64,
    /// Kernel entry point.
    pub kernel_name: String,
    /// Launch dimensions.
    pub dims: LaunchDims,
    /// Bound arguments in declared order.
    pub args: Vec<KernelArg>,
}

/// Records compiled sources.
///
/// Used by tests and by hosts without a device. A compile failure can be
/// injected with [`RecordingBackend::fail_next_compile`].
#[derive(Debug, Default)]
pub struct RecordingBackend {
    programs: RwLock<Vec<RecordingProgram>>,
    compile_count: AtomicU64,
    next_failure: Mutex<Option<String>>,
}

impl RecordingBackend {
    /// Create a backend with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `compile` calls, failed ones included.
    pub fn compile_count(&self) -> u64 {
        self.compile_count.load(Ordering::Relaxed)
    }

    /// Sources compiled successfully, in order.
    pub fn sources(&self) -> Vec<String> {
        self.programs.read().iter().map(|p| p.source.clone()).collect()
    }

    /// Programs compiled successfully, in order.
    pub fn programs(&self) -> Vec<RecordingProgram> {
        self.programs.read().clone()
    }

    /// Make the next `compile` call fail with `log`.
    pub fn fail_next_compile(&self, log: impl Into<String>) {
        *self.next_failure.lock() = Some(log.into());
    }
}

impl Backend for RecordingBackend {
    type Program = RecordingProgram;

    fn name(&self) -> &str {
        "recording"
    }

    fn compile(&self, source: &str, kernel_name: &str, options: &[String]) -> Result<RecordingProgram> {
        let id = self.compile_count.fetch_add(1, Ordering::Relaxed);

        if let Some(log) = self.next_failure.lock().take() {
            return Err(KernelError::Compile {
                kernel: kernel_name.to_string(),
                log,
            });
        }

        let program = RecordingProgram {
            id,
            kernel_name: kernel_name.to_string(),
            source: source.to_string(),
            options: options.to_vec(),
        };
        self.programs.write().push(program.clone());

        debug!(id, kernel = kernel_name, bytes = source.len(), "Recorded program");
        Ok(program)
    }
}

/// Records dispatches.
///
/// Clones share the same record, so a test can keep one handle while the
/// kernel enqueues on another.
#[derive(Debug, Clone, Default)]
pub struct RecordingQueue {
    dispatches: Arc<Mutex<Vec<Dispatch>>>,
    rejecting: Arc<Mutex<Option<String>>>,
}

impl RecordingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatches recorded so far.
    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.dispatches.lock().clone()
    }

    /// Number of dispatches recorded so far.
    pub fn len(&self) -> usize {
        self.dispatches.lock().len()
    }

    /// Whether nothing was dispatched.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject every following dispatch with `reason`; `None` accepts again.
    pub fn set_rejecting(&self, reason: Option<String>) {
        *self.rejecting.lock() = reason;
    }
}

impl CommandQueue<RecordingProgram> for RecordingQueue {
    fn enqueue(&self, program: &RecordingProgram, dims: &LaunchDims, args: &[KernelArg]) -> Result<()> {
        if let Some(reason) = self.rejecting.lock().as_ref() {
            return Err(KernelError::Dispatch(reason.clone()));
        }

        self.dispatches.lock().push(Dispatch {
            program: program.id,
            kernel_name: program.kernel_name.clone(),
            dims: dims.clone(),
            args: args.to_vec(),
        });
        Ok(())
    }
}
