//! Compiled kernels: build once, call many times.

use std::sync::Arc;

use kernelweave_codegen::{ArgumentSchema, LayoutPlan};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::args::CallArgs;
use crate::backend::{Backend, CommandQueue};
use crate::binder::bind;
use crate::cache::ProgramCache;
use crate::config::BuildConfig;
use crate::definition::KernelDefinition;
use crate::error::{KernelError, Result};

/// Result of a successful build.
#[derive(Debug)]
pub struct BuiltKernel<P> {
    /// Device program.
    pub program: Arc<P>,
    /// Argument schema the program was built with.
    pub schema: ArgumentSchema,
    /// Planned layout.
    pub plan: LayoutPlan,
    /// Composed source.
    pub source: String,
    /// Lowercase hex SHA-256 of the source.
    pub source_hash: String,
}

enum KernelState<P> {
    Unbuilt,
    Built(Arc<BuiltKernel<P>>),
}

/// A kernel that is built on demand and dispatched with bound arguments.
///
/// The definition is fixed for the kernel's lifetime. To change it, take it
/// back with [`CompiledKernel::into_definition`] and create a new kernel.
///
/// ```
/// use std::sync::Arc;
///
/// use kernelweave::{BufferHandle, CallArgs, CompiledKernel, KernelDefinition, RecordingBackend, RecordingQueue};
/// use kernelweave_codegen::{ArgumentSpec, BlockSizes};
///
/// let definition = KernelDefinition::block_mapper(
///     "copy",
///     "for (int i = 0; i < BLOCK_SIZE_IN; ++i)\n    b[out_offset + i] = a[in_offset + i];",
///     BlockSizes::new(4, 4),
/// )
/// .with_argument(ArgumentSpec::global_buffer("a", "float"))
/// .with_argument(ArgumentSpec::global_buffer("b", "float"));
///
/// let kernel = CompiledKernel::new(Arc::new(RecordingBackend::new()), definition);
/// let queue = RecordingQueue::new();
/// kernel.call(
///     &queue,
///     100,
///     CallArgs::new()
///         .arg(BufferHandle::new(1, 1600))
///         .kwarg("b", BufferHandle::new(2, 1600)),
/// )?;
/// assert_eq!(queue.dispatches()[0].dims.global, vec![100]);
/// # Ok::<(), kernelweave::KernelError>(())
/// ```
pub struct CompiledKernel<B: Backend> {
    backend: Arc<B>,
    definition: KernelDefinition,
    config: BuildConfig,
    cache: Option<Arc<ProgramCache>>,
    state: Mutex<KernelState<B::Program>>,
}

impl<B: Backend> CompiledKernel<B> {
    /// Create an unbuilt kernel with the default configuration.
    pub fn new(backend: Arc<B>, definition: KernelDefinition) -> Self {
        Self {
            backend,
            definition,
            config: BuildConfig::default(),
            cache: None,
            state: Mutex::new(KernelState::Unbuilt),
        }
    }

    /// Sets the build configuration.
    #[must_use]
    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares compiled programs through `cache` when
    /// [`BuildConfig::cache_programs`] is set.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ProgramCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Kernel function name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// The definition this kernel is built from.
    pub fn definition(&self) -> &KernelDefinition {
        &self.definition
    }

    /// Build configuration.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Whether `build` has succeeded.
    pub fn is_built(&self) -> bool {
        matches!(*self.state.lock(), KernelState::Built(_))
    }

    /// Build output, if built.
    pub fn built(&self) -> Option<Arc<BuiltKernel<B::Program>>> {
        match &*self.state.lock() {
            KernelState::Built(built) => Some(Arc::clone(built)),
            KernelState::Unbuilt => None,
        }
    }

    /// Composed source, if built.
    pub fn source(&self) -> Option<String> {
        self.built().map(|b| b.source.clone())
    }

    /// Argument schema, if built.
    pub fn schema(&self) -> Option<ArgumentSchema> {
        self.built().map(|b| b.schema.clone())
    }

    /// Build the kernel if it is not built yet.
    ///
    /// Schema assembly, layout planning, source composition and compilation
    /// run in that order under the state lock. Any failure leaves the
    /// kernel unbuilt.
    pub fn build(&self) -> Result<Arc<BuiltKernel<B::Program>>> {
        let mut state = self.state.lock();
        if let KernelState::Built(built) = &*state {
            return Ok(Arc::clone(built));
        }

        let composed = self.definition.compose(self.backend.struct_matcher())?;
        if self.config.trace_source {
            trace!(kernel = %self.definition.name, source = %composed.source, "Composed kernel source");
        }

        let options = &self.config.compiler_options;
        let program = match (&self.cache, self.config.cache_programs) {
            (Some(cache), true) => cache.get_or_compile(
                self.backend.as_ref(),
                &composed.source,
                &self.definition.name,
                options,
            )?,
            _ => {
                debug!(kernel = %self.definition.name, "Compiling without program cache");
                Arc::new(
                    self.backend
                        .compile(&composed.source, &self.definition.name, options)?,
                )
            }
        };

        let source_hash = ProgramCache::hash_source(&composed.source);
        info!(
            kernel = %self.definition.name,
            backend = self.backend.name(),
            hash = &source_hash[..8],
            arguments = composed.schema.len(),
            "Built kernel"
        );

        let built = Arc::new(BuiltKernel {
            program,
            schema: composed.schema,
            plan: composed.plan,
            source: composed.source,
            source_hash,
        });
        *state = KernelState::Built(Arc::clone(&built));
        Ok(built)
    }

    /// Bind `args` and enqueue one dispatch over `logical_length` items.
    ///
    /// Builds first if needed, unless
    /// [`BuildConfig::require_explicit_build`] is set, in which case an
    /// unbuilt kernel fails with [`KernelError::NotBuilt`]. Nothing is
    /// enqueued when building, binding or sizing the dispatch fails.
    pub fn call<Q>(&self, queue: &Q, logical_length: usize, args: CallArgs) -> Result<()>
    where
        Q: CommandQueue<B::Program>,
    {
        let built = if self.config.require_explicit_build {
            self.built()
                .ok_or_else(|| KernelError::NotBuilt(self.definition.name.clone()))?
        } else {
            self.build()?
        };

        let bound = bind(&built.schema, args)?;
        let dims = built.plan.dispatch(logical_length)?;

        trace!(
            kernel = %self.definition.name,
            global = ?dims.global,
            local = ?dims.local,
            arguments = bound.len(),
            "Enqueueing kernel"
        );

        queue.enqueue(&built.program, &dims, &bound)
    }

    /// Give back the definition.
    pub fn into_definition(self) -> KernelDefinition {
        self.definition
    }
}

impl<B: Backend> std::fmt::Debug for CompiledKernel<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledKernel")
            .field("name", &self.definition.name)
            .field("backend", &self.backend.name())
            .field("built", &self.is_built())
            .finish()
    }
}
