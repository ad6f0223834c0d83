//! Thread layout planning and per-item index prologues.
//!
//! Every kernel addresses its input and output blocks as
//! `in_offset = gid * BLOCK_SIZE_IN` and `out_offset = gid * BLOCK_SIZE_OUT`.
//! Threaded layouts run one work-group per logical item, so `gid` is the
//! group id and the threads of the group get two linear ids: `item_id`
//! (X-major) and `item_id_t` (Y-major). Reading with one and writing with the
//! other transposes a tile without a separate pass.

use std::fmt;
use std::fmt::Write;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{CodegenError, CodegenResult};

/// Maximum number of work-group axes.
pub const MAX_AXES: usize = 3;

const AXIS_NAMES: [&str; MAX_AXES] = ["X", "Y", "Z"];

/// Elements each work-item reads and writes contiguously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockSizes {
    /// Input block size.
    pub input: usize,
    /// Output block size.
    pub output: usize,
}

impl BlockSizes {
    /// Create block sizes.
    pub const fn new(input: usize, output: usize) -> Self {
        Self { input, output }
    }
}

impl Default for BlockSizes {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// What a layout delegate gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct LayoutContext<'a> {
    /// Kernel name.
    pub kernel_name: &'a str,
    /// Block sizes.
    pub block: BlockSizes,
    /// Logical shape of the data, if the kernel has one.
    pub shape: &'a [usize],
}

impl<'a> LayoutContext<'a> {
    /// Create a context.
    pub fn new(kernel_name: &'a str, block: BlockSizes, shape: &'a [usize]) -> Self {
        Self {
            kernel_name,
            block,
            shape,
        }
    }
}

/// Produces a complete layout plan, replacing the built-in prologues.
pub trait LayoutDelegate: Send + Sync {
    /// Plan the layout for `context`.
    fn plan(&self, context: &LayoutContext<'_>) -> LayoutPlan;
}

impl<F> LayoutDelegate for F
where
    F: Fn(&LayoutContext<'_>) -> LayoutPlan + Send + Sync,
{
    fn plan(&self, context: &LayoutContext<'_>) -> LayoutPlan {
        self(context)
    }
}

/// Requested thread layout.
#[derive(Clone, Default)]
pub enum LayoutSpec {
    /// One work-item per logical item, no local threading.
    #[default]
    Linear,
    /// Work-group extents, one to three positive values.
    Threads(Vec<usize>),
    /// Full override.
    Delegate(Arc<dyn LayoutDelegate>),
}

impl LayoutSpec {
    /// Threaded layout with the given extents.
    pub fn threads(extents: impl Into<Vec<usize>>) -> Self {
        LayoutSpec::Threads(extents.into())
    }

    /// Delegate layout.
    pub fn delegate(delegate: impl LayoutDelegate + 'static) -> Self {
        LayoutSpec::Delegate(Arc::new(delegate))
    }
}

impl fmt::Debug for LayoutSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutSpec::Linear => f.write_str("Linear"),
            LayoutSpec::Threads(extents) => f.debug_tuple("Threads").field(extents).finish(),
            LayoutSpec::Delegate(_) => f.write_str("Delegate(..)"),
        }
    }
}

/// Work sizes for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDims {
    /// Global work size per axis.
    pub global: Vec<usize>,
    /// Local work size per axis; `None` lets the device choose.
    pub local: Option<Vec<usize>>,
}

/// A planned layout: extents, constants to define, and the prologue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutPlan {
    /// Work-group extents; empty for linear layouts.
    pub extents: Vec<usize>,
    /// `#define` name/value pairs, in emission order.
    pub constants: Vec<(String, String)>,
    /// Statements placed at the top of the kernel body.
    pub prologue: String,
}

impl LayoutPlan {
    /// Number of work-group axes.
    pub fn axes(&self) -> usize {
        self.extents.len()
    }

    /// Work sizes for `logical_length` items.
    ///
    /// The first axis is scaled by the logical length; the remaining extents
    /// pass through unchanged.
    pub fn dispatch(&self, logical_length: usize) -> CodegenResult<LaunchDims> {
        let Some((&first, rest)) = self.extents.split_first() else {
            return Ok(LaunchDims {
                global: vec![logical_length],
                local: None,
            });
        };
        let scaled = logical_length
            .checked_mul(first)
            .ok_or(CodegenError::DispatchOverflow {
                logical_length,
                extent: first,
            })?;
        let mut global = Vec::with_capacity(self.extents.len());
        global.push(scaled);
        global.extend_from_slice(rest);
        Ok(LaunchDims {
            global,
            local: Some(self.extents.clone()),
        })
    }

    /// Work-group size padded to three axes, if the layout is threaded.
    pub fn work_group_size(&self) -> Option<[usize; 3]> {
        if self.extents.is_empty() {
            return None;
        }
        let mut size = [1usize; 3];
        size[..self.extents.len()].copy_from_slice(&self.extents);
        Some(size)
    }
}

/// Host mirror of the `item_id` / `item_id_t` expressions.
///
/// Returns `None` unless `extents` and `lid` have the same length between
/// one and [`MAX_AXES`].
pub fn threaded_item_ids(extents: &[usize], lid: &[usize]) -> Option<(usize, usize)> {
    if lid.is_empty() || lid.len() != extents.len() || lid.len() > MAX_AXES {
        return None;
    }
    let x = lid[0];
    let y = lid.get(1).copied().unwrap_or(0);
    let z = lid.get(2).copied().unwrap_or(0);
    let tx = extents[0];
    let ty = extents.get(1).copied().unwrap_or(1);
    let plane = z * tx * ty;
    Some((x + y * tx + plane, y + x * ty + plane))
}

/// Plans layouts for one kernel.
pub struct LayoutPlanner<'a> {
    context: &'a LayoutContext<'a>,
}

impl<'a> LayoutPlanner<'a> {
    /// Create a planner.
    pub fn new(context: &'a LayoutContext<'a>) -> Self {
        Self { context }
    }

    /// Plan the layout. `None` is the same as [`LayoutSpec::Linear`].
    pub fn plan(&self, spec: Option<&LayoutSpec>) -> CodegenResult<LayoutPlan> {
        let plan = match spec {
            None | Some(LayoutSpec::Linear) => linear_plan(),
            Some(LayoutSpec::Threads(extents)) => threaded_plan(extents)?,
            Some(LayoutSpec::Delegate(delegate)) => {
                let plan = delegate.plan(self.context);
                if plan.extents.len() > MAX_AXES {
                    return Err(too_many_axes(plan.extents.len()));
                }
                plan
            }
        };

        tracing::debug!(
            kernel = self.context.kernel_name,
            extents = ?plan.extents,
            "Planned kernel layout"
        );

        Ok(plan)
    }
}

fn too_many_axes(axes: usize) -> CodegenError {
    CodegenError::UnsupportedLayout {
        axes,
        reason: format!("at most {MAX_AXES} axes are supported"),
    }
}

fn block_offsets(prologue: &mut String, id_source: &str) {
    let _ = writeln!(prologue, "    const size_t gid = {id_source}(0);");
    prologue.push_str("    const size_t in_offset = gid * BLOCK_SIZE_IN;\n");
    prologue.push_str("    const size_t out_offset = gid * BLOCK_SIZE_OUT;\n");
}

fn linear_plan() -> LayoutPlan {
    let mut prologue = String::new();
    block_offsets(&mut prologue, "get_global_id");
    LayoutPlan {
        extents: Vec::new(),
        constants: Vec::new(),
        prologue,
    }
}

fn threaded_plan(extents: &[usize]) -> CodegenResult<LayoutPlan> {
    let axes = extents.len();
    if axes == 0 {
        return Err(CodegenError::UnsupportedLayout {
            axes,
            reason: "at least one axis is required".to_string(),
        });
    }
    if axes > MAX_AXES {
        return Err(too_many_axes(axes));
    }
    if extents.contains(&0) {
        return Err(CodegenError::UnsupportedLayout {
            axes,
            reason: format!("extents must be positive, got {extents:?}"),
        });
    }

    let mut constants: Vec<(String, String)> = extents
        .iter()
        .zip(AXIS_NAMES)
        .map(|(extent, axis)| (format!("THREADS_{axis}"), extent.to_string()))
        .collect();
    constants.push((
        "THREADS_TOTAL".to_string(),
        extents.iter().product::<usize>().to_string(),
    ));

    let mut prologue = String::new();
    block_offsets(&mut prologue, "get_group_id");

    match axes {
        1 => {
            prologue.push_str("    const uint lid = get_local_id(0);\n");
            prologue.push_str("    const uint item_id = lid;\n");
            prologue.push_str("    const uint item_id_t = lid;\n");
        }
        2 => {
            prologue.push_str("    const uint2 lid = (uint2)(get_local_id(0), get_local_id(1));\n");
            prologue.push_str("    const uint item_id = lid.x + lid.y * THREADS_X;\n");
            prologue.push_str("    const uint item_id_t = lid.y + lid.x * THREADS_Y;\n");
        }
        _ => {
            prologue.push_str(
                "    const uint3 lid = (uint3)(get_local_id(0), get_local_id(1), get_local_id(2));\n",
            );
            prologue.push_str("    const uint item_id = lid.x + lid.y * THREADS_X + lid.z * THREADS_X * THREADS_Y;\n");
            prologue.push_str("    const uint item_id_t = lid.y + lid.x * THREADS_Y + lid.z * THREADS_X * THREADS_Y;\n");
        }
    }

    Ok(LayoutPlan {
        extents: extents.to_vec(),
        constants,
        prologue,
    })
}
