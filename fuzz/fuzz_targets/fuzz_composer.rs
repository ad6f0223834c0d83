//! Fuzz target for kernel source composition.
//!
//! Feeds random type names, thread extents and fragment text through schema
//! assembly, layout planning and composition. Composition must never panic
//! and must be deterministic.

#![no_main]

use arbitrary::Arbitrary;
use kernelweave::KernelDefinition;
use kernelweave_codegen::{ArgumentSpec, BlockSizes, CodegenError, LayoutSpec, NaturalLayoutMatcher};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    body: String,
    postprocess: Option<String>,
    arguments: Vec<(String, String)>,
    threads: Option<Vec<u8>>,
    block_in: u8,
    block_out: u8,
}

fuzz_target!(|input: FuzzInput| {
    if input.arguments.len() > 32 || input.body.len() > 4096 {
        return;
    }

    let mut definition = KernelDefinition::block_mapper(
        "fuzzed",
        input.body.as_str(),
        BlockSizes::new(input.block_in as usize, input.block_out as usize),
    )
    .with_arguments(
        input
            .arguments
            .iter()
            .map(|(name, ty)| ArgumentSpec::global_buffer(name.as_str(), ty.as_str())),
    );
    if let Some(post) = &input.postprocess {
        definition = definition.with_postprocess(post.as_str());
    }
    if let Some(threads) = &input.threads {
        let extents: Vec<usize> = threads.iter().take(5).map(|&t| t as usize).collect();
        definition = definition.with_threads(LayoutSpec::threads(extents));
    }

    match definition.compose(&NaturalLayoutMatcher) {
        Ok(first) => {
            let second = definition
                .compose(&NaturalLayoutMatcher)
                .unwrap_or_else(|e| panic!("second composition failed: {e}"));
            assert_eq!(first.source, second.source, "composition is not deterministic");
            assert!(first.plan.axes() <= 3);
        }
        Err(CodegenError::UnsupportedLayout { axes, .. }) => {
            let extents = input.threads.as_ref().map(|t| t.len().min(5)).unwrap_or(0);
            assert_eq!(axes, extents);
        }
        Err(_) => {}
    }
});
