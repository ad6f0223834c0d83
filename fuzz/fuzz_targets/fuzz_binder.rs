//! Fuzz target for argument binding.
//!
//! Binds random positional/keyword splits against a random schema and checks
//! that success always yields the declared order and that every failure is
//! one of the binding errors.

#![no_main]

use arbitrary::Arbitrary;
use kernelweave::{bind, CallArgs, KernelArg, KernelError};
use kernelweave_codegen::{ArgumentSpec, Fragment, NaturalLayoutMatcher, SchemaBuilder};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Number of declared arguments.
    declared: u8,
    /// Number of positional values.
    positional: u8,
    /// Keyword entries as indexes into a name pool larger than the schema.
    keywords: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let declared = (input.declared % 16) as usize;
    let names: Vec<String> = (0..declared).map(|i| format!("arg{i}")).collect();

    let extras: Vec<ArgumentSpec> = names.iter().map(|n| ArgumentSpec::scalar(n.as_str(), "uint")).collect();
    let schema = match SchemaBuilder::new(&NaturalLayoutMatcher).build(&extras, &Fragment::from("x;"), None) {
        Ok(resolved) => resolved.schema,
        Err(e) => panic!("scalar schema failed to build: {e}"),
    };

    let positional = (input.positional % 20) as usize;
    let mut args = CallArgs::new();
    for i in 0..positional {
        args = args.arg(i as u32);
    }
    for &k in input.keywords.iter().take(32) {
        let index = (k % 24) as usize;
        args = args.kwarg(format!("arg{index}"), index as u32);
    }

    match bind(&schema, args) {
        Ok(bound) => {
            assert_eq!(bound.len(), declared);
            for (i, value) in bound.iter().enumerate() {
                assert_eq!(*value, KernelArg::from(i as u32), "slot {i} bound out of order");
            }
        }
        Err(e) => assert!(
            matches!(
                e,
                KernelError::MissingArgument(_)
                    | KernelError::DuplicateArgument(_)
                    | KernelError::UnknownArgument(_)
                    | KernelError::TooManyArguments { .. }
            ),
            "unexpected error: {e}"
        ),
    }
});
