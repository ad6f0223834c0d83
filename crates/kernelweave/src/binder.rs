//! Binding call arguments against an argument schema.

use kernelweave_codegen::ArgumentSchema;

use crate::args::{CallArgs, KernelArg};
use crate::error::{KernelError, Result};

/// Bind positional and keyword arguments to the schema's declared order.
///
/// Positional arguments fill the first declared names. Every remaining name
/// must then be supplied by keyword. Keywords left over afterwards are
/// either duplicates of a positional slot or names the schema does not
/// declare.
///
/// ```
/// use kernelweave::{bind, CallArgs};
/// use kernelweave_codegen::{ArgumentSpec, Fragment, NaturalLayoutMatcher, SchemaBuilder};
///
/// let extras = vec![
///     ArgumentSpec::scalar("x", "int"),
///     ArgumentSpec::scalar("y", "int"),
/// ];
/// let resolved = SchemaBuilder::new(&NaturalLayoutMatcher)
///     .build(&extras, &Fragment::from("x;"), None)
///     .unwrap();
///
/// let bound = bind(&resolved.schema, CallArgs::new().arg(1i32).kwarg("y", 2i32)).unwrap();
/// assert_eq!(bound.len(), 2);
/// ```
pub fn bind(schema: &ArgumentSchema, args: CallArgs) -> Result<Vec<KernelArg>> {
    let (positional, mut keyword) = args.into_parts();
    let declared = schema.len();

    if positional.len() > declared {
        return Err(KernelError::TooManyArguments {
            expected: declared,
            actual: positional.len(),
        });
    }

    let consumed = positional.len();
    let mut bound = positional;
    bound.reserve(declared - consumed);

    for declaration in &schema.arguments[consumed..] {
        let position = keyword
            .iter()
            .position(|(name, _)| *name == declaration.name)
            .ok_or_else(|| KernelError::MissingArgument(declaration.name.clone()))?;
        let (_, value) = keyword.remove(position);
        bound.push(value);
    }

    if let Some((name, _)) = keyword.first() {
        return Err(if schema.get(name).is_some() {
            KernelError::DuplicateArgument(name.clone())
        } else {
            KernelError::UnknownArgument(name.clone())
        });
    }

    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernelweave_codegen::{ArgumentSpec, Fragment, NaturalLayoutMatcher, SchemaBuilder};

    fn schema(names: &[&str]) -> ArgumentSchema {
        let extras: Vec<ArgumentSpec> = names
            .iter()
            .map(|n| ArgumentSpec::scalar(*n, "int"))
            .collect();
        SchemaBuilder::new(&NaturalLayoutMatcher)
            .build(&extras, &Fragment::from("/* noop */"), None)
            .unwrap()
            .schema
    }

    #[test]
    fn test_keywords_fill_remaining_slots_in_declared_order() {
        let schema = schema(&["a", "b", "c"]);
        let bound = bind(
            &schema,
            CallArgs::new().arg(1i32).kwarg("c", 3i32).kwarg("b", 2i32),
        )
        .unwrap();
        assert_eq!(bound, vec![1i32.into(), 2i32.into(), 3i32.into()]);
    }

    #[test]
    fn test_missing_argument_names_first_gap() {
        let schema = schema(&["a", "b", "c"]);
        let err = bind(&schema, CallArgs::new().arg(1i32).kwarg("c", 3i32)).unwrap_err();
        assert!(matches!(err, KernelError::MissingArgument(ref n) if n == "b"));
    }

    #[test]
    fn test_keyword_for_positional_slot_is_duplicate() {
        let schema = schema(&["a", "b"]);
        let err = bind(
            &schema,
            CallArgs::new().arg(1i32).kwarg("b", 2i32).kwarg("a", 9i32),
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::DuplicateArgument(ref n) if n == "a"));
    }

    #[test]
    fn test_repeated_keyword_is_duplicate() {
        let schema = schema(&["a"]);
        let err = bind(&schema, CallArgs::new().kwarg("a", 1i32).kwarg("a", 2i32)).unwrap_err();
        assert!(matches!(err, KernelError::DuplicateArgument(ref n) if n == "a"));
    }

    #[test]
    fn test_unknown_keyword() {
        let schema = schema(&["a"]);
        let err = bind(&schema, CallArgs::new().arg(1i32).kwarg("zeta", 2i32)).unwrap_err();
        assert!(matches!(err, KernelError::UnknownArgument(ref n) if n == "zeta"));
    }

    #[test]
    fn test_too_many_positionals() {
        let schema = schema(&["a"]);
        let err = bind(&schema, CallArgs::new().arg(1i32).arg(2i32)).unwrap_err();
        assert!(matches!(
            err,
            KernelError::TooManyArguments {
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_empty_schema() {
        let schema = schema(&[]);
        assert!(bind(&schema, CallArgs::new()).unwrap().is_empty());
    }
}
