//! Argument schemas merged from kernel fragments.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fragment::{ExpressionProvider, Fragment};
use crate::layout::LayoutSpec;
use crate::structs::{StructDescriptor, StructLayout, StructMatcher, StructRegistry};
use crate::types::{Extension, NumericType, TypeDescriptor, TypeResolver};
use crate::CodegenResult;

/// Address-space or access qualifier of a kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Qualifier {
    /// `__global` memory.
    Global,
    /// `__constant` memory.
    Constant,
    /// `__local` memory.
    Local,
    /// No qualifier (by-value arguments).
    #[default]
    Private,
    /// `__read_only` image.
    ReadOnly,
    /// `__write_only` image.
    WriteOnly,
    /// `__read_write` image.
    ReadWrite,
}

impl Qualifier {
    /// OpenCL C spelling; empty for [`Qualifier::Private`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Qualifier::Global => "__global",
            Qualifier::Constant => "__constant",
            Qualifier::Local => "__local",
            Qualifier::Private => "",
            Qualifier::ReadOnly => "__read_only",
            Qualifier::WriteOnly => "__write_only",
            Qualifier::ReadWrite => "__read_write",
        }
    }
}

/// How the argument name is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Declarator {
    /// Passed by value.
    #[default]
    Value,
    /// Passed as a pointer.
    Pointer,
}

/// An unresolved argument declaration contributed by a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    /// Argument name.
    pub name: String,
    /// Qualifier.
    pub qualifier: Qualifier,
    /// Host-side type.
    pub ty: TypeDescriptor,
    /// Declarator form.
    pub declarator: Declarator,
}

impl ArgumentSpec {
    /// Create a declaration.
    pub fn new(
        name: impl Into<String>,
        qualifier: Qualifier,
        ty: impl Into<TypeDescriptor>,
        declarator: Declarator,
    ) -> Self {
        Self {
            name: name.into(),
            qualifier,
            ty: ty.into(),
            declarator,
        }
    }

    /// `__global T *name`.
    pub fn global_buffer(name: impl Into<String>, ty: impl Into<TypeDescriptor>) -> Self {
        Self::new(name, Qualifier::Global, ty, Declarator::Pointer)
    }

    /// `__constant T *name`.
    pub fn constant_buffer(name: impl Into<String>, ty: impl Into<TypeDescriptor>) -> Self {
        Self::new(name, Qualifier::Constant, ty, Declarator::Pointer)
    }

    /// `__local T *name`.
    pub fn local_buffer(name: impl Into<String>, ty: impl Into<TypeDescriptor>) -> Self {
        Self::new(name, Qualifier::Local, ty, Declarator::Pointer)
    }

    /// `T name`, passed by value.
    pub fn scalar(name: impl Into<String>, ty: impl Into<TypeDescriptor>) -> Self {
        Self::new(name, Qualifier::Private, ty, Declarator::Value)
    }

    /// A struct passed by value; its type is synthesized from `layout`.
    pub fn structure(name: impl Into<String>, layout: StructLayout) -> Self {
        Self::new(name, Qualifier::Private, layout, Declarator::Value)
    }

    /// An image with the given access qualifier.
    pub fn image(name: impl Into<String>, ty: impl Into<TypeDescriptor>, access: Qualifier) -> Self {
        Self::new(name, access, ty, Declarator::Value)
    }

    /// `sampler_t name`.
    pub fn sampler(name: impl Into<String>) -> Self {
        Self::new(name, Qualifier::Private, "sampler_t", Declarator::Value)
    }

    /// Scalar argument from a numeric descriptor.
    pub fn numeric(name: impl Into<String>, numeric: NumericType) -> Self {
        Self::scalar(name, numeric)
    }
}

/// A resolved kernel argument, ready for the signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArgumentDeclaration {
    /// Argument name, unique within its schema.
    pub name: String,
    /// Qualifier.
    pub qualifier: Qualifier,
    /// Device type name.
    pub device_type: String,
    /// Declarator text (`*name` or `name`).
    pub declarator: String,
}

impl ArgumentDeclaration {
    /// Signature text, e.g. `__global float *a`.
    pub fn to_source(&self) -> String {
        let qualifier = self.qualifier.as_str();
        if qualifier.is_empty() {
            format!("{} {}", self.device_type, self.declarator)
        } else {
            format!("{qualifier} {} {}", self.device_type, self.declarator)
        }
    }

    /// Whether the argument is passed as a pointer.
    pub fn is_pointer(&self) -> bool {
        self.declarator.starts_with('*')
    }
}

impl fmt::Display for ArgumentDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source())
    }
}

/// Ordered, uniquely named kernel arguments plus everything they need emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSchema {
    /// Arguments in binding order.
    pub arguments: Vec<ArgumentDeclaration>,
    /// Struct declarations, in first-use order.
    pub structs: Vec<StructDescriptor>,
    /// Library texts, in fragment order.
    pub libraries: Vec<String>,
    /// Extensions, sorted.
    pub extensions: Vec<Extension>,
}

impl ArgumentSchema {
    /// Argument names in binding order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().map(|a| a.name.as_str())
    }

    /// Look up an argument by name.
    pub fn get(&self, name: &str) -> Option<&ArgumentDeclaration> {
        self.arguments.iter().find(|a| a.name == name)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    /// Whether the schema declares no arguments.
    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// Whether the schema needs the given extension.
    pub fn requires(&self, extension: Extension) -> bool {
        self.extensions.contains(&extension)
    }
}

/// Output of a schema build: the schema plus the fragment texts to compose.
#[derive(Debug, Clone)]
pub struct ResolvedKernel {
    /// Merged argument schema.
    pub schema: ArgumentSchema,
    /// Primary expression text.
    pub body: String,
    /// Postprocess expression text, if a postprocess fragment supplied one.
    pub postprocess: Option<String>,
    /// Layout metadata carried by the primary fragment.
    pub layout: Option<LayoutSpec>,
}

/// Merges argument declarations from extras and fragments.
///
/// The builder owns the struct registry; it is cleared at the start of every
/// build so two kernels never share struct state.
pub struct SchemaBuilder<'m> {
    matcher: &'m dyn StructMatcher,
    registry: StructRegistry,
}

impl<'m> SchemaBuilder<'m> {
    /// Create a builder that lays out structs with `matcher`.
    pub fn new(matcher: &'m dyn StructMatcher) -> Self {
        Self {
            matcher,
            registry: StructRegistry::new(),
        }
    }

    /// Build the schema.
    ///
    /// Arguments are taken from `extras`, then `primary`, then
    /// `postprocess`. The first declaration of a name wins.
    pub fn build(
        &mut self,
        extras: &[ArgumentSpec],
        primary: &Fragment,
        postprocess: Option<&Fragment>,
    ) -> CodegenResult<ResolvedKernel> {
        self.registry.clear();

        let body = primary.require_expression("primary")?.to_string();
        let postprocess_body = postprocess
            .and_then(|f| f.expression_text())
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string);

        let specs = extras
            .iter()
            .chain(primary.arguments())
            .chain(postprocess.map(|f| f.arguments()).unwrap_or_default());

        let mut arguments: Vec<ArgumentDeclaration> = Vec::new();
        let mut extensions: Vec<Extension> = Vec::new();
        let mut resolver = TypeResolver::new(self.matcher, &mut self.registry);

        for (index, spec) in specs.enumerate() {
            let resolved = resolver.resolve(index, &spec.name, &spec.ty)?;
            let required = resolved.required_extensions;

            let declaration = ArgumentDeclaration {
                name: spec.name.clone(),
                qualifier: spec.qualifier,
                device_type: resolved.device_type,
                declarator: match spec.declarator {
                    Declarator::Pointer => format!("*{}", spec.name),
                    Declarator::Value => spec.name.clone(),
                },
            };

            match arguments.iter().find(|a| a.name == declaration.name) {
                Some(existing) if *existing != declaration => {
                    tracing::warn!(
                        argument = %declaration.name,
                        kept = %existing,
                        ignored = %declaration,
                        "Conflicting redeclaration of kernel argument"
                    );
                }
                Some(_) => {}
                None => {
                    extensions.extend(required.iter().copied());
                    arguments.push(declaration);
                }
            }
        }

        extensions.sort();
        extensions.dedup();

        let mut libraries: Vec<String> = Vec::new();
        for text in [Some(primary), postprocess]
            .into_iter()
            .flatten()
            .filter_map(|f| f.library_text())
        {
            if !text.trim().is_empty() && !libraries.iter().any(|l| l == text) {
                libraries.push(text.to_string());
            }
        }

        let schema = ArgumentSchema {
            arguments,
            structs: self.registry.take(),
            libraries,
            extensions,
        };

        tracing::debug!(
            arguments = schema.len(),
            structs = schema.structs.len(),
            primary = primary.kind(),
            "Assembled argument schema"
        );

        Ok(ResolvedKernel {
            schema,
            body,
            postprocess: postprocess_body,
            layout: primary.layout().cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{MappingFragment, ObjectFragment, KEY_ARGUMENTS, KEY_EXPRESSION};
    use crate::structs::NaturalLayoutMatcher;
    use crate::CodegenError;

    fn names(schema: &ArgumentSchema) -> Vec<&str> {
        schema.names().collect()
    }

    #[test]
    fn test_assembly_order() {
        let extras = vec![ArgumentSpec::numeric("n", NumericType::U32)];
        let primary: Fragment = ObjectFragment::new("b[gid] = a[gid];")
            .with_argument(ArgumentSpec::global_buffer("a", NumericType::F32))
            .with_argument(ArgumentSpec::global_buffer("b", NumericType::F32))
            .into();
        let post: Fragment = MappingFragment::new()
            .with(KEY_EXPRESSION, "b[gid] *= scale;")
            .with(KEY_ARGUMENTS, vec![ArgumentSpec::scalar("scale", "float")])
            .into();

        let resolved = SchemaBuilder::new(&NaturalLayoutMatcher)
            .build(&extras, &primary, Some(&post))
            .unwrap();

        assert_eq!(names(&resolved.schema), vec!["n", "a", "b", "scale"]);
        assert_eq!(resolved.schema.arguments[1].to_source(), "__global float *a");
        assert_eq!(resolved.schema.arguments[0].to_source(), "uint n");
        assert_eq!(resolved.postprocess.as_deref(), Some("b[gid] *= scale;"));
    }

    #[test]
    fn test_duplicate_names_are_merged() {
        let extras = vec![ArgumentSpec::global_buffer("a", "float")];
        let primary: Fragment = ObjectFragment::new("a[gid] = 0;")
            .with_argument(ArgumentSpec::global_buffer("a", "float"))
            .with_argument(ArgumentSpec::global_buffer("a", "int"))
            .into();

        let resolved = SchemaBuilder::new(&NaturalLayoutMatcher)
            .build(&extras, &primary, None)
            .unwrap();

        assert_eq!(resolved.schema.len(), 1);
        assert_eq!(resolved.schema.arguments[0].device_type, "float");
    }

    #[test]
    fn test_dropped_redeclaration_adds_no_extensions() {
        let extras = vec![ArgumentSpec::global_buffer("a", "float")];
        let primary: Fragment = ObjectFragment::new("a[gid] = 0;")
            .with_argument(ArgumentSpec::global_buffer("a", NumericType::C128))
            .into();

        let resolved = SchemaBuilder::new(&NaturalLayoutMatcher)
            .build(&extras, &primary, None)
            .unwrap();

        assert_eq!(resolved.schema.arguments[0].to_source(), "__global float *a");
        assert!(resolved.schema.extensions.is_empty());
    }

    #[test]
    fn test_struct_arguments_emit_once() {
        let layout = StructLayout::new().field("gain", "float").field("bias", "float");
        let primary: Fragment = ObjectFragment::new("out[gid] = p.gain;")
            .with_argument(ArgumentSpec::structure("p", layout.clone()))
            .into();
        let extras = vec![ArgumentSpec::structure("p", layout)];

        let mut builder = SchemaBuilder::new(&NaturalLayoutMatcher);
        let first = builder.build(&extras, &primary, None).unwrap();
        let second = builder.build(&extras, &primary, None).unwrap();

        assert_eq!(first.schema.structs.len(), 1);
        assert_eq!(first.schema.structs[0].struct_name, "p_t");
        assert_eq!(first.schema, second.schema);
    }

    #[test]
    fn test_type_errors_propagate_with_index() {
        let primary: Fragment = ObjectFragment::new("x;")
            .with_argument(ArgumentSpec::global_buffer("ok", "float"))
            .with_argument(ArgumentSpec::global_buffer("bad", "vec4"))
            .into();
        let extras = vec![ArgumentSpec::scalar("n", "int")];

        let err = SchemaBuilder::new(&NaturalLayoutMatcher)
            .build(&extras, &primary, None)
            .unwrap_err();
        match err {
            CodegenError::InvalidType { index, argument, value, .. } => {
                assert_eq!(index, 2);
                assert_eq!(argument, "bad");
                assert_eq!(value, "vec4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_primary_expression() {
        let primary: Fragment = MappingFragment::new()
            .with(KEY_ARGUMENTS, vec![ArgumentSpec::global_buffer("a", "float")])
            .into();
        let err = SchemaBuilder::new(&NaturalLayoutMatcher)
            .build(&[], &primary, None)
            .unwrap_err();
        assert!(matches!(err, CodegenError::ExpressionResolution { .. }));
    }

    #[test]
    fn test_extensions_and_libraries_collected() {
        let primary: Fragment = ObjectFragment::new("acc[gid] = cmul(acc[gid], w);")
            .with_argument(ArgumentSpec::global_buffer("acc", NumericType::C128))
            .with_argument(ArgumentSpec::scalar("w", NumericType::C128))
            .with_library("/* helpers */")
            .into();
        let post: Fragment = ObjectFragment::new("acc[gid] = acc[gid];")
            .with_library("/* helpers */")
            .into();

        let resolved = SchemaBuilder::new(&NaturalLayoutMatcher)
            .build(&[], &primary, Some(&post))
            .unwrap();

        assert_eq!(resolved.schema.extensions, vec![Extension::Fp64, Extension::Complex]);
        assert!(resolved.schema.requires(Extension::Complex));
        assert_eq!(resolved.schema.libraries, vec!["/* helpers */".to_string()]);
    }
}
