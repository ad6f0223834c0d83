//! Struct synthesis for composite argument types.

use std::fmt;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DeviceType, Extension, TypeDescriptor};

/// Struct name emitted for a composite argument.
///
/// Derived from the argument name only, so redeclaring the same argument
/// always yields the same struct.
pub fn struct_name_for(argument: &str) -> String {
    format!("{argument}_t")
}

/// Host-side composite layout: named fields in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructLayout {
    /// Fields as `(name, type)` pairs.
    pub fields: Vec<(String, TypeDescriptor)>,
}

impl StructLayout {
    /// Create an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field.
    pub fn field(mut self, name: impl Into<String>, ty: impl Into<TypeDescriptor>) -> Self {
        self.fields.push((name.into(), ty.into()));
        self
    }
}

impl fmt::Display for StructLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("struct {")?;
        for (i, (name, ty)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, " {name}: {ty}")?;
        }
        f.write_str(" }")
    }
}

/// A field of a matched struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    /// Field name.
    pub name: String,
    /// Field type.
    pub device_type: DeviceType,
    /// Byte offset within the struct.
    pub offset: usize,
}

/// A struct declaration ready for emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDescriptor {
    /// Struct type name.
    pub struct_name: String,
    /// Fields with device offsets.
    pub fields: Vec<StructField>,
    /// Total size in bytes, including tail padding.
    pub size: usize,
    /// Declaration text, including the trailing newline.
    pub declaration: String,
}

impl StructDescriptor {
    /// Extensions required by any field.
    pub fn required_extensions(&self) -> Vec<Extension> {
        let mut extensions: Vec<Extension> = self
            .fields
            .iter()
            .flat_map(|f| f.device_type.required_extensions())
            .collect();
        extensions.sort();
        extensions.dedup();
        extensions
    }
}

/// Failure reported by a [`StructMatcher`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct StructMatchError(pub String);

/// Computes device-specific packing for a struct.
///
/// Backends with their own layout rules provide an implementation;
/// [`NaturalLayoutMatcher`] covers devices that follow OpenCL C alignment.
pub trait StructMatcher: Send + Sync {
    /// Lay out `fields` as a struct named `name`.
    fn match_struct(
        &self,
        name: &str,
        fields: &[(String, DeviceType)],
    ) -> Result<StructDescriptor, StructMatchError>;
}

/// OpenCL C natural alignment with explicit padding members.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalLayoutMatcher;

impl StructMatcher for NaturalLayoutMatcher {
    fn match_struct(
        &self,
        name: &str,
        fields: &[(String, DeviceType)],
    ) -> Result<StructDescriptor, StructMatchError> {
        let mut offset = 0usize;
        let mut max_align = 1usize;
        let mut padding = 0usize;
        let mut matched = Vec::with_capacity(fields.len());
        let mut body = String::new();

        for (field, ty) in fields {
            let (size, align) = ty
                .size_and_align()
                .ok_or_else(|| StructMatchError(format!("field `{field}` has unsized type `{ty}`")))?;

            let aligned = offset.next_multiple_of(align);
            if aligned > offset {
                let _ = writeln!(body, "    char __pad{padding}[{}];", aligned - offset);
                padding += 1;
            }
            let _ = writeln!(body, "    {ty} {field};");

            matched.push(StructField {
                name: field.clone(),
                device_type: *ty,
                offset: aligned,
            });
            offset = aligned + size;
            max_align = max_align.max(align);
        }

        let size = offset.next_multiple_of(max_align);
        if size > offset {
            let _ = writeln!(body, "    char __pad{padding}[{}];", size - offset);
        }

        Ok(StructDescriptor {
            struct_name: name.to_string(),
            fields: matched,
            size,
            declaration: format!("typedef struct {{\n{body}}} {name};\n"),
        })
    }
}

/// Struct declarations collected during one schema build.
///
/// Keeps first-insertion order so emission is deterministic.
#[derive(Debug, Clone, Default)]
pub struct StructRegistry {
    structs: Vec<StructDescriptor>,
}

impl StructRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a declaration by struct name.
    pub fn get(&self, struct_name: &str) -> Option<&StructDescriptor> {
        self.structs.iter().find(|s| s.struct_name == struct_name)
    }

    /// Register a declaration. Returns `false` if the name was already present.
    pub fn insert(&mut self, descriptor: StructDescriptor) -> bool {
        if self.get(&descriptor.struct_name).is_some() {
            return false;
        }
        self.structs.push(descriptor);
        true
    }

    /// Number of registered structs.
    pub fn len(&self) -> usize {
        self.structs.len()
    }

    /// Whether no struct has been registered.
    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    /// Drop every registered struct.
    pub fn clear(&mut self) {
        self.structs.clear();
    }

    /// Take the declarations, leaving the registry empty.
    pub fn take(&mut self) -> Vec<StructDescriptor> {
        std::mem::take(&mut self.structs)
    }
}
