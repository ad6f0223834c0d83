//! Type resolution from host-side descriptors to OpenCL C.
//!
//! # Type Mappings
//!
//! | Descriptor | Device type | Extensions |
//! |------------|-------------|------------|
//! | `int8` / `uint8` | `char` / `uchar` | |
//! | `int16` / `uint16` | `short` / `ushort` | |
//! | `int32` / `uint32` | `int` / `uint` | |
//! | `int64` / `uint64` | `long` / `ulong` | |
//! | `float16` | `half` | |
//! | `float32` | `float` | |
//! | `float64` | `double` | fp64 |
//! | `complex64` | `cfloat_t` | complex |
//! | `complex128` | `cdouble_t` | fp64, complex |
//! | named type | itself, if in the vocabulary | fp64 for `double*` |
//! | structured layout | `<argument>_t` | those of its fields |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::structs::{struct_name_for, StructDescriptor, StructLayout, StructMatcher, StructRegistry};
use crate::{CodegenError, CodegenResult};

/// Scalar device types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarType {
    /// 8-bit signed integer.
    Char,
    /// 8-bit unsigned integer.
    UChar,
    /// 16-bit signed integer.
    Short,
    /// 16-bit unsigned integer.
    UShort,
    /// 32-bit signed integer.
    Int,
    /// 32-bit unsigned integer.
    UInt,
    /// 64-bit signed integer.
    Long,
    /// 64-bit unsigned integer.
    ULong,
    /// 16-bit float.
    Half,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
}

impl ScalarType {
    const ALL: [ScalarType; 11] = [
        ScalarType::Char,
        ScalarType::UChar,
        ScalarType::Short,
        ScalarType::UShort,
        ScalarType::Int,
        ScalarType::UInt,
        ScalarType::Long,
        ScalarType::ULong,
        ScalarType::Half,
        ScalarType::Float,
        ScalarType::Double,
    ];

    /// OpenCL C spelling.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Char => "char",
            ScalarType::UChar => "uchar",
            ScalarType::Short => "short",
            ScalarType::UShort => "ushort",
            ScalarType::Int => "int",
            ScalarType::UInt => "uint",
            ScalarType::Long => "long",
            ScalarType::ULong => "ulong",
            ScalarType::Half => "half",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        match self {
            ScalarType::Char | ScalarType::UChar => 1,
            ScalarType::Short | ScalarType::UShort | ScalarType::Half => 2,
            ScalarType::Int | ScalarType::UInt | ScalarType::Float => 4,
            ScalarType::Long | ScalarType::ULong | ScalarType::Double => 8,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Whether vector forms of this scalar are part of the vocabulary.
    fn has_vector_forms(&self) -> bool {
        matches!(
            self,
            ScalarType::Float | ScalarType::Double | ScalarType::Int | ScalarType::UInt | ScalarType::UChar
        )
    }
}

/// Vector lane counts accepted by the vocabulary.
const VECTOR_LANES: [u8; 5] = [2, 3, 4, 8, 16];

/// A member of the fixed device type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    /// Scalar such as `float`.
    Scalar(ScalarType),
    /// Vector such as `float4`.
    Vector {
        /// Lane type.
        element: ScalarType,
        /// Lane count (2, 3, 4, 8 or 16).
        lanes: u8,
    },
    /// `cfloat_t` (two packed floats).
    ComplexFloat,
    /// `cdouble_t` (two packed doubles).
    ComplexDouble,
    /// `image1d_t`.
    Image1d,
    /// `image2d_t`.
    Image2d,
    /// `image3d_t`.
    Image3d,
    /// `sampler_t`.
    Sampler,
    /// `event_t`.
    Event,
}

impl DeviceType {
    /// Parse a device type name; `None` if it is outside the vocabulary.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "cfloat_t" => return Some(DeviceType::ComplexFloat),
            "cdouble_t" => return Some(DeviceType::ComplexDouble),
            "image1d_t" => return Some(DeviceType::Image1d),
            "image2d_t" => return Some(DeviceType::Image2d),
            "image3d_t" => return Some(DeviceType::Image3d),
            "sampler_t" => return Some(DeviceType::Sampler),
            "event_t" => return Some(DeviceType::Event),
            _ => {}
        }

        if let Some(scalar) = ScalarType::from_name(name) {
            return Some(DeviceType::Scalar(scalar));
        }

        let split = name.find(|c: char| c.is_ascii_digit())?;
        let (base, digits) = name.split_at(split);
        let element = ScalarType::from_name(base).filter(ScalarType::has_vector_forms)?;
        let lanes: u8 = digits.parse().ok()?;
        if !VECTOR_LANES.contains(&lanes) || digits != lanes.to_string() {
            return None;
        }
        Some(DeviceType::Vector { element, lanes })
    }

    /// Every name in the vocabulary, in a stable order.
    pub fn vocabulary() -> Vec<DeviceType> {
        let mut all: Vec<DeviceType> = ScalarType::ALL.into_iter().map(DeviceType::Scalar).collect();
        for element in ScalarType::ALL.into_iter().filter(ScalarType::has_vector_forms) {
            for lanes in VECTOR_LANES {
                all.push(DeviceType::Vector { element, lanes });
            }
        }
        all.extend([
            DeviceType::ComplexFloat,
            DeviceType::ComplexDouble,
            DeviceType::Image1d,
            DeviceType::Image2d,
            DeviceType::Image3d,
            DeviceType::Sampler,
            DeviceType::Event,
        ]);
        all
    }

    /// Size and alignment in bytes, for types that can live in a struct.
    ///
    /// Three-lane vectors occupy the space of four lanes.
    pub fn size_and_align(&self) -> Option<(usize, usize)> {
        match self {
            DeviceType::Scalar(s) => Some((s.size(), s.size())),
            DeviceType::Vector { element, lanes } => {
                let stored = if *lanes == 3 { 4 } else { *lanes as usize };
                let size = stored * element.size();
                Some((size, size))
            }
            DeviceType::ComplexFloat => Some((8, 8)),
            DeviceType::ComplexDouble => Some((16, 16)),
            _ => None,
        }
    }

    /// Extensions needed to use this type in source.
    pub fn required_extensions(&self) -> Vec<Extension> {
        match self {
            DeviceType::Scalar(ScalarType::Double)
            | DeviceType::Vector {
                element: ScalarType::Double,
                ..
            } => vec![Extension::Fp64],
            DeviceType::ComplexFloat => vec![Extension::Complex],
            DeviceType::ComplexDouble => vec![Extension::Fp64, Extension::Complex],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Scalar(s) => f.write_str(s.name()),
            DeviceType::Vector { element, lanes } => write!(f, "{}{}", element.name(), lanes),
            DeviceType::ComplexFloat => f.write_str("cfloat_t"),
            DeviceType::ComplexDouble => f.write_str("cdouble_t"),
            DeviceType::Image1d => f.write_str("image1d_t"),
            DeviceType::Image2d => f.write_str("image2d_t"),
            DeviceType::Image3d => f.write_str("image3d_t"),
            DeviceType::Sampler => f.write_str("sampler_t"),
            DeviceType::Event => f.write_str("event_t"),
        }
    }
}

/// Device extension a kernel depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Extension {
    /// Double precision (`cl_khr_fp64`).
    Fp64,
    /// Complex arithmetic typedefs and helpers.
    Complex,
}

/// Kind of a host numeric descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericKind {
    /// Signed integer.
    Int,
    /// Unsigned integer.
    UInt,
    /// IEEE float.
    Float,
    /// Complex number made of two floats.
    Complex,
}

/// Host-side numeric descriptor: a kind plus a bit width.
///
/// Not every combination is valid; [`TypeResolver`] rejects the ones the
/// device cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumericType {
    /// Numeric kind.
    pub kind: NumericKind,
    /// Total width in bits.
    pub bits: u16,
}

impl NumericType {
    /// `int8`.
    pub const I8: Self = Self::new(NumericKind::Int, 8);
    /// `int16`.
    pub const I16: Self = Self::new(NumericKind::Int, 16);
    /// `int32`.
    pub const I32: Self = Self::new(NumericKind::Int, 32);
    /// `int64`.
    pub const I64: Self = Self::new(NumericKind::Int, 64);
    /// `uint8`.
    pub const U8: Self = Self::new(NumericKind::UInt, 8);
    /// `uint16`.
    pub const U16: Self = Self::new(NumericKind::UInt, 16);
    /// `uint32`.
    pub const U32: Self = Self::new(NumericKind::UInt, 32);
    /// `uint64`.
    pub const U64: Self = Self::new(NumericKind::UInt, 64);
    /// `float16`.
    pub const F16: Self = Self::new(NumericKind::Float, 16);
    /// `float32`.
    pub const F32: Self = Self::new(NumericKind::Float, 32);
    /// `float64`.
    pub const F64: Self = Self::new(NumericKind::Float, 64);
    /// `complex64`.
    pub const C64: Self = Self::new(NumericKind::Complex, 64);
    /// `complex128`.
    pub const C128: Self = Self::new(NumericKind::Complex, 128);

    /// Create a descriptor.
    pub const fn new(kind: NumericKind, bits: u16) -> Self {
        Self { kind, bits }
    }

    /// Parse names like `float32`, `uint8` or `complex128`.
    pub fn parse(s: &str) -> Option<Self> {
        let split = s.find(|c: char| c.is_ascii_digit())?;
        let (kind, bits) = s.split_at(split);
        let kind = match kind {
            "int" => NumericKind::Int,
            "uint" => NumericKind::UInt,
            "float" => NumericKind::Float,
            "complex" => NumericKind::Complex,
            _ => return None,
        };
        Some(Self::new(kind, bits.parse().ok()?))
    }

    /// The device type this descriptor maps to, if the width is supported.
    pub fn device_type(&self) -> Option<DeviceType> {
        let scalar = |s| Some(DeviceType::Scalar(s));
        match (self.kind, self.bits) {
            (NumericKind::Int, 8) => scalar(ScalarType::Char),
            (NumericKind::Int, 16) => scalar(ScalarType::Short),
            (NumericKind::Int, 32) => scalar(ScalarType::Int),
            (NumericKind::Int, 64) => scalar(ScalarType::Long),
            (NumericKind::UInt, 8) => scalar(ScalarType::UChar),
            (NumericKind::UInt, 16) => scalar(ScalarType::UShort),
            (NumericKind::UInt, 32) => scalar(ScalarType::UInt),
            (NumericKind::UInt, 64) => scalar(ScalarType::ULong),
            (NumericKind::Float, 16) => scalar(ScalarType::Half),
            (NumericKind::Float, 32) => scalar(ScalarType::Float),
            (NumericKind::Float, 64) => scalar(ScalarType::Double),
            (NumericKind::Complex, 64) => Some(DeviceType::ComplexFloat),
            (NumericKind::Complex, 128) => Some(DeviceType::ComplexDouble),
            _ => None,
        }
    }
}

impl fmt::Display for NumericType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            NumericKind::Int => "int",
            NumericKind::UInt => "uint",
            NumericKind::Float => "float",
            NumericKind::Complex => "complex",
        };
        write!(f, "{kind}{}", self.bits)
    }
}

/// Host-side description of an argument's type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeDescriptor {
    /// A device type name such as `float4`.
    Named(String),
    /// A numeric scalar or complex descriptor.
    Numeric(NumericType),
    /// A composite with named fields.
    Struct(StructLayout),
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Named(name) => f.write_str(name),
            TypeDescriptor::Numeric(numeric) => write!(f, "{numeric}"),
            TypeDescriptor::Struct(layout) => write!(f, "{layout}"),
        }
    }
}

impl From<&str> for TypeDescriptor {
    fn from(name: &str) -> Self {
        TypeDescriptor::Named(name.to_string())
    }
}

impl From<String> for TypeDescriptor {
    fn from(name: String) -> Self {
        TypeDescriptor::Named(name)
    }
}

impl From<NumericType> for TypeDescriptor {
    fn from(numeric: NumericType) -> Self {
        TypeDescriptor::Numeric(numeric)
    }
}

impl From<DeviceType> for TypeDescriptor {
    fn from(ty: DeviceType) -> Self {
        TypeDescriptor::Named(ty.to_string())
    }
}

impl From<StructLayout> for TypeDescriptor {
    fn from(layout: StructLayout) -> Self {
        TypeDescriptor::Struct(layout)
    }
}

/// Outcome of resolving one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    /// Type name as written in the kernel source.
    pub device_type: String,
    /// Whether a struct declaration must precede the kernel.
    pub requires_struct: bool,
    /// The struct declaration, for composite descriptors.
    pub struct_decl: Option<StructDescriptor>,
    /// Extensions the type depends on.
    pub required_extensions: Vec<Extension>,
}

impl ResolvedType {
    fn plain(ty: DeviceType) -> Self {
        Self {
            device_type: ty.to_string(),
            requires_struct: false,
            struct_decl: None,
            required_extensions: ty.required_extensions(),
        }
    }
}

/// Resolves type descriptors against the device vocabulary.
///
/// Struct declarations go through the supplied [`StructMatcher`] and are
/// cached in the borrowed [`StructRegistry`], so resolving the same argument
/// twice yields the same declaration without asking the matcher again.
pub struct TypeResolver<'a> {
    matcher: &'a dyn StructMatcher,
    registry: &'a mut StructRegistry,
}

impl<'a> TypeResolver<'a> {
    /// Create a resolver.
    pub fn new(matcher: &'a dyn StructMatcher, registry: &'a mut StructRegistry) -> Self {
        Self { matcher, registry }
    }

    /// Resolve the descriptor of the argument at `index` named `argument`.
    pub fn resolve(
        &mut self,
        index: usize,
        argument: &str,
        descr: &TypeDescriptor,
    ) -> CodegenResult<ResolvedType> {
        let invalid = |reason: &str| CodegenError::InvalidType {
            index,
            argument: argument.to_string(),
            value: descr.to_string(),
            reason: reason.to_string(),
        };

        match descr {
            TypeDescriptor::Named(name) => DeviceType::parse(name)
                .map(ResolvedType::plain)
                .ok_or_else(|| invalid("not a device type name")),
            TypeDescriptor::Numeric(numeric) => numeric.device_type().map(ResolvedType::plain).ok_or_else(|| {
                invalid(
                    "expected a device type name, a structured layout, \
                     or a numeric descriptor (int/uint 8-64, float 16/32/64, complex 64/128)",
                )
            }),
            TypeDescriptor::Struct(layout) => self.resolve_struct(argument, layout).map_err(|reason| invalid(&reason)),
        }
    }

    fn resolve_struct(&mut self, argument: &str, layout: &StructLayout) -> Result<ResolvedType, String> {
        let struct_name = struct_name_for(argument);

        let descriptor = match self.registry.get(&struct_name) {
            Some(cached) => cached.clone(),
            None => {
                if layout.fields.is_empty() {
                    return Err("struct has no fields".to_string());
                }
                let mut fields = Vec::with_capacity(layout.fields.len());
                for (field, ty) in &layout.fields {
                    fields.push((field.clone(), field_type(field, ty)?));
                }
                let descriptor = self
                    .matcher
                    .match_struct(&struct_name, &fields)
                    .map_err(|e| e.to_string())?;
                tracing::debug!(
                    struct_name = %struct_name,
                    size = descriptor.size,
                    "Matched struct layout"
                );
                self.registry.insert(descriptor.clone());
                descriptor
            }
        };

        Ok(ResolvedType {
            device_type: struct_name,
            requires_struct: true,
            required_extensions: descriptor.required_extensions(),
            struct_decl: Some(descriptor),
        })
    }
}

fn field_type(field: &str, ty: &TypeDescriptor) -> Result<DeviceType, String> {
    let resolved = match ty {
        TypeDescriptor::Named(name) => DeviceType::parse(name),
        TypeDescriptor::Numeric(numeric) => numeric.device_type(),
        TypeDescriptor::Struct(_) => {
            return Err(format!("field `{field}` is a nested struct"));
        }
    };
    match resolved {
        Some(device) if device.size_and_align().is_some() => Ok(device),
        Some(device) => Err(format!("field `{field}` has unsized type `{device}`")),
        None => Err(format!("field `{field}` has invalid type `{ty}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::NaturalLayoutMatcher;

    fn resolve(descr: impl Into<TypeDescriptor>) -> CodegenResult<ResolvedType> {
        let mut registry = StructRegistry::new();
        TypeResolver::new(&NaturalLayoutMatcher, &mut registry).resolve(0, "x", &descr.into())
    }

    #[test]
    fn test_numeric_mappings() {
        let cases = [
            (NumericType::I8, "char"),
            (NumericType::I16, "short"),
            (NumericType::I32, "int"),
            (NumericType::I64, "long"),
            (NumericType::U8, "uchar"),
            (NumericType::U16, "ushort"),
            (NumericType::U32, "uint"),
            (NumericType::U64, "ulong"),
            (NumericType::F16, "half"),
            (NumericType::F32, "float"),
            (NumericType::F64, "double"),
            (NumericType::C64, "cfloat_t"),
            (NumericType::C128, "cdouble_t"),
        ];
        for (numeric, expected) in cases {
            let resolved = resolve(numeric).unwrap();
            assert_eq!(resolved.device_type, expected, "{numeric}");
            assert!(!resolved.requires_struct);
        }
    }

    #[test]
    fn test_extension_flags() {
        assert!(resolve(NumericType::F32).unwrap().required_extensions.is_empty());
        assert_eq!(resolve(NumericType::F64).unwrap().required_extensions, vec![Extension::Fp64]);
        assert_eq!(resolve(NumericType::C64).unwrap().required_extensions, vec![Extension::Complex]);
        assert_eq!(
            resolve(NumericType::C128).unwrap().required_extensions,
            vec![Extension::Fp64, Extension::Complex]
        );
    }

    #[test]
    fn test_unsupported_width_lists_categories() {
        let err = resolve(NumericType::new(NumericKind::Float, 8)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("float8"));
        assert!(message.contains("structured layout"));
        assert!(message.contains("numeric descriptor"));
    }

    #[test]
    fn test_vocabulary() {
        let vocabulary = DeviceType::vocabulary();
        assert_eq!(vocabulary.len(), 43);
        for ty in vocabulary {
            assert_eq!(DeviceType::parse(&ty.to_string()), Some(ty));
        }
        assert_eq!(DeviceType::parse("float5"), None);
        assert_eq!(DeviceType::parse("short4"), None);
        assert_eq!(DeviceType::parse("float04"), None);
    }

    #[test]
    fn test_named_type_rejected_with_context() {
        let mut registry = StructRegistry::new();
        let err = TypeResolver::new(&NaturalLayoutMatcher, &mut registry)
            .resolve(3, "weights", &"flaot4".into())
            .unwrap_err();
        assert_eq!(
            err,
            CodegenError::InvalidType {
                index: 3,
                argument: "weights".to_string(),
                value: "flaot4".to_string(),
                reason: "not a device type name".to_string(),
            }
        );
    }

    #[test]
    fn test_named_double_requires_fp64() {
        let resolved = resolve("double4").unwrap();
        assert_eq!(resolved.required_extensions, vec![Extension::Fp64]);
    }

    #[test]
    fn test_struct_resolution_is_cached() {
        let layout = StructLayout::new()
            .field("scale", NumericType::F32)
            .field("offset", "float4");
        let mut registry = StructRegistry::new();
        let mut resolver = TypeResolver::new(&NaturalLayoutMatcher, &mut registry);

        let first = resolver.resolve(0, "params", &layout.clone().into()).unwrap();
        let second = resolver.resolve(1, "params", &layout.into()).unwrap();

        assert_eq!(first.device_type, "params_t");
        assert!(first.requires_struct);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_struct_rejects_unsized_field() {
        let layout = StructLayout::new().field("img", "image2d_t");
        let err = resolve(layout).unwrap_err();
        assert!(err.to_string().contains("unsized"));
    }

    #[test]
    fn test_numeric_parse() {
        assert_eq!(NumericType::parse("float32"), Some(NumericType::F32));
        assert_eq!(NumericType::parse("complex128"), Some(NumericType::C128));
        assert_eq!(NumericType::parse("bool"), None);
    }
}
