//! Dynamically typed kernel arguments.

use serde::{Deserialize, Serialize};

/// Opaque handle of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferHandle {
    /// Backend-assigned id.
    pub id: u64,
    /// Size in bytes.
    pub size: usize,
}

impl BufferHandle {
    /// Create a handle.
    pub const fn new(id: u64, size: usize) -> Self {
        Self { id, size }
    }
}

/// Opaque handle of a device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageHandle {
    /// Backend-assigned id.
    pub id: u64,
    /// Width, height and depth in pixels.
    pub extent: [usize; 3],
}

/// Opaque handle of a device sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SamplerHandle {
    /// Backend-assigned id.
    pub id: u64,
}

/// A by-value scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// `char`.
    I8(i8),
    /// `short`.
    I16(i16),
    /// `int`.
    I32(i32),
    /// `long`.
    I64(i64),
    /// `uchar`.
    U8(u8),
    /// `ushort`.
    U16(u16),
    /// `uint`.
    U32(u32),
    /// `ulong`.
    U64(u64),
    /// `float`.
    F32(f32),
    /// `double`.
    F64(f64),
}

impl ScalarValue {
    /// Native-endian bytes, as they are copied into the argument slot.
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        match self {
            ScalarValue::I8(v) => v.to_ne_bytes().to_vec(),
            ScalarValue::I16(v) => v.to_ne_bytes().to_vec(),
            ScalarValue::I32(v) => v.to_ne_bytes().to_vec(),
            ScalarValue::I64(v) => v.to_ne_bytes().to_vec(),
            ScalarValue::U8(v) => v.to_ne_bytes().to_vec(),
            ScalarValue::U16(v) => v.to_ne_bytes().to_vec(),
            ScalarValue::U32(v) => v.to_ne_bytes().to_vec(),
            ScalarValue::U64(v) => v.to_ne_bytes().to_vec(),
            ScalarValue::F32(v) => v.to_ne_bytes().to_vec(),
            ScalarValue::F64(v) => v.to_ne_bytes().to_vec(),
        }
    }
}

/// One argument value passed at call time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelArg {
    /// A buffer.
    Buffer(BufferHandle),
    /// An image.
    Image(ImageHandle),
    /// A sampler.
    Sampler(SamplerHandle),
    /// A scalar.
    Scalar(ScalarValue),
    /// Raw bytes of a by-value struct.
    Bytes(Vec<u8>),
    /// Size in bytes of a `__local` allocation.
    Local(usize),
}

impl KernelArg {
    /// By-value struct argument from a plain-old-data host value.
    pub fn from_pod<T: bytemuck::Pod>(value: &T) -> Self {
        KernelArg::Bytes(bytemuck::bytes_of(value).to_vec())
    }

    /// Short kind name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            KernelArg::Buffer(_) => "buffer",
            KernelArg::Image(_) => "image",
            KernelArg::Sampler(_) => "sampler",
            KernelArg::Scalar(_) => "scalar",
            KernelArg::Bytes(_) => "bytes",
            KernelArg::Local(_) => "local",
        }
    }
}

impl From<BufferHandle> for KernelArg {
    fn from(handle: BufferHandle) -> Self {
        KernelArg::Buffer(handle)
    }
}

impl From<ImageHandle> for KernelArg {
    fn from(handle: ImageHandle) -> Self {
        KernelArg::Image(handle)
    }
}

impl From<SamplerHandle> for KernelArg {
    fn from(handle: SamplerHandle) -> Self {
        KernelArg::Sampler(handle)
    }
}

impl From<ScalarValue> for KernelArg {
    fn from(value: ScalarValue) -> Self {
        KernelArg::Scalar(value)
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ScalarValue {
                fn from(value: $ty) -> Self {
                    ScalarValue::$variant(value)
                }
            }

            impl From<$ty> for KernelArg {
                fn from(value: $ty) -> Self {
                    KernelArg::Scalar(ScalarValue::$variant(value))
                }
            }
        )*
    };
}

scalar_from! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

/// Positional and keyword arguments of one call.
///
/// ```
/// use kernelweave::{BufferHandle, CallArgs};
///
/// let args = CallArgs::new()
///     .arg(BufferHandle::new(1, 400))
///     .kwarg("scale", 2.0f32);
/// assert_eq!(args.positional().len(), 1);
/// assert_eq!(args.keyword()[0].0, "scale");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<KernelArg>,
    keyword: Vec<(String, KernelArg)>,
}

impl CallArgs {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<KernelArg>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Append a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<KernelArg>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }

    /// Positional arguments in call order.
    pub fn positional(&self) -> &[KernelArg] {
        &self.positional
    }

    /// Keyword arguments in call order.
    pub fn keyword(&self) -> &[(String, KernelArg)] {
        &self.keyword
    }

    /// Split into positional and keyword parts.
    pub fn into_parts(self) -> (Vec<KernelArg>, Vec<(String, KernelArg)>) {
        (self.positional, self.keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Params {
        gain: f32,
        bias: f32,
    }

    #[test]
    fn test_pod_arguments_keep_layout() {
        let arg = KernelArg::from_pod(&Params { gain: 1.0, bias: 0.5 });
        match arg {
            KernelArg::Bytes(bytes) => {
                assert_eq!(bytes.len(), 8);
                assert_eq!(&bytes[..4], &1.0f32.to_ne_bytes());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(KernelArg::from(3u32), KernelArg::Scalar(ScalarValue::U32(3)));
        assert_eq!(ScalarValue::from(-1i8).to_ne_bytes(), vec![0xff]);
        assert_eq!(KernelArg::from(2.5f64).kind(), "scalar");
    }
}
