//! Dense tensor values exchanged with the runtime.

use core::fmt;

use bytes::Bytes;
use half::{bf16, f16};

use crate::error::TensorError;
use crate::ir::ElementType;

/// Element types that can be stored in a [`TensorValue`].
pub trait Element: bytemuck::Pod + fmt::Debug + Send + Sync + 'static {
    /// The matching ONNX element type.
    const ELEM_TYPE: ElementType;
}

macro_rules! impl_element {
    ($($ty:ty => $elem:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const ELEM_TYPE: ElementType = ElementType::$elem;
            }
        )*
    };
}

impl_element! {
    f32 => Float32,
    f64 => Float64,
    f16 => Float16,
    bf16 => BFloat16,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
}

/// An n-dimensional array with an element type and shape.
///
/// Data is kept as little-endian bytes in row-major order. Booleans are stored one byte per
/// element.
#[derive(Clone, PartialEq)]
pub struct TensorValue {
    elem_type: ElementType,
    shape: Vec<usize>,
    bytes: Bytes,
}

impl TensorValue {
    /// Create a tensor from typed data.
    ///
    /// # Panics
    ///
    /// If the number of elements does not match the shape.
    pub fn new<E: Element>(data: Vec<E>, shape: Vec<usize>) -> Self {
        let num_elements: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            num_elements,
            "Shape {shape:?} is invalid for input of size {:?}",
            data.len(),
        );

        Self {
            elem_type: E::ELEM_TYPE,
            shape,
            bytes: Bytes::copy_from_slice(bytemuck::cast_slice(&data)),
        }
    }

    /// Create a boolean tensor.
    ///
    /// # Panics
    ///
    /// If the number of elements does not match the shape.
    pub fn from_bools(data: Vec<bool>, shape: Vec<usize>) -> Self {
        let mut tensor = Self::new(data.into_iter().map(u8::from).collect::<Vec<_>>(), shape);
        tensor.elem_type = ElementType::Bool;
        tensor
    }

    /// Create a tensor from raw little-endian bytes, checking the payload length.
    pub fn from_bytes(
        elem_type: ElementType,
        shape: Vec<usize>,
        bytes: Bytes,
    ) -> Result<Self, TensorError> {
        let elem_size = elem_type
            .size()
            .ok_or(TensorError::UnsupportedElementType(elem_type))?;
        let expected = shape
            .iter()
            .try_fold(elem_size, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| TensorError::SizeOverflow(shape.clone()))?;
        if bytes.len() != expected {
            return Err(TensorError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            elem_type,
            shape,
            bytes,
        })
    }

    /// The element type.
    pub fn elem_type(&self) -> ElementType {
        self.elem_type
    }

    /// The shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The rank.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// The number of elements.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// The raw little-endian payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The payload as shared bytes.
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// Copy the data out as a typed vector.
    pub fn to_vec<E: Element>(&self) -> Result<Vec<E>, TensorError> {
        if E::ELEM_TYPE != self.elem_type {
            return Err(TensorError::TypeMismatch {
                expected: E::ELEM_TYPE,
                actual: self.elem_type,
            });
        }

        // The payload may come straight out of a protobuf buffer, so it is not assumed aligned.
        Ok(bytemuck::pod_collect_to_vec(&self.bytes[..]))
    }

    /// Copy the data out as booleans.
    pub fn to_bools(&self) -> Result<Vec<bool>, TensorError> {
        if self.elem_type != ElementType::Bool {
            return Err(TensorError::TypeMismatch {
                expected: ElementType::Bool,
                actual: self.elem_type,
            });
        }

        Ok(self.bytes.iter().map(|&b| b != 0).collect())
    }

    fn format_values(&self, max_len: Option<usize>) -> String {
        fn join<E: Element>(bytes: &[u8], max_len: Option<usize>) -> String {
            let values: Vec<E> = bytemuck::pod_collect_to_vec(bytes);
            trunc(&values, max_len)
        }

        let bytes = self.bytes.as_ref();
        match self.elem_type {
            ElementType::Float32 => join::<f32>(bytes, max_len),
            ElementType::Float64 => join::<f64>(bytes, max_len),
            ElementType::Float16 => join::<f16>(bytes, max_len),
            ElementType::BFloat16 => join::<bf16>(bytes, max_len),
            ElementType::Int8 => join::<i8>(bytes, max_len),
            ElementType::Int16 => join::<i16>(bytes, max_len),
            ElementType::Int32 => join::<i32>(bytes, max_len),
            ElementType::Int64 => join::<i64>(bytes, max_len),
            ElementType::Uint8 => join::<u8>(bytes, max_len),
            ElementType::Uint16 => join::<u16>(bytes, max_len),
            ElementType::Uint32 => join::<u32>(bytes, max_len),
            ElementType::Uint64 => join::<u64>(bytes, max_len),
            ElementType::Bool => {
                let values: Vec<bool> = bytes.iter().map(|&b| b != 0).collect();
                trunc(&values, max_len)
            }
            ElementType::String => String::from("[]"),
        }
    }
}

/// Truncate the vector display for debug display
fn trunc<T: fmt::Debug>(v: &[T], max_len: Option<usize>) -> String {
    let mut s = String::new();
    s.push('[');
    for (i, item) in v.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        if max_len.is_some_and(|max| i >= max) {
            s.push_str("...");
            break;
        }
        s.push_str(&format!("{item:?}"));
    }
    s.push(']');
    s
}

/// Shorten the tensor data for debug display
impl fmt::Debug for TensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorValue")
            .field("elem_type", &self.elem_type)
            .field("shape", &self.shape)
            .field("data", &format_args!("{}", self.format_values(Some(6))))
            .finish()
    }
}

impl fmt::Display for TensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:?} {}",
            self.elem_type,
            self.shape,
            self.format_values(None)
        )
    }
}
