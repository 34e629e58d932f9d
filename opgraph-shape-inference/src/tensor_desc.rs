//! Shape, element type and memory layout metadata for tensors.

use std::fmt;

use smallvec::SmallVec;

/// Element type of a tensor.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum DataType {
    Float32,
    Float16,
    Int32,
    Int64,
    Int8,
    UInt8,
    Bool,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Float32 => "float32",
            DataType::Float16 => "float16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Int8 => "int8",
            DataType::UInt8 => "uint8",
            DataType::Bool => "bool",
        };
        write!(f, "{}", name)
    }
}

/// Memory layout of a 4D image-like tensor.
///
/// Layouts are carried through inference unchanged. They only affect which
/// dimension is treated as the channel dimension.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum Layout {
    Nhwc,
    Nchw,
    #[default]
    Unspecified,
}

/// Shape, element type and layout of a tensor, without its data.
///
/// A tensor with an empty shape is a scalar.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TensorDesc {
    shape: SmallVec<[usize; 4]>,
    dtype: DataType,
    layout: Layout,
}

impl TensorDesc {
    pub fn new(shape: &[usize], dtype: DataType, layout: Layout) -> TensorDesc {
        TensorDesc {
            shape: SmallVec::from_slice(shape),
            dtype,
            layout,
        }
    }

    /// Create a descriptor for a scalar with unspecified layout.
    pub fn scalar(dtype: DataType) -> TensorDesc {
        TensorDesc::new(&[], dtype, Layout::Unspecified)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Return the size of dimension `dim`, or `None` if out of bounds.
    pub fn size(&self, dim: usize) -> Option<usize> {
        self.shape.get(dim).copied()
    }

    /// Return the number of elements in the tensor, or `None` if the count
    /// overflows `usize`.
    ///
    /// This is 1 for scalars and 0 if any dimension is zero.
    pub fn len(&self) -> Option<usize> {
        if self.is_empty() {
            return Some(0);
        }
        self.shape
            .iter()
            .try_fold(1usize, |count, &size| count.checked_mul(size))
    }

    /// Return true if the tensor has no elements.
    pub fn is_empty(&self) -> bool {
        self.shape.contains(&0)
    }

    /// Return the size of the channel dimension.
    ///
    /// This is dimension 1 for NCHW tensors and the last dimension otherwise.
    /// Returns `None` for scalars or NCHW tensors with fewer than 2 dims.
    pub fn channels(&self) -> Option<usize> {
        match self.layout {
            Layout::Nchw => self.size(1),
            Layout::Nhwc | Layout::Unspecified => self.shape.last().copied(),
        }
    }

    /// Return a copy of this descriptor with a different shape.
    ///
    /// The element type and layout are preserved.
    pub fn with_shape(&self, shape: &[usize]) -> TensorDesc {
        TensorDesc::new(shape, self.dtype, self.layout)
    }
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.dtype, self.shape.as_slice())
    }
}
