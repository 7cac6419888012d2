//! Value types shared by the source tree, the mid-level IR and the selection
//! graph. The target only distinguishes scalars and vectors of scalars, so one
//! small `Copy` type serves all three layers.

use strum::{Display, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ScalarType {
    /// Single bit boolean. A vector of these is a lane mask.
    I1,
    I8,
    I16,
    I32,
    I64,
    F16,
    F32,
}

impl ScalarType {
    pub fn bits(self) -> u32 {
        match self {
            Self::I1 => 1,
            Self::I8 => 8,
            Self::I16 | Self::F16 => 16,
            Self::I32 | Self::F32 => 32,
            Self::I64 => 64,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Self::F16 | Self::F32)
    }

    /// The integer type exactly `bits` wide, if the target has one
    pub fn integer_of_width(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(Self::I1),
            8 => Some(Self::I8),
            16 => Some(Self::I16),
            32 => Some(Self::I32),
            64 => Some(Self::I64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Unit,
    Scalar(ScalarType),
    Vector { element: ScalarType, lanes: u32 },
}

impl Type {
    pub const BOOL: Self = Self::Scalar(ScalarType::I1);
    pub const I32: Self = Self::Scalar(ScalarType::I32);
    pub const I64: Self = Self::Scalar(ScalarType::I64);

    pub fn vector(element: ScalarType, lanes: u32) -> Self {
        Self::Vector { element, lanes }
    }

    /// `<lanes x i1>`
    pub fn mask(lanes: u32) -> Self {
        Self::vector(ScalarType::I1, lanes)
    }

    pub fn element(self) -> Option<ScalarType> {
        match self {
            Self::Unit => None,
            Self::Scalar(scalar) => Some(scalar),
            Self::Vector { element, .. } => Some(element),
        }
    }

    /// Total width in bits, which is what a bitcast has to preserve
    pub fn bits(self) -> u32 {
        match self {
            Self::Unit => 0,
            Self::Scalar(scalar) => scalar.bits(),
            Self::Vector { element, lanes } => element.bits() * lanes,
        }
    }

    pub fn is_bool(self) -> bool {
        self == Self::BOOL
    }

    /// Scalar `i1` or a lane mask
    pub fn is_boolean_like(self) -> bool {
        self.element() == Some(ScalarType::I1)
    }

    /// Same shape (scalar vs. lane count) with a different element type
    pub fn with_element(self, element: ScalarType) -> Self {
        match self {
            Self::Unit => Self::Unit,
            Self::Scalar(_) => Self::Scalar(element),
            Self::Vector { lanes, .. } => Self::Vector { element, lanes },
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit => write!(f, "()"),
            Self::Scalar(scalar) => write!(f, "{scalar}"),
            Self::Vector { element, lanes } => write!(f, "<{lanes} x {element}>"),
        }
    }
}

/// The one question every pass here asks of a type: does it spread over the
/// lanes of a vector register, and over how many.
pub trait LaneType {
    fn lane_count(&self) -> Option<u32>;

    fn is_vector(&self) -> bool {
        self.lane_count().is_some()
    }
}

impl LaneType for Type {
    fn lane_count(&self) -> Option<u32> {
        match self {
            Type::Vector { lanes, .. } => Some(*lanes),
            Type::Unit | Type::Scalar(_) => None,
        }
    }
}
