//! Value types exchanged across the adapter boundary.
//!
//! Positions and forces are three-dimensional `nalgebra` vectors. Colvar values
//! handed to scripting callbacks are either scalars or n-dimensional vectors,
//! and their gradients are one matrix per component.

use nalgebra::{DMatrix, DVector, Vector3};

/// Three-dimensional real vector (forces, displacements).
pub type RVector = Vector3<f64>;

/// Atomic position.
pub type AtomPos = Vector3<f64>;

/// Residue number as used by structure files.
pub type ResidueId = i32;

/// Gradient of a colvar with respect to one component's atoms.
pub type Gradient = DMatrix<f64>;

/// The zero vector.
pub fn zero() -> RVector {
    RVector::zeros()
}

/// Value of a collective variable or of one of its components.
#[derive(Debug, Clone, PartialEq)]
pub enum ColvarValue {
    /// One real number
    Scalar(f64),
    /// A vector of real numbers
    Vector(DVector<f64>),
}

impl ColvarValue {
    /// Number of real numbers carried by the value.
    pub fn dimension(&self) -> usize {
        match self {
            ColvarValue::Scalar(_) => 1,
            ColvarValue::Vector(v) => v.len(),
        }
    }

    /// Returns the scalar, or `None` for vector values.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ColvarValue::Scalar(x) => Some(*x),
            ColvarValue::Vector(_) => None,
        }
    }
}

impl Default for ColvarValue {
    fn default() -> Self {
        ColvarValue::Scalar(0.0)
    }
}

impl From<f64> for ColvarValue {
    fn from(x: f64) -> Self {
        ColvarValue::Scalar(x)
    }
}

impl From<Vec<f64>> for ColvarValue {
    fn from(v: Vec<f64>) -> Self {
        ColvarValue::Vector(DVector::from_vec(v))
    }
}
