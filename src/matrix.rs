use crate::error::VellumError;
use crate::numeric::DETERMINANT_FLOOR;

/// An affine 2D transform.
///
/// The six coefficients describe the map
/// `(x, y) -> (a*x + c*y + tx, b*x + d*y + ty)`, the column-vector
/// convention used by most 2D drawing backends. Item matrices map local
/// coordinates to the parent's coordinate space; composing them from the
/// root yields the item-to-canvas matrix the projections work with.
///
/// `Matrix` itself is a plain value. Item matrices are owned by the
/// [`Canvas`](crate::canvas::Canvas), and every mutation of one is routed
/// through it so that an observable event can be emitted before the change
/// commits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub fn new(a: f64, b: f64, c: f64, d: f64, tx: f64, ty: f64) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Rotation by `angle` radians, counter-clockwise in a y-up space.
    pub fn rotation(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// Right-multiplies `other` onto `self`: afterwards `self` applies
    /// `other` first, then the previous transform. This is the composition
    /// used when walking the item tree root-to-leaf.
    pub fn compose(&mut self, other: &Matrix) {
        *self = self.composed(other);
    }

    /// Returns `self ∘ other` without mutating either operand.
    pub fn composed(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            tx: self.a * other.tx + self.c * other.ty + self.tx,
            ty: self.b * other.tx + self.d * other.ty + self.ty,
        }
    }

    /// Prepends a translation: points are shifted by `(tx, ty)` before the
    /// existing transform applies.
    pub fn translate(&mut self, tx: f64, ty: f64) {
        self.compose(&Matrix::translation(tx, ty));
    }

    /// Prepends an axis-aligned scale.
    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.compose(&Matrix::scaling(sx, sy));
    }

    /// Prepends a rotation by `angle` radians.
    pub fn rotate(&mut self, angle: f64) {
        self.compose(&Matrix::rotation(angle));
    }

    /// Inverts the transform, failing on a degenerate matrix.
    pub fn invert(&self) -> Result<Matrix, VellumError> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() <= DETERMINANT_FLOOR {
            return Err(VellumError::SingularMatrix);
        }
        Ok(Matrix {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            tx: (self.c * self.ty - self.d * self.tx) / det,
            ty: (self.b * self.tx - self.a * self.ty) / det,
        })
    }

    /// Maps a point through the transform.
    pub fn transform_point(&self, (x, y): (f64, f64)) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    /// Maps a distance vector through the linear part of the transform,
    /// ignoring translation.
    pub fn transform_distance(&self, (dx, dy): (f64, f64)) -> (f64, f64) {
        (self.a * dx + self.c * dy, self.b * dx + self.d * dy)
    }
}
