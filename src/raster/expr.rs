//! Deferred map-algebra expressions.
//!
//! A [`RasterExpr`] is a cheap-to-clone expression tree. Nothing is computed while
//! building it; pixels are produced only by [`RasterExpr::materialize`] (or by a region
//! reduction, which materialises first).

use super::masked::{quantize, MaskedRaster};
use crate::types::{GeoTransform, LstError, LstResult, Pixel};
use ndarray::{Array2, Zip};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Abs,
    /// Logical not: 1 where the input is zero, 0 elsewhere
    Not,
    Ln,
    /// Round to the given number of decimals
    Round(i32),
}

impl UnaryOp {
    fn apply(&self, x: Pixel) -> Pixel {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Not => bool_to_pixel(x == 0.0),
            UnaryOp::Ln => x.ln(),
            UnaryOp::Round(decimals) => quantize(x, *decimals),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Division by zero produces an invalid pixel
    Div,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    And,
    Or,
    /// Bitwise AND of the integer parts
    BitAnd,
    Min,
    Max,
}

impl BinaryOp {
    fn apply(&self, x: Pixel, y: Pixel) -> Pixel {
        match self {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div => {
                if y == 0.0 {
                    Pixel::NAN
                } else {
                    x / y
                }
            }
            BinaryOp::Gt => bool_to_pixel(x > y),
            BinaryOp::Ge => bool_to_pixel(x >= y),
            BinaryOp::Lt => bool_to_pixel(x < y),
            BinaryOp::Le => bool_to_pixel(x <= y),
            BinaryOp::Eq => bool_to_pixel(x == y),
            BinaryOp::Ne => bool_to_pixel(x != y),
            BinaryOp::And => bool_to_pixel(x != 0.0 && y != 0.0),
            BinaryOp::Or => bool_to_pixel(x != 0.0 || y != 0.0),
            BinaryOp::BitAnd => ((x as i64) & (y as i64)) as Pixel,
            BinaryOp::Min => x.min(y),
            BinaryOp::Max => x.max(y),
        }
    }
}

fn bool_to_pixel(b: bool) -> Pixel {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Lazily evaluated raster expression
#[derive(Debug, Clone)]
pub enum RasterExpr {
    /// Already materialised pixels
    Source(Arc<MaskedRaster>),
    /// Scalar broadcast over the grid of the other operands
    Constant(Pixel),
    Unary(UnaryOp, Box<RasterExpr>),
    Binary(BinaryOp, Box<RasterExpr>, Box<RasterExpr>),
    /// Invalidate pixels of `value` where `mask` is zero or invalid
    UpdateMask {
        value: Box<RasterExpr>,
        mask: Box<RasterExpr>,
    },
    /// Take `replacement` where `test` is valid and non-zero, `base` elsewhere
    Where {
        base: Box<RasterExpr>,
        test: Box<RasterExpr>,
        replacement: Box<RasterExpr>,
    },
}

impl From<Pixel> for RasterExpr {
    fn from(value: Pixel) -> Self {
        RasterExpr::Constant(value)
    }
}

impl From<MaskedRaster> for RasterExpr {
    fn from(raster: MaskedRaster) -> Self {
        RasterExpr::Source(Arc::new(raster))
    }
}

impl From<Arc<MaskedRaster>> for RasterExpr {
    fn from(raster: Arc<MaskedRaster>) -> Self {
        RasterExpr::Source(raster)
    }
}

impl RasterExpr {
    pub fn source(raster: MaskedRaster) -> Self {
        raster.into()
    }

    pub fn constant(value: Pixel) -> Self {
        RasterExpr::Constant(value)
    }

    fn unary(self, op: UnaryOp) -> Self {
        RasterExpr::Unary(op, Box::new(self))
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<RasterExpr>) -> Self {
        RasterExpr::Binary(op, Box::new(self), Box::new(rhs.into()))
    }

    pub fn add(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn sub(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn mul(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }

    pub fn div(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Div, rhs)
    }

    pub fn gt(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn gte(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn lt(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn lte(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn eq(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn neq(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    pub fn and(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    pub fn min(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Min, rhs)
    }

    pub fn max(self, rhs: impl Into<RasterExpr>) -> Self {
        self.binary(BinaryOp::Max, rhs)
    }

    pub fn bitwise_and(self, mask: u32) -> Self {
        self.binary(BinaryOp::BitAnd, mask as Pixel)
    }

    /// 1 where bit `bit` of the integer pixel value is set, 0 elsewhere
    pub fn bit_set(self, bit: u8) -> Self {
        self.bitwise_and(1u32 << bit).neq(0.0)
    }

    pub fn not(self) -> Self {
        self.unary(UnaryOp::Not)
    }

    pub fn neg(self) -> Self {
        self.unary(UnaryOp::Neg)
    }

    pub fn abs(self) -> Self {
        self.unary(UnaryOp::Abs)
    }

    pub fn ln(self) -> Self {
        self.unary(UnaryOp::Ln)
    }

    pub fn round_to(self, decimals: i32) -> Self {
        self.unary(UnaryOp::Round(decimals))
    }

    pub fn update_mask(self, mask: impl Into<RasterExpr>) -> Self {
        RasterExpr::UpdateMask {
            value: Box::new(self),
            mask: Box::new(mask.into()),
        }
    }

    /// Replace pixels where `test` holds with `replacement`
    pub fn where_(self, test: impl Into<RasterExpr>, replacement: impl Into<RasterExpr>) -> Self {
        RasterExpr::Where {
            base: Box::new(self),
            test: Box::new(test.into()),
            replacement: Box::new(replacement.into()),
        }
    }

    /// Grid of the first source in the tree, depth-first
    pub fn grid(&self) -> Option<((usize, usize), GeoTransform)> {
        match self {
            RasterExpr::Source(r) => Some((r.dim(), r.geo_transform)),
            RasterExpr::Constant(_) => None,
            RasterExpr::Unary(_, a) => a.grid(),
            RasterExpr::Binary(_, a, b) => a.grid().or_else(|| b.grid()),
            RasterExpr::UpdateMask { value, mask } => value.grid().or_else(|| mask.grid()),
            RasterExpr::Where { base, test, replacement } => base
                .grid()
                .or_else(|| test.grid())
                .or_else(|| replacement.grid()),
        }
    }

    /// Evaluate the expression into pixels
    pub fn materialize(&self) -> LstResult<MaskedRaster> {
        let (shape, geo_transform) = self.grid().ok_or_else(|| {
            LstError::Processing("expression has no raster source to define its grid".to_string())
        })?;
        self.evaluate(shape, &geo_transform)
    }

    fn evaluate(&self, shape: (usize, usize), geo_transform: &GeoTransform) -> LstResult<MaskedRaster> {
        match self {
            RasterExpr::Source(raster) => {
                if raster.dim() != shape {
                    return Err(LstError::GridMismatch(format!(
                        "source of shape {:?} used in expression on grid {:?}",
                        raster.dim(),
                        shape
                    )));
                }
                Ok(raster.as_ref().clone())
            }
            RasterExpr::Constant(value) => Ok(MaskedRaster::filled(shape, *value, *geo_transform)),
            RasterExpr::Unary(op, a) => {
                let a = a.evaluate(shape, geo_transform)?;
                Ok(a.map_valid(|x| op.apply(x)))
            }
            RasterExpr::Binary(op, a, b) => {
                let a = a.evaluate(shape, geo_transform)?;
                let b = b.evaluate(shape, geo_transform)?;
                a.zip_with(&b, |x, y| op.apply(x, y))
            }
            RasterExpr::UpdateMask { value, mask } => {
                let value = value.evaluate(shape, geo_transform)?;
                let mask = mask.evaluate(shape, geo_transform)?;
                let mut keep = Array2::<bool>::from_elem(shape, false);
                Zip::from(&mut keep)
                    .and(&mask.values)
                    .and(&mask.valid)
                    .for_each(|k, &m, &m_ok| *k = m_ok && m != 0.0);
                value.update_mask(&keep)
            }
            RasterExpr::Where { base, test, replacement } => {
                let mut out = base.evaluate(shape, geo_transform)?;
                let test = test.evaluate(shape, geo_transform)?;
                let replacement = replacement.evaluate(shape, geo_transform)?;
                Zip::from(&mut out.values)
                    .and(&mut out.valid)
                    .and(&test.values)
                    .and(&test.valid)
                    .and(&replacement.values)
                    .and(&replacement.valid)
                    .for_each(|v, ok, &t, &t_ok, &r, &r_ok| {
                        if t_ok && t != 0.0 {
                            *v = r;
                            *ok = r_ok;
                        }
                    });
                Ok(out)
            }
        }
    }
}
