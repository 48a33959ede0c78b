//! Dense `f64` tensors on the CPU, backed by [`candle_core::Tensor`].
//!
//! The factor graph only ever manipulates vectors, matrices and rank-3
//! transition tensors, so [`Tensor`] exposes the handful of structural
//! operations message passing needs (permutation, reduction along an axis,
//! slicing one axis away, broadcasting products) on top of candle. Every
//! tensor is kept contiguous in row-major order so that flat offsets and
//! last-axis fibers line up with [`Tensor::to_vec`].
//!
//! Shape errors are reported as [`HopiError::ShapeMismatch`] before candle
//! sees the operands; anything candle itself rejects surfaces as
//! [`HopiError::Tensor`].

use candle_core::{DType, Device};

use crate::error::{HopiError, Result};

#[derive(Debug, Clone)]
pub struct Tensor {
    inner: candle_core::Tensor,
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        matches!((self.to_vec(), other.to_vec()), (Ok(a), Ok(b)) if a == b)
    }
}

impl Tensor {
    /// Build a tensor from a shape and a row-major buffer.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(HopiError::ShapeMismatch {
                op: "Tensor::new",
                expected: shape,
                actual: vec![data.len()],
            });
        }
        let inner = candle_core::Tensor::from_vec(data, shape, &Device::Cpu)?;
        Ok(Self { inner })
    }

    /// Rank-1 tensor owning `data`.
    pub fn from_vec(data: Vec<f64>) -> Result<Self> {
        Self::new(vec![data.len()], data)
    }

    /// Rank-0 tensor holding a single value.
    pub fn scalar(value: f64) -> Result<Self> {
        Self::new(Vec::new(), vec![value])
    }

    pub fn full(shape: &[usize], value: f64) -> Result<Self> {
        Self::new(shape.to_vec(), vec![value; shape.iter().product()])
    }

    pub fn zeros(shape: &[usize]) -> Result<Self> {
        let inner = candle_core::Tensor::zeros(shape, DType::F64, &Device::Cpu)?;
        Ok(Self { inner })
    }

    /// Rank-2 tensor from equally sized rows.
    pub fn matrix(rows: &[&[f64]]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(HopiError::ShapeMismatch {
                    op: "Tensor::matrix",
                    expected: vec![cols],
                    actual: vec![row.len()],
                });
            }
            data.extend_from_slice(row);
        }
        Self::new(vec![rows.len(), cols], data)
    }

    /// Wrap a candle tensor, converting it to contiguous `f64` storage.
    pub fn from_candle(inner: candle_core::Tensor) -> Result<Self> {
        let inner = inner.to_dtype(DType::F64)?.contiguous()?;
        Ok(Self { inner })
    }

    pub fn as_candle(&self) -> &candle_core::Tensor {
        &self.inner
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn shape(&self) -> &[usize] {
        self.inner.dims()
    }

    pub fn rank(&self) -> usize {
        self.inner.rank()
    }

    pub fn len(&self) -> usize {
        self.inner.elem_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The elements in row-major order.
    pub fn to_vec(&self) -> Result<Vec<f64>> {
        Ok(self.inner.flatten_all()?.to_vec1::<f64>()?)
    }

    /// Size of the last axis (1 for a scalar).
    pub fn last_dim(&self) -> usize {
        self.shape().last().copied().unwrap_or(1)
    }

    fn offset(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.rank() {
            return Err(HopiError::ShapeMismatch {
                op: "Tensor::index",
                expected: self.shape().to_vec(),
                actual: index.to_vec(),
            });
        }
        let mut offset = 0;
        for (&i, &dim) in index.iter().zip(self.shape()) {
            if i >= dim {
                return Err(HopiError::IndexOutOfRange {
                    op: "Tensor::index",
                    index: i,
                    len: dim,
                });
            }
            offset = offset * dim + i;
        }
        Ok(offset)
    }

    pub fn get(&self, index: &[usize]) -> Result<f64> {
        let offset = self.offset(index)?;
        Ok(self.inner.flatten_all()?.get(offset)?.to_scalar::<f64>()?)
    }

    /// Overwrite one element. Candle storage is immutable, so this rebuilds
    /// the tensor; it is meant for assembling models, not for inner loops.
    pub fn set(&mut self, index: &[usize], value: f64) -> Result<()> {
        let offset = self.offset(index)?;
        let mut data = self.to_vec()?;
        data[offset] = value;
        *self = Self::new(self.shape().to_vec(), data)?;
        Ok(())
    }

    /// The single value of a one-element tensor.
    pub fn item(&self) -> Result<f64> {
        if self.len() != 1 {
            return Err(HopiError::ShapeMismatch {
                op: "Tensor::item",
                expected: Vec::new(),
                actual: self.shape().to_vec(),
            });
        }
        Ok(self.inner.flatten_all()?.get(0)?.to_scalar::<f64>()?)
    }

    // -----------------------------------------------------------------------
    // Elementwise
    // -----------------------------------------------------------------------

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Result<Tensor> {
        let data = self.to_vec()?.into_iter().map(f).collect();
        Self::new(self.shape().to_vec(), data)
    }

    pub fn ln(&self) -> Result<Tensor> {
        Ok(Self { inner: self.inner.log()? })
    }

    pub fn exp(&self) -> Result<Tensor> {
        Ok(Self { inner: self.inner.exp()? })
    }

    pub fn scale(&self, k: f64) -> Result<Tensor> {
        Ok(Self {
            inner: self.inner.affine(k, 0.0)?,
        })
    }

    fn check_same_shape(&self, other: &Tensor, op: &'static str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(HopiError::ShapeMismatch {
                op,
                expected: self.shape().to_vec(),
                actual: other.shape().to_vec(),
            });
        }
        Ok(())
    }

    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.check_same_shape(other, "Tensor::add")?;
        Ok(Self {
            inner: self.inner.add(&other.inner)?,
        })
    }

    pub fn add_assign(&mut self, other: &Tensor) -> Result<()> {
        *self = self.add(other)?;
        Ok(())
    }

    pub fn mul(&self, other: &Tensor) -> Result<Tensor> {
        self.check_same_shape(other, "Tensor::mul")?;
        Ok(Self {
            inner: self.inner.mul(&other.inner)?,
        })
    }

    pub fn sum(&self) -> Result<f64> {
        Ok(self.inner.sum_all()?.to_scalar::<f64>()?)
    }

    pub fn dot(&self, other: &Tensor) -> Result<f64> {
        self.check_same_shape(other, "Tensor::dot")?;
        self.mul(other)?.sum()
    }

    /// Flat index of the largest element; the first one wins ties.
    pub fn argmax(&self) -> Result<Option<usize>> {
        let mut best: Option<(usize, f64)> = None;
        for (i, x) in self.to_vec()?.into_iter().enumerate() {
            if best.map_or(true, |(_, b)| x > b) {
                best = Some((i, x));
            }
        }
        Ok(best.map(|(i, _)| i))
    }

    // -----------------------------------------------------------------------
    // Structural
    // -----------------------------------------------------------------------

    fn check_axis(&self, axis: usize, op: &'static str) -> Result<()> {
        if axis >= self.rank() {
            return Err(HopiError::IndexOutOfRange {
                op,
                index: axis,
                len: self.rank(),
            });
        }
        Ok(())
    }

    /// Reorder the axes: axis `i` of the result is axis `order[i]` of `self`.
    pub fn permute(&self, order: &[usize]) -> Result<Tensor> {
        let rank = self.rank();
        if order.len() != rank {
            return Err(HopiError::ShapeMismatch {
                op: "Tensor::permute",
                expected: self.shape().to_vec(),
                actual: order.to_vec(),
            });
        }
        let mut seen = vec![false; rank];
        for &axis in order {
            if axis >= rank || seen[axis] {
                return Err(HopiError::IndexOutOfRange {
                    op: "Tensor::permute",
                    index: axis,
                    len: rank,
                });
            }
            seen[axis] = true;
        }
        if rank < 2 {
            return Ok(self.clone());
        }
        Ok(Self {
            inner: self.inner.permute(order.to_vec())?.contiguous()?,
        })
    }

    /// Same elements, new shape.
    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor> {
        if shape.iter().product::<usize>() != self.len() {
            return Err(HopiError::ShapeMismatch {
                op: "Tensor::reshape",
                expected: self.shape().to_vec(),
                actual: shape.to_vec(),
            });
        }
        Ok(Self {
            inner: self.inner.reshape(shape)?,
        })
    }

    /// Elementwise product where `other` is broadcast to `self`'s shape.
    /// Axes of `other` must either match or have size 1.
    pub fn broadcast_mul(&self, other: &Tensor) -> Result<Tensor> {
        Ok(Self {
            inner: self.inner.broadcast_mul(&other.inner)?.contiguous()?,
        })
    }

    /// Sum along `axis`, removing it from the shape.
    pub fn sum_axis(&self, axis: usize) -> Result<Tensor> {
        self.check_axis(axis, "Tensor::sum_axis")?;
        Ok(Self {
            inner: self.inner.sum(axis)?.contiguous()?,
        })
    }

    /// Take slice `index` along `axis`, removing the axis (e.g. `B[:, :, a]`).
    pub fn select(&self, axis: usize, index: usize) -> Result<Tensor> {
        self.check_axis(axis, "Tensor::select")?;
        let n = self.shape()[axis];
        if index >= n {
            return Err(HopiError::IndexOutOfRange {
                op: "Tensor::select",
                index,
                len: n,
            });
        }
        Ok(Self {
            inner: self.inner.narrow(axis, index, 1)?.squeeze(axis)?.contiguous()?,
        })
    }

    /// Matrix-vector product of a `[rows, cols]` tensor with a `[cols]` vector.
    pub fn matvec(&self, v: &Tensor) -> Result<Tensor> {
        if self.rank() != 2 || v.rank() != 1 || self.shape()[1] != v.shape()[0] {
            return Err(HopiError::ShapeMismatch {
                op: "Tensor::matvec",
                expected: self.shape().to_vec(),
                actual: v.shape().to_vec(),
            });
        }
        let column = v.inner.unsqueeze(1)?;
        Ok(Self {
            inner: self.inner.matmul(&column)?.squeeze(1)?.contiguous()?,
        })
    }

    /// Contiguous fibers along the last axis (one fiber for a scalar).
    pub fn last_axis_fibers(&self) -> Result<Vec<Vec<f64>>> {
        let width = self.last_dim().max(1);
        Ok(self.to_vec()?.chunks(width).map(<[f64]>::to_vec).collect())
    }

    /// Apply `f` to every last-axis fiber, keeping the shape.
    pub fn try_map_fibers<F>(&self, mut f: F) -> Result<Tensor>
    where
        F: FnMut(&[f64]) -> Result<Vec<f64>>,
    {
        let mut data = Vec::with_capacity(self.len());
        for fiber in self.last_axis_fibers()? {
            let mapped = f(&fiber)?;
            if mapped.len() != fiber.len() {
                return Err(HopiError::ShapeMismatch {
                    op: "Tensor::try_map_fibers",
                    expected: vec![fiber.len()],
                    actual: vec![mapped.len()],
                });
            }
            data.extend(mapped);
        }
        Self::new(self.shape().to_vec(), data)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
