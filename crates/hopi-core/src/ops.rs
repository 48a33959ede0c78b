//! Numerical building blocks for message passing and planning.
//!
//! The two tensor operators that everything else is phrased in are
//! [`multiplication`] and [`average`]. Both take a *matching list* `ml`
//! telling which axes of `x1` the axes of `x2` line up with:
//!
//! ```text
//! x1: [to, from, action]      x2: [action]      ml = [2]
//! multiplication → x1[t,f,a] * x2[a]            shape [to, from, action]
//! average        → Σ_a x1[t,f,a] * x2[a]        shape [to, from]
//! ```
//!
//! `average` additionally accepts an *exclusion list* `el` of matched axes
//! that must not be summed away.

use crate::error::{HopiError, Result};
use crate::tensor::Tensor;
use rand::distributions::{Distribution as _, WeightedIndex};
use rand::Rng;

const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;
/// ψ'(1) = π²/6, the slope of the digamma function's small-argument expansion.
const TRIGAMMA_ONE: f64 = 1.644_934_066_848_226_4;
/// Below this argument the digamma recurrence is replaced by its Laurent expansion.
const DIGAMMA_SMALL: f64 = 1e-6;
/// The asymptotic series is accurate once the argument reaches this value.
const DIGAMMA_ASYMPTOTIC: f64 = 8.5;

// ---------------------------------------------------------------------------
// Special functions
// ---------------------------------------------------------------------------

pub fn gamma(x: f64) -> f64 {
    libm::tgamma(x)
}

pub fn log_gamma(x: f64) -> f64 {
    libm::lgamma(x)
}

/// Multivariate beta function `Π Γ(x_i) / Γ(Σ x_i)`.
pub fn beta(x: &[f64]) -> f64 {
    let product: f64 = x.iter().map(|&v| gamma(v)).product();
    product / gamma(x.iter().sum())
}

/// Logarithm of [`beta`], computed in log space.
pub fn log_beta(x: &[f64]) -> f64 {
    let sum: f64 = x.iter().sum();
    x.iter().map(|&v| log_gamma(v)).sum::<f64>() - log_gamma(sum)
}

/// Digamma function ψ(x) for `x > 0`.
pub fn digamma(x: f64) -> Result<f64> {
    if x <= 0.0 || x.is_nan() {
        return Err(HopiError::NonPositive { op: "digamma", value: x });
    }
    if x <= DIGAMMA_SMALL {
        return Ok(-EULER_MASCHERONI - 1.0 / x + TRIGAMMA_ONE * x);
    }

    let mut value = 0.0;
    let mut x2 = x;
    while x2 < DIGAMMA_ASYMPTOTIC {
        value -= 1.0 / x2;
        x2 += 1.0;
    }

    let r = 1.0 / x2;
    value += x2.ln() - 0.5 * r;
    let r = r * r;
    value -= r
        * (1.0 / 12.0
            - r * (1.0 / 120.0 - r * (1.0 / 252.0 - r * (1.0 / 240.0 - r * (1.0 / 132.0)))));
    Ok(value)
}

// ---------------------------------------------------------------------------
// Divergences
// ---------------------------------------------------------------------------

/// `KL(p ‖ q)` between two categorical parameter vectors. Entries where
/// `p` is zero contribute nothing.
pub fn kl_categorical(p: &Tensor, q: &Tensor) -> Result<f64> {
    if p.shape() != q.shape() {
        return Err(HopiError::ShapeMismatch {
            op: "kl_categorical",
            expected: p.shape().to_vec(),
            actual: q.shape().to_vec(),
        });
    }
    Ok(p.to_vec()?
        .into_iter()
        .zip(q.to_vec()?)
        .filter(|(pi, _)| *pi != 0.0)
        .map(|(pi, qi)| pi * (pi.ln() - qi.ln()))
        .sum())
}

/// `KL(Dir(t1) ‖ Dir(t2))`, summed over every last-axis fiber.
pub fn kl_dirichlet(t1: &Tensor, t2: &Tensor) -> Result<f64> {
    if t1.shape() != t2.shape() {
        return Err(HopiError::ShapeMismatch {
            op: "kl_dirichlet",
            expected: t1.shape().to_vec(),
            actual: t2.shape().to_vec(),
        });
    }
    let mut kl = 0.0;
    for (f1, f2) in t1.last_axis_fibers()?.iter().zip(t2.last_axis_fibers()?) {
        let sum1: f64 = f1.iter().sum();
        let sum2: f64 = f2.iter().sum();
        let psi_sum1 = digamma(sum1)?;
        kl += log_gamma(sum1) - log_gamma(sum2);
        for (&a, &b) in f1.iter().zip(&f2) {
            kl += log_gamma(b) - log_gamma(a) + (a - b) * (digamma(a)? - psi_sum1);
        }
    }
    Ok(kl)
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

pub fn one_hot(size: usize, index: usize) -> Result<Tensor> {
    if index >= size {
        return Err(HopiError::IndexOutOfRange {
            op: "one_hot",
            index,
            len: size,
        });
    }
    let mut data = vec![0.0; size];
    data[index] = 1.0;
    Tensor::from_vec(data)
}

/// Tensor of the given shape filled with `1 / shape[dim]`.
pub fn uniform(shape: &[usize], dim: usize) -> Result<Tensor> {
    match shape.get(dim) {
        Some(&n) if n > 0 => Tensor::full(shape, 1.0 / n as f64),
        Some(_) => Err(HopiError::InvalidRank { op: "uniform", rank: 0 }),
        None => Err(HopiError::IndexOutOfRange {
            op: "uniform",
            index: dim,
            len: shape.len(),
        }),
    }
}

/// Uniform categorical parameters over `n` outcomes.
pub fn uniform_vec(n: usize) -> Result<Tensor> {
    uniform(&[n], 0)
}

// ---------------------------------------------------------------------------
// Tensor operators
// ---------------------------------------------------------------------------

/// Elementwise product of `x1` with `x2` broadcast along the axes of `x1`
/// that are not in `ml`.
pub fn multiplication(x1: &Tensor, x2: &Tensor, ml: &[usize]) -> Result<Tensor> {
    if x2.rank() != ml.len() {
        return Err(HopiError::ShapeMismatch {
            op: "multiplication",
            expected: ml.iter().map(|&a| x1.shape().get(a).copied().unwrap_or(0)).collect(),
            actual: x2.shape().to_vec(),
        });
    }
    for (k, &axis) in ml.iter().enumerate() {
        if x1.shape().get(axis) != Some(&x2.shape()[k]) {
            return Err(HopiError::ShapeMismatch {
                op: "multiplication",
                expected: x1.shape().to_vec(),
                actual: x2.shape().to_vec(),
            });
        }
    }

    // Lay the axes of x2 out in x1's order, then let size-one axes broadcast.
    let mut order: Vec<usize> = (0..ml.len()).collect();
    order.sort_by_key(|&k| ml[k]);
    let aligned = x2.permute(&order)?;
    let mut shape = vec![1; x1.rank()];
    for &axis in ml {
        shape[axis] = x1.shape()[axis];
    }
    x1.broadcast_mul(&aligned.reshape(&shape)?)
}

/// Weighted sum of `x1` along the matched axes `ml \ el`, using `x2` as weights.
pub fn average(x1: &Tensor, x2: &Tensor, ml: &[usize], el: &[usize]) -> Result<Tensor> {
    let mut result = multiplication(x1, x2, ml)?;
    let mut reduce: Vec<usize> = ml.iter().copied().filter(|a| !el.contains(a)).collect();
    reduce.sort_unstable_by(|a, b| b.cmp(a));
    for axis in reduce {
        result = result.sum_axis(axis)?;
    }
    Ok(result)
}

/// Outer product `t0 ⊗ t1 ⊗ ...`. Every operand after the first must be a vector.
pub fn outer_product(tensors: &[&Tensor]) -> Result<Tensor> {
    let (first, rest) = tensors
        .split_first()
        .ok_or(HopiError::InvalidRank { op: "outer_product", rank: 0 })?;
    let mut result = (*first).clone();
    for t in rest {
        if t.rank() != 1 {
            return Err(HopiError::InvalidRank {
                op: "outer_product",
                rank: t.rank(),
            });
        }
        let mut column = result.shape().to_vec();
        column.push(1);
        let mut row = vec![1; result.rank()];
        row.push(t.len());
        result = result.reshape(&column)?.broadcast_mul(&t.reshape(&row)?)?;
    }
    Ok(result)
}

/// Max-shifted softmax over every element. A degenerate input (all `-inf`,
/// or a normaliser that underflows to zero) yields the uniform distribution.
pub fn softmax(v: &Tensor) -> Result<Tensor> {
    let max = v.to_vec()?.into_iter().fold(f64::NEG_INFINITY, f64::max);
    let uniform = || Tensor::full(v.shape(), 1.0 / v.len().max(1) as f64);
    if !max.is_finite() {
        return uniform();
    }
    let shifted = v.map(|x| (x - max).exp())?;
    let sum = shifted.sum()?;
    if sum == 0.0 {
        return uniform();
    }
    shifted.scale(1.0 / sum)
}

/// Σ_j s_j · H(A[:, j]): the expected entropy of the likelihood columns
/// under state beliefs `s`.
pub fn ambiguity(a: &Tensor, s: &Tensor) -> Result<f64> {
    let neg_log_a = a.map(|x| if x > 0.0 { -x.ln() } else { 0.0 })?;
    let column_entropy = average(&neg_log_a, a, &[0, 1], &[1])?;
    average(&column_entropy, s, &[0], &[])?.item()
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Draw an index with probability proportional to `weights`.
pub fn sample<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Result<usize> {
    let dist = WeightedIndex::new(weights)
        .map_err(|e| HopiError::InvalidWeights(format!("{e} ({weights:?})")))?;
    Ok(dist.sample(rng))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn digamma_matches_reference_values() {
        assert!(close(digamma(0.3458).unwrap(), -3.0103, 1e-3));
        assert!(close(digamma(1.0).unwrap(), -EULER_MASCHERONI, 1e-9));
        assert!(close(digamma(10.0).unwrap(), 2.251_752_589_066_721, 1e-9));
    }

    #[test]
    fn digamma_rejects_non_positive_input() {
        assert!(matches!(digamma(0.0), Err(HopiError::NonPositive { .. })));
        assert!(digamma(-2.5).is_err());
    }

    #[test]
    fn digamma_small_argument_branch() {
        let x = 1e-7;
        assert!(close(digamma(x).unwrap(), -EULER_MASCHERONI - 1.0 / x, 1e-3));
    }

    #[test]
    fn log_beta_agrees_with_beta() {
        let x = [1.5, 0.2];
        assert!(close(log_beta(&x), beta(&x).ln(), 1e-10));
    }

    #[test]
    fn softmax_of_all_neg_infinity_is_uniform() {
        let v = Tensor::from_vec(vec![f64::NEG_INFINITY; 4]).unwrap();
        assert_eq!(softmax(&v).unwrap().to_vec().unwrap(), vec![0.25; 4]);
    }

    #[test]
    fn multiplication_follows_the_matching_list_order() {
        let x1 = Tensor::matrix(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]).unwrap();
        // x2 is laid out [x1 axis 1, x1 axis 0]
        let x2 = Tensor::matrix(&[&[1.0, 10.0], &[2.0, 20.0], &[3.0, 30.0]]).unwrap();
        let product = multiplication(&x1, &x2, &[1, 0]).unwrap();
        assert_eq!(product.to_vec().unwrap(), vec![1.0, 4.0, 9.0, 40.0, 100.0, 180.0]);
        assert!(multiplication(&x1, &x2, &[0, 1]).is_err());
    }

    #[test]
    fn outer_product_appends_an_axis_per_operand() {
        let u = Tensor::from_vec(vec![1.0, 2.0]).unwrap();
        let v = Tensor::from_vec(vec![3.0, 4.0, 5.0]).unwrap();
        let o = outer_product(&[&u, &v]).unwrap();
        assert_eq!(o.shape(), &[2, 3]);
        assert_eq!(o.to_vec().unwrap(), vec![3.0, 4.0, 5.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn sample_never_picks_zero_weight() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(sample(&[0.0, 1.0, 0.0], &mut rng).unwrap(), 1);
        }
        assert!(sample(&[], &mut rng).is_err());
        assert!(sample(&[0.0, 0.0], &mut rng).is_err());
    }
}
