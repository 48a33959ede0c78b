//! Domain-specific assertion macros for hopi harnesses.
//!
//! These wrap `pretty_assertions` and add failure messages that say which
//! numerical invariant broke.

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Assert two floats agree within a tolerance (default `1e-6`).
///
/// ```rust
/// assert_close!(ops::beta(&[2.0, 2.0]), 1.0 / 6.0);
/// assert_close!(ops::digamma(0.3458)?, -3.0103, 1e-4);
/// ```
#[macro_export]
macro_rules! assert_close {
    ($actual:expr, $expected:expr) => {
        $crate::assert_close!($actual, $expected, 1e-6)
    };
    ($actual:expr, $expected:expr, $tol:expr) => {{
        let actual: f64 = $actual;
        let expected: f64 = $expected;
        let tol: f64 = $tol;
        if !((actual - expected).abs() <= tol) {
            panic!(
                "assert_close! failed:\n  expected: {}\n  actual:   {}\n  |diff| = {} > {}",
                expected,
                actual,
                (actual - expected).abs(),
                tol
            );
        }
    }};
}

// ---------------------------------------------------------------------------
// Tensors
// ---------------------------------------------------------------------------

/// Assert a tensor matches `expected` element-wise (row-major) within `1e-6`.
#[macro_export]
macro_rules! assert_tensor_close {
    ($tensor:expr, $expected:expr) => {{
        let tensor: &hopi_core::Tensor = &$tensor;
        let expected: &[f64] = &$expected;
        let actual = tensor.to_vec().expect("tensor values");
        pretty_assertions::assert_eq!(actual.len(), expected.len(), "tensor length");
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            if (a - e).abs() > 1e-6 {
                panic!(
                    "assert_tensor_close! failed at flat index {}:\n  expected: {:?}\n  actual:   {:?}",
                    i, expected, actual
                );
            }
        }
    }};
}

/// Assert a tensor is a probability vector: non-negative, summing to one.
#[macro_export]
macro_rules! assert_distribution {
    ($tensor:expr) => {{
        let tensor: &hopi_core::Tensor = &$tensor;
        let values = tensor.to_vec().expect("tensor values");
        let sum: f64 = values.iter().sum();
        if values.iter().any(|&p| p < 0.0 || !p.is_finite()) {
            panic!("assert_distribution! failed: invalid entry in {:?}", values);
        }
        if (sum - 1.0).abs() > 1e-9 {
            panic!("assert_distribution! failed: sums to {} ({:?})", sum, values);
        }
    }};
}

/// Assert every `[.., from, action]` column of a `[to, from, action]` tensor
/// (or every column of a `[to, from]` matrix) is a distribution.
#[macro_export]
macro_rules! assert_columns_normalised {
    ($tensor:expr) => {{
        let tensor: &hopi_core::Tensor = &$tensor;
        let shape = tensor.shape().to_vec();
        let n_to = shape[0];
        let rest: usize = shape[1..].iter().product();
        let values = tensor.to_vec().expect("tensor values");
        for col in 0..rest {
            let sum: f64 = (0..n_to).map(|to| values[to * rest + col]).sum();
            if (sum - 1.0).abs() > 1e-9 {
                panic!(
                    "assert_columns_normalised! failed: column {} of shape {:?} sums to {}",
                    col, shape, sum
                );
            }
        }
    }};
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Assert the tree root of a graph has exactly `n` planned children.
#[macro_export]
macro_rules! assert_expanded {
    ($graph:expr, $node:expr, $n:expr) => {{
        let graph: &hopi_core::FactorGraph = &$graph;
        let children = graph.action_children($node).expect("node exists");
        if children.len() != $n {
            panic!(
                "assert_expanded! failed: {} has {} action children, expected {}",
                $node,
                children.len(),
                $n
            );
        }
    }};
}
