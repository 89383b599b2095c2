//! Dense GEMM / GEMV on row-major slices.
//!
//! The contract is the usual BLAS one, `dst = alpha * op(A) * op(B) + beta * dst`, with the
//! matrices described by their logical dimensions and stored contiguously without padding.
//! The products themselves run through `ndarray::linalg`.

use crate::{Result, TensorError};
use ndarray::linalg::{general_mat_mul, general_mat_vec_mul};
use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, LinalgScalar};

/// Whether an operand is used as stored or transposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    No,
    Yes,
}

fn check_len(operation: &str, name: &str, got: usize, needed: usize) -> Result<()> {
    if got < needed {
        return Err(TensorError::invalid_argument_op(
            operation,
            &format!("{name} holds {got} elements, {needed} required"),
        ));
    }
    Ok(())
}

/// View `data` as the `rows x cols` operand `op(X)`, where `X` is stored untransposed
/// as `rows x cols` or transposed as `cols x rows`.
fn operand<T>(
    data: &[T],
    trans: Transpose,
    rows: usize,
    cols: usize,
) -> Result<ArrayView2<'_, T>> {
    let data = &data[..rows * cols];
    Ok(match trans {
        Transpose::No => ArrayView2::from_shape((rows, cols), data)?,
        Transpose::Yes => ArrayView2::from_shape((cols, rows), data)?.reversed_axes(),
    })
}

/// `c[m x n] = alpha * op(a)[m x k] * op(b)[k x n] + beta * c`
#[allow(clippy::too_many_arguments)]
pub fn gemm<T: LinalgScalar + PartialEq>(
    trans_a: Transpose,
    trans_b: Transpose,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    b: &[T],
    beta: T,
    c: &mut [T],
) -> Result<()> {
    check_len("gemm", "A", a.len(), m * k)?;
    check_len("gemm", "B", b.len(), k * n)?;
    check_len("gemm", "C", c.len(), m * n)?;
    if m == 0 || n == 0 {
        return Ok(());
    }

    let c = &mut c[..m * n];
    if beta == T::zero() {
        // C may hold garbage (NaN) that a zero beta must not propagate
        c.fill(T::zero());
    }

    let a_view = operand(a, trans_a, m, k)?;
    let b_view = operand(b, trans_b, k, n)?;
    let mut c_view = ArrayViewMut2::from_shape((m, n), c)?;
    general_mat_mul(alpha, &a_view, &b_view, beta, &mut c_view);
    Ok(())
}

/// Run `batch` independent GEMMs whose operands sit at fixed element strides.
///
/// Member `i` uses `a[i*stride_a..]`, `b[i*stride_b..]` and `c[i*stride_c..]`. A stride of
/// zero shares an operand across the batch. `stride_c` must not make output blocks overlap.
#[allow(clippy::too_many_arguments)]
pub fn gemm_strided_batched<T: LinalgScalar + PartialEq>(
    trans_a: Transpose,
    trans_b: Transpose,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    stride_a: usize,
    b: &[T],
    stride_b: usize,
    beta: T,
    c: &mut [T],
    stride_c: usize,
    batch: usize,
) -> Result<()> {
    if batch == 0 {
        return Ok(());
    }
    if batch > 1 && stride_c < m * n {
        return Err(TensorError::invalid_argument_op(
            "gemm_strided_batched",
            &format!("output stride {stride_c} overlaps {m}x{n} blocks"),
        ));
    }
    let last = batch - 1;
    check_len("gemm_strided_batched", "A", a.len(), last * stride_a + m * k)?;
    check_len("gemm_strided_batched", "B", b.len(), last * stride_b + k * n)?;
    check_len("gemm_strided_batched", "C", c.len(), last * stride_c + m * n)?;

    for i in 0..batch {
        gemm(
            trans_a,
            trans_b,
            m,
            n,
            k,
            alpha,
            &a[i * stride_a..],
            &b[i * stride_b..],
            beta,
            &mut c[i * stride_c..i * stride_c + m * n],
        )?;
    }
    Ok(())
}

/// `y = alpha * op(a) * x + beta * y` with `a` stored as `m x n`.
///
/// `x` has `n` elements and `y` has `m` when untransposed; the roles swap when transposed.
#[allow(clippy::too_many_arguments)]
pub fn gemv<T: LinalgScalar + PartialEq>(
    trans_a: Transpose,
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    x: &[T],
    beta: T,
    y: &mut [T],
) -> Result<()> {
    let (x_len, y_len) = match trans_a {
        Transpose::No => (n, m),
        Transpose::Yes => (m, n),
    };
    check_len("gemv", "A", a.len(), m * n)?;
    check_len("gemv", "x", x.len(), x_len)?;
    check_len("gemv", "y", y.len(), y_len)?;
    if y_len == 0 {
        return Ok(());
    }

    let y = &mut y[..y_len];
    if beta == T::zero() {
        y.fill(T::zero());
    }

    let a_view = operand(a, trans_a, y_len, x_len)?;
    let x_view = ArrayView1::from(&x[..x_len]);
    let mut y_view = ArrayViewMut1::from(y);
    general_mat_vec_mul(alpha, &a_view, &x_view, beta, &mut y_view);
    Ok(())
}
