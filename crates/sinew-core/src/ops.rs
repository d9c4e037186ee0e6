// GEMM helpers shared by the tensor type and the convolution kernel.
//
// All matrices are dense row-major slices. Every routine ACCUMULATES into
// `c` (c += ...), so callers zero the output first when they want a plain
// product. Rows of `c` are independent, so they are split across the rayon
// pool; each row is still summed in a fixed order, which keeps results
// bit-identical between runs.

use rayon::prelude::*;

use crate::dtype::WithDType;

/// Rows are split across rayon only at or above this many multiply-adds.
const PAR_THRESHOLD: usize = 1 << 14;

/// C += A × B
///
/// A: [m, k], B: [k, n], C: [m, n]
pub fn gemm<T: WithDType>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(c.len(), m * n);
    if n == 0 {
        return;
    }
    let row = |(i, c_row): (usize, &mut [T])| {
        let a_row = &a[i * k..(i + 1) * k];
        for (p, &a_val) in a_row.iter().enumerate() {
            let b_row = &b[p * n..(p + 1) * n];
            for (c_val, &b_val) in c_row.iter_mut().zip(b_row) {
                *c_val += a_val * b_val;
            }
        }
    };
    if m * n * k >= PAR_THRESHOLD {
        c.par_chunks_mut(n).enumerate().for_each(row);
    } else {
        c.chunks_mut(n).enumerate().for_each(row);
    }
}

/// C += Aᵀ × B
///
/// A: [k, m] (read as [m, k]), B: [k, n], C: [m, n]
pub fn gemm_at_b<T: WithDType>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) {
    debug_assert_eq!(a.len(), k * m);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(c.len(), m * n);
    if n == 0 {
        return;
    }
    let row = |(i, c_row): (usize, &mut [T])| {
        for p in 0..k {
            let a_val = a[p * m + i];
            let b_row = &b[p * n..(p + 1) * n];
            for (c_val, &b_val) in c_row.iter_mut().zip(b_row) {
                *c_val += a_val * b_val;
            }
        }
    };
    if m * n * k >= PAR_THRESHOLD {
        c.par_chunks_mut(n).enumerate().for_each(row);
    } else {
        c.chunks_mut(n).enumerate().for_each(row);
    }
}

/// C += A × Bᵀ
///
/// A: [m, k], B: [n, k] (read as [k, n]), C: [m, n]
pub fn gemm_a_bt<T: WithDType>(a: &[T], b: &[T], c: &mut [T], m: usize, n: usize, k: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), n * k);
    debug_assert_eq!(c.len(), m * n);
    if n == 0 {
        return;
    }
    let row = |(i, c_row): (usize, &mut [T])| {
        let a_row = &a[i * k..(i + 1) * k];
        for (j, c_val) in c_row.iter_mut().enumerate() {
            let b_row = &b[j * k..(j + 1) * k];
            let mut acc = T::zero();
            for (&x, &y) in a_row.iter().zip(b_row) {
                acc += x * y;
            }
            *c_val += acc;
        }
    };
    if m * n * k >= PAR_THRESHOLD {
        c.par_chunks_mut(n).enumerate().for_each(row);
    } else {
        c.chunks_mut(n).enumerate().for_each(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A = [[1, 2, 3],
    //      [4, 5, 6]]
    const A: [f64; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

    #[test]
    fn test_gemm() {
        // A (2x3) × B (3x2), B = [[1,0],[0,1],[1,1]]
        let b = [1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut c = [0.0; 4];
        gemm(&A, &b, &mut c, 2, 2, 3);
        assert_eq!(c, [4.0, 5.0, 10.0, 11.0]);
    }

    #[test]
    fn test_gemm_accumulates() {
        let b = [1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut c = [1.0; 4];
        gemm(&A, &b, &mut c, 2, 2, 3);
        assert_eq!(c, [5.0, 6.0, 11.0, 12.0]);
    }

    #[test]
    fn test_gemm_at_b() {
        // Aᵀ (3x2) × A (2x3) = 3x3 Gram matrix
        let mut c = [0.0; 9];
        gemm_at_b(&A, &A, &mut c, 3, 3, 2);
        assert_eq!(c, [17.0, 22.0, 27.0, 22.0, 29.0, 36.0, 27.0, 36.0, 45.0]);
    }

    #[test]
    fn test_gemm_a_bt() {
        // A (2x3) × Aᵀ (3x2)
        let mut c = [0.0; 4];
        gemm_a_bt(&A, &A, &mut c, 2, 2, 3);
        assert_eq!(c, [14.0, 32.0, 32.0, 77.0]);
    }

    #[test]
    fn test_gemm_parallel_matches_serial() {
        let (m, n, k) = (64, 48, 40);
        let a: Vec<f64> = (0..m * k).map(|i| (i % 7) as f64 - 3.0).collect();
        let b: Vec<f64> = (0..k * n).map(|i| (i % 5) as f64 * 0.5).collect();
        let mut par = vec![0.0; m * n];
        gemm(&a, &b, &mut par, m, n, k);
        for i in 0..m {
            for j in 0..n {
                let expected: f64 = (0..k).map(|p| a[i * k + p] * b[p * n + j]).sum();
                assert_eq!(par[i * n + j], expected);
            }
        }
    }
}
