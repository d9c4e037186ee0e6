// Loss kernels — classification losses over a [N, C] score matrix
//
// Both take integer labels y[i] ∈ [0, C) and return (loss, dscores) with the
// loss averaged over the batch. There is no cache: the gradient is produced
// together with the value.
//
// MARGIN (multiclass hinge):
//
//   margin[i, j] = max(0, s[i, j] - s[i, y_i] + 1)     j ≠ y_i
//   loss         = (1/N) Σ_i Σ_j margin[i, j]
//   ds[i, j]     = 1/N                 for each j ≠ y_i with margin > 0
//   ds[i, y_i]   = -(#positive margins in row i) / N
//
// SOFTMAX (cross-entropy):
//
//   p[i]     = softmax(s[i] - max_j s[i, j])       (shift for stability)
//   loss     = -(1/N) Σ_i log p[i, y_i]
//   ds[i]    = (p[i] - onehot(y_i)) / N

use sinew_core::{bail, Error, Result, Tensor, WithDType};

/// Validate scores/labels and return `(N, C)`.
fn check_inputs<T: WithDType>(
    kernel: &'static str,
    scores: &Tensor<T>,
    labels: &[usize],
) -> Result<(usize, usize)> {
    scores.shape().expect_rank(2)?;
    let (n, c) = (scores.dims()[0], scores.dims()[1]);
    if labels.len() != n {
        bail!("{kernel}: {} labels for {n} score rows", labels.len());
    }
    if n == 0 {
        bail!("{kernel}: empty batch");
    }
    if let Some((row, &label)) = labels.iter().enumerate().find(|&(_, &y)| y >= c) {
        return Err(Error::LabelOutOfRange {
            row,
            label,
            num_classes: c,
        });
    }
    Ok((n, c))
}

/// Multiclass margin (hinge) loss with margin 1.
///
/// Returns the mean loss and its gradient with respect to `scores`.
pub fn margin_loss<T: WithDType>(scores: &Tensor<T>, labels: &[usize]) -> Result<(T, Tensor<T>)> {
    let (n, c) = check_inputs("margin_loss", scores, labels)?;
    let inv_n = T::one() / T::from_usize(n);

    let mut loss = T::zero();
    let mut dscores = Tensor::zeros((n, c));
    let grad = dscores.as_mut_slice();
    for (i, (row, &y)) in scores.as_slice().chunks(c).zip(labels).enumerate() {
        let correct = row[y];
        let g_row = &mut grad[i * c..(i + 1) * c];
        let mut positive = 0usize;
        for (j, &s) in row.iter().enumerate() {
            if j == y {
                continue;
            }
            let margin = s - correct + T::one();
            if margin > T::zero() {
                loss += margin;
                g_row[j] = inv_n;
                positive += 1;
            }
        }
        g_row[y] = -T::from_usize(positive) * inv_n;
    }

    Ok((loss * inv_n, dscores))
}

/// Softmax cross-entropy loss.
///
/// Returns the mean negative log-likelihood of the true classes and its
/// gradient with respect to `scores`.
pub fn softmax_loss<T: WithDType>(scores: &Tensor<T>, labels: &[usize]) -> Result<(T, Tensor<T>)> {
    let (n, c) = check_inputs("softmax_loss", scores, labels)?;
    let inv_n = T::one() / T::from_usize(n);

    let mut loss = T::zero();
    let mut dscores = Tensor::zeros((n, c));
    let grad = dscores.as_mut_slice();
    for (i, (row, &y)) in scores.as_slice().chunks(c).zip(labels).enumerate() {
        let max = row.iter().copied().fold(T::neg_infinity(), T::max);
        let g_row = &mut grad[i * c..(i + 1) * c];
        let mut z = T::zero();
        for (g, &s) in g_row.iter_mut().zip(row) {
            *g = (s - max).exp();
            z += *g;
        }
        // log p_y = (s_y - max) - log z
        loss -= row[y] - max - z.ln();
        for g in g_row.iter_mut() {
            *g = *g / z * inv_n;
        }
        g_row[y] -= inv_n;
    }

    Ok((loss * inv_n, dscores))
}
