use crate::error::{Error, Result};
use crate::math::matrix::Matrix;

/// Mean categorical cross-entropy over a batch of raw logits.
///
/// Softmax is folded into the loss, so the network's output layer stays linear.
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    pub const NAME: &'static str = "CrossEntropyLoss";

    /// L = mean_i( logsumexp(z_i) - z_i[y_i] )
    ///
    /// `logits`: shape `[batch, classes]`
    /// `labels`: one class index per row
    pub fn loss(logits: &Matrix, labels: &[usize]) -> Result<f64> {
        check_labels(logits, labels)?;
        let total: f64 = labels
            .iter()
            .enumerate()
            .map(|(i, &y)| {
                let row = logits.row(i);
                log_sum_exp(row) - row[y]
            })
            .sum();
        Ok(total / labels.len() as f64)
    }

    /// ∂L/∂z = (softmax(z) - onehot(y)) / batch
    pub fn derivative(logits: &Matrix, labels: &[usize]) -> Result<Matrix> {
        check_labels(logits, labels)?;
        let mut grad = softmax(logits);
        let scale = 1.0 / labels.len() as f64;
        for (i, &y) in labels.iter().enumerate() {
            let p = grad.get(i, y);
            grad.set(i, y, p - 1.0);
        }
        Ok(grad.map(|g| g * scale))
    }
}

/// Row-wise softmax, shifted by the row maximum for stability.
pub fn softmax(logits: &Matrix) -> Matrix {
    let mut out = Matrix::zeros(logits.rows, logits.cols);
    for i in 0..logits.rows {
        let row = logits.row(i);
        let lse = log_sum_exp(row);
        for (j, &z) in row.iter().enumerate() {
            out.set(i, j, (z - lse).exp());
        }
    }
    out
}

fn log_sum_exp(row: &[f64]) -> f64 {
    let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + row.iter().map(|z| (z - max).exp()).sum::<f64>().ln()
}

fn check_labels(logits: &Matrix, labels: &[usize]) -> Result<()> {
    if labels.is_empty() || labels.len() != logits.rows {
        return Err(Error::shape_mismatch(
            format!("{} labels", logits.rows),
            format!("{} labels", labels.len()),
        ));
    }
    if let Some(&bad) = labels.iter().find(|&&y| y >= logits.cols) {
        return Err(Error::shape_mismatch(
            format!("class index below {}", logits.cols),
            format!("label {}", bad),
        ));
    }
    Ok(())
}
