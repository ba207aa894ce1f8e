//! Evaluation metrics reported by the offline train job.

use ndarray::Array1;

/// Fraction of predictions on the correct side of `threshold`.
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>, threshold: f64) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }

    let mut correct = 0usize;
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        let pred_class = if *p > threshold { 1.0 } else { 0.0 };
        if (t - pred_class).abs() < 1e-10 {
            correct += 1;
        }
    }

    correct as f64 / y_true.len() as f64
}

/// Coefficient of determination between predicted probabilities and the
/// true labels. Diagnostic only; can go negative when the fit is worse than
/// predicting the label mean.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let mean = y_true.mean().unwrap_or(0.0);

    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();

    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        0.0
    } else {
        1.0 - (ss_res / ss_tot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy_at_threshold() {
        let y_true = array![1.0, 0.0, 1.0, 0.0];
        let y_pred = array![0.9, 0.2, 0.4, 0.6];

        assert_eq!(accuracy(&y_true, &y_pred, 0.5), 0.5);
    }

    #[test]
    fn test_perfect_predictions_score_one() {
        let y = array![1.0, 0.0, 1.0];
        assert_eq!(accuracy(&y, &y, 0.5), 1.0);
        assert_eq!(r2_score(&y, &y), 1.0);
    }

    #[test]
    fn test_r2_constant_labels_is_zero() {
        let y_true = array![1.0, 1.0, 1.0];
        let y_pred = array![0.9, 0.8, 0.7];
        assert_eq!(r2_score(&y_true, &y_pred), 0.0);
    }
}
