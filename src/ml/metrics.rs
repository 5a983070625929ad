// src/ml/metrics.rs
use log::warn;
use ndarray::Array1;

/// Mean absolute error. NaN on empty input.
pub fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    (y_true - y_pred).mapv(f64::abs).mean().unwrap_or(f64::NAN)
}

/// Root mean squared error. NaN on empty input.
pub fn root_mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    (y_true - y_pred)
        .mapv(|e| e * e)
        .mean()
        .map(f64::sqrt)
        .unwrap_or(f64::NAN)
}

/// Coefficient of determination.
///
/// Constant targets score 1.0 for a perfect fit and 0.0 otherwise. With fewer
/// than two samples the score is undefined and NaN is returned.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.len() < 2 {
        warn!(
            "R² is not well-defined with {} sample(s); returning NaN",
            y_true.len()
        );
        return f64::NAN;
    }
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = (y_true - y_pred).mapv(|e| e * e).sum();
    let ss_tot: f64 = y_true.mapv(|y| (y - mean) * (y - mean)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mae_and_rmse() {
        let y = array![3.0, -0.5, 2.0, 7.0];
        let p = array![2.5, 0.0, 2.0, 8.0];
        assert!((mean_absolute_error(&y, &p) - 0.5).abs() < 1e-12);
        assert!((root_mean_squared_error(&y, &p) - 0.375_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_r2() {
        let y = array![3.0, -0.5, 2.0, 7.0];
        let p = array![2.5, 0.0, 2.0, 8.0];
        assert!((r2_score(&y, &p) - 0.948_608_137).abs() < 1e-6);
        assert_eq!(r2_score(&y, &y), 1.0);
    }

    #[test]
    fn test_r2_constant_targets() {
        let y = array![2.0, 2.0, 2.0];
        assert_eq!(r2_score(&y, &array![2.0, 2.0, 2.0]), 1.0);
        assert_eq!(r2_score(&y, &array![1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_degenerate_inputs_are_nan() {
        let empty = Array1::<f64>::zeros(0);
        assert!(mean_absolute_error(&empty, &empty).is_nan());
        assert!(root_mean_squared_error(&empty, &empty).is_nan());
        assert!(r2_score(&array![1.0], &array![1.0]).is_nan());
    }
}
