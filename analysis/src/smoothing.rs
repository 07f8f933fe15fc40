//! Savitzky-Golay smoothing for the acceleration curves.
//!
//! Every output point is the value of a least-squares polynomial fitted to
//! `window` neighbouring samples. Near the ends the first/last full window is
//! fitted and evaluated at the edge positions, so the output has the same
//! length as the input.

use nalgebra::{Cholesky, DMatrix, DVector};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SmoothingError {
    #[error("Window length {0} must be odd")]
    EvenWindow(usize),
    #[error("Polynomial order {order} must be less than the window length {window}")]
    OrderTooHigh { order: usize, window: usize },
    #[error("{points} points are not enough for a window of {window}")]
    TooFewPoints { points: usize, window: usize },
    #[error("Least squares system is singular")]
    Singular,
}

pub fn savgol(values: &[f64], window: usize, order: usize) -> Result<Vec<f64>, SmoothingError> {
    if window % 2 == 0 {
        return Err(SmoothingError::EvenWindow(window));
    }
    if order >= window {
        return Err(SmoothingError::OrderTooHigh { order, window });
    }
    if values.len() < window {
        return Err(SmoothingError::TooFewPoints {
            points: values.len(),
            window,
        });
    }

    let half = window / 2;
    let kernels = (0..window)
        .map(|position| weights(window, order, position))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((0..values.len())
        .map(|index| {
            let start = index.saturating_sub(half).min(values.len() - window);

            kernels[index - start]
                .iter()
                .zip(&values[start..start + window])
                .map(|(weight, value)| weight * value)
                .sum::<f64>()
        })
        .collect())
}

/// Weights that evaluate the fitted polynomial at `position` inside the window
pub fn weights(window: usize, order: usize, position: usize) -> Result<Vec<f64>, SmoothingError> {
    let terms = order + 1;
    let center = (window / 2) as f64;
    // sample positions centered for conditioning
    let design = DMatrix::from_fn(window, terms, |row, power| {
        (row as f64 - center).powi(power as i32)
    });

    let x = position as f64 - center;
    let target = DVector::from_fn(terms, |power, _| x.powi(power as i32));
    // normal equations are symmetric positive definite for order < window
    let solution = Cholesky::new(design.tr_mul(&design))
        .ok_or(SmoothingError::Singular)?
        .solve(&target);

    Ok((design * solution).iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(left: &[f64], right: &[f64]) {
        assert_eq!(left.len(), right.len());
        for (l, r) in left.iter().zip(right) {
            assert!((l - r).abs() < 1e-9, "{left:?} != {right:?}");
        }
    }

    #[test]
    fn interior_kernel() {
        let expected = [-3.0, 12.0, 17.0, 12.0, -3.0].map(|value| value / 35.0);

        assert_close(&weights(5, 2, 2).unwrap(), &expected);
    }

    #[test]
    fn edge_kernels_evaluate_the_fit() {
        for position in 0..7 {
            let kernel = weights(7, 3, position).unwrap();

            assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            // a line through the window is reproduced at every position
            let fitted = kernel
                .iter()
                .enumerate()
                .map(|(row, weight)| weight * (2.0 * row as f64 + 1.0))
                .sum::<f64>();
            assert!((fitted - (2.0 * position as f64 + 1.0)).abs() < 1e-9);
        }
    }

    #[test]
    fn quadratics_are_preserved() {
        let values = (0..9)
            .map(|x| {
                let x = x as f64;
                0.5 * x * x - 3.0 * x + 7.0
            })
            .collect::<Vec<_>>();

        assert_close(&savgol(&values, 5, 2).unwrap(), &values);
    }

    #[test]
    fn noise_is_damped() {
        let values = [1.0, 3.0, 1.0, 3.0, 1.0, 3.0, 1.0];
        let smoothed = savgol(&values, 5, 2).unwrap();

        // interior point 3: (-3*3 + 12*1 + 17*3 + 12*1 - 3*3) / 35
        assert!((smoothed[3] - 57.0 / 35.0).abs() < 1e-9);
        assert!(smoothed[3] > 1.0 && smoothed[3] < 3.0);
    }

    #[test]
    fn rejects_invalid_parameters() {
        let values = [1.0; 4];

        assert_eq!(savgol(&values, 4, 2), Err(SmoothingError::EvenWindow(4)));
        assert_eq!(
            savgol(&values, 3, 3),
            Err(SmoothingError::OrderTooHigh {
                order: 3,
                window: 3
            })
        );
        assert_eq!(
            savgol(&values, 5, 2),
            Err(SmoothingError::TooFewPoints {
                points: 4,
                window: 5
            })
        );
    }
}
