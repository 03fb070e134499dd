//! Regression losses between the online network's estimates for the taken
//! actions and their Bellman targets.
//!
//! Both losses use mean reduction over the batch and report gradients with
//! respect to the predictions.

use ndarray::{Array1, ArrayView1, Zip};

use crate::error::{RacerError, Result};

/// Trait defining the interface for loss functions
pub trait Loss: Send + Sync {
    /// Mean loss over a batch of scalar predictions
    fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<f32>;

    /// dLoss/dPrediction for every element of the batch
    fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<Array1<f32>>;
}

/// Mean Squared Error loss, `mean(0.5 * d^2)`
pub struct MSE;

impl Loss for MSE {
    fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<f32> {
        let n = check_batch(predictions, targets)?;
        let diff = &predictions - &targets;
        Ok(diff.mapv(|x| 0.5 * x * x).sum() / n)
    }

    fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<Array1<f32>> {
        let n = check_batch(predictions, targets)?;
        Ok((&predictions - &targets) / n)
    }
}

/// Huber loss (smooth L1): quadratic for `|d| <= delta`, linear beyond.
///
/// With `delta = 1` this is the smooth-L1 loss, whose gradient magnitude per
/// element never exceeds `delta / batch_size`.
#[derive(Clone, Copy, Debug)]
pub struct HuberLoss {
    pub delta: f32,
}

impl HuberLoss {
    pub fn new(delta: f32) -> Self {
        HuberLoss { delta }
    }

    pub fn smooth_l1() -> Self {
        Self::new(1.0)
    }

    fn element(&self, d: f32) -> f32 {
        let abs_d = d.abs();
        if abs_d <= self.delta {
            0.5 * d * d
        } else {
            self.delta * (abs_d - 0.5 * self.delta)
        }
    }
}

impl Default for HuberLoss {
    fn default() -> Self {
        Self::smooth_l1()
    }
}

impl Loss for HuberLoss {
    fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<f32> {
        let n = check_batch(predictions, targets)?;
        let mut total = 0.0;
        Zip::from(&predictions).and(&targets).for_each(|&p, &t| total += self.element(p - t));
        Ok(total / n)
    }

    fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<Array1<f32>> {
        let n = check_batch(predictions, targets)?;
        let delta = self.delta;
        Ok(Zip::from(&predictions).and(&targets).map_collect(|&p, &t| {
            let d = p - t;
            d.max(-delta).min(delta) / n
        }))
    }
}

fn check_batch(predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<f32> {
    if predictions.len() != targets.len() {
        return Err(RacerError::invalid_shape(
            format!("[{}]", predictions.len()),
            format!("[{}]", targets.len()),
        ));
    }
    if predictions.is_empty() {
        return Err(RacerError::InsufficientData { requested: 1, available: 0 });
    }
    Ok(predictions.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_huber_quadratic_region() {
        let loss = HuberLoss::smooth_l1();
        let value = loss.compute(array![0.5].view(), array![0.0].view()).unwrap();
        assert!((value - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_huber_linear_region() {
        let loss = HuberLoss::smooth_l1();
        let value = loss.compute(array![3.0, 0.0].view(), array![0.0, 0.0].view()).unwrap();
        // (3 - 0.5 + 0) / 2
        assert!((value - 1.25).abs() < 1e-6);
    }

    #[test]
    fn test_huber_gradient_is_bounded() {
        let loss = HuberLoss::smooth_l1();
        let grad = loss.gradient(array![100.0, -0.5].view(), array![0.0, 0.0].view()).unwrap();
        assert_eq!(grad, array![0.5, -0.25]);
    }

    #[test]
    fn test_mse() {
        let value = MSE.compute(array![2.0].view(), array![0.0].view()).unwrap();
        assert_eq!(value, 2.0);
        assert_eq!(MSE.gradient(array![2.0].view(), array![0.0].view()).unwrap(), array![2.0]);
    }

    #[test]
    fn test_length_mismatch() {
        let err = HuberLoss::default().compute(array![1.0].view(), array![1.0, 2.0].view());
        assert!(matches!(err, Err(RacerError::InvalidShape { .. })));
    }
}
