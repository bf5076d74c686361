//! Inference adapter: wraps an external policy/value function and enforces
//! the legal-action mask on its output.

use ndarray::{Array1, Array2, ArrayView2};
use tracing::trace;

use crate::{Device, InferenceError};

/// Network inference result.
#[derive(Clone, Debug)]
pub struct Inference {
    /// Prior probabilities, of shape `(n, action_dim)`.
    pub probabilities: Array2<f32>,
    /// Value estimates, of shape `(n,)`.
    pub values: Array1<f32>,
}

/// Trait for policy/value functions evaluated on batches of states.
///
/// The call is synchronous from the executor's point of view. Implementations
/// backed by a remote or micro-batching server block until the answer arrives
/// and own any retry or timeout policy.
///
/// Any `FnMut(ArrayView2<f32>) -> Result<Inference, InferenceError>` closure
/// implements this trait and runs on the CPU.
pub trait InferenceFn {
    /// Evaluates a batch of states of shape `(n, state_dim)`.
    ///
    /// The returned probabilities do not have to respect any mask; the
    /// adapter zeroes illegal actions and renormalizes.
    fn infer(&mut self, states: ArrayView2<f32>) -> Result<Inference, InferenceError>;

    /// Device the function runs on.
    fn device(&self) -> Device {
        Device::Cpu
    }
}

impl<F> InferenceFn for F
where
    F: FnMut(ArrayView2<f32>) -> Result<Inference, InferenceError>,
{
    fn infer(&mut self, states: ArrayView2<f32>) -> Result<Inference, InferenceError> {
        self(states)
    }
}

/// Zeroes illegal actions and renormalizes every row to sum to one.
///
/// A row whose remaining mass is zero or not finite falls back to a uniform
/// distribution over its legal actions. A row without legal actions stays
/// all-zero.
pub fn mask_and_normalize(probabilities: &mut Array2<f32>, masks: ArrayView2<bool>) {
    for (mut row, mask) in probabilities.outer_iter_mut().zip(masks.outer_iter()) {
        row.zip_mut_with(&mask, |p, &legal| {
            if !legal || !p.is_finite() || *p < 0.0 {
                *p = 0.0;
            }
        });

        let total = row.sum();
        if total > 0.0 && total.is_finite() {
            row.mapv_inplace(|p| p / total);
            continue;
        }

        let legal = mask.iter().filter(|&&legal| legal).count();
        if legal > 0 {
            let uniform = 1.0 / legal as f32;
            row.zip_mut_with(&mask, |p, &legal| *p = if legal { uniform } else { 0.0 });
        }
    }
}

/// Owns the inference function and the device hand-off around each call.
pub struct InferenceAdapter<I: InferenceFn> {
    inner: I,
    search_device: Device,
    action_dim: usize,
    calls: usize,
}

impl<I: InferenceFn> InferenceAdapter<I> {
    pub fn new(inner: I, search_device: Device, action_dim: usize) -> Self {
        InferenceAdapter { inner, search_device, action_dim, calls: 0 }
    }

    /// Number of times the wrapped function has been called.
    #[inline]
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Runs inference on `states` and masks the resulting priors.
    ///
    /// The batch is handed over as an owned row-major copy so a function on
    /// another device can upload it directly. Empty batches skip the call.
    pub fn infer(&mut self, states: ArrayView2<f32>, masks: ArrayView2<bool>) -> Result<Inference, InferenceError> {
        let n = states.nrows();
        if n == 0 {
            return Ok(Inference {
                probabilities: Array2::zeros((0, self.action_dim)),
                values: Array1::zeros(0),
            });
        }

        let device = self.inner.device();
        if device != self.search_device {
            trace!(rows = n, from = %self.search_device, to = %device, "moving inference batch");
        }
        let batch = states.as_standard_layout().into_owned();

        let mut out = self.inner.infer(batch.view())?;
        self.calls += 1;

        if out.probabilities.dim() != (n, self.action_dim) {
            return Err(InferenceError::Shape {
                what: "probabilities",
                expected: vec![n, self.action_dim],
                got: out.probabilities.shape().to_vec(),
            });
        }
        if out.values.len() != n {
            return Err(InferenceError::Shape {
                what: "values",
                expected: vec![n],
                got: out.values.shape().to_vec(),
            });
        }

        mask_and_normalize(&mut out.probabilities, masks);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::test_utils::compare_slices;

    #[test]
    fn test_mask_renormalizes() {
        let mut probabilities = array![[0.1, 0.2, 0.3, 0.4], [0.25, 0.25, 0.25, 0.25]];
        let masks = array![[true, false, true, false], [false, false, false, true]];

        mask_and_normalize(&mut probabilities, masks.view());

        assert!(compare_slices(probabilities.row(0).as_slice().unwrap(), &[0.25, 0.0, 0.75, 0.0]));
        assert!(compare_slices(probabilities.row(1).as_slice().unwrap(), &[0.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_mask_zero_mass_falls_back_to_uniform() {
        let mut probabilities = array![[0.0, 0.0, 0.0], [0.7, 0.3, 0.0], [f32::NAN, 1.0, 1.0]];
        let masks = array![[true, true, false], [false, false, true], [true, true, true]];

        mask_and_normalize(&mut probabilities, masks.view());

        assert!(compare_slices(probabilities.row(0).as_slice().unwrap(), &[0.5, 0.5, 0.0]));
        assert!(compare_slices(probabilities.row(1).as_slice().unwrap(), &[0.0, 0.0, 1.0]));
        assert!(compare_slices(probabilities.row(2).as_slice().unwrap(), &[0.0, 0.5, 0.5]));
    }

    #[test]
    fn test_adapter_rejects_bad_shapes() {
        let infer = |states: ArrayView2<f32>| -> Result<Inference, InferenceError> {
            Ok(Inference {
                probabilities: Array2::zeros((states.nrows(), 2)),
                values: Array1::zeros(states.nrows()),
            })
        };
        let mut adapter = InferenceAdapter::new(infer, Device::Cpu, 3);
        let states = Array2::<f32>::zeros((4, 1));
        let masks = Array2::from_elem((4, 3), true);

        let result = adapter.infer(states.view(), masks.view());
        assert!(matches!(result, Err(InferenceError::Shape { what: "probabilities", .. })));
    }

    #[test]
    fn test_adapter_skips_empty_batch() -> Result<(), InferenceError> {
        let infer = |_: ArrayView2<f32>| -> Result<Inference, InferenceError> {
            Err(InferenceError::Failed("should not be called".to_string()))
        };
        let mut adapter = InferenceAdapter::new(infer, Device::Cpu, 3);

        let out = adapter.infer(Array2::<f32>::zeros((0, 2)).view(), Array2::from_elem((0, 3), true).view())?;
        assert_eq!(out.probabilities.dim(), (0, 3));
        assert_eq!(adapter.calls(), 0);
        Ok(())
    }
}
