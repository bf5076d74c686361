use rand::{rngs::StdRng, Rng};

/// Index of the largest element, ties broken towards the lowest index.
///
/// NaN entries never win. Returns `0` for an empty or all-NaN slice.
#[inline]
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;

    for (index, &value) in values.iter().enumerate() {
        if value > best_value {
            best = index;
            best_value = value;
        }
    }
    best
}

/// Turns root visit counts into an action distribution.
///
/// Computes `softmax(counts / temperature)` over the legal actions; illegal
/// actions get probability zero. A temperature of `0.0` (or below) yields a
/// one-hot distribution on the most visited legal action.
///
/// # Parameters
/// - `counts`: Visit counts of one root, one entry per action.
/// - `mask`: Legal-action mask of the same root.
/// - `temperature`: Softmax temperature.
pub fn visit_count_policy(counts: &[u32], mask: &[bool], temperature: f32) -> Vec<f32> {
    let mut policy = vec![0.0; counts.len()];
    if !mask.iter().any(|&legal| legal) {
        return policy;
    }

    if temperature <= 0.0 {
        let masked: Vec<f32> = counts
            .iter()
            .zip(mask)
            .map(|(&n, &legal)| if legal { n as f32 } else { f32::NEG_INFINITY })
            .collect();
        policy[argmax(&masked)] = 1.0;
        return policy;
    }

    let max_count = counts
        .iter()
        .zip(mask)
        .filter(|(_, legal)| **legal)
        .map(|(&n, _)| n as f32)
        .fold(f32::NEG_INFINITY, f32::max);

    for ((p, &n), &legal) in policy.iter_mut().zip(counts).zip(mask) {
        if legal {
            *p = ((n as f32 - max_count) / temperature).exp();
        }
    }

    let total: f32 = policy.iter().sum();
    policy.iter_mut().for_each(|p| *p /= total);
    policy
}

/// Samples an action index from a given policy distribution using a random number generator.
///
/// This function performs a weighted random selection, where actions with higher
/// policy probabilities are more likely to be chosen.
///
/// # Parameters
/// - `policy`: A slice representing the probability distribution over actions.
///             The sum of probabilities should ideally be 1.0.
/// - `rng`: A mutable reference to a `StdRng` instance, seeded for reproducible sampling.
///
/// # Returns
/// The index of the sampled action. Rounding leftovers fall on the last action
/// with non-zero probability.
pub fn sample(policy: &[f32], rng: &mut StdRng) -> usize {
    let mut random: f32 = rng.random();

    policy
        .iter()
        .position(|&x| {
            random -= x;
            x > 0.0 && random <= 0.
        })
        .or_else(|| policy.iter().rposition(|&x| x > 0.0))
        .unwrap_or(policy.len().saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_argmax_first_tie() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5, 0.1]), 1);
        assert_eq!(argmax(&[0.25; 4]), 0);
        assert_eq!(argmax(&[f32::NAN, 0.1]), 1);
    }

    #[test]
    fn test_policy_greedy() {
        let policy = visit_count_policy(&[3, 9, 9, 20], &[true, true, true, false], 0.0);
        assert_eq!(policy, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_policy_softmax_masks_illegal() {
        let policy = visit_count_policy(&[1, 1, 50], &[true, true, false], 1.0);
        assert!((policy[0] - 0.5).abs() < 1e-6);
        assert!((policy[1] - 0.5).abs() < 1e-6);
        assert_eq!(policy[2], 0.0);
    }

    #[test]
    fn test_sample_skips_zero_probabilities() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let action = sample(&[0.0, 0.4, 0.0, 0.6, 0.0], &mut rng);
            assert!(action == 1 || action == 3);
        }
    }
}
