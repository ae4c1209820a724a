pub fn mean(data: &[f64]) -> Option<f64> {
    match data.len() {
        0 => None,
        count => Some(data.iter().sum::<f64>() / count as f64),
    }
}

pub fn std_dev(data: &[f64]) -> Option<f64> {
    let data_mean = mean(data)?;
    let variance = data
        .iter()
        .map(|value| {
            let diff = data_mean - *value;

            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;

    Some(variance.sqrt())
}

/// Round half away from zero and clamp into `u32`, mapping NaN and
/// negatives to 0.
pub fn round_to_u32(value: f64) -> u32 {
    let rounded = value.round();
    if rounded.is_nan() || rounded <= 0.0 {
        0
    } else if rounded >= u32::MAX as f64 {
        u32::MAX
    } else {
        rounded as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_wpm_samples() {
        assert_eq!(mean(&[60., 70., 80.]), Some(70.0));
        assert_eq!(mean(&[42.0]), Some(42.0));
    }

    #[test]
    fn mean_empty_slice() {
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn std_dev_of_wpm_samples() {
        let result = std_dev(&[60., 70., 80.]).unwrap();
        assert!((result - 8.16496580927726).abs() < 1e-10);
    }

    #[test]
    fn std_dev_identical_and_empty() {
        assert_eq!(std_dev(&[55.0, 55.0, 55.0]), Some(0.0));
        assert_eq!(std_dev(&[]), None);
    }

    #[test]
    fn round_to_u32_edges() {
        assert_eq!(round_to_u32(0.8), 1);
        assert_eq!(round_to_u32(0.5), 1);
        assert_eq!(round_to_u32(0.49), 0);
        assert_eq!(round_to_u32(66.666), 67);
        assert_eq!(round_to_u32(-3.0), 0);
        assert_eq!(round_to_u32(f64::NAN), 0);
        assert_eq!(round_to_u32(f64::INFINITY), u32::MAX);
    }
}
