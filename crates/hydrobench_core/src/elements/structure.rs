//! Elements that only redistribute fluxes: no storage, no parameters to
//! calibrate.

/// Net PET and net rainfall after interception: `min(PET, P)` is removed from
/// both.
pub fn interception(pet: f64, precip: f64) -> (f64, f64) {
    let intercepted = pet.min(precip);
    (pet - intercepted, precip - intercepted)
}

/// Splits a series into fractions given by `weights`.
pub fn split(series: &[f64], weights: &[f64]) -> Vec<Vec<f64>> {
    weights
        .iter()
        .map(|w| series.iter().map(|x| x * w).collect())
        .collect()
}

/// Total GR4J outflow: routed flow plus the direct branch with the exchange
/// added, floored at zero.
pub fn aggregate(routed: f64, exchange: f64, direct: f64) -> f64 {
    routed + (direct + exchange).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interception_removes_the_smaller_flux() {
        assert_eq!(interception(2.0, 5.0), (0.0, 3.0));
        assert_eq!(interception(4.0, 1.0), (3.0, 0.0));
    }

    #[test]
    fn split_preserves_total() {
        let parts = split(&[10.0, 4.0], &[0.9, 0.1]);
        assert_eq!(parts.len(), 2);
        for k in 0..2 {
            assert!((parts[0][k] + parts[1][k] - [10.0, 4.0][k]).abs() < 1e-12);
        }
    }

    #[test]
    fn aggregate_adds_exchange_to_direct_branch() {
        assert_eq!(aggregate(1.0, 0.5, 2.0), 3.5);
        assert_eq!(aggregate(1.0, -3.0, 2.0), 1.0);
    }
}
