use itertools::Itertools;

/// Median of a slice of values. `None` if empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = values.iter().copied().sorted_by(f64::total_cmp).collect_vec();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Mean of natural logs. Any non-positive value makes this `-inf`.
pub fn mean_log(values: &[f64]) -> f64 {
    values.iter().map(|v| v.ln()).sum::<f64>() / values.len() as f64
}

/// Geometric mean. Zero if any value is zero.
pub fn geometric_mean(values: &[f64]) -> f64 {
    mean_log(values).exp()
}

/// Benjamini-Hochberg adjusted p-values.
///
/// # Arguments
/// * `pvalues`
///     * Raw p-values. Null p-values are ignored in the number of tests and stay null.
///
/// # Returns
/// * Adjusted p-values in input order, capped at 1.
pub fn benjamini_hochberg(pvalues: &[Option<f64>]) -> Vec<Option<f64>> {
    let ranked = pvalues
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.map(|p| (i, p)))
        .sorted_by(|a, b| b.1.total_cmp(&a.1))
        .collect_vec();
    let n = ranked.len() as f64;
    let mut adjusted = vec![None; pvalues.len()];

    // Walk from largest to smallest p-value keeping the running minimum.
    let mut running_min = 1.0_f64;
    for (rank_from_top, (idx, p)) in ranked.into_iter().enumerate() {
        let rank = n - rank_from_top as f64;
        running_min = running_min.min(p * n / rank);
        adjusted[idx] = Some(running_min.min(1.0));
    }
    adjusted
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_geometric_mean() {
        assert!((geometric_mean(&[1.0, 4.0, 16.0]) - 4.0).abs() < 1e-12);
        assert_eq!(geometric_mean(&[0.0, 4.0]), 0.0);
    }

    #[test]
    fn test_benjamini_hochberg() {
        // Same as R: p.adjust(c(0.01, 0.04, 0.03, 0.2), "BH")
        let padj = benjamini_hochberg(&[Some(0.01), Some(0.04), None, Some(0.03), Some(0.2)]);
        let expected = [Some(0.04), Some(0.16 / 3.0), None, Some(0.16 / 3.0), Some(0.2)];
        for (got, exp) in padj.iter().zip(expected.iter()) {
            match (got, exp) {
                (Some(g), Some(e)) => assert!((g - e).abs() < 1e-12, "{g} != {e}"),
                (None, None) => {}
                _ => panic!("null mismatch: {got:?} vs {exp:?}"),
            }
        }
    }

    #[test]
    fn test_benjamini_hochberg_capped() {
        let padj = benjamini_hochberg(&[Some(0.9), Some(0.95)]);
        assert_eq!(padj, vec![Some(0.95), Some(0.95)]);
    }
}
