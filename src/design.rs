use std::fmt;

use eyre::bail;

use crate::samples::{Iptg, Sample};

/// Comparison of one IPTG group against another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Contrast {
    pub numerator: Iptg,
    pub denominator: Iptg,
}

impl Contrast {
    /// ex. `iptg_10_vs_0`
    pub fn name(&self) -> String {
        format!(
            "iptg_{}_vs_{}",
            self.numerator.micromolar(),
            self.denominator.micromolar()
        )
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("iptg_")?;
        let (num, den) = rest.split_once("_vs_")?;
        Some(Self {
            numerator: Iptg::from_micromolar(num.parse().ok()?)?,
            denominator: Iptg::from_micromolar(den.parse().ok()?)?,
        })
    }
}

impl fmt::Display for Contrast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// All non-baseline groups against the baseline.
pub fn contrasts() -> Vec<Contrast> {
    Iptg::ALL
        .into_iter()
        .filter(|grp| *grp != Iptg::BASELINE)
        .map(|grp| Contrast {
            numerator: grp,
            denominator: Iptg::BASELINE,
        })
        .collect()
}

/// Contrasts that can be tested with the given samples.
/// * Errors if there are no baseline samples or no other group.
/// * Groups with a single replicate are kept but have no within-group variance.
pub fn testable_contrasts(samples: &[Sample]) -> eyre::Result<Vec<Contrast>> {
    let n_in = |grp: Iptg| samples.iter().filter(|s| s.iptg == grp).count();
    if n_in(Iptg::BASELINE) == 0 {
        bail!("No samples in baseline group {}.", Iptg::BASELINE);
    }
    let testable: Vec<Contrast> = contrasts()
        .into_iter()
        .filter(|c| n_in(c.numerator) > 0)
        .collect();
    if testable.is_empty() {
        bail!("No samples outside of baseline group {}. Nothing to compare.", Iptg::BASELINE);
    }
    for grp in Iptg::ALL {
        match n_in(grp) {
            0 => log::warn!("No samples for group {grp}. Its contrast is skipped."),
            1 => log::warn!("Group {grp} has a single replicate."),
            _ => {}
        }
    }
    Ok(testable)
}
