use serde::{Deserialize, Serialize};

/// Immutable per-project work-unit metadata from the protein catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protein {
    pub project: u32,
    pub work_unit_name: String,
    /// Base credit awarded for a completed unit.
    pub credit: f64,
    /// Number of frames the unit reports.
    pub frames: u32,
    /// Bonus curve factor; zero means no bonus for this project.
    pub k_factor: f64,
    pub core_name: String,
    pub atoms: u64,
    /// Deadline (days) within which the bonus curve applies.
    pub preferred_days: f64,
    /// Hard deadline (days) for any credit at all.
    pub maximum_days: f64,
}

impl Protein {
    pub fn new(project: u32) -> Self {
        Self {
            project,
            work_unit_name: String::new(),
            credit: 0.0,
            frames: 100,
            k_factor: 0.0,
            core_name: String::new(),
            atoms: 0,
            preferred_days: 0.0,
            maximum_days: 0.0,
        }
    }

    /// Bonus multiplier for a unit completed in `elapsed_secs`.
    ///
    /// sqrt(k_factor * maximum_deadline / elapsed), floored at 1.0. Projects
    /// without a k-factor always earn exactly base credit.
    pub fn bonus_multiplier(&self, elapsed_secs: f64) -> f64 {
        if self.k_factor <= 0.0 || elapsed_secs <= 0.0 || self.maximum_days <= 0.0 {
            return 1.0;
        }

        let max_secs = self.maximum_days * 86_400.0;
        (self.k_factor * max_secs / elapsed_secs).sqrt().max(1.0)
    }

    /// Credit for a unit completed in `elapsed_secs`, bonus included.
    pub fn credit_for(&self, elapsed_secs: f64) -> f64 {
        self.credit * self.bonus_multiplier(elapsed_secs)
    }

    /// Points per day at a steady `elapsed_secs` per unit.
    pub fn ppd(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.credit_for(elapsed_secs) * (86_400.0 / elapsed_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bonus_protein() -> Protein {
        Protein {
            project: 9999,
            work_unit_name: "p9999_lambda".to_string(),
            credit: 1000.0,
            frames: 100,
            k_factor: 2.0,
            core_name: "GRO_A7".to_string(),
            atoms: 250_000,
            preferred_days: 2.0,
            maximum_days: 4.0,
        }
    }

    #[test]
    fn test_no_k_factor_means_base_credit() {
        let mut protein = bonus_protein();
        protein.k_factor = 0.0;
        assert_eq!(protein.bonus_multiplier(3600.0), 1.0);
        assert_eq!(protein.credit_for(3600.0), 1000.0);
    }

    #[test]
    fn test_bonus_multiplier_floor() {
        let protein = bonus_protein();
        // Slower than the maximum deadline: multiplier clamps to 1.0.
        let slow = protein.maximum_days * 86_400.0 * 10.0;
        assert_eq!(protein.bonus_multiplier(slow), 1.0);
    }

    #[test]
    fn test_bonus_multiplier_value() {
        let protein = bonus_protein();
        // k * max_secs / elapsed = 2 * 345600 / 86400 = 8 -> sqrt = 2.828...
        let m = protein.bonus_multiplier(86_400.0);
        assert!((m - 8.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_ppd_scales_with_speed() {
        let protein = bonus_protein();
        assert!(protein.ppd(43_200.0) > protein.ppd(86_400.0));
        assert_eq!(protein.ppd(0.0), 0.0);
    }
}
