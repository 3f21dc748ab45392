//! Synthetic runs of simple binding equilibria.
//!
//! Event counts per species are proportional to the species' concentration,
//! each species contributing a Gaussian mass population whose width scales
//! with its mass.

use rand::Rng;
use rand::distributions::{Distribution, Uniform};
use rand::seq::SliceRandom;

use crate::error::{MpError, Result};
use crate::simulation::populations::{random_sample, Population};

/// Free monomer concentration for 2M ⇌ D at total monomer concentration `total` (M).
pub fn free_monomer(kd: f64, total: f64) -> f64 {
    (kd / 4.0) * ((1.0 + 8.0 * total / kd).sqrt() - 1.0)
}

/// Complex concentration for A + B ⇌ AB (all M).
pub fn complex_concentration(kd: f64, total_a: f64, total_b: f64) -> f64 {
    let s = kd + total_a + total_b;
    0.5 * (s - (s * s - 4.0 * total_a * total_b).max(0.0).sqrt())
}

fn jittered<R: Rng + ?Sized>(value: f64, jitter: f64, rng: &mut R) -> f64 {
    if jitter <= 0.0 {
        return value;
    }
    value * (1.0 + Uniform::new_inclusive(-jitter, jitter).sample(rng))
}

fn check_positive(name: &str, v: f64) -> Result<()> {
    if !v.is_finite() || v <= 0.0 {
        return Err(MpError::InvalidParameter(format!("{name} must be > 0, got {v}")));
    }
    Ok(())
}

/// Monomer-dimer equilibrium 2M ⇌ D.
#[derive(Clone, Debug, PartialEq)]
pub struct MonomerDimer {
    /// dissociation constant (M)
    pub kd: f64,
    /// kDa
    pub monomer_mass: f64,
    /// population std as a fraction of its mass
    pub std_factor: f64,
    pub total_counts: usize,
    /// relative uniform error applied to the nominal concentration
    pub concentration_jitter: f64,
}

impl Default for MonomerDimer {
    fn default() -> Self {
        Self {
            kd: 8.35e-9,
            monomer_mass: 80.0,
            std_factor: 0.16,
            total_counts: 1800,
            concentration_jitter: 0.03,
        }
    }
}

impl MonomerDimer {
    /// Monomer and dimer populations at total monomer concentration `total` (M).
    pub fn populations(&self, total: f64) -> Result<[Population; 2]> {
        check_positive("kd", self.kd)?;
        check_positive("total monomer concentration", total)?;
        let monomer = free_monomer(self.kd, total);
        let dimer = (total - monomer) / 2.0;
        let species = monomer + dimer;
        let n = self.total_counts as f64;
        let dimer_mass = 2.0 * self.monomer_mass;
        Ok([
            Population::new(self.monomer_mass, self.std_factor * self.monomer_mass, (n * monomer / species) as usize),
            Population::new(dimer_mass, self.std_factor * dimer_mass, (n * dimer / species) as usize),
        ])
    }

    /// Shuffled masses of one run at nominal total monomer concentration `total` (M).
    pub fn simulate<R: Rng + ?Sized>(&self, total: f64, rng: &mut R) -> Result<Vec<f64>> {
        let total = jittered(total, self.concentration_jitter, rng);
        let pops = self.populations(total)?;
        let mut masses = random_sample(&pops, rng)?;
        masses.shuffle(rng);
        Ok(masses)
    }
}

/// Complex formation A + B ⇌ AB, observed above a detection limit.
#[derive(Clone, Debug, PartialEq)]
pub struct ComplexFormation {
    pub kd: f64,
    pub mass_a: f64,
    pub mass_b: f64,
    /// total A concentration (M)
    pub concentration_a: f64,
    pub std_factor: f64,
    pub total_counts: usize,
    /// kDa; lighter events are discarded
    pub detection_limit: f64,
    pub concentration_jitter: f64,
}

impl Default for ComplexFormation {
    fn default() -> Self {
        Self {
            kd: 1e-9,
            mass_a: 150.0,
            mass_b: 30.0,
            concentration_a: 5e-9,
            std_factor: 0.08,
            total_counts: 3200,
            detection_limit: 40.0,
            concentration_jitter: 0.02,
        }
    }
}

impl ComplexFormation {
    /// Free A, free B and AB populations at total B concentration `total_b` (M).
    pub fn populations(&self, concentration_a: f64, total_b: f64) -> Result<[Population; 3]> {
        check_positive("kd", self.kd)?;
        check_positive("A concentration", concentration_a)?;
        check_positive("B concentration", total_b)?;
        let ab = complex_concentration(self.kd, concentration_a, total_b);
        let free_a = concentration_a - ab;
        let free_b = total_b - ab;
        let species = free_a + free_b + ab;
        let n = self.total_counts as f64;
        let mass_ab = self.mass_a + self.mass_b;
        Ok([
            Population::new(self.mass_a, self.std_factor * self.mass_a, (n * free_a / species) as usize),
            Population::new(self.mass_b, self.std_factor * self.mass_b, (n * free_b / species) as usize),
            Population::new(mass_ab, self.std_factor * mass_ab, (n * ab / species) as usize),
        ])
    }

    /// Shuffled masses of one run at nominal total B concentration `total_b` (M).
    pub fn simulate<R: Rng + ?Sized>(&self, total_b: f64, rng: &mut R) -> Result<Vec<f64>> {
        let a = jittered(self.concentration_a, self.concentration_jitter, rng);
        let b = jittered(total_b, self.concentration_jitter, rng);
        let pops = self.populations(a, b)?;
        let mut masses: Vec<f64> = random_sample(&pops, rng)?
            .into_iter()
            .filter(|m| *m >= self.detection_limit)
            .collect();
        masses.shuffle(rng);
        Ok(masses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_monomer_mass_balance() {
        let kd = 8.35e-9;
        for total in [1e-9, 8e-9, 64e-9] {
            let m = free_monomer(kd, total);
            let d = (total - m) / 2.0;
            assert!(((m + 2.0 * d) - total).abs() < 1e-18);
            // equilibrium: Kd = [M]^2 / [D]
            assert!((m * m / d - kd).abs() / kd < 1e-6);
        }
    }

    #[test]
    fn test_complex_mass_balance() {
        let (kd, a, b) = (1e-9, 5e-9, 2e-9);
        let ab = complex_concentration(kd, a, b);
        assert!(ab > 0.0 && ab < b);
        assert!(((a - ab) * (b - ab) / ab - kd).abs() / kd < 1e-6);
    }

    #[test]
    fn test_dimer_fraction_grows_with_concentration() {
        let md = MonomerDimer::default();
        let low = md.populations(1e-9).unwrap();
        let high = md.populations(64e-9).unwrap();
        assert!(high[1].n > low[1].n);
        assert!(high[0].n < low[0].n);
        assert_eq!(low[1].mean, 160.0);
    }

    #[test]
    fn test_complex_simulation_respects_detection_limit() {
        let cf = ComplexFormation::default();
        let masses = cf.simulate(8e-9, &mut StdRng::seed_from_u64(11)).unwrap();
        assert!(!masses.is_empty());
        assert!(masses.iter().all(|m| *m >= cf.detection_limit));
    }

    #[test]
    fn test_invalid_concentration() {
        let md = MonomerDimer::default();
        assert!(md.populations(0.0).is_err());
    }
}
