//! Constrained mean-variance solve.
//!
//! ```text
//! minimize   f(w) = −wᵀμ + (λ/2) wᵀΣw
//! subject to |wᵢ| ≤ bᵢ,  Σ|wᵢ| ≤ L            (projection set C)
//!            S_G(w) = Σ_{i∈G} wᵢ(Σw)ᵢ / wᵀΣw ≤ c_G   for every risk group G
//! ```
//!
//! The risk-share constraints are handled by an augmented Lagrangian
//! (PHR form for inequalities); each inner problem is solved by projected
//! gradient with backtracking over C. The projection onto box ∩ L1 ball
//! soft-thresholds magnitudes by θ ≥ 0, found by bisection.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SolverConfig;
use crate::errors::{Error, Result};
use crate::infra::targets;

/// Portfolio variance below which risk shares are undefined (treated as zero).
const MIN_VARIANCE: f64 = 1e-18;

/// Set of instruments whose combined risk share is capped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGroup {
    pub name: String,
    pub members: Vec<usize>,
    pub ceiling: f64,
}

/// Inputs of one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanVarianceProblem {
    pub expected_returns: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub risk_aversion: f64,
    /// Per-instrument bound on |wᵢ|
    pub bounds: DVector<f64>,
    pub max_gross_leverage: f64,
    pub risk_groups: Vec<RiskGroup>,
}

impl MeanVarianceProblem {
    fn validate(&self) -> Result<()> {
        let n = self.expected_returns.len();
        if self.covariance.nrows() != n || self.covariance.ncols() != n {
            return Err(Error::dimension_mismatch("solver covariance", n, self.covariance.nrows()));
        }
        if self.bounds.len() != n {
            return Err(Error::dimension_mismatch("solver bounds", n, self.bounds.len()));
        }
        if let Some(bad) = self
            .risk_groups
            .iter()
            .flat_map(|g| g.members.iter())
            .find(|i| **i >= n)
        {
            return Err(Error::dimension_mismatch("risk group member", n, *bad));
        }
        Ok(())
    }

    /// f(w) to minimize.
    pub fn objective(&self, w: &DVector<f64>) -> f64 {
        -w.dot(&self.expected_returns) + 0.5 * self.risk_aversion * w.dot(&(&self.covariance * w))
    }

    /// Risk share of every group at `w`.
    pub fn risk_shares(&self, w: &DVector<f64>) -> Vec<f64> {
        let s = &self.covariance * w;
        let v = w.dot(&s);
        self.risk_groups
            .iter()
            .map(|g| {
                if v < MIN_VARIANCE {
                    0.0
                } else {
                    g.members.iter().map(|i| w[*i] * s[*i]).sum::<f64>() / v
                }
            })
            .collect()
    }

    /// Largest violation of any constraint (0 when feasible).
    pub fn max_violation(&self, w: &DVector<f64>) -> f64 {
        let box_violation = w
            .iter()
            .zip(self.bounds.iter())
            .map(|(x, b)| (x.abs() - b).max(0.0))
            .fold(0.0, f64::max);
        let leverage_violation = (w.abs().sum() - self.max_gross_leverage).max(0.0);
        let share_violation = self
            .risk_shares(w)
            .iter()
            .zip(&self.risk_groups)
            .map(|(s, g)| (s - g.ceiling).max(0.0))
            .fold(0.0, f64::max);
        box_violation.max(leverage_violation).max(share_violation)
    }

    /// Constraint values g_G = S_G − c_G and their gradients.
    fn constraints(&self, w: &DVector<f64>) -> (Vec<f64>, Vec<DVector<f64>>) {
        let n = w.len();
        let s = &self.covariance * w;
        let v = w.dot(&s);
        let mut values = Vec::with_capacity(self.risk_groups.len());
        let mut grads = Vec::with_capacity(self.risk_groups.len());
        for g in &self.risk_groups {
            if v < MIN_VARIANCE {
                values.push(-g.ceiling);
                grads.push(DVector::zeros(n));
                continue;
            }
            let mut a: DVector<f64> = DVector::zeros(n);
            let mut us: DVector<f64> = DVector::zeros(n);
            let mut num = 0.0;
            for i in &g.members {
                a[*i] = w[*i];
                us[*i] = s[*i];
                num += w[*i] * s[*i];
            }
            let share = num / v;
            let grad = (us + &self.covariance * a) / v - &s * (2.0 * share / v);
            values.push(share - g.ceiling);
            grads.push(grad);
        }
        (values, grads)
    }
}

/// Euclidean projection onto `{|wᵢ| ≤ bᵢ, Σ|wᵢ| ≤ budget}`.
pub fn project_box_l1(v: &DVector<f64>, bounds: &DVector<f64>, budget: f64) -> DVector<f64> {
    let shrink = |theta: f64| -> DVector<f64> {
        DVector::from_iterator(
            v.len(),
            v.iter()
                .zip(bounds.iter())
                .map(|(x, b)| x.signum() * (x.abs() - theta).clamp(0.0, *b)),
        )
    };

    let clipped = shrink(0.0);
    if clipped.abs().sum() <= budget {
        return clipped;
    }

    let (mut lo, mut hi) = (0.0, v.amax());
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if shrink(mid).abs().sum() > budget {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    shrink(hi)
}

/// Converged solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub weights: DVector<f64>,
    /// wᵀμ − (λ/2)wᵀΣw
    pub utility: f64,
    pub max_violation: f64,
    pub outer_iterations: usize,
    pub inner_iterations: usize,
}

/// Solver outcome; infeasibility is a result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SolveOutcome {
    Solved(Solution),
    NoSolution {
        max_violation: f64,
        outer_iterations: usize,
        reason: String,
    },
}

impl SolveOutcome {
    pub fn solution(&self) -> Option<&Solution> {
        match self {
            SolveOutcome::Solved(s) => Some(s),
            SolveOutcome::NoSolution { .. } => None,
        }
    }
}

/// Augmented-Lagrangian solver with projected-gradient inner loop.
#[derive(Debug, Clone, Default)]
pub struct AugmentedLagrangian {
    config: SolverConfig,
}

impl AugmentedLagrangian {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn solve(&self, problem: &MeanVarianceProblem) -> Result<SolveOutcome> {
        problem.validate()?;
        let n = problem.expected_returns.len();
        let m = problem.risk_groups.len();
        let cfg = &self.config;

        if n == 0 {
            return Ok(SolveOutcome::Solved(Solution {
                weights: DVector::zeros(0),
                utility: 0.0,
                max_violation: 0.0,
                outer_iterations: 0,
                inner_iterations: 0,
            }));
        }

        let curvature = problem.risk_aversion * problem.covariance.trace().max(MIN_VARIANCE);
        let mut step = 1.0 / curvature;
        let mut w = Self::starting_point(problem);
        let mut y = vec![0.0; m];
        let mut rho = cfg.initial_penalty;
        let mut previous_violation = f64::INFINITY;
        let mut inner_total = 0;
        let mut outer = 0;

        while outer < cfg.max_outer_iterations {
            outer += 1;
            let w_before = w.clone();
            let (w_next, iters, last_step) = self.inner_solve(problem, w, &y, rho, step);
            w = w_next;
            step = last_step;
            inner_total += iters;

            let (g, _) = problem.constraints(&w);
            let violation = g.iter().fold(0.0_f64, |acc, v| acc.max(*v));
            let moved = (&w - &w_before).amax();

            let inactive = y.iter().all(|v| *v == 0.0);
            if violation <= cfg.feasibility_tolerance && (inactive || moved < cfg.feasibility_tolerance * 1e-2) {
                break;
            }

            for (yj, gj) in y.iter_mut().zip(&g) {
                *yj = (*yj + rho * gj).max(0.0);
            }
            if violation > 0.25 * previous_violation {
                rho *= cfg.penalty_growth;
            }
            previous_violation = violation;
        }

        let max_violation = problem.max_violation(&w);
        if max_violation > cfg.feasibility_tolerance {
            warn!(
                target: targets::PORTFOLIO,
                max_violation,
                outer_iterations = outer,
                "Optimizer found no feasible point"
            );
            return Ok(SolveOutcome::NoSolution {
                max_violation,
                outer_iterations: outer,
                reason: format!(
                    "risk-share violation {:.2e} above tolerance {:.2e}",
                    max_violation, cfg.feasibility_tolerance
                ),
            });
        }

        debug!(
            target: targets::PORTFOLIO,
            outer_iterations = outer,
            inner_iterations = inner_total,
            max_violation,
            "Optimizer converged"
        );
        Ok(SolveOutcome::Solved(Solution {
            utility: -problem.objective(&w),
            weights: w,
            max_violation,
            outer_iterations: outer,
            inner_iterations: inner_total,
        }))
    }

    /// Inverse-volatility weights signed by μ, at half the box and leverage.
    ///
    /// Risk shares are scale-invariant and undefined at zero, so the solve
    /// starts from a non-zero point with roughly equal shares.
    fn starting_point(problem: &MeanVarianceProblem) -> DVector<f64> {
        let n = problem.expected_returns.len();
        let vols: Vec<f64> = (0..n)
            .map(|i| problem.covariance[(i, i)].max(MIN_VARIANCE).sqrt())
            .collect();
        let inverse_sum: f64 = vols.iter().map(|v| 1.0 / v).sum();
        let box_scale = vols
            .iter()
            .zip(problem.bounds.iter())
            .map(|(v, b)| b * v)
            .fold(f64::INFINITY, f64::min);
        let scale = 0.5 * box_scale.min(problem.max_gross_leverage / inverse_sum);
        let raw = DVector::from_iterator(
            n,
            problem
                .expected_returns
                .iter()
                .zip(&vols)
                .map(|(mu, v)| if *mu == 0.0 { 0.0 } else { mu.signum() * scale / v }),
        );
        project_box_l1(&raw, &problem.bounds, problem.max_gross_leverage)
    }

    /// Augmented Lagrangian value and gradient.
    fn lagrangian(
        problem: &MeanVarianceProblem,
        w: &DVector<f64>,
        y: &[f64],
        rho: f64,
    ) -> (f64, DVector<f64>) {
        let sigma_w = &problem.covariance * w;
        let mut value = -w.dot(&problem.expected_returns) + 0.5 * problem.risk_aversion * w.dot(&sigma_w);
        let mut grad = &sigma_w * problem.risk_aversion - &problem.expected_returns;

        let (g, grads) = problem.constraints(w);
        for ((yj, gj), dg) in y.iter().zip(&g).zip(&grads) {
            let shifted = (yj + rho * gj).max(0.0);
            value += (shifted * shifted - yj * yj) / (2.0 * rho);
            if shifted > 0.0 {
                grad += dg * shifted;
            }
        }
        (value, grad)
    }

    fn inner_solve(
        &self,
        problem: &MeanVarianceProblem,
        mut w: DVector<f64>,
        y: &[f64],
        rho: f64,
        mut step: f64,
    ) -> (DVector<f64>, usize, f64) {
        let bounds = &problem.bounds;
        let budget = problem.max_gross_leverage;
        let mut iterations = 0;

        while iterations < self.config.max_inner_iterations {
            iterations += 1;
            let (value, grad) = Self::lagrangian(problem, &w, y, rho);

            let mut candidate = w.clone();
            for _ in 0..60 {
                candidate = project_box_l1(&(&w - &grad * step), bounds, budget);
                let d = &candidate - &w;
                let (next, _) = Self::lagrangian(problem, &candidate, y, rho);
                if next <= value + grad.dot(&d) + d.norm_squared() / (2.0 * step) {
                    break;
                }
                step *= 0.5;
            }

            let moved = (&candidate - &w).amax();
            w = candidate;
            if moved < self.config.step_tolerance {
                break;
            }
            step *= 1.5;
        }
        (w, iterations, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal_problem(mu: &[f64], vols: &[f64]) -> MeanVarianceProblem {
        let n = mu.len();
        let mut cov = DMatrix::zeros(n, n);
        for (i, v) in vols.iter().enumerate() {
            cov[(i, i)] = v * v;
        }
        MeanVarianceProblem {
            expected_returns: DVector::from_column_slice(mu),
            covariance: cov,
            risk_aversion: 2.5,
            bounds: DVector::from_element(n, 10.0),
            max_gross_leverage: 100.0,
            risk_groups: Vec::new(),
        }
    }

    #[test]
    fn test_projection_box_only() {
        let v = DVector::from_column_slice(&[0.5, -0.1, 0.05]);
        let b = DVector::from_element(3, 0.25);
        let p = project_box_l1(&v, &b, 3.0);
        assert_eq!(p, DVector::from_column_slice(&[0.25, -0.1, 0.05]));
    }

    #[test]
    fn test_projection_leverage_binds() {
        let v = DVector::from_column_slice(&[0.6, -0.6, 0.3]);
        let b = DVector::from_element(3, 1.0);
        let p = project_box_l1(&v, &b, 1.0);
        assert!((p.abs().sum() - 1.0).abs() < 1e-9);
        // Equal soft-threshold θ = 0.1 on every coordinate
        assert!((p[0] - 0.4).abs() < 1e-9);
        assert!((p[1] + 0.4).abs() < 1e-9);
        assert!((p[2] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_unconstrained_matches_closed_form() {
        let problem = diagonal_problem(&[1e-3, -5e-4], &[0.02, 0.01]);
        let outcome = AugmentedLagrangian::default().solve(&problem).unwrap();
        let w = &outcome.solution().unwrap().weights;
        // w* = μ / (λσ²)
        assert!((w[0] - 1e-3 / (2.5 * 4e-4)).abs() < 1e-4);
        assert!((w[1] + 5e-4 / (2.5 * 1e-4)).abs() < 1e-4);
    }

    #[test]
    fn test_box_binds() {
        let mut problem = diagonal_problem(&[1e-3, 1e-4], &[0.01, 0.01]);
        problem.bounds = DVector::from_element(2, 0.25);
        let outcome = AugmentedLagrangian::default().solve(&problem).unwrap();
        let w = &outcome.solution().unwrap().weights;
        assert!((w[0] - 0.25).abs() < 1e-9);
        assert!(w[1] > 0.0 && w[1] <= 0.25 + 1e-12);
    }

    #[test]
    fn test_risk_share_ceiling_respected() {
        let mut problem = diagonal_problem(&[2e-3, 2e-5, 2e-5, 2e-5], &[0.01, 0.01, 0.01, 0.01]);
        problem.bounds = DVector::from_element(4, 1.0);
        problem.risk_groups = (0..4)
            .map(|i| RiskGroup {
                name: format!("g{}", i),
                members: vec![i],
                ceiling: 0.5,
            })
            .collect();

        let unconstrained = AugmentedLagrangian::default()
            .solve(&MeanVarianceProblem {
                risk_groups: Vec::new(),
                ..problem.clone()
            })
            .unwrap();
        let free_share = problem.risk_shares(&unconstrained.solution().unwrap().weights)[0];
        assert!(free_share > 0.9);

        let outcome = AugmentedLagrangian::default().solve(&problem).unwrap();
        let w = &outcome.solution().expect("feasible").weights;
        let shares = problem.risk_shares(w);
        assert!(shares[0] <= 0.5 + 1e-3, "share {}", shares[0]);
        assert!(w[0] > 0.0);
    }

    #[test]
    fn test_unconverged_solve_reports_no_solution() {
        let mut problem = diagonal_problem(&[2e-3, 2e-5, 2e-5, 2e-5], &[0.01, 0.01, 0.01, 0.01]);
        problem.bounds = DVector::from_element(4, 1.0);
        problem.risk_groups = vec![RiskGroup {
            name: "first".to_string(),
            members: vec![0],
            ceiling: 0.5,
        }];
        // One outer pass with a negligible penalty cannot enforce the ceiling
        let solver = AugmentedLagrangian::new(SolverConfig {
            max_outer_iterations: 1,
            initial_penalty: 1e-12,
            ..Default::default()
        });
        let outcome = solver.solve(&problem).unwrap();
        match outcome {
            SolveOutcome::NoSolution { max_violation, .. } => assert!(max_violation > 0.1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut problem = diagonal_problem(&[1e-3, 1e-3], &[0.01, 0.01]);
        problem.bounds = DVector::from_element(3, 1.0);
        assert!(AugmentedLagrangian::default().solve(&problem).is_err());
    }
}
