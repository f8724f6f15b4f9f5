use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::{
    Budget, CandidatePoint, Objective, OptimizationBounds, OptimizationResult, Optimizer,
    SearchConfig, StopReason, conclude,
};
use crate::error::SizingError;

type Cell = (usize, usize);

/// Compass search on the bounds lattice.
///
/// Starts at the lattice centre and probes the four neighbours `stride`
/// cells away. It moves to the best neighbour that beats the current point,
/// or halves the stride when none does, and stops at stride 1 without an
/// improving move. Evaluations are cached, and the final pick applies the
/// shared selection rule to everything evaluated.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternSearchOptimizer {
    /// Starting stride in lattice cells; defaults to a quarter of the longer
    /// axis.
    pub initial_stride: Option<usize>,
}

impl Optimizer for PatternSearchOptimizer {
    fn name(&self) -> &'static str {
        "pattern_search"
    }

    fn optimize(
        &self,
        objective: &dyn Objective,
        bounds: &OptimizationBounds,
        config: &SearchConfig,
    ) -> Result<OptimizationResult, SizingError> {
        bounds.validate()?;
        config.validate()?;

        let mut walk = Walk {
            objective,
            pv_axis: bounds.pv_axis(),
            battery_axis: bounds.battery_axis(),
            budget: Budget::start(config),
            cache: HashMap::new(),
            trace: Vec::new(),
        };
        let (rows, cols) = (walk.pv_axis.len(), walk.battery_axis.len());
        let mut stride = self
            .initial_stride
            .unwrap_or(rows.max(cols) / 4)
            .max(1);
        let eps = config.tie_epsilon;

        let mut current: Cell = (rows / 2, cols / 2);
        let mut centres = HashSet::from([current]);
        let Some(mut best) = walk.visit(current)? else {
            return Err(SizingError::invalid("optimizer", "budget allows no evaluation"));
        };

        let stop_reason = 'search: loop {
            let origin = current;
            for (di, dj) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                let cell = (
                    step(origin.0, di * stride as isize, rows),
                    step(origin.1, dj * stride as isize, cols),
                );
                if cell == origin || centres.contains(&cell) {
                    continue;
                }
                match walk.visit(cell)? {
                    Some(point) if precedes(&point, &best, eps) => {
                        best = point;
                        current = cell;
                    }
                    Some(_) => {}
                    None => {
                        let reason = walk
                            .budget
                            .exhausted(walk.trace.len())
                            .unwrap_or(StopReason::TimeBudget);
                        break 'search reason;
                    }
                }
            }

            if current != origin {
                centres.insert(current);
            } else if stride == 1 {
                break StopReason::NoImprovement;
            } else {
                stride /= 2;
            }
        };

        debug!(
            evaluations = walk.trace.len(),
            lattice = rows * cols,
            ?stop_reason,
            "pattern search stopped"
        );

        conclude(self.name(), walk.trace, stop_reason, eps)
    }
}

/// Evaluation bookkeeping for one search.
struct Walk<'a> {
    objective: &'a dyn Objective,
    pv_axis: Vec<f64>,
    battery_axis: Vec<f64>,
    budget: Budget,
    cache: HashMap<Cell, CandidatePoint>,
    trace: Vec<CandidatePoint>,
}

impl Walk<'_> {
    /// Evaluates `cell` unless cached. `None` once the budget is spent.
    fn visit(&mut self, cell: Cell) -> Result<Option<CandidatePoint>, SizingError> {
        if let Some(point) = self.cache.get(&cell) {
            return Ok(Some(*point));
        }
        if self.budget.exhausted(self.trace.len()).is_some() {
            return Ok(None);
        }

        let (pv_kwp, battery_kwh) = (self.pv_axis[cell.0], self.battery_axis[cell.1]);
        let evaluation = self.objective.evaluate(pv_kwp, battery_kwh)?;
        let point = CandidatePoint::new(pv_kwp, battery_kwh, &evaluation);
        self.cache.insert(cell, point);
        self.trace.push(point);
        Ok(Some(point))
    }
}

/// Moves `offset` cells from `index`, clamped to `[0, len)`.
fn step(index: usize, offset: isize, len: usize) -> usize {
    index.saturating_add_signed(offset).min(len - 1)
}

/// Whether `a` should replace `b` as the incumbent.
fn precedes(a: &CandidatePoint, b: &CandidatePoint, eps: f64) -> bool {
    if a.feasible != b.feasible {
        return a.feasible;
    }
    if a.score < b.score - eps {
        return true;
    }
    if a.score > b.score + eps {
        return false;
    }
    a.battery_kwh
        .total_cmp(&b.battery_kwh)
        .then(a.pv_kwp.total_cmp(&b.pv_kwp))
        .is_lt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::objective::Evaluation;
    use crate::optimize::{GridSweepOptimizer, Resolution};

    /// Convex bowl with its minimum at (7 kWp, 3 kWh).
    struct Bowl;

    impl Objective for Bowl {
        fn name(&self) -> &'static str {
            "bowl"
        }

        fn evaluate(&self, pv_kwp: f64, battery_kwh: f64) -> Result<Evaluation, SizingError> {
            Ok(Evaluation {
                score: (pv_kwp - 7.0).powi(2) + 2.0 * (battery_kwh - 3.0).powi(2),
                feasible: true,
                violation: 0.0,
                self_sufficiency_pct: 0.0,
                lifecycle_cost: 0.0,
            })
        }
    }

    fn bounds() -> OptimizationBounds {
        OptimizationBounds {
            pv_kwp_min: 0.0,
            pv_kwp_max: 20.0,
            battery_kwh_min: 0.0,
            battery_kwh_max: 20.0,
            pv_resolution: Resolution::Step(1.0),
            battery_resolution: Resolution::Step(1.0),
        }
    }

    #[test]
    fn converges_to_grid_optimum_on_convex_objective() {
        let config = SearchConfig {
            workers: 1,
            ..Default::default()
        };
        let pattern = PatternSearchOptimizer::default()
            .optimize(&Bowl, &bounds(), &config)
            .unwrap();
        let grid = GridSweepOptimizer.optimize(&Bowl, &bounds(), &config).unwrap();

        assert_eq!(pattern.best, grid.best);
        assert_eq!(pattern.stop_reason, StopReason::NoImprovement);
        assert!(pattern.converged);
        assert!(pattern.evaluations < grid.evaluations / 2);
    }

    #[test]
    fn cache_prevents_duplicate_evaluations() {
        let result = PatternSearchOptimizer::default()
            .optimize(&Bowl, &bounds(), &SearchConfig::default())
            .unwrap();
        let unique: HashSet<(u64, u64)> = result
            .trace
            .iter()
            .map(|p| (p.pv_kwp.to_bits(), p.battery_kwh.to_bits()))
            .collect();
        assert_eq!(unique.len(), result.trace.len());
    }

    #[test]
    fn evaluation_cap_is_honoured() {
        let config = SearchConfig {
            max_evaluations: Some(5),
            ..Default::default()
        };
        let result = PatternSearchOptimizer::default()
            .optimize(&Bowl, &bounds(), &config)
            .unwrap();
        assert_eq!(result.evaluations, 5);
        assert_eq!(result.stop_reason, StopReason::EvaluationCap);
        assert!(!result.converged);
    }

    #[test]
    fn single_point_lattice_stops_immediately() {
        let point = OptimizationBounds {
            pv_kwp_max: 0.0,
            battery_kwh_max: 0.0,
            ..bounds()
        };
        let result = PatternSearchOptimizer::default()
            .optimize(&Bowl, &point, &SearchConfig::default())
            .unwrap();
        assert_eq!(result.evaluations, 1);
    }

    #[test]
    fn step_clamps_to_axis() {
        assert_eq!(step(0, -3, 5), 0);
        assert_eq!(step(3, 4, 5), 4);
        assert_eq!(step(2, 1, 5), 3);
    }

    #[test]
    fn incumbent_rule_matches_selection_rule() {
        let p = |pv, bat, score| CandidatePoint {
            pv_kwp: pv,
            battery_kwh: bat,
            score,
            feasible: true,
            violation: 0.0,
            self_sufficiency_pct: 0.0,
            lifecycle_cost: 0.0,
        };
        assert!(precedes(&p(5.0, 0.0, 1.0), &p(4.0, 2.0, 1.0), 1e-9));
        assert!(!precedes(&p(5.0, 2.0, 1.0), &p(4.0, 2.0, 1.0), 1e-9));
        assert!(precedes(&p(9.0, 9.0, 0.5), &p(1.0, 0.0, 1.0), 1e-9));
    }

    /// Feasible only in the low-PV corner, far from the starting centre.
    struct Corner;

    impl Objective for Corner {
        fn name(&self) -> &'static str {
            "corner"
        }

        fn evaluate(&self, pv_kwp: f64, battery_kwh: f64) -> Result<Evaluation, SizingError> {
            Ok(Evaluation {
                score: pv_kwp + battery_kwh,
                feasible: pv_kwp <= 2.0,
                violation: (pv_kwp - 2.0).max(0.0),
                self_sufficiency_pct: 0.0,
                lifecycle_cost: 0.0,
            })
        }
    }

    #[test]
    fn capped_walk_without_feasible_point_returns_partial_result() {
        let config = SearchConfig {
            max_evaluations: Some(2),
            ..Default::default()
        };
        let result = PatternSearchOptimizer::default()
            .optimize(&Corner, &bounds(), &config)
            .unwrap();
        assert_eq!(result.evaluations, 2);
        assert!(!result.best.feasible);
        assert!(!result.converged);
        assert_eq!(result.stop_reason, StopReason::EvaluationCap);
    }
}
