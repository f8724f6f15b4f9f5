use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use tracing::debug;

use super::{
    Budget, CandidatePoint, Objective, OptimizationBounds, OptimizationResult, Optimizer,
    SearchConfig, StopReason, conclude,
};
use crate::error::SizingError;

/// Exhaustive sweep of the bounds lattice.
///
/// Points are handed out in PV-major order to `SearchConfig::workers`
/// scoped threads. The trace is reassembled in lattice order, so under an
/// evaluation cap the same prefix is evaluated whatever the worker count.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridSweepOptimizer;

impl Optimizer for GridSweepOptimizer {
    fn name(&self) -> &'static str {
        "grid_sweep"
    }

    fn optimize(
        &self,
        objective: &dyn Objective,
        bounds: &OptimizationBounds,
        config: &SearchConfig,
    ) -> Result<OptimizationResult, SizingError> {
        bounds.validate()?;
        config.validate()?;

        let points = bounds.lattice();
        let budget = Budget::start(config);
        let next = AtomicUsize::new(0);
        let stopped = AtomicBool::new(false);
        let workers = config.workers.clamp(1, points.len().max(1));

        debug!(
            points = points.len(),
            workers,
            objective = objective.name(),
            "starting grid sweep"
        );

        let (points_ref, budget_ref, next, stopped) = (&points, &budget, &next, &stopped);
        let outcomes: Vec<Result<Vec<(usize, CandidatePoint)>, SizingError>> =
            thread::scope(|scope| {
                let handles: Vec<_> = (0..workers)
                    .map(|_| {
                        scope.spawn(move || {
                            let mut local = Vec::new();
                            while !stopped.load(Ordering::Relaxed) {
                                let index = next.fetch_add(1, Ordering::Relaxed);
                                if index >= points_ref.len() {
                                    break;
                                }
                                if budget_ref.exhausted(index).is_some() {
                                    stopped.store(true, Ordering::Relaxed);
                                    break;
                                }
                                let (pv_kwp, battery_kwh) = points_ref[index];
                                let evaluation = match objective.evaluate(pv_kwp, battery_kwh) {
                                    Ok(evaluation) => evaluation,
                                    Err(err) => {
                                        stopped.store(true, Ordering::Relaxed);
                                        return Err(err);
                                    }
                                };
                                local.push((
                                    index,
                                    CandidatePoint::new(pv_kwp, battery_kwh, &evaluation),
                                ));
                            }
                            Ok(local)
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| {
                        handle
                            .join()
                            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                    })
                    .collect()
            });

        let mut indexed = Vec::with_capacity(points.len());
        for outcome in outcomes {
            indexed.extend(outcome?);
        }
        indexed.sort_by_key(|(index, _)| *index);

        // Workers may claim indices past the first gap before noticing the
        // stop flag; keep only the contiguous prefix.
        let evaluated = indexed
            .iter()
            .enumerate()
            .take_while(|(position, (index, _))| position == index)
            .count();
        let trace: Vec<CandidatePoint> = indexed
            .into_iter()
            .take(evaluated)
            .map(|(_, point)| point)
            .collect();

        let stop_reason = if trace.len() == points.len() {
            StopReason::Exhausted
        } else {
            budget.exhausted(trace.len()).unwrap_or(StopReason::TimeBudget)
        };

        conclude(self.name(), trace, stop_reason, config.tie_epsilon)
    }
}
