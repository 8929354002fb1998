use std::collections::HashMap;

use crate::domain::entities::job_point::ScoredJob;

/// Damping constant of the Reciprocal Rank Fusion
pub const RRF_K: f32 = 2.0;

/// Merges independent rankings with Reciprocal Rank Fusion.
///
/// A job scores `sum(1 / (RRF_K + rank))` over the rankings it appears in, ranks starting at 1.
/// The original scores are discarded. Ties keep the order in which jobs were first seen.
/// Returns at most `limit` jobs, best first.
pub fn fuse_rankings(rankings: &[Vec<ScoredJob>], limit: usize) -> Vec<ScoredJob> {
    let mut fused: Vec<ScoredJob> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for ranking in rankings {
        for (index, job) in ranking.iter().enumerate() {
            let contribution = 1.0 / (RRF_K + (index + 1) as f32);

            match positions.get(&job.id) {
                Some(&position) => fused[position].score += contribution,
                None => {
                    positions.insert(job.id.clone(), fused.len());
                    fused.push(ScoredJob {
                        score: contribution,
                        ..job.clone()
                    });
                }
            }
        }
    }

    // Stable sort: first seen wins a tie
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused.truncate(limit);
    fused
}
