use crate::{database::db_structs::Story, model::structures::generation_type::GenerationType};
use tracing::info;

/// # How this works
/// - A promoted story carries the rating it ended the previous generation with
///     in `previous_period_rating`.
/// - After the new generation has been judged, each promoted story's drift is
///     `rating - previous_period_rating`.
/// - The mean of those drifts is the inflation (or deflation) the new generation
///     introduced into the scale.
///
/// Variants are ignored here: their baseline is inherited from a parent, so their
/// movement says nothing about the scale itself.
///
/// Returns `None` when no promoted story has a baseline to measure against.
pub fn mean_drift(stories: &[Story]) -> Option<f64> {
    let drifts: Vec<f64> = stories
        .iter()
        .filter(|s| s.generation_type == GenerationType::Promoted)
        .filter_map(|s| s.previous_period_rating.map(|previous| s.rating - previous))
        .collect();

    if drifts.is_empty() {
        return None;
    }

    Some(drifts.iter().sum::<f64>() / drifts.len() as f64)
}

/// Subtracts the mean drift of the promoted stories from every story of the
/// generation. RD and volatility are left alone. Returns the applied offset, or
/// `None` if there was nothing to measure (in which case nothing changes).
pub fn correct_drift(stories: &mut [Story]) -> Option<f64> {
    let drift = mean_drift(stories)?;

    for story in stories.iter_mut() {
        story.rating -= drift;
    }

    info!(drift, stories = stories.len(), "Applied drift correction");

    Some(drift)
}
