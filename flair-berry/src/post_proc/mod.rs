//! 后处理流程集合.

mod refine;
mod validate;

pub use refine::{refine_mask, refine_mask_with_stats, MaskRefiner, RefineStats, Refined};

pub use validate::{validate_mask, ClassScores, ConfusionMatrix, Metrics, MetricsSummary};
