pub mod benchmarks;
pub mod bom;
pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod external;
pub mod ml;
pub mod recommend;

pub use bom::{category_policy, optimize_bom, CategoryPolicy};
pub use cache::DealCache;
pub use domain::bom::{BomAllocation, BomCategory, BomContext, BomLine};
pub use domain::deal::{
    CustomerId, DealContext, DealInput, DealOutcome, HistoricalDeal, OemProfile,
};
pub use domain::margin::{FractionMargin, PercentMargin};
pub use domain::model::{EvaluationMetrics, ModelPackage, NormStats};
pub use domain::recommendation::{Driver, RecommendationMethod, RecommendationResult};
pub use errors::{ApplicationError, DomainError};
pub use external::{ModelService, NarrativeGenerator};
pub use ml::training::{
    DataShortfall, DealSource, TrainingOutcome, TrainingPipeline, TrainingReport,
};
pub use recommend::sweep::{recommend_margin, InferenceResult};
pub use recommend::{compute_recommendation, RecommendOptions};
