pub mod delete;
pub mod grouping;
pub mod worker;

pub use delete::{DeleteError, DeleteReport, delete_assets};
pub use grouping::{
    GroupingError, GroupingOrchestrator, GroupingStatus, MediaPassReport, PassOutcome,
    PassProgress, PassStage, PassSummary,
};
pub use worker::{GroupingWorker, TriggerOutcome};
