//! 5 ステージの動画生成パイプライン。
//!
//! Script → Imagery → SubtitleStyle → Voice → Render → Done の順に進み、
//! 非同期ステージはバックエンドジョブの完了をポーリングで待つ。
pub mod orchestrator;
pub mod poller;
pub mod progress;
pub mod runner;
pub mod stage;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{AdvanceOutcome, JobSnapshot, JobStatus, StageEvent, StageOrchestrator};
pub use poller::{DEFAULT_POLL_INTERVAL, JobPoller, PollHandle, PollTerminal};
pub use progress::{JobOutput, NormalizedProgress, normalize};
pub use runner::{PipelinePlan, RunSummary, run_plan};
pub use stage::{Stage, StageInput};
pub use state::PipelineState;
