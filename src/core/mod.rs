//! 核心编排层：错误类型、限时场景初始化、episode 流水线与重试包络

pub mod error;
pub mod pipeline;
pub mod runner;
pub mod scene;
pub mod state;

pub use error::EpisodeError;
pub use pipeline::{EpisodePipeline, TrajectoryPipeline, INIT_FRAME};
pub use runner::{EpisodeOutcome, EpisodeRunner};
pub use scene::SceneSupervisor;
pub use state::{EpisodeAttempt, EpisodeContext, EpisodePhase, TrajectoryRecord};
