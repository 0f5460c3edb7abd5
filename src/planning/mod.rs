//! 规划与执行：分层规划器、澄清管理、执行控制器

pub mod clarification;
pub mod events;
pub mod executor;
pub mod planner;
pub mod tags;
pub mod types;

pub use clarification::{
    parse_replan_decision, AskContext, AskReason, Clarification, ClarificationManager, Operator,
    ReplanDecision, ScriptedOperator, SilentOperator, StdinOperator,
};
pub use events::TrajectoryEvent;
pub use executor::{ExecutionController, ExecutionReport, StepRecord};
pub use planner::{HierarchicalPlanner, PlanDiagnostics};
pub use tags::{extract_single, extract_tagged};
pub use types::{
    load_tasks, Action, Subgoal, Subtask, SubtaskParseError, Task, UnsupportedAction,
};
