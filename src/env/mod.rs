//! 仿真环境边界
//!
//! 与仿真器的唯一接触点：step(动作) -> {成功标志, 错误信息, 更新后的元数据}。
//! 元数据字段沿用 AI2-THOR 的 camelCase 形状（objectId / objectType / axisAlignedBoundingBox …）。

pub mod replay;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use replay::{load_scene_metadata, ReplayEnvironment, ReplayInitializer};

/// 环境错误
#[derive(Error, Debug)]
pub enum EnvError {
    #[error("Scene initialization failed: {0}")]
    Init(String),

    #[error("Step failed: {0}")]
    Step(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// 轴对齐包围盒
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub size: Vec3,
    pub center: Vec3,
}

/// 场景中的单个物体（只保留规划与执行关心的字段，其余字段忽略）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimObject {
    pub object_id: String,
    pub object_type: String,
    pub visible: bool,
    pub axis_aligned_bounding_box: Option<BoundingBox>,
    pub openable: bool,
    pub is_open: bool,
    pub pickupable: bool,
    pub is_picked_up: bool,
    pub receptacle: bool,
    pub toggleable: bool,
    pub is_toggled: bool,
    pub dirtyable: bool,
    pub is_dirty: bool,
    pub can_fill_with_liquid: bool,
    pub is_filled_with_liquid: bool,
    pub sliceable: bool,
    pub is_sliced: bool,
    pub cookable: bool,
    pub is_cooked: bool,
    pub breakable: bool,
    pub is_broken: bool,
    pub can_be_used_up: bool,
    pub is_used_up: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMeta {
    #[serde(default)]
    pub position: Vec3,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneBounds {
    #[serde(default)]
    pub size: Vec3,
}

/// 一帧场景元数据
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneMetadata {
    pub objects: Vec<SimObject>,
    pub agent: AgentMeta,
    pub scene_bounds: Option<SceneBounds>,
}

impl SceneMetadata {
    /// 场景对角线长度（x-z 平面），用作可见距离
    pub fn scene_diagonal(&self) -> f64 {
        self.scene_bounds
            .as_ref()
            .map(|b| (b.size.x.powi(2) + b.size.z.powi(2)).sqrt())
            .unwrap_or(0.0)
    }

    pub fn object(&self, id: &str) -> Option<&SimObject> {
        self.objects.iter().find(|o| o.object_id == id)
    }

    /// 第一个可见的指定类别物体（按元数据顺序）
    pub fn first_visible_of_type(&self, object_type: &str) -> Option<&SimObject> {
        self.objects
            .iter()
            .find(|o| o.visible && o.object_type == object_type)
    }
}

/// 发往环境的一个动作：名称 + 参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvAction {
    pub name: String,
    pub params: serde_json::Value,
}

impl EnvAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_object(mut self, object_id: &str) -> Self {
        self.params["objectId"] = serde_json::Value::String(object_id.to_string());
        self
    }

    pub fn object_id(&self) -> Option<&str> {
        self.params.get("objectId").and_then(|v| v.as_str())
    }
}

/// step 的返回
#[derive(Debug, Clone)]
pub struct StepResult {
    pub success: bool,
    pub error_message: String,
    pub metadata: SceneMetadata,
}

/// 仿真环境 trait：执行控制器与场景初始化的所有操作最终都归结为 step 调用
#[async_trait]
pub trait Environment: Send + Sync {
    /// 最近一次的元数据
    fn metadata(&self) -> &SceneMetadata;

    async fn step(&mut self, action: EnvAction) -> Result<StepResult, EnvError>;

    /// 保存当前渲染帧；无渲染能力时返回 Ok(false)
    async fn save_frame(&self, _path: &Path) -> Result<bool, EnvError> {
        Ok(false)
    }

    /// 环境显式给出的任务完成标志（无则 None）
    fn task_success(&self) -> Option<bool> {
        None
    }

    async fn stop(&mut self) {}
}

/// 场景规格：场景名与可见距离
#[derive(Debug, Clone)]
pub struct SceneSpec {
    pub scene: String,
    pub visibility_distance: f64,
}

/// 场景初始化器（外部协作者）：启动仿真器并完成标定，返回可 step 的环境
#[async_trait]
pub trait SceneInitializer: Send + Sync {
    async fn initialize(&self, spec: &SceneSpec) -> Result<Box<dyn Environment>, EnvError>;
}
