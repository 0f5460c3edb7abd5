//! 离线回放环境
//!
//! 从导出的场景元数据 JSON 构建一个无渲染的环境：按物体属性（openable / pickupable …）判定动作成败并更新状态，
//! 使批处理在没有仿真器的机器上也能跑通完整流水线。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::env::{
    EnvAction, EnvError, Environment, SceneInitializer, SceneMetadata, SceneSpec, SimObject,
    StepResult,
};

/// 元数据文件可能是单个对象，也可能是以首元素为准的数组
#[derive(Deserialize)]
#[serde(untagged)]
enum MetadataFile {
    Many(Vec<SceneMetadata>),
    One(Box<SceneMetadata>),
}

/// 读取场景元数据（数组时取第一帧）
pub fn load_scene_metadata(path: &Path) -> Result<SceneMetadata, EnvError> {
    let data = std::fs::read_to_string(path)?;
    match serde_json::from_str::<MetadataFile>(&data)? {
        MetadataFile::One(meta) => Ok(*meta),
        MetadataFile::Many(frames) => frames
            .into_iter()
            .next()
            .ok_or_else(|| EnvError::Init(format!("{} contains no frames", path.display()))),
    }
}

/// 回放环境：持有当前元数据与手中物体
#[derive(Debug, Clone)]
pub struct ReplayEnvironment {
    metadata: SceneMetadata,
    held: Option<String>,
    visibility_distance: Option<f64>,
}

impl ReplayEnvironment {
    pub fn new(metadata: SceneMetadata) -> Self {
        Self {
            metadata,
            held: None,
            visibility_distance: None,
        }
    }

    /// 设定可见距离：与 agent 水平距离超过该值的物体视为不可见，agent 每次移动后重新判定
    pub fn with_visibility_distance(mut self, distance: f64) -> Self {
        if distance > 0.0 {
            self.visibility_distance = Some(distance);
            self.refresh_visibility();
        }
        self
    }

    fn refresh_visibility(&mut self) {
        let Some(limit) = self.visibility_distance else {
            return;
        };
        let agent = self.metadata.agent.position;
        for obj in &mut self.metadata.objects {
            if let Some(bb) = obj.axis_aligned_bounding_box {
                let distance = ((bb.center.x - agent.x).powi(2) + (bb.center.z - agent.z).powi(2)).sqrt();
                obj.visible = distance <= limit;
            }
        }
    }

    pub fn held(&self) -> Option<&str> {
        self.held.as_deref()
    }

    fn object_mut(&mut self, id: &str) -> Result<&mut SimObject, String> {
        self.metadata
            .objects
            .iter_mut()
            .find(|o| o.object_id == id)
            .ok_or_else(|| format!("Object {} not found", id))
    }

    fn apply(&mut self, action: &EnvAction) -> Result<(), String> {
        let id = action
            .object_id()
            .ok_or_else(|| format!("{} requires objectId", action.name))?
            .to_string();

        match action.name.as_str() {
            "NavigateTo" => {
                let obj = self.object_mut(&id)?;
                obj.visible = true;
                let center = obj.axis_aligned_bounding_box.map(|b| b.center);
                if let Some(c) = center {
                    self.metadata.agent.position.x = c.x;
                    self.metadata.agent.position.z = c.z;
                }
                self.refresh_visibility();
                Ok(())
            }
            "PickupObject" => {
                if let Some(held) = &self.held {
                    return Err(format!("Hand already holds {}", held));
                }
                let obj = self.object_mut(&id)?;
                require(obj.pickupable, &id, "pickupable")?;
                obj.is_picked_up = true;
                self.held = Some(id);
                Ok(())
            }
            "PutObject" => {
                let held = self.held.clone().ok_or("Nothing in hand to put")?;
                let target = self.object_mut(&id)?;
                require(target.receptacle, &id, "a receptacle")?;
                let dest = target.axis_aligned_bounding_box.map(|b| b.center);
                let obj = self.object_mut(&held)?;
                obj.is_picked_up = false;
                if let (Some(bb), Some(c)) = (obj.axis_aligned_bounding_box.as_mut(), dest) {
                    bb.center = c;
                }
                self.held = None;
                Ok(())
            }
            name => {
                let obj = self.object_mut(&id)?;
                let (capable, what, state, value) = match name {
                    "OpenObject" => (obj.openable, "openable", &mut obj.is_open, true),
                    "CloseObject" => (obj.openable, "openable", &mut obj.is_open, false),
                    "ToggleObjectOn" => (obj.toggleable, "toggleable", &mut obj.is_toggled, true),
                    "ToggleObjectOff" => (obj.toggleable, "toggleable", &mut obj.is_toggled, false),
                    "CleanObject" => (obj.dirtyable, "dirtyable", &mut obj.is_dirty, false),
                    "DirtyObject" => (obj.dirtyable, "dirtyable", &mut obj.is_dirty, true),
                    "FillObjectWithLiquid" => (
                        obj.can_fill_with_liquid,
                        "fillable",
                        &mut obj.is_filled_with_liquid,
                        true,
                    ),
                    "EmptyLiquidFromObject" => (
                        obj.can_fill_with_liquid,
                        "fillable",
                        &mut obj.is_filled_with_liquid,
                        false,
                    ),
                    "SliceObject" => (obj.sliceable, "sliceable", &mut obj.is_sliced, true),
                    "CookObject" => (obj.cookable, "cookable", &mut obj.is_cooked, true),
                    "BreakObject" => (obj.breakable, "breakable", &mut obj.is_broken, true),
                    "UseUpObject" => (obj.can_be_used_up, "usable", &mut obj.is_used_up, true),
                    other => return Err(format!("Unsupported action {}", other)),
                };
                require(capable, &id, what)?;
                *state = value;
                Ok(())
            }
        }
    }
}

fn require(capable: bool, id: &str, what: &str) -> Result<(), String> {
    if capable {
        Ok(())
    } else {
        Err(format!("{} is not {}", id, what))
    }
}

#[async_trait]
impl Environment for ReplayEnvironment {
    fn metadata(&self) -> &SceneMetadata {
        &self.metadata
    }

    async fn step(&mut self, action: EnvAction) -> Result<StepResult, EnvError> {
        let (success, error_message) = match self.apply(&action) {
            Ok(()) => (true, String::new()),
            Err(msg) => (false, msg),
        };
        tracing::debug!(action = %action.name, success, error = %error_message, "replay step");
        Ok(StepResult {
            success,
            error_message,
            metadata: self.metadata.clone(),
        })
    }
}

/// 回放初始化器：每次 initialize 重新读取元数据文件，保证重试从干净状态开始
#[derive(Debug, Clone)]
pub struct ReplayInitializer {
    metadata_path: PathBuf,
}

impl ReplayInitializer {
    pub fn new(metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            metadata_path: metadata_path.into(),
        }
    }
}

#[async_trait]
impl SceneInitializer for ReplayInitializer {
    async fn initialize(&self, spec: &SceneSpec) -> Result<Box<dyn Environment>, EnvError> {
        let metadata = load_scene_metadata(&self.metadata_path)?;
        tracing::info!(
            scene = %spec.scene,
            objects = metadata.objects.len(),
            visibility_distance = spec.visibility_distance,
            "Replay scene loaded"
        );
        Ok(Box::new(
            ReplayEnvironment::new(metadata).with_visibility_distance(spec.visibility_distance),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{BoundingBox, Vec3};

    fn object(id: &str, ty: &str) -> SimObject {
        SimObject {
            object_id: id.to_string(),
            object_type: ty.to_string(),
            visible: true,
            axis_aligned_bounding_box: Some(BoundingBox {
                size: Vec3::new(0.5, 0.5, 0.5),
                center: Vec3::new(1.0, 0.5, 2.0),
            }),
            ..Default::default()
        }
    }

    fn kitchen() -> ReplayEnvironment {
        let mut fridge = object("Fridge|1", "Fridge");
        fridge.openable = true;
        fridge.receptacle = true;
        let mut apple = object("Apple|1", "Apple");
        apple.pickupable = true;
        ReplayEnvironment::new(SceneMetadata {
            objects: vec![fridge, apple],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_open_pickup_put_sequence() {
        let mut env = kitchen();
        let r = env.step(EnvAction::new("OpenObject").with_object("Fridge|1")).await.unwrap();
        assert!(r.success);
        assert!(r.metadata.object("Fridge|1").unwrap().is_open);

        let r = env.step(EnvAction::new("PickupObject").with_object("Apple|1")).await.unwrap();
        assert!(r.success);
        assert_eq!(env.held(), Some("Apple|1"));

        let r = env.step(EnvAction::new("PutObject").with_object("Fridge|1")).await.unwrap();
        assert!(r.success);
        assert_eq!(env.held(), None);
        assert!(!env.metadata().object("Apple|1").unwrap().is_picked_up);
    }

    #[tokio::test]
    async fn test_failures_report_error_message() {
        let mut env = kitchen();
        let r = env.step(EnvAction::new("OpenObject").with_object("Apple|1")).await.unwrap();
        assert!(!r.success);
        assert!(r.error_message.contains("not openable"));

        let r = env.step(EnvAction::new("PutObject").with_object("Fridge|1")).await.unwrap();
        assert!(!r.success);

        let r = env.step(EnvAction::new("OpenObject").with_object("Ghost|9")).await.unwrap();
        assert!(r.error_message.contains("not found"));
    }

    #[tokio::test]
    async fn test_navigate_moves_agent() {
        let mut env = kitchen();
        let r = env.step(EnvAction::new("NavigateTo").with_object("Apple|1")).await.unwrap();
        assert!(r.success);
        assert_eq!(r.metadata.agent.position.x, 1.0);
        assert_eq!(r.metadata.agent.position.z, 2.0);
    }

    #[tokio::test]
    async fn test_visibility_distance_hides_far_objects_until_agent_moves() {
        let mut fridge = object("Fridge|1", "Fridge");
        fridge.axis_aligned_bounding_box = Some(BoundingBox {
            size: Vec3::new(0.8, 1.8, 0.7),
            center: Vec3::new(6.0, 0.9, 0.0),
        });
        let apple = object("Apple|1", "Apple");
        let mut env = ReplayEnvironment::new(SceneMetadata {
            objects: vec![fridge, apple],
            ..Default::default()
        })
        .with_visibility_distance(3.0);

        assert!(!env.metadata().object("Fridge|1").unwrap().visible);
        assert!(env.metadata().object("Apple|1").unwrap().visible);

        let r = env.step(EnvAction::new("NavigateTo").with_object("Fridge|1")).await.unwrap();
        assert!(r.success);
        assert!(r.metadata.object("Fridge|1").unwrap().visible);
        // 苹果在 (1, 2)，离冰箱超过 3
        assert!(!r.metadata.object("Apple|1").unwrap().visible);
    }

    #[tokio::test]
    async fn test_initializer_applies_scene_visibility_distance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(
            &path,
            r#"{"objects": [
                {"objectId": "Near|1", "objectType": "Apple", "visible": true,
                 "axisAlignedBoundingBox": {"size": {"x": 0.1, "y": 0.1, "z": 0.1}, "center": {"x": 1, "y": 1, "z": 0}}},
                {"objectId": "Far|1", "objectType": "Fridge", "visible": true,
                 "axisAlignedBoundingBox": {"size": {"x": 1, "y": 2, "z": 1}, "center": {"x": 9, "y": 1, "z": 0}}}
            ]}"#,
        )
        .unwrap();
        let spec = SceneSpec {
            scene: "FloorPlan1".into(),
            visibility_distance: 5.0,
        };

        let env = ReplayInitializer::new(path.clone()).initialize(&spec).await.unwrap();

        assert!(env.metadata().object("Near|1").unwrap().visible);
        assert!(!env.metadata().object("Far|1").unwrap().visible);
    }

    #[test]
    fn test_load_metadata_array_takes_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(
            &path,
            r#"[{"objects": [{"objectId": "A|1", "objectType": "Apple"}]}, {"objects": []}]"#,
        )
        .unwrap();
        let meta = load_scene_metadata(&path).unwrap();
        assert_eq!(meta.objects.len(), 1);

        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(load_scene_metadata(&path), Err(EnvError::Init(_))));
    }
}
