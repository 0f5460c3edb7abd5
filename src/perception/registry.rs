//! 可导航物体注册表
//!
//! 每个 episode 一份：跨多轮观察累积显著性评分通过的物体，记录被看见与被选中的次数。
//! 存储顺序即首次出现顺序，执行层按该顺序做「首个匹配」解析。

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::env::{SimObject, Vec3};
use crate::perception::saliency::score_object;

/// 注册表中的一个候选物体
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigableObject {
    pub id: String,
    pub object_type: String,
    pub visible_count: u32,
    pub selected_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct NavigableRegistry {
    entries: Vec<NavigableObject>,
    index: HashMap<String, usize>,
    floor_type: String,
}

impl NavigableRegistry {
    pub fn new(floor_type: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            floor_type: floor_type.into(),
        }
    }

    /// 清空后以当前可见物体重新建表
    pub fn initialize(&mut self, objects: &[SimObject], agent: Vec3) {
        self.entries.clear();
        self.index.clear();
        self.update(objects, agent);
        tracing::debug!(count = self.entries.len(), "navigable registry initialized");
    }

    /// 再次评分：已存在的 id 累加 visible_count，新 id 追加
    pub fn update(&mut self, objects: &[SimObject], agent: Vec3) {
        for obj in objects {
            if obj.object_type == self.floor_type || !score_object(obj, agent).navigable {
                continue;
            }
            match self.index.get(&obj.object_id) {
                Some(&i) => self.entries[i].visible_count += 1,
                None => {
                    self.index.insert(obj.object_id.clone(), self.entries.len());
                    self.entries.push(NavigableObject {
                        id: obj.object_id.clone(),
                        object_type: obj.object_type.clone(),
                        visible_count: 1,
                        selected_count: 0,
                    });
                }
            }
        }
    }

    /// 当前已跟踪的类别集合（有序，便于拼 prompt）
    pub fn types_present(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.object_type.clone()).collect()
    }

    /// 按存储顺序返回第一个该类别的物体
    pub fn first_of_type(&self, object_type: &str) -> Option<&NavigableObject> {
        self.entries.iter().find(|e| e.object_type == object_type)
    }

    pub fn mark_selected(&mut self, id: &str) {
        if let Some(&i) = self.index.get(id) {
            self.entries[i].selected_count += 1;
        }
    }

    pub fn get(&self, id: &str) -> Option<&NavigableObject> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[NavigableObject] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::BoundingBox;

    fn obj(id: &str, ty: &str, visible: bool, size: f64, x: f64) -> SimObject {
        SimObject {
            object_id: id.to_string(),
            object_type: ty.to_string(),
            visible,
            axis_aligned_bounding_box: Some(BoundingBox {
                size: Vec3::new(size, size, size),
                center: Vec3::new(x, 0.0, 0.0),
            }),
            ..Default::default()
        }
    }

    fn agent() -> Vec3 {
        Vec3::default()
    }

    #[test]
    fn test_initialize_skips_floor_and_hidden() {
        let mut reg = NavigableRegistry::new("Floor");
        reg.initialize(
            &[
                obj("Floor|1", "Floor", true, 5.0, 0.5),
                obj("Fridge|1", "Fridge", true, 1.0, 2.0),
                obj("Cabinet|1", "Cabinet", false, 1.0, 2.0),
            ],
            agent(),
        );
        assert_eq!(reg.len(), 1);
        let fridge = reg.get("Fridge|1").unwrap();
        assert_eq!(fridge.visible_count, 1);
        assert_eq!(fridge.selected_count, 0);
    }

    #[test]
    fn test_update_same_id_counts_without_duplicates() {
        let mut reg = NavigableRegistry::new("Floor");
        let apple = obj("Apple|1", "Apple", true, 0.1, 0.5);
        reg.update(std::slice::from_ref(&apple), agent());
        reg.update(std::slice::from_ref(&apple), agent());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("Apple|1").unwrap().visible_count, 2);
    }

    #[test]
    fn test_first_of_type_follows_insertion_order() {
        let mut reg = NavigableRegistry::new("Floor");
        reg.initialize(
            &[
                obj("Cabinet|far", "Cabinet", true, 1.0, 8.0),
                obj("Cabinet|near", "Cabinet", true, 1.0, 1.0),
            ],
            agent(),
        );
        assert_eq!(reg.first_of_type("Cabinet").unwrap().id, "Cabinet|far");
        assert!(reg.first_of_type("Fridge").is_none());
    }

    #[test]
    fn test_types_present_and_selection() {
        let mut reg = NavigableRegistry::new("Floor");
        reg.initialize(
            &[
                obj("Cabinet|1", "Cabinet", true, 1.0, 1.0),
                obj("Cabinet|2", "Cabinet", true, 1.0, 2.0),
                obj("Fridge|1", "Fridge", true, 1.0, 3.0),
            ],
            agent(),
        );
        let types: Vec<String> = reg.types_present().into_iter().collect();
        assert_eq!(types, vec!["Cabinet".to_string(), "Fridge".to_string()]);

        reg.mark_selected("Fridge|1");
        reg.mark_selected("Fridge|1");
        reg.mark_selected("Ghost|1");
        assert_eq!(reg.get("Fridge|1").unwrap().selected_count, 2);
    }

    #[test]
    fn test_initialize_resets_previous_round() {
        let mut reg = NavigableRegistry::new("Floor");
        reg.initialize(&[obj("Fridge|1", "Fridge", true, 1.0, 2.0)], agent());
        reg.initialize(&[], agent());
        assert!(reg.is_empty());
    }
}
