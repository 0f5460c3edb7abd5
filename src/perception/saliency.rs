//! 物体显著性评分
//!
//! 只根据几何与距离判断一个可见物体是否值得作为导航/交互候选暴露给规划器：
//! 大而近、或小但足够醒目的物体为可导航。纯函数，无副作用。

use crate::env::{SimObject, Vec3};

/// 大小物体的体积分界（立方米）
pub const SMALL_VOLUME: f64 = 0.01;
/// 大物体的体积/距离比下限；不超过该值（含等于）时退回小物体规则
pub const LARGE_RATE_FLOOR: f64 = 0.02;

/// 评分结果：可导航标志 + 中间量（供诊断与测试）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaliencyScore {
    pub navigable: bool,
    pub volume: f64,
    pub surface: f64,
    pub distance: f64,
    pub rate: f64,
}

/// 对一个物体评分。visible=false 时中间量照常计算，但 navigable 恒为 false
pub fn score(visible: bool, size: Vec3, center: Vec3, agent: Vec3) -> SaliencyScore {
    let volume = size.x * size.y * size.z;
    let distance = ((center.x - agent.x).powi(2) + (center.z - agent.z).powi(2)).sqrt();
    let surface = (size.x * size.z).max(size.x * size.y).max(size.y * size.z);
    let rate = if distance != 0.0 { volume / distance } else { 0.0 };

    let navigable = visible
        && if volume < SMALL_VOLUME {
            threshold_chain(volume, surface, distance)
        } else {
            // 大物体侧视时投影很小，同样按小物体规则复核
            rate > LARGE_RATE_FLOOR || threshold_chain(volume, surface, distance)
        };

    SaliencyScore {
        navigable,
        volume,
        surface,
        distance,
        rate,
    }
}

/// 对场景元数据中的物体评分；缺少包围盒时按零尺寸处理
pub fn score_object(obj: &SimObject, agent: Vec3) -> SaliencyScore {
    let bb = obj.axis_aligned_bounding_box.unwrap_or_default();
    score(obj.visible, bb.size, bb.center, agent)
}

fn threshold_chain(v: f64, s: f64, d: f64) -> bool {
    (s > 0.5 && d < 10.0)
        || (s > 0.15 && d < 4.0)
        || (s > 0.08 && d < 2.5)
        || (v > 0.005 && d < 2.0)
        || (v > 0.001 && d < 1.5)
        || d < 1.0
}
