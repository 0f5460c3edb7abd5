//! 感知层：显著性评分、可导航注册表、场景观察描述

pub mod observation;
pub mod registry;
pub mod saliency;

pub use observation::ObservationService;
pub use registry::{NavigableObject, NavigableRegistry};
pub use saliency::{score, score_object, SaliencyScore};
