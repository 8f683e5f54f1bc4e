//! Detection pipeline: pre-processing, backend forward pass, NMS
//! post-processing and the detector state machine driving them.

mod backend;
mod backends;
mod classes;
mod detector;
mod error;
mod postprocess;
mod preprocess;

pub use backend::{CoreBudget, ElementType, InferenceBackend, TensorData, TensorDescriptor};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use classes::{class_name, COCO_CLASSES};
pub use detector::{ArchFamily, Detector, ModelFormat, ModelSpec, StageTimings};
pub use error::DetectError;
pub use postprocess::{
    decode_predictions, iou, non_max_suppression, postprocess, rescale_detections, BoundingBox,
    Detection, PostprocessParams, RawCandidate,
};
pub use preprocess::{format_image, prepare_input, quantize_input, PreprocessSpec, TensorLayout};
