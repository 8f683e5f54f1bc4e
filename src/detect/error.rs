use thiserror::Error;

/// Fatal detection-pipeline errors.
///
/// None of these are retried; every one of them aborts the current
/// experiment run.
#[derive(Debug, Error)]
pub enum DetectError {
    /// `run()` was invoked before the detector reached the Ready state.
    #[error("detector not loaded: call init() before run()")]
    NotLoaded,

    /// The model declares a tensor element type the pipeline cannot
    /// quantize or de-quantize.
    #[error("unsupported tensor element type: {0}")]
    UnsupportedType(String),

    /// The model path resolves to no architecture family, or to more
    /// than one.
    #[error("unrecognized model: {0}")]
    UnrecognizedModel(String),
}
