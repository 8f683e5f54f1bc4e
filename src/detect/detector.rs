use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};
use image::RgbImage;

use super::backend::{CoreBudget, InferenceBackend, TensorDescriptor};
use super::backends::StubBackend;
#[cfg(feature = "backend-tract")]
use super::backends::TractBackend;
use super::error::DetectError;
use super::postprocess::{postprocess, Detection, PostprocessParams};
use super::preprocess::{prepare_input, PreprocessSpec};

/// Runtime family executing the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFormat {
    /// ONNX graph session (tract).
    GraphSession,
    /// Quantized flatbuffer interpreter (no runtime linked in this build).
    QuantizedInterpreter,
    /// In-crate stub interpreter for harness self-benchmarks.
    Stub,
}

impl ModelFormat {
    pub fn tag(self) -> &'static str {
        match self {
            ModelFormat::GraphSession => "onnx",
            ModelFormat::QuantizedInterpreter => "tflite",
            ModelFormat::Stub => "stub",
        }
    }
}

/// Single-stage anchor-free architecture family of the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchFamily {
    YoloV5,
    YoloV8,
    Yolo11,
}

impl ArchFamily {
    pub const ALL: [ArchFamily; 3] = [ArchFamily::YoloV5, ArchFamily::YoloV8, ArchFamily::Yolo11];

    pub fn token(self) -> &'static str {
        match self {
            ArchFamily::YoloV5 => "yolov5",
            ArchFamily::YoloV8 => "yolov8",
            ArchFamily::Yolo11 => "yolo11",
        }
    }

    pub fn parse(tag: &str) -> Result<Self, DetectError> {
        Self::ALL
            .into_iter()
            .find(|arch| arch.token() == tag.to_ascii_lowercase())
            .ok_or_else(|| DetectError::UnrecognizedModel(format!("unknown architecture '{}'", tag)))
    }
}

/// Backend kind and architecture family, resolved exactly once at init.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub format: ModelFormat,
    pub arch: ArchFamily,
}

impl ModelSpec {
    /// Resolve the format from the file extension and the architecture
    /// from an explicit override or, failing that, from file-stem tokens.
    ///
    /// A stem matching more than one architecture token is rejected rather
    /// than silently picking one.
    pub fn resolve(model_path: &Path, arch_override: Option<ArchFamily>) -> Result<Self, DetectError> {
        let extension = model_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let format = match extension.as_str() {
            "onnx" => ModelFormat::GraphSession,
            "tflite" => ModelFormat::QuantizedInterpreter,
            "stub" => ModelFormat::Stub,
            _ => {
                return Err(DetectError::UnrecognizedModel(format!(
                    "no known format for '{}'",
                    model_path.display()
                )))
            }
        };

        let arch = match arch_override {
            Some(arch) => arch,
            None => {
                let stem = model_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_ascii_lowercase())
                    .unwrap_or_default();
                let matches: Vec<ArchFamily> = ArchFamily::ALL
                    .into_iter()
                    .filter(|arch| stem.contains(arch.token()))
                    .collect();
                match matches.as_slice() {
                    [single] => *single,
                    [] => {
                        return Err(DetectError::UnrecognizedModel(format!(
                            "no architecture token in '{}'",
                            model_path.display()
                        )))
                    }
                    several => {
                        return Err(DetectError::UnrecognizedModel(format!(
                            "'{}' matches {} architecture tokens; pass the family explicitly",
                            model_path.display(),
                            several.len()
                        )))
                    }
                }
            }
        };

        Ok(Self { format, arch })
    }
}

/// Elapsed wall time of each pipeline stage, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub pre_ms: u64,
    pub inf_ms: u64,
    pub post_ms: u64,
}

impl StageTimings {
    pub fn total_ms(&self) -> u64 {
        self.pre_ms + self.inf_ms + self.post_ms
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DetectorState {
    Uninitialized,
    Loaded,
    Ready,
}

/// Detection pipeline front end.
///
/// Lifecycle: `Uninitialized` → (`init` resolves the model spec) `Loaded`
/// → (backend bound, descriptors known) `Ready`. `run` is only valid in
/// `Ready` and fails with the not-loaded kind otherwise.
pub struct Detector {
    state: DetectorState,
    params: PostprocessParams,
    spec: Option<ModelSpec>,
    backend: Option<Box<dyn InferenceBackend>>,
    pre: Option<PreprocessSpec>,
}

impl Detector {
    pub fn new(params: PostprocessParams) -> Self {
        Self {
            state: DetectorState::Uninitialized,
            params,
            spec: None,
            backend: None,
            pre: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == DetectorState::Ready
    }

    pub fn spec(&self) -> Option<ModelSpec> {
        self.spec
    }

    pub fn input_descriptor(&self) -> Option<&TensorDescriptor> {
        self.backend.as_ref().map(|b| b.input())
    }

    /// Resolve the model spec, load the matching backend and bind the
    /// pre-processing parameters. Fatal on any failure.
    pub fn init(
        &mut self,
        model_path: &Path,
        arch_override: Option<ArchFamily>,
        input_size: (u32, u32),
        budget: CoreBudget,
    ) -> Result<()> {
        let spec = ModelSpec::resolve(model_path, arch_override)?;
        self.spec = Some(spec);
        self.state = DetectorState::Loaded;

        let backend: Box<dyn InferenceBackend> = match spec.format {
            ModelFormat::GraphSession => {
                #[cfg(feature = "backend-tract")]
                {
                    Box::new(TractBackend::load(model_path, input_size, budget)?)
                }
                #[cfg(not(feature = "backend-tract"))]
                {
                    return Err(anyhow!(
                        "graph-session models need the backend-tract feature"
                    ));
                }
            }
            ModelFormat::QuantizedInterpreter => {
                return Err(anyhow!(
                    "no quantized interpreter runtime is linked into this build"
                ));
            }
            ModelFormat::Stub => Box::new(StubBackend::synthetic(
                input_size,
                super::classes::COCO_CLASSES.len(),
            )),
        };
        self.bind_backend(spec, backend)
    }

    /// Bind an already-constructed backend (tests, stub runs).
    pub fn bind_backend(&mut self, spec: ModelSpec, backend: Box<dyn InferenceBackend>) -> Result<()> {
        let pre = PreprocessSpec::from_descriptor(backend.input())?;
        self.spec = Some(spec);
        self.pre = Some(pre);
        self.backend = Some(backend);
        self.state = DetectorState::Ready;
        Ok(())
    }

    /// Run the full pipeline on one image, timing each stage.
    pub fn run(&mut self, image: &RgbImage) -> Result<(Vec<Detection>, StageTimings)> {
        if self.state != DetectorState::Ready {
            return Err(DetectError::NotLoaded.into());
        }
        let backend = self.backend.as_mut().ok_or(DetectError::NotLoaded)?;
        let pre = self.pre.as_ref().ok_or(DetectError::NotLoaded)?;

        let started = Instant::now();
        let input = prepare_input(image, pre, backend.input());
        let pre_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let output = backend.forward(&input)?;
        let inf_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let out_shape = &backend.output().shape;
        if out_shape.len() != 3 || out_shape[1] < 5 {
            return Err(anyhow!(
                "expected a [1, 4+C, N] prediction tensor, got {:?}",
                out_shape
            ));
        }
        let classes = out_shape[1] - 4;
        let candidates = out_shape[2];
        let detections = postprocess(
            &output,
            candidates,
            classes,
            &self.params,
            (pre.width, pre.height),
            image.dimensions(),
        );
        let post_ms = started.elapsed().as_millis() as u64;

        Ok((
            detections,
            StageTimings {
                pre_ms,
                inf_ms,
                post_ms,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn params() -> PostprocessParams {
        PostprocessParams {
            score_thresh: 0.25,
            confidence_thresh: 0.5,
            iou_thresh: 0.5,
        }
    }

    #[test]
    fn run_before_init_is_not_loaded() {
        let mut detector = Detector::new(params());
        let image = RgbImage::new(8, 8);
        let err = detector.run(&image).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DetectError>(),
            Some(DetectError::NotLoaded)
        ));
    }

    #[test]
    fn spec_resolution_by_extension_and_stem() {
        let spec = ModelSpec::resolve(Path::new("models/yolov8n_int8.tflite"), None).unwrap();
        assert_eq!(spec.format, ModelFormat::QuantizedInterpreter);
        assert_eq!(spec.arch, ArchFamily::YoloV8);

        let spec = ModelSpec::resolve(Path::new("models/yolov5s.onnx"), None).unwrap();
        assert_eq!(spec.format, ModelFormat::GraphSession);
        assert_eq!(spec.arch, ArchFamily::YoloV5);
    }

    #[test]
    fn ambiguous_architecture_tokens_are_rejected() {
        let err = ModelSpec::resolve(Path::new("yolov5_to_yolov8_distilled.onnx"), None).unwrap_err();
        assert!(matches!(err, DetectError::UnrecognizedModel(_)));
    }

    #[test]
    fn arch_override_beats_stem_inference() {
        let spec =
            ModelSpec::resolve(Path::new("exported.onnx"), Some(ArchFamily::Yolo11)).unwrap();
        assert_eq!(spec.arch, ArchFamily::Yolo11);
    }

    #[test]
    fn unknown_extension_is_unrecognized() {
        let err = ModelSpec::resolve(Path::new("yolov8n.engine"), None).unwrap_err();
        assert!(matches!(err, DetectError::UnrecognizedModel(_)));
    }

    #[test]
    fn stub_pipeline_produces_bounded_detections() {
        let mut detector = Detector::new(params());
        detector
            .init(
                Path::new("yolov8n.stub"),
                None,
                (64, 64),
                CoreBudget::Full,
            )
            .unwrap();
        assert!(detector.is_ready());

        let image = RgbImage::new(128, 96);
        let (detections, timings) = detector.run(&image).unwrap();
        // Three strong boxes survive; the duplicate and the weak one do not.
        assert_eq!(detections.len(), 3);
        for det in &detections {
            assert!(det.score > 0.25);
            assert!(det.bbox.x_min <= det.bbox.x_max);
            assert!(det.bbox.y_min <= det.bbox.y_max);
            assert!(det.bbox.x_max <= 128 && det.bbox.y_max <= 96);
        }
        assert!(timings.total_ms() < 10_000);
    }
}
