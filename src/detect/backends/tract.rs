#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{CoreBudget, InferenceBackend, TensorData, TensorDescriptor};
use crate::detect::error::DetectError;

/// Graph-session backend: ONNX inference via tract.
///
/// Loads a local model file and runs float inference; tract executes a
/// session on the calling thread, so the core budget only caps the thread
/// count the process is allowed to use.
pub struct TractBackend {
    plan: TypedSimplePlan<TypedModel>,
    input: TensorDescriptor,
    output: TensorDescriptor,
}

impl TractBackend {
    /// Load an ONNX model and pin its input to `[1, 3, height, width]` f32.
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        input_size: (u32, u32),
        budget: CoreBudget,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let (width, height) = (input_size.0 as usize, input_size.1 as usize);

        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, height, width)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let output_fact = plan
            .model()
            .output_fact(0)
            .context("model has no output")?;
        if output_fact.datum_type != f32::datum_type() {
            return Err(DetectError::UnsupportedType(format!("{:?}", output_fact.datum_type)).into());
        }
        let output_shape: Vec<usize> = output_fact
            .shape
            .as_concrete()
            .ok_or_else(|| anyhow!("model output shape is not concrete"))?
            .to_vec();

        let threads = budget.threads(
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        );
        log::info!(
            "loaded graph session {} (input 1x3x{}x{}, output {:?}, {} threads)",
            model_path.display(),
            height,
            width,
            output_shape,
            threads
        );

        Ok(Self {
            plan,
            input: TensorDescriptor::float(vec![1, 3, height, width]),
            output: TensorDescriptor::float(output_shape),
        })
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input(&self) -> &TensorDescriptor {
        &self.input
    }

    fn output(&self) -> &TensorDescriptor {
        &self.output
    }

    fn forward(&mut self, input: &TensorData) -> Result<Vec<f32>> {
        let values = match input {
            TensorData::F32(values) => values,
            other => {
                return Err(DetectError::UnsupportedType(format!(
                    "graph session expects f32 input, got {:?}",
                    other.element()
                ))
                .into())
            }
        };
        if values.len() != self.input.len() {
            return Err(anyhow!(
                "expected {} input values, received {}",
                self.input.len(),
                values.len()
            ));
        }

        let tensor = Tensor::from_shape(&self.input.shape, values)?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Ok(view.iter().copied().collect())
    }
}
