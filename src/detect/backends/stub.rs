use anyhow::{anyhow, Result};

use crate::detect::backend::{ElementType, InferenceBackend, TensorData, TensorDescriptor};

/// In-process interpreter stub.
///
/// Returns a fixed raw output tensor for every forward call. Used for
/// harness self-benchmarks and tests: it exercises the full pipeline,
/// including input quantization, without a native runtime or a model file.
pub struct StubBackend {
    input: TensorDescriptor,
    output: TensorDescriptor,
    raw_output: Vec<f32>,
}

impl StubBackend {
    pub fn new(input: TensorDescriptor, output: TensorDescriptor, raw_output: Vec<f32>) -> Result<Self> {
        if raw_output.len() != output.len() {
            return Err(anyhow!(
                "raw output has {} values but the descriptor declares {}",
                raw_output.len(),
                output.len()
            ));
        }
        Ok(Self {
            input,
            output,
            raw_output,
        })
    }

    /// A quantized-interpreter-shaped stub producing a deterministic scene.
    ///
    /// Input is `[1, H, W, 3]` u8 with a 1/255 scale; output is
    /// `[1, 4+classes, N]` f32 holding three well-separated confident boxes
    /// plus two that NMS must remove (one overlapping duplicate, one weak).
    pub fn synthetic(input_size: (u32, u32), classes: usize) -> Self {
        let (w, h) = (input_size.0 as usize, input_size.1 as usize);
        let input =
            TensorDescriptor::quantized(vec![1, h, w, 3], ElementType::U8, 1.0 / 255.0, 0);

        // (cx, cy, bw, bh, score, class) in model-input pixels.
        let fw = input_size.0 as f32;
        let fh = input_size.1 as f32;
        let scene: [(f32, f32, f32, f32, f32, usize); 5] = [
            (fw * 0.25, fh * 0.25, fw * 0.20, fh * 0.30, 0.92, 0),
            (fw * 0.70, fh * 0.60, fw * 0.25, fh * 0.25, 0.81, 2),
            (fw * 0.50, fh * 0.85, fw * 0.15, fh * 0.10, 0.64, 7),
            // Duplicate of the first box, lower score: suppressed by NMS.
            (fw * 0.26, fh * 0.26, fw * 0.20, fh * 0.30, 0.55, 0),
            // Below any reasonable confidence floor.
            (fw * 0.10, fh * 0.90, fw * 0.05, fh * 0.05, 0.05, 1),
        ];

        let n = scene.len();
        let mut raw = vec![0.0f32; (4 + classes) * n];
        for (i, &(cx, cy, bw, bh, score, class)) in scene.iter().enumerate() {
            raw[i] = cx;
            raw[n + i] = cy;
            raw[2 * n + i] = bw;
            raw[3 * n + i] = bh;
            raw[(4 + class) * n + i] = score;
        }

        let output = TensorDescriptor::float(vec![1, 4 + classes, n]);
        Self {
            input,
            output,
            raw_output: raw,
        }
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input(&self) -> &TensorDescriptor {
        &self.input
    }

    fn output(&self) -> &TensorDescriptor {
        &self.output
    }

    fn forward(&mut self, input: &TensorData) -> Result<Vec<f32>> {
        if input.element() != self.input.element {
            return Err(anyhow!(
                "input element type {:?} does not match descriptor {:?}",
                input.element(),
                self.input.element
            ));
        }
        if input.len() != self.input.len() {
            return Err(anyhow!(
                "expected {} input values, received {}",
                self.input.len(),
                input.len()
            ));
        }

        if self.output.element.is_float() {
            Ok(self.raw_output.clone())
        } else {
            Ok(self
                .raw_output
                .iter()
                .map(|&raw| self.output.dequantize(raw))
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_stub_rejects_float_input() {
        let mut backend = StubBackend::synthetic((32, 32), 8);
        let err = backend.forward(&TensorData::F32(vec![0.0; 32 * 32 * 3]));
        assert!(err.is_err());
    }

    #[test]
    fn synthetic_stub_returns_fixed_output() {
        let mut backend = StubBackend::synthetic((32, 32), 8);
        let input = TensorData::U8(vec![0; 32 * 32 * 3]);
        let a = backend.forward(&input).unwrap();
        let b = backend.forward(&input).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), backend.output().len());
    }

    #[test]
    fn quantized_output_is_dequantized_by_forward() {
        let input = TensorDescriptor::float(vec![1, 2]);
        let output = TensorDescriptor::quantized(vec![1, 2], ElementType::U8, 0.5, 10);
        let mut backend = StubBackend::new(input, output, vec![14.0, 10.0]).unwrap();
        let out = backend.forward(&TensorData::F32(vec![0.0, 0.0])).unwrap();
        assert_eq!(out, vec![2.0, 0.0]);
    }

    #[test]
    fn mismatched_raw_output_length_is_rejected() {
        let input = TensorDescriptor::float(vec![1, 2]);
        let output = TensorDescriptor::float(vec![1, 4]);
        assert!(StubBackend::new(input, output, vec![0.0; 3]).is_err());
    }
}
