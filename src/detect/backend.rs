use anyhow::Result;

/// Element type of a model input or output tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
    F32,
    U8,
    I8,
}

impl ElementType {
    pub fn is_float(self) -> bool {
        matches!(self, ElementType::F32)
    }
}

/// Shape and quantization parameters of one model tensor.
///
/// Produced once when the backend loads a model and immutable afterwards.
/// For float tensors `scale` is 1.0 and `zero_point` is 0.
#[derive(Clone, Debug)]
pub struct TensorDescriptor {
    pub shape: Vec<usize>,
    pub element: ElementType,
    pub scale: f32,
    pub zero_point: i32,
}

impl TensorDescriptor {
    pub fn float(shape: Vec<usize>) -> Self {
        Self {
            shape,
            element: ElementType::F32,
            scale: 1.0,
            zero_point: 0,
        }
    }

    pub fn quantized(shape: Vec<usize>, element: ElementType, scale: f32, zero_point: i32) -> Self {
        Self {
            shape,
            element,
            scale,
            zero_point,
        }
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Affine quantization: `round(v / scale + zero_point)`, saturated to
    /// the descriptor's element range.
    pub fn quantize(&self, value: f32) -> f32 {
        match self.element {
            ElementType::F32 => value,
            ElementType::U8 => (value / self.scale + self.zero_point as f32)
                .round()
                .clamp(u8::MIN as f32, u8::MAX as f32),
            ElementType::I8 => (value / self.scale + self.zero_point as f32)
                .round()
                .clamp(i8::MIN as f32, i8::MAX as f32),
        }
    }

    /// Inverse of [`quantize`](Self::quantize): `(raw - zero_point) * scale`.
    pub fn dequantize(&self, raw: f32) -> f32 {
        match self.element {
            ElementType::F32 => raw,
            _ => (raw - self.zero_point as f32) * self.scale,
        }
    }
}

/// Input tensor handed to a backend, either float or already quantized to
/// the input descriptor's element type.
#[derive(Clone, Debug)]
pub enum TensorData {
    F32(Vec<f32>),
    U8(Vec<u8>),
    I8(Vec<i8>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::U8(v) => v.len(),
            TensorData::I8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element(&self) -> ElementType {
        match self {
            TensorData::F32(_) => ElementType::F32,
            TensorData::U8(_) => ElementType::U8,
            TensorData::I8(_) => ElementType::I8,
        }
    }
}

/// Number of execution cores granted to a backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CoreBudget {
    #[default]
    Full,
    Half,
}

impl CoreBudget {
    /// Thread count for this budget given the machine's parallelism.
    pub fn threads(self, available: usize) -> usize {
        match self {
            CoreBudget::Full => available.max(1),
            CoreBudget::Half => (available / 2).max(1),
        }
    }

    /// CPU utilization ceiling used by the current estimator: a half
    /// budget can at most load 50% of the package.
    pub fn cpu_ceiling(self) -> f32 {
        match self {
            CoreBudget::Full => 100.0,
            CoreBudget::Half => 50.0,
        }
    }
}

/// Inference backend contract consumed by the detection pipeline.
///
/// A backend is constructed by loading a model; descriptors are fixed from
/// that point on. `forward` returns de-quantized floats regardless of the
/// model's native element type.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn input(&self) -> &TensorDescriptor;

    fn output(&self) -> &TensorDescriptor;

    /// Run one inference call. The input must match the input descriptor's
    /// element type and length.
    fn forward(&mut self, input: &TensorData) -> Result<Vec<f32>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_dequantize_round_trip_error_bounded_by_scale() {
        let desc = TensorDescriptor::quantized(vec![1, 4], ElementType::U8, 0.0039, 12);
        for step in 0..=100 {
            let v = step as f32 / 100.0;
            let round_trip = desc.dequantize(desc.quantize(v));
            assert!(
                (round_trip - v).abs() <= desc.scale,
                "round trip of {} drifted to {}",
                v,
                round_trip
            );
        }
    }

    #[test]
    fn quantize_saturates_at_element_range() {
        let desc = TensorDescriptor::quantized(vec![1], ElementType::I8, 0.01, 0);
        assert_eq!(desc.quantize(10.0), i8::MAX as f32);
        assert_eq!(desc.quantize(-10.0), i8::MIN as f32);
    }

    #[test]
    fn float_descriptor_is_identity() {
        let desc = TensorDescriptor::float(vec![1, 3]);
        assert_eq!(desc.quantize(0.42), 0.42);
        assert_eq!(desc.dequantize(0.42), 0.42);
    }

    #[test]
    fn half_budget_halves_threads_with_floor_of_one() {
        assert_eq!(CoreBudget::Half.threads(8), 4);
        assert_eq!(CoreBudget::Half.threads(1), 1);
        assert_eq!(CoreBudget::Full.threads(4), 4);
    }

}
