//! ONNX classifier backend.
//!
//! With the `onnx` feature enabled, [`OnnxClassifier`] runs an exported
//! classifier through ONNX Runtime. The graph must take a single float input
//! of shape `[1, 29]` (columns in schema order) and produce the label tensor
//! as output 0 and the probability tensor as output 1. Without the feature a
//! stub is compiled that fails at load time.

#[cfg(feature = "onnx")]
mod inner {
    use crate::model::{ChurnModel, InferenceError, ModelError};
    use crate::schema::{model_columns, FeatureRow};
    use ort::{session::Session, value::Tensor};
    use std::path::Path;
    use std::sync::Mutex;

    /// An ONNX classifier loaded into ONNX Runtime.
    pub struct OnnxClassifier {
        session: Mutex<Session>,
        input_name: String,
        classes: Vec<i64>,
        columns: Vec<String>,
    }

    impl OnnxClassifier {
        pub fn load(path: &Path, classes: Vec<i64>) -> Result<Self, ModelError> {
            std::fs::metadata(path).map_err(|source| ModelError::Io {
                path: path.to_path_buf(),
                source,
            })?;

            let session = Session::builder()
                .map_err(|e| ModelError::Invalid(format!("ONNX session builder error: {}", e)))?
                .commit_from_file(path)
                .map_err(|e| ModelError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;

            let input_name = session
                .inputs()
                .first()
                .map(|i| i.name().to_string())
                .unwrap_or_else(|| "input".to_string());

            Ok(Self {
                session: Mutex::new(session),
                input_name,
                classes,
                columns: model_columns().map(str::to_string).collect(),
            })
        }

        fn input_data(&self, row: &FeatureRow) -> Result<Vec<f32>, InferenceError> {
            if let Some(extra) = row
                .columns()
                .find(|c| !self.columns.iter().any(|m| m.as_str() == *c))
            {
                return Err(InferenceError::UnexpectedColumn(extra.to_string()));
            }
            self.columns
                .iter()
                .map(|c| {
                    row.get(c)
                        .map(|v| v.as_f64() as f32)
                        .ok_or_else(|| InferenceError::MissingColumn(c.clone()))
                })
                .collect()
        }

        /// Run the graph once, returning `(label, probabilities)`.
        fn run(&self, row: &FeatureRow) -> Result<(i64, Vec<f64>), InferenceError> {
            let data = self.input_data(row)?;
            let n = data.len();

            let input_tensor = Tensor::from_array((vec![1_i64, n as i64], data))
                .map_err(|e| InferenceError::Backend(format!("tensor creation: {}", e)))?;

            let mut session = self
                .session
                .lock()
                .map_err(|e| InferenceError::Backend(format!("session lock: {}", e)))?;

            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => input_tensor])
                .map_err(|e| InferenceError::Backend(format!("ONNX inference: {}", e)))?;

            let (_, labels) = outputs[0]
                .try_extract_tensor::<i64>()
                .map_err(|e| InferenceError::Backend(format!("label tensor: {}", e)))?;
            let label = *labels
                .first()
                .ok_or_else(|| InferenceError::Backend("empty label tensor".into()))?;

            let (_, proba) = outputs[1]
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::Backend(format!("probability tensor: {}", e)))?;

            Ok((label, proba.iter().map(|p| *p as f64).collect()))
        }
    }

    impl ChurnModel for OnnxClassifier {
        fn classes(&self) -> &[i64] {
            &self.classes
        }

        fn columns(&self) -> &[String] {
            &self.columns
        }

        fn predict(&self, row: &FeatureRow) -> Result<i64, InferenceError> {
            self.run(row).map(|(label, _)| label)
        }

        fn predict_probability(&self, row: &FeatureRow) -> Result<Vec<f64>, InferenceError> {
            self.run(row).map(|(_, proba)| proba)
        }
    }
}

#[cfg(not(feature = "onnx"))]
mod inner {
    use crate::model::{ChurnModel, InferenceError, ModelError};
    use crate::schema::FeatureRow;
    use std::path::Path;

    /// Stub `OnnxClassifier` when the `onnx` feature is not enabled.
    pub struct OnnxClassifier {
        classes: Vec<i64>,
        columns: Vec<String>,
    }

    impl OnnxClassifier {
        pub fn load(_path: &Path, _classes: Vec<i64>) -> Result<Self, ModelError> {
            Err(ModelError::Unsupported(
                "ONNX models require the 'onnx' feature, rebuild with: cargo build --features onnx"
                    .to_string(),
            ))
        }
    }

    impl ChurnModel for OnnxClassifier {
        fn classes(&self) -> &[i64] {
            &self.classes
        }

        fn columns(&self) -> &[String] {
            &self.columns
        }

        fn predict(&self, _row: &FeatureRow) -> Result<i64, InferenceError> {
            Err(InferenceError::Backend("ONNX support not compiled in".into()))
        }

        fn predict_probability(&self, _row: &FeatureRow) -> Result<Vec<f64>, InferenceError> {
            Err(InferenceError::Backend("ONNX support not compiled in".into()))
        }
    }

}

pub use inner::OnnxClassifier;
