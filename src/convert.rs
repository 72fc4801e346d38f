//! Conversion of JSON nested arrays into NumPy `.npy` files.
//!
//! The element type follows what `numpy.asarray` would pick for the same
//! document: booleans stay `bool`, integers become `int64`, and any float
//! promotes the whole array to `float64`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use ndarray_npy::{WriteNpyError, WriteNpyExt};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Top-level JSON value must be an array, got {0}")]
    NotAnArray(&'static str),

    #[error("Ragged array at depth {depth}: expected {expected}, got {actual}")]
    Ragged {
        depth: usize,
        expected: String,
        actual: String,
    },

    #[error("Array element must be a number or a boolean, got {0}")]
    NotNumeric(&'static str),

    #[error("Invalid array shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Failed to write npy data: {0}")]
    WriteNpy(#[from] WriteNpyError),
}

/// An n-dimensional array with the element type inferred from JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum NpyArray {
    Bool(ArrayD<bool>),
    Int(ArrayD<i64>),
    Float(ArrayD<f64>),
}

impl NpyArray {
    pub fn shape(&self) -> &[usize] {
        match self {
            NpyArray::Bool(array) => array.shape(),
            NpyArray::Int(array) => array.shape(),
            NpyArray::Float(array) => array.shape(),
        }
    }

    /// NumPy name of the element type.
    pub fn dtype(&self) -> &'static str {
        match self {
            NpyArray::Bool(_) => "bool",
            NpyArray::Int(_) => "int64",
            NpyArray::Float(_) => "float64",
        }
    }

    pub fn write_npy<W: Write>(&self, writer: W) -> Result<(), ConvertError> {
        match self {
            NpyArray::Bool(array) => array.write_npy(writer)?,
            NpyArray::Int(array) => array.write_npy(writer)?,
            NpyArray::Float(array) => array.write_npy(writer)?,
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Scalar {
    fn as_i64(self) -> i64 {
        match self {
            Scalar::Bool(v) => v as i64,
            Scalar::Int(v) => v,
            Scalar::Float(v) => v as i64,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Scalar::Bool(v) => v as i64 as f64,
            Scalar::Int(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Shape of a nested array, read along the first element of every dimension.
fn infer_shape(root: &[Value]) -> Vec<usize> {
    let mut shape = vec![root.len()];
    let mut current = root.first();

    while let Some(Value::Array(items)) = current {
        shape.push(items.len());
        current = items.first();
    }

    shape
}

fn flatten(
    items: &[Value],
    shape: &[usize],
    depth: usize,
    out: &mut Vec<Scalar>,
) -> Result<(), ConvertError> {
    if items.len() != shape[depth] {
        return Err(ConvertError::Ragged {
            depth,
            expected: format!("{} elements", shape[depth]),
            actual: format!("{} elements", items.len()),
        });
    }

    let is_last = depth + 1 == shape.len();

    for item in items {
        match (item, is_last) {
            (Value::Array(inner), false) => flatten(inner, shape, depth + 1, out)?,
            (Value::Array(_), true) => {
                return Err(ConvertError::Ragged {
                    depth: depth + 1,
                    expected: "a scalar".into(),
                    actual: "an array".into(),
                });
            }
            (_, false) => {
                return Err(ConvertError::Ragged {
                    depth: depth + 1,
                    expected: "an array".into(),
                    actual: kind(item).into(),
                });
            }
            (Value::Bool(v), true) => out.push(Scalar::Bool(*v)),
            (Value::Number(n), true) => match n.as_i64() {
                Some(v) => out.push(Scalar::Int(v)),
                None => out.push(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            (other, true) => return Err(ConvertError::NotNumeric(kind(other))),
        }
    }

    Ok(())
}

/// Parse a JSON document holding a rectangular nested array.
pub fn parse_json_array(json: &str) -> Result<NpyArray, ConvertError> {
    let value: Value = serde_json::from_str(json)?;
    from_value(&value)
}

/// Build an array from an already parsed JSON value.
pub fn from_value(value: &Value) -> Result<NpyArray, ConvertError> {
    let Value::Array(root) = value else {
        return Err(ConvertError::NotAnArray(kind(value)));
    };

    let shape = infer_shape(root);
    let mut scalars = Vec::with_capacity(shape.iter().product());
    flatten(root, &shape, 0, &mut scalars)?;

    let dims = IxDyn(&shape);
    let all_bool = scalars.iter().all(|s| matches!(s, Scalar::Bool(_)));
    let any_float = scalars.iter().any(|s| matches!(s, Scalar::Float(_)));

    let array = if scalars.is_empty() || any_float {
        NpyArray::Float(ArrayD::from_shape_vec(
            dims,
            scalars.into_iter().map(Scalar::as_f64).collect(),
        )?)
    } else if all_bool {
        NpyArray::Bool(ArrayD::from_shape_vec(
            dims,
            scalars
                .into_iter()
                .map(|s| matches!(s, Scalar::Bool(true)))
                .collect(),
        )?)
    } else {
        NpyArray::Int(ArrayD::from_shape_vec(
            dims,
            scalars.into_iter().map(Scalar::as_i64).collect(),
        )?)
    };

    Ok(array)
}

/// Read a JSON array from `input` and write it as an `.npy` file at `output`.
pub fn transform_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
) -> Result<NpyArray, ConvertError> {
    let reader = BufReader::new(File::open(input.as_ref())?);
    let value: Value = serde_json::from_reader(reader)?;
    let array = from_value(&value)?;

    tracing::info!(
        "Writing {} array of shape {:?} to {}",
        array.dtype(),
        array.shape(),
        output.as_ref().display()
    );

    let mut writer = BufWriter::new(File::create(output.as_ref())?);
    array.write_npy(&mut writer)?;
    writer.flush()?;

    Ok(array)
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, arr2};
    use ndarray_npy::ReadNpyExt;

    use super::*;

    #[test]
    fn integer_matrix_keeps_shape_and_dtype() {
        let array = parse_json_array("[[1, 2, 3], [4, 5, 6]]").unwrap();

        assert_eq!(array.dtype(), "int64");
        assert_eq!(
            array,
            NpyArray::Int(arr2(&[[1i64, 2, 3], [4, 5, 6]]).into_dyn())
        );
    }

    #[test]
    fn any_float_promotes_whole_array() {
        let array = parse_json_array("[[1, 2.5], [-3, 0.125]]").unwrap();

        assert_eq!(
            array,
            NpyArray::Float(arr2(&[[1.0, 2.5], [-3.0, 0.125]]).into_dyn())
        );
    }

    #[test]
    fn nested_shapes_and_empty_arrays() {
        let cube = parse_json_array("[[[true, false]], [[false, true]]]").unwrap();
        assert_eq!(cube.shape(), &[2, 1, 2]);
        assert_eq!(cube.dtype(), "bool");

        let empty = parse_json_array("[[], []]").unwrap();
        assert_eq!(empty.shape(), &[2, 0]);
        assert_eq!(empty.dtype(), "float64");
    }

    #[test]
    fn ragged_and_non_numeric_inputs_fail() {
        assert!(matches!(
            parse_json_array("[[1, 2], [3]]"),
            Err(ConvertError::Ragged { depth: 1, .. })
        ));
        assert!(matches!(
            parse_json_array("[[1, 2], 3]"),
            Err(ConvertError::Ragged { depth: 1, .. })
        ));
        assert!(matches!(
            parse_json_array("[1, [2]]"),
            Err(ConvertError::Ragged { depth: 1, .. })
        ));
        assert!(matches!(
            parse_json_array("[\"a\", \"b\"]"),
            Err(ConvertError::NotNumeric("a string"))
        ));
        assert!(matches!(
            parse_json_array("{\"a\": 1}"),
            Err(ConvertError::NotAnArray("an object"))
        ));
        assert!(matches!(parse_json_array("[1, 2"), Err(ConvertError::Json(_))));
    }

    #[test]
    fn npy_bytes_reload_to_the_same_array() {
        let array = parse_json_array("[[0.1, 0.2, 0.3], [1e-9, -7.0, 123456.789]]").unwrap();

        let mut bytes = Vec::new();
        array.write_npy(&mut bytes).unwrap();
        assert!(bytes.starts_with(b"\x93NUMPY"));

        let reloaded = ArrayD::<f64>::read_npy(bytes.as_slice()).unwrap();
        assert_eq!(NpyArray::Float(reloaded), array);
    }

    #[test]
    fn floats_match_their_decimal_text() {
        let literals = ["7.4e+47", "8.533e+68", "7.038531e-26"];
        let array = parse_json_array(&format!("[{}]", literals.join(", "))).unwrap();

        let NpyArray::Float(values) = array else {
            panic!("Expected a float64 array, got {}", array.dtype());
        };
        for (value, literal) in values.iter().zip(literals) {
            assert_eq!(value.to_bits(), literal.parse::<f64>().unwrap().to_bits(), "{literal}");
        }
    }

    #[test]
    fn transform_file_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("burn-hierarchy-convert-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("tester.json");
        let output = dir.join("tester.npy");
        std::fs::write(&input, "[[3, 1, 4], [1, 5, 9], [2, 6, 5]]").unwrap();

        let written = transform_file(&input, &output).unwrap();

        let reloaded = ArrayD::<i64>::read_npy(File::open(&output).unwrap()).unwrap();
        assert_eq!(NpyArray::Int(reloaded), written);
        assert_eq!(written.shape(), &[3, 3]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_input_is_an_io_error() {
        let result = transform_file("/nonexistent/input.json", "/nonexistent/output.npy");
        assert!(matches!(result, Err(ConvertError::Io(_))));
    }
}
