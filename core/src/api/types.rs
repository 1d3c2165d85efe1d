//! Decoded query API payloads

use serde::Deserialize;
use std::collections::BTreeMap;

/// `[<unix seconds>, "<value>"]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SamplePair(pub f64, pub String);

impl SamplePair {
    pub fn timestamp(&self) -> f64 {
        self.0
    }

    /// Parse the sample value; `NaN` and `±Inf` are accepted
    pub fn value(&self) -> Option<f64> {
        self.1.parse().ok()
    }
}

/// One element of an instant vector
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    pub value: SamplePair,
}

/// One series of a range matrix
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SampleStream {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<SamplePair>,
}

/// Result of an instant or range query
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(SamplePair),
    String(SamplePair),
    Vector(Vec<Sample>),
    Matrix(Vec<SampleStream>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::String(_) => "string",
            Value::Vector(_) => "vector",
            Value::Matrix(_) => "matrix",
        }
    }

    /// Number of top-level results
    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) | Value::String(_) => 1,
            Value::Vector(v) => v.len(),
            Value::Matrix(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: serde_json::Value,
}

/// Decode the `data` member of a query or query_range response
pub fn decode_query_data(data: &serde_json::Value) -> Result<Value, String> {
    let data = QueryData::deserialize(data).map_err(|e| e.to_string())?;
    let result = data.result;
    let value = match data.result_type.as_str() {
        "scalar" => Value::Scalar(serde_json::from_value(result).map_err(|e| e.to_string())?),
        "string" => Value::String(serde_json::from_value(result).map_err(|e| e.to_string())?),
        "vector" => Value::Vector(serde_json::from_value(result).map_err(|e| e.to_string())?),
        "matrix" => Value::Matrix(serde_json::from_value(result).map_err(|e| e.to_string())?),
        other => return Err(format!("unexpected value type {other:?}")),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_vector() {
        let data = json!({
            "resultType": "vector",
            "result": [{"metric": {"__name__": "up", "job": "x"}, "value": [1600000000.5, "1600000000500"]}]
        });
        let value = decode_query_data(&data).unwrap();
        let Value::Vector(samples) = value else {
            panic!("expected vector");
        };
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].metric["job"], "x");
        assert_eq!(samples[0].value.timestamp(), 1600000000.5);
        assert_eq!(samples[0].value.value(), Some(1600000000500.0));
    }

    #[test]
    fn test_decode_matrix_and_scalar() {
        let matrix = json!({
            "resultType": "matrix",
            "result": [{"metric": {}, "values": [[1, "1"], [2, "NaN"]]}]
        });
        let Value::Matrix(streams) = decode_query_data(&matrix).unwrap() else {
            panic!("expected matrix");
        };
        assert_eq!(streams[0].values.len(), 2);
        assert!(streams[0].values[1].value().unwrap().is_nan());

        let scalar = json!({"resultType": "scalar", "result": [1, "2"]});
        assert_eq!(decode_query_data(&scalar).unwrap().type_name(), "scalar");
    }

    #[test]
    fn test_decode_unknown_type() {
        let data = json!({"resultType": "histogram", "result": []});
        assert!(decode_query_data(&data).unwrap_err().contains("histogram"));
    }
}
