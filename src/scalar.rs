// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! [`ScalarValue`]: single-valued columnar data

use std::fmt;
use std::sync::Arc;

use arrow::array::{
    new_null_array, ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array,
    StringArray,
};
use arrow::datatypes::DataType;

/// A dynamically typed, nullable single value, the scalar counterpart of an
/// arrow array. Literals in residual join predicates carry one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// untyped null value
    Null,
    /// true or false value
    Boolean(Option<bool>),
    /// signed 32bit int
    Int32(Option<i32>),
    /// signed 64bit int
    Int64(Option<i64>),
    /// 64bit float
    Float64(Option<f64>),
    /// utf-8 encoded string
    Utf8(Option<String>),
}

impl ScalarValue {
    /// Getter for the `DataType` of the value
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Int32(_) => DataType::Int32,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
        }
    }

    /// Whether this value is null
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            ScalarValue::Null
                | ScalarValue::Boolean(None)
                | ScalarValue::Int32(None)
                | ScalarValue::Int64(None)
                | ScalarValue::Float64(None)
                | ScalarValue::Utf8(None)
        )
    }

    /// Converts a scalar value into an 1-row array
    pub fn to_array(&self) -> ArrayRef {
        self.to_array_of_size(1)
    }

    /// Converts a scalar value into an array of `size` rows
    pub fn to_array_of_size(&self, size: usize) -> ArrayRef {
        match self {
            ScalarValue::Null => new_null_array(&DataType::Null, size),
            ScalarValue::Boolean(v) => Arc::new(BooleanArray::from(vec![*v; size])),
            ScalarValue::Int32(v) => Arc::new(Int32Array::from(vec![*v; size])),
            ScalarValue::Int64(v) => Arc::new(Int64Array::from(vec![*v; size])),
            ScalarValue::Float64(v) => Arc::new(Float64Array::from(vec![*v; size])),
            ScalarValue::Utf8(v) => {
                Arc::new(StringArray::from(vec![v.as_deref(); size]))
            }
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(Some(value))
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int32(Some(value))
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(Some(value))
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(Some(value))
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(Some(value.to_string()))
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(Some(value))
    }
}

macro_rules! format_option {
    ($F:expr, $EXPR:expr) => {{
        match $EXPR {
            Some(e) => write!($F, "{e}"),
            None => write!($F, "NULL"),
        }
    }};
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL")?,
            ScalarValue::Boolean(e) => format_option!(f, e)?,
            ScalarValue::Int32(e) => format_option!(f, e)?,
            ScalarValue::Int64(e) => format_option!(f, e)?,
            ScalarValue::Float64(e) => format_option!(f, e)?,
            ScalarValue::Utf8(e) => format_option!(f, e)?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    #[test]
    fn scalar_to_array_of_size() {
        let array = ScalarValue::from(7_i32).to_array_of_size(3);
        let array = array.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(array.len(), 3);
        assert!(array.iter().all(|v| v == Some(7)));

        let array = ScalarValue::Utf8(None).to_array_of_size(2);
        assert_eq!(array.null_count(), 2);
    }

    #[test]
    fn scalar_data_type() {
        assert_eq!(ScalarValue::from(true).data_type(), DataType::Boolean);
        assert_eq!(ScalarValue::from(1.5_f64).data_type(), DataType::Float64);
        assert_eq!(ScalarValue::from("a").data_type(), DataType::Utf8);
    }

    #[test]
    fn scalar_display() {
        assert_eq!(ScalarValue::from(42_i64).to_string(), "42");
        assert_eq!(ScalarValue::Int32(None).to_string(), "NULL");
    }
}
