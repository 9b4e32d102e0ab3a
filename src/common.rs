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

//! Defines common code used in execution plans

use std::sync::Arc;

use arrow::array::{Array, BooleanArray};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;

use crate::error::Result;
use crate::internal_err;
use crate::stream::SendableRecordBatchStream;

/// Create a vector of record batches from a stream
pub async fn collect(stream: SendableRecordBatchStream) -> Result<Vec<RecordBatch>> {
    stream.try_collect::<Vec<_>>().await
}

/// Applies an optional projection to a [`SchemaRef`], returning the
/// projected schema
pub fn project_schema(
    schema: &SchemaRef,
    projection: Option<&Vec<usize>>,
) -> Result<SchemaRef> {
    let schema = match projection {
        Some(columns) => Arc::new(schema.project(columns)?),
        None => Arc::clone(schema),
    };
    Ok(schema)
}

/// Downcast an Arrow Array to a [`BooleanArray`], erroring instead of
/// panicking when the array is of a different type
pub fn as_boolean_array(array: &dyn Array) -> Result<&BooleanArray> {
    match array.as_any().downcast_ref::<BooleanArray>() {
        Some(array) => Ok(array),
        None => internal_err!(
            "Expected a BooleanArray, got array of type {}",
            array.data_type()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;

    #[test]
    fn boolean_downcast() {
        let array = BooleanArray::from(vec![true, false]);
        assert!(as_boolean_array(&array).is_ok());

        let array = Int32Array::from(vec![1]);
        let err = as_boolean_array(&array).unwrap_err().to_string();
        assert!(err.contains("Expected a BooleanArray, got array of type Int32"));
    }
}
