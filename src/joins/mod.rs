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

//! Join implementations

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use crate::error::{Error, Result};

pub use broadcast_nested_loop_join::BroadcastNestedLoopJoinExec;

pub mod broadcast_nested_loop_join;
pub mod utils;

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Hash)]
pub enum JoinType {
    /// Inner Join
    Inner,
    /// Cross Join (inner join without a join condition)
    Cross,
    /// Left Join
    Left,
    /// Right Join
    Right,
    /// Full Join
    Full,
    /// Left Semi Join
    LeftSemi,
    /// Left Anti Join
    LeftAnti,
    /// Existence Join, the left rows extended with a boolean column that
    /// records whether a match exists on the right
    Existence,
}

impl JoinType {
    /// Inner and Cross joins produce the plain cartesian product and are the
    /// only types a broadcast nested loop join can execute
    pub fn is_inner_like(self) -> bool {
        self == JoinType::Inner || self == JoinType::Cross
    }
}

impl Display for JoinType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let join_type = match self {
            JoinType::Inner => "Inner",
            JoinType::Cross => "Cross",
            JoinType::Left => "Left",
            JoinType::Right => "Right",
            JoinType::Full => "Full",
            JoinType::LeftSemi => "LeftSemi",
            JoinType::LeftAnti => "LeftAnti",
            JoinType::Existence => "Existence",
        };
        write!(f, "{join_type}")
    }
}

impl FromStr for JoinType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.to_uppercase();
        match s.as_str() {
            "INNER" => Ok(JoinType::Inner),
            "CROSS" => Ok(JoinType::Cross),
            "LEFT" => Ok(JoinType::Left),
            "RIGHT" => Ok(JoinType::Right),
            "FULL" => Ok(JoinType::Full),
            "LEFTSEMI" => Ok(JoinType::LeftSemi),
            "LEFTANTI" => Ok(JoinType::LeftAnti),
            "EXISTENCE" => Ok(JoinType::Existence),
            _ => Err(Error::Plan(format!(
                "The join type {s} does not exist or is not supported"
            ))),
        }
    }
}

/// Join side.
/// Stores the referred table side during calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    /// Left side of the join
    Left,
    /// Right side of the join
    Right,
}

impl JoinSide {
    /// Inverse the join side
    pub fn negate(&self) -> Self {
        match self {
            JoinSide::Left => JoinSide::Right,
            JoinSide::Right => JoinSide::Left,
        }
    }
}

impl Display for JoinSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            JoinSide::Left => write!(f, "left"),
            JoinSide::Right => write!(f, "right"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_type_from_str() {
        assert_eq!("inner".parse::<JoinType>().unwrap(), JoinType::Inner);
        assert_eq!("Cross".parse::<JoinType>().unwrap(), JoinType::Cross);
        assert_eq!("LEFTSEMI".parse::<JoinType>().unwrap(), JoinType::LeftSemi);
        let err = "leftouter".parse::<JoinType>().unwrap_err();
        assert!(err.to_string().contains("LEFTOUTER does not exist"));
    }

    #[test]
    fn inner_like_family() {
        assert!(JoinType::Inner.is_inner_like());
        assert!(JoinType::Cross.is_inner_like());
        for join_type in [
            JoinType::Left,
            JoinType::Right,
            JoinType::Full,
            JoinType::LeftSemi,
            JoinType::LeftAnti,
            JoinType::Existence,
        ] {
            assert!(!join_type.is_inner_like());
        }
    }

    #[test]
    fn join_side_negate() {
        assert_eq!(JoinSide::Left.negate(), JoinSide::Right);
        assert_eq!(JoinSide::Right.negate(), JoinSide::Left);
    }
}
