//! Strongly-typed identifiers for shopfloor records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primary key of a machine row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MachineId(i64);

impl MachineId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MachineId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for MachineId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Primary key of an operator (a user allowed to run machines)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatorId(i64);

impl OperatorId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OperatorId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for OperatorId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_id_equality() {
        assert_eq!(MachineId::new(7), MachineId::from(7));
        assert_ne!(MachineId::new(7), MachineId::new(8));
    }

    #[test]
    fn ids_parse_from_cli_strings() {
        assert_eq!("7".parse::<MachineId>().unwrap(), MachineId::new(7));
        assert_eq!("3".parse::<OperatorId>().unwrap(), OperatorId::new(3));
        assert!("seven".parse::<MachineId>().is_err());
    }

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&MachineId::new(7)).unwrap();
        assert_eq!(json, "7");

        let parsed: OperatorId = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, OperatorId::new(3));
    }
}
