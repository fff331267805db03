//! Kinds of product a payment can be for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// What a payment purchases. Promo codes are scoped by this too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Course,
    Membership,
    Program,
    Extension,
    Gift,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Course => "course",
            ProductType::Membership => "membership",
            ProductType::Program => "program",
            ProductType::Extension => "extension",
            ProductType::Gift => "gift",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(ProductType::Course),
            "membership" => Ok(ProductType::Membership),
            "program" => Ok(ProductType::Program),
            "extension" => Ok(ProductType::Extension),
            "gift" => Ok(ProductType::Gift),
            other => Err(ValidationError::invalid_format(
                "product_type",
                format!("unknown product type '{}'", other),
            )),
        }
    }
}
