//! Product references an enrollment can grant access to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{CourseId, ValidationError};

/// Membership tier sold as a recurring subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    /// Billed every month.
    Monthly,
    /// Billed once a year.
    Annual,
}

impl MembershipTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipTier::Monthly => "monthly",
            MembershipTier::Annual => "annual",
        }
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(MembershipTier::Monthly),
            "annual" => Ok(MembershipTier::Annual),
            other => Err(ValidationError::invalid_format(
                "membership_tier",
                format!("unknown tier '{}'", other),
            )),
        }
    }
}

/// The thing an enrollment unlocks.
///
/// Exactly one of course, program or membership tier; the enum makes a
/// row with none or several of them unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ProductRef {
    Course(CourseId),
    Program(String),
    Membership(MembershipTier),
}

impl ProductRef {
    /// Short discriminator used in storage and URLs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProductRef::Course(_) => "course",
            ProductRef::Program(_) => "program",
            ProductRef::Membership(_) => "membership",
        }
    }

    /// Identifier within the kind.
    pub fn key(&self) -> &str {
        match self {
            ProductRef::Course(id) => id.as_str(),
            ProductRef::Program(program) => program.as_str(),
            ProductRef::Membership(tier) => tier.as_str(),
        }
    }

    /// Rebuilds a product reference from its stored `(kind, key)` pair.
    pub fn from_parts(kind: &str, key: &str) -> Result<Self, ValidationError> {
        match kind {
            "course" => Ok(ProductRef::Course(CourseId::new(key)?)),
            "program" => {
                if key.trim().is_empty() {
                    return Err(ValidationError::empty_field("program_type"));
                }
                Ok(ProductRef::Program(key.to_string()))
            }
            "membership" => Ok(ProductRef::Membership(key.parse()?)),
            other => Err(ValidationError::invalid_format(
                "product_kind",
                format!("unknown product kind '{}'", other),
            )),
        }
    }
}

impl fmt::Display for ProductRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}
