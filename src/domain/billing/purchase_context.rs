//! Typed purchase context carried through the payment processor.
//!
//! The processor only round-trips a flat string map. Everything the webhook
//! side needs to grant access is encoded here when the purchase starts and
//! decoded from the stored payment when the payment settles.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::enrollment::{MembershipTier, ProductRef};
use crate::domain::foundation::{CourseId, EnrollmentId, PaymentId, UserId, ValidationError};

use super::ProductType;

pub const PURCHASE_TYPE_KEY: &str = "purchase_type";
pub const USER_ID_KEY: &str = "user_id";
const COURSE_ID_KEY: &str = "course_id";
const PROGRAM_TYPE_KEY: &str = "program_type";
const INSTALLMENT_NUMBER_KEY: &str = "installment_number";
const INSTALLMENT_COUNT_KEY: &str = "installment_count";
const INSTALLMENT_PLAN_KEY: &str = "installment_plan_id";
const ENROLLMENT_ID_KEY: &str = "enrollment_id";
const EXTENSION_DAYS_KEY: &str = "extension_days";
const TIER_KEY: &str = "tier";
const GIFT_KIND_KEY: &str = "gift_kind";
const GIFT_PRODUCT_KEY: &str = "gift_product_id";
const GIFT_MONTHS_KEY: &str = "gift_months";
const RECIPIENT_EMAIL_KEY: &str = "recipient_email";

/// Position of a payment within an installment plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    /// 1-based.
    pub number: u8,
    pub count: u8,
    /// The plan's first payment; `None` on that payment itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PaymentId>,
}

impl Installment {
    /// Opens a plan of `count` payments.
    pub fn first_of(count: u8) -> Self {
        Self {
            number: 1,
            count,
            plan: None,
        }
    }

    /// Payment `number` of the plan opened by `plan`.
    pub fn later(plan: PaymentId, number: u8, count: u8) -> Self {
        Self {
            number,
            count,
            plan: Some(plan),
        }
    }

    /// Whether this payment belongs to the plan opened by `plan`.
    pub fn belongs_to(&self, plan: &PaymentId) -> bool {
        self.plan.as_ref() == Some(plan)
    }
}

/// What a gift buys for its recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GiftItem {
    Course(CourseId),
    Program(String),
    MembershipMonths { tier: MembershipTier, months: u32 },
}

/// Decoded purchase metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseContext {
    Course {
        user_id: UserId,
        course_id: CourseId,
    },
    Program {
        user_id: UserId,
        program: String,
        installment: Option<Installment>,
    },
    Extension {
        user_id: UserId,
        enrollment_id: EnrollmentId,
        days: i64,
    },
    Membership {
        user_id: UserId,
        tier: MembershipTier,
    },
    Gift {
        purchaser_id: UserId,
        recipient_email: String,
        item: GiftItem,
    },
}

impl PurchaseContext {
    /// Wire discriminator stored under `purchase_type`.
    pub fn purchase_type(&self) -> &'static str {
        match self {
            PurchaseContext::Course { .. } => "course_purchase",
            PurchaseContext::Program { .. } => "program_purchase",
            PurchaseContext::Extension { .. } => "enrollment_extension",
            PurchaseContext::Membership { .. } => "membership_purchase",
            PurchaseContext::Gift { .. } => "gift_purchase",
        }
    }

    pub fn product_type(&self) -> ProductType {
        match self {
            PurchaseContext::Course { .. } => ProductType::Course,
            PurchaseContext::Program { .. } => ProductType::Program,
            PurchaseContext::Extension { .. } => ProductType::Extension,
            PurchaseContext::Membership { .. } => ProductType::Membership,
            PurchaseContext::Gift { .. } => ProductType::Gift,
        }
    }

    /// The paying user.
    pub fn user_id(&self) -> &UserId {
        match self {
            PurchaseContext::Course { user_id, .. }
            | PurchaseContext::Program { user_id, .. }
            | PurchaseContext::Extension { user_id, .. }
            | PurchaseContext::Membership { user_id, .. } => user_id,
            PurchaseContext::Gift { purchaser_id, .. } => purchaser_id,
        }
    }

    /// Product identifier recorded on the payment row.
    pub fn product_id(&self) -> String {
        match self {
            PurchaseContext::Course { course_id, .. } => course_id.to_string(),
            PurchaseContext::Program { program, .. } => program.clone(),
            PurchaseContext::Extension { enrollment_id, .. } => enrollment_id.to_string(),
            PurchaseContext::Membership { tier, .. } => tier.to_string(),
            PurchaseContext::Gift { item, .. } => match item {
                GiftItem::Course(id) => id.to_string(),
                GiftItem::Program(program) => program.clone(),
                GiftItem::MembershipMonths { tier, .. } => tier.to_string(),
            },
        }
    }

    /// Product the payer gains access to once the payment succeeds.
    ///
    /// Extensions modify an existing enrollment and gifts grant nothing to
    /// the buyer, so both return `None`.
    pub fn granted_product(&self) -> Option<ProductRef> {
        match self {
            PurchaseContext::Course { course_id, .. } => {
                Some(ProductRef::Course(course_id.clone()))
            }
            PurchaseContext::Program { program, .. } => Some(ProductRef::Program(program.clone())),
            PurchaseContext::Membership { tier, .. } => Some(ProductRef::Membership(*tier)),
            PurchaseContext::Extension { .. } | PurchaseContext::Gift { .. } => None,
        }
    }

    /// Encodes the context as processor metadata.
    pub fn to_metadata(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(PURCHASE_TYPE_KEY.to_string(), self.purchase_type().to_string());
        map.insert(USER_ID_KEY.to_string(), self.user_id().to_string());

        match self {
            PurchaseContext::Course { course_id, .. } => {
                map.insert(COURSE_ID_KEY.to_string(), course_id.to_string());
            }
            PurchaseContext::Program {
                program,
                installment,
                ..
            } => {
                map.insert(PROGRAM_TYPE_KEY.to_string(), program.clone());
                if let Some(inst) = installment {
                    map.insert(INSTALLMENT_NUMBER_KEY.to_string(), inst.number.to_string());
                    map.insert(INSTALLMENT_COUNT_KEY.to_string(), inst.count.to_string());
                    if let Some(plan) = inst.plan {
                        map.insert(INSTALLMENT_PLAN_KEY.to_string(), plan.to_string());
                    }
                }
            }
            PurchaseContext::Extension {
                enrollment_id,
                days,
                ..
            } => {
                map.insert(ENROLLMENT_ID_KEY.to_string(), enrollment_id.to_string());
                map.insert(EXTENSION_DAYS_KEY.to_string(), days.to_string());
            }
            PurchaseContext::Membership { tier, .. } => {
                map.insert(TIER_KEY.to_string(), tier.to_string());
            }
            PurchaseContext::Gift {
                recipient_email,
                item,
                ..
            } => {
                map.insert(RECIPIENT_EMAIL_KEY.to_string(), recipient_email.clone());
                match item {
                    GiftItem::Course(id) => {
                        map.insert(GIFT_KIND_KEY.to_string(), "course".to_string());
                        map.insert(GIFT_PRODUCT_KEY.to_string(), id.to_string());
                    }
                    GiftItem::Program(program) => {
                        map.insert(GIFT_KIND_KEY.to_string(), "program".to_string());
                        map.insert(GIFT_PRODUCT_KEY.to_string(), program.clone());
                    }
                    GiftItem::MembershipMonths { tier, months } => {
                        map.insert(GIFT_KIND_KEY.to_string(), "membership".to_string());
                        map.insert(GIFT_PRODUCT_KEY.to_string(), tier.to_string());
                        map.insert(GIFT_MONTHS_KEY.to_string(), months.to_string());
                    }
                }
            }
        }
        map
    }

    /// Decodes processor metadata. Unknown keys are ignored.
    pub fn from_metadata(map: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let purchase_type = required(map, PURCHASE_TYPE_KEY)?;
        let user_id = UserId::new(required(map, USER_ID_KEY)?)?;

        match purchase_type {
            "course_purchase" => Ok(PurchaseContext::Course {
                user_id,
                course_id: CourseId::new(required(map, COURSE_ID_KEY)?)?,
            }),
            "program_purchase" => {
                let installment = match map.get(INSTALLMENT_NUMBER_KEY) {
                    None => None,
                    Some(number) => Some(Installment {
                        number: parse(INSTALLMENT_NUMBER_KEY, number)?,
                        count: parse(INSTALLMENT_COUNT_KEY, required(map, INSTALLMENT_COUNT_KEY)?)?,
                        plan: map
                            .get(INSTALLMENT_PLAN_KEY)
                            .map(|plan| parse(INSTALLMENT_PLAN_KEY, plan))
                            .transpose()?,
                    }),
                };
                Ok(PurchaseContext::Program {
                    user_id,
                    program: required(map, PROGRAM_TYPE_KEY)?.to_string(),
                    installment,
                })
            }
            "enrollment_extension" => Ok(PurchaseContext::Extension {
                user_id,
                enrollment_id: parse(ENROLLMENT_ID_KEY, required(map, ENROLLMENT_ID_KEY)?)?,
                days: parse(EXTENSION_DAYS_KEY, required(map, EXTENSION_DAYS_KEY)?)?,
            }),
            "membership_purchase" => Ok(PurchaseContext::Membership {
                user_id,
                tier: required(map, TIER_KEY)?.parse()?,
            }),
            "gift_purchase" => {
                let product = required(map, GIFT_PRODUCT_KEY)?;
                let item = match required(map, GIFT_KIND_KEY)? {
                    "course" => GiftItem::Course(CourseId::new(product)?),
                    "program" => GiftItem::Program(product.to_string()),
                    "membership" => GiftItem::MembershipMonths {
                        tier: product.parse()?,
                        months: parse(GIFT_MONTHS_KEY, required(map, GIFT_MONTHS_KEY)?)?,
                    },
                    other => {
                        return Err(ValidationError::invalid_format(
                            GIFT_KIND_KEY,
                            format!("unknown gift kind '{}'", other),
                        ))
                    }
                };
                Ok(PurchaseContext::Gift {
                    purchaser_id: user_id,
                    recipient_email: required(map, RECIPIENT_EMAIL_KEY)?.to_string(),
                    item,
                })
            }
            other => Err(ValidationError::invalid_format(
                PURCHASE_TYPE_KEY,
                format!("unknown purchase type '{}'", other),
            )),
        }
    }
}

fn required<'a>(
    map: &'a HashMap<String, String>,
    key: &'static str,
) -> Result<&'a str, ValidationError> {
    map.get(key)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ValidationError::empty_field(key))
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ValidationError> {
    value
        .parse()
        .map_err(|_| ValidationError::invalid_format(key, format!("cannot parse '{}'", value)))
}
