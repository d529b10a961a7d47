//! Customer billing details collected before payment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// How a customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CreditCard,
    Paypal,
}

impl PaymentMethod {
    pub const CHOICES: [&'static str; 2] = ["credit_card", "paypal"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Paypal => "paypal",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "paypal" => Ok(PaymentMethod::Paypal),
            _ => Err(ValidationError::invalid_choice(
                "payment_method",
                &PaymentMethod::CHOICES,
            )),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw customer details as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetailsForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub zip: String,
}

/// Validated customer details. All fields are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub last_name: String,
    pub payment_method: PaymentMethod,
    /// ISO 3166-1 alpha-2, uppercased.
    pub country: String,
    pub zip: String,
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::empty_field(field));
    }
    Ok(value.to_string())
}

impl CustomerDetailsForm {
    pub fn validate(&self) -> Result<CustomerDetails, ValidationError> {
        let first_name = required("first_name", &self.first_name)?;
        let last_name = required("last_name", &self.last_name)?;
        let payment_method = required("payment_method", &self.payment_method)?.parse()?;

        let country = required("country", &self.country)?;
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "country",
                "expected a two-letter ISO country code",
            ));
        }

        let zip = required("zip", &self.zip)?;

        Ok(CustomerDetails {
            first_name,
            last_name,
            payment_method,
            country: country.to_ascii_uppercase(),
            zip,
        })
    }
}
