use crate::error::{AppError, AppResult};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Address {
    pub address1: String,
    #[serde(default)]
    pub address2: String,
    pub city: String,
    #[serde(default)]
    pub region: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2
    #[serde(default)]
    pub country: String,
}

impl Address {
    fn validate(&self, label: &str) -> AppResult<()> {
        if self.address1.trim().is_empty()
            || self.city.trim().is_empty()
            || self.postal_code.trim().is_empty()
        {
            return Err(AppError::ValidationError(format!(
                "{label} address requires address1, city and postal_code"
            )));
        }
        if !self.country.is_empty()
            && (self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(AppError::ValidationError(format!(
                "{label} country must be a two-letter code"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct CardDetails {
    pub number: String,
    pub exp_month: u32,
    pub exp_year: i32,
    pub cvv: String,
}

// 不输出卡号与 CVV
impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("last_four", &self.last_four())
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .finish()
    }
}

impl CardDetails {
    pub fn digits(&self) -> String {
        self.number.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    pub fn last_four(&self) -> String {
        let digits = self.digits();
        digits[digits.len().saturating_sub(4)..].to_string()
    }

    /// `YYYY-MM`
    pub fn expiration(&self) -> String {
        format!("{:04}-{:02}", self.exp_year, self.exp_month)
    }

    fn validate(&self) -> AppResult<()> {
        let digits = self.digits();
        if !(12..=19).contains(&digits.len()) {
            return Err(AppError::ValidationError("Invalid card number".into()));
        }
        if !(1..=12).contains(&self.exp_month) {
            return Err(AppError::ValidationError("Invalid expiration month".into()));
        }
        let today = Utc::now().date_naive();
        if (self.exp_year, self.exp_month) < (today.year(), today.month()) {
            return Err(AppError::ValidationError("Card has expired".into()));
        }
        if !(3..=4).contains(&self.cvv.len()) || !self.cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::ValidationError("Invalid card security code".into()));
        }
        Ok(())
    }
}

/// Billing data collected at checkout. Either a gateway-issued
/// `payment_token` or raw `card` details must be present.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BillingInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    pub address: Address,
    #[serde(default)]
    pub payment_token: Option<String>,
    #[serde(default)]
    pub card: Option<CardDetails>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
}

impl BillingInfo {
    pub fn validate(&self) -> AppResult<()> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(AppError::ValidationError(
                "First and last name are required".into(),
            ));
        }
        if !self.email.contains('@') {
            return Err(AppError::ValidationError("Invalid email address".into()));
        }
        self.address.validate("Billing")?;
        if let Some(shipping) = &self.shipping_address {
            shipping.validate("Shipping")?;
        }
        match (&self.payment_token, &self.card) {
            (Some(token), _) if !token.trim().is_empty() => Ok(()),
            (_, Some(card)) => card.validate(),
            _ => Err(AppError::ValidationError(
                "A payment token or card details are required".into(),
            )),
        }
    }

    pub fn last_four(&self) -> Option<String> {
        self.card.as_ref().map(CardDetails::last_four)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn billing() -> BillingInfo {
        BillingInfo {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            phone: None,
            company: None,
            address: Address {
                address1: "1 Analytical Way".into(),
                address2: String::new(),
                city: "London".into(),
                region: "LDN".into(),
                postal_code: "N1 9GU".into(),
                country: "GB".into(),
            },
            payment_token: None,
            card: Some(CardDetails {
                number: "4242 4242 4242 4242".into(),
                exp_month: 12,
                exp_year: Utc::now().year() + 2,
                cvv: "123".into(),
            }),
            shipping_address: None,
        }
    }

    #[test]
    fn valid_card_billing() {
        let b = billing();
        assert!(b.validate().is_ok());
        assert_eq!(b.last_four().as_deref(), Some("4242"));
    }

    #[test]
    fn token_without_card_is_enough() {
        let mut b = billing();
        b.card = None;
        b.payment_token = Some("tok_visa".into());
        assert!(b.validate().is_ok());
        assert_eq!(b.last_four(), None);
    }

    #[test]
    fn requires_payment_source() {
        let mut b = billing();
        b.card = None;
        assert!(matches!(b.validate(), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn rejects_expired_card() {
        let mut b = billing();
        if let Some(card) = b.card.as_mut() {
            card.exp_year = 2001;
        }
        assert!(b.validate().is_err());
    }

    #[test]
    fn debug_hides_card_number() {
        let b = billing();
        let printed = format!("{b:?}");
        assert!(!printed.contains("4242 4242"));
        assert!(!printed.contains("\"123\""));
    }
}
