use super::processor::{
    GatewayDecline, GatewayReceipt, GatewayResult, PaymentProcessor, VaultReceipt,
};
use crate::config::{AuthorizeNetConfig, PaymentConfig};
use crate::models::BillingInfo;
use crate::utils::money::format_cents;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

// Authorize.Net 按 XML schema 校验字段顺序，请求体必须用结构体按顺序序列化

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MerchantAuthentication<'a> {
    name: &'a str,
    transaction_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BillTo {
    first_name: String,
    last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    company: Option<String>,
    address: String,
    city: String,
    state: String,
    zip: String,
    country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<String>,
}

impl From<&BillingInfo> for BillTo {
    fn from(b: &BillingInfo) -> Self {
        let address = if b.address.address2.is_empty() {
            b.address.address1.clone()
        } else {
            format!("{} {}", b.address.address1, b.address.address2)
        };
        Self {
            first_name: b.first_name.clone(),
            last_name: b.last_name.clone(),
            company: b.company.clone(),
            address,
            city: b.address.city.clone(),
            state: b.address.region.clone(),
            zip: b.address.postal_code.clone(),
            country: b.address.country.clone(),
            phone_number: b.phone.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreditCard {
    card_number: String,
    expiration_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    card_code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OpaqueData {
    data_descriptor: &'static str,
    data_value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Payment {
    #[serde(skip_serializing_if = "Option::is_none")]
    credit_card: Option<CreditCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    opaque_data: Option<OpaqueData>,
}

impl Payment {
    fn from_billing(b: &BillingInfo) -> Option<Self> {
        if let Some(token) = b.payment_token.as_ref().filter(|t| !t.is_empty()) {
            return Some(Self {
                credit_card: None,
                opaque_data: Some(OpaqueData {
                    data_descriptor: "COMMON.ACCEPT.INAPP.PAYMENT",
                    data_value: token.clone(),
                }),
            });
        }
        b.card.as_ref().map(|card| Self {
            credit_card: Some(CreditCard {
                card_number: card.digits(),
                expiration_date: card.expiration(),
                card_code: Some(card.cvv.clone()),
            }),
            opaque_data: None,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentProfile {
    customer_type: &'static str,
    bill_to: BillTo,
    payment: Payment,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerProfile {
    description: String,
    email: String,
    payment_profiles: PaymentProfile,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerProfile<'a> {
    merchant_authentication: MerchantAuthentication<'a>,
    profile: CustomerProfile,
    validation_mode: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerPaymentProfile<'a> {
    merchant_authentication: MerchantAuthentication<'a>,
    customer_profile_id: String,
    payment_profile: PaymentProfile,
    validation_mode: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentProfileRef {
    payment_profile_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRef {
    customer_profile_id: String,
    payment_profile: PaymentProfileRef,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct TransactionRequest {
    transaction_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment: Option<Payment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<ProfileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_trans_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bill_to: Option<BillTo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransaction<'a> {
    merchant_authentication: MerchantAuthentication<'a>,
    transaction_request: TransactionRequest,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetTransactionDetails<'a> {
    merchant_authentication: MerchantAuthentication<'a>,
    trans_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Interval {
    length: u32,
    unit: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentSchedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<Interval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    total_occurrences: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArbProfile {
    customer_profile_id: String,
    customer_payment_profile_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArbSubscription {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    payment_schedule: PaymentSchedule,
    amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<ArbProfile>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArbCreateSubscription<'a> {
    merchant_authentication: MerchantAuthentication<'a>,
    subscription: ArbSubscription,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArbUpdateSubscription<'a> {
    merchant_authentication: MerchantAuthentication<'a>,
    subscription_id: String,
    subscription: ArbSubscription,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArbSubscriptionRef<'a> {
    merchant_authentication: MerchantAuthentication<'a>,
    subscription_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Paging {
    limit: u32,
    offset: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArbGetSubscriptionList<'a> {
    merchant_authentication: MerchantAuthentication<'a>,
    search_type: &'static str,
    paging: Paging,
}

/// Vault id stored on the order: `<customerProfileId>/<paymentProfileId>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProfileId {
    pub profile: String,
    pub payment_profile: String,
}

impl ProfileId {
    pub(crate) fn parse(s: &str) -> Option<Self> {
        let (profile, payment_profile) = s.split_once('/')?;
        if profile.is_empty() || payment_profile.is_empty() {
            return None;
        }
        Some(Self {
            profile: profile.to_string(),
            payment_profile: payment_profile.to_string(),
        })
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.profile, self.payment_profile)
    }
}

fn id_string(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `Ok(())` when `messages.resultCode` is `Ok`, otherwise the first message text.
pub(crate) fn result_message(body: &Value) -> Result<(), String> {
    let messages = body.get("messages");
    let ok = messages
        .and_then(|m| m.get("resultCode"))
        .and_then(Value::as_str)
        == Some("Ok");
    if ok {
        return Ok(());
    }
    Err(messages
        .and_then(|m| m.get("message"))
        .and_then(|m| m.get(0))
        .and_then(|m| m.get("text"))
        .and_then(Value::as_str)
        .unwrap_or("The payment gateway rejected the request")
        .to_string())
}

/// Approved transactions have `responseCode` 1.
pub(crate) fn transaction_outcome(body: Value) -> GatewayResult<GatewayReceipt> {
    let tr = body.get("transactionResponse");
    let approved = tr
        .and_then(|t| t.get("responseCode"))
        .and_then(Value::as_str)
        == Some("1");
    let trans_id = id_string(tr.and_then(|t| t.get("transId"))).filter(|id| id != "0");

    if approved {
        if let Some(reference_id) = trans_id {
            return Ok(GatewayReceipt {
                reference_id,
                raw: body,
            });
        }
    }

    let message = tr
        .and_then(|t| t.get("errors"))
        .and_then(|e| e.get(0))
        .and_then(|e| e.get("errorText"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| result_message(&body).err())
        .unwrap_or_else(|| "The transaction was declined".to_string());
    Err(GatewayDecline::declined(message, Some(body)))
}

/// Authorize.Net adapter over the JSON API. Card-first: the card is vaulted
/// as a customer payment profile and charged through it.
#[derive(Clone)]
pub struct AuthorizeNetProcessor {
    client: Client,
    config: AuthorizeNetConfig,
    timeout: Duration,
    allow_prerenewal: bool,
}

impl AuthorizeNetProcessor {
    pub fn new(config: AuthorizeNetConfig, payment: &PaymentConfig, allow_prerenewal: bool) -> Self {
        Self {
            client: Client::new(),
            config,
            timeout: Duration::from_secs(payment.timeout_secs),
            allow_prerenewal,
        }
    }

    fn auth(&self) -> MerchantAuthentication<'_> {
        MerchantAuthentication {
            name: &self.config.api_login_id,
            transaction_key: &self.config.transaction_key,
        }
    }

    /// Posts `{ "<name>": payload }` and returns the decoded answer.
    async fn call<T: Serialize + Sync>(&self, name: &str, payload: &T) -> GatewayResult<Value> {
        let mut envelope = BTreeMap::new();
        envelope.insert(name, payload);

        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(self.timeout)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                log::error!("Authorize.Net {name} failed: {e}");
                GatewayDecline::from_transport(e)
            })?;

        if response.status().is_server_error() {
            return Err(GatewayDecline::unavailable(format!(
                "Authorize.Net returned {}",
                response.status()
            )));
        }
        let text = response
            .text()
            .await
            .map_err(GatewayDecline::from_transport)?;
        // 响应带 UTF-8 BOM
        serde_json::from_str(text.trim_start_matches('\u{feff}')).map_err(|e| {
            GatewayDecline::unavailable(format!("invalid Authorize.Net response: {e}"))
        })
    }

    /// Like `call` but also requires `resultCode == Ok`.
    async fn call_ok<T: Serialize + Sync>(&self, name: &str, payload: &T) -> GatewayResult<Value> {
        let body = self.call(name, payload).await?;
        match result_message(&body) {
            Ok(()) => Ok(body),
            Err(message) => {
                log::warn!("Authorize.Net {name} rejected: {message}");
                Err(GatewayDecline::declined(message, Some(body)))
            }
        }
    }

    async fn transact(&self, request: TransactionRequest) -> GatewayResult<GatewayReceipt> {
        let payload = CreateTransaction {
            merchant_authentication: self.auth(),
            transaction_request: request,
        };
        let body = self.call("createTransactionRequest", &payload).await?;
        let outcome = transaction_outcome(body);
        if let Err(d) = &outcome {
            log::warn!("Authorize.Net transaction declined: {}", d.message);
        }
        outcome
    }

    fn payment_profile(billing: &BillingInfo) -> GatewayResult<PaymentProfile> {
        let payment = Payment::from_billing(billing)
            .ok_or_else(|| GatewayDecline::declined("No card or token provided", None))?;
        Ok(PaymentProfile {
            customer_type: "individual",
            bill_to: BillTo::from(billing),
            payment,
        })
    }

    async fn add_payment_profile(
        &self,
        existing: &ProfileId,
        billing: &BillingInfo,
    ) -> GatewayResult<VaultReceipt> {
        let payload = CreateCustomerPaymentProfile {
            merchant_authentication: self.auth(),
            customer_profile_id: existing.profile.clone(),
            payment_profile: Self::payment_profile(billing)?,
            validation_mode: "none",
        };
        let raw = self
            .call_ok("createCustomerPaymentProfileRequest", &payload)
            .await?;
        let payment_profile = id_string(raw.get("customerPaymentProfileId")).ok_or_else(|| {
            GatewayDecline::unavailable("payment profile response without id")
        })?;
        Ok(VaultReceipt {
            customer_id: ProfileId {
                profile: existing.profile.clone(),
                payment_profile,
            }
            .to_string(),
            last_four: billing.last_four(),
            raw,
        })
    }

    /// Active subscription id billed to this customer profile, if any.
    async fn find_active_subscription(&self, profile: &ProfileId) -> GatewayResult<Option<String>> {
        let payload = ArbGetSubscriptionList {
            merchant_authentication: self.auth(),
            search_type: "subscriptionActive",
            paging: Paging {
                limit: 1000,
                offset: 1,
            },
        };
        let body = self.call_ok("ARBGetSubscriptionListRequest", &payload).await?;
        let found = body
            .get("subscriptionDetails")
            .and_then(Value::as_array)
            .and_then(|subs| {
                subs.iter().find(|s| {
                    id_string(s.get("customerProfileId")).as_deref() == Some(&profile.profile)
                })
            })
            .and_then(|s| id_string(s.get("id")));
        Ok(found)
    }

    /// Adds one billing cycle to an existing subscription at `price`.
    async fn extend_subscription(&self, subscription_id: &str, price: i64) -> GatewayResult<GatewayReceipt> {
        let current = self
            .call_ok(
                "ARBGetSubscriptionRequest",
                &ArbSubscriptionRef {
                    merchant_authentication: self.auth(),
                    subscription_id: subscription_id.to_string(),
                },
            )
            .await?;
        let occurrences = current
            .pointer("/subscription/paymentSchedule/totalOccurrences")
            .and_then(|v| id_string(Some(v)))
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);

        let payload = ArbUpdateSubscription {
            merchant_authentication: self.auth(),
            subscription_id: subscription_id.to_string(),
            subscription: ArbSubscription {
                name: None,
                payment_schedule: PaymentSchedule {
                    interval: None,
                    start_date: None,
                    total_occurrences: (occurrences.saturating_add(1)).min(9999).to_string(),
                },
                amount: format_cents(price),
                profile: None,
            },
        };
        let raw = self.call_ok("ARBUpdateSubscriptionRequest", &payload).await?;
        log::info!("Extended Authorize.Net subscription {subscription_id}");
        Ok(GatewayReceipt {
            reference_id: subscription_id.to_string(),
            raw,
        })
    }

    async fn cancel_one(&self, subscription_id: &str) -> bool {
        let payload = ArbSubscriptionRef {
            merchant_authentication: self.auth(),
            subscription_id: subscription_id.to_string(),
        };
        match self.call_ok("ARBCancelSubscriptionRequest", &payload).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Cancel subscription {subscription_id} failed: {}", e.message);
                false
            }
        }
    }
}

#[async_trait]
impl PaymentProcessor for AuthorizeNetProcessor {
    fn name(&self) -> &'static str {
        "authorize_net"
    }

    fn can_prerenew(&self) -> bool {
        true
    }

    async fn create_customer(
        &self,
        billing: &BillingInfo,
        customer_id: Option<String>,
    ) -> GatewayResult<VaultReceipt> {
        if let Some(existing) = customer_id.as_deref().and_then(ProfileId::parse) {
            match self.add_payment_profile(&existing, billing).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) => log::warn!(
                    "Updating Authorize.Net profile {existing} failed, creating new: {}",
                    e.message
                ),
            }
        }

        let payload = CreateCustomerProfile {
            merchant_authentication: self.auth(),
            profile: CustomerProfile {
                description: format!("Customer for {}", billing.email),
                email: billing.email.clone(),
                payment_profiles: Self::payment_profile(billing)?,
            },
            validation_mode: "none",
        };
        let raw = self.call_ok("createCustomerProfileRequest", &payload).await?;
        let profile = id_string(raw.get("customerProfileId"));
        let payment_profile = id_string(raw.pointer("/customerPaymentProfileIdList/0"));
        match (profile, payment_profile) {
            (Some(profile), Some(payment_profile)) => Ok(VaultReceipt {
                customer_id: ProfileId {
                    profile,
                    payment_profile,
                }
                .to_string(),
                last_four: billing.last_four(),
                raw,
            }),
            _ => Err(GatewayDecline::unavailable("customer profile response without ids")),
        }
    }

    async fn charge(
        &self,
        amount: i64,
        customer_id: Option<String>,
        payment_token: Option<String>,
    ) -> GatewayResult<GatewayReceipt> {
        let mut request = TransactionRequest {
            transaction_type: "authCaptureTransaction",
            amount: Some(format_cents(amount)),
            ..Default::default()
        };
        if let Some(id) = customer_id {
            let profile = ProfileId::parse(&id)
                .ok_or_else(|| GatewayDecline::declined("Malformed customer id", None))?;
            request.profile = Some(ProfileRef {
                customer_profile_id: profile.profile,
                payment_profile: PaymentProfileRef {
                    payment_profile_id: profile.payment_profile,
                },
            });
        } else if let Some(token) = payment_token {
            request.payment = Some(Payment {
                credit_card: None,
                opaque_data: Some(OpaqueData {
                    data_descriptor: "COMMON.ACCEPT.INAPP.PAYMENT",
                    data_value: token,
                }),
            });
        } else {
            return Err(GatewayDecline::declined(
                "No customer id or payment token provided",
                None,
            ));
        }
        self.transact(request).await
    }

    async fn submit_for_settlement(
        &self,
        amount: i64,
        billing: Option<BillingInfo>,
        reference_id: Option<String>,
    ) -> GatewayResult<GatewayReceipt> {
        if let Some(reference) = reference_id {
            return self
                .transact(TransactionRequest {
                    transaction_type: "priorAuthCaptureTransaction",
                    amount: Some(format_cents(amount)),
                    ref_trans_id: Some(reference),
                    ..Default::default()
                })
                .await;
        }
        let billing = billing
            .ok_or_else(|| GatewayDecline::declined("No reference or billing data provided", None))?;
        let payment = Payment::from_billing(&billing)
            .ok_or_else(|| GatewayDecline::declined("No card or token provided", None))?;
        self.transact(TransactionRequest {
            transaction_type: "authCaptureTransaction",
            amount: Some(format_cents(amount)),
            payment: Some(payment),
            bill_to: Some(BillTo::from(&billing)),
            ..Default::default()
        })
        .await
    }

    async fn refund(&self, reference_id: &str, amount: Option<i64>) -> GatewayResult<GatewayReceipt> {
        // 退款需要原交易的卡号后四位
        let details = self
            .call_ok(
                "getTransactionDetailsRequest",
                &GetTransactionDetails {
                    merchant_authentication: self.auth(),
                    trans_id: reference_id.to_string(),
                },
            )
            .await?;
        let card_number = details
            .pointer("/transaction/payment/creditCard/cardNumber")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayDecline::declined("Transaction could not be found", None))?
            .to_string();
        let settled = details
            .pointer("/transaction/settleAmount")
            .and_then(Value::as_f64)
            .map(|v| (v * 100.0).round() as i64);
        let amount = amount
            .or(settled)
            .ok_or_else(|| GatewayDecline::declined("Refund amount unknown", None))?;

        self.transact(TransactionRequest {
            transaction_type: "refundTransaction",
            amount: Some(format_cents(amount)),
            payment: Some(Payment {
                credit_card: Some(CreditCard {
                    card_number,
                    expiration_date: "XXXX".to_string(),
                    card_code: None,
                }),
                opaque_data: None,
            }),
            ref_trans_id: Some(reference_id.to_string()),
            ..Default::default()
        })
        .await
    }

    async fn void(&self, reference_id: &str) -> GatewayResult<GatewayReceipt> {
        self.transact(TransactionRequest {
            transaction_type: "voidTransaction",
            ref_trans_id: Some(reference_id.to_string()),
            ..Default::default()
        })
        .await
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        plan_id: &str,
        price: i64,
        start_date: Option<NaiveDate>,
    ) -> GatewayResult<GatewayReceipt> {
        let profile = ProfileId::parse(customer_id)
            .ok_or_else(|| GatewayDecline::declined("No matching customer found", None))?;

        if self.allow_prerenewal {
            if let Some(existing) = self.find_active_subscription(&profile).await? {
                return self.extend_subscription(&existing, price).await;
            }
        }

        let start = start_date.unwrap_or_else(|| Utc::now().date_naive());
        let payload = ArbCreateSubscription {
            merchant_authentication: self.auth(),
            subscription: ArbSubscription {
                name: Some(plan_id.chars().take(50).collect()),
                payment_schedule: PaymentSchedule {
                    interval: Some(Interval {
                        length: 1,
                        unit: "months",
                    }),
                    start_date: Some(start.format("%Y-%m-%d").to_string()),
                    total_occurrences: "9999".to_string(),
                },
                amount: format_cents(price),
                profile: Some(ArbProfile {
                    customer_profile_id: profile.profile,
                    customer_payment_profile_id: profile.payment_profile,
                }),
            },
        };
        let raw = self.call_ok("ARBCreateSubscriptionRequest", &payload).await?;
        let reference_id = id_string(raw.get("subscriptionId"))
            .ok_or_else(|| GatewayDecline::unavailable("subscription response without id"))?;
        Ok(GatewayReceipt { reference_id, raw })
    }

    async fn cancel_subscription(&self, subscription_or_customer_id: &str) -> bool {
        let Some(profile) = ProfileId::parse(subscription_or_customer_id) else {
            return self.cancel_one(subscription_or_customer_id).await;
        };
        match self.find_active_subscription(&profile).await {
            Ok(Some(id)) => self.cancel_one(&id).await,
            Ok(None) => false,
            Err(e) => {
                log::warn!("Listing subscriptions failed: {}", e.message);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::billing::tests::billing;
    use serde_json::json;

    #[test]
    fn profile_id_round_trip() {
        let id = ProfileId::parse("1234/5678").unwrap();
        assert_eq!(id.profile, "1234");
        assert_eq!(id.to_string(), "1234/5678");
        assert!(ProfileId::parse("1234").is_none());
        assert!(ProfileId::parse("/5678").is_none());
    }

    #[test]
    fn request_fields_keep_schema_order() {
        let payload = CreateTransaction {
            merchant_authentication: MerchantAuthentication {
                name: "login",
                transaction_key: "key",
            },
            transaction_request: TransactionRequest {
                transaction_type: "authCaptureTransaction",
                amount: Some("15.80".into()),
                profile: Some(ProfileRef {
                    customer_profile_id: "1".into(),
                    payment_profile: PaymentProfileRef {
                        payment_profile_id: "2".into(),
                    },
                }),
                ..Default::default()
            },
        };
        let text = serde_json::to_string(&payload).unwrap();
        let auth = text.find("merchantAuthentication").unwrap();
        let kind = text.find("transactionType").unwrap();
        let amount = text.find("\"amount\"").unwrap();
        let profile = text.find("\"profile\"").unwrap();
        assert!(auth < kind && kind < amount && amount < profile);
        assert!(!text.contains("refTransId"));
    }

    #[test]
    fn card_payment_uses_year_month_expiry() {
        let b = billing();
        let payment = Payment::from_billing(&b).unwrap();
        let card = payment.credit_card.unwrap();
        assert_eq!(card.card_number, "4242424242424242");
        assert_eq!(card.expiration_date.len(), 7);
    }

    #[test]
    fn approved_transaction() {
        let body = json!({
            "transactionResponse": {"responseCode": "1", "transId": "60012345678"},
            "messages": {"resultCode": "Ok", "message": [{"code": "I00001", "text": "Successful."}]}
        });
        assert_eq!(transaction_outcome(body).unwrap().reference_id, "60012345678");
    }

    #[test]
    fn declined_transaction_carries_error_text() {
        let body = json!({
            "transactionResponse": {
                "responseCode": "2",
                "transId": "0",
                "errors": [{"errorCode": "2", "errorText": "This transaction has been declined."}]
            },
            "messages": {"resultCode": "Error", "message": [{"code": "E00027", "text": "The transaction was unsuccessful."}]}
        });
        let decline = transaction_outcome(body).unwrap_err();
        assert_eq!(decline.message, "This transaction has been declined.");
    }

    #[test]
    fn result_message_reads_first_error() {
        let body = json!({"messages": {"resultCode": "Error", "message": [{"code": "E00039", "text": "A duplicate record already exists."}]}});
        assert_eq!(
            result_message(&body).unwrap_err(),
            "A duplicate record already exists."
        );
        assert!(result_message(&json!({"messages": {"resultCode": "Ok"}})).is_ok());
    }
}
