use super::processor::{
    DeclineKind, GatewayDecline, GatewayReceipt, GatewayResult, PaymentProcessor, VaultReceipt,
};
use crate::config::{PaymentConfig, StripeConfig};
use crate::models::{BillingInfo, CardDetails};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

/// Stripe adapter over the REST API (form-encoded requests, bearer auth).
/// Token-first: card details are exchanged for a token before vaulting.
#[derive(Clone)]
pub struct StripeProcessor {
    client: Client,
    config: StripeConfig,
    currency: String,
    timeout: Duration,
}

impl StripeProcessor {
    pub fn new(config: StripeConfig, payment: &PaymentConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            currency: payment.currency.clone(),
            timeout: Duration::from_secs(payment.timeout_secs),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<Value> {
        let response = request
            .bearer_auth(&self.config.secret_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                log::error!("Stripe request failed: {e}");
                GatewayDecline::from_transport(e)
            })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayDecline::unavailable(format!("invalid Stripe response: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }
        let message = stripe_error_message(&body);
        if status.is_server_error() {
            log::error!("Stripe returned {status}: {message}");
            return Err(GatewayDecline {
                kind: DeclineKind::Unavailable,
                message,
                raw: Some(body),
            });
        }
        log::warn!("Stripe declined ({status}): {message}");
        Err(GatewayDecline::declined(message, Some(body)))
    }

    async fn post(&self, path: &str, params: &[(String, String)]) -> GatewayResult<Value> {
        self.send(self.client.post(self.url(path)).form(params)).await
    }

    async fn create_token(&self, card: &CardDetails, billing: &BillingInfo) -> GatewayResult<Value> {
        self.post("/v1/tokens", &card_params(card, billing)).await
    }

    /// Token id plus last four digits for whatever payment source was given.
    async fn payment_source(&self, billing: &BillingInfo) -> GatewayResult<(String, Option<String>)> {
        if let Some(token) = billing.payment_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok((token.clone(), billing.last_four()));
        }
        let card = billing
            .card
            .as_ref()
            .ok_or_else(|| GatewayDecline::declined("No card or token provided", None))?;
        let token = self.create_token(card, billing).await?;
        let id = str_field(&token, "id")
            .ok_or_else(|| GatewayDecline::unavailable("Stripe token response without id"))?;
        let last_four = token
            .pointer("/card/last4")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| billing.last_four());
        Ok((id, last_four))
    }

    async fn cancel_one(&self, subscription_id: &str) -> bool {
        let request = self
            .client
            .delete(self.url(&format!("/v1/subscriptions/{subscription_id}")));
        match self.send(request).await {
            Ok(body) => str_field(&body, "status").as_deref() == Some("canceled"),
            Err(e) => {
                log::warn!("Cancel subscription {subscription_id} failed: {}", e.message);
                false
            }
        }
    }
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn stripe_error_message(body: &Value) -> String {
    let err = body.get("error");
    err.and_then(|e| e.get("message"))
        .or_else(|| err.and_then(|e| e.get("code")))
        .and_then(Value::as_str)
        .unwrap_or("An error occurred while processing the payment")
        .to_string()
}

pub(crate) fn card_params(card: &CardDetails, billing: &BillingInfo) -> Vec<(String, String)> {
    let addr = &billing.address;
    let mut params = vec![
        ("card[number]".to_string(), card.digits()),
        ("card[exp_month]".to_string(), card.exp_month.to_string()),
        ("card[exp_year]".to_string(), card.exp_year.to_string()),
        ("card[cvc]".to_string(), card.cvv.clone()),
        ("card[name]".to_string(), billing.full_name()),
        ("card[address_line1]".to_string(), addr.address1.clone()),
        ("card[address_city]".to_string(), addr.city.clone()),
        ("card[address_zip]".to_string(), addr.postal_code.clone()),
    ];
    for (key, value) in [
        ("card[address_line2]", &addr.address2),
        ("card[address_state]", &addr.region),
        ("card[address_country]", &addr.country),
    ] {
        if !value.is_empty() {
            params.push((key.to_string(), value.clone()));
        }
    }
    params
}

fn charge_receipt(body: Value) -> GatewayResult<GatewayReceipt> {
    let paid = body.get("paid").and_then(Value::as_bool).unwrap_or(false);
    match str_field(&body, "id") {
        Some(id) if paid => Ok(GatewayReceipt {
            reference_id: id,
            raw: body,
        }),
        _ => {
            let message = str_field(&body, "failure_message")
                .unwrap_or_else(|| "The charge was not paid".to_string());
            Err(GatewayDecline::declined(message, Some(body)))
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    fn name(&self) -> &'static str {
        "stripe"
    }

    fn can_prerenew(&self) -> bool {
        false
    }

    async fn create_customer(
        &self,
        billing: &BillingInfo,
        customer_id: Option<String>,
    ) -> GatewayResult<VaultReceipt> {
        let (source, last_four) = self.payment_source(billing).await?;

        if let Some(id) = customer_id {
            let params = [("source".to_string(), source.clone())];
            match self.post(&format!("/v1/customers/{id}"), &params).await {
                Ok(raw) => {
                    return Ok(VaultReceipt {
                        customer_id: id,
                        last_four,
                        raw,
                    });
                }
                // 旧客户不可用时重新创建
                Err(e) => log::warn!("Updating Stripe customer {id} failed, creating new: {}", e.message),
            }
        }

        let mut params = vec![
            ("email".to_string(), billing.email.clone()),
            ("name".to_string(), billing.full_name()),
            ("description".to_string(), format!("Customer for {}", billing.email)),
            ("source".to_string(), source),
        ];
        if let Some(phone) = &billing.phone {
            params.push(("phone".to_string(), phone.clone()));
        }
        let raw = self.post("/v1/customers", &params).await?;
        let customer_id = str_field(&raw, "id")
            .ok_or_else(|| GatewayDecline::unavailable("Stripe customer response without id"))?;
        Ok(VaultReceipt {
            customer_id,
            last_four,
            raw,
        })
    }

    async fn charge(
        &self,
        amount: i64,
        customer_id: Option<String>,
        payment_token: Option<String>,
    ) -> GatewayResult<GatewayReceipt> {
        let mut params = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), self.currency.clone()),
        ];
        match (customer_id, payment_token) {
            (Some(customer), _) => params.push(("customer".to_string(), customer)),
            (None, Some(token)) => params.push(("source".to_string(), token)),
            (None, None) => {
                return Err(GatewayDecline::declined(
                    "No customer id or payment token provided",
                    None,
                ));
            }
        }
        let body = self.post("/v1/charges", &params).await?;
        charge_receipt(body)
    }

    async fn submit_for_settlement(
        &self,
        amount: i64,
        billing: Option<BillingInfo>,
        reference_id: Option<String>,
    ) -> GatewayResult<GatewayReceipt> {
        if let Some(reference) = reference_id {
            let params = [("amount".to_string(), amount.to_string())];
            let body = self
                .post(&format!("/v1/charges/{reference}/capture"), &params)
                .await?;
            return charge_receipt(body);
        }
        let billing = billing
            .ok_or_else(|| GatewayDecline::declined("No reference or billing data provided", None))?;
        let (source, _) = self.payment_source(&billing).await?;
        self.charge(amount, None, Some(source)).await
    }

    async fn refund(&self, reference_id: &str, amount: Option<i64>) -> GatewayResult<GatewayReceipt> {
        let mut params = vec![("charge".to_string(), reference_id.to_string())];
        if let Some(amount) = amount {
            params.push(("amount".to_string(), amount.to_string()));
        }
        let raw = self.post("/v1/refunds", &params).await?;
        match str_field(&raw, "status").as_deref() {
            Some("failed") | Some("canceled") => {
                Err(GatewayDecline::declined("Refund was not accepted", Some(raw)))
            }
            _ => {
                let reference_id = str_field(&raw, "id").unwrap_or_else(|| reference_id.to_string());
                Ok(GatewayReceipt { reference_id, raw })
            }
        }
    }

    // Stripe 没有独立的 void，未结算的扣款退款即作废
    async fn void(&self, reference_id: &str) -> GatewayResult<GatewayReceipt> {
        self.refund(reference_id, None).await
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        plan_id: &str,
        price: i64,
        start_date: Option<NaiveDate>,
    ) -> GatewayResult<GatewayReceipt> {
        let mut params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("items[0][price]".to_string(), plan_id.to_string()),
            ("metadata[order_price]".to_string(), price.to_string()),
        ];
        if let Some(start) = start_date.and_then(|d| d.and_hms_opt(0, 0, 0)) {
            let ts = start.and_utc().timestamp();
            if ts > Utc::now().timestamp() {
                params.push(("trial_end".to_string(), ts.to_string()));
            }
        }
        let raw = self.post("/v1/subscriptions", &params).await?;
        let status = str_field(&raw, "status").unwrap_or_default();
        match str_field(&raw, "id") {
            Some(id) if status == "active" || status == "trialing" => Ok(GatewayReceipt {
                reference_id: id,
                raw,
            }),
            _ => Err(GatewayDecline::declined(
                format!("Subscription is {status}"),
                Some(raw),
            )),
        }
    }

    async fn cancel_subscription(&self, subscription_or_customer_id: &str) -> bool {
        if !subscription_or_customer_id.starts_with("cus_") {
            return self.cancel_one(subscription_or_customer_id).await;
        }

        let request = self.client.get(self.url("/v1/subscriptions")).query(&[
            ("customer", subscription_or_customer_id),
            ("status", "active"),
        ]);
        let list = match self.send(request).await {
            Ok(list) => list,
            Err(e) => {
                log::warn!("Listing subscriptions failed: {}", e.message);
                return false;
            }
        };
        let ids: Vec<String> = list
            .get("data")
            .and_then(Value::as_array)
            .map(|subs| subs.iter().filter_map(|s| str_field(s, "id")).collect())
            .unwrap_or_default();
        if ids.is_empty() {
            return false;
        }
        let mut all = true;
        for id in ids {
            all &= self.cancel_one(&id).await;
        }
        all
    }
}
