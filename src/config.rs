use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub authorize_net: AuthorizeNetConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    #[default]
    Stripe,
    AuthorizeNet,
}

impl std::str::FromStr for ProcessorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(ProcessorKind::Stripe),
            "authorize_net" | "authorizenet" | "authnet" => Ok(ProcessorKind::AuthorizeNet),
            other => Err(format!("unknown payment processor: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default)]
    pub processor: ProcessorKind,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// 网关请求超时（秒），超时视为支付失败
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            processor: ProcessorKind::default(),
            currency: default_currency(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            api_base: default_stripe_api_base(),
        }
    }
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeNetConfig {
    pub api_login_id: String,
    pub transaction_key: String,
    #[serde(default = "default_authnet_endpoint")]
    pub endpoint: String,
}

impl Default for AuthorizeNetConfig {
    fn default() -> Self {
        Self {
            api_login_id: String::new(),
            transaction_key: String::new(),
            endpoint: default_authnet_endpoint(),
        }
    }
}

fn default_authnet_endpoint() -> String {
    "https://apitest.authorize.net/xml/v1/request.api".to_string()
}

/// A purchasable subscription plan, keyed by name in `checkout.subscriptions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionPlan {
    pub plan_id: String,
    pub description: String,
    /// 每期金额（美分）
    pub rate: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Tax rate for taxable custom items, in basis points (800 = 8%).
    #[serde(default)]
    pub tax_rate_bps: i64,
    #[serde(default)]
    pub shipping: i64,
    #[serde(default)]
    pub anonymous_checkout: bool,
    #[serde(default)]
    pub strict_subscription_items: bool,
    #[serde(default)]
    pub allow_prerenewal: bool,
    #[serde(default)]
    pub subscriptions: HashMap<String, SubscriptionPlan>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            tax_rate_bps: 0,
            shipping: 0,
            anonymous_checkout: false,
            strict_subscription_items: false,
            allow_prerenewal: false,
            subscriptions: HashMap::new(),
        }
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::parse(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // 数据库 URL 在无配置文件时必须提供
                let database_url = get_env("DATABASE_URL")
                    .ok_or("DATABASE_URL is not set and config.toml was not found")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT").unwrap_or(8080),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS").unwrap_or(10),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET")
                            .unwrap_or_else(|| "change-me-in-production".to_string()),
                    },
                    payment: PaymentConfig::default(),
                    stripe: StripeConfig::default(),
                    authorize_net: AuthorizeNetConfig::default(),
                    checkout: CheckoutConfig::default(),
                }
            }
            Err(e) => {
                return Err(format!("cannot read config file {config_path}: {e}").into());
            }
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn parse(config_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        toml::from_str(config_str).map_err(|e| format!("invalid config file: {e}").into())
    }

    // 环境变量覆盖（即便文件存在时也覆盖）
    fn apply_env_overrides(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(v) = get_env("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(p) = get_env_parse("SERVER_PORT") {
            self.server.port = p;
        }
        if let Some(v) = get_env("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(mc) = get_env_parse("DB_MAX_CONNECTIONS") {
            self.database.max_connections = mc;
        }
        if let Some(v) = get_env("JWT_SECRET") {
            self.jwt.secret = v;
        }

        if let Some(v) = get_env("PAYMENT_PROCESSOR") {
            self.payment.processor = v.parse::<ProcessorKind>()?;
        }
        if let Some(v) = get_env("PAYMENT_CURRENCY") {
            self.payment.currency = v;
        }
        if let Some(n) = get_env_parse("PAYMENT_TIMEOUT_SECS") {
            self.payment.timeout_secs = n;
        }
        if let Some(v) = get_env("STRIPE_SECRET_KEY") {
            self.stripe.secret_key = v;
        }
        if let Some(v) = get_env("AUTHNET_API_LOGIN_ID") {
            self.authorize_net.api_login_id = v;
        }
        if let Some(v) = get_env("AUTHNET_TRANSACTION_KEY") {
            self.authorize_net.transaction_key = v;
        }
        if let Some(v) = get_env("AUTHNET_ENDPOINT") {
            self.authorize_net.endpoint = v;
        }

        // Checkout
        if let Some(n) = get_env_parse("CHECKOUT_TAX_RATE_BPS") {
            self.checkout.tax_rate_bps = n;
        }
        if let Some(n) = get_env_parse("CHECKOUT_SHIPPING") {
            self.checkout.shipping = n;
        }
        if let Some(b) = get_env_parse("CHECKOUT_ANONYMOUS") {
            self.checkout.anonymous_checkout = b;
        }
        if let Some(b) = get_env_parse("CHECKOUT_STRICT_SUBSCRIPTION_ITEMS") {
            self.checkout.strict_subscription_items = b;
        }
        if let Some(b) = get_env_parse("CHECKOUT_ALLOW_PRERENEWAL") {
            self.checkout.allow_prerenewal = b;
        }

        Ok(())
    }
}
