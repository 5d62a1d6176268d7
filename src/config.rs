use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub zalopay: ZaloPayConfig,
}

/// Credentials and endpoints of the redirect payment gateway.
#[derive(Debug, Clone)]
pub struct ZaloPayConfig {
    pub app_id: i64,
    pub key1: String,
    pub key2: String,
    pub endpoint: String,
    pub callback_url: Option<String>,
    pub redirect_url: Option<String>,
    pub timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let jwt_ttl_hours = env::var("JWT_TTL_HOURS")
            .ok()
            .and_then(|h| h.parse::<i64>().ok())
            .unwrap_or(24);
        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            jwt_ttl_hours,
            zalopay: ZaloPayConfig::from_env(),
        })
    }
}

impl ZaloPayConfig {
    /// Sandbox defaults keep local development working without real credentials.
    pub fn from_env() -> Self {
        let app_id = env::var("ZALOPAY_APP_ID")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(2553);
        Self {
            app_id,
            key1: env::var("ZALOPAY_KEY1").unwrap_or_default(),
            key2: env::var("ZALOPAY_KEY2").unwrap_or_default(),
            endpoint: env::var("ZALOPAY_ENDPOINT")
                .unwrap_or_else(|_| "https://sb-openapi.zalopay.vn/v2".to_string()),
            callback_url: env::var("ZALOPAY_CALLBACK_URL").ok(),
            redirect_url: env::var("ZALOPAY_REDIRECT_URL").ok(),
            timeout_secs: env::var("GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10),
        }
    }
}
