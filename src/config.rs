use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailchimpConfig {
    pub api_key: String,
    pub list_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    /// Base URL used to build verification / reset links in outbound email.
    pub base_url: String,
    pub environment: String,
    pub google_client_id: Option<String>,
    pub mailchimp: Option<MailchimpConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "ridehub".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "ridehub-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };
        let mailchimp = match (
            std::env::var("MAILCHIMP_API_KEY"),
            std::env::var("MAILCHIMP_LIST_ID"),
        ) {
            (Ok(api_key), Ok(list_id)) => Some(MailchimpConfig { api_key, list_id }),
            _ => None,
        };
        Ok(Self {
            database_url,
            jwt,
            base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            environment: std::env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            google_client_id: std::env::var("GOOGLE_CLIENT_ID").ok(),
            mailchimp,
        })
    }
}
