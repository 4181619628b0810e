use async_trait::async_trait;
use tracing::info;

/// Outbound email collaborator. Delivery is external to this service; the
/// core only needs these two messages, both sent best-effort.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, email: &str, name: &str, url: &str) -> anyhow::Result<()>;
    async fn send_password_reset(&self, email: &str, name: &str, url: &str) -> anyhow::Result<()>;
}

/// Default mailer: writes the message to the log instead of delivering it.
/// Deployments wire a real transport behind the same trait.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, email: &str, name: &str, url: &str) -> anyhow::Result<()> {
        info!(email = %email, name = %name, url = %url, "verification email");
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, name: &str, url: &str) -> anyhow::Result<()> {
        info!(email = %email, name = %name, url = %url, "password reset email");
        Ok(())
    }
}
