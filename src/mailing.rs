use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

/// Marketing-list collaborator. Implementations must be safe to call after
/// the owning transaction has committed; callers treat failures as
/// observability events only.
#[async_trait]
pub trait MailingList: Send + Sync {
    /// Upsert the member, subscribed or not according to consent.
    async fn sync(&self, email: &str, name: &str, subscribed: bool) -> anyhow::Result<()>;
}

/// Fire-and-forget sync after a successful user create/update. Errors are
/// logged and dropped; the primary operation has already committed.
pub fn sync_best_effort(list: Arc<dyn MailingList>, email: String, name: String, subscribed: bool) {
    tokio::spawn(async move {
        if let Err(e) = list.sync(&email, &name, subscribed).await {
            warn!(error = %e, email = %email, "mailing-list sync failed");
        }
    });
}

pub struct MailchimpList {
    http: reqwest::Client,
    api_key: String,
    list_id: String,
    datacenter: String,
}

impl MailchimpList {
    pub fn new(api_key: &str, list_id: &str) -> Self {
        // Keys look like "xxxx-us21"; the suffix is the API datacenter.
        let datacenter = api_key.rsplit('-').next().unwrap_or("us1").to_string();
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            list_id: list_id.to_string(),
            datacenter,
        }
    }

    fn member_url(&self, email: &str) -> String {
        format!(
            "https://{}.api.mailchimp.com/3.0/lists/{}/members/{}",
            self.datacenter,
            self.list_id,
            subscriber_hash(email)
        )
    }
}

#[async_trait]
impl MailingList for MailchimpList {
    async fn sync(&self, email: &str, name: &str, subscribed: bool) -> anyhow::Result<()> {
        let status = if subscribed { "subscribed" } else { "unsubscribed" };
        let body = json!({
            "email_address": email,
            "status_if_new": status,
            "status": status,
            "merge_fields": { "FNAME": name },
        });
        let res = self
            .http
            .put(self.member_url(email))
            .basic_auth("anystring", Some(&self.api_key))
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            anyhow::bail!("mailchimp responded {}", res.status());
        }
        debug!(email = %email, status, "mailchimp member synced");
        Ok(())
    }
}

/// Mailchimp identifies members by the md5 of the lowercased address.
fn subscriber_hash(email: &str) -> String {
    format!("{:x}", md5::compute(email.to_lowercase().as_bytes()))
}

/// No-op list used in development and tests.
pub struct NoopMailingList;

#[async_trait]
impl MailingList for NoopMailingList {
    async fn sync(&self, email: &str, _name: &str, subscribed: bool) -> anyhow::Result<()> {
        debug!(email = %email, subscribed, "mailing-list sync skipped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscriber_hash_lowercases_first() {
        assert_eq!(
            subscriber_hash("Ana@Example.com"),
            subscriber_hash("ana@example.com")
        );
    }

    #[test]
    fn datacenter_parsed_from_key_suffix() {
        let list = MailchimpList::new("0123abcd-us21", "list1");
        assert!(list.member_url("a@b.c").starts_with("https://us21.api.mailchimp.com/"));
    }

    struct FailingList(Arc<AtomicUsize>);

    #[async_trait]
    impl MailingList for FailingList {
        async fn sync(&self, _e: &str, _n: &str, _s: bool) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let list: Arc<dyn MailingList> = Arc::new(FailingList(calls.clone()));
        sync_best_effort(list, "a@b.c".into(), "Ana".into(), true);
        // Give the spawned task a chance to run; the failure must not panic
        // or surface anywhere.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
