pub mod http;
pub mod simulated;

use async_trait::async_trait;

/// Outbound delivery of the new-patient intake form. Implementations must
/// be safe to call in deployments without a mail transport; the router
/// treats an error as "tell the patient to contact the office", never as a
/// conversation abort.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_intake_form(&self, to: &str, patient_name: &str) -> anyhow::Result<()>;
}
