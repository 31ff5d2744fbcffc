use async_trait::async_trait;

use super::Mailer;

/// Stand-in mailer for deployments without outbound mail; logs the
/// delivery and reports success.
pub struct SimulatedMailer;

#[async_trait]
impl Mailer for SimulatedMailer {
    async fn send_intake_form(&self, to: &str, patient_name: &str) -> anyhow::Result<()> {
        tracing::info!(to = %to, patient = %patient_name, "intake form delivery simulated");
        Ok(())
    }
}
