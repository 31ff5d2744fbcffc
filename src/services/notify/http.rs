use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::Mailer;

/// Delivers intake forms through a JSON mail API (any transactional mail
/// service with a POST-a-message endpoint works).
pub struct HttpMailer {
    api_url: String,
    api_key: String,
    from: String,
    clinic_name: String,
    client: reqwest::Client,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: String, from: String, clinic_name: String) -> Self {
        Self {
            api_url,
            api_key,
            from,
            clinic_name,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_intake_form(&self, to: &str, patient_name: &str) -> anyhow::Result<()> {
        let body = format!(
            "Dear {patient_name},\n\n\
             Welcome to {clinic}!\n\n\
             As a new patient, please find your intake form attached. To ensure a smooth visit:\n\
             - Complete the attached form\n\
             - Bring it to your appointment or submit it online\n\
             - Arrive 15 minutes early for check-in\n\
             - Bring a valid ID and insurance card\n\n\
             We look forward to seeing you!\n\n\
             {clinic} Team",
            clinic = self.clinic_name,
        );

        let payload = json!({
            "from": self.from,
            "to": to,
            "subject": format!("New Patient Intake Form - {patient_name}"),
            "text": body,
        });

        self.client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("failed to call mail API")?
            .error_for_status()
            .context("mail API returned error")?;

        Ok(())
    }
}
