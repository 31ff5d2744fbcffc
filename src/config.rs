use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub llm_provider: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub ollama_url: String,
    pub mail_mode: String,
    pub mail_api_url: String,
    pub mail_api_key: String,
    pub mail_from: String,
    pub clinic_name: String,
    pub clinic_phone: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "frontdesk.db".to_string()),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string()),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            mail_mode: env::var("MAIL_MODE").unwrap_or_else(|_| "simulated".to_string()),
            mail_api_url: env::var("MAIL_API_URL").unwrap_or_default(),
            mail_api_key: env::var("MAIL_API_KEY").unwrap_or_default(),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "appointments@healthcareplus.example".to_string()),
            clinic_name: env::var("CLINIC_NAME")
                .unwrap_or_else(|_| "HealthCare Plus Medical Center".to_string()),
            clinic_phone: env::var("CLINIC_PHONE")
                .unwrap_or_else(|_| "(555) 123-4567".to_string()),
        }
    }
}
