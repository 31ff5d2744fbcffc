use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use frontdesk::config::AppConfig;
use frontdesk::db;
use frontdesk::handlers;
use frontdesk::services::ai::groq::GroqProvider;
use frontdesk::services::ai::ollama::OllamaProvider;
use frontdesk::services::ai::LlmProvider;
use frontdesk::services::notify::http::HttpMailer;
use frontdesk::services::notify::simulated::SimulatedMailer;
use frontdesk::services::notify::Mailer;
use frontdesk::services::scheduling;
use frontdesk::services::session::SessionRegistry;
use frontdesk::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    let seeded = scheduling::ensure_schedule_horizon(&conn, Utc::now().date_naive())?;
    tracing::info!(slots = seeded, "availability horizon ensured");

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(
                !config.groq_api_key.is_empty(),
                "GROQ_API_KEY must be set when LLM_PROVIDER=groq"
            );
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Box::new(GroqProvider::new(
                config.groq_api_key.clone(),
                config.groq_model.clone(),
            ))
        }
        _ => {
            tracing::info!("using Ollama LLM provider (url: {})", config.ollama_url);
            Box::new(OllamaProvider::new(
                config.ollama_url.clone(),
                "llama3.2".to_string(),
            ))
        }
    };

    let mailer: Box<dyn Mailer> = match config.mail_mode.as_str() {
        "http" => {
            anyhow::ensure!(
                !config.mail_api_url.is_empty(),
                "MAIL_API_URL must be set when MAIL_MODE=http"
            );
            tracing::info!("using HTTP mail provider (url: {})", config.mail_api_url);
            Box::new(HttpMailer::new(
                config.mail_api_url.clone(),
                config.mail_api_key.clone(),
                config.mail_from.clone(),
                config.clinic_name.clone(),
            ))
        }
        _ => {
            tracing::info!("using simulated mail provider");
            Box::new(SimulatedMailer)
        }
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        llm,
        mailer,
        sessions: SessionRegistry::new(),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/chat/message", post(handlers::chat::send_message))
        .route("/api/chat/reset", post(handlers::chat::reset))
        .route("/api/chat/state/:session_id", get(handlers::chat::get_state))
        .route(
            "/api/admin/appointments",
            get(handlers::admin::get_appointments),
        )
        .route(
            "/api/admin/appointments/:id/cancel",
            post(handlers::admin::cancel_appointment),
        )
        .route("/api/admin/stats", get(handlers::admin::get_stats))
        .route("/api/admin/schedule", get(handlers::admin::get_schedule))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
