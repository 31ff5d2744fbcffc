use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::ai::LlmProvider;
use crate::services::notify::Mailer;
use crate::services::session::SessionRegistry;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub llm: Box<dyn LlmProvider>,
    pub mailer: Box<dyn Mailer>,
    pub sessions: SessionRegistry,
}
