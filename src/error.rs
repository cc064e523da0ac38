use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Content blocked: sensitive content detected [{}]", .categories.join(", "))]
    ContentBlocked { categories: Vec<String> },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl GatewayError {
    // 重试判定：配置错误与内容拦截直接失败；上游错误按消息标记排除不可重试场景
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Config(_) | GatewayError::ContentBlocked { .. } => false,
            GatewayError::Provider(msg) => {
                let lower = msg.to_lowercase();
                !(lower.contains("quota exceeded")
                    || lower.contains("content filtered")
                    || lower.contains("content blocked"))
            }
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
