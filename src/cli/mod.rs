use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// API key for the Gemini API. When empty the chat endpoint answers with an error.
    #[arg(long, env = "GOOGLE_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gemini-2.0-flash-001)
    #[arg(long, env = "CHAT_MODEL", default_value = "gemini-2.0-flash-001")]
    pub chat_model: String,

    /// Root URL of the Gemini API.
    #[arg(long, env = "CHAT_BASE_URL", default_value = "https://generativelanguage.googleapis.com")]
    pub chat_base_url: String,

    /// Sampling temperature passed to the model.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub chat_temperature: f32,

    /// Optional JSON file overriding the system prompt and fallback replies.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- History Store Args ---
    /// Maximum number of conversations kept in memory.
    #[arg(long, env = "HISTORY_MAX_CONVERSATIONS", default_value = "100")]
    pub history_max_conversations: usize,

    /// Idle time in seconds after which a conversation is dropped.
    #[arg(long, env = "HISTORY_TTL_SECS", default_value = "86400")] // 24 hours
    pub history_ttl_secs: u64,

    // --- Upload Args ---
    /// Directory where uploaded files are stored.
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: String,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "10485760")] // 10MB
    pub max_upload_bytes: u64,

    // --- PDF Export Args ---
    /// Scratch directory for PDF conversion.
    #[arg(long, env = "TEMP_DIR", default_value = "temp")]
    pub temp_dir: String,

    /// Converter command line; the input and output arguments are appended.
    #[arg(long, env = "PDF_CONVERTER", default_value = "npx @marp-team/marp-cli")]
    pub pdf_converter: String,

    /// Wall-clock budget for one conversion, in seconds.
    #[arg(long, env = "PDF_TIMEOUT_SECS", default_value = "30")]
    pub pdf_timeout_secs: u64,

    // --- Presentation Args ---
    /// Author written into generated decks when the request names none.
    #[arg(long, env = "DEFAULT_AUTHOR", default_value = "Deck Agent")]
    pub default_author: String,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    pub fn api_key(&self) -> Option<String> {
        Some(self.chat_api_key.trim().to_string()).filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let args = Args::parse_from(["deck-agent"]);
        assert_eq!(args.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(args.history_max_conversations, 100);
        assert_eq!(args.history_ttl_secs, 24 * 60 * 60);
        assert_eq!(args.pdf_timeout_secs, 30);
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let args = Args::parse_from(["deck-agent", "--chat-api-key", "  "]);
        assert!(args.api_key().is_none());
        let args = Args::parse_from(["deck-agent", "--chat-api-key", "k"]);
        assert_eq!(args.api_key().as_deref(), Some("k"));
    }
}
