pub mod api;
pub mod chat;
pub mod presentation;
pub mod upload;

use crate::agent::PresentationAgent;
use crate::cli::Args;
use crate::export::PdfConverter;
use crate::files::FileStore;
use crate::history::{ initialize_history_store, HistoryStore };
use crate::presentation::{ MarpitRenderer, SlideRenderer };

use axum::{ extract::DefaultBodyLimit, routing::{ get, post }, Router };
use log::{ error, info, warn };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{ Any, CorsLayer };

/// Multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    /// `None` when no model credential is configured.
    pub agent: Option<PresentationAgent>,
    pub history_store: Arc<dyn HistoryStore>,
    pub renderer: Arc<dyn SlideRenderer>,
    pub files: FileStore,
    pub pdf: PdfConverter,
    pub default_author: String,
}

impl AppState {
    pub fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let history_store = initialize_history_store(args)?;
        let files = FileStore::new(&args.upload_dir, args.max_upload_bytes);

        let agent = if args.api_key().is_some() {
            Some(PresentationAgent::new(args, history_store.clone(), files.clone())?)
        } else {
            warn!("GOOGLE_API_KEY is not set; /chat will answer with an error");
            None
        };

        Ok(Self {
            agent,
            history_store,
            renderer: Arc::new(MarpitRenderer::new()),
            files,
            pdf: PdfConverter::new(
                &args.pdf_converter,
                &args.temp_dir,
                Duration::from_secs(args.pdf_timeout_secs)
            ),
            default_author: args.default_author.clone(),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let upload_limit = usize
        ::try_from(state.files.max_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/chat", post(chat::chat_handler).get(api::chat_info))
        .route("/conversations", post(chat::create_conversation))
        .route("/conversations/{id}", get(chat::get_conversation))
        .route(
            "/presentation/generate",
            post(presentation::generate_handler).get(api::generate_info)
        )
        .route(
            "/upload",
            post(upload::upload_handler)
                .get(api::upload_info)
                .layer(DefaultBodyLimit::max(upload_limit))
        )
        .route("/convert-pdf", post(presentation::convert_pdf_handler))
        .layer(cors)
        .with_state(state)
}

pub struct Server {
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(state: AppState, args: Args) -> Self {
        Self { state, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.args.server_addr.parse::<SocketAddr>()?;
        let app = build_router(self.state.clone());

        if !self.args.enable_tls {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                e
            })?;
            info!("HTTP server listening on: http://{}", addr);
            axum::serve(listener, app.into_make_service()).await?;
            return Ok(());
        }

        match (&self.args.tls_cert_path, &self.args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
                let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                    cert_path,
                    key_path
                ).await?;
                info!("HTTPS server listening on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
                Ok(())
            }
            _ => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                Err("TLS enabled without cert/key".into())
            }
        }
    }
}
