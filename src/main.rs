use std::sync::Arc;

use onebox::classify::Classifier;
use onebox::config::AppConfig;
use onebox::llm::{LlmConfig, create_model};
use onebox::mail::imap::ImapConnector;
use onebox::notify::Notifier;
use onebox::store::{ElasticStore, EmailStore, MemoryStore};
use onebox::suggest::Suggester;
use onebox::sync::SyncSupervisor;
use onebox::vector::{KnowledgeSearch, PineconeIndex, Unconfigured};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    // ── Generative oracle ────────────────────────────────────────────
    let Some(api_key) = config.gemini_api_key.clone() else {
        eprintln!("Error: GEMINI_API_KEY not set");
        std::process::exit(1);
    };
    let oracle = create_model(&LlmConfig {
        api_key,
        model: config.gemini_model.clone(),
    });

    // ── Vector store ─────────────────────────────────────────────────
    let knowledge: Arc<dyn KnowledgeSearch> =
        match (&config.pinecone_api_key, &config.pinecone_host) {
            (Some(key), Some(host)) => Arc::new(PineconeIndex::new(
                key.clone(),
                host,
                &config.pinecone_namespace,
            )),
            _ => {
                eprintln!("   Vector store: disabled (suggestions will be empty)");
                Arc::new(Unconfigured)
            }
        };

    // One-shot seeding mode, then exit.
    if std::env::args().any(|a| a == "--seed-kb") {
        onebox::kb::seed(knowledge.as_ref()).await?;
        return Ok(());
    }

    // ── Indexing sink ────────────────────────────────────────────────
    let store: Arc<dyn EmailStore> = match &config.es_url {
        Some(url) => {
            let es = ElasticStore::new(url, &config.es_index);
            if es.ping().await {
                eprintln!("   Elasticsearch: {} (index: {})", url, config.es_index);
            } else {
                eprintln!("   Elasticsearch unavailable, continuing without ES");
            }
            // Idempotent; an unreachable cluster is logged, not fatal.
            if let Err(e) = es.ensure_index().await {
                tracing::warn!(error = %e, "Index check skipped");
            }
            Arc::new(es)
        }
        None => {
            eprintln!("   Elasticsearch: disabled (in-memory store)");
            Arc::new(MemoryStore::new())
        }
    };

    let classifier = Arc::new(Classifier::new(oracle.clone()));
    let suggester = Arc::new(Suggester::new(knowledge, oracle));
    let notifier = Arc::new(Notifier::new(
        config.slack_webhook_url.clone(),
        config.automation_webhook_url.clone(),
    ));

    eprintln!("📬 onebox v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.gemini_model);
    eprintln!("   Accounts: {}", config.accounts.len());
    eprintln!("   API: http://0.0.0.0:{}/api/emails", config.http_port);

    // ── HTTP surface ─────────────────────────────────────────────────
    let app = onebox::http::routes(Arc::clone(&store), suggester);
    let http_port = config.http_port;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{http_port}"))
            .await
            .expect("Failed to bind HTTP port");
        tracing::info!(port = http_port, "HTTP server started");
        axum::serve(listener, app).await.ok();
    });

    // ── Account sync ─────────────────────────────────────────────────
    let supervisor = SyncSupervisor::new(
        config.accounts,
        config.sync,
        Arc::new(ImapConnector),
        classifier,
        store,
        notifier,
    );
    let sync_handle = supervisor.spawn_all();

    tokio::signal::ctrl_c().await?;
    eprintln!("Shutting down…");
    sync_handle.shutdown().await;

    Ok(())
}
