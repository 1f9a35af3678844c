// Main entry point for the crimewatch access runtime

use crimewatch_access::auth::access_gate::ProtectedView;
use crimewatch_access::config::Config;
use crimewatch_access::core::events::SessionSignal;
use crimewatch_access::crime::catalog::CrimeCatalog;
use crimewatch_access::infra::supabase::SupabaseClient;
use crimewatch_access::infra::supabase_auth::SupabaseAuthProvider;
use crimewatch_access::infra::supabase_store::{SupabaseRoleStore, SupabaseUserDirectory};
use crimewatch_access::runtime::AccessRuntime;
use crimewatch_access::state::role_cache::MokaRoleCache;

use anyhow::Context;
use secrecy::SecretString;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(&config).map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    info!(
        supabase_url = %config.supabase_url,
        site_url = %config.site_url,
        admin_listing = config.supabase_service_role_key.is_some(),
        "Starting crimewatch access runtime"
    );

    let client = Arc::new(SupabaseClient::from_config(&config)?);
    let provider = Arc::new(SupabaseAuthProvider::new(client.clone()));
    let role_store = Arc::new(SupabaseRoleStore::new(client.clone()));
    let cache = MokaRoleCache::new(config.role_cache_ttl_secs, config.role_cache_max_capacity);

    let mut runtime = AccessRuntime::new(provider, role_store, cache);

    let _listener = runtime.session().on_change(|notice| match notice.signal {
        Some(SessionSignal::SignedOut) => info!("Signed out; host should show the sign-in view"),
        Some(SessionSignal::RecoveryRequested) => {
            info!("Password recovery requested; host should show the reset view")
        }
        None => info!(
            principal_id = notice.session.principal_id(),
            "Session changed"
        ),
    });

    runtime.mount().await;

    if let Some(mut notices) = runtime.take_notices() {
        tokio::spawn(async move {
            while let Some(notice) = notices.recv().await {
                warn!(title = %notice.title, description = %notice.description, "Notice");
            }
        });
    }

    if let Some(ref path) = config.crime_catalog_path {
        match CrimeCatalog::from_file(path) {
            Ok(catalog) => info!(
                types = ?catalog.crime_types(),
                records = catalog.len(),
                "Crime catalog loaded"
            ),
            Err(e) => error!(error = %e, "Failed to load crime catalog"),
        }
    }

    if let (Ok(email), Ok(password)) = (
        std::env::var("CRIMEWATCH_EMAIL"),
        std::env::var("CRIMEWATCH_PASSWORD"),
    ) {
        let credentials = runtime.credentials(&config.site_url);
        match credentials.sign_in(&email, &SecretString::new(password)).await {
            Ok(notice) => {
                info!(title = %notice.title, "{}", notice.description);
                let mut session = runtime.session().watch();
                if session
                    .wait_for(|s| s.is_ready() && s.principal.is_some())
                    .await
                    .is_err()
                {
                    warn!("Session store closed before sign-in settled");
                }
            }
            Err(e) => error!(error = %e, "{}", e.user_message()),
        }
    }

    wait_for_roles(&runtime).await;
    for view in ProtectedView::ALL {
        info!(view = view.name(), decision = ?runtime.decide_view(view), "Access decision");
    }

    if runtime.can_view(ProtectedView::AdminPanel) {
        let directory = config.supabase_service_role_key.clone().map(|key| {
            Arc::new(SupabaseUserDirectory::new(client.clone(), key))
                as Arc<dyn crimewatch_access::api::UserDirectory>
        });
        match runtime.role_admin(directory).list_users().await {
            Ok(users) => info!(count = users.len(), "Directory users listed"),
            Err(e) => warn!(error = %e, "User listing unavailable"),
        }
    }

    shutdown_signal().await;

    if runtime.session().get_session().principal.is_some() {
        if let Err(e) = runtime.sign_out().await {
            warn!(error = %e, "Sign-out on shutdown did not reach the provider");
        }
    }
    runtime.unmount();

    info!("Shutdown complete");
    Ok(())
}

/// Wait until role resolution for the current principal has settled
async fn wait_for_roles(runtime: &AccessRuntime) {
    let principal_id = runtime.session().get_session().principal.map(|p| p.id);
    let mut granted = runtime.resolver().watch();
    let settled = granted
        .wait_for(|g| g.principal_id == principal_id && g.state.roles().is_some())
        .await
        .is_ok();
    if !settled {
        warn!("Role resolver closed before roles settled");
    }
}

/// Initialize tracing subscriber
fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let level = parse_log_level(&config.log_level)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

fn parse_log_level(level: &str) -> Result<tracing::Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(tracing::Level::TRACE),
        "debug" => Ok(tracing::Level::DEBUG),
        "info" => Ok(tracing::Level::INFO),
        "warn" => Ok(tracing::Level::WARN),
        "error" => Ok(tracing::Level::ERROR),
        _ => Err(format!("Invalid log level: {}", level)),
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, shutting down");
        },
        _ = terminate => {
            info!("SIGTERM received, shutting down");
        },
    }
}
