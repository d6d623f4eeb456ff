use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Инициализация логирования: env-filter поверх консольного слоя.
///
/// `default_filter` применяется, когда `RUST_LOG` не задан.
/// Повторный вызов в одном процессе вернёт ошибку от глобального
/// subscriber'а.
pub fn init_logging(
    default_filter: &str
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Logging system initialized"
    );

    Ok(())
}
