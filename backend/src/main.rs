use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use std::env;
use std::sync::Arc;

use plantify_backend::account::{InMemoryTokenStore, TokenStore};
use plantify_backend::config::AppConfig;
use plantify_backend::inference::config::PreprocessingConfig;
use plantify_backend::inference::normalizer::Normalizer;
use plantify_backend::inference::staging::StagingArea;
use plantify_backend::inference::{ModelRegistry, Pipeline, StartupError, registry};
use plantify_backend::routes::{UploadLimit, configure_routes};

fn startup_failure(e: StartupError) -> std::io::Error {
    log::error!("Startup failed: {}", e);
    std::io::Error::other(format!("Startup failed: {}", e))
}

fn build_pipeline(config: &AppConfig) -> Result<Pipeline, StartupError> {
    let preprocessing = PreprocessingConfig::load(config.preprocessing_config.as_deref())?;
    registry::install(ModelRegistry::load(config, &preprocessing)?)?;
    let registry = registry::handle().ok_or(StartupError::NotLoaded)?;
    log::info!(
        "Model ready: input {:?}, {} classes",
        registry.model().input_shape(),
        registry.labels().len()
    );

    let staging = StagingArea::from_dir(config.staging_dir.clone());
    match staging.dir() {
        Some(dir) => log::info!("Staging uploads under {}", dir.display()),
        None => log::info!("Staging uploads in memory"),
    }

    Pipeline::new(registry, Normalizer::new(preprocessing), staging)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env().map_err(|e| startup_failure(e.into()))?;
    let pipeline = web::Data::new(build_pipeline(&config).map_err(startup_failure)?);
    let upload_limit = web::Data::new(UploadLimit(config.max_upload_bytes));
    // Empty until an account service is wired in; resets answer "Invalid token".
    let token_store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
    let token_store = web::Data::from(token_store);

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(pipeline.clone())
            .app_data(upload_limit.clone())
            .app_data(token_store.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
