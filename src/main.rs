use actix_cors::Cors;
use actix_web::{App, HttpServer};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use tally::auth::TokenService;
use tally::openapi::ApiDoc;
use tally::repo::Repo;
use tally::settings::AppConfig;
use tally::{config, AppState};

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable at least one of the `inmem-store` or `postgres-store` features");

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env()?;
    info!(bind = %cfg.bind_addr, port = cfg.port, "bootstrapping tally server");

    #[cfg(feature = "postgres-store")]
    let pg = {
        let url = cfg
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for postgres-store"))?;
        let repo = tally::repo::pg::PgRepo::connect(url, 5).await?;
        info!("using Postgres repository backend");
        repo
    };
    #[cfg(feature = "postgres-store")]
    let repo: Arc<dyn Repo> = Arc::new(pg.clone());

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo: Arc<dyn Repo> = {
        use tally::repo::inmem::InMemRepo;
        match &cfg.data_dir {
            Some(dir) => {
                info!(dir = %dir.display(), "using in-memory repository with snapshots");
                Arc::new(InMemRepo::with_snapshot_dir(dir)?)
            }
            None => {
                info!("using ephemeral in-memory repository");
                Arc::new(InMemRepo::new())
            }
        }
    };

    let state = AppState::new(repo, TokenService::new(cfg.jwt_secret.as_bytes()))
        .with_password_cost(cfg.bcrypt_cost);
    let openapi = ApiDoc::openapi();
    let origins = cfg.cors_allowed_origins.clone();

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .max_age(3600);
            if origins.is_empty() {
                c = c.allow_any_origin();
            }
            for origin in &origins {
                c = c.allowed_origin(origin);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(cors)
            .app_data(actix_web::web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))?;

    info!("listening on http://{}:{}", cfg.bind_addr, cfg.port);
    server.run().await?;

    #[cfg(feature = "postgres-store")]
    pg.close().await;

    info!("server stopped");
    Ok(())
}
