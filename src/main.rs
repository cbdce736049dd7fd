use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::{App, HttpServer, cookie::Key, middleware, web};
use std::sync::Arc;
use std::time::Duration;

use tripsync::config::Config;
use tripsync::consensus::{Engine, EngineSettings, scheduler};
use tripsync::db::{self, PgStore};
use tripsync::handlers;

/// Session encryption key: SESSION_KEY when it is long enough, otherwise a
/// random one (sessions are then lost on restart).
fn session_key(config: &Config) -> Key {
    match config.session_key.as_deref() {
        Some(val) if val.len() >= 64 => {
            log::info!("Using SESSION_KEY from environment");
            Key::from(val.as_bytes())
        }
        Some(val) => {
            log::warn!("SESSION_KEY too short ({} bytes, need 64+), generating random key", val.len());
            Key::generate()
        }
        None => {
            log::warn!("No SESSION_KEY set, generating random key (sessions lost on restart)");
            Key::generate()
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config = Config::from_env().map_err(std::io::Error::other)?;

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let engine = Arc::new(Engine::new(PgStore::new(pool), EngineSettings::from_config(&config)));

    if config.expiry_sweep_secs > 0 {
        scheduler::spawn_expiry_sweep(engine.clone(), Duration::from_secs(config.expiry_sweep_secs));
    } else {
        log::info!("Expiry sweep disabled, proposals expire lazily on read");
    }

    let secret_key = session_key(&config);
    let engine_data = web::Data::from(engine);

    log::info!("Starting server at http://{}", config.bind_addr);

    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
            .cookie_secure(false)
            .cookie_http_only(true)
            .build();

        App::new()
            .wrap(session_mw)
            .wrap(middleware::Logger::default())
            .app_data(engine_data.clone())
            .configure(handlers::configure::<PgStore>)
            .default_service(web::to(handlers::not_found))
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
