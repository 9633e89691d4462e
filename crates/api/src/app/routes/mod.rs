use axum::Router;

pub mod migration;
pub mod system;

pub fn router() -> Router {
    Router::new().nest("/migration", migration::router())
}
