use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState<R> {
    pub config: AppConfig,
    pub runtime: R,
}
