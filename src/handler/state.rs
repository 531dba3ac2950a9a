use std::sync::Arc;

use crate::config::AppConfig;
use crate::http_client::HttpClients;
use crate::tor::TorRotator;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<AppConfig>,
    pub(crate) clients: HttpClients,
    // Only present when the proxy in use is the local Tor client.
    pub(crate) tor: Option<Arc<TorRotator>>,
}
