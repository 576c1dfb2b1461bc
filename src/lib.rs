pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::app::comments::CommentService;
use crate::app::directory::DirectoryController;
use crate::app::i18n::Catalog;
use crate::app::toasts::ToastQueue;
use crate::config::AppConfig;
use crate::domain::preferences::Language;
use crate::infra::realtime::RealtimeHub;
use crate::infra::storage::ImageStore;
use crate::infra::store::DirectoryStore;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DirectoryController>,
    pub comments: Arc<CommentService>,
    pub store: Arc<dyn DirectoryStore>,
    pub hub: RealtimeHub,
    pub toasts: Arc<ToastQueue>,
    pub catalog: Arc<Catalog>,
    pub public_base_url: Url,
    pub default_language: Language,
    pub upload_max_bytes: usize,
}

/// The parts of the configuration the request path needs.
#[derive(Clone, Debug)]
pub struct Settings {
    pub public_base_url: Url,
    pub default_language: Language,
    pub upload_max_bytes: usize,
    pub toast_ttl: Duration,
}

impl From<&AppConfig> for Settings {
    fn from(config: &AppConfig) -> Self {
        Self {
            public_base_url: config.public_base_url.clone(),
            default_language: config.default_language,
            upload_max_bytes: config.upload_max_bytes,
            toast_ttl: Duration::from_secs(config.toast_ttl_seconds),
        }
    }
}

impl AppState {
    /// Wire the controller and services over the given backends. The mirror
    /// starts out `Loading`; call `controller.reload()` to fill it.
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        images: Arc<dyn ImageStore>,
        hub: RealtimeHub,
        settings: Settings,
    ) -> Result<Self> {
        let toasts = Arc::new(ToastQueue::new(settings.toast_ttl));
        let controller = Arc::new(DirectoryController::new(
            store.clone(),
            images,
            toasts.clone(),
            settings.upload_max_bytes,
        ));
        let comments = Arc::new(CommentService::new(store.clone(), toasts.clone()));

        Ok(Self {
            controller,
            comments,
            store,
            hub,
            toasts,
            catalog: Arc::new(Catalog::embedded()?),
            public_base_url: settings.public_base_url,
            default_language: settings.default_language,
            upload_max_bytes: settings.upload_max_bytes,
        })
    }
}
