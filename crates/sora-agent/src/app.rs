//! Agent lifecycle: credential handling and the serve loop.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sora_core::auth::AuthorizationGate;
use sora_core::capture::CaptureService;
use sora_core::config::{ConfigStore, Credentials};
use sora_core::dispatch::Dispatcher;
use sora_core::errors::CoreError;
use sora_core::session::SessionStore;
use sora_core::window::WindowService;
use sora_core::{PRODUCT_NAME, VERSION};
use teloxide::Bot;
use tracing::{error, info};

use crate::platform::HostBackends;
use crate::settings::AgentSettings;
use crate::telegram::{self, TelegramChannel};

pub fn log_banner() {
    info!(
        "{} v{} on {}/{}",
        PRODUCT_NAME,
        VERSION,
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

/// Write a fresh credentials record, as the installer does.
pub fn write_credentials(path: &Path, token: &str, admin_id: &str) -> Result<(), CoreError> {
    let store = ConfigStore::new(path);
    store.save(&Credentials::new(token.trim(), admin_id.trim()))?;
    info!("credentials written to {}", path.display());
    Ok(())
}

/// Load and validate the credentials record without starting the agent.
pub fn check_credentials(path: &Path) -> Result<Credentials, CoreError> {
    let credentials = ConfigStore::new(path).try_load()?;
    info!(
        "credentials ok: admin {}, record version {}",
        credentials.admin_id, credentials.schema_version
    );
    Ok(credentials)
}

/// Serve commands until the process is interrupted.
pub async fn run(settings: &AgentSettings) -> anyhow::Result<()> {
    log_banner();

    let credentials = match ConfigStore::new(&settings.credentials_path).try_load() {
        Ok(credentials) => credentials,
        Err(e) => {
            let err = CoreError::from(e);
            error!("{}: {}", err.user_message(), err);
            return Err(err).with_context(|| {
                format!("loading {}", settings.credentials_path.display())
            });
        }
    };

    let backends = HostBackends::detect();
    let capture = CaptureService::new(backends.screen, backends.camera)
        .with_camera_options(settings.camera_options());
    let windows =
        WindowService::new(backends.windows).with_activation_delay(settings.activation_delay());
    let sessions = SessionStore::with_ttl(settings.session_ttl());

    let bot = Bot::new(credentials.channel_token.clone());
    let channel = Arc::new(TelegramChannel::new(bot.clone()));
    let gate = AuthorizationGate::new(credentials.admin_id.clone());
    drop(credentials);

    let core = Arc::new(Dispatcher::new(gate, capture, windows, channel).with_sessions(sessions));

    telegram::register_commands(&bot).await;
    if settings.startup_notification {
        core.notify_started().await;
    }

    telegram::serve(bot, core.clone()).await;

    let stats = core.stats().snapshot();
    info!(
        "served {} commands ({} screenshots, {} photos, {} window lists, {} callbacks, {} rejected)",
        stats.commands,
        stats.screenshots,
        stats.camera_photos,
        stats.window_listings,
        stats.callbacks,
        stats.rejections
    );
    Ok(())
}
