// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated chat SDK: a bootstrap object installed by an asynchronously
//! loaded script, and the one-time initialization run against it.

use ::std::sync::Mutex;
use ::std::sync::atomic::{AtomicBool, Ordering};
use ::std::time::Duration;

use ::thiserror::Error;
use ::tokio::task::JoinHandle;
use ::tokio::time::sleep;
use ::tokio_waitfor::{AsyncWakeUp, AsyncWaker, GlobalNamespace};
use ::tracing::info;

/// Global the bootstrap script installs once it has loaded.
pub const BOOTSTRAP_GLOBAL: &str = "embeddedservice_bootstrap";

/// Deployment the widget is initialized with.
pub struct EmbedSettings {
    pub org_id: String,
    pub deployment_name: String,
    pub site_url: String,
    pub scrt2_url: String,
    pub language: String,
}

/// What the bootstrap script leaves behind in the global namespace.
#[derive(Default)]
pub struct EmbeddedServiceBootstrap {
    language: Mutex<Option<String>>,
    initialized: AtomicBool,
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("`{0}` is not installed")]
    Missing(&'static str),
    #[error("invalid {field}: {url:?} is not an https URL")]
    InvalidUrl { field: &'static str, url: String },
    #[error("organization id must not be empty")]
    EmptyOrgId,
    #[error("embedded messaging is already initialized")]
    AlreadyInitialized,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            org_id: String::from("00D000000000001"),
            deployment_name: String::from("MIAW"),
            site_url: String::from("https://example.my.site.com/ESWDeployment"),
            scrt2_url: String::from("https://example.my.salesforce-scrt.com"),
            language: String::from("en_US"),
        }
    }
}

impl EmbeddedServiceBootstrap {
    pub fn set_language(&self, language: &str) {
        *self
            .language
            .lock()
            .expect("Failed to lock bootstrap language: poisoned by panic") =
            Some(String::from(language));
    }

    pub fn language(&self) -> Option<String> {
        self.language
            .lock()
            .expect("Failed to lock bootstrap language: poisoned by panic")
            .clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn init(
        &self,
        org_id: &str,
        deployment_name: &str,
        site_url: &str,
        scrt2_url: &str,
    ) -> Result<(), EmbedError> {
        if org_id.is_empty() {
            return Err(EmbedError::EmptyOrgId);
        }
        check_https("site URL", site_url)?;
        check_https("SCRT2 URL", scrt2_url)?;

        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(EmbedError::AlreadyInitialized);
        }
        info!(org_id, deployment_name, site_url, "embedded messaging initialized");
        Ok(())
    }
}

fn check_https(field: &'static str, url: &str) -> Result<(), EmbedError> {
    if url.starts_with("https://") && url.len() > "https://".len() {
        Ok(())
    } else {
        Err(EmbedError::InvalidUrl {
            field,
            url: String::from(url),
        })
    }
}

/// Runs the one-time setup against the installed bootstrap object.
pub fn init_embedded_messaging(
    namespace: &GlobalNamespace,
    settings: &EmbedSettings,
) -> Result<(), EmbedError> {
    let bootstrap = namespace
        .get::<EmbeddedServiceBootstrap>(BOOTSTRAP_GLOBAL)
        .ok_or(EmbedError::Missing(BOOTSTRAP_GLOBAL))?;

    bootstrap.set_language(&settings.language);
    bootstrap.init(
        &settings.org_id,
        &settings.deployment_name,
        &settings.site_url,
        &settings.scrt2_url,
    )
}

/// Stands in for injecting the bootstrap `<script>` tag: the global shows up
/// after `load_time`.
pub fn inject_bootstrap_script(
    namespace: GlobalNamespace,
    load_time: Duration,
    waker: AsyncWaker,
) -> JoinHandle<()> {
    ::tokio::spawn(async move {
        sleep(load_time).await;
        namespace.install(BOOTSTRAP_GLOBAL, EmbeddedServiceBootstrap::default());
        info!(global = BOOTSTRAP_GLOBAL, "bootstrap script loaded");
        waker.wake_up();
    })
}
