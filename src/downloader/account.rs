//! Credential state and default launch parameters.

use crate::types::LaunchParams;

use super::MediaDownloader;

impl MediaDownloader {
    /// Launch parameters from the configured defaults and the current credential
    pub async fn default_launch_params(&self) -> LaunchParams {
        LaunchParams {
            format_spec: self.config.download.default_format.clone(),
            output_dir: self.config.download.download_dir.clone(),
            credential_ref: self.credentials.read().await.cookies_path(),
        }
    }

    /// Whether a cookie jar is available for authenticated downloads
    pub async fn is_logged_in(&self) -> bool {
        self.credentials.read().await.is_logged_in()
    }

    /// Account the cookie jar belongs to, if known
    pub async fn account_email(&self) -> Option<String> {
        self.credentials.read().await.email().map(str::to_string)
    }

    /// Record that the login collaborator produced a cookie jar
    pub async fn mark_logged_in(&self, email: Option<String>) {
        self.credentials.write().await.mark_logged_in(email);
        tracing::info!("login recorded");
    }

    /// Forget the login and remove the cookie jar
    ///
    /// Jobs already launched keep the credential they captured.
    pub async fn logout(&self) {
        self.credentials.write().await.logout();
        tracing::info!("logged out");
    }
}
