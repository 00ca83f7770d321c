//! Transcript upload

use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Post the transcript as a form; failures are logged and otherwise ignored
pub fn send(url: &str, user_agent: &str, text: &str, text_debug: Option<&str>) {
    let client = match Client::builder().user_agent(user_agent).timeout(UPLOAD_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            debug!(error = %e, "could not build upload client");
            return;
        }
    };
    let form = [("text", text), ("text_debug", text_debug.unwrap_or_default())];
    match client.post(url).form(&form).send() {
        Ok(response) => debug!(status = response.status().as_u16(), "transcript uploaded"),
        Err(e) => debug!(error = %e, "transcript upload failed"),
    }
}
