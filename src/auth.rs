use anyhow::{Result, bail};

use gcal_feeds::storage::config::Config;
use gcal_feeds::sync::google_auth::AuthorizationCodeSource;

/// Prompts on the terminal for the code Google hands back after consent.
pub struct StdinCodeSource;

impl AuthorizationCodeSource for StdinCodeSource {
    fn request_code(&self, auth_url: &str) -> Option<String> {
        println!("\n=== Google Calendar Authentication ===\n");
        println!("To authenticate with Google Calendar:");
        println!("1. Visit this URL in your browser:\n");
        println!("{}\n", auth_url);
        println!("2. Sign in and authorize the application");
        println!("3. Copy the 'code' parameter from the URL you are redirected to");
        println!("4. Paste it below (leave empty to cancel)\n");
        println!("Enter the authorization code: ");

        let mut code = String::new();
        match std::io::stdin().read_line(&mut code) {
            Ok(_) => Some(code.trim().to_string()).filter(|code| !code.is_empty()),
            Err(e) => {
                tracing::error!("Failed to read authorization code: {}", e);
                None
            }
        }
    }
}

pub fn check_credentials(config: &Config) -> Result<()> {
    if config.google.client_id.is_empty() || config.google.client_secret.is_empty() {
        println!("Configuration incomplete. Please edit the config file at:");
        println!("{}", Config::config_path().display());
        println!("\nYou need to set:");
        println!("  - google.client_id: Your Google OAuth2 client ID");
        println!("  - google.client_secret: Your Google OAuth2 client secret");
        println!("\nGet these from: https://console.cloud.google.com/apis/credentials");
        bail!("Missing Google OAuth credentials in config");
    }

    Ok(())
}
