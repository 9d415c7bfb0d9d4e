use super::CommandExecutor;
#[cfg(not(feature = "interactive"))]
use crate::error::CliError;
use crate::error::Result;
use tracing::info;

impl CommandExecutor {
    pub async fn login(&self, email: Option<String>, password: Option<String>) -> Result<()> {
        let email = match email {
            Some(email) => email,
            None => prompt_email()?,
        };
        let password = match password {
            Some(password) => password,
            None => prompt_password()?,
        };

        let pb = self.spinner("Signing in...");
        let outcome = self.client.login(&email, &password).await;
        pb.finish_and_clear();
        let outcome = outcome?;

        self.session.save(&outcome.credential)?;
        info!("Session stored");
        self.print(&self.output.format_login(&outcome, &self.format)?);
        Ok(())
    }

    pub async fn logout(&self) -> Result<()> {
        let had_session = self.client.logout().await;
        self.session.clear()?;

        let message = if had_session {
            "Signed out"
        } else {
            "No active session"
        };
        self.print(&self.output.format_message(message, &self.format)?);
        Ok(())
    }

    pub fn show_session(&self) -> Result<()> {
        let credential = self.client.credentials().current();
        self.print(&self.output.format_session(
            &self.client.session_state(),
            credential.as_deref(),
            &self.format,
        )?);
        Ok(())
    }
}

#[cfg(feature = "interactive")]
fn prompt_email() -> Result<String> {
    Ok(inquire::Text::new("Email:").prompt()?)
}

#[cfg(feature = "interactive")]
fn prompt_password() -> Result<String> {
    Ok(inquire::Password::new("Password:")
        .without_confirmation()
        .prompt()?)
}

#[cfg(not(feature = "interactive"))]
fn prompt_email() -> Result<String> {
    Err(CliError::invalid_input(
        "--email is required (or set JOBGEN_EMAIL)",
    ))
}

#[cfg(not(feature = "interactive"))]
fn prompt_password() -> Result<String> {
    Err(CliError::invalid_input(
        "--password is required (or set JOBGEN_PASSWORD)",
    ))
}
