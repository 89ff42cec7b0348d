//! Authentication commands.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use chrono::{DateTime, Utc};
use pitstop_storage::UserProfile;
use serde::Serialize;
use session_engine::{token, RegistrationRequest, Role, SessionStatus};
use std::io::{self, Write};

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

fn display_name(user_id: &str, profile: Option<&UserProfile>) -> String {
    profile
        .and_then(|p| p.name.clone().or_else(|| p.email.clone()))
        .unwrap_or_else(|| user_id.to_string())
}

/// Login with an identifier (email or phone) and secret.
pub async fn login(
    ctx: &Context,
    identifier: Option<String>,
    role: Role,
    format: &OutputFormat,
) -> Result<()> {
    if ctx.session.hydrate().await == SessionStatus::Authenticated {
        let snapshot = ctx.session.snapshot();
        let user_id = snapshot.user_id.as_deref().unwrap_or("unknown");
        output::print_success(
            &format!("Already logged in as {}", display_name(user_id, snapshot.profile.as_ref())),
            format,
        );
        return Ok(());
    }

    let identifier = match identifier {
        Some(identifier) => identifier,
        None => prompt("Email or phone")?,
    };
    if identifier.is_empty() {
        output::print_error("Email or phone is required", format);
        return Ok(());
    }

    let secret = rpassword::prompt_password("Password: ")?;
    if secret.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    if *format == OutputFormat::Text {
        println!("Logging in...");
    }

    match ctx.session.login(&identifier, &secret, role).await {
        Ok(user) => output::print_success(
            &format!("Logged in as {}", display_name(&user.user_id, user.profile.as_ref())),
            format,
        ),
        Err(e) => output::print_error(&format!("Login failed: {}", e.user_message()), format),
    }

    Ok(())
}

/// Create an account. Does not sign in.
pub async fn register(
    ctx: &Context,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    role: Role,
    format: &OutputFormat,
) -> Result<()> {
    if email.is_none() && phone.is_none() {
        output::print_error("An email or phone number is required", format);
        return Ok(());
    }

    let secret = rpassword::prompt_password("Choose a password: ")?;
    if secret.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    let request = RegistrationRequest {
        profile: UserProfile {
            name: Some(name),
            email,
            phone,
            role: Some(role_name(role).to_string()),
            ..Default::default()
        },
        secret,
    };

    match ctx.session.register(&request).await {
        Ok(receipt) => output::print_success(
            receipt
                .message
                .as_deref()
                .unwrap_or("Account created. You can now log in."),
            format,
        ),
        Err(e) => output::print_error(&format!("Registration failed: {}", e.user_message()), format),
    }

    Ok(())
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Customer => "customer",
        Role::Provider => "provider",
    }
}

/// Logout and clear the stored session.
pub async fn logout(ctx: &Context, format: &OutputFormat) -> Result<()> {
    ctx.session.logout();
    output::print_success("Logged out successfully", format);
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    status: &'static str,
    logged_in: bool,
    user_id: Option<String>,
    name: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    can_refresh: bool,
    onboarding_complete: bool,
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.logged_in {
            return write!(f, "{}", output::row("Auth", "not logged in"));
        }
        writeln!(f, "{}", output::row("Auth", "logged in"))?;
        writeln!(f, "{}", output::row("User ID", self.user_id.as_deref().unwrap_or("unknown")))?;
        if let Some(name) = &self.name {
            writeln!(f, "{}", output::row("Name", name))?;
        }
        let expires = self
            .expires_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        writeln!(f, "{}", output::row("Expires", &expires))?;
        writeln!(
            f,
            "{}",
            output::row("Refresh", if self.can_refresh { "available" } else { "none" })
        )?;
        write!(
            f,
            "{}",
            output::row(
                "Onboarded",
                if self.onboarding_complete { "yes" } else { "no" }
            )
        )
    }
}

/// Check authentication status.
pub async fn status(ctx: &Context, format: &OutputFormat) -> Result<()> {
    let status = ctx.session.hydrate().await;
    let snapshot = ctx.session.snapshot();
    let record = ctx.session.store().load()?;

    let report = StatusReport {
        status: status.as_str(),
        logged_in: status.is_authenticated(),
        user_id: snapshot.user_id.clone(),
        name: snapshot.profile.as_ref().and_then(|p| p.name.clone()),
        expires_at: record
            .as_ref()
            .and_then(|r| token::effective_expiry(&r.access_token, r.issued_at)),
        can_refresh: snapshot.refresh_token.is_some(),
        onboarding_complete: ctx.session.store().is_onboarding_complete()?,
    };

    output::print(&report, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(logged_in: bool) -> StatusReport {
        StatusReport {
            status: if logged_in { "authenticated" } else { "unauthenticated" },
            logged_in,
            user_id: logged_in.then(|| "U1".to_string()),
            name: None,
            expires_at: None,
            can_refresh: logged_in,
            onboarding_complete: false,
        }
    }

    #[test]
    fn test_status_report_logged_out() {
        assert_eq!(report(false).to_string(), "Auth:      not logged in");
    }

    #[test]
    fn test_status_report_logged_in() {
        let text = report(true).to_string();
        assert!(text.contains("logged in"));
        assert!(text.contains("U1"));
        assert!(text.contains("Expires:   unknown"));
        assert!(text.contains("available"));
    }

    #[test]
    fn test_display_name_prefers_profile() {
        let profile = UserProfile {
            email: Some("ada@example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(display_name("U1", Some(&profile)), "ada@example.com");
        assert_eq!(display_name("U1", None), "U1");
    }
}
