use crate::{
    app::{App, Surface},
    cli::globals::GlobalArgs,
    credentials::{CredentialWorkflow, SubmitError, ValidationError},
    dashboard::DashboardState,
    identity::{GoTrueProvider, IdentityProvider, Session},
};
use anyhow::{Context, Result, anyhow, bail};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// How long to wait for the provider to announce a session change.
const SESSION_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct SignInArgs {
    pub globals: GlobalArgs,
    pub email: String,
    pub password: SecretString,
}

#[derive(Debug)]
pub struct SignUpArgs {
    pub globals: GlobalArgs,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: SecretString,
    pub password_confirm: SecretString,
}

async fn start(globals: &GlobalArgs) -> Result<App<GoTrueProvider>> {
    debug!(?globals, "starting auth client");
    let provider =
        GoTrueProvider::new(globals.provider_config()).context("failed to build the auth client")?;
    Ok(App::start(Arc::new(provider)).await)
}

/// Prints the report after releasing the app's subscription.
fn finish<P: IdentityProvider>(app: App<P>, report: Result<String>) -> Result<()> {
    app.shutdown();
    println!("{}", report?);
    Ok(())
}

/// # Errors
/// Returns an error if the credentials are rejected.
pub async fn sign_in(args: SignInArgs) -> Result<()> {
    let app = start(&args.globals).await?;
    let report = sign_in_with(&app, &args.email, &args.password).await;
    finish(app, report)
}

/// # Errors
/// Returns an error if the input fails the password policy or the account
/// cannot be created.
pub async fn sign_up(args: SignUpArgs) -> Result<()> {
    let app = start(&args.globals).await?;
    let report = sign_up_with(&app, &args).await;
    finish(app, report)
}

/// # Errors
/// Returns an error if nobody is signed in.
pub async fn who_am_i(globals: &GlobalArgs) -> Result<()> {
    let app = start(globals).await?;
    let report = who_am_i_with(&app).await;
    finish(app, report)
}

/// # Errors
/// Returns an error if the auth service refuses the sign-out.
pub async fn sign_out(globals: &GlobalArgs) -> Result<()> {
    let app = start(globals).await?;
    let report = sign_out_with(&app).await;
    finish(app, report)
}

fn signed_in_as(session: &Session) -> String {
    format!(
        "signed in as {}",
        session.user.email.as_deref().unwrap_or("unknown")
    )
}

fn sign_in_form<P: IdentityProvider>(app: &App<P>) -> Result<CredentialWorkflow<P>> {
    app.credential_workflow()
        .context("the sign-in form is not available")
}

/// Turns a workflow error into the message shown to the user.
fn submit_error<P: IdentityProvider>(
    workflow: &CredentialWorkflow<P>,
    err: SubmitError,
) -> anyhow::Error {
    match err {
        SubmitError::Invalid(ValidationError::PolicyUnmet) => {
            let rules: Vec<String> = workflow
                .feedback()
                .map(|feedback| feedback.policy.unmet())
                .unwrap_or_default()
                .into_iter()
                .map(|rule| format!("  - {}", rule.description()))
                .collect();
            anyhow!("{}:\n{}", ValidationError::PolicyUnmet, rules.join("\n"))
        }
        other => anyhow!(other),
    }
}

async fn sign_in_with<P: IdentityProvider>(
    app: &App<P>,
    email: &str,
    password: &SecretString,
) -> Result<String> {
    if let Surface::Dashboard(session) = app.surface() {
        return Ok(format!("Already {}", signed_in_as(&session)));
    }

    let workflow = sign_in_form(app)?;
    workflow.set_email(email);
    workflow.set_password(password.expose_secret());

    let message = workflow
        .submit()
        .await
        .map_err(|e| submit_error(&workflow, e))?;

    let session = app
        .wait_for_dashboard(SESSION_WAIT)
        .await
        .context("the auth service did not confirm the session")?;
    Ok(format!("{message}\nSuccessfully {}", signed_in_as(&session)))
}

async fn sign_up_with<P: IdentityProvider>(app: &App<P>, args: &SignUpArgs) -> Result<String> {
    if let Surface::Dashboard(session) = app.surface() {
        bail!("Already {}; sign out first", signed_in_as(&session));
    }

    let workflow = sign_in_form(app)?;
    workflow.toggle_mode()?;
    workflow.set_email(&args.email);
    workflow.set_first_name(&args.first_name);
    workflow.set_last_name(&args.last_name);
    workflow.set_password(args.password.expose_secret());
    workflow.set_password_confirm(args.password_confirm.expose_secret());

    let message = workflow
        .submit()
        .await
        .map_err(|e| submit_error(&workflow, e))?;

    if workflow.awaiting_confirmation() {
        return Ok(format!("{message}\nConfirm your email address, then sign in."));
    }

    let session = app
        .wait_for_dashboard(SESSION_WAIT)
        .await
        .context("the auth service did not confirm the session")?;
    Ok(format!("{message}\nSuccessfully {}", signed_in_as(&session)))
}

async fn who_am_i_with<P: IdentityProvider>(app: &App<P>) -> Result<String> {
    let Some(mut dashboard) = app.dashboard() else {
        bail!("not signed in");
    };

    match dashboard.load().await {
        DashboardState::Ready(Some(profile)) => {
            let mut lines = vec![format!("Hello, {}!", profile.display_name())];
            if let Some(email) = &profile.email {
                lines.push(format!("Email:   {email}"));
            }
            let name = [profile.first_name.as_deref(), profile.last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            if !name.is_empty() {
                lines.push(format!("Name:    {name}"));
            }
            lines.push(format!("User ID: {}", profile.id));
            Ok(lines.join("\n"))
        }
        DashboardState::Ready(None) | DashboardState::Loading => {
            Ok("Signed in, but the profile could not be loaded".to_string())
        }
    }
}

async fn sign_out_with<P: IdentityProvider>(app: &App<P>) -> Result<String> {
    let Some(dashboard) = app.dashboard() else {
        return Ok("Not signed in".to_string());
    };

    dashboard.sign_out().await?;
    if !app.wait_for_sign_in(SESSION_WAIT).await {
        bail!("the auth service did not confirm the sign-out");
    }
    Ok("Signed out".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::identity::{MemoryProvider, ProviderCall, UserMetadata};
    use url::Url;

    fn provider() -> Arc<MemoryProvider> {
        Arc::new(MemoryProvider::new().with_account(
            "a@b.com",
            "Abcdef1!",
            UserMetadata::with_names("Ada", "Lovelace"),
        ))
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn sign_up_args(password: &str, confirm: &str) -> SignUpArgs {
        SignUpArgs {
            globals: GlobalArgs::new(
                Url::parse("https://project.supabase.co").unwrap(),
                secret("anon"),
            ),
            email: "mina@b.com".to_string(),
            first_name: "Mina".to_string(),
            last_name: "Murray".to_string(),
            password: secret(password),
            password_confirm: secret(confirm),
        }
    }

    #[tokio::test]
    async fn sign_in_then_whoami_then_sign_out() {
        let app = App::start(provider()).await;

        let report = sign_in_with(&app, "a@b.com", &secret("Abcdef1!")).await.unwrap();
        assert_eq!(report, "Welcome back!\nSuccessfully signed in as a@b.com");

        let report = who_am_i_with(&app).await.unwrap();
        assert!(report.starts_with("Hello, Ada!"));
        assert!(report.contains("Name:    Ada Lovelace"));

        assert_eq!(sign_out_with(&app).await.unwrap(), "Signed out");
        assert!(who_am_i_with(&app).await.is_err());
    }

    #[tokio::test]
    async fn rejected_sign_in_reports_provider_message() {
        let app = App::start(provider()).await;
        let err = sign_in_with(&app, "a@b.com", &secret("nope")).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[tokio::test]
    async fn weak_sign_up_lists_unmet_rules() {
        let provider = provider();
        let app = App::start(Arc::clone(&provider)).await;

        let err = sign_up_with(&app, &sign_up_args("abc", "abc")).await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("password requirements not met"));
        assert!(message.contains("at least 8 characters"));
        assert!(!message.contains("one lowercase letter"));
        assert_eq!(provider.calls(), vec![ProviderCall::CurrentSession]);
    }

    #[tokio::test]
    async fn sign_up_welcomes_by_first_name() {
        let app = App::start(provider()).await;
        let report = sign_up_with(&app, &sign_up_args("Abcdef1!", "Abcdef1!"))
            .await
            .unwrap();
        assert_eq!(
            report,
            "Welcome to Scriptracula, Mina!\nSuccessfully signed in as mina@b.com"
        );
    }

    #[tokio::test]
    async fn sign_up_pending_confirmation_returns_at_once() {
        let app = App::start(Arc::new(MemoryProvider::new().requiring_confirmation())).await;
        let report = tokio::time::timeout(
            Duration::from_millis(500),
            sign_up_with(&app, &sign_up_args("Abcdef1!", "Abcdef1!")),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(
            report,
            "Welcome to Scriptracula, Mina!\nConfirm your email address, then sign in."
        );
        assert!(matches!(app.surface(), Surface::SignIn));
    }

    #[tokio::test]
    async fn sign_out_without_session() {
        let app = App::start(provider()).await;
        assert_eq!(sign_out_with(&app).await.unwrap(), "Not signed in");
    }
}
