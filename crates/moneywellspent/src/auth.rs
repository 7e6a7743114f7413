use crate::session::{AuthStatus, HttpSession, Page, SessionError};

/// Name of the form Amazon serves to unauthenticated visitors.
pub const SIGN_IN_FORM: &str = "signIn";
const EMAIL_FIELD: &str = "email";
const PASSWORD_FIELD: &str = "password";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Sign-in was rejected at {url} (wrong credentials, captcha or two-factor challenge)")]
    Rejected { url: String },
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

impl std::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

/// Signs in if `page` is a sign-in prompt, otherwise hands it back untouched.
///
/// Runs again whenever the prompt reappears, so an expired session is
/// renewed mid-run. A prompt that survives the submission is an error.
pub async fn ensure_authenticated(
    session: &mut HttpSession,
    page: Page,
    credentials: &Credentials<'_>,
) -> Result<Page, AuthError> {
    let Some(form) = page.form(SIGN_IN_FORM)? else {
        return Ok(page);
    };

    if session.status() == AuthStatus::Authenticated {
        log::warn!("Session expired, signing in again");
    }
    log::info!("Logging in to {}", session.origin().host_str().unwrap_or_default());

    let result = session
        .submit_form(
            &form,
            &[
                (EMAIL_FIELD, credentials.email),
                (PASSWORD_FIELD, credentials.password),
            ],
        )
        .await?;

    if result.has_form(SIGN_IN_FORM) {
        session.set_status(AuthStatus::Unauthenticated);
        return Err(AuthError::Rejected {
            url: result.url().to_string(),
        });
    }

    session.set_status(AuthStatus::Authenticated);
    log::debug!("Signed in, continuing at {}", result.url());
    Ok(result)
}
