//! Page controllers.
//!
//! A controller owns the raw data behind one page. `load` fetches it and
//! draws every container; `dispatch` applies one action and redraws the
//! containers it affects from scratch. Filtering and sorting always start
//! from the raw data, so applying the same filter twice is a no-op.
//!
//! Member pages live in [`member`], staff pages in [`admin`].

pub mod admin;
pub mod member;
pub mod surface;

use chrono::{Local, NaiveDateTime};
use tracing::{error, warn};

use crate::api::ApiError;
use crate::auth::LOGIN_PAGE;
use crate::models::{AttendanceStatus, PaymentStatus, ValidationError};
use crate::utils::escape_html;

pub use surface::{Page, Surface};

/// One page's behaviour.
#[allow(async_fn_in_trait)]
pub trait Controller {
    type Action;

    /// Fetch the page's data and draw every container.
    async fn load(&mut self, surface: &mut dyn Surface);

    async fn dispatch(&mut self, action: Self::Action, surface: &mut dyn Surface);
}

/// Route a failed operation to the user.
///
/// An expired session sends the user to the login page, a rejected form
/// shows its own message, anything else is shown after `context`.
pub(crate) fn report_failure(surface: &mut dyn Surface, context: &str, err: &anyhow::Error) {
    if ApiError::is_unauthorized(err) {
        warn!(context, "Session rejected, returning to login");
        surface.redirect(LOGIN_PAGE);
    } else if let Some(invalid) = err.downcast_ref::<ValidationError>() {
        surface.alert(&invalid.0);
    } else {
        error!(context, error = %format!("{:#}", err), "Page operation failed");
        surface.alert(&format!("{}: {}", context, err.root_cause()));
    }
}

pub(crate) fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub(crate) fn no_data(message: &str) -> String {
    format!(r#"<p class="no-data">{}</p>"#, escape_html(message))
}

pub(crate) fn attendance_badge(status: AttendanceStatus) -> String {
    format!(
        r#"<span class="status-badge status-{}">{} {}</span>"#,
        status.as_str(),
        status.icon(),
        status.label()
    )
}

pub(crate) fn payment_badge(status: PaymentStatus) -> String {
    format!(
        r#"<span class="payment-badge payment-{}">{}</span>"#,
        status.as_str(),
        status.label()
    )
}

/// `part / total` in percent, `0.0` when there is nothing to divide by
pub(crate) fn rate(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
