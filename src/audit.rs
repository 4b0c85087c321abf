//! Operator-facing audit events
//!
//! Events go to the `formrelay::audit` target so they can be routed
//! separately with `RUST_LOG`. Emitting them never affects a response.

use crate::error::FormError;
use crate::pipeline::RequestMeta;

/// A submission carried field names outside the allowed set
pub fn unauthorized_fields(
    form: &str,
    meta: &RequestMeta,
    unauthorized: &[String],
    total_fields_submitted: usize,
    authorized_fields_count: usize,
) {
    tracing::warn!(
        target: "formrelay::audit",
        form,
        ip = %meta.ip,
        user_agent = %meta.user_agent,
        unauthorized_fields = ?unauthorized,
        total_fields_submitted,
        authorized_fields_count,
        "unauthorized fields rejected"
    );
}

/// A submission finished delivery, successfully or not
pub fn submission(form_id: i64, success: bool, meta: &RequestMeta) {
    tracing::info!(
        target: "formrelay::audit",
        form_id,
        success,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        ip = %meta.ip,
        "form submission processed"
    );
}

/// A submission was turned away before delivery
pub fn rejected(form_id: i64, error: &FormError, meta: &RequestMeta) {
    tracing::info!(
        target: "formrelay::audit",
        form_id,
        success = false,
        code = error.code(),
        timestamp = %chrono::Utc::now().to_rfc3339(),
        ip = %meta.ip,
        "form submission processed"
    );
}
