//! Outcome aggregation

use serde::Serialize;

use super::deliver::DeliveryResults;
use crate::error::FormError;

pub const SUCCESS_MESSAGE: &str = "Form submitted successfully";

/// Body of a successful submission response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionOutcome {
    pub success: bool,
    pub message: String,
    pub delivery_results: DeliveryResults,
}

/// Accept the submission if at least one enabled channel delivered.
///
/// # Errors
///
/// Returns [`FormError::Send`] carrying every channel outcome when nothing
/// was delivered, including when no channel is enabled at all.
pub fn aggregate(results: DeliveryResults) -> Result<SubmissionOutcome, FormError> {
    if !results.any_success() {
        return Err(FormError::Send(Box::new(results)));
    }
    Ok(SubmissionOutcome {
        success: true,
        message: SUCCESS_MESSAGE.to_string(),
        delivery_results: results,
    })
}
