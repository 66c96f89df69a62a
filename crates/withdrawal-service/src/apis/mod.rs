//! Request handling behind the HTTP routes.

pub mod broadcast;
pub mod health;
pub mod withdrawal;

use withdrawal_core::RequestError;
use withdrawal_types::APIError;

/// Maps an intake error onto the API error returned to the caller.
pub fn request_error(error: RequestError) -> APIError {
	match error {
		RequestError::Validation(message) => APIError::BadRequest {
			error_type: "VALIDATION_ERROR".to_string(),
			message,
		},
		RequestError::Duplicate(message) => APIError::Conflict {
			error_type: "DUPLICATE_REQUEST".to_string(),
			message,
		},
		RequestError::NotFound(message) => APIError::NotFound {
			error_type: "NOT_FOUND".to_string(),
			message,
		},
		RequestError::Conflict(message) => APIError::Conflict {
			error_type: "INVALID_STATUS".to_string(),
			message,
		},
		RequestError::Infrastructure(message) => APIError::ServiceUnavailable {
			error_type: "SERVICE_UNAVAILABLE".to_string(),
			message,
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_request_error_status_codes() {
		let cases = [
			(RequestError::Validation("bad".into()), 400),
			(RequestError::Duplicate("dup".into()), 409),
			(RequestError::NotFound("gone".into()), 404),
			(RequestError::Conflict("late".into()), 409),
			(RequestError::Infrastructure("down".into()), 503),
		];
		for (error, status) in cases {
			assert_eq!(request_error(error).status_code(), status);
		}
	}

	#[test]
	fn test_message_is_kept() {
		let body = request_error(RequestError::Conflict(
			"Withdrawal abc cannot be cancelled in status PROCESSING".into(),
		))
		.to_error_response();
		assert_eq!(body.error, "INVALID_STATUS");
		assert!(body.message.contains("PROCESSING"));
	}
}
