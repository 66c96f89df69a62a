//! Withdrawal endpoints: intake, listing, lookup and cancel.

use super::request_error;
use serde::Deserialize;
use std::str::FromStr;
use withdrawal_core::WithdrawalEngine;
use withdrawal_types::{
	truncate_id, APIError, NewWithdrawal, WithdrawalFilter, WithdrawalRequest, WithdrawalStatus,
};

/// Query string accepted by `GET /withdrawals`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
	pub status: Option<String>,
	pub limit: Option<usize>,
	pub offset: Option<usize>,
}

impl ListQuery {
	fn into_filter(self) -> Result<WithdrawalFilter, APIError> {
		let status = self
			.status
			.filter(|s| !s.trim().is_empty())
			.map(|s| WithdrawalStatus::from_str(s.trim()))
			.transpose()
			.map_err(|message| APIError::BadRequest {
				error_type: "VALIDATION_ERROR".to_string(),
				message,
			})?;

		Ok(WithdrawalFilter {
			status,
			limit: self.limit,
			offset: self.offset,
		})
	}
}

pub async fn submit(
	engine: &WithdrawalEngine,
	new: NewWithdrawal,
) -> Result<WithdrawalRequest, APIError> {
	let request_id = new.request_id.clone();
	engine
		.intake()
		.submit_withdrawal(new)
		.await
		.map_err(|e| {
			tracing::warn!(request_id = %request_id, error = %e, "Withdrawal rejected");
			request_error(e)
		})
}

pub async fn list(
	engine: &WithdrawalEngine,
	query: ListQuery,
) -> Result<Vec<WithdrawalRequest>, APIError> {
	let filter = query.into_filter()?;
	engine
		.intake()
		.list_withdrawals(&filter)
		.await
		.map_err(request_error)
}

pub async fn get(engine: &WithdrawalEngine, id: &str) -> Result<WithdrawalRequest, APIError> {
	engine.intake().get_withdrawal(id).await.map_err(request_error)
}

pub async fn cancel(engine: &WithdrawalEngine, id: &str) -> Result<WithdrawalRequest, APIError> {
	engine
		.intake()
		.cancel_withdrawal(id)
		.await
		.map_err(|e| {
			tracing::warn!(withdrawal_id = %truncate_id(id), error = %e, "Cancel refused");
			request_error(e)
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_list_query_parses_status() {
		let filter = ListQuery {
			status: Some("completed".to_string()),
			limit: Some(10),
			offset: None,
		}
		.into_filter()
		.unwrap();

		assert_eq!(filter.status, Some(WithdrawalStatus::Completed));
		assert_eq!(filter.limit, Some(10));
	}

	#[test]
	fn test_list_query_ignores_empty_status() {
		let filter = ListQuery {
			status: Some(" ".to_string()),
			..Default::default()
		}
		.into_filter()
		.unwrap();
		assert!(filter.status.is_none());
	}

	#[test]
	fn test_list_query_rejects_unknown_status() {
		let result = ListQuery {
			status: Some("SETTLED".to_string()),
			..Default::default()
		}
		.into_filter();

		assert!(matches!(result, Err(APIError::BadRequest { .. })));
	}
}
