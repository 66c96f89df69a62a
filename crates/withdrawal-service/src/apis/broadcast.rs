//! Raw transaction broadcast endpoints.

use super::request_error;
use withdrawal_core::WithdrawalEngine;
use withdrawal_types::{APIError, NewRawBroadcast, RawTransactionBroadcast};

pub async fn submit(
	engine: &WithdrawalEngine,
	new: NewRawBroadcast,
) -> Result<RawTransactionBroadcast, APIError> {
	engine
		.intake()
		.submit_raw_broadcast(new)
		.await
		.map_err(|e| {
			tracing::warn!(error = %e, "Raw broadcast rejected");
			request_error(e)
		})
}

pub async fn get(
	engine: &WithdrawalEngine,
	id: &str,
) -> Result<RawTransactionBroadcast, APIError> {
	engine
		.intake()
		.get_raw_broadcast(id)
		.await
		.map_err(request_error)
}
