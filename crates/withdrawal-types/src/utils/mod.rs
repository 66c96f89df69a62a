//! Utility functions shared across the workspace.

pub mod amount;
pub mod formatting;
pub mod helpers;

pub use amount::{parse_token_amount, AmountError};
pub use formatting::{format_token_amount, truncate_id, with_0x_prefix, without_0x_prefix};
pub use helpers::current_timestamp;
