//! Turning failed sends and reverted receipts into a [`RevertReason`].
//!
//! Reasons are decoded from the ABI-encoded revert payload by selector, not
//! by searching the error message text.

use ethers_core::abi::{decode, ParamType, Token};
use ethers_core::utils::id;
use serde_json::Value;

use crate::error::{RevertReason, SessionError};
use crate::provider::{error_codes, ProviderRpcError};
use crate::utils::decode_hex_str;

/// `Error(string)`
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// `Panic(uint256)`
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

pub const NOT_OWNER_REASON: &str = "Not owner";

// Wallets nest the node's error a few levels deep
const MAX_DATA_DEPTH: usize = 4;

pub fn decode_revert_data(data: &[u8]) -> RevertReason {
    if data.len() < 4 {
        return RevertReason::Unknown;
    }
    let (head, payload) = data.split_at(4);
    let mut selector = [0u8; 4];
    selector.copy_from_slice(head);

    if selector == ERROR_STRING_SELECTOR {
        return match decode(&[ParamType::String], payload) {
            Ok(tokens) => match tokens.into_iter().next() {
                Some(Token::String(reason)) => classify_reason(reason),
                _ => RevertReason::Unknown,
            },
            Err(_) => RevertReason::Unknown,
        };
    }

    if selector == PANIC_SELECTOR {
        return match decode(&[ParamType::Uint(256)], payload) {
            Ok(tokens) => match tokens.into_iter().next().and_then(Token::into_uint) {
                Some(code) => RevertReason::Panic(code),
                None => RevertReason::Unknown,
            },
            Err(_) => RevertReason::Unknown,
        };
    }

    if selector == id("NotOwner()") || selector == id("OwnableUnauthorizedAccount(address)") {
        return RevertReason::NotOwner;
    }

    RevertReason::Custom(selector)
}

fn classify_reason(reason: String) -> RevertReason {
    if reason.trim().eq_ignore_ascii_case(NOT_OWNER_REASON) {
        RevertReason::NotOwner
    } else {
        RevertReason::Message(reason)
    }
}

/// Revert payload carried by a provider error, if any.
pub fn revert_data(err: &ProviderRpcError) -> Option<Vec<u8>> {
    err.data.as_ref().and_then(|data| find_revert_hex(data, 0))
}

fn find_revert_hex(value: &Value, depth: usize) -> Option<Vec<u8>> {
    if depth > MAX_DATA_DEPTH {
        return None;
    }
    match value {
        Value::String(raw) if raw.starts_with("0x") => decode_hex_str(raw).ok(),
        Value::Object(map) => ["data", "originalError", "cause"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|inner| find_revert_hex(inner, depth + 1)),
        _ => None,
    }
}

/// Classify an error raised while handing a transaction to the wallet.
pub fn classify_send_error(err: ProviderRpcError) -> SessionError {
    if err.is_user_rejected() {
        return SessionError::UserRejected;
    }
    if let Some(data) = revert_data(&err) {
        return SessionError::Reverted(decode_revert_data(&data));
    }
    if err.code == error_codes::EXECUTION_REVERTED {
        return SessionError::Reverted(RevertReason::Unknown);
    }
    SessionError::TransactionFailed(err.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::encode;
    use ethers::types::U256;
    use serde_json::json;

    fn error_string(reason: &str) -> Vec<u8> {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend(encode(&[Token::String(reason.to_string())]));
        data
    }

    #[test]
    fn error_string_not_owner_is_recognised() {
        assert_eq!(decode_revert_data(&error_string("Not owner")), RevertReason::NotOwner);
        assert_eq!(
            decode_revert_data(&error_string("value too large")),
            RevertReason::Message("value too large".to_string())
        );
    }

    #[test]
    fn reason_must_match_exactly_not_as_substring() {
        assert_eq!(
            decode_revert_data(&error_string("Not owner of token")),
            RevertReason::Message("Not owner of token".to_string())
        );
    }

    #[test]
    fn panic_and_custom_selectors() {
        let mut panic = PANIC_SELECTOR.to_vec();
        panic.extend(encode(&[Token::Uint(U256::from(0x11))]));
        assert_eq!(decode_revert_data(&panic), RevertReason::Panic(U256::from(0x11)));

        assert_eq!(decode_revert_data(&id("NotOwner()")), RevertReason::NotOwner);
        assert_eq!(
            decode_revert_data(&[0xde, 0xad, 0xbe, 0xef]),
            RevertReason::Custom([0xde, 0xad, 0xbe, 0xef])
        );
        assert_eq!(decode_revert_data(&[]), RevertReason::Unknown);
    }

    #[test]
    fn finds_revert_data_nested_in_wallet_errors() {
        let data = crate::utils::encode_hex(&error_string("Not owner"));
        let err = ProviderRpcError::new(-32603, "Internal JSON-RPC error.")
            .with_data(json!({ "originalError": { "code": 3, "data": data } }));
        assert_eq!(
            classify_send_error(err),
            SessionError::Reverted(RevertReason::NotOwner)
        );
    }

    #[test]
    fn message_text_alone_is_not_a_revert_reason() {
        let err = ProviderRpcError::new(-32000, "execution reverted: Not owner");
        assert_eq!(
            classify_send_error(err),
            SessionError::TransactionFailed("execution reverted: Not owner".to_string())
        );

        let funds = ProviderRpcError::new(-32000, "insufficient funds for gas * price + value");
        assert!(matches!(
            classify_send_error(funds),
            SessionError::TransactionFailed(m) if m.contains("insufficient funds")
        ));

        let rejected = ProviderRpcError::new(4001, "User denied transaction signature.");
        assert_eq!(classify_send_error(rejected), SessionError::UserRejected);
    }
}
