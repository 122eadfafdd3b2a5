pub mod assets;
pub mod bank;
pub mod contract;
pub mod events;
pub mod payments;
pub mod withdrawals;

use crate::models::ReceiptResponse;
use escrow_contracts::Receipt;

pub(crate) fn receipt_response(receipt: Receipt, sequence: u64) -> ReceiptResponse {
    ReceiptResponse {
        sequence,
        request_id: receipt.request_id(),
        events: receipt.events,
    }
}
