//! Order book reader: one fresh snapshot per call, never cached

use super::OrderBooks;
use crate::chain::LedgerClient;
use crate::error::E2eResult;

use std::sync::Arc;
use tracing::trace;

pub struct OrderBookReader {
    ledger: Arc<dyn LedgerClient>,
    committee: u64,
}

impl OrderBookReader {
    pub fn new(ledger: Arc<dyn LedgerClient>, committee: u64) -> Self {
        Self { ledger, committee }
    }

    /// Fetch the current books for the configured committee
    pub async fn fetch(&self) -> E2eResult<OrderBooks> {
        let books = self.ledger.order_books(self.committee).await?;
        crate::metrics::record_book_read();
        trace!(
            "Fetched {} orders across {} books for committee {}",
            books.len(),
            books.books.len(),
            self.committee
        );
        Ok(books)
    }
}
