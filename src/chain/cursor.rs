//! Traversal Cursor
//!
//! Walks a chain forward in confirmation-safe, size-bounded batches of
//! contiguous headers. Only headers at least `confirmation_depth` blocks
//! behind the provider's head are ever returned.
//!
//! A cursor belongs to a single polling task; `next_headers` takes
//! `&mut self` and is not meant to be shared.

use std::cmp::Ordering;
use std::sync::Arc;

use num_bigint::BigUint;
use tracing::{debug, warn};

use super::error::{CursorError, GatewayError};
use super::gateway::ChainGateway;
use super::types::{BlockHeader, HeaderQuery};

pub struct TraversalCursor {
    gateway: Arc<ChainGateway>,
    latest_header: Option<BlockHeader>,
    last_traversed_header: Option<BlockHeader>,
    confirmation_depth: BigUint,
}

/// Inclusive end of a batch starting at `start`: at most `size` headers,
/// never past `end`. `size` must be non-zero.
fn clamp_end(start: &BigUint, end: &BigUint, size: u64) -> BigUint {
    let capped = start + BigUint::from(size) - 1u32;
    if &capped < end { capped } else { end.clone() }
}

impl TraversalCursor {
    /// Start after `from_header`, or at genesis when `None`
    pub fn new(
        gateway: Arc<ChainGateway>,
        from_header: Option<BlockHeader>,
        confirmation_depth: u64,
    ) -> Self {
        Self {
            gateway,
            latest_header: None,
            last_traversed_header: from_header,
            confirmation_depth: BigUint::from(confirmation_depth),
        }
    }

    /// Head most recently reported by the provider
    pub fn latest_header(&self) -> Option<&BlockHeader> {
        self.latest_header.as_ref()
    }

    pub fn last_traversed_header(&self) -> Option<&BlockHeader> {
        self.last_traversed_header.as_ref()
    }

    pub fn confirmation_depth(&self) -> &BigUint {
        &self.confirmation_depth
    }

    /// Rewind or re-seed the cursor, e.g. after a reorg was reconciled
    pub fn reset(&mut self, from_header: Option<BlockHeader>) {
        warn!(
            chain = self.gateway.chain(),
            from = ?from_header.as_ref().map(|h| h.number.to_string()),
            "Cursor reset"
        );
        self.last_traversed_header = from_header;
    }

    /// Next contiguous batch of confirmed headers, possibly empty
    ///
    /// On error no header is consumed; only `latest_header` may have moved.
    pub async fn next_headers(&mut self, max_size: u64) -> Result<Vec<BlockHeader>, CursorError> {
        let latest = self
            .gateway
            .header(HeaderQuery::Latest)
            .await?
            .ok_or(CursorError::NoHeaderReported)?;
        self.latest_header = Some(latest.clone());

        if latest.number < self.confirmation_depth {
            return Ok(Vec::new());
        }
        let end_height = &latest.number - &self.confirmation_depth;

        let next_height = match &self.last_traversed_header {
            Some(last) => match last.number.cmp(&end_height) {
                Ordering::Equal => return Ok(Vec::new()),
                Ordering::Greater => {
                    return Err(CursorError::CursorAheadOfProvider {
                        last_traversed: last.number.clone(),
                        confirmed_tip: end_height,
                    });
                }
                Ordering::Less => &last.number + 1u32,
            },
            None => BigUint::ZERO,
        };

        if max_size == 0 {
            return Ok(Vec::new());
        }
        let end_height = clamp_end(&next_height, &end_height, max_size);

        let mut headers = Vec::new();
        let mut height = next_height;
        while height <= end_height {
            let header = self
                .gateway
                .header(HeaderQuery::Height(height.clone()))
                .await?
                .ok_or_else(|| GatewayError::HeaderMissing(height.clone()))?;
            if header.number != height {
                return Err(GatewayError::Malformed(format!(
                    "asked for header {}, got {}",
                    height, header.number
                ))
                .into());
            }
            headers.push(header);
            height += 1u32;
        }

        if let Some(last) = headers.last() {
            debug!(
                chain = self.gateway.chain(),
                from = %headers[0].number,
                to = %last.number,
                head = %latest.number,
                "Traversed headers"
            );
            self.last_traversed_header = Some(last.clone());
        }
        Ok(headers)
    }
}
