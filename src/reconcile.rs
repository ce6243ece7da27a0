//! Reconcile cached object references with the ledger
//!
//! Run on every account change. A cached id is trusted only if it passes its
//! integrity check and still resolves to a live object; anything else is
//! purged. A failed fetch counts as "object absent": the client prefers
//! showing no ticket over showing a stale one.

use crate::cache::{CachePurpose, SecureCache};
use crate::contract;
use crate::ledger::LedgerClient;
use crate::types::{Address, LedgerObject, ObjectId, TicketInfo};
use tracing::{debug, info, warn};

/// Trusted view of an address's cache after reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub ticket: Option<TicketInfo>,
    pub lucky_ref: Option<ObjectId>,
    pub lucky_number: Option<u64>,
    pub winner_ref: Option<ObjectId>,
}

impl Reconciled {
    pub fn ticket_ref(&self) -> Option<&ObjectId> {
        self.ticket.as_ref().map(|t| &t.id)
    }
}

pub async fn reconcile<L: LedgerClient>(ledger: &L, cache: &SecureCache, address: &Address) -> Reconciled {
    let (ticket, lucky, winner) = tokio::join!(
        live_object(ledger, cache, CachePurpose::Ticket, address),
        live_object(ledger, cache, CachePurpose::Lucky, address),
        live_object(ledger, cache, CachePurpose::Winner, address),
    );

    let reconciled = Reconciled {
        ticket: ticket.map(|object| TicketInfo {
            number: contract::parse_ticket_number(&object),
            id: object.id,
        }),
        lucky_ref: lucky.map(|object| object.id),
        // Denormalized scalar, covered by the lucky reference check
        lucky_number: cache.lucky_number(address),
        winner_ref: winner.map(|object| object.id),
    };

    info!(
        "Reconciled {}: ticket={} lucky={} winner={}",
        address,
        reconciled.ticket.is_some(),
        reconciled.lucky_ref.is_some(),
        reconciled.winner_ref.is_some()
    );
    reconciled
}

/// Cached object of `purpose`, if it still exists on the ledger
async fn live_object<L: LedgerClient>(
    ledger: &L,
    cache: &SecureCache,
    purpose: CachePurpose,
    address: &Address,
) -> Option<LedgerObject> {
    let id = cache.object_id(purpose, address)?;

    match ledger.get_object(&id).await {
        Ok(Some(object)) => {
            debug!("Cached {} {} is live", purpose.as_str(), id);
            Some(object)
        }
        Ok(None) => {
            info!("Cached {} {} no longer exists, purging", purpose.as_str(), id);
            cache.purge(purpose, address);
            None
        }
        Err(e) => {
            warn!("Could not verify cached {} {}: {}, purging", purpose.as_str(), id, e);
            cache.purge(purpose, address);
            None
        }
    }
}
