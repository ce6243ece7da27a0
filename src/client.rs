//! Lottery client: per-account state machine over buy / draw / check
//!
//! Each action runs validate -> submit -> await finality -> poll -> persist.
//! State lives in a watch channel so a presentation layer can subscribe.
//!
//! # Invariants
//!
//! - At most one action is in flight per client. The flag is taken with a
//!   compare-and-swap before anything else happens and released, together
//!   with `pending`, by a guard on every exit path (including a dropped
//!   future).
//! - Every account change starts a new session. Results are applied to the
//!   in-memory state only if the session that started them is still current;
//!   cache writes always use the address captured when the action began.
//! - Downstream fields are cleared optimistically when a buy or draw starts
//!   and are not restored if the transaction later fails.

use crate::cache::{CacheError, CachePurpose, SecureCache};
use crate::contract::{self, TYPE_LUCKY, TYPE_WINNER};
use crate::cooldown::DrawCooldown;
use crate::ledger::{LedgerClient, LedgerError, WalletError, WalletSigner};
use crate::poll::{poll_until, PollPolicy};
use crate::reconcile::reconcile;
use crate::store::KvStore;
use crate::types::{
    now_millis, Address, ExecutionStatus, LedgerObject, ObjectId, TicketInfo, TicketNumber,
    TransactionEffects, TxDigest, DRAW_COOLDOWN,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LotteryError {
    // Validation: nothing was submitted
    #[error("no wallet account connected")]
    NotConnected,
    #[error("lottery package id is not configured")]
    MissingContract,
    #[error("ticket number must be an integer between 0 and 65535, got {0}")]
    InvalidTicketNumber(String),
    #[error("wait before drawing again ({remaining_ms} ms left)")]
    CooldownActive { remaining_ms: i64 },
    #[error("no ticket: buy a ticket first")]
    MissingTicket,
    #[error("no lucky number: draw first")]
    MissingLucky,
    #[error("another lottery action is still in progress")]
    Busy,

    // Submission
    #[error("wallet: {0}")]
    Wallet(#[from] WalletError),

    // Settlement
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("transaction {digest} failed: {reason}")]
    TransactionFailed { digest: TxDigest, reason: String },
    #[error("transaction {0} created no ticket")]
    NothingCreated(TxDigest),
    #[error("lucky number not indexed yet, retry shortly")]
    NotIndexed,

    // Ownership
    #[error("ticket does not belong to your address")]
    TicketNotOwned,

    #[error("local cache: {0}")]
    Store(String),
}

impl LotteryError {
    /// Rejected before any transaction was built
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LotteryError::NotConnected
                | LotteryError::MissingContract
                | LotteryError::InvalidTicketNumber(_)
                | LotteryError::CooldownActive { .. }
                | LotteryError::MissingTicket
                | LotteryError::MissingLucky
                | LotteryError::Busy
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WinnerStatus {
    #[default]
    Unknown,
    Won,
    Lost,
}

/// Where the account is in the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    NoTicket,
    TicketBought,
    LuckyDrawn,
    Won,
    Lost,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotteryState {
    /// Incremented on every account change
    pub session: u64,
    pub address: Option<Address>,
    pub ticket: Option<TicketInfo>,
    pub lucky_ref: Option<ObjectId>,
    pub lucky_number: Option<u64>,
    pub winner_ref: Option<ObjectId>,
    pub winner_status: WinnerStatus,
    /// A submitted transaction is being settled
    pub pending: bool,
    /// Most recent failure only
    pub last_error: Option<LotteryError>,
    pub last_tx: Option<TxDigest>,
}

impl LotteryState {
    pub fn ticket_ref(&self) -> Option<&ObjectId> {
        self.ticket.as_ref().map(|t| &t.id)
    }

    pub fn round(&self) -> Round {
        match (&self.ticket, self.winner_status) {
            (None, _) => Round::NoTicket,
            (Some(_), WinnerStatus::Won) => Round::Won,
            (Some(_), WinnerStatus::Lost) => Round::Lost,
            (Some(_), WinnerStatus::Unknown) if self.lucky_ref.is_some() => Round::LuckyDrawn,
            (Some(_), WinnerStatus::Unknown) => Round::TicketBought,
        }
    }

    fn clear_round(&mut self) {
        self.lucky_ref = None;
        self.lucky_number = None;
        self.winner_ref = None;
        self.winner_status = WinnerStatus::Unknown;
    }
}

#[derive(Debug, Clone)]
pub struct LotteryConfig {
    /// Published package of the lottery module
    pub package_id: Option<String>,
    pub draw_cooldown: Duration,
    pub poll: PollPolicy,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            package_id: None,
            draw_cooldown: DRAW_COOLDOWN,
            poll: PollPolicy::default(),
        }
    }
}

/// Holds the in-flight flag for one action
struct ActionGuard<'a> {
    in_flight: &'a AtomicBool,
    state: &'a watch::Sender<LotteryState>,
    session: u64,
    address: Option<Address>,
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        let session = self.session;
        self.state.send_if_modified(|s| {
            if s.session == session && s.pending {
                s.pending = false;
                true
            } else {
                false
            }
        });
        self.in_flight.store(false, Ordering::Release);
    }
}

pub struct LotteryClient<L, W> {
    ledger: Arc<L>,
    wallet: Arc<W>,
    cache: SecureCache,
    config: LotteryConfig,
    cooldown: DrawCooldown,
    state: watch::Sender<LotteryState>,
    in_flight: AtomicBool,
}

impl<L: LedgerClient, W: WalletSigner> LotteryClient<L, W> {
    pub fn new(ledger: Arc<L>, wallet: Arc<W>, store: Arc<dyn KvStore>, config: LotteryConfig) -> Self {
        let (state, _) = watch::channel(LotteryState::default());
        Self {
            ledger,
            wallet,
            cache: SecureCache::new(store),
            cooldown: DrawCooldown::new(config.draw_cooldown),
            config,
            state,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LotteryState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LotteryState> {
        self.state.subscribe()
    }

    pub fn cache(&self) -> &SecureCache {
        &self.cache
    }

    pub fn config(&self) -> &LotteryConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    // -------------------------------------------------------------------------
    // Account changes
    // -------------------------------------------------------------------------

    /// Switch the connected account and rebuild state from the cache.
    ///
    /// In-memory state of the previous account is dropped; its persisted
    /// cache stays and is picked up again when it reconnects.
    pub async fn set_account(&self, address: Option<Address>) {
        let mut session = 0;
        self.state.send_modify(|s| {
            session = s.session + 1;
            *s = LotteryState {
                session,
                address: address.clone(),
                ..LotteryState::default()
            };
        });

        let Some(address) = address else {
            info!("Account disconnected");
            return;
        };
        info!("Account connected: {}", address);

        let reconciled = reconcile(self.ledger.as_ref(), &self.cache, &address).await;
        let applied = self.update(session, |s| {
            s.ticket = reconciled.ticket;
            s.lucky_ref = reconciled.lucky_ref;
            s.lucky_number = reconciled.lucky_number;
            s.winner_ref = reconciled.winner_ref;
        });
        if !applied {
            debug!("Account changed during reconciliation of {}, result dropped", address);
        }
    }

    /// Objects owned by the connected account
    pub async fn owned_objects(&self) -> Result<Vec<LedgerObject>, LotteryError> {
        let address = self.state.borrow().address.clone().ok_or(LotteryError::NotConnected)?;
        Ok(self.ledger.owned_objects(&address).await?)
    }

    /// Re-read the held ticket's display data from the ledger
    pub async fn refresh_ticket(&self) -> Result<(), LotteryError> {
        let (session, ticket_ref) = {
            let s = self.state.borrow();
            (s.session, s.ticket_ref().cloned())
        };
        let Some(id) = ticket_ref else {
            return Ok(());
        };

        let object = self.ledger.get_object(&id).await?;
        let number = object.as_ref().and_then(contract::parse_ticket_number);
        self.update(session, |s| {
            if let Some(ticket) = s.ticket.as_mut().filter(|t| t.id == id) {
                ticket.number = number;
            }
        });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    pub async fn buy_ticket(&self, number: i64) -> Result<(), LotteryError> {
        let number = TicketNumber::try_from(number)
            .map_err(|n| LotteryError::InvalidTicketNumber(n.to_string()));
        self.buy(number).await
    }

    /// `buy_ticket` for raw user input; rejects anything that is not an integer
    pub async fn buy_ticket_input(&self, input: &str) -> Result<(), LotteryError> {
        let number = input
            .parse::<TicketNumber>()
            .map_err(|_| LotteryError::InvalidTicketNumber(input.trim().to_string()));
        self.buy(number).await
    }

    async fn buy(&self, number: Result<TicketNumber, LotteryError>) -> Result<(), LotteryError> {
        let guard = self.begin()?;
        let result = self.run_buy(&guard, number).await;
        self.finish(&guard, "buy_ticket", result)
    }

    async fn run_buy(&self, guard: &ActionGuard<'_>, number: Result<TicketNumber, LotteryError>) -> Result<(), LotteryError> {
        let address = guard.address.clone().ok_or(LotteryError::NotConnected)?;
        let package = self.package()?;
        let number = number?;

        // A new ticket starts a new round
        self.update(guard.session, LotteryState::clear_round);

        let call = contract::buy_ticket(package, number);
        info!("Buying ticket #{} for {}", number, address);
        let digest = self.wallet.sign_and_submit(&address, &call).await?;
        self.mark_submitted(guard, &digest);

        let effects = self.settle(&digest).await?;
        let ticket_id = effects
            .first_created()
            .cloned()
            .ok_or_else(|| LotteryError::NothingCreated(digest.clone()))?;
        info!("Ticket {} created by {}", ticket_id, digest);

        self.persist("ticket", self.cache.set_object_id(CachePurpose::Ticket, &address, &ticket_id));
        for purpose in [CachePurpose::Lucky, CachePurpose::LuckyNumber, CachePurpose::Winner] {
            self.cache.purge(purpose, &address);
        }
        self.update(guard.session, |s| {
            s.ticket = Some(TicketInfo { id: ticket_id, number: None });
        });

        if let Err(e) = self.refresh_ticket().await {
            warn!("Ticket display refresh failed: {}", e);
        }
        Ok(())
    }

    pub async fn draw_lucky(&self) -> Result<(), LotteryError> {
        let guard = self.begin()?;
        let result = self.run_draw(&guard).await;
        self.finish(&guard, "draw_lucky", result)
    }

    async fn run_draw(&self, guard: &ActionGuard<'_>) -> Result<(), LotteryError> {
        let address = guard.address.clone().ok_or(LotteryError::NotConnected)?;
        let package = self.package()?;

        let now = now_millis();
        let remaining_ms = self.cooldown.check(&self.cache, &address, now);
        if remaining_ms > 0 {
            return Err(LotteryError::CooldownActive { remaining_ms });
        }

        let known = self.owned_ids_of_type(&address, TYPE_LUCKY).await?;

        // Debit the cooldown before submitting so a retry cannot bypass it
        self.cache
            .set_last_draw(&address, now)
            .map_err(|e| LotteryError::Store(e.to_string()))?;

        self.update(guard.session, |s| {
            s.winner_ref = None;
            s.winner_status = WinnerStatus::Unknown;
        });

        info!("Drawing lucky number for {}", address);
        let digest = self.wallet.sign_and_submit(&address, &contract::draw_lucky(package)).await?;
        self.mark_submitted(guard, &digest);
        self.settle(&digest).await?;

        let Some(listed) = self.poll_new_object(&self.config.poll, &address, TYPE_LUCKY, &known).await? else {
            warn!("Lucky number from {} not visible in owned objects yet", digest);
            return Err(LotteryError::NotIndexed);
        };

        let lucky_id = listed.id;
        let number = match self.ledger.get_object(&lucky_id).await? {
            Some(object) => contract::parse_lucky_number(&object),
            None => return Err(LotteryError::NotIndexed),
        };
        info!("Lucky number {} = {:?}", lucky_id, number);

        self.persist("lucky", self.cache.set_object_id(CachePurpose::Lucky, &address, &lucky_id));
        match number {
            Some(n) => self.persist("lucky number", self.cache.set_lucky_number(&address, n)),
            None => {
                warn!("Lucky number object {} has no readable value", lucky_id);
                self.cache.purge(CachePurpose::LuckyNumber, &address);
            }
        }
        self.cache.purge(CachePurpose::Winner, &address);

        self.update(guard.session, |s| {
            s.lucky_ref = Some(lucky_id);
            s.lucky_number = number;
        });
        Ok(())
    }

    pub async fn check_winner(&self) -> Result<(), LotteryError> {
        let guard = self.begin()?;
        let result = self.run_check(&guard).await;
        self.finish(&guard, "check_winner", result)
    }

    async fn run_check(&self, guard: &ActionGuard<'_>) -> Result<(), LotteryError> {
        let (ticket_ref, lucky_ref) = {
            let s = self.state.borrow();
            (s.ticket_ref().cloned(), s.lucky_ref.clone())
        };
        let ticket_ref = ticket_ref.ok_or(LotteryError::MissingTicket)?;
        let lucky_ref = lucky_ref.ok_or(LotteryError::MissingLucky)?;
        let package = self.package()?;
        let address = guard.address.clone().ok_or(LotteryError::NotConnected)?;

        let owned = self.ledger.owned_objects(&address).await?;
        if !owned.iter().any(|o| o.id == ticket_ref) {
            warn!("Ticket {} is not owned by {}, purging", ticket_ref, address);
            self.cache.purge(CachePurpose::Ticket, &address);
            self.cache.purge(CachePurpose::Winner, &address);
            self.update(guard.session, |s| {
                s.ticket = None;
                s.winner_ref = None;
                s.winner_status = WinnerStatus::Unknown;
            });
            return Err(LotteryError::TicketNotOwned);
        }
        let known: HashSet<ObjectId> = owned
            .iter()
            .filter(|o| contract::is_type(o, package, TYPE_WINNER))
            .map(|o| o.id.clone())
            .collect();

        info!("Checking ticket {} against {}", ticket_ref, lucky_ref);
        let call = contract::check_winner(package, &ticket_ref, &lucky_ref);
        let digest = self.wallet.sign_and_submit(&address, &call).await?;
        self.mark_submitted(guard, &digest);
        let effects = self.settle(&digest).await?;

        // Effects may omit created objects; still look once after settling
        let policy = if effects.created.is_empty() {
            PollPolicy::fixed(self.config.poll.initial_delay)
        } else {
            self.config.poll
        };
        let badge = self.poll_new_object(&policy, &address, TYPE_WINNER, &known).await?;

        match badge {
            Some(badge) => {
                info!("Winner! badge {}", badge.id);
                self.persist("winner", self.cache.set_object_id(CachePurpose::Winner, &address, &badge.id));
                self.update(guard.session, |s| {
                    s.winner_ref = Some(badge.id);
                    s.winner_status = WinnerStatus::Won;
                });
            }
            None => {
                info!("No winner badge for ticket {}", ticket_ref);
                self.cache.purge(CachePurpose::Winner, &address);
                self.update(guard.session, |s| {
                    s.winner_ref = None;
                    s.winner_status = WinnerStatus::Lost;
                });
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn begin(&self) -> Result<ActionGuard<'_>, LotteryError> {
        let (session, address) = {
            let s = self.state.borrow();
            (s.session, s.address.clone())
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Action rejected: another one is in flight");
            self.update(session, |s| s.last_error = Some(LotteryError::Busy));
            return Err(LotteryError::Busy);
        }

        self.update(session, |s| s.last_error = None);
        Ok(ActionGuard {
            in_flight: &self.in_flight,
            state: &self.state,
            session,
            address,
        })
    }

    fn finish(&self, guard: &ActionGuard<'_>, action: &str, result: Result<(), LotteryError>) -> Result<(), LotteryError> {
        if let Err(e) = &result {
            warn!("{} failed: {}", action, e);
            let err = e.clone();
            self.update(guard.session, move |s| s.last_error = Some(err));
        }
        result
    }

    /// Apply `f` if `session` is still the current one
    fn update(&self, session: u64, f: impl FnOnce(&mut LotteryState)) -> bool {
        self.state.send_if_modified(|s| {
            if s.session != session {
                return false;
            }
            f(s);
            true
        })
    }

    fn mark_submitted(&self, guard: &ActionGuard<'_>, digest: &TxDigest) {
        debug!("Submitted {}", digest);
        let digest = digest.clone();
        self.update(guard.session, |s| {
            s.pending = true;
            s.last_tx = Some(digest);
        });
    }

    fn package(&self) -> Result<&str, LotteryError> {
        self.config
            .package_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(LotteryError::MissingContract)
    }

    fn persist(&self, what: &str, result: Result<(), CacheError>) {
        if let Err(e) = result {
            warn!("Could not cache {}: {}", what, e);
        }
    }

    async fn settle(&self, digest: &TxDigest) -> Result<TransactionEffects, LotteryError> {
        let effects = self.ledger.wait_for_transaction(digest).await?;
        match &effects.status {
            ExecutionStatus::Success => {
                debug!("{} final, {} objects created", digest, effects.created.len());
                Ok(effects)
            }
            ExecutionStatus::Failure(reason) => Err(LotteryError::TransactionFailed {
                digest: digest.clone(),
                reason: reason.clone(),
            }),
        }
    }

    async fn owned_ids_of_type(&self, address: &Address, struct_name: &str) -> Result<HashSet<ObjectId>, LotteryError> {
        let package = self.package()?;
        let owned = self.ledger.owned_objects(address).await?;
        Ok(owned
            .into_iter()
            .filter(|o| contract::is_type(o, package, struct_name))
            .map(|o| o.id)
            .collect())
    }

    /// Poll owner listings for a `struct_name` object not in `known`
    async fn poll_new_object(
        &self,
        policy: &PollPolicy,
        address: &Address,
        struct_name: &str,
        known: &HashSet<ObjectId>,
    ) -> Result<Option<LedgerObject>, LotteryError> {
        let package = self.package()?;
        let found = poll_until(policy, struct_name, move || async move {
            let owned = self.ledger.owned_objects(address).await?;
            Ok::<_, LedgerError>(
                owned
                    .into_iter()
                    .find(|o| contract::is_type(o, package, struct_name) && !known.contains(&o.id)),
            )
        })
        .await?;
        Ok(found)
    }
}
