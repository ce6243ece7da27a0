//! In-process ledger and wallet running the lottery package
//!
//! Executes `buy_ticket`, `draw_lucky` and `check_winner` with the same
//! object model a full node exposes, so the client can be driven end to end
//! without a network. Faults (rejected signatures, finality timeouts, fetch
//! failures, indexer lag) can be injected to exercise every exit path.

use crate::contract::{
    self, CallArg, MoveCall, FN_BUY, FN_CHECK, FN_DRAW, MODULE, TYPE_LUCKY, TYPE_TICKET,
    TYPE_WINNER,
};
use crate::crypto::sha256;
use crate::ledger::{LedgerClient, LedgerError, WalletError, WalletSigner};
use crate::types::{
    Address, ExecutionStatus, LedgerObject, ObjectId, ObjectRef, TransactionEffects, TxDigest,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Move abort codes of the simulated package
pub const ABORT_NOT_OWNER: u64 = 1;
pub const ABORT_MISSING_OBJECT: u64 = 2;
pub const ABORT_BAD_ARGUMENTS: u64 = 3;

struct SimState {
    /// Fixed-width hex ids sort in creation order
    objects: BTreeMap<ObjectId, LedgerObject>,
    effects: HashMap<TxDigest, TransactionEffects>,
    /// Objects hidden from owner listings for this many more queries
    unindexed: HashMap<ObjectId, u32>,
    submitted: Vec<MoveCall>,
    next_object: u64,
    next_tx: u64,
    rng: ChaCha20Rng,
    next_lucky: Option<u64>,

    // Faults
    reject_next_signature: bool,
    fail_next_finality: bool,
    fail_fetches: bool,
    /// Report effects without their created objects
    hide_created: bool,
    failing_owned_queries: u32,
    index_lag: u32,
    latency: Duration,
}

pub struct SimLedger {
    package: String,
    state: Mutex<SimState>,
}

impl SimLedger {
    pub fn new(package: impl Into<String>, seed: u64) -> Self {
        Self {
            package: package.into(),
            state: Mutex::new(SimState {
                objects: BTreeMap::new(),
                effects: HashMap::new(),
                unindexed: HashMap::new(),
                submitted: Vec::new(),
                next_object: 1,
                next_tx: 1,
                rng: ChaCha20Rng::seed_from_u64(seed),
                next_lucky: None,
                reject_next_signature: false,
                fail_next_finality: false,
                fail_fetches: false,
                hide_created: false,
                failing_owned_queries: 0,
                index_lag: 0,
                latency: Duration::ZERO,
            }),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    // -------------------------------------------------------------------------
    // Scripting
    // -------------------------------------------------------------------------

    /// Force the value of the next drawn lucky number
    pub async fn set_next_lucky(&self, number: u64) {
        self.state.lock().await.next_lucky = Some(number);
    }

    pub async fn reject_next_signature(&self) {
        self.state.lock().await.reject_next_signature = true;
    }

    pub async fn fail_next_finality(&self) {
        self.state.lock().await.fail_next_finality = true;
    }

    /// Make every `get_object` fail with `Unavailable`
    pub async fn set_fetch_failures(&self, fail: bool) {
        self.state.lock().await.fail_fetches = fail;
    }

    /// Leave created objects out of reported effects (objects still exist)
    pub async fn set_hide_created_effects(&self, hide: bool) {
        self.state.lock().await.hide_created = hide;
    }

    /// Fail the next `count` owner listings
    pub async fn fail_owned_queries(&self, count: u32) {
        self.state.lock().await.failing_owned_queries = count;
    }

    /// New objects stay out of owner listings for `queries` listings
    pub async fn set_index_lag(&self, queries: u32) {
        self.state.lock().await.index_lag = queries;
    }

    /// Delay applied to every ledger and wallet call
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = latency;
    }

    pub async fn transfer(&self, id: &ObjectId, to: &Address) -> bool {
        let mut state = self.state.lock().await;
        match state.objects.get_mut(id) {
            Some(object) => {
                object.owner = Some(to.clone());
                object.version += 1;
                true
            }
            None => false,
        }
    }

    pub async fn delete(&self, id: &ObjectId) -> bool {
        self.state.lock().await.objects.remove(id).is_some()
    }

    pub async fn object(&self, id: &ObjectId) -> Option<LedgerObject> {
        self.state.lock().await.objects.get(id).cloned()
    }

    /// Every call the wallet accepted, in submission order
    pub async fn submitted_calls(&self) -> Vec<MoveCall> {
        self.state.lock().await.submitted.clone()
    }

    async fn delay(&self) {
        let latency = self.state.lock().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    // -------------------------------------------------------------------------
    // Package execution
    // -------------------------------------------------------------------------

    fn execute(&self, state: &mut SimState, sender: &Address, call: &MoveCall) -> (ExecutionStatus, Vec<ObjectRef>) {
        if call.package != self.package || call.module != MODULE {
            return (ExecutionStatus::Failure(format!("unknown target {}", call.target())), Vec::new());
        }

        let result = match (call.function.as_str(), call.arguments.as_slice()) {
            (FN_BUY, [CallArg::U16(number)]) => {
                let content = json!({ "ticket": { "fields": { "number": number } } });
                Ok(vec![self.create(state, sender, TYPE_TICKET, content)])
            }
            (FN_DRAW, []) => {
                let number = match state.next_lucky.take() {
                    Some(n) => n,
                    None => state.rng.gen_range(0..=u64::from(u16::MAX)),
                };
                Ok(vec![self.create(state, sender, TYPE_LUCKY, json!({ "number": number }))])
            }
            (FN_CHECK, [CallArg::Object(ticket_id), CallArg::Object(lucky_id)]) => {
                self.check_winner(state, sender, ticket_id, lucky_id)
            }
            _ => Err(ABORT_BAD_ARGUMENTS),
        };

        match result {
            Ok(created) => (ExecutionStatus::Success, created),
            Err(code) => (
                ExecutionStatus::Failure(format!("MoveAbort in {}: {}", call.target(), code)),
                Vec::new(),
            ),
        }
    }

    fn check_winner(
        &self,
        state: &mut SimState,
        sender: &Address,
        ticket_id: &ObjectId,
        lucky_id: &ObjectId,
    ) -> Result<Vec<ObjectRef>, u64> {
        let ticket = state.objects.get(ticket_id).ok_or(ABORT_MISSING_OBJECT)?;
        let lucky = state.objects.get(lucky_id).ok_or(ABORT_MISSING_OBJECT)?;
        if ticket.owner.as_ref() != Some(sender) {
            return Err(ABORT_NOT_OWNER);
        }
        if !contract::is_type(ticket, &self.package, TYPE_TICKET)
            || !contract::is_type(lucky, &self.package, TYPE_LUCKY)
        {
            return Err(ABORT_BAD_ARGUMENTS);
        }

        let ticket_number = contract::parse_ticket_number(ticket).map(u64::from);
        let lucky_number = contract::parse_lucky_number(lucky);
        if ticket_number.is_some() && ticket_number == lucky_number {
            let content = json!({ "ticket": ticket_id, "number": lucky_number });
            Ok(vec![self.create(state, sender, TYPE_WINNER, content)])
        } else {
            Ok(Vec::new())
        }
    }

    fn create(&self, state: &mut SimState, owner: &Address, struct_name: &str, content: serde_json::Value) -> ObjectRef {
        let id = ObjectId(format!("0x{:064x}", state.next_object));
        state.next_object += 1;

        let object = LedgerObject {
            id: id.clone(),
            object_type: contract::type_tag(&self.package, struct_name),
            owner: Some(owner.clone()),
            version: 1,
            content,
        };
        debug!("sim: created {} {}", struct_name, id);
        state.objects.insert(id.clone(), object);
        if state.index_lag > 0 {
            state.unindexed.insert(id.clone(), state.index_lag);
        }

        ObjectRef { id, owner: Some(owner.clone()) }
    }
}

impl WalletSigner for SimLedger {
    async fn sign_and_submit(&self, sender: &Address, call: &MoveCall) -> Result<TxDigest, WalletError> {
        self.delay().await;
        let mut state = self.state.lock().await;

        if state.reject_next_signature {
            state.reject_next_signature = false;
            return Err(WalletError::Rejected);
        }

        let digest = TxDigest(hex::encode(sha256(format!("sim-tx-{}", state.next_tx).as_bytes())));
        state.next_tx += 1;
        state.submitted.push(call.clone());

        let (status, mut created) = self.execute(&mut state, sender, call);
        debug!("sim: {} -> {:?} ({} created)", call.target(), status, created.len());
        if state.hide_created {
            created.clear();
        }
        state.effects.insert(
            digest.clone(),
            TransactionEffects { digest: digest.clone(), status, created },
        );

        Ok(digest)
    }
}

impl LedgerClient for SimLedger {
    async fn wait_for_transaction(&self, digest: &TxDigest) -> Result<TransactionEffects, LedgerError> {
        self.delay().await;
        let mut state = self.state.lock().await;

        if state.fail_next_finality {
            state.fail_next_finality = false;
            return Err(LedgerError::Timeout(format!("waiting for {}", digest)));
        }

        state
            .effects
            .get(digest)
            .cloned()
            .ok_or_else(|| LedgerError::TransactionNotFound(digest.clone()))
    }

    async fn get_object(&self, id: &ObjectId) -> Result<Option<LedgerObject>, LedgerError> {
        self.delay().await;
        let state = self.state.lock().await;

        if state.fail_fetches {
            return Err(LedgerError::Unavailable(format!("get_object {}", id)));
        }
        Ok(state.objects.get(id).cloned())
    }

    async fn owned_objects(&self, owner: &Address) -> Result<Vec<LedgerObject>, LedgerError> {
        self.delay().await;
        let mut state = self.state.lock().await;

        if state.failing_owned_queries > 0 {
            state.failing_owned_queries -= 1;
            return Err(LedgerError::Unavailable(format!("owned_objects {}", owner)));
        }

        let SimState { objects, unindexed, .. } = &mut *state;
        let listed: Vec<LedgerObject> = objects
            .values()
            .filter(|o| o.owner.as_ref() == Some(owner))
            .filter(|o| !unindexed.contains_key(&o.id))
            .cloned()
            .collect();

        unindexed.retain(|_, remaining| {
            *remaining -= 1;
            *remaining > 0
        });

        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TicketNumber;

    const PKG: &str = "0xpkg";

    #[tokio::test]
    async fn test_winner_badge_only_on_match() {
        let sim = SimLedger::new(PKG, 1);
        let alice = Address::from("0xA1");

        let d = sim.sign_and_submit(&alice, &contract::buy_ticket(PKG, TicketNumber(42))).await.unwrap();
        let ticket = sim.wait_for_transaction(&d).await.unwrap().created[0].id.clone();

        sim.set_next_lucky(41).await;
        let d = sim.sign_and_submit(&alice, &contract::draw_lucky(PKG)).await.unwrap();
        let lucky = sim.wait_for_transaction(&d).await.unwrap().created[0].id.clone();

        let d = sim.sign_and_submit(&alice, &contract::check_winner(PKG, &ticket, &lucky)).await.unwrap();
        let effects = sim.wait_for_transaction(&d).await.unwrap();
        assert!(effects.status.is_success());
        assert!(effects.created.is_empty());

        sim.set_next_lucky(42).await;
        let d = sim.sign_and_submit(&alice, &contract::draw_lucky(PKG)).await.unwrap();
        let lucky = sim.wait_for_transaction(&d).await.unwrap().created[0].id.clone();

        let d = sim.sign_and_submit(&alice, &contract::check_winner(PKG, &ticket, &lucky)).await.unwrap();
        let effects = sim.wait_for_transaction(&d).await.unwrap();
        assert_eq!(effects.created.len(), 1);
        let badge = sim.object(&effects.created[0].id).await.unwrap();
        assert!(contract::is_type(&badge, PKG, TYPE_WINNER));
    }

    #[tokio::test]
    async fn test_check_aborts_for_foreign_ticket() {
        let sim = SimLedger::new(PKG, 1);
        let alice = Address::from("0xA1");
        let bob = Address::from("0xB2");

        let d = sim.sign_and_submit(&alice, &contract::buy_ticket(PKG, TicketNumber(1))).await.unwrap();
        let ticket = sim.wait_for_transaction(&d).await.unwrap().created[0].id.clone();
        let d = sim.sign_and_submit(&bob, &contract::draw_lucky(PKG)).await.unwrap();
        let lucky = sim.wait_for_transaction(&d).await.unwrap().created[0].id.clone();

        let d = sim.sign_and_submit(&bob, &contract::check_winner(PKG, &ticket, &lucky)).await.unwrap();
        let effects = sim.wait_for_transaction(&d).await.unwrap();
        assert!(!effects.status.is_success());
    }

    #[tokio::test]
    async fn test_index_lag_hides_new_objects() {
        let sim = SimLedger::new(PKG, 1);
        let alice = Address::from("0xA1");
        sim.set_index_lag(2).await;

        sim.sign_and_submit(&alice, &contract::draw_lucky(PKG)).await.unwrap();
        assert!(sim.owned_objects(&alice).await.unwrap().is_empty());
        assert!(sim.owned_objects(&alice).await.unwrap().is_empty());
        assert_eq!(sim.owned_objects(&alice).await.unwrap().len(), 1);
    }
}
