//! In-process ledger for tests and local clusters.
//!
//! Submitted anchors confirm immediately and fan out to every subscriber
//! of the involved address. Balance requests are answered synchronously
//! on the subscription channel. This is deliberately the simplest thing
//! that satisfies the [`LedgerClient`] contract.

use {
    crate::{
        error::{LedgerError, Result},
        transaction::{AnchorTransaction, Balances},
        LedgerClient, LedgerEvent,
    },
    crossbeam_channel::{unbounded, Receiver, Sender},
    log::{debug, info},
    parking_lot::Mutex,
    std::collections::HashMap,
    synod_types::Address,
};

#[derive(Default)]
struct Inner {
    subscribers: HashMap<Address, Vec<Sender<LedgerEvent>>>,
    balances: HashMap<Address, Balances>,
    confirmed: Vec<AnchorTransaction>,
}

/// See the module doc.
#[derive(Default)]
pub struct MemLedger {
    inner: Mutex<Inner>,
}

impl MemLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the balances reported for `address`.
    pub fn set_balances(&self, address: Address, balances: Balances) {
        self.inner.lock().balances.insert(address, balances);
    }

    /// Confirm an externally built transaction (e.g. one carrying request
    /// blocks) and fan it out to subscribers. Test entry point.
    pub fn inject(&self, tx: AnchorTransaction) {
        self.confirm(tx);
    }

    /// All transactions confirmed so far, in confirmation order.
    pub fn confirmed(&self) -> Vec<AnchorTransaction> {
        self.inner.lock().confirmed.clone()
    }

    fn confirm(&self, tx: AnchorTransaction) {
        let mut inner = self.inner.lock();
        debug!(
            "ledger confirm tx {} for {} (state index {})",
            tx.tx_id.short(),
            tx.address,
            tx.state_index
        );
        inner.confirmed.push(tx.clone());
        if let Some(subs) = inner.subscribers.get_mut(&tx.address) {
            subs.retain(|s| s.send(LedgerEvent::Confirmed(tx.clone())).is_ok());
        }
    }
}

impl LedgerClient for MemLedger {
    /// Subscribing replays the newest confirmed anchor for the address,
    /// the way a ledger node reports the current state transaction to a
    /// fresh subscriber. A restarted committee node learns the tip from
    /// this even before any peer gossip arrives.
    fn subscribe(&self, address: &Address) -> Receiver<LedgerEvent> {
        let (tx, rx) = unbounded();
        let mut inner = self.inner.lock();
        let latest = inner
            .confirmed
            .iter()
            .filter(|t| t.address == *address && t.state_index > 0)
            .max_by_key(|t| t.state_index)
            .cloned();
        if let Some(latest) = latest {
            let _ = tx.send(LedgerEvent::Confirmed(latest));
        }
        inner.subscribers.entry(*address).or_default().push(tx);
        rx
    }

    fn request_balances(&self, address: &Address) -> Result<()> {
        let mut inner = self.inner.lock();
        let balances = inner.balances.get(address).cloned().unwrap_or_default();
        if let Some(subs) = inner.subscribers.get_mut(address) {
            subs.retain(|s| s.send(LedgerEvent::Balances(balances.clone())).is_ok());
        }
        Ok(())
    }

    fn submit(&self, tx: AnchorTransaction) -> Result<()> {
        if !tx.is_finalized() {
            return Err(LedgerError::NotFinalized(format!(
                "anchor for state index {}",
                tx.state_index
            )));
        }
        // an anchor consumes the previous state output: at most one
        // anchor per state index can ever confirm
        let conflict = self
            .inner
            .lock()
            .confirmed
            .iter()
            .any(|t| t.address == tx.address && t.state_index >= tx.state_index);
        if conflict {
            return Err(LedgerError::Rejected(format!(
                "state index {} already anchored",
                tx.state_index
            )));
        }
        info!(
            "anchor submitted for state index {} (tx {})",
            tx.state_index,
            tx.tx_id.short()
        );
        self.confirm(tx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        synod_types::{hash_data, AggregateSignature, Color},
    };

    fn finalized_anchor(address: Address, state_index: u32) -> AnchorTransaction {
        AnchorTransaction::draft(
            address,
            Color::new([2u8; 32]),
            state_index,
            hash_data(b"state"),
            1,
        )
        .finalize(AggregateSignature { bytes: vec![7; 32] })
    }

    #[test]
    fn test_submit_confirms_to_subscribers() {
        let ledger = MemLedger::new();
        let address = Address::new([1u8; 20]);
        let rx = ledger.subscribe(&address);

        let tx = finalized_anchor(address, 3);
        ledger.submit(tx.clone()).unwrap();

        match rx.try_recv().unwrap() {
            LedgerEvent::Confirmed(got) => assert_eq!(got, tx),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(ledger.confirmed().len(), 1);
    }

    #[test]
    fn test_submit_rejects_draft() {
        let ledger = MemLedger::new();
        let draft = AnchorTransaction::draft(
            Address::new([1u8; 20]),
            Color::new([2u8; 32]),
            1,
            hash_data(b"s"),
            1,
        );
        assert!(matches!(
            ledger.submit(draft),
            Err(LedgerError::NotFinalized(_))
        ));
    }

    #[test]
    fn test_balances_reply_on_subscription() {
        let ledger = MemLedger::new();
        let address = Address::new([1u8; 20]);
        let color = Color::new([3u8; 32]);
        let rx = ledger.subscribe(&address);

        ledger.set_balances(address, Balances::new().with(color, 55));
        ledger.request_balances(&address).unwrap();

        match rx.try_recv().unwrap() {
            LedgerEvent::Balances(b) => assert_eq!(b.of(&color), 55),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_conflicting_anchor_rejected() {
        let ledger = MemLedger::new();
        let address = Address::new([1u8; 20]);
        ledger.submit(finalized_anchor(address, 1)).unwrap();

        // a second anchor for the same index loses the race
        assert!(matches!(
            ledger.submit(finalized_anchor(address, 1)),
            Err(LedgerError::Rejected(_))
        ));
        assert_eq!(ledger.confirmed().len(), 1);

        // the chain continues normally
        ledger.submit(finalized_anchor(address, 2)).unwrap();
    }

    #[test]
    fn test_subscribe_replays_latest_anchor() {
        let ledger = MemLedger::new();
        let address = Address::new([1u8; 20]);
        ledger.submit(finalized_anchor(address, 1)).unwrap();
        ledger.submit(finalized_anchor(address, 2)).unwrap();

        let rx = ledger.subscribe(&address);
        match rx.try_recv().unwrap() {
            LedgerEvent::Confirmed(tx) => assert_eq!(tx.state_index, 2),
            other => panic!("unexpected event {other:?}"),
        }
        // only the newest anchor is replayed
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_confirmations_scoped_by_address() {
        let ledger = MemLedger::new();
        let a = Address::new([1u8; 20]);
        let b = Address::new([2u8; 20]);
        let rx_b = ledger.subscribe(&b);

        ledger.submit(finalized_anchor(a, 1)).unwrap();
        assert!(rx_b.try_recv().is_err());
    }
}
