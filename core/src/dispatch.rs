//! Routing inbound traffic to the right event machine.

use {
    log::{debug, warn},
    synod_consensus::{
        NotifyReqMsg, OperatorEvent, SignedHashMsg, StartProcessingBatchMsg,
        MSG_NOTIFY_REQUESTS, MSG_SIGNED_HASH, MSG_START_PROCESSING_BATCH,
    },
    synod_ledger::{AnchorTransaction, LedgerEvent},
    synod_peering::{CommitteeNet, InboundMessage},
    synod_state::{
        BatchHeaderMsg, EvidenceMsg, GetBatchMsg, StateEvent, StateUpdateMsg, MSG_BATCH_HEADER,
        MSG_GET_BATCH, MSG_STATE_INDEX_EVIDENCE, MSG_STATE_UPDATE,
    },
    synod_types::RequestId,
};

/// Where an inbound peer message belongs.
pub enum Routed {
    Operator(OperatorEvent),
    State(StateEvent),
}

/// Decode and route one peer message. Returns `None` for messages from
/// unknown senders, unknown types, and undecodable payloads — all of
/// which are dropped (with a log line), never answered.
pub fn route_inbound(net: &CommitteeNet, inbound: InboundMessage) -> Option<Routed> {
    let Some(sender_index) = net.index_of(&inbound.from_id) else {
        debug!(
            "message type {} from non-committee peer {}, dropped",
            inbound.envelope.msg_type, inbound.from_id
        );
        return None;
    };
    let payload = &inbound.envelope.payload;

    let routed = match inbound.envelope.msg_type {
        MSG_NOTIFY_REQUESTS => Routed::Operator(OperatorEvent::NotifyRequests {
            sender_index,
            msg: ok_or_log(NotifyReqMsg::decode(payload), sender_index)?,
        }),
        MSG_START_PROCESSING_BATCH => Routed::Operator(OperatorEvent::StartProcessingBatch {
            sender_index,
            msg: ok_or_log(StartProcessingBatchMsg::decode(payload), sender_index)?,
        }),
        MSG_SIGNED_HASH => Routed::Operator(OperatorEvent::SignedHash {
            sender_index,
            msg: ok_or_log(SignedHashMsg::decode(payload), sender_index)?,
        }),
        MSG_GET_BATCH => Routed::State(StateEvent::GetBatch {
            sender_index,
            msg: ok_or_log(GetBatchMsg::decode(payload), sender_index)?,
        }),
        MSG_BATCH_HEADER => Routed::State(StateEvent::BatchHeader(ok_or_log(
            BatchHeaderMsg::decode(payload),
            sender_index,
        )?)),
        MSG_STATE_UPDATE => Routed::State(StateEvent::StateUpdate(ok_or_log(
            StateUpdateMsg::decode(payload),
            sender_index,
        )?)),
        MSG_STATE_INDEX_EVIDENCE => {
            let msg: EvidenceMsg = ok_or_log(EvidenceMsg::decode(payload), sender_index)?;
            Routed::State(StateEvent::EvidenceStateIndex {
                sender_index,
                state_index: msg.state_index,
            })
        }
        other => {
            debug!("unknown message type {other} from peer {sender_index}, dropped");
            return None;
        }
    };
    Some(routed)
}

fn ok_or_log<T, E: std::fmt::Display>(result: std::result::Result<T, E>, sender: u16) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("undecodable payload from peer {sender}: {e}");
            None
        }
    }
}

/// Split one ledger event into the events it produces: anchors go to the
/// state manager, request blocks and balances to the operator.
pub fn route_ledger_event(event: LedgerEvent) -> (Option<StateEvent>, Vec<OperatorEvent>) {
    match event {
        LedgerEvent::Balances(balances) => (None, vec![OperatorEvent::Balances(balances)]),
        LedgerEvent::Confirmed(tx) => {
            let requests = extract_requests(&tx);
            let state_event = if tx.state_index > 0 {
                Some(StateEvent::StateTransaction(tx))
            } else {
                None
            };
            (state_event, requests)
        }
    }
}

fn extract_requests(tx: &AnchorTransaction) -> Vec<OperatorEvent> {
    tx.requests
        .iter()
        .enumerate()
        .map(|(index, block)| OperatorEvent::Request {
            id: RequestId::new(tx.tx_id, index as u16),
            block: block.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crossbeam_channel::unbounded,
        std::sync::Arc,
        synod_monitoring::SynodMetrics,
        synod_peering::{Envelope, PeerRegistry, PeeringConfig},
        synod_types::{hash_data, AggregateSignature},
    };

    fn net() -> CommitteeNet {
        let nodes = vec!["127.0.0.1:44000".to_string(), "127.0.0.1:44001".to_string()];
        let (tx, _rx) = unbounded();
        let registry = PeerRegistry::new(
            PeeringConfig::dev_default("127.0.0.1:44000"),
            tx,
            Arc::new(SynodMetrics::new()),
        );
        CommitteeNet::new(registry, nodes, &[], 0).unwrap()
    }

    fn inbound(from: &str, msg_type: u8, payload: Vec<u8>) -> InboundMessage {
        InboundMessage {
            from_id: from.to_string(),
            envelope: Envelope::with_timestamp(msg_type, 1, payload),
        }
    }

    #[test]
    fn test_routes_by_type() {
        let net = net();
        let evidence = EvidenceMsg { state_index: 9 }.encode().unwrap();
        match route_inbound(&net, inbound("127.0.0.1:44001", MSG_STATE_INDEX_EVIDENCE, evidence))
        {
            Some(Routed::State(StateEvent::EvidenceStateIndex {
                sender_index,
                state_index,
            })) => {
                assert_eq!(sender_index, 1);
                assert_eq!(state_index, 9);
            }
            _ => panic!("expected evidence routing"),
        }

        let notify = NotifyReqMsg {
            state_index: 2,
            request_ids: vec![],
        }
        .encode()
        .unwrap();
        assert!(matches!(
            route_inbound(&net, inbound("127.0.0.1:44001", MSG_NOTIFY_REQUESTS, notify)),
            Some(Routed::Operator(OperatorEvent::NotifyRequests { .. }))
        ));
    }

    #[test]
    fn test_unknown_sender_dropped() {
        let net = net();
        let evidence = EvidenceMsg { state_index: 1 }.encode().unwrap();
        assert!(route_inbound(
            &net,
            inbound("127.0.0.1:49999", MSG_STATE_INDEX_EVIDENCE, evidence)
        )
        .is_none());
    }

    #[test]
    fn test_garbage_payload_dropped() {
        let net = net();
        assert!(route_inbound(
            &net,
            inbound("127.0.0.1:44001", MSG_NOTIFY_REQUESTS, b"garbage".to_vec())
        )
        .is_none());
    }

    #[test]
    fn test_unknown_type_dropped() {
        let net = net();
        assert!(route_inbound(&net, inbound("127.0.0.1:44001", 250, vec![])).is_none());
    }

    #[test]
    fn test_ledger_routing_splits_anchor_and_requests() {
        let mut tx = AnchorTransaction::draft(
            synod_types::Address::new([1u8; 20]),
            synod_types::Color::new([2u8; 32]),
            3,
            hash_data(b"state"),
            7,
        );
        tx.requests.push(synod_ledger::RequestBlock::default());
        let tx = tx.finalize(AggregateSignature { bytes: vec![1; 32] });

        let (state_event, operator_events) = route_ledger_event(LedgerEvent::Confirmed(tx));
        assert!(matches!(
            state_event,
            Some(StateEvent::StateTransaction(_))
        ));
        assert_eq!(operator_events.len(), 1);
    }

    #[test]
    fn test_request_only_tx_skips_state_manager() {
        let mut tx = AnchorTransaction::draft(
            synod_types::Address::new([1u8; 20]),
            synod_types::Color::new([2u8; 32]),
            0,
            hash_data(b"state"),
            7,
        );
        tx.requests.push(synod_ledger::RequestBlock::default());
        let tx = tx.finalize(AggregateSignature { bytes: vec![1; 32] });

        let (state_event, operator_events) = route_ledger_event(LedgerEvent::Confirmed(tx));
        assert!(state_event.is_none());
        assert_eq!(operator_events.len(), 1);
    }
}
