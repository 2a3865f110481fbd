//! Transport seams between the engine and the server.
//!
//! Two channels exist per entity type: a request/response channel for
//! handshakes, reads and mutations ([`CallTransport`]) and a push channel
//! for realtime events ([`RealtimeTransport`]). The engine never speaks a
//! concrete wire format; hosts implement these traits over whatever
//! transport they have (HTTP, WebSocket, IPC), and tests use the scripted
//! mocks in this module.

use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{Receiver, Sender};
use syncmirror_protocol::{
    BatchEntryResult, CallResult, HandshakeRequest, HandshakeResponse, HistoryResult,
    MutationRequest, ReadRequest, RealtimeMessage,
};
use syncmirror_store::QueueEntry;

/// Request/response channel to the server.
pub trait CallTransport: Send + Sync {
    /// Announces an entity type and its schema.
    fn handshake(&self, request: &HandshakeRequest) -> EngineResult<HandshakeResponse>;

    /// Sends a single mutation.
    fn mutate(&self, request: &MutationRequest) -> EngineResult<CallResult>;

    /// Reads records for an entity type.
    fn read(&self, entity: &str, request: &ReadRequest) -> EngineResult<CallResult>;

    /// Replays queued mutations in order; the server reports a verdict per
    /// entry.
    fn batch(&self, entries: &[QueueEntry]) -> EngineResult<Vec<BatchEntryResult>>;

    /// Lists the stored versions of one entity.
    fn history(&self, entity: &str, id: &str) -> EngineResult<HistoryResult>;

    /// Restores one entity to a stored version.
    fn history_restore(&self, entity: &str, id: &str, version: u64) -> EngineResult<CallResult>;

    /// Deletes one stored version of one entity.
    fn history_delete(&self, entity: &str, id: &str, version: u64) -> EngineResult<CallResult>;

    /// Invokes a server-defined action outside the standard verb set.
    fn custom(
        &self,
        entity: &str,
        action: &str,
        payload: &serde_json::Value,
    ) -> EngineResult<CallResult>;
}

/// Push channel from the server.
pub trait RealtimeTransport: Send + Sync {
    /// Starts the event stream for an entity type.
    ///
    /// Messages arrive in server order per entity identity.
    fn subscribe(&self, entity: &str) -> EngineResult<Receiver<RealtimeMessage>>;

    /// Confirms that the message with sequence `seq` was applied.
    fn ack(&self, entity: &str, seq: u64) -> EngineResult<()>;
}

/// A scripted [`CallTransport`] for tests.
///
/// Every request is recorded. Responses default to success and can be
/// overridden per channel; queued read responses are consumed in order.
#[derive(Default)]
pub struct MockCallTransport {
    handshake_response: Mutex<Option<HandshakeResponse>>,
    mutation_response: Mutex<Option<CallResult>>,
    read_responses: Mutex<VecDeque<CallResult>>,
    batch_responses: Mutex<Option<Vec<BatchEntryResult>>>,
    history_response: Mutex<Option<HistoryResult>>,
    fail_network: Mutex<bool>,

    handshakes: Mutex<Vec<HandshakeRequest>>,
    mutations: Mutex<Vec<MutationRequest>>,
    reads: Mutex<Vec<(String, ReadRequest)>>,
    batches: Mutex<Vec<Vec<QueueEntry>>>,
    customs: Mutex<Vec<(String, String, serde_json::Value)>>,
}

impl MockCallTransport {
    /// Creates a transport that answers success to everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the handshake response.
    pub fn set_handshake_response(&self, response: HandshakeResponse) {
        *self.handshake_response.lock() = Some(response);
    }

    /// Scripts the response for all subsequent mutations.
    pub fn set_mutation_response(&self, response: CallResult) {
        *self.mutation_response.lock() = Some(response);
    }

    /// Queues a read response; consumed in FIFO order.
    pub fn push_read_response(&self, response: CallResult) {
        self.read_responses.lock().push_back(response);
    }

    /// Scripts the per-entry verdicts for the next batch.
    pub fn set_batch_responses(&self, responses: Vec<BatchEntryResult>) {
        *self.batch_responses.lock() = Some(responses);
    }

    /// Scripts the history listing.
    pub fn set_history_response(&self, response: HistoryResult) {
        *self.history_response.lock() = Some(response);
    }

    /// Makes every call fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        *self.fail_network.lock() = offline;
    }

    /// Recorded handshake requests.
    pub fn handshakes(&self) -> Vec<HandshakeRequest> {
        self.handshakes.lock().clone()
    }

    /// Recorded mutation requests, in send order.
    pub fn mutations(&self) -> Vec<MutationRequest> {
        self.mutations.lock().clone()
    }

    /// Recorded read requests.
    pub fn reads(&self) -> Vec<(String, ReadRequest)> {
        self.reads.lock().clone()
    }

    /// Recorded batch submissions.
    pub fn batches(&self) -> Vec<Vec<QueueEntry>> {
        self.batches.lock().clone()
    }

    /// Recorded custom-action invocations.
    pub fn customs(&self) -> Vec<(String, String, serde_json::Value)> {
        self.customs.lock().clone()
    }

    fn check_online(&self) -> EngineResult<()> {
        if *self.fail_network.lock() {
            Err(EngineError::Operation("network unreachable".into()))
        } else {
            Ok(())
        }
    }
}

impl CallTransport for MockCallTransport {
    fn handshake(&self, request: &HandshakeRequest) -> EngineResult<HandshakeResponse> {
        self.check_online()?;
        self.handshakes.lock().push(request.clone());
        Ok(self
            .handshake_response
            .lock()
            .clone()
            .unwrap_or_else(HandshakeResponse::success))
    }

    fn mutate(&self, request: &MutationRequest) -> EngineResult<CallResult> {
        self.check_online()?;
        self.mutations.lock().push(request.clone());
        Ok(self
            .mutation_response
            .lock()
            .clone()
            .unwrap_or_else(CallResult::success))
    }

    fn read(&self, entity: &str, request: &ReadRequest) -> EngineResult<CallResult> {
        self.check_online()?;
        self.reads.lock().push((entity.to_owned(), request.clone()));
        Ok(self
            .read_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| CallResult::with_data(Vec::new())))
    }

    fn batch(&self, entries: &[QueueEntry]) -> EngineResult<Vec<BatchEntryResult>> {
        self.check_online()?;
        self.batches.lock().push(entries.to_vec());
        if let Some(scripted) = self.batch_responses.lock().take() {
            return Ok(scripted);
        }
        Ok(entries
            .iter()
            .map(|entry| BatchEntryResult::success(entry.entry_id))
            .collect())
    }

    fn history(&self, _entity: &str, _id: &str) -> EngineResult<HistoryResult> {
        self.check_online()?;
        Ok(self
            .history_response
            .lock()
            .clone()
            .unwrap_or_else(|| HistoryResult::with_versions(Vec::new())))
    }

    fn history_restore(&self, _entity: &str, _id: &str, _version: u64) -> EngineResult<CallResult> {
        self.check_online()?;
        Ok(CallResult::success())
    }

    fn history_delete(&self, _entity: &str, _id: &str, _version: u64) -> EngineResult<CallResult> {
        self.check_online()?;
        Ok(CallResult::success())
    }

    fn custom(
        &self,
        entity: &str,
        action: &str,
        payload: &serde_json::Value,
    ) -> EngineResult<CallResult> {
        self.check_online()?;
        self.customs
            .lock()
            .push((entity.to_owned(), action.to_owned(), payload.clone()));
        Ok(CallResult::success())
    }
}

/// A scripted [`RealtimeTransport`] for tests.
///
/// [`MockRealtimeTransport::emit`] pushes a message to the subscriber as
/// the server would; acknowledgements are recorded per entity type.
#[derive(Default)]
pub struct MockRealtimeTransport {
    senders: Mutex<HashMap<String, Sender<RealtimeMessage>>>,
    acks: Mutex<Vec<(String, u64)>>,
    refuse_subscribe: Mutex<bool>,
}

impl MockRealtimeTransport {
    /// Creates a transport with no active subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent subscriptions fail.
    pub fn set_refuse_subscribe(&self, refuse: bool) {
        *self.refuse_subscribe.lock() = refuse;
    }

    /// Pushes a message to the subscriber for `entity`.
    ///
    /// Returns false when nothing is subscribed or the receiver is gone.
    pub fn emit(&self, entity: &str, message: RealtimeMessage) -> bool {
        match self.senders.lock().get(entity) {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Sequence numbers acknowledged for `entity`, in arrival order.
    pub fn acked(&self, entity: &str) -> Vec<u64> {
        self.acks
            .lock()
            .iter()
            .filter(|(name, _)| name == entity)
            .map(|(_, seq)| *seq)
            .collect()
    }
}

impl RealtimeTransport for MockRealtimeTransport {
    fn subscribe(&self, entity: &str) -> EngineResult<Receiver<RealtimeMessage>> {
        if *self.refuse_subscribe.lock() {
            return Err(EngineError::Connection {
                entity: entity.to_owned(),
                message: "subscription refused".into(),
            });
        }
        let (sender, receiver) = std::sync::mpsc::channel();
        self.senders.lock().insert(entity.to_owned(), sender);
        Ok(receiver)
    }

    fn ack(&self, entity: &str, seq: u64) -> EngineResult<()> {
        self.acks.lock().push((entity.to_owned(), seq));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncmirror_protocol::{EventKind, MutationKind, Record};

    #[test]
    fn mock_calls_default_to_success() {
        let transport = MockCallTransport::new();
        let request = MutationRequest {
            entity: "task".into(),
            kind: MutationKind::Create,
            payload: Record::with_id("e-1"),
        };
        let result = transport.mutate(&request).unwrap();
        assert!(result.success);
        assert_eq!(transport.mutations().len(), 1);
    }

    #[test]
    fn scripted_read_responses_consume_in_order() {
        let transport = MockCallTransport::new();
        transport.push_read_response(CallResult::error("first"));
        transport.push_read_response(CallResult::success());

        let first = transport.read("task", &ReadRequest::All).unwrap();
        let second = transport.read("task", &ReadRequest::All).unwrap();
        assert!(!first.success);
        assert!(second.success);
    }

    #[test]
    fn offline_transport_fails_every_call() {
        let transport = MockCallTransport::new();
        transport.set_offline(true);

        let request = MutationRequest {
            entity: "task".into(),
            kind: MutationKind::Delete,
            payload: Record::with_id("e-1"),
        };
        assert!(transport.mutate(&request).is_err());
        assert!(transport.mutations().is_empty());
    }

    #[test]
    fn realtime_emit_reaches_subscriber() {
        let transport = MockRealtimeTransport::new();
        let receiver = transport.subscribe("task").unwrap();

        let message = RealtimeMessage {
            seq: 7,
            event: EventKind::Create,
            data: Record::with_id("e-1"),
        };
        assert!(transport.emit("task", message));

        let received = receiver.recv().unwrap();
        assert_eq!(received.seq, 7);

        transport.ack("task", 7).unwrap();
        assert_eq!(transport.acked("task"), vec![7]);
    }

    #[test]
    fn emit_without_subscriber_is_reported() {
        let transport = MockRealtimeTransport::new();
        let message = RealtimeMessage {
            seq: 1,
            event: EventKind::Delete,
            data: Record::with_id("e-1"),
        };
        assert!(!transport.emit("task", message));
    }
}
