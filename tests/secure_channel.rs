//! Integration tests for key exchange, the secure channel, and session
//! expiry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use ecdh_keypool::{
    ChannelMessage, ChannelTransport, Command, CommandContext, CommandHandler, CommandRouter,
    KeyExchangeCrypto, KeyStore, KeypoolError, ManualClock, P256Crypto, ReceiveOutcome,
    SecureChannel, SequenceDirection, SessionEstablisher, SqliteKeyStore, SymmetricSessionKey,
};
use parking_lot::Mutex;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct Outbox(Mutex<Vec<ChannelMessage>>);

impl Outbox {
    fn take(&self) -> Vec<ChannelMessage> {
        std::mem::take(&mut *self.0.lock())
    }
}

#[async_trait]
impl ChannelTransport for Outbox {
    async fn deliver(&self, message: &ChannelMessage) -> ecdh_keypool::Result<()> {
        self.0.lock().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
struct Handled(Mutex<Vec<(Command, Vec<u8>)>>);

impl CommandHandler for Handled {
    fn handle(&self, command: Command, context: &CommandContext) {
        self.0.lock().push((command, context.payload.clone()));
    }
}

struct Endpoint {
    store: Arc<SqliteKeyStore>,
    channel: SecureChannel,
    outbox: Arc<Outbox>,
    handled: Arc<Handled>,
}

fn endpoint(clock: Arc<ManualClock>) -> Endpoint {
    let store = Arc::new(SqliteKeyStore::open_in_memory_with_clock(clock).expect("open store"));
    let outbox = Arc::new(Outbox::default());
    let handled = Arc::new(Handled::default());
    let router = Arc::new(CommandRouter::new());
    for command in [
        Command::BeginLocate,
        Command::BeginWipe,
        Command::PasswordReset,
        Command::KeyExchangeFailed,
    ] {
        router.register(command, handled.clone());
    }
    let channel = SecureChannel::new(store.clone(), Arc::new(P256Crypto), outbox.clone(), router);
    Endpoint {
        store,
        channel,
        outbox,
        handled,
    }
}

fn start_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ))
}

// ============================================================================
// Key exchange through to an encrypted command
// ============================================================================

#[tokio::test]
async fn exchange_then_encrypted_command() {
    let clock = start_clock();
    let device = endpoint(clock.clone());
    let server = endpoint(clock.clone());

    // Device publishes a pair; the server answers with its own half.
    let device_pair = P256Crypto.generate_key_pair("kx-1".to_string()).unwrap();
    device.store.insert_ecdh_key_pair(&device_pair).unwrap();
    let server_pair = P256Crypto.generate_key_pair("kx-1".to_string()).unwrap();

    let establisher = SessionEstablisher::new(device.store.clone(), Arc::new(P256Crypto));
    establisher
        .establish("kx-1", &hex::encode(server_pair.public_point()))
        .expect("establish");
    let server_session = P256Crypto
        .derive_session_key(&server_pair, device_pair.public_point())
        .unwrap();
    server.store.insert_symmetric_key(&server_session).unwrap();

    server
        .channel
        .send("kx-1", Command::BeginWipe, b"factory")
        .await
        .expect("send");
    for message in server.outbox.take() {
        let json = message.to_json().unwrap();
        device.channel.receive_json(&json).await.expect("receive");
    }

    assert_eq!(
        device.handled.0.lock().as_slice(),
        &[(Command::BeginWipe, b"factory".to_vec())]
    );
    assert!(device.store.get_ecdh_key_pair("kx-1").unwrap().is_none());
}

#[tokio::test]
async fn both_directions_keep_separate_counters() {
    let clock = start_clock();
    let a = endpoint(clock.clone());
    let b = endpoint(clock);
    let key = SymmetricSessionKey::new("s1", [4u8; 32]);
    a.store.insert_symmetric_key(&key).unwrap();
    b.store.insert_symmetric_key(&key).unwrap();

    for _ in 0..3 {
        a.channel.send("s1", Command::BeginLocate, b"").await.unwrap();
    }
    b.channel.send("s1", Command::PasswordReset, b"").await.unwrap();
    for message in a.outbox.take() {
        b.channel.receive(message).await.unwrap();
    }
    for message in b.outbox.take() {
        a.channel.receive(message).await.unwrap();
    }

    let a_key = a.store.get_symmetric_key("s1").unwrap().unwrap();
    let b_key = b.store.get_symmetric_key("s1").unwrap().unwrap();
    assert_eq!((a_key.local_sequence, a_key.remote_sequence), (4, 2));
    assert_eq!((b_key.local_sequence, b_key.remote_sequence), (2, 4));
}

// ============================================================================
// Replay
// ============================================================================

#[tokio::test]
async fn sequence_at_or_below_remote_is_dropped() {
    let clock = start_clock();
    let sender = endpoint(clock.clone());
    let receiver = endpoint(clock);

    let mut outbound = SymmetricSessionKey::new("s1", [7u8; 32]);
    outbound.local_sequence = 4;
    sender.store.insert_symmetric_key(&outbound).unwrap();
    let mut inbound = SymmetricSessionKey::new("s1", [7u8; 32]);
    inbound.remote_sequence = 5;
    receiver.store.insert_symmetric_key(&inbound).unwrap();

    let five = sender.channel.send("s1", Command::BeginLocate, b"a").await.unwrap();
    let six = sender.channel.send("s1", Command::BeginLocate, b"b").await.unwrap();
    assert_eq!((five.sequence, six.sequence), (5, 6));

    let dropped = receiver
        .channel
        .receive(ChannelMessage::Encrypted(five))
        .await
        .unwrap();
    assert_eq!(dropped, ReceiveOutcome::Dropped);
    assert!(receiver.handled.0.lock().is_empty());

    let accepted = receiver
        .channel
        .receive(ChannelMessage::Encrypted(six.clone()))
        .await
        .unwrap();
    assert!(matches!(accepted, ReceiveOutcome::Dispatched { .. }));
    let stored = receiver.store.get_symmetric_key("s1").unwrap().unwrap();
    assert_eq!(stored.remote_sequence, 6);

    let replayed = receiver
        .channel
        .receive(ChannelMessage::Encrypted(six))
        .await
        .unwrap();
    assert_eq!(replayed, ReceiveOutcome::Dropped);
    assert_eq!(receiver.handled.0.lock().len(), 1);
}

// ============================================================================
// Expiration
// ============================================================================

#[tokio::test]
async fn session_key_vanishes_after_sixty_one_minutes() {
    let clock = start_clock();
    let a = endpoint(clock.clone());
    let b = endpoint(clock.clone());
    let key = SymmetricSessionKey::new("s1", [2u8; 32]);
    a.store.insert_symmetric_key(&key).unwrap();
    b.store.insert_symmetric_key(&key).unwrap();
    let sent = a.channel.send("s1", Command::BeginLocate, b"").await.unwrap();

    clock.advance(chrono::Duration::minutes(61));

    assert!(b.store.get_symmetric_key("s1").unwrap().is_none());
    assert_eq!(b.store.claim_local_sequence("s1").unwrap(), None);
    assert!(!b.store.advance_remote_sequence("s1", 99).unwrap());
    assert_eq!(
        b.store
            .increment_sequence("s1", SequenceDirection::Remote)
            .unwrap(),
        0
    );

    let err = b
        .channel
        .receive(ChannelMessage::Encrypted(sent))
        .await
        .unwrap_err();
    assert!(matches!(err, KeypoolError::UnknownSession(_)));

    let err = a.channel.send("s1", Command::BeginLocate, b"").await.unwrap_err();
    assert!(matches!(err, KeypoolError::NoActiveSession(_)));
}

#[tokio::test]
async fn missing_session_notifies_peer() {
    let device = endpoint(start_clock());

    let err = device
        .channel
        .send("never", Command::BeginLocate, b"")
        .await
        .unwrap_err();
    assert!(matches!(err, KeypoolError::NoActiveSession(_)));

    let sent = device.outbox.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].command(), Command::KeyExchangeFailed);
    assert_eq!(
        sent[0].to_json().unwrap(),
        r#"{"command":"key_exchange_failed"}"#
    );
}

#[tokio::test]
async fn plaintext_command_is_routed() {
    let device = endpoint(start_clock());
    let outcome = device
        .channel
        .receive_json(r#"{"command":"key_exchange_failed"}"#)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReceiveOutcome::Dispatched {
            command: Command::KeyExchangeFailed,
            handled: true
        }
    );
}
