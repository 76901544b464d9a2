use curve25519_dalek::scalar::Scalar;
use ledger::*;
use readerwriter::{Decodable, Encodable};

const T0: u64 = 1_600_000_000_000_000;
const MINUTE: u64 = 60_000_000;
const NOW: u64 = T0 + 1000 * MINUTE;

fn key(n: u64) -> PublicKey {
    PublicKey::from_secret(&Scalar::from(n))
}

fn new_ledger() -> Ledger<MemoryStore, ClaimedWork> {
    Ledger::new(LedgerConfig::default(), MemoryStore::new(), ClaimedWork)
}

fn relay(msg: &HeaderMessage) -> HeaderMessage {
    HeaderMessage::decode_from_slice(&msg.encode_to_vec()).unwrap()
}

/// Mines `count` headers; from the third one on, each spends the mined
/// credit of the header two back.
fn mine_chain(
    miner: &mut Ledger<MemoryStore, ClaimedWork>,
    count: u64,
) -> (Vec<HeaderMessage>, Vec<Transaction>) {
    let mut headers: Vec<HeaderMessage> = Vec::new();
    let mut transactions = Vec::new();
    for n in 0..count {
        if n >= 2 {
            let credit = headers[n as usize - 2].mined_credit.credit.clone();
            let issuer = headers[n as usize - 1].id();
            let input = miner.credit_in_batch(&issuer, &credit).unwrap().unwrap();
            let tx = Transaction {
                inputs: vec![input],
                outputs: vec![
                    Credit::new(key(100 + n), 1_000),
                    Credit::new(key(200 + n), 2_000),
                ],
            };
            miner.submit_transaction(tx.clone()).unwrap();
            transactions.push(tx);
        }
        let msg = miner.build_next_header(key(n), T0 + n * MINUTE).unwrap();
        assert_eq!(miner.handle_header(msg.clone(), NOW), HeaderOutcome::Accepted);
        headers.push(msg);
    }
    (headers, transactions)
}

#[test]
fn follower_reaches_the_miner_state() {
    let mut miner = new_ledger();
    let (headers, transactions) = mine_chain(&mut miner, 6);
    assert_eq!(miner.spent_chain().spent_positions().count(), 4);

    let mut follower = new_ledger();
    for tx in transactions.iter() {
        follower.store_message(Message::Transaction(tx.clone()));
    }
    for msg in headers.iter().rev() {
        follower.handle_header(relay(msg), NOW);
    }
    assert_eq!(follower.snapshot(), miner.snapshot());
    assert!(follower.mempool().is_empty());
    for msg in headers.iter() {
        assert_eq!(follower.status(&msg.id()), Some(HeaderStatus::Accepted));
    }
}

#[test]
fn spent_chain_matches_every_header() {
    let mut miner = new_ledger();
    let (headers, _) = mine_chain(&mut miner, 5);
    for msg in headers.iter() {
        let chain = miner.spent_chain_at(&msg.id()).unwrap();
        assert_eq!(chain.len(), msg.header().spent_chain_length());
        assert_eq!(chain.hash(), msg.header().spent_chain_hash);
    }
}

#[test]
fn config_file_round_trips() {
    let config = LedgerConfig::from_toml(LedgerConfig::documentation()).unwrap();
    assert_eq!(config, LedgerConfig::default());

    let json = serde_json::to_string(&config).unwrap();
    let back: LedgerConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);

    match LedgerConfig::from_toml("[network]\nnetwork_id = \"one\"\n") {
        Err(LedgerError::Config(_)) => {}
        other => panic!("expected a config error, got {:?}", other),
    }
}

#[test]
fn mempool_survives_serialization() {
    let mut miner = new_ledger();
    let (headers, _) = mine_chain(&mut miner, 2);
    let input = miner
        .credit_in_batch(&headers[1].id(), &headers[0].mined_credit.credit)
        .unwrap()
        .unwrap();
    let tx = Transaction {
        inputs: vec![input],
        outputs: vec![Credit::new(key(7), 5)],
    };
    let id = miner.submit_transaction(tx).unwrap();

    let json = serde_json::to_string(miner.mempool()).unwrap();
    let back: Mempool = serde_json::from_str(&json).unwrap();
    assert_eq!(back.transactions(), &[id]);
    assert!(back.spent_positions().contains(&0));
}
