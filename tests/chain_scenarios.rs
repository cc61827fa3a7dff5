//! End-to-end chain scenarios: genesis, spending, failure modes and the
//! structural invariants of the block store.

mod common;

use common::{balance, coinbase, create_chain};
use lumen_chain::core::monetary::INITIAL_BLOCK_REWARD;
use lumen_chain::core::{ProofOfWork, Transaction};
use lumen_chain::error::ChainError;
use lumen_chain::storage::UTXOSet;
use lumen_chain::wallet::Wallet;
use tempfile::tempdir;

#[test]
fn test_genesis_chain() {
    let dir = tempdir().unwrap();
    let alice = Wallet::new().unwrap();
    let chain = create_chain(dir.path(), &alice);
    let utxo_set = UTXOSet::new(chain.clone());
    utxo_set.reindex().unwrap();

    assert_eq!(chain.get_block_count(), 1);
    assert_eq!(chain.get_best_height().unwrap(), 0);
    assert_eq!(balance(&utxo_set, &alice), INITIAL_BLOCK_REWARD);

    let genesis = chain.get_block(&chain.get_tip_hash()).unwrap();
    assert!(ProofOfWork::validate(&genesis));
}

#[test]
fn test_send_with_local_mining() {
    let dir = tempdir().unwrap();
    let alice = Wallet::new().unwrap();
    let bob = Wallet::new().unwrap();
    let chain = create_chain(dir.path(), &alice);
    let utxo_set = UTXOSet::new(chain.clone());
    utxo_set.reindex().unwrap();

    let amount = 50;
    let tx = Transaction::new_utxo_tx(&alice, &bob.get_address(), amount, &utxo_set).unwrap();
    assert!(chain.verify_tx(&tx).unwrap());

    let cb = coinbase(&alice.get_address(), chain.current_reward());
    let block = chain.mine_block(&[cb, tx]).unwrap();
    utxo_set.update(&block).unwrap();

    assert_eq!(chain.get_block_count(), 2);
    assert_eq!(balance(&utxo_set, &alice), 2 * INITIAL_BLOCK_REWARD - amount);
    assert_eq!(balance(&utxo_set, &bob), amount);

    // the incrementally maintained index matches a fresh rebuild
    let incremental = (
        balance(&utxo_set, &alice),
        balance(&utxo_set, &bob),
        utxo_set.count_transactions().unwrap(),
    );
    utxo_set.reindex().unwrap();
    let rebuilt = (
        balance(&utxo_set, &alice),
        balance(&utxo_set, &bob),
        utxo_set.count_transactions().unwrap(),
    );
    assert_eq!(incremental, rebuilt);
}

#[test]
fn test_send_exceeding_funds_fails_cleanly() {
    let dir = tempdir().unwrap();
    let alice = Wallet::new().unwrap();
    let bob = Wallet::new().unwrap();
    let chain = create_chain(dir.path(), &alice);
    let utxo_set = UTXOSet::new(chain.clone());
    utxo_set.reindex().unwrap();

    let result = Transaction::new_utxo_tx(
        &alice,
        &bob.get_address(),
        INITIAL_BLOCK_REWARD + 1,
        &utxo_set,
    );
    assert!(matches!(
        result,
        Err(ChainError::InsufficientFunds {
            required,
            available,
        }) if required == INITIAL_BLOCK_REWARD + 1 && available == INITIAL_BLOCK_REWARD
    ));

    // the chain and index are untouched
    assert_eq!(chain.get_block_count(), 1);
    assert_eq!(balance(&utxo_set, &alice), INITIAL_BLOCK_REWARD);
    assert_eq!(balance(&utxo_set, &bob), 0);
}

#[test]
fn test_chain_linkage_from_tip_to_genesis() {
    let dir = tempdir().unwrap();
    let alice = Wallet::new().unwrap();
    let chain = create_chain(dir.path(), &alice);
    for _ in 0..3 {
        chain
            .mine_block(&[coinbase(&alice.get_address(), chain.current_reward())])
            .unwrap();
    }

    // following prev hashes reaches the empty-prev genesis in exactly
    // tip.height + 1 steps
    let tip_height = chain.get_best_height().unwrap();
    let mut current = chain.get_block(&chain.get_tip_hash()).unwrap();
    let mut steps: usize = 1;
    while !current.get_prev_block_hash().is_empty() {
        let parent = chain.get_block(current.get_prev_block_hash()).unwrap();
        assert_eq!(current.get_prev_block_hash(), parent.get_hash());
        assert_eq!(current.get_height(), parent.get_height() + 1);
        current = parent;
        steps += 1;
    }
    assert_eq!(steps, tip_height + 1);
    assert_eq!(current.get_height(), 0);
}

#[test]
fn test_balance_conservation_per_block() {
    let dir = tempdir().unwrap();
    let alice = Wallet::new().unwrap();
    let bob = Wallet::new().unwrap();
    let chain = create_chain(dir.path(), &alice);
    let utxo_set = UTXOSet::new(chain.clone());
    utxo_set.reindex().unwrap();

    let tx = Transaction::new_utxo_tx(&alice, &bob.get_address(), 123, &utxo_set).unwrap();
    let cb = coinbase(&alice.get_address(), chain.current_reward());
    let block = chain.mine_block(&[cb, tx]).unwrap();
    utxo_set.update(&block).unwrap();

    // no fees: each transfer's outputs sum to its consumed inputs, so
    // the total supply grows by exactly one reward per mined block
    let total = balance(&utxo_set, &alice) + balance(&utxo_set, &bob);
    assert_eq!(total, 2 * INITIAL_BLOCK_REWARD);

    for tx in block.get_transactions() {
        if tx.is_coinbase() {
            continue;
        }
        let output_sum: u64 = tx.get_vout().iter().map(|out| out.get_value()).sum();
        let input_sum: u64 = tx
            .get_vin()
            .iter()
            .map(|vin| {
                let prev = chain.find_transaction(vin.get_txid()).unwrap();
                prev.get_vout()[vin.get_vout() as usize].get_value()
            })
            .sum();
        assert_eq!(output_sum, input_sum);
    }
}

#[test]
fn test_mine_block_rejects_invalid_transaction() {
    let dir = tempdir().unwrap();
    let alice = Wallet::new().unwrap();
    let bob = Wallet::new().unwrap();
    let mallory = Wallet::new().unwrap();
    let chain = create_chain(dir.path(), &alice);
    let utxo_set = UTXOSet::new(chain.clone());
    utxo_set.reindex().unwrap();

    // a transfer signed by the wrong key never reaches a block
    let mut tx = Transaction::new_utxo_tx(&alice, &bob.get_address(), 10, &utxo_set).unwrap();
    chain.sign_tx(&mut tx, mallory.get_pkcs8()).unwrap();

    let result = chain.mine_block(&[tx]);
    assert!(matches!(result, Err(ChainError::InvalidTx(_))));
    assert_eq!(chain.get_block_count(), 1);
}
