use crate::error::{ChainError, Result};
use crate::storage::UTXOSet;
use crate::utils::{
    deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_verify, random_bytes, serialize,
    sha256_digest,
};
use crate::wallet::{hash_pub_key, pub_key_hash_from_address, Wallet};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Length of the random data stuffed into a coinbase input when the
/// caller provides none; it randomizes the coinbase transaction id.
const COINBASE_DATA_LEN: usize = 20;

/// The sentinel output index of a coinbase input.
const COINBASE_VOUT: i64 = -1;

/// A reference to an output of a previous transaction, together with
/// the signature and public key that unlock it. A coinbase input has an
/// empty `txid`, `vout` of -1 and arbitrary data in `pub_key`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: i64,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: i64) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(self.pub_key.as_slice()).eq(pub_key_hash)
    }
}

/// An amount locked to the hash of the receiver's public key.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        let mut output = TXOutput {
            value,
            pub_key_hash: vec![],
        };
        output.lock(address)?;
        Ok(output)
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    fn lock(&mut self, address: &str) -> Result<()> {
        self.pub_key_hash = pub_key_hash_from_address(address)?;
        Ok(())
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

/// A transfer of value: inputs consuming previous outputs, and newly
/// created outputs. The id is the SHA-256 of the id-cleared
/// serialization and never changes after signing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Builds the transaction that mints a block's reward. Empty `data`
    /// is replaced by random bytes so two coinbases to the same address
    /// never collide on id.
    pub fn new_coinbase_tx(to: &str, data: Vec<u8>, reward: u64) -> Result<Transaction> {
        let data = if data.is_empty() {
            random_bytes(COINBASE_DATA_LEN)?
        } else {
            data
        };

        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            signature: vec![],
            pub_key: data,
        };
        let tx_output = TXOutput::new(reward, to)?;

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![tx_output],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Builds and signs a transfer from `wallet` to `to`, selecting
    /// coins through the UTXO index. Over-selection produces a change
    /// output back to the sender.
    pub fn new_utxo_tx(
        wallet: &Wallet,
        to: &str,
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(ChainError::InvalidTx(
                "transfer amount must be positive".to_string(),
            ));
        }

        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        let (accumulated, spendable) = utxo_set.find_spendable_outputs(&pub_key_hash, amount)?;
        if accumulated < amount {
            return Err(ChainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut vin = vec![];
        for (txid_hex, out_indices) in &spendable {
            let txid = HEXLOWER
                .decode(txid_hex.as_bytes())
                .map_err(|e| ChainError::Serialization(format!("invalid transaction id: {e}")))?;
            for &out_idx in out_indices {
                vin.push(TXInput {
                    txid: txid.clone(),
                    vout: out_idx as i64,
                    signature: vec![],
                    pub_key: wallet.get_public_key().to_vec(),
                });
            }
        }

        let mut vout = vec![TXOutput::new(amount, to)?];
        if accumulated > amount {
            vout.push(TXOutput::new(accumulated - amount, &wallet.get_address())?);
        }

        let mut tx = Transaction {
            id: vec![],
            vin,
            vout,
        };
        tx.id = tx.hash()?;
        utxo_set
            .get_blockchain()
            .sign_tx(&mut tx, wallet.get_pkcs8())?;
        Ok(tx)
    }

    /// A copy carrying only the output references of each input; the
    /// scratch structure the per-input signing digests are derived from.
    fn trimmed_copy(&self) -> Transaction {
        let vin = self
            .vin
            .iter()
            .map(|input| TXInput::new(input.get_txid(), input.get_vout()))
            .collect();
        Transaction {
            id: self.id.clone(),
            vin,
            vout: self.vout.clone(),
        }
    }

    /// Signs every input against the outputs it consumes. For input i
    /// the digest is the id of the trimmed copy with input i's scratch
    /// `pub_key` temporarily holding the referenced output's pubkey
    /// hash; the scratch field is cleared before moving on.
    pub(crate) fn sign(
        &mut self,
        pkcs8: &[u8],
        prev_txs: &HashMap<String, Transaction>,
    ) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut tx_copy = self.trimmed_copy();
        for idx in 0..self.vin.len() {
            let prev_output = Self::referenced_output(&self.vin[idx], prev_txs)?.clone();

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_output.pub_key_hash;
            tx_copy.id = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            self.vin[idx].signature = ecdsa_p256_sha256_sign_digest(pkcs8, &tx_copy.id)?;
        }
        Ok(())
    }

    /// Replays the signing digests and checks each input's `r || s`
    /// against its recorded public key. Coinbase transactions verify
    /// trivially.
    pub fn verify(&self, prev_txs: &HashMap<String, Transaction>) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_output = Self::referenced_output(vin, prev_txs)?.clone();

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_output.pub_key_hash;
            tx_copy.id = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            if !ecdsa_p256_sha256_verify(&vin.pub_key, &vin.signature, &tx_copy.id) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn referenced_output<'a>(
        vin: &TXInput,
        prev_txs: &'a HashMap<String, Transaction>,
    ) -> Result<&'a TXOutput> {
        let txid_hex = HEXLOWER.encode(vin.get_txid());
        let prev_tx = prev_txs
            .get(&txid_hex)
            .ok_or(ChainError::UnknownPrevTx(txid_hex))?;
        let out_idx = usize::try_from(vin.get_vout()).map_err(|_| {
            ChainError::InvalidTx("negative output index on a non-coinbase input".to_string())
        })?;
        prev_tx.vout.get(out_idx).ok_or_else(|| {
            ChainError::InvalidTx(format!("input references output {out_idx} past the end"))
        })
    }

    /// A coinbase has exactly one input with an empty previous id and
    /// the -1 sentinel index.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    /// SHA-256 of the serialization with the id field cleared.
    fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(&tx_copy.serialize()?))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Transaction {}:", HEXLOWER.encode(&self.id))?;
        for (idx, input) in self.vin.iter().enumerate() {
            writeln!(f, "  input {idx}:")?;
            writeln!(f, "    txid:      {}", HEXLOWER.encode(&input.txid))?;
            writeln!(f, "    out index: {}", input.vout)?;
            writeln!(f, "    signature: {}", HEXLOWER.encode(&input.signature))?;
            writeln!(f, "    pub key:   {}", HEXLOWER.encode(&input.pub_key))?;
        }
        for (idx, output) in self.vout.iter().enumerate() {
            writeln!(f, "  output {idx}:")?;
            writeln!(f, "    value:        {}", output.value)?;
            writeln!(
                f,
                "    pub key hash: {}",
                HEXLOWER.encode(&output.pub_key_hash)
            )?;
        }
        Ok(())
    }
}
