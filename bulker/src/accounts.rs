use std::{fmt, fs, path::Path, sync::Arc};

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_core::primitives::{Address, Bytes};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

/// Primary holder plus three recipients.
pub const EXPECTED_KEYS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("could not read key file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("expected {EXPECTED_KEYS} private keys, found {0}")]
    KeyCount(usize),

    #[error("malformed private key on line {line}: {reason}")]
    MalformedKey { line: usize, reason: String },
}

/// Signing capability. Implementations hold the key material; callers only
/// ever see the address and the signed envelope.
pub trait PayloadSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Signs the transaction and returns its EIP-2718 encoding.
    fn sign(&self, tx: TxEip1559) -> Result<Bytes, alloy_signer::Error>;
}

/// An in-memory secp256k1 key.
pub struct LocalKey(PrivateKeySigner);

impl LocalKey {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self(signer)
    }

    pub fn random() -> Self {
        Self(PrivateKeySigner::random())
    }
}

impl PayloadSigner for LocalKey {
    fn address(&self) -> Address {
        self.0.address()
    }

    fn sign(&self, tx: TxEip1559) -> Result<Bytes, alloy_signer::Error> {
        let signature = self.0.sign_hash_sync(&tx.signature_hash())?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        Ok(envelope.encoded_2718().into())
    }
}

#[derive(Clone)]
pub struct Account {
    index: usize,
    signer: Arc<dyn PayloadSigner>,
}

impl Account {
    pub fn new(index: usize, signer: Arc<dyn PayloadSigner>) -> Self {
        Self { index, signer }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn sign(&self, tx: TxEip1559) -> Result<Bytes, alloy_signer::Error> {
        self.signer.sign(tx)
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.address() == other.address()
    }
}

impl Eq for Account {}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("index", &self.index)
            .field("address", &self.address())
            .finish()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{} ({})", self.index, self.address())
    }
}

/// The fixed set of identities used for a run. Index 0 is the primary holder.
#[derive(Debug, Clone)]
pub struct AccountSet {
    accounts: Vec<Account>,
}

impl AccountSet {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AccountError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| AccountError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_key_list(&text)
    }

    /// Parses one hex private key per line. Blank lines are skipped.
    pub fn from_key_list(text: &str) -> Result<Self, AccountError> {
        let signers = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                line.trim()
                    .parse::<PrivateKeySigner>()
                    .map(|signer| Arc::new(LocalKey::new(signer)) as Arc<dyn PayloadSigner>)
                    .map_err(|e| AccountError::MalformedKey {
                        line: i + 1,
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_signers(signers)
    }

    pub fn from_signers(signers: Vec<Arc<dyn PayloadSigner>>) -> Result<Self, AccountError> {
        if signers.len() != EXPECTED_KEYS {
            return Err(AccountError::KeyCount(signers.len()));
        }
        let accounts = signers
            .into_iter()
            .enumerate()
            .map(|(index, signer)| Account::new(index, signer))
            .collect();
        Ok(Self { accounts })
    }

    pub fn primary(&self) -> &Account {
        &self.accounts[0]
    }

    pub fn recipients(&self) -> &[Account] {
        &self.accounts[1..]
    }

    pub fn get(&self, index: usize) -> Option<&Account> {
        self.accounts.get(index)
    }

    pub fn by_address(&self, address: Address) -> Option<&Account> {
        self.accounts.iter().find(|a| a.address() == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.accounts.iter().map(Account::address).collect()
    }
}
