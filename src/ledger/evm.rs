//! EVM ledger adapter
//!
//! Records ownership proofs on the ProvenanceRegistry contract.

use alloy::contract::Error as ContractError;
use alloy::primitives::{Address, FixedBytes, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use alloy::transports::RpcError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::crypto::Hash256;
use crate::domain::{LedgerReceipt, LedgerVerification, OwnerId};
use crate::infra::{LedgerClient, LedgerRegistration, ProvenanceError, Result};

sol! {
    #[sol(rpc)]
    interface IProvenanceRegistry {
        function register(
            bytes32 fingerprint,
            bytes32 owner,
            string contentType,
            string filename,
            uint64 size
        ) external;

        function isRegistered(bytes32 fingerprint) external view returns (bool);
    }
}

const DEFAULT_CHAIN_ID: u64 = 84532;

/// Ledger adapter configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// ProvenanceRegistry contract address
    pub registry_address: Address,
    /// Private key for signing transactions
    pub private_key: String,
    pub chain_id: u64,
    /// Block explorer base URL, e.g. `https://sepolia.basescan.org`
    pub explorer_url: String,
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` unless RPC URL, registry address and key are all set.
    pub fn from_env() -> Option<Self> {
        let rpc_url = std::env::var("LEDGER_RPC_URL").ok()?;
        let registry_address = std::env::var("LEDGER_REGISTRY_ADDRESS")
            .ok()
            .and_then(|s| s.parse().ok())?;
        let private_key = std::env::var("LEDGER_PRIVATE_KEY").ok()?;
        let chain_id = std::env::var("LEDGER_CHAIN_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CHAIN_ID);
        let explorer_url = std::env::var("LEDGER_EXPLORER_URL").unwrap_or_default();

        Some(Self {
            rpc_url,
            registry_address,
            private_key,
            chain_id,
            explorer_url,
        })
    }
}

/// Ledger client backed by an EVM chain
pub struct EvmLedgerClient {
    config: LedgerConfig,
}

impl EvmLedgerClient {
    /// Create a client. The signing key is validated up front.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config
            .private_key
            .parse::<PrivateKeySigner>()
            .map_err(|e| ProvenanceError::Configuration(format!("invalid ledger key: {e}")))?;
        Ok(Self { config })
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Explorer link for a transaction hash
    pub fn explorer_link(&self, tx_hash: &Hash256) -> String {
        let base = self.config.explorer_url.trim_end_matches('/');
        format!("{base}/tx/0x{}", hex::encode(tx_hash))
    }

    fn receipt_for(&self, tx_hash: &Hash256) -> LedgerReceipt {
        LedgerReceipt {
            transaction_id: format!("0x{}", hex::encode(tx_hash)),
            explorer_url: self.explorer_link(tx_hash),
        }
    }

    fn to_bytes32(hash: &Hash256) -> FixedBytes<32> {
        FixedBytes::from_slice(hash)
    }

    /// Owners are recorded as a digest of their id
    fn owner_to_bytes32(owner: &OwnerId) -> FixedBytes<32> {
        let digest: Hash256 = Sha256::digest(owner.as_str().as_bytes()).into();
        FixedBytes::from(digest)
    }

    fn rpc_url(&self) -> Result<Url> {
        self.config
            .rpc_url
            .parse()
            .map_err(|e| ProvenanceError::Configuration(format!("invalid ledger RPC URL: {e}")))
    }

    /// Node answered with an error (revert, bad nonce, insufficient funds):
    /// the authority refused. Anything else is transport.
    fn classify_send_error(err: ContractError) -> ProvenanceError {
        match err {
            ContractError::TransportError(RpcError::ErrorResp(resp)) => {
                ProvenanceError::LedgerRejected(resp.message.to_string())
            }
            ContractError::TransportError(e) => ProvenanceError::LedgerUnavailable(e.to_string()),
            other => ProvenanceError::LedgerRejected(other.to_string()),
        }
    }
}

#[async_trait]
impl LedgerClient for EvmLedgerClient {
    async fn register(&self, registration: &LedgerRegistration) -> Result<LedgerReceipt> {
        info!(
            fingerprint = %registration.fingerprint,
            chain_id = self.config.chain_id,
            "Registering proof on ledger"
        );

        let signer: PrivateKeySigner = self
            .config
            .private_key
            .parse()
            .map_err(|e| ProvenanceError::Configuration(format!("invalid ledger key: {e}")))?;

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(alloy::network::EthereumWallet::from(signer))
            .on_http(self.rpc_url()?);

        let contract = IProvenanceRegistry::new(self.config.registry_address, &provider);

        let metadata = &registration.metadata;
        let tx = contract.register(
            Self::to_bytes32(registration.fingerprint.as_bytes()),
            Self::owner_to_bytes32(&registration.owner_id),
            metadata.content_type.clone(),
            metadata.filename.clone(),
            metadata.file_size_bytes,
        );

        let pending = tx.send().await.map_err(Self::classify_send_error)?;

        // From here on the node holds the transaction; its hash is the proof
        let submitted: Hash256 = pending.tx_hash().0;
        info!(tx_hash = %hex::encode(submitted), "Ledger transaction sent");

        let receipt = match pending.get_receipt().await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(
                    tx_hash = %hex::encode(submitted),
                    error = %e,
                    "Receipt unavailable for submitted transaction; recording it unconfirmed"
                );
                return Ok(self.receipt_for(&submitted));
            }
        };

        let tx_hash: Hash256 = receipt.transaction_hash.0;

        if !receipt.status() {
            warn!(tx_hash = %hex::encode(tx_hash), "Ledger transaction reverted");
            return Err(ProvenanceError::LedgerRejected(format!(
                "transaction 0x{} reverted",
                hex::encode(tx_hash)
            )));
        }

        info!(
            fingerprint = %registration.fingerprint,
            tx_hash = %hex::encode(tx_hash),
            block = receipt.block_number.unwrap_or(0),
            "Proof registered on ledger"
        );

        Ok(self.receipt_for(&tx_hash))
    }

    async fn verify(&self, transaction_id: &str) -> Result<LedgerVerification> {
        let tx_hash: B256 = transaction_id.parse().map_err(|e| {
            ProvenanceError::LedgerRejected(format!("invalid transaction id {transaction_id}: {e}"))
        })?;

        let provider = ProviderBuilder::new().on_http(self.rpc_url()?);

        let receipt = provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| ProvenanceError::LedgerUnavailable(e.to_string()))?;

        Ok(LedgerVerification {
            transaction_id: transaction_id.to_string(),
            confirmed: receipt.map(|r| r.status()).unwrap_or(false),
        })
    }

    fn name(&self) -> &'static str {
        "evm"
    }
}
