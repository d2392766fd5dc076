//! Production `ClusterRpcClient` backed by `solana_client`
//!
//! Maps node responses down to the thin carriers the pipeline inspects so
//! the rest of the core never touches `solana_transaction_status` types.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{EncodedTransaction, UiMessage, UiTransactionEncoding};
use tracing::debug;

use super::{
    AccountSnapshot, ClusterRpcClient, Commitment, FetchedTransaction, SignatureInfo, TokenSupply,
};
use crate::error::{Error, Result};

fn commitment_config(commitment: Commitment) -> CommitmentConfig {
    match commitment {
        Commitment::Processed => CommitmentConfig::processed(),
        Commitment::Confirmed => CommitmentConfig::confirmed(),
        Commitment::Finalized => CommitmentConfig::finalized(),
    }
}

fn parse_pubkey(s: &str) -> Result<Pubkey> {
    Pubkey::from_str(s).map_err(|e| Error::Rpc(format!("Invalid pubkey {}: {}", s, e)))
}

/// `ClusterRpcClient` over the nonblocking solana RPC client
pub struct SolanaRpcAdapter {
    client: RpcClient,
}

impl SolanaRpcAdapter {
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(
            endpoint.into(),
            Duration::from_millis(timeout_ms),
            CommitmentConfig::confirmed(),
        );
        Self { client }
    }
}

#[async_trait]
impl ClusterRpcClient for SolanaRpcAdapter {
    async fn get_latest_blockhash(&self, commitment: Commitment) -> Result<String> {
        let (hash, _) = self
            .client
            .get_latest_blockhash_with_commitment(commitment_config(commitment))
            .await?;
        Ok(hash.to_string())
    }

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[String],
    ) -> Result<Vec<Option<AccountSnapshot>>> {
        let keys = pubkeys
            .iter()
            .map(|k| parse_pubkey(k))
            .collect::<Result<Vec<_>>>()?;
        let accounts = self.client.get_multiple_accounts(&keys).await?;
        Ok(accounts
            .into_iter()
            .map(|acc| {
                acc.map(|a| AccountSnapshot {
                    owner: a.owner.to_string(),
                    data: a.data,
                    lamports: a.lamports,
                })
            })
            .collect())
    }

    async fn get_account_info(
        &self,
        pubkey: &str,
        commitment: Commitment,
    ) -> Result<Option<AccountSnapshot>> {
        let key = parse_pubkey(pubkey)?;
        let response = self
            .client
            .get_account_with_commitment(&key, commitment_config(commitment))
            .await?;
        Ok(response.value.map(|a| AccountSnapshot {
            owner: a.owner.to_string(),
            data: a.data,
            lamports: a.lamports,
        }))
    }

    async fn get_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> Result<Option<FetchedTransaction>> {
        let sig = Signature::from_str(signature)
            .map_err(|e| Error::Rpc(format!("Invalid signature {}: {}", signature, e)))?;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(commitment_config(commitment)),
            max_supported_transaction_version: Some(0),
        };

        let fetched = match self.client.get_transaction_with_config(&sig, config).await {
            Ok(tx) => tx,
            Err(e) => {
                // The node answers "not found" as an error; that is a policy
                // decision upstream, not a failure here.
                debug!("getTransaction {} unavailable: {}", signature, e);
                return Ok(None);
            }
        };

        let mut out = FetchedTransaction::default();

        if let EncodedTransaction::Json(ui_tx) = &fetched.transaction.transaction {
            match &ui_tx.message {
                UiMessage::Raw(raw) => {
                    out.account_keys = raw.account_keys.clone();
                }
                UiMessage::Parsed(parsed) => {
                    out.account_keys =
                        parsed.account_keys.iter().map(|a| a.pubkey.clone()).collect();
                }
            }
        }

        if let Some(meta) = &fetched.transaction.meta {
            if let OptionSerializer::Some(balances) = &meta.pre_token_balances {
                out.pre_token_mints = balances.iter().map(|b| b.mint.clone()).collect();
            }
            if let OptionSerializer::Some(balances) = &meta.post_token_balances {
                out.post_token_mints = balances.iter().map(|b| b.mint.clone()).collect();
            }
        }

        Ok(Some(out))
    }

    async fn get_token_supply(&self, mint: &str) -> Result<TokenSupply> {
        let key = parse_pubkey(mint)?;
        let supply = self.client.get_token_supply(&key).await?;
        let amount = supply
            .amount
            .parse::<u64>()
            .map_err(|e| Error::Rpc(format!("Bad token supply amount: {}", e)))?;
        Ok(TokenSupply {
            amount,
            decimals: supply.decimals,
        })
    }

    async fn get_token_largest_accounts(&self, mint: &str) -> Result<Vec<u64>> {
        let key = parse_pubkey(mint)?;
        let holders = self.client.get_token_largest_accounts(&key).await?;
        Ok(holders
            .into_iter()
            .take(20)
            .filter_map(|h| h.amount.amount.parse::<u64>().ok())
            .collect())
    }

    async fn get_signatures_for_address(
        &self,
        pubkey: &str,
        limit: usize,
        commitment: Commitment,
    ) -> Result<Vec<SignatureInfo>> {
        let key = parse_pubkey(pubkey)?;
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(limit),
            commitment: Some(commitment_config(commitment)),
        };
        let sigs = self
            .client
            .get_signatures_for_address_with_config(&key, config)
            .await?;
        Ok(sigs
            .into_iter()
            .map(|s| SignatureInfo {
                signature: s.signature,
                block_time: s.block_time,
            })
            .collect())
    }

    async fn send_raw_transaction(&self, bytes: &[u8]) -> Result<String> {
        let tx: VersionedTransaction = bincode::deserialize(bytes)
            .map_err(|e| Error::TransactionDecode(format!("send_raw_transaction: {}", e)))?;
        let sig = self.client.send_transaction(&tx).await?;
        Ok(sig.to_string())
    }
}
