//! Mint safety checks
//!
//! One verdict per mint per momentum window, memoized by the caller. A
//! failed check is a policy outcome carried in the verdict; `Err` is
//! reserved for transport failures after retries.

use tokio::sync::Semaphore;
use tracing::debug;

use super::token_layout::{has_blocked_extension, parse_extension_types, parse_mint};
use super::{rpc_call, RPC_RETRY_ATTEMPTS, RPC_RETRY_BASE_MS};
use crate::adapters::{ClusterRpcClient, Commitment};
use crate::error::Result;
use crate::session::types::{AutoSnipeConfig, SafetyVerdict};

/// Token program class a mint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenProgramClass {
    Classic,
    Extended,
}

/// Classify an account owner as one of the two token programs
pub fn token_program_class(owner: &str) -> Option<TokenProgramClass> {
    if owner == spl_token::ID.to_string() {
        Some(TokenProgramClass::Classic)
    } else if owner == spl_token_2022::ID.to_string() {
        Some(TokenProgramClass::Extended)
    } else {
        None
    }
}

/// Run the full safety check for `mint`
pub async fn check_mint_safety(
    rpc: &dyn ClusterRpcClient,
    sem: &Semaphore,
    mint: &str,
    cfg: &AutoSnipeConfig,
) -> Result<SafetyVerdict> {
    let account = rpc_call(sem, RPC_RETRY_ATTEMPTS, RPC_RETRY_BASE_MS, || {
        rpc.get_account_info(mint, Commitment::Confirmed)
    })
    .await?;

    let account = match account {
        Some(acc) => acc,
        None => return Ok(SafetyVerdict::fail("mint account not found")),
    };

    let class = match token_program_class(&account.owner) {
        Some(class) => class,
        None => return Ok(SafetyVerdict::fail("not a token mint account")),
    };

    if class == TokenProgramClass::Extended {
        if !cfg.allow_token_2022 {
            return Ok(SafetyVerdict::fail("token-2022 not allowed"));
        }
        let extensions = parse_extension_types(&account.data);
        if let Some(blocked) = has_blocked_extension(&extensions) {
            return Ok(SafetyVerdict::fail(format!(
                "blocked token-2022 extension {}",
                blocked
            )));
        }
    }

    let layout = match parse_mint(&account.data) {
        Some(layout) => layout,
        None => return Ok(SafetyVerdict::fail("mint layout invalid")),
    };

    if !layout.is_initialized {
        return Ok(SafetyVerdict::fail("mint not initialized"));
    }

    if cfg.require_mint_authority_disabled && layout.mint_authority_present {
        return Ok(SafetyVerdict::fail("mint authority still enabled"));
    }

    if cfg.require_freeze_authority_disabled && layout.freeze_authority_present {
        return Ok(SafetyVerdict::fail("freeze authority still enabled"));
    }

    let supply = rpc_call(sem, RPC_RETRY_ATTEMPTS, RPC_RETRY_BASE_MS, || {
        rpc.get_token_supply(mint)
    })
    .await?;

    if supply.amount == 0 {
        return Ok(SafetyVerdict::fail("zero supply"));
    }

    let holders = rpc_call(sem, RPC_RETRY_ATTEMPTS, RPC_RETRY_BASE_MS, || {
        rpc.get_token_largest_accounts(mint)
    })
    .await?;

    let top1 = holders.first().copied().unwrap_or(0);
    let top10: u128 = holders.iter().take(10).map(|&a| a as u128).sum();
    let top1_pct = (top1 as u128 * 100) as f64 / supply.amount as f64;
    let top10_pct = (top10 * 100) as f64 / supply.amount as f64;

    // A mint seconds after launch is trivially concentrated; the caps only
    // mean something once holders have spread out.
    let non_zero_holders = holders.iter().filter(|&&a| a > 0).count();
    if non_zero_holders >= 5 {
        if top1_pct > cfg.max_top1_holder_pct {
            return Ok(SafetyVerdict::fail("top1 too high"));
        }
        if top10_pct > cfg.max_top10_holder_pct {
            return Ok(SafetyVerdict::fail("top10 too high"));
        }
    } else {
        debug!(
            "mint {}: {} non-zero holders, concentration caps skipped",
            mint, non_zero_holders
        );
    }

    Ok(SafetyVerdict::pass(top1_pct, top10_pct))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::testing::MockRpc;
    use crate::discovery::token_layout::synthesize_mint;

    fn auto_cfg() -> AutoSnipeConfig {
        AutoSnipeConfig {
            allow_token_2022: true,
            ..AutoSnipeConfig::default()
        }
    }

    fn sem() -> Semaphore {
        Semaphore::new(2)
    }

    #[tokio::test]
    async fn test_missing_mint_account() {
        let rpc = MockRpc::default();
        let verdict = check_mint_safety(&rpc, &sem(), "mintX", &auto_cfg())
            .await
            .unwrap();
        assert!(!verdict.ok);
        assert_eq!(verdict.reason.as_deref(), Some("mint account not found"));
    }

    #[tokio::test]
    async fn test_mint_authority_enabled_rejected() {
        let rpc = MockRpc::default();
        rpc.put_mint_account("mintX", synthesize_mint(true, 1000, 6, true, false), false);
        rpc.put_supply("mintX", 1000);
        rpc.put_holders("mintX", vec![100]);

        let verdict = check_mint_safety(&rpc, &sem(), "mintX", &auto_cfg())
            .await
            .unwrap();
        assert_eq!(verdict.reason.as_deref(), Some("mint authority still enabled"));
    }

    #[tokio::test]
    async fn test_freeze_authority_enabled_rejected() {
        let rpc = MockRpc::default();
        rpc.put_mint_account("mintX", synthesize_mint(false, 1000, 6, true, true), false);

        let verdict = check_mint_safety(&rpc, &sem(), "mintX", &auto_cfg())
            .await
            .unwrap();
        assert_eq!(
            verdict.reason.as_deref(),
            Some("freeze authority still enabled")
        );
    }

    #[tokio::test]
    async fn test_token_2022_disallowed() {
        let rpc = MockRpc::default();
        rpc.put_mint_account("mintX", synthesize_mint(false, 1000, 6, true, false), true);

        let cfg = AutoSnipeConfig::default(); // allow_token_2022 = false
        let verdict = check_mint_safety(&rpc, &sem(), "mintX", &cfg).await.unwrap();
        assert_eq!(verdict.reason.as_deref(), Some("token-2022 not allowed"));
    }

    #[tokio::test]
    async fn test_blocked_extension_rejected() {
        let rpc = MockRpc::default();
        let mut data = synthesize_mint(false, 1000, 6, true, false);
        data.extend_from_slice(&[14, 0, 0, 0]); // transfer hook
        rpc.put_mint_account("mintX", data, true);

        let verdict = check_mint_safety(&rpc, &sem(), "mintX", &auto_cfg())
            .await
            .unwrap();
        assert_eq!(
            verdict.reason.as_deref(),
            Some("blocked token-2022 extension 14")
        );
    }

    #[tokio::test]
    async fn test_zero_supply_rejected() {
        let rpc = MockRpc::default();
        rpc.put_mint_account("mintX", synthesize_mint(false, 0, 6, true, false), false);
        rpc.put_supply("mintX", 0);

        let verdict = check_mint_safety(&rpc, &sem(), "mintX", &auto_cfg())
            .await
            .unwrap();
        assert_eq!(verdict.reason.as_deref(), Some("zero supply"));
    }

    #[tokio::test]
    async fn test_concentration_caps_skipped_below_five_holders() {
        let rpc = MockRpc::default();
        rpc.put_mint_account("mintX", synthesize_mint(false, 1000, 6, true, false), false);
        rpc.put_supply("mintX", 1000);
        // One holder owns everything, but only 1 non-zero holder exists
        rpc.put_holders("mintX", vec![1000]);

        let verdict = check_mint_safety(&rpc, &sem(), "mintX", &auto_cfg())
            .await
            .unwrap();
        assert!(verdict.ok, "caps must not reject below 5 non-zero holders");
        assert!((verdict.top1_pct - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_concentration_caps_enforced_at_five_holders() {
        let rpc = MockRpc::default();
        rpc.put_mint_account("mintX", synthesize_mint(false, 1000, 6, true, false), false);
        rpc.put_supply("mintX", 1000);
        rpc.put_holders("mintX", vec![500, 100, 100, 100, 100]);

        let verdict = check_mint_safety(&rpc, &sem(), "mintX", &auto_cfg())
            .await
            .unwrap();
        assert_eq!(verdict.reason.as_deref(), Some("top1 too high"));
    }

    #[tokio::test]
    async fn test_healthy_mint_passes() {
        let rpc = MockRpc::default();
        rpc.put_mint_account("mintX", synthesize_mint(false, 1000, 6, true, false), false);
        rpc.put_supply("mintX", 1000);
        // 7 holders, top1 = 12%, top10 = 45%
        rpc.put_holders("mintX", vec![120, 80, 70, 60, 50, 40, 30]);

        let verdict = check_mint_safety(&rpc, &sem(), "mintX", &auto_cfg())
            .await
            .unwrap();
        assert!(verdict.ok);
        assert!((verdict.top1_pct - 12.0).abs() < 0.001);
        assert!((verdict.top10_pct - 45.0).abs() < 0.001);
    }
}
