/// Shares minted for `assets` at the current exchange rate.
///
/// Formula: shares = assets × (supply + 1) / (total_assets + 1)
///
/// The virtual share and virtual asset keep an empty vault at 1:1 and make
/// the first depositor unable to skew the rate. Rounds down, in favour of
/// the vault.
///
/// Example:
/// - supply: 1,000 shares, total_assets: 1,500 (50% yield accrued)
/// - deposit 300 assets → 300 × 1,001 / 1,501 = 200 shares
pub fn to_shares(assets: i128, total_supply: i128, total_assets: i128) -> Option<i128> {
    assets
        .checked_mul(total_supply.checked_add(1)?)?
        .checked_div(total_assets.checked_add(1)?)
}

/// Assets paid out for `shares` at the current exchange rate.
///
/// Formula: assets = shares × (total_assets + 1) / (supply + 1)
pub fn to_assets(shares: i128, total_supply: i128, total_assets: i128) -> Option<i128> {
    shares
        .checked_mul(total_assets.checked_add(1)?)?
        .checked_div(total_supply.checked_add(1)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCALE: i128 = 10_000_000;

    #[test]
    fn test_empty_vault_is_one_to_one() {
        assert_eq!(to_shares(500 * SCALE, 0, 0), Some(500 * SCALE));
        assert_eq!(to_assets(500 * SCALE, 0, 0), Some(500 * SCALE));
    }

    #[test]
    fn test_balanced_vault_is_exact() {
        let supply = 1_000 * SCALE;
        let assets = 1_000 * SCALE;

        assert_eq!(to_shares(250 * SCALE, supply, assets), Some(250 * SCALE));
        assert_eq!(to_assets(250 * SCALE, supply, assets), Some(250 * SCALE));
    }

    #[test]
    fn test_yield_makes_shares_dearer() {
        let supply = 1_000;
        let assets = 1_500;

        // 300 × 1001 / 1501 = 200.06 → 200
        assert_eq!(to_shares(300, supply, assets), Some(200));
        // 200 × 1501 / 1001 = 299.9 → 299
        assert_eq!(to_assets(200, supply, assets), Some(299));
    }

    #[test]
    fn test_round_trip_never_gains() {
        let supply = 7_777 * SCALE;
        let assets = 9_131 * SCALE + 3;

        let shares = to_shares(1_234 * SCALE, supply, assets).unwrap();
        let back = to_assets(shares, supply, assets).unwrap();
        assert!(back <= 1_234 * SCALE);
        assert!(1_234 * SCALE - back <= 2);
    }

    #[test]
    fn test_overflow_is_reported() {
        assert_eq!(to_shares(i128::MAX, 10, 10), None);
        assert_eq!(to_assets(1, i128::MAX, 10), None);
    }
}
