//! Subaccount inspection

use alloy_primitives::U256;
use anyhow::Result;
use auction_model::AccountDetails;

use crate::client::ChainReader;
use crate::contracts::Session;
use crate::display;

pub async fn show_balances<C: ChainReader>(
    session: &Session<C>,
    sub_account_id: U256,
    block: Option<u64>,
    spot: bool,
) -> Result<AccountDetails> {
    display::heading("Subaccount Balances");
    if let Some(block) = block {
        display::field("Block", block);
    }

    let details = session.account_details(sub_account_id, block).await?;
    let prices = if spot {
        Some(session.spot_prices(&details.portfolio, block).await?)
    } else {
        None
    };
    display::print_account(&details, prices.as_ref());
    Ok(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::ISpotFeed;
    use crate::testing::{fake_config, w, FakeChain, CASH, ETH_BASE, ETH_PERP, ETH_SPOT};

    #[tokio::test]
    async fn test_balances_at_block_with_spot() {
        let chain = FakeChain::with_eth_market();
        let id = U256::from(12u64);
        chain.respond_trade_id(id, 3);
        chain.respond_balances(id, &[(CASH, U256::ZERO, w("1"))]);
        chain.respond_balances_at(
            Some(500),
            id,
            &[(CASH, U256::ZERO, w("-20")), (ETH_BASE, U256::ZERO, w("0.5")), (ETH_PERP, U256::ZERO, w("1"))],
        );
        chain.respond_pnl(ETH_PERP, id, w("4"));
        chain.respond_at(
            500,
            ETH_SPOT,
            &ISpotFeed::getSpotCall {},
            (w("2500").into_raw(), w("0.99").into_raw()),
        );

        let session = Session::connect(chain, fake_config()).await.unwrap();
        let details = show_balances(&session, id, Some(500), true).await.unwrap();
        assert_eq!(details.portfolio.cash, w("-20"));
        assert_eq!(details.portfolio.markets["ETH"].base, w("0.5"));
        assert_eq!(details.portfolio.markets["ETH"].perp.unrealized_pnl, w("4"));

        let prices = session.spot_prices(&details.portfolio, Some(500)).await.unwrap();
        assert_eq!(prices["ETH"], Some(w("2500")));
        // Latest has no spot answer
        let prices = session.spot_prices(&details.portfolio, None).await.unwrap();
        assert_eq!(prices["ETH"], None);
    }
}
