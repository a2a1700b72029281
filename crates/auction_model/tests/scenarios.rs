//! End-to-end pricing scenarios against hand-computed contract values

use auction_model::fixed::parse_wad;
use auction_model::{
    bid_price, classify_balances, discount_percentage, max_proportion, quote, size_bid,
    AccountMargin, Address, AssetDirectory, AuctionParams, AuctionPhase, AuctionState,
    BidRequest, MarketAssets, RawBalance, I256, U256,
};

const START: u64 = 1_700_000_000;

fn w(s: &str) -> I256 {
    parse_wad(s).unwrap()
}

fn params() -> AuctionParams {
    AuctionParams {
        starting_mtm_percentage: w("0.95"),
        fast_auction_cutoff_percentage: w("0.2"),
        fast_auction_length: 600,
        slow_auction_length: 3600,
        insolvent_auction_length: 1800,
        liquidator_fee_rate: w("0.05"),
        buffer_margin_percentage: w("0.1"),
    }
}

fn auction(insolvent: bool) -> AuctionState {
    AuctionState {
        sub_account_id: U256::from(1234u64),
        ongoing: true,
        insolvent,
        cached_scenario_id: U256::ZERO,
        start_time: START,
        reserved_cash: I256::ZERO,
    }
}

fn margin(mm: &str, mtm: &str) -> AccountMargin {
    AccountMargin {
        mm: w(mm),
        mtm: w(mtm),
        worst_scenario: U256::from(2u64),
    }
}

#[test]
fn scenario_a_fast_phase_discount() {
    assert_eq!(discount_percentage(START, START + 300, &params()).unwrap(), w("0.575"));
}

#[test]
fn scenario_b_past_both_phases() {
    assert_eq!(discount_percentage(START, START + 4200, &params()).unwrap(), I256::ZERO);

    let q = quote(&auction(false), &margin("-50", "10"), &params(), START + 4200).unwrap();
    assert_eq!(q.phase, AuctionPhase::Solvent);
    assert_eq!(q.price, I256::ZERO);
}

#[test]
fn scenario_c_insolvent_half_way() {
    let price = bid_price(&auction(true), &margin("100", "-20"), &params(), START + 900).unwrap();
    assert_eq!(price.price, w("60"));
    assert_eq!(price.discount, w("-0.5"));
}

#[test]
fn scenario_d_unknown_asset_excluded() {
    let cash: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
    let stray: Address = "0x9999999999999999999999999999999999999999".parse().unwrap();
    let directory = AssetDirectory::new(cash, [("ETH".to_string(), MarketAssets::default())]).unwrap();

    let balances = [
        RawBalance { asset: cash, sub_id: U256::ZERO, amount: w("250") },
        RawBalance { asset: stray, sub_id: U256::ZERO, amount: w("1000") },
    ];
    testing_logger::setup();
    let portfolio = classify_balances(U256::from(1u64), &balances, &directory)
        .finish(Vec::new())
        .unwrap();

    testing_logger::validate(|logs| {
        let warnings: Vec<_> = logs.iter().filter(|l| l.level == log::Level::Warn).collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].body.contains("Unknown asset"));
    });
    assert_eq!(portfolio.cash, w("250"));
    assert_eq!(portfolio.unknown, vec![balances[1].clone()]);
    assert_eq!(portfolio.position_count(), 1);
    assert!(portfolio.ensure_complete(U256::from(1u64)).is_err());
}

#[test]
fn insolvent_expired_pays_full_margin() {
    let price = bid_price(&auction(true), &margin("100", "-20"), &params(), START + 5_000).unwrap();
    assert_eq!(price.price, w("100"));
    assert_eq!(price.discount, w("-1"));
}

// Edge case kept as-is: a positive buffer margin lets the whole account be bid on
#[test]
fn positive_buffer_margin_allows_full_proportion() {
    let healthy = margin("5", "20");
    for discount in ["0", "0.2", "0.575", "0.95"] {
        assert_eq!(max_proportion(&healthy, &params(), w(discount)).unwrap(), w("1"));
    }
}

#[test]
fn bid_plan_follows_the_curve() {
    let request = BidRequest {
        sub_account_id: U256::from(1234u64),
        liquidator_sub_account_id: U256::from(1u64),
        percentage: w("0.25"),
        collateral_amount: None,
        last_trade_id: U256::from(77u64),
        max_cost: I256::ZERO,
        merge: true,
        manager_data: Vec::new(),
    };
    let m = margin("-100", "100");

    // Collateral demand grows as the discount decays
    let early = size_bid(&request, &auction(false), &m, &params(), START).unwrap();
    let late = size_bid(&request, &auction(false), &m, &params(), START + 3000).unwrap();
    assert!(late.min_collateral > early.min_collateral);

    // bm -120; at start price is -114, so 6 required and 1.5 for a quarter
    assert_eq!(early.cash_required, w("6"));
    assert_eq!(early.min_collateral, w("1.5"));
    assert!(early.params.merge);
}
