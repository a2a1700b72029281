//! Solidity interfaces of the contracts the liquidator talks to

use alloy_sol_types::sol;

sol! {
    #[sol(all_derives)]
    interface IDutchAuction {
        struct AuctionParams {
            uint256 startingMtMPercentage;
            uint256 fastAuctionCutoffPercentage;
            uint256 fastAuctionLength;
            uint256 slowAuctionLength;
            uint256 insolventAuctionLength;
            uint256 liquidatorFeeRate;
            uint256 bufferMarginPercentage;
        }

        struct Auction {
            uint256 accountId;
            uint256 scenarioId;
            bool insolvent;
            bool ongoing;
            int256 cachedMM;
            uint256 startTime;
            int256 reservedCash;
        }

        function getAuctionParams() external view returns (AuctionParams memory);
        function getAuction(uint256 accountId) external view returns (Auction memory);

        event SolventAuctionStarted(uint256 accountId, uint256 scenarioId, int256 markToMarket, uint256 fee);
        event InsolventAuctionStarted(uint256 accountId, uint256 scenarioId, int256 maintenanceMargin);
        event AuctionEnded(uint256 accountId, uint256 endTime);
        event Bid(uint256 accountId, uint256 bidderId, uint256 finalPercentage, uint256 cashFromBidder, uint256 cashToBidder);
    }
}

sol! {
    /// Testnet deployments carry `percentageLeft` before `startTime`
    #[sol(all_derives)]
    interface IDutchAuctionTestnet {
        struct Auction {
            uint256 accountId;
            uint256 scenarioId;
            bool insolvent;
            bool ongoing;
            int256 cachedMM;
            uint256 percentageLeft;
            uint256 startTime;
            int256 reservedCash;
        }

        function getAuction(uint256 accountId) external view returns (Auction memory);
    }
}

sol! {
    #[sol(all_derives)]
    interface IAuctionUtils {
        function getMM(uint256 accountId)
            external
            view
            returns (address manager, int256 maintenanceMargin, int256 markToMarket, uint256 worstScenario);

        function advancedBid(
            uint256 scenarioId,
            uint256 accountId,
            uint256 bidderId,
            uint256 percentOfAccount,
            int256 maxCost,
            uint256 lastTradeId,
            uint256 collateralAmount,
            bool merge,
            bytes managerData
        ) external;
    }
}

sol! {
    #[sol(all_derives)]
    interface ISubAccounts {
        struct AssetBalance {
            address asset;
            uint256 subId;
            int256 balance;
        }

        function getAccountBalances(uint256 accountId) external view returns (AssetBalance[] memory);
        function lastAccountTradeId(uint256 accountId) external view returns (uint256);
    }
}

sol! {
    #[sol(all_derives)]
    interface IPerpAsset {
        function getUnsettledAndUnrealizedCash(uint256 accountId) external view returns (int256);
    }
}

sol! {
    #[sol(all_derives)]
    interface ISpotFeed {
        function getSpot() external view returns (uint256 price, uint256 confidence);
    }
}

sol! {
    #[sol(all_derives)]
    interface IManager {
        function perp() external view returns (address);
        function option() external view returns (address);
        function spotFeed() external view returns (address);
    }
}

sol! {
    #[sol(all_derives)]
    interface ISecurityModule {
        event SecurityModulePaidOut(uint256 accountId, uint256 cashAmountNeeded, uint256 cashAmountPaid);
    }
}

sol! {
    #[sol(all_derives)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result3 {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (Result3[] memory returnData);
    }
}
