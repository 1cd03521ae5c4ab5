//! Defines events emitted by the Riptide lending engine.

use crate::shared_structs::*;
use scrypto::prelude::*;

/// Event emitted when a new loan is opened against a pledged position.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventRequestLoan {
    /// The data associated with the newly created loan record.
    pub loan: Loan,
    /// The `NonFungibleLocalId` of the pledged position NFT.
    pub position_id: NonFungibleLocalId,
    /// The amount of stable tokens disbursed to the borrower.
    pub amount: Decimal,
}

/// Event emitted when an existing loan's balance is increased.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventIncreaseLoan {
    /// The `NonFungibleLocalId` of the pledged position NFT.
    pub position_id: NonFungibleLocalId,
    /// The additional amount of stable tokens disbursed.
    pub amount: Decimal,
    /// The loan's balance after the increase.
    pub new_balance: Decimal,
}

/// Event emitted when a payment is applied to a loan.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventPay {
    /// The `NonFungibleLocalId` of the pledged position NFT.
    pub position_id: NonFungibleLocalId,
    /// The amount applied to the balance (excess is returned to the payer).
    pub amount: Decimal,
    /// The loan's balance after the payment.
    pub new_balance: Decimal,
    /// The portion of the payment that recovered disbursed capital.
    pub principal_recovered: Decimal,
}

/// Event emitted when a borrower reclaims their position at zero balance.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventClaimCollateral {
    /// The `NonFungibleLocalId` of the reclaimed position NFT.
    pub position_id: NonFungibleLocalId,
}

/// Event emitted when an epoch's rewards are settled for a position.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventSettleRewards {
    /// The `NonFungibleLocalId` of the position whose rewards were settled.
    pub position_id: NonFungibleLocalId,
    /// Epoch start timestamp of the settled epoch.
    pub epoch: i64,
    /// Total stable value of the harvested rewards.
    pub proceeds: Decimal,
    /// Portion taken as protocol fee.
    pub protocol_fee: Decimal,
    /// Portion paid to the reservoir as lender premium.
    pub lender_premium: Decimal,
    /// Portion applied to the loan balance.
    pub paydown: Decimal,
    /// Portion left over after the balance reached zero.
    pub surplus: Decimal,
}

/// Event emitted when a vote is cast (or refreshed) for a pledged position.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventVoteCast {
    /// The `NonFungibleLocalId` of the position voted with.
    pub position_id: NonFungibleLocalId,
    /// The pools the vote was spread over.
    pub pools: Vec<ComponentAddress>,
    /// The weights used for `pools`.
    pub weights: Vec<Decimal>,
    /// Epoch start timestamp of the epoch the vote counts for.
    pub epoch: i64,
}

/// Event emitted when a borrower collects parked surplus proceeds.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventCollectSurplus {
    /// The `NonFungibleLocalId` of the position the surplus accrued to.
    pub position_id: NonFungibleLocalId,
    /// The amount of stable tokens collected.
    pub stable_amount: Decimal,
    /// The amount of reservoir pool units collected.
    pub unit_amount: Decimal,
}

/// Event emitted when the owner replaces the default voting pools.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventSetDefaultPools {
    /// The new default pools.
    pub pools: Vec<ComponentAddress>,
    /// The new default weights.
    pub weights: Vec<Decimal>,
}
