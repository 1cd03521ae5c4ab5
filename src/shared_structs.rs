//! # Riptide Blueprint shared structs
//! Structs making up the loan ledger's persisted layout, kept in their own module
//! so a storage migration is an explicit transform over plain SBOR values.

use scrypto::prelude::*;

/// Ledger record of a single loan, keyed by the pledged position's `NonFungibleLocalId`.
///
/// A record is created when a position is pledged via `request_loan`, mutated by
/// increases, payments and reward settlements, and removed when the borrower reclaims
/// the collateral at zero balance.
#[derive(ScryptoSbor, Clone)]
pub struct Loan {
    /// Local id of the loan receipt NFT held by the borrower.
    pub receipt_id: NonFungibleLocalId,
    /// Outstanding amount owed: disbursed principal plus capitalized fees and interest.
    pub balance: Decimal,
    /// Disbursed capital not yet recovered. Always <= `balance`.
    pub outstanding_principal: Decimal,
    /// Supporting value (decayed locked value) snapshot taken at request / increase time.
    pub weight: Decimal,
    /// Borrower-chosen voting pools. Empty means the owner defaults apply.
    pub voting_pools: Vec<ComponentAddress>,
    /// Proportional weights for `voting_pools`.
    pub voting_weights: Vec<Decimal>,
    /// What to do with reward proceeds once the balance has reached zero.
    pub zero_balance_option: ZeroBalanceOption,
    /// Account surplus proceeds are pushed to under `ZeroBalanceOption::PayToBorrower`.
    pub payout_account: Option<ComponentAddress>,
    /// Stable surplus parked in the engine's surplus vault for this borrower.
    pub unclaimed_surplus: Decimal,
    /// Reservoir pool units parked for this borrower (`ReinvestToReservoir` proceeds).
    pub reservoir_units: Decimal,
    /// Epoch start timestamp of the last settled reward epoch.
    pub last_claim_epoch: i64,
    /// Epoch start timestamp up to which interest has been capitalized into `balance`.
    pub last_accrual_epoch: i64,
    /// Epoch start timestamp of the last vote cast for this position.
    pub last_vote_epoch: i64,
    /// Key of this loan in the iterable active-position index.
    pub index_key: Decimal,
}

/// Data struct of a loan receipt NFT, minted to the borrower when a position is pledged.
/// Presenting (or burning) this receipt is how the borrower exercises their rights.
#[derive(ScryptoSbor, NonFungibleData, Clone, Debug)]
pub struct LoanReceipt {
    /// Image of the NFT
    #[mutable]
    pub key_image_url: Url,
    /// Local id of the vote-escrowed position held as collateral for this loan.
    pub position_id: NonFungibleLocalId,
    /// Timestamp the loan was opened.
    pub minted_at: Instant,
}

/// Borrower-selected policy for reward proceeds left over once the loan balance is zero.
#[derive(ScryptoSbor, PartialEq, Clone, Debug)]
pub enum ZeroBalanceOption {
    /// Park surplus in the engine; the borrower collects it manually. No fee.
    DoNothing,
    /// Push surplus (minus the zero-balance fee) to the borrower's payout account.
    /// Falls back to parking if no account is registered or the deposit is refused.
    PayToBorrower,
    /// Deposit surplus (minus the zero-balance fee) into the reservoir and park the
    /// received pool units for the borrower.
    ReinvestToReservoir,
}

/// A struct providing a summarized view of a loan's state within the Riptide engine.
/// This is often used for returning information via getter methods.
#[derive(ScryptoSbor, Clone)]
pub struct LoanInfoReturn {
    /// The pledged position's local id.
    pub position_id: NonFungibleLocalId,
    /// Local id of the borrower's receipt NFT.
    pub receipt_id: NonFungibleLocalId,
    /// Balance owed, projected to include interest accrued up to the current epoch.
    pub balance: Decimal,
    /// Disbursed capital not yet recovered.
    pub outstanding_principal: Decimal,
    /// Cached supporting-value snapshot for this position.
    pub weight: Decimal,
    /// Voting pools in force for this position (borrower override, empty = defaults).
    pub voting_pools: Vec<ComponentAddress>,
    /// Weights for `voting_pools`.
    pub voting_weights: Vec<Decimal>,
    /// The borrower's zero-balance policy.
    pub zero_balance_option: ZeroBalanceOption,
    /// Stable surplus collectable by the borrower.
    pub unclaimed_surplus: Decimal,
    /// Reservoir pool units collectable by the borrower.
    pub reservoir_units: Decimal,
    /// Epoch start timestamp of the last settled reward epoch.
    pub last_claim_epoch: i64,
    /// Epoch start timestamp of the last vote cast for this position.
    pub last_vote_epoch: i64,
}
