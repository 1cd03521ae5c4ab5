#![allow(deprecated)]

//! # The Riptide Core Logic Blueprint
//!
//! This blueprint defines the core component of the Riptide protocol, a lending engine that
//! disburses a stable asset against vote-escrowed position NFTs pledged as collateral.
//!
//! ## Overview
//! Borrowers interact with this component to open and manage loans against their escrowed
//! positions:
//! - **Open a Loan:** Pledge a vote-escrowed position NFT and borrow up to the position's
//!   borrowing ceiling (`request_loan`). The engine takes custody of the position, mints a
//!   loan receipt NFT to the borrower, and disburses stable funds from the reservoir.
//! - **Manage a Loan:** Borrow more against the same position (`increase_loan`), pay the
//!   balance down (`pay`, open to any payer), or tune settlement policy
//!   (`set_zero_balance_option`, `set_payout_account`, `set_voting_pools`).
//! - **Close a Loan:** Once the balance reaches zero, reclaim the position by burning the
//!   loan receipt (`claim_collateral`).
//! - **Rewards Settlement:** Pledged positions keep earning voting rewards. Once per epoch,
//!   anyone may settle a position (`claim_rewards`, `claim_rewards_multiple`, `advance`):
//!   the engine harvests the position's rewards from the voter, converts non-stable assets
//!   via the swap helper, takes a protocol fee, pays the reservoir its lender premium, and
//!   applies the remainder to the loan balance. Surplus beyond the balance is routed per the
//!   borrower's `ZeroBalanceOption`.
//! - **Voting:** While a position is pledged, its voting power is still put to work.
//!   Borrowers may select their own pool allocation; positions without one vote with the
//!   owner-configured default pools. Votes are cast at most once per epoch.
//!
//! ## Key Concepts
//! - **Position:** A vote-escrowed NFT with a locked value and a lock expiry, managed by an
//!   external registry. Borrowing power decays as the lock approaches expiry.
//! - **Loan Receipt:** An NFT minted to the borrower at `request_loan`. Presenting (or
//!   burning) the receipt is how the borrower exercises their rights over the loan.
//! - **Balance / Outstanding Principal:** `balance` is everything owed (principal plus
//!   capitalized fees and interest); `outstanding_principal` is disbursed capital not yet
//!   recovered. Payments and reward paydowns recover principal first.
//! - **Epoch:** A fixed reward window of `EPOCH_LENGTH` seconds. Reward claims and votes are
//!   idempotent per position per epoch.
//! - **Reservoir Headroom:** New borrowing is capped by the reservoir's liquid balance net
//!   of capital already out on loan, so the engine never originates more than the reservoir
//!   can honor.
//!
//! ## Interaction with Other Components
//! - **Reservoir:** Holds the stable funding asset; disburses loans, receives repayments and
//!   lender premiums, and mints pool units for reinvested surplus.
//! - **Registry:** The vote-escrow system's source of truth for a position's locked value
//!   and lock expiry.
//! - **Voter:** Casts pool votes with pledged positions and pays out their accrued rewards.
//! - **Swapper (optional):** Converts non-stable reward assets into the stable asset.

use crate::events::*;
use crate::shared_structs::*;
use scrypto::prelude::*;
use scrypto_avltree::AvlTree;

/// Length of a reward epoch in seconds (one week).
pub const EPOCH_LENGTH: i64 = 604_800;
/// Minimum time between two owner changes of the default voting pools.
pub const DEFAULT_POOL_COOLDOWN: i64 = EPOCH_LENGTH;

#[blueprint]
#[types(NonFungibleLocalId, Loan, LoanReceipt, AvlTree<Decimal, NonFungibleLocalId>, Decimal, Instant)]
#[events(
    EventRequestLoan,
    EventIncreaseLoan,
    EventPay,
    EventClaimCollateral,
    EventSettleRewards,
    EventVoteCast,
    EventCollectSurplus,
    EventSetDefaultPools,
)]
mod riptide_component {
    enable_method_auth! {
        methods {
            request_loan => PUBLIC;
            increase_loan => PUBLIC;
            pay => PUBLIC;
            claim_collateral => PUBLIC;
            claim_rewards => PUBLIC;
            claim_rewards_multiple => PUBLIC;
            advance => PUBLIC;
            vote_on_default_pool => PUBLIC;
            set_voting_pools => PUBLIC;
            set_zero_balance_option => PUBLIC;
            set_payout_account => PUBLIC;
            collect_surplus => PUBLIC;
            get_max_loan => PUBLIC;
            get_loan_details => PUBLIC;
            get_total_weight => PUBLIC;
            get_active_assets => PUBLIC;
            get_outstanding_capital => PUBLIC;
            get_active_positions => PUBLIC;
            get_default_pools => PUBLIC;
            get_parameters => PUBLIC;
            set_default_pools => restrict_to: [OWNER];
            set_multiplier => restrict_to: [OWNER];
            set_rewards_rate => restrict_to: [OWNER];
            set_protocol_fee => restrict_to: [OWNER];
            set_lender_premium => restrict_to: [OWNER];
            set_zero_balance_fee => restrict_to: [OWNER];
            set_origination_fee => restrict_to: [OWNER];
            set_minimum_loan => restrict_to: [OWNER];
            set_swapper => restrict_to: [OWNER];
            take_protocol_fees => restrict_to: [OWNER];
        }
    }
    struct Riptide {
        /// All open loans, keyed by the pledged position's `NonFungibleLocalId`.
        loans: KeyValueStore<NonFungibleLocalId, Loan>,
        /// Iterable index of pledged positions, keyed by pledge order.
        active_positions: AvlTree<Decimal, NonFungibleLocalId>,
        /// Counter generating the `active_positions` index keys.
        position_counter: u64,
        /// Custody vault holding the pledged position NFTs.
        collateral_vault: NonFungibleVault,
        /// Stable surplus parked for borrowers (`DoNothing` routing and refused payouts).
        surplus_vault: FungibleVault,
        /// Reservoir pool units parked for borrowers (`ReinvestToReservoir` routing).
        reservoir_unit_vault: Vault,
        /// Protocol fees awaiting collection by the owner.
        treasury_vault: FungibleVault,
        /// Sum of outstanding principal across all open loans.
        active_assets: Decimal,
        /// Total capital disbursed from the reservoir and not yet recovered.
        outstanding_capital: Decimal,
        /// Sum of the supporting-value snapshots of all pledged positions.
        total_weight: Decimal,
        /// Owner-tunable rates and floors.
        parameters: LendingParameters,
        /// Fallback voting pools for positions without a borrower-selected allocation.
        default_pools: Vec<ComponentAddress>,
        /// Weights for `default_pools`.
        default_weights: Vec<Decimal>,
        /// Timestamp of the last default-pool change, enforcing the cooldown.
        default_pool_change_time: Instant,
        /// The reservoir component holding the stable funding asset.
        reservoir: Global<AnyComponent>,
        /// The vote-escrow registry, source of truth for locked value and lock expiry.
        registry: Global<AnyComponent>,
        /// The voting component rewards are harvested from and votes are cast on.
        voter: Global<AnyComponent>,
        /// Optional helper converting non-stable reward assets into the stable asset.
        swapper: Option<Global<AnyComponent>>,
        /// Resource address of the stable funding asset.
        stable_address: ResourceAddress,
        /// Resource address of the vote-escrowed position NFTs.
        position_address: ResourceAddress,
        /// Resource address of the reservoir's pool units.
        reservoir_unit_address: ResourceAddress,
        /// Maximum lock duration of the vote-escrow system, in seconds.
        max_lock_duration: i64,
        /// The `ResourceManager` for the loan receipt NFTs.
        loan_receipt_manager: ResourceManager,
        /// Counter generating loan receipt ids.
        loan_receipt_counter: u64,
    }

    impl Riptide {
        /// Instantiates the `Riptide` component and its associated resources.
        ///
        /// # Arguments
        /// * `stable_address`: Resource address of the stable funding asset.
        /// * `position_address`: Resource address of the vote-escrowed position NFTs.
        /// * `reservoir_unit_address`: Resource address of the reservoir's pool units.
        /// * `reservoir_address`: Component address of the reservoir.
        /// * `registry_address`: Component address of the vote-escrow registry.
        /// * `voter_address`: Component address of the voting component.
        /// * `max_lock_duration`: Maximum lock duration of the vote-escrow system (seconds).
        ///
        /// # Returns
        /// * `Global<Riptide>`: The globalized component.
        /// * `Bucket`: The owner badge (supply of 1) gating the owner methods.
        /// * `ResourceAddress`: The loan receipt resource address.
        ///
        /// # Logic
        /// 1. Reserves the component address so resource roles can require `global_caller`.
        /// 2. Mints the owner badge.
        /// 3. Creates the loan receipt NFT resource; only the component can mint, burn and
        ///    update receipts.
        /// 4. Instantiates the component with empty vaults, zeroed aggregates and the
        ///    launch parameters, then globalizes it under the owner badge.
        pub fn instantiate(
            stable_address: ResourceAddress,
            position_address: ResourceAddress,
            reservoir_unit_address: ResourceAddress,
            reservoir_address: ComponentAddress,
            registry_address: ComponentAddress,
            voter_address: ComponentAddress,
            max_lock_duration: i64,
        ) -> (Global<Riptide>, Bucket, ResourceAddress) {
            let (address_reservation, component_address) =
                Runtime::allocate_component_address(Riptide::blueprint_id());

            let owner_badge: Bucket = ResourceBuilder::new_fungible(OwnerRole::None)
                .divisibility(DIVISIBILITY_NONE)
                .metadata(metadata! {
                    init {
                        "name" => "Riptide Owner Badge", updatable;
                        "symbol" => "rtOWN", updatable;
                    }
                })
                .mint_initial_supply(1)
                .into();

            let owner_role = OwnerRole::Fixed(rule!(require(owner_badge.resource_address())));

            let loan_receipt_manager: ResourceManager =
                ResourceBuilder::new_integer_non_fungible_with_registered_type::<LoanReceipt>(
                    owner_role.clone(),
                )
                .metadata(metadata! {
                    init {
                        "name" => "Riptide Loan Receipt", updatable;
                        "symbol" => "rtLOAN", updatable;
                        "description" =>
                            "Receipt for a vote-escrowed position pledged to Riptide.",
                            updatable;
                    }
                })
                .mint_roles(mint_roles! {
                    minter => rule!(require(global_caller(component_address)));
                    minter_updater => rule!(deny_all);
                })
                .burn_roles(burn_roles! {
                    burner => rule!(require(global_caller(component_address)));
                    burner_updater => rule!(deny_all);
                })
                .non_fungible_data_update_roles(non_fungible_data_update_roles! {
                    non_fungible_data_updater => rule!(require(global_caller(component_address)));
                    non_fungible_data_updater_updater => rule!(deny_all);
                })
                .create_with_no_initial_supply()
                .into();

            let loan_receipt_address = loan_receipt_manager.address();

            let riptide = Riptide {
                loans: KeyValueStore::new_with_registered_type(),
                active_positions: AvlTree::new(),
                position_counter: 0,
                collateral_vault: NonFungibleVault::new(position_address),
                surplus_vault: FungibleVault::new(stable_address),
                reservoir_unit_vault: Vault::new(reservoir_unit_address),
                treasury_vault: FungibleVault::new(stable_address),
                active_assets: Decimal::ZERO,
                outstanding_capital: Decimal::ZERO,
                total_weight: Decimal::ZERO,
                parameters: LendingParameters {
                    multiplier: dec!(0.5),
                    rewards_rate: Decimal::ZERO,
                    protocol_fee: dec!(0.05),
                    lender_premium: dec!(0.2),
                    zero_balance_fee: dec!(0.01),
                    origination_fee: dec!(0.008),
                    minimum_loan: dec!(0.01),
                },
                default_pools: Vec::new(),
                default_weights: Vec::new(),
                // Backdated a full cooldown so the first configuration is never gated.
                default_pool_change_time: Instant {
                    seconds_since_unix_epoch: -DEFAULT_POOL_COOLDOWN,
                },
                reservoir: Global::from(reservoir_address),
                registry: Global::from(registry_address),
                voter: Global::from(voter_address),
                swapper: None,
                stable_address,
                position_address,
                reservoir_unit_address,
                max_lock_duration,
                loan_receipt_manager,
                loan_receipt_counter: 0,
            }
            .instantiate()
            .prepare_to_globalize(owner_role)
            .with_address(address_reservation)
            .metadata(metadata! {
                init {
                    "name" => "Riptide", updatable;
                    "description" =>
                        "A lending engine disbursing stable liquidity against vote-escrowed positions.",
                        updatable;
                    "info_url" => Url::of("https://riptide.finance"), updatable;
                }
            })
            .globalize();

            (riptide, owner_badge, loan_receipt_address)
        }

        /// Opens a loan against a vote-escrowed position.
        ///
        /// # Arguments
        /// * `position`: Bucket with exactly one vote-escrowed position NFT, taken into
        ///   custody for the life of the loan.
        /// * `amount`: Stable amount to borrow.
        /// * `zero_balance_option`: Routing policy for reward surplus once the balance is zero.
        /// * `payout_account`: Push target for `ZeroBalanceOption::PayToBorrower`.
        ///
        /// # Returns
        /// * `Bucket`: The borrowed stable funds, disbursed from the reservoir.
        /// * `Bucket`: The loan receipt NFT.
        ///
        /// # Panics
        /// * If the bucket is not a single position NFT of the configured registry.
        /// * If a loan is already open against the position.
        /// * If `amount` is below the minimum loan size or above the position's max loan.
        ///
        /// # Logic
        /// The new record (balance including the origination fee), the custody transfer and
        /// the receipt mint are all committed before the reservoir is asked to disburse, so
        /// no external call can observe a half-opened loan.
        pub fn request_loan(
            &mut self,
            position: Bucket,
            amount: Decimal,
            zero_balance_option: ZeroBalanceOption,
            payout_account: Option<ComponentAddress>,
        ) -> (Bucket, Bucket) {
            assert!(
                position.resource_address() == self.position_address,
                "Not a position of the configured vote-escrow registry."
            );
            assert!(
                position.amount() == dec!(1),
                "Pledge exactly one position per loan."
            );
            assert!(
                amount >= self.parameters.minimum_loan,
                "Requested amount is below the minimum loan size."
            );

            let position_id: NonFungibleLocalId =
                position.as_non_fungible().non_fungible_local_id();
            assert!(
                self.loans.get(&position_id).is_none(),
                "A loan is already open against this position."
            );

            let (max_loan, supporting_value) = self.max_loan_for(&position_id);
            assert!(
                amount <= max_loan,
                "Requested amount exceeds the maximum loan for this position."
            );

            let epoch = self.current_epoch();
            let origination_fee = amount * self.parameters.origination_fee;

            self.position_counter += 1;
            self.loan_receipt_counter += 1;
            let index_key = Decimal::from(self.position_counter);
            let receipt_id = NonFungibleLocalId::integer(self.loan_receipt_counter);

            let loan = Loan {
                receipt_id: receipt_id.clone(),
                balance: amount + origination_fee,
                outstanding_principal: amount,
                weight: supporting_value,
                voting_pools: Vec::new(),
                voting_weights: Vec::new(),
                zero_balance_option,
                payout_account,
                unclaimed_surplus: Decimal::ZERO,
                reservoir_units: Decimal::ZERO,
                last_claim_epoch: epoch,
                last_accrual_epoch: epoch,
                last_vote_epoch: 0,
                index_key,
            };

            self.active_assets += amount;
            self.outstanding_capital += amount;
            self.total_weight += supporting_value;
            self.active_positions.insert(index_key, position_id.clone());
            self.loans.insert(position_id.clone(), loan.clone());
            self.collateral_vault.put(position.as_non_fungible());

            let receipt = self.loan_receipt_manager.mint_non_fungible(
                &receipt_id,
                LoanReceipt {
                    key_image_url: Url::of("https://riptide.finance/img/loan_receipt.png"),
                    position_id: position_id.clone(),
                    minted_at: Clock::current_time_rounded_to_seconds(),
                },
            );

            let funds: Bucket = self.reservoir.call_raw("disburse", scrypto_args!(amount));

            Runtime::emit_event(EventRequestLoan {
                loan,
                position_id,
                amount,
            });

            (funds, receipt)
        }

        /// Borrows more against an already pledged position.
        ///
        /// Interest is accrued first, and the resulting balance (including the origination
        /// fee on the increment) must stay within the position's current max loan.
        ///
        /// # Arguments
        /// * `receipt_proof`: Proof of the loan receipt NFT.
        /// * `amount`: Additional stable amount to borrow.
        ///
        /// # Returns
        /// * `Bucket`: The borrowed stable funds.
        pub fn increase_loan(&mut self, receipt_proof: NonFungibleProof, amount: Decimal) -> Bucket {
            let receipt_proof = receipt_proof.check_with_message(
                self.loan_receipt_manager.address(),
                "Incorrect proof! Are you sure this loan is yours?",
            );
            let position_id = receipt_proof.non_fungible::<LoanReceipt>().data().position_id;

            let epoch = self.current_epoch();
            self.accrue_position(&position_id, epoch);

            let (max_loan, supporting_value) = self.max_loan_for(&position_id);
            let origination_fee = amount * self.parameters.origination_fee;

            let (new_balance, old_weight) = {
                let mut loan = self
                    .loans
                    .get_mut(&position_id)
                    .expect("No loan open against this position.");
                assert!(
                    loan.balance + amount + origination_fee <= max_loan,
                    "Requested amount exceeds the maximum loan for this position."
                );
                loan.balance += amount + origination_fee;
                loan.outstanding_principal += amount;
                let old_weight = loan.weight;
                loan.weight = supporting_value;
                (loan.balance, old_weight)
            };

            self.active_assets += amount;
            self.outstanding_capital += amount;
            self.total_weight += supporting_value - old_weight;

            let funds: Bucket = self.reservoir.call_raw("disburse", scrypto_args!(amount));

            Runtime::emit_event(EventIncreaseLoan {
                position_id,
                amount,
                new_balance,
            });

            funds
        }

        /// Pays a loan down. Open to any payer, not just the borrower.
        ///
        /// Applies `min(payment, balance)` and returns the change, so overpaying is the
        /// canonical way to pay a loan off in full. Recovered funds are forwarded to the
        /// reservoir; the aggregates fall by the recovered principal portion only.
        ///
        /// # Arguments
        /// * `position_id`: The pledged position the loan is keyed by.
        /// * `payment`: Stable funds to apply.
        ///
        /// # Returns
        /// * `Bucket`: Whatever part of the payment was not needed.
        pub fn pay(&mut self, position_id: NonFungibleLocalId, mut payment: Bucket) -> Bucket {
            assert!(
                payment.resource_address() == self.stable_address,
                "Payment must be in the reservoir's stable asset."
            );

            let epoch = self.current_epoch();
            self.accrue_position(&position_id, epoch);

            let (applied, principal_recovered, new_balance) = {
                let mut loan = self
                    .loans
                    .get_mut(&position_id)
                    .expect("No loan open against this position.");
                let applied = payment.amount().min(loan.balance);
                let principal_recovered = applied.min(loan.outstanding_principal);
                loan.balance -= applied;
                loan.outstanding_principal -= principal_recovered;
                (applied, principal_recovered, loan.balance)
            };

            self.active_assets -= principal_recovered;
            self.outstanding_capital -= principal_recovered;

            if applied > Decimal::ZERO {
                let funds = payment.take(applied);
                self.reservoir.call_raw::<()>("receive", scrypto_args!(funds));
            }

            Runtime::emit_event(EventPay {
                position_id,
                amount: applied,
                new_balance,
                principal_recovered,
            });

            payment
        }

        /// Returns a pledged position to its borrower once the loan is fully paid.
        ///
        /// # Arguments
        /// * `receipt`: Bucket with the loan receipt NFT, burned on success.
        ///
        /// # Returns
        /// * `Bucket`: The pledged position NFT.
        /// * `Option<Bucket>`: Parked stable surplus, if any accrued.
        /// * `Option<Bucket>`: Parked reservoir pool units, if any accrued.
        ///
        /// # Panics
        /// * If the bucket is not a loan receipt of this engine.
        /// * If the loan balance (after interest accrual) is not zero.
        pub fn claim_collateral(&mut self, receipt: Bucket) -> (Bucket, Option<Bucket>, Option<Bucket>) {
            assert!(
                receipt.resource_address() == self.loan_receipt_manager.address(),
                "Not a loan receipt of this lending engine."
            );
            let receipt_data: LoanReceipt = self
                .loan_receipt_manager
                .get_non_fungible_data(&receipt.as_non_fungible().non_fungible_local_id());
            let position_id = receipt_data.position_id;

            let epoch = self.current_epoch();
            self.accrue_position(&position_id, epoch);

            let loan = self
                .loans
                .remove(&position_id)
                .expect("No loan open against this position.");
            assert!(
                loan.balance == Decimal::ZERO,
                "Loan balance must be zero before collateral can be claimed."
            );

            self.active_positions.remove(&loan.index_key);
            self.total_weight -= loan.weight;

            let surplus: Option<Bucket> = if loan.unclaimed_surplus > Decimal::ZERO {
                Some(self.surplus_vault.take(loan.unclaimed_surplus).into())
            } else {
                None
            };
            let units: Option<Bucket> = if loan.reservoir_units > Decimal::ZERO {
                Some(self.reservoir_unit_vault.take(loan.reservoir_units))
            } else {
                None
            };

            receipt.burn();
            let position = self.collateral_vault.take_non_fungible(&position_id);

            Runtime::emit_event(EventClaimCollateral { position_id });

            (position.into(), surplus, units)
        }

        /// Settles the current epoch's rewards for a pledged position.
        ///
        /// Open to any caller; a position can only benefit from being settled. Returns the
        /// harvested stable value, which is zero when this epoch was already settled.
        pub fn claim_rewards(&mut self, position_id: NonFungibleLocalId) -> Decimal {
            self.settle_epoch(&position_id)
        }

        /// Settles the current epoch's rewards for a batch of pledged positions.
        pub fn claim_rewards_multiple(&mut self, position_ids: Vec<NonFungibleLocalId>) -> Decimal {
            let mut total = Decimal::ZERO;
            for position_id in position_ids {
                total += self.settle_epoch(&position_id);
            }
            total
        }

        /// Settles the current epoch's rewards for a position and refreshes its vote.
        ///
        /// The vote uses the borrower's pool selection when one is set, the owner defaults
        /// otherwise. If the position already voted this epoch the voter is poked instead,
        /// so an allocation already cast is never redirected mid-epoch.
        pub fn advance(&mut self, position_id: NonFungibleLocalId) -> Decimal {
            let proceeds = self.settle_epoch(&position_id);
            self.refresh_vote(&position_id);
            proceeds
        }

        /// Casts the default-pool allocation for a position without a borrower override.
        ///
        /// At most one vote per position per epoch; repeat calls within an epoch are no-ops.
        ///
        /// # Panics
        /// * If the position has borrower-selected voting pools.
        /// * If no default pools are configured.
        pub fn vote_on_default_pool(&mut self, position_id: NonFungibleLocalId) {
            let epoch = self.current_epoch();
            {
                let loan = self
                    .loans
                    .get(&position_id)
                    .expect("No loan open against this position.");
                assert!(
                    loan.voting_pools.is_empty(),
                    "This position has borrower-selected voting pools."
                );
                if loan.last_vote_epoch >= epoch {
                    return;
                }
            }
            assert!(
                !self.default_pools.is_empty(),
                "No default voting pools are configured."
            );

            let pools = self.default_pools.clone();
            let weights = self.default_weights.clone();
            self.cast_vote(&position_id, pools, weights, epoch);
        }

        /// Sets (or clears) the borrower's voting pool allocation for their position.
        ///
        /// An empty selection clears the override, falling back to the owner defaults. When
        /// this epoch's vote has not been cast yet, the new allocation is voted immediately.
        pub fn set_voting_pools(
            &mut self,
            receipt_proof: NonFungibleProof,
            pools: Vec<ComponentAddress>,
            weights: Vec<Decimal>,
        ) {
            let receipt_proof = receipt_proof.check_with_message(
                self.loan_receipt_manager.address(),
                "Incorrect proof! Are you sure this loan is yours?",
            );
            let position_id = receipt_proof.non_fungible::<LoanReceipt>().data().position_id;

            assert!(
                pools.len() == weights.len(),
                "Pools and weights must have the same length."
            );
            assert!(
                weights.iter().all(|weight| *weight > Decimal::ZERO),
                "Pool weights must be positive."
            );

            let epoch = self.current_epoch();
            let vote_available = {
                let mut loan = self
                    .loans
                    .get_mut(&position_id)
                    .expect("No loan open against this position.");
                loan.voting_pools = pools.clone();
                loan.voting_weights = weights.clone();
                loan.last_vote_epoch < epoch
            };

            if vote_available {
                let (pools_in_force, weights_in_force) = if pools.is_empty() {
                    (self.default_pools.clone(), self.default_weights.clone())
                } else {
                    (pools, weights)
                };
                if !pools_in_force.is_empty() {
                    self.cast_vote(&position_id, pools_in_force, weights_in_force, epoch);
                }
            }
        }

        /// Sets the borrower's routing policy for reward surplus at zero balance.
        pub fn set_zero_balance_option(
            &mut self,
            receipt_proof: NonFungibleProof,
            zero_balance_option: ZeroBalanceOption,
        ) {
            let receipt_proof = receipt_proof.check_with_message(
                self.loan_receipt_manager.address(),
                "Incorrect proof! Are you sure this loan is yours?",
            );
            let position_id = receipt_proof.non_fungible::<LoanReceipt>().data().position_id;
            self.loans
                .get_mut(&position_id)
                .expect("No loan open against this position.")
                .zero_balance_option = zero_balance_option;
        }

        /// Sets (or clears) the account surplus is pushed to under `PayToBorrower`.
        pub fn set_payout_account(
            &mut self,
            receipt_proof: NonFungibleProof,
            payout_account: Option<ComponentAddress>,
        ) {
            let receipt_proof = receipt_proof.check_with_message(
                self.loan_receipt_manager.address(),
                "Incorrect proof! Are you sure this loan is yours?",
            );
            let position_id = receipt_proof.non_fungible::<LoanReceipt>().data().position_id;
            self.loans
                .get_mut(&position_id)
                .expect("No loan open against this position.")
                .payout_account = payout_account;
        }

        /// Withdraws the borrower's parked surplus and reservoir pool units.
        ///
        /// # Returns
        /// * `Option<Bucket>`: Parked stable surplus, if any.
        /// * `Option<Bucket>`: Parked reservoir pool units, if any.
        pub fn collect_surplus(
            &mut self,
            receipt_proof: NonFungibleProof,
        ) -> (Option<Bucket>, Option<Bucket>) {
            let receipt_proof = receipt_proof.check_with_message(
                self.loan_receipt_manager.address(),
                "Incorrect proof! Are you sure this loan is yours?",
            );
            let position_id = receipt_proof.non_fungible::<LoanReceipt>().data().position_id;

            let (stable_amount, unit_amount) = {
                let mut loan = self
                    .loans
                    .get_mut(&position_id)
                    .expect("No loan open against this position.");
                let amounts = (loan.unclaimed_surplus, loan.reservoir_units);
                loan.unclaimed_surplus = Decimal::ZERO;
                loan.reservoir_units = Decimal::ZERO;
                amounts
            };

            let surplus: Option<Bucket> = if stable_amount > Decimal::ZERO {
                Some(self.surplus_vault.take(stable_amount).into())
            } else {
                None
            };
            let units: Option<Bucket> = if unit_amount > Decimal::ZERO {
                Some(self.reservoir_unit_vault.take(unit_amount))
            } else {
                None
            };

            Runtime::emit_event(EventCollectSurplus {
                position_id,
                stable_amount,
                unit_amount,
            });

            (surplus, units)
        }

        /// Replaces the default voting pools. Subject to the change cooldown.
        ///
        /// A change never redirects votes already cast this epoch; positions pick the new
        /// defaults up at their next vote.
        pub fn set_default_pools(&mut self, pools: Vec<ComponentAddress>, weights: Vec<Decimal>) {
            assert!(
                pools.len() == weights.len(),
                "Pools and weights must have the same length."
            );
            assert!(
                weights.iter().all(|weight| *weight > Decimal::ZERO),
                "Pool weights must be positive."
            );
            assert!(
                Clock::current_time_is_at_or_after(
                    Instant {
                        seconds_since_unix_epoch: self
                            .default_pool_change_time
                            .seconds_since_unix_epoch
                            + DEFAULT_POOL_COOLDOWN,
                    },
                    TimePrecision::Second,
                ),
                "Default pool change cooldown is still active."
            );

            self.default_pools = pools.clone();
            self.default_weights = weights.clone();
            self.default_pool_change_time = Clock::current_time_rounded_to_seconds();

            Runtime::emit_event(EventSetDefaultPools { pools, weights });
        }

        /// Computes the current borrowing ceiling for a position.
        ///
        /// # Returns
        /// * `Decimal`: The max loan: the supporting value scaled by the multiplier, capped
        ///   by the reservoir's liquid balance net of capital already out on loan. Zero when
        ///   the reservoir has no headroom.
        /// * `Decimal`: The supporting value: the locked value decayed by remaining lock time.
        pub fn get_max_loan(&self, position_id: NonFungibleLocalId) -> (Decimal, Decimal) {
            self.max_loan_for(&position_id)
        }

        /// Returns a summarized view of a loan, balance projected to the current epoch.
        pub fn get_loan_details(&self, position_id: NonFungibleLocalId) -> LoanInfoReturn {
            let epoch = self.current_epoch();
            let loan = self
                .loans
                .get(&position_id)
                .expect("No loan open against this position.");

            let mut balance = loan.balance;
            if self.parameters.rewards_rate > Decimal::ZERO
                && balance > Decimal::ZERO
                && loan.last_accrual_epoch < epoch
            {
                let epochs = (epoch - loan.last_accrual_epoch) / EPOCH_LENGTH;
                balance = balance
                    * (Decimal::ONE + self.parameters.rewards_rate)
                        .checked_powi(epochs)
                        .unwrap();
            }

            LoanInfoReturn {
                position_id: position_id.clone(),
                receipt_id: loan.receipt_id.clone(),
                balance,
                outstanding_principal: loan.outstanding_principal,
                weight: loan.weight,
                voting_pools: loan.voting_pools.clone(),
                voting_weights: loan.voting_weights.clone(),
                zero_balance_option: loan.zero_balance_option.clone(),
                unclaimed_surplus: loan.unclaimed_surplus,
                reservoir_units: loan.reservoir_units,
                last_claim_epoch: loan.last_claim_epoch,
                last_vote_epoch: loan.last_vote_epoch,
            }
        }

        /// Returns the aggregate supporting value across all pledged positions.
        pub fn get_total_weight(&self) -> Decimal {
            self.total_weight
        }

        /// Returns the sum of outstanding principal across all open loans.
        pub fn get_active_assets(&self) -> Decimal {
            self.active_assets
        }

        /// Returns the capital disbursed from the reservoir and not yet recovered.
        pub fn get_outstanding_capital(&self) -> Decimal {
            self.outstanding_capital
        }

        /// Pages through the pledged positions in pledge order.
        ///
        /// # Arguments
        /// * `start`: Index key to resume from, `None` for the beginning.
        /// * `count`: Maximum number of entries to return.
        pub fn get_active_positions(
            &self,
            start: Option<Decimal>,
            count: u64,
        ) -> Vec<(Decimal, NonFungibleLocalId)> {
            let mut positions: Vec<(Decimal, NonFungibleLocalId)> = Vec::new();
            let start_key = start.unwrap_or(Decimal::ZERO);
            for (index_key, position_id, _next_key) in self.active_positions.range(start_key..) {
                if positions.len() as u64 >= count {
                    break;
                }
                positions.push((index_key, position_id));
            }
            positions
        }

        /// Returns the default voting pools, their weights, and the last change time.
        pub fn get_default_pools(&self) -> (Vec<ComponentAddress>, Vec<Decimal>, Instant) {
            (
                self.default_pools.clone(),
                self.default_weights.clone(),
                self.default_pool_change_time,
            )
        }

        /// Returns the engine's current parameters.
        pub fn get_parameters(&self) -> LendingParameters {
            self.parameters.clone()
        }

        /// Sets the multiplier scaling supporting value into borrowing power.
        pub fn set_multiplier(&mut self, multiplier: Decimal) {
            self.parameters.multiplier = multiplier;
        }

        /// Sets the per-epoch interest rate capitalized into loan balances.
        pub fn set_rewards_rate(&mut self, rewards_rate: Decimal) {
            self.parameters.rewards_rate = rewards_rate;
        }

        /// Sets the protocol fee fraction taken from harvested rewards.
        pub fn set_protocol_fee(&mut self, protocol_fee: Decimal) {
            self.parameters.protocol_fee = protocol_fee;
        }

        /// Sets the lender premium fraction paid to the reservoir from harvested rewards.
        pub fn set_lender_premium(&mut self, lender_premium: Decimal) {
            self.parameters.lender_premium = lender_premium;
        }

        /// Sets the fee fraction charged on pushed or reinvested zero-balance surplus.
        pub fn set_zero_balance_fee(&mut self, zero_balance_fee: Decimal) {
            self.parameters.zero_balance_fee = zero_balance_fee;
        }

        /// Sets the origination fee fraction capitalized into the balance per disbursement.
        pub fn set_origination_fee(&mut self, origination_fee: Decimal) {
            self.parameters.origination_fee = origination_fee;
        }

        /// Sets the smallest loan size the engine will originate.
        pub fn set_minimum_loan(&mut self, minimum_loan: Decimal) {
            self.parameters.minimum_loan = minimum_loan;
        }

        /// Configures (or clears) the helper that converts reward assets into the stable asset.
        pub fn set_swapper(&mut self, swapper: Option<ComponentAddress>) {
            self.swapper = swapper.map(Global::from);
        }

        /// Drains the accumulated protocol fees.
        pub fn take_protocol_fees(&mut self) -> Bucket {
            self.treasury_vault.take_all().into()
        }

        /// Settles one reward epoch for a position.
        ///
        /// Accrues interest, then harvests the position's voter rewards once per epoch and
        /// splits them: protocol fee to the treasury, lender premium to the reservoir, the
        /// remainder onto the balance (principal-first), and any surplus beyond the balance
        /// routed per the borrower's `ZeroBalanceOption`. The claim epoch is stamped before
        /// the voter is called, so a reentrant settlement attempt finds the epoch spent.
        fn settle_epoch(&mut self, position_id: &NonFungibleLocalId) -> Decimal {
            let epoch = self.current_epoch();
            self.accrue_position(position_id, epoch);

            {
                let mut loan = self
                    .loans
                    .get_mut(position_id)
                    .expect("No loan open against this position.");
                if loan.last_claim_epoch >= epoch {
                    return Decimal::ZERO;
                }
                loan.last_claim_epoch = epoch;
            }

            let position = self.collateral_vault.take_non_fungible(position_id);
            let rewards: Vec<Bucket> = self
                .voter
                .call_raw("claim", scrypto_args!(position.create_proof_of_all()));
            self.collateral_vault.put(position);

            let mut proceeds: Bucket = Bucket::new(self.stable_address);
            for reward in rewards {
                if reward.resource_address() == self.stable_address {
                    proceeds.put(reward);
                } else if reward.amount() > Decimal::ZERO {
                    let swapper = self
                        .swapper
                        .as_ref()
                        .expect("Received a non-stable reward with no swapper configured.");
                    let swapped: Bucket =
                        swapper.call_raw("swap_to_stable", scrypto_args!(reward));
                    assert!(
                        swapped.resource_address() == self.stable_address,
                        "Swapper returned a non-stable bucket."
                    );
                    proceeds.put(swapped);
                } else {
                    reward.drop_empty();
                }
            }

            let total = proceeds.amount();
            if total == Decimal::ZERO {
                proceeds.drop_empty();
                Runtime::emit_event(EventSettleRewards {
                    position_id: position_id.clone(),
                    epoch,
                    proceeds: Decimal::ZERO,
                    protocol_fee: Decimal::ZERO,
                    lender_premium: Decimal::ZERO,
                    paydown: Decimal::ZERO,
                    surplus: Decimal::ZERO,
                });
                return Decimal::ZERO;
            }

            let protocol_fee_amount = total * self.parameters.protocol_fee;
            let lender_premium_amount = total * self.parameters.lender_premium;
            self.treasury_vault
                .put(proceeds.take(protocol_fee_amount).as_fungible());

            let remainder = proceeds.amount() - lender_premium_amount;

            let (paydown, principal_recovered) = {
                let mut loan = self
                    .loans
                    .get_mut(position_id)
                    .expect("No loan open against this position.");
                let paydown = remainder.min(loan.balance).max(Decimal::ZERO);
                let principal_recovered = paydown.min(loan.outstanding_principal);
                loan.balance -= paydown;
                loan.outstanding_principal -= principal_recovered;
                (paydown, principal_recovered)
            };
            self.active_assets -= principal_recovered;
            self.outstanding_capital -= principal_recovered;

            if lender_premium_amount + paydown > Decimal::ZERO {
                let reservoir_share = proceeds.take(lender_premium_amount + paydown);
                self.reservoir
                    .call_raw::<()>("receive", scrypto_args!(reservoir_share));
            }

            let surplus = proceeds.amount();
            let mut parked = Decimal::ZERO;
            let mut units_received = Decimal::ZERO;
            if surplus > Decimal::ZERO {
                let (zero_balance_option, payout_account) = {
                    let loan = self.loans.get(position_id).unwrap();
                    (loan.zero_balance_option.clone(), loan.payout_account)
                };
                match zero_balance_option {
                    ZeroBalanceOption::DoNothing => {
                        parked = surplus;
                        self.surplus_vault.put(proceeds.take(surplus).as_fungible());
                    }
                    ZeroBalanceOption::PayToBorrower => match payout_account {
                        Some(account_address) => {
                            let fee = surplus * self.parameters.zero_balance_fee;
                            let fee_bucket = proceeds.take(fee);
                            let push_bucket = proceeds.take(surplus - fee);
                            let account: Global<AnyComponent> = Global::from(account_address);
                            let refund: Option<Bucket> = account.call_raw(
                                "try_deposit_or_refund",
                                scrypto_args!(push_bucket, None::<ResourceOrNonFungible>),
                            );
                            match refund {
                                Some(mut refused) => {
                                    // deposit refused: park everything, charge no fee
                                    refused.put(fee_bucket);
                                    parked = refused.amount();
                                    self.surplus_vault.put(refused.as_fungible());
                                }
                                None => {
                                    self.treasury_vault.put(fee_bucket.as_fungible());
                                }
                            }
                        }
                        None => {
                            parked = surplus;
                            self.surplus_vault.put(proceeds.take(surplus).as_fungible());
                        }
                    },
                    ZeroBalanceOption::ReinvestToReservoir => {
                        let fee = surplus * self.parameters.zero_balance_fee;
                        self.treasury_vault.put(proceeds.take(fee).as_fungible());
                        let deposit = proceeds.take(surplus - fee);
                        let units: Bucket =
                            self.reservoir.call_raw("deposit", scrypto_args!(deposit));
                        units_received = units.amount();
                        self.reservoir_unit_vault.put(units);
                    }
                }
            }
            proceeds.drop_empty();

            if parked > Decimal::ZERO || units_received > Decimal::ZERO {
                let mut loan = self.loans.get_mut(position_id).unwrap();
                loan.unclaimed_surplus += parked;
                loan.reservoir_units += units_received;
            }

            Runtime::emit_event(EventSettleRewards {
                position_id: position_id.clone(),
                epoch,
                proceeds: total,
                protocol_fee: protocol_fee_amount,
                lender_premium: lender_premium_amount,
                paydown,
                surplus,
            });

            total
        }

        /// Casts this epoch's vote for a position if still available, pokes otherwise.
        fn refresh_vote(&mut self, position_id: &NonFungibleLocalId) {
            let epoch = self.current_epoch();

            let (pools, weights, already_voted) = {
                let loan = self
                    .loans
                    .get(position_id)
                    .expect("No loan open against this position.");
                if loan.last_vote_epoch >= epoch {
                    (Vec::new(), Vec::new(), true)
                } else if loan.voting_pools.is_empty() {
                    (self.default_pools.clone(), self.default_weights.clone(), false)
                } else {
                    (loan.voting_pools.clone(), loan.voting_weights.clone(), false)
                }
            };

            if already_voted {
                self.voter
                    .call_raw::<()>("poke", scrypto_args!(position_id.clone()));
                return;
            }
            if pools.is_empty() {
                return;
            }
            self.cast_vote(position_id, pools, weights, epoch);
        }

        /// Stamps the vote epoch, then presents the pledged position to the voter.
        fn cast_vote(
            &mut self,
            position_id: &NonFungibleLocalId,
            pools: Vec<ComponentAddress>,
            weights: Vec<Decimal>,
            epoch: i64,
        ) {
            self.loans
                .get_mut(position_id)
                .expect("No loan open against this position.")
                .last_vote_epoch = epoch;

            let position = self.collateral_vault.take_non_fungible(position_id);
            self.voter.call_raw::<()>(
                "vote",
                scrypto_args!(position.create_proof_of_all(), pools.clone(), weights.clone()),
            );
            self.collateral_vault.put(position);

            Runtime::emit_event(EventVoteCast {
                position_id: position_id.clone(),
                pools,
                weights,
                epoch,
            });
        }

        /// Capitalizes interest into a loan's balance for every whole epoch elapsed.
        ///
        /// Principal aggregates are untouched: interest is owed on top of disbursed capital.
        fn accrue_position(&mut self, position_id: &NonFungibleLocalId, epoch: i64) {
            let rewards_rate = self.parameters.rewards_rate;
            let mut loan = self
                .loans
                .get_mut(position_id)
                .expect("No loan open against this position.");
            if loan.last_accrual_epoch >= epoch {
                return;
            }
            let epochs = (epoch - loan.last_accrual_epoch) / EPOCH_LENGTH;
            loan.last_accrual_epoch = epoch;
            if rewards_rate == Decimal::ZERO || loan.balance == Decimal::ZERO {
                return;
            }
            loan.balance = loan.balance
                * (Decimal::ONE + rewards_rate)
                    .checked_powi(epochs)
                    .unwrap();
        }

        /// Computes a position's max loan and supporting value from registry data.
        fn max_loan_for(&self, position_id: &NonFungibleLocalId) -> (Decimal, Decimal) {
            let locked_value: Decimal = self
                .registry
                .call_raw("locked_value", scrypto_args!(position_id.clone()));
            let lock_expiry: Instant = self
                .registry
                .call_raw("lock_expiry", scrypto_args!(position_id.clone()));

            let now = Clock::current_time_rounded_to_seconds().seconds_since_unix_epoch;
            let remaining = (lock_expiry.seconds_since_unix_epoch - now).max(0);
            let supporting_value =
                locked_value * Decimal::from(remaining) / Decimal::from(self.max_lock_duration);
            let ceiling = supporting_value * self.parameters.multiplier;

            let available: Decimal = self
                .reservoir
                .call_raw("available_balance", scrypto_args!());
            let headroom = available - self.outstanding_capital;

            if headroom <= Decimal::ZERO {
                (Decimal::ZERO, supporting_value)
            } else {
                (ceiling.min(headroom), supporting_value)
            }
        }

        /// Start timestamp of the current reward epoch.
        fn current_epoch(&self) -> i64 {
            let now = Clock::current_time_rounded_to_seconds().seconds_since_unix_epoch;
            now - now % EPOCH_LENGTH
        }
    }
}

/// A struct containing the owner-tunable parameters of the lending engine. All rates are
/// `Decimal` fractions.
#[derive(ScryptoSbor, Clone)]
pub struct LendingParameters {
    /// Scales a position's supporting value into its borrowing ceiling.
    pub multiplier: Decimal,
    /// Per-epoch interest rate capitalized into loan balances.
    pub rewards_rate: Decimal,
    /// Fraction of harvested rewards taken as protocol fee.
    pub protocol_fee: Decimal,
    /// Fraction of harvested rewards paid to the reservoir as lender yield.
    pub lender_premium: Decimal,
    /// Fraction of zero-balance surplus charged when it is pushed or reinvested.
    pub zero_balance_fee: Decimal,
    /// Fraction of every disbursement capitalized into the balance as a fee.
    pub origination_fee: Decimal,
    /// Smallest loan size the engine will originate.
    pub minimum_loan: Decimal,
}
